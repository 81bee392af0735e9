//! Encoding scanner - raw encoding string to a list of type units
//!
//! Design: single left-to-right pass over bytes. Compound forms are found
//! by depth-balanced scanning and kept as opaque canonical text; pointers
//! recurse into the following unit so any depth works.

use super::typecode::TypeCode;
use crate::error::{BridgeError, Result};
use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of memoized encodings
pub const DEFAULT_SPLIT_CACHE_CAPACITY: usize = 1024;

/// Method qualifiers (`const`, `in`, `inout`, `out`, `bycopy`, `byref`,
/// `oneway`, atomic, complex) carry no layout information
const QUALIFIERS: &[u8] = b"rnNoORVAj";

static SPLIT_CACHE: Lazy<Mutex<LruCache<String, Arc<[TypeCode]>>>> =
    Lazy::new(|| Mutex::new(LruCache::new(capacity(DEFAULT_SPLIT_CACHE_CAPACITY))));

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

/// Resize the memo table (called from configuration)
pub fn set_split_cache_capacity(n: usize) {
    SPLIT_CACHE.lock().resize(capacity(n));
}

/// Number of memoized encodings
pub fn split_cache_len() -> usize {
    SPLIT_CACHE.lock().len()
}

/// Split an encoding into type units
pub fn split(encoding: &str) -> Result<Vec<TypeCode>> {
    Scanner::new(encoding).run()
}

/// Memoized [`split`]; the cache only saves work, results are identical
pub fn split_cached(encoding: &str) -> Result<Arc<[TypeCode]>> {
    if let Some(hit) = SPLIT_CACHE.lock().get(encoding) {
        return Ok(Arc::clone(hit));
    }

    let codes: Arc<[TypeCode]> = split(encoding)?.into();
    SPLIT_CACHE
        .lock()
        .put(encoding.to_string(), Arc::clone(&codes));
    Ok(codes)
}

/// Parse an encoding that must contain exactly one unit (ivar and property types)
pub fn split_one(encoding: &str) -> Result<TypeCode> {
    let mut codes = split(encoding)?;
    match codes.len() {
        1 => Ok(codes.remove(0)),
        0 => Err(BridgeError::encoding(encoding, 0, "empty encoding")),
        n => Err(BridgeError::encoding(
            encoding,
            0,
            format!("expected a single type, found {}", n),
        )),
    }
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, position: usize, reason: impl Into<String>) -> BridgeError {
        BridgeError::encoding(self.src, position, reason)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn run(mut self) -> Result<Vec<TypeCode>> {
        let mut codes = Vec::new();
        loop {
            self.skip_annotations()?;
            if self.pos >= self.bytes.len() {
                break;
            }
            self.skip_qualifiers();
            if self.pos >= self.bytes.len() {
                return Err(self.error(self.pos, "qualifier without a type"));
            }
            codes.push(self.unit()?);
        }
        Ok(codes)
    }

    /// Frame offsets (`v24@0:8`) and stray `<...>` groups between units
    fn skip_annotations(&mut self) -> Result<()> {
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || b == b'-' {
                self.pos += 1;
            } else if b == b'<' {
                self.pos = self.balanced_end(self.pos)?;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn skip_qualifiers(&mut self) {
        while matches!(self.peek(), Some(b) if QUALIFIERS.contains(&b)) {
            self.pos += 1;
        }
    }

    fn unit(&mut self) -> Result<TypeCode> {
        let start = self.pos;
        let b = match self.peek() {
            Some(b) => b,
            None => return Err(self.error(start, "unexpected end of encoding")),
        };

        match b {
            b'^' => {
                self.pos += 1;
                self.skip_qualifiers();
                if self.pos >= self.bytes.len() {
                    return Err(self.error(start, "pointer marker without a target type"));
                }
                Ok(TypeCode::Pointer(Box::new(self.unit()?)))
            }
            b'@' => {
                self.pos += 1;
                if self.peek() == Some(b'?') {
                    self.pos += 1;
                    if self.peek() == Some(b'<') {
                        // Extended block signature
                        self.pos = self.balanced_end(self.pos)?;
                    }
                    return Ok(TypeCode::Block);
                }
                self.skip_quoted_name(start)?;
                Ok(TypeCode::Object)
            }
            b'#' => {
                self.pos += 1;
                self.skip_quoted_name(start)?;
                Ok(TypeCode::Class)
            }
            b'[' => self.array(),
            b'{' => {
                let (name, body) = self.aggregate()?;
                Ok(TypeCode::Struct { name, body })
            }
            b'(' => {
                let (name, body) = self.aggregate()?;
                Ok(TypeCode::Union { name, body })
            }
            b'b' => {
                self.pos += 1;
                let bits = self.number();
                match bits {
                    Some(0) | None => Err(self.error(start, "bitfield without a width")),
                    Some(n) => u32::try_from(n)
                        .map(TypeCode::BitField)
                        .map_err(|_| self.error(start, "bitfield width out of range")),
                }
            }
            b'"' => Err(self.error(start, "quoted name must follow '@' or '#'")),
            b']' | b'}' | b')' | b'>' => Err(self.error(start, "unbalanced closing delimiter")),
            _ => {
                self.pos += 1;
                if let Some(code) = TypeCode::primitive(b) {
                    Ok(code)
                } else if b.is_ascii_graphic() {
                    Ok(TypeCode::Other(b as char))
                } else {
                    Err(self.error(start, format!("non-printable type code {:#04x}", b)))
                }
            }
        }
    }

    /// `@"NSString"` / `#"NSObject"`: validated and discarded
    fn skip_quoted_name(&mut self, marker: usize) -> Result<()> {
        if self.peek() != Some(b'"') {
            return Ok(());
        }
        let close = self.bytes[self.pos + 1..]
            .iter()
            .position(|&b| b == b'"')
            .ok_or_else(|| self.error(marker, "unterminated quoted class name"))?;
        self.pos += close + 2;
        Ok(())
    }

    fn number(&mut self) -> Option<usize> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.src[start..self.pos].parse().ok()
    }

    /// Index one past the delimiter closing the group opened at `open`
    fn balanced_end(&self, open: usize) -> Result<usize> {
        let mut stack = Vec::with_capacity(4);
        let mut i = open;
        while i < self.bytes.len() {
            let b = self.bytes[i];
            match b {
                b'"' => {
                    let close = self.bytes[i + 1..]
                        .iter()
                        .position(|&q| q == b'"')
                        .ok_or_else(|| self.error(i, "unterminated quoted name"))?;
                    i += close + 2;
                    continue;
                }
                b'[' => stack.push(b']'),
                b'{' => stack.push(b'}'),
                b'(' => stack.push(b')'),
                b'<' => stack.push(b'>'),
                b']' | b'}' | b')' | b'>' => {
                    if stack.pop() != Some(b) {
                        return Err(self.error(i, "mismatched closing delimiter"));
                    }
                    if stack.is_empty() {
                        return Ok(i + 1);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(self.error(open, "unbalanced delimiter"))
    }

    /// Interior of the group opened at `self.pos`, quoted names removed
    fn interior(&mut self) -> Result<String> {
        let open = self.pos;
        let end = self.balanced_end(open)?;
        let raw = &self.src[open + 1..end - 1];
        self.pos = end;
        Ok(strip_quoted(raw))
    }

    fn array(&mut self) -> Result<TypeCode> {
        let open = self.pos;
        let inner = self.interior()?;
        let digits = inner.bytes().take_while(u8::is_ascii_digit).count();
        let len = inner[..digits]
            .parse()
            .map_err(|_| self.error(open, "array without a length"))?;
        let element = inner[digits..].to_string();
        if element.is_empty() {
            return Err(self.error(open, "array without an element type"));
        }
        Ok(TypeCode::Array { len, element })
    }

    fn aggregate(&mut self) -> Result<(String, Option<String>)> {
        let inner = self.interior()?;
        match top_level_eq(&inner) {
            Some(eq) => Ok((inner[..eq].to_string(), Some(inner[eq + 1..].to_string()))),
            None => Ok((inner, None)),
        }
    }
}

/// Position of the `=` separating an aggregate's name from its fields
fn top_level_eq(inner: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in inner.bytes().enumerate() {
        match b {
            b'[' | b'{' | b'(' | b'<' => depth += 1,
            b']' | b'}' | b')' | b'>' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn strip_quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quoted = false;
    for c in raw.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted {
            out.push(c);
        }
    }
    out
}
