//! Method signatures - return type plus argument types

use super::native::{to_native_type, NativeType};
use super::split::split_cached;
use super::typecode::TypeCode;
use crate::error::{BridgeError, Result};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Parsed signatures by raw encoding string
static SIGNATURES: Lazy<DashMap<String, Arc<MethodSignature>>> = Lazy::new(DashMap::new);

/// Parsed method signature
///
/// `args` always starts with the hidden receiver and selector arguments.
/// Immutable once built; shared through `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    canonical: String,
    ret: TypeCode,
    args: Vec<TypeCode>,
    native_ret: NativeType,
    native_args: Vec<NativeType>,
}

/// Receiver and selector
pub const HIDDEN_ARGS: usize = 2;

impl MethodSignature {
    /// Parse a method type encoding, inserting `@:` when the hidden
    /// arguments are missing
    pub fn parse(encoding: &str) -> Result<Self> {
        let codes = split_cached(encoding)?;
        let (ret, rest) = codes
            .split_first()
            .ok_or_else(|| BridgeError::encoding(encoding, 0, "empty method signature"))?;

        let has_hidden = rest.len() >= HIDDEN_ARGS
            && matches!(rest[0], TypeCode::Object | TypeCode::Class)
            && rest[1] == TypeCode::Selector;

        let mut args = Vec::with_capacity(rest.len() + HIDDEN_ARGS);
        if !has_hidden {
            args.push(TypeCode::Object);
            args.push(TypeCode::Selector);
        }
        args.extend(rest.iter().cloned());

        Self::from_codes(ret.clone(), args)
    }

    /// Parse once per distinct encoding string and share the result
    pub fn parse_shared(encoding: &str) -> Result<Arc<Self>> {
        if let Some(sig) = SIGNATURES.get(encoding) {
            return Ok(Arc::clone(sig.value()));
        }
        let sig = Arc::new(Self::parse(encoding)?);
        Ok(Arc::clone(
            SIGNATURES
                .entry(encoding.to_string())
                .or_insert(sig)
                .value(),
        ))
    }

    pub(crate) fn from_codes(ret: TypeCode, args: Vec<TypeCode>) -> Result<Self> {
        let native_ret = to_native_type(&ret, None)?;
        let native_args = args
            .iter()
            .map(|code| match code {
                TypeCode::Void => Err(BridgeError::encoding(
                    &code.encode(),
                    0,
                    "void is not a valid argument type",
                )),
                _ => to_native_type(code, None),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut canonical = ret.encode();
        for arg in &args {
            arg.encode_into(&mut canonical);
        }

        Ok(Self {
            canonical,
            ret,
            args,
            native_ret,
            native_args,
        })
    }

    /// Canonical encoding (hidden arguments included)
    #[inline]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    #[inline]
    pub fn return_type(&self) -> &TypeCode {
        &self.ret
    }

    /// All argument types, hidden ones first
    #[inline]
    pub fn arg_types(&self) -> &[TypeCode] {
        &self.args
    }

    /// Arguments the caller supplies
    #[inline]
    pub fn explicit_args(&self) -> &[TypeCode] {
        &self.args[HIDDEN_ARGS..]
    }

    #[inline]
    pub fn explicit_arg_count(&self) -> usize {
        self.args.len() - HIDDEN_ARGS
    }

    #[inline]
    pub fn native_return(&self) -> &NativeType {
        &self.native_ret
    }

    #[inline]
    pub fn native_args(&self) -> &[NativeType] {
        &self.native_args
    }

    /// Human-readable native call shape, used in diagnostics
    pub fn call_shape(&self) -> String {
        let args: Vec<String> = self.native_args.iter().map(ToString::to_string).collect();
        format!("{} (*)({})", self.native_ret, args.join(", "))
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}
