//! Named struct registry
//!
//! Runtime encodings often mention a struct by name only (`{CGRect}`), for
//! example behind pointers or in property attributes. Layouts for those are
//! looked up here.

use super::split::split;
use super::typecode::TypeCode;
use crate::error::{BridgeError, Result};
use crate::logging::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[cfg(target_pointer_width = "64")]
const CGFLOAT: &str = "d";
#[cfg(not(target_pointer_width = "64"))]
const CGFLOAT: &str = "f";

#[cfg(target_pointer_width = "64")]
const NSUINTEGER: &str = "Q";
#[cfg(not(target_pointer_width = "64"))]
const NSUINTEGER: &str = "I";

static REGISTRY: Lazy<RwLock<HashMap<String, String>>> = Lazy::new(|| {
    let f = CGFLOAT;
    let mut known = HashMap::new();
    known.insert("CGPoint".to_string(), format!("{f}{f}"));
    known.insert("CGSize".to_string(), format!("{f}{f}"));
    known.insert("CGVector".to_string(), format!("{f}{f}"));
    known.insert(
        "CGRect".to_string(),
        format!("{{CGPoint={f}{f}}}{{CGSize={f}{f}}}"),
    );
    known.insert("CGAffineTransform".to_string(), f.repeat(6));
    known.insert("NSEdgeInsets".to_string(), f.repeat(4));
    known.insert("_NSRange".to_string(), NSUINTEGER.repeat(2));
    known.insert("NSRange".to_string(), NSUINTEGER.repeat(2));
    RwLock::new(known)
});

/// Field encoding registered for a struct name
pub fn lookup_struct(name: &str) -> Option<String> {
    REGISTRY.read().get(name).cloned()
}

/// Register (or replace) the field encoding for a struct name
///
/// Fails when the fields do not parse, or when they contain the struct
/// itself by value, directly or through other registered structs.
pub fn register_struct(name: impl Into<String>, fields: impl Into<String>) -> Result<()> {
    let name = name.into();
    let fields = fields.into();
    split(&fields)?;

    let mut registry = REGISTRY.write();
    let mut seen = HashSet::new();
    if contains_by_value(&name, &fields, &registry, &mut seen) {
        return Err(BridgeError::encoding(&fields, 0, format!("struct {} contains itself", name)));
    }
    debug!(struct_name = %name, fields = %fields, "Registered struct layout");
    registry.insert(name, fields);
    Ok(())
}

/// Whether `fields` embeds struct `target`, following registered layouts
/// for aggregates named without a body
fn contains_by_value(
    target: &str,
    fields: &str,
    registry: &HashMap<String, String>,
    seen: &mut HashSet<String>,
) -> bool {
    let Ok(codes) = split(fields) else {
        return false;
    };
    codes.iter().any(|code| match code {
        TypeCode::Struct { name, body } | TypeCode::Union { name, body } => {
            if name == target {
                return true;
            }
            match body {
                Some(body) => contains_by_value(target, body, registry, seen),
                None => match registry.get(name.as_str()) {
                    Some(known) if seen.insert(name.clone()) => {
                        contains_by_value(target, known, registry, seen)
                    }
                    _ => false,
                },
            }
        }
        TypeCode::Array { element, .. } => contains_by_value(target, element, registry, seen),
        _ => false,
    })
}
