//! Error taxonomy for the bridge
//!
//! Design: one error enum for every layer. Codec and dispatch errors are
//! raised before any native call is made, so they never leave native state
//! half-mutated. Lookups in the introspection layer return `Option` instead;
//! `Lookup` is only produced by layers that require the entity to exist.

use std::fmt;

/// What kind of runtime entity a failed lookup was looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Class,
    Selector,
    Method,
    Ivar,
    Protocol,
    Property,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Class => "class",
            Self::Selector => "selector",
            Self::Method => "method",
            Self::Ivar => "instance variable",
            Self::Protocol => "protocol",
            Self::Property => "property",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Malformed or unrecognized type encoding
    Encoding {
        encoding: String,
        position: usize,
        reason: String,
    },
    /// Wrong number of arguments for a resolved signature
    Argument {
        selector: String,
        expected: usize,
        found: usize,
        call_shape: String,
    },
    /// Argument or return value does not fit the declared native type
    Type {
        selector: String,
        index: usize,
        expected: String,
        found: String,
        call_shape: String,
    },
    /// Required class, selector, method or ivar is missing
    Lookup { kind: LookupKind, name: String },
    /// Instance variables can only be added before registration
    AlreadyRegistered { class: String },
    /// A required shared library or symbol could not be loaded
    Library { name: String, reason: String },
    /// Unrecoverable runtime failure (handler installation, class creation, ...)
    Runtime { message: String },
    /// A native exception reached the uncaught-exception handler
    NativeException { name: String, reason: String },
    /// The wrapped native object has already been deallocated
    Deallocated { address: usize },
    /// A host method implementation failed inside a native callback
    Callback { selector: String, message: String },
}

impl BridgeError {
    pub fn encoding(encoding: &str, position: usize, reason: impl Into<String>) -> Self {
        Self::Encoding {
            encoding: encoding.to_string(),
            position,
            reason: reason.into(),
        }
    }

    pub fn lookup(kind: LookupKind, name: impl Into<String>) -> Self {
        Self::Lookup { kind, name: name.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime { message: message.into() }
    }

    pub fn library(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Library {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for errors detected before the native call was attempted
    pub fn is_pre_call(&self) -> bool {
        matches!(
            self,
            Self::Encoding { .. } | Self::Argument { .. } | Self::Type { .. } | Self::Deallocated { .. }
        )
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding { encoding, position, reason } => {
                write!(f, "Invalid type encoding {:?} at offset {}: {}", encoding, position, reason)
            }
            Self::Argument { selector, expected, found, call_shape } => {
                write!(
                    f,
                    "{} takes {} argument(s), {} given (call shape: {})",
                    selector, expected, found, call_shape
                )
            }
            Self::Type { selector, index, expected, found, call_shape } => {
                write!(
                    f,
                    "Argument {} of {}: expected {}, found {} (call shape: {})",
                    index, selector, expected, found, call_shape
                )
            }
            Self::Lookup { kind, name } => write!(f, "No such {}: {}", kind, name),
            Self::AlreadyRegistered { class } => {
                write!(f, "Class {} is already registered; instance variables are frozen", class)
            }
            Self::Library { name, reason } => write!(f, "Failed to load {}: {}", name, reason),
            Self::Runtime { message } => write!(f, "Runtime error: {}", message),
            Self::NativeException { name, reason } => {
                write!(f, "Uncaught native exception {}: {}", name, reason)
            }
            Self::Deallocated { address } => {
                write!(f, "Object at {:#x} has been deallocated", address)
            }
            Self::Callback { selector, message } => {
                write!(f, "Host implementation of {} failed: {}", selector, message)
            }
        }
    }
}

impl std::error::Error for BridgeError {}

pub type Result<T> = std::result::Result<T, BridgeError>;
