//! Entry-point selection per return shape
//!
//! The runtime exposes several message-send entry points. Which one a call
//! must use depends on how the target ABI returns the method's result;
//! calling the wrong one corrupts the return value or the stack.

use crate::codec::{MethodSignature, NativeType};
use libffi::middle::{Cif, Type};

/// Architecture families with distinct struct/float return rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    X86,
    Aarch64,
    Arm,
    Other,
}

impl Arch {
    #[inline]
    pub const fn current() -> Self {
        #[cfg(target_arch = "x86_64")]
        return Self::X86_64;

        #[cfg(target_arch = "x86")]
        return Self::X86;

        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;

        #[cfg(target_arch = "arm")]
        return Self::Arm;

        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "x86",
            target_arch = "aarch64",
            target_arch = "arm"
        )))]
        return Self::Other;
    }

    /// Largest aggregate returned in registers
    ///
    /// `None` means aggregates never go through the stret entry point.
    #[inline]
    pub const fn register_return_limit(self) -> Option<usize> {
        match self {
            Self::X86_64 => Some(16),
            Self::X86 => Some(8),
            Self::Arm => Some(4),
            Self::Aarch64 | Self::Other => None,
        }
    }
}

/// Message-send entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendKind {
    /// `objc_msgSend`
    Send,
    /// `objc_msgSend_stret`: result written through a leading out-pointer
    SendStret,
    /// `objc_msgSend_fpret`: result left on the x87 stack
    SendFpret,
    /// `objc_msgSendSuper`
    SendSuper,
    /// `objc_msgSendSuper_stret`
    SendSuperStret,
}

impl SendKind {
    /// Pick the entry point for a return type on `arch`
    pub fn classify(ret: &NativeType, arch: Arch) -> Self {
        if ret.is_aggregate() && returns_in_memory(ret.size(), arch) {
            return Self::SendStret;
        }
        let fpret = match arch {
            Arch::X86_64 => matches!(ret, NativeType::LongDouble),
            Arch::X86 => ret.is_float(),
            _ => false,
        };
        if fpret {
            Self::SendFpret
        } else {
            Self::Send
        }
    }

    /// Same return convention, lookup starting at the superclass
    #[inline]
    pub fn to_super(self) -> Self {
        match self {
            Self::Send | Self::SendFpret | Self::SendSuper => Self::SendSuper,
            Self::SendStret | Self::SendSuperStret => Self::SendSuperStret,
        }
    }

    #[inline]
    pub fn is_stret(self) -> bool {
        matches!(self, Self::SendStret | Self::SendSuperStret)
    }

    #[inline]
    pub fn is_super(self) -> bool {
        matches!(self, Self::SendSuper | Self::SendSuperStret)
    }

    /// C symbol of the entry point
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Send => "objc_msgSend",
            Self::SendStret => "objc_msgSend_stret",
            Self::SendFpret => "objc_msgSend_fpret",
            Self::SendSuper => "objc_msgSendSuper",
            Self::SendSuperStret => "objc_msgSendSuper_stret",
        }
    }
}

fn returns_in_memory(size: usize, arch: Arch) -> bool {
    match arch {
        // i386 Darwin returns 1, 2, 4 and 8 byte aggregates in registers
        Arch::X86 => !matches!(size, 1 | 2 | 4 | 8),
        _ => arch.register_return_limit().map_or(false, |limit| size > limit),
    }
}

/// libffi call interface for sending `signature` through `kind`
///
/// Stret kinds take the result buffer as a leading pointer argument and
/// return nothing. Super kinds take an `ObjcSuper *` where the receiver
/// would be; both are pointers, so the hidden argument list is unchanged.
pub fn call_interface(kind: SendKind, signature: &MethodSignature) -> Cif {
    let mut args: Vec<Type> = Vec::with_capacity(signature.native_args().len() + 1);
    let ret = if kind.is_stret() {
        args.push(Type::pointer());
        Type::void()
    } else {
        signature.native_return().ffi_type()
    };
    args.extend(signature.native_args().iter().map(NativeType::ffi_type));
    Cif::new(args, ret)
}

/// libffi call interface for calling an implementation directly
///
/// Used by native-callable trampolines, which are entered with the plain
/// C signature (the C ABI handles large struct returns itself).
pub fn implementation_interface(signature: &MethodSignature) -> Cif {
    Cif::new(
        signature.native_args().iter().map(NativeType::ffi_type),
        signature.native_return().ffi_type(),
    )
}
