//! Exit codes and errors.
//!
//! The reference implementation returns small negative integers
//! (`-ENOMEM`, `-EINVAL`, `-EBUSY`, ...). We keep the same three-way
//! split but surface it as a proper `enum` + `Result`, the way the
//! teacher's `TreeError`/`DriverError` do it rather than pulling in
//! `thiserror` or `anyhow` (neither appears anywhere in its dependency
//! tree).

use core::fmt;

/// Coarse exit-code classification, mirroring the reference
/// implementation's negative return codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// Patch, edge or rollback-buffer allocation failed.
    NoMem,
    /// Caller violated a contract: depending on an INFLIGHT patch,
    /// a zero-length or out-of-bounds BYTE range, re-satisfying an
    /// already-satisfied patch, etc.
    Invalid,
    /// The target of an overlap is currently rolled back; retry once
    /// its rollback window closes.
    Busy,
}

/// An engine error: a [`Code`] plus a short static description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub code: Code,
    pub reason: &'static str,
}

impl Error {
    pub const fn new(code: Code, reason: &'static str) -> Self {
        Self { code, reason }
    }

    pub const fn no_mem(reason: &'static str) -> Self {
        Self::new(Code::NoMem, reason)
    }

    pub const fn invalid(reason: &'static str) -> Self {
        Self::new(Code::Invalid, reason)
    }

    pub const fn busy(reason: &'static str) -> Self {
        Self::new(Code::Busy, reason)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.code {
            Code::NoMem => "ENOMEM",
            Code::Invalid => "EINVAL",
            Code::Busy => "EBUSY",
        };
        write!(f, "{kind}: {}", self.reason)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

pub type FsResult<T> = Result<T, Error>;
