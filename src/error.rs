use alloc::borrow::Cow;
use core::fmt::{Debug, Display};

use crate::record::RebindStatus;

/// Error types used throughout the `elf_interpose` library.
///
/// Every failure is local and recoverable: operations report an `Error`
/// and, where a record is involved, leave a [`RebindStatus`] on it for
/// diagnostics. Nothing in this crate aborts the process.
#[derive(Debug)]
pub enum Error {
    /// An absent or malformed argument was passed to an operation.
    ///
    /// This covers:
    /// * An empty symbol name
    /// * A symbol name containing an interior NUL byte
    InvalidArgument {
        /// A descriptive message about the rejected argument.
        msg: Cow<'static, str>,
    },

    /// The dynamic symbol lookup could not resolve the symbol, so the
    /// record has no original address to rebind to or from.
    SymbolNotFound {
        /// The symbol that could not be resolved.
        name: Cow<'static, str>,
    },

    /// The record was created with a null replacement address.
    MissingReplacement {
        /// The symbol whose replacement is absent.
        name: Cow<'static, str>,
    },

    /// The rebinding facility reported a nonzero status.
    ///
    /// The raw status is also retained on the record.
    Rebind {
        /// The symbol being rebound.
        name: Cow<'static, str>,
        /// The facility-specific status code.
        status: i32,
    },

    /// A second record with an already registered name was rejected by
    /// [`DuplicateNames::Reject`](crate::registry::DuplicateNames::Reject).
    DuplicateName {
        /// The duplicated symbol name.
        name: Cow<'static, str>,
    },

    /// A process-wide interposer is already installed.
    AlreadyInstalled,

    /// Changing page protection around a GOT slot failed.
    Mprotect {
        /// A descriptive message about the protection change.
        msg: Cow<'static, str>,
        /// The `errno` reported by the system.
        errno: i32,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidArgument { msg } => write!(f, "Invalid argument: {msg}"),
            Error::SymbolNotFound { name } => write!(f, "Symbol not found: {name}"),
            Error::MissingReplacement { name } => {
                write!(f, "Missing replacement address for symbol: {name}")
            }
            Error::Rebind { name, status } => {
                write!(f, "Rebinding of [{name}] failed with status {status}")
            }
            Error::DuplicateName { name } => {
                write!(f, "An interposition for [{name}] is already registered")
            }
            Error::AlreadyInstalled => write!(f, "A process-wide interposer is already installed"),
            Error::Mprotect { msg, errno } => write!(f, "mprotect error: {msg} (errno {errno})"),
        }
    }
}

impl core::error::Error for Error {}

impl Error {
    /// Returns the status this error leaves on a record, if it came from a
    /// hook or unhook attempt.
    pub fn status(&self) -> Option<RebindStatus> {
        match self {
            Error::SymbolNotFound { .. } => Some(RebindStatus::MissingOriginal),
            Error::MissingReplacement { .. } => Some(RebindStatus::MissingReplacement),
            Error::Rebind { status, .. } => Some(RebindStatus::from_code(*status)),
            _ => None,
        }
    }
}

#[cold]
#[inline(never)]
pub(crate) fn invalid_argument(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::InvalidArgument { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn symbol_not_found(name: &str) -> Error {
    Error::SymbolNotFound {
        name: Cow::Owned(name.into()),
    }
}

#[cold]
#[inline(never)]
pub(crate) fn missing_replacement(name: &str) -> Error {
    Error::MissingReplacement {
        name: Cow::Owned(name.into()),
    }
}

#[cold]
#[inline(never)]
pub(crate) fn rebind_error(name: &str, status: i32) -> Error {
    Error::Rebind {
        name: Cow::Owned(name.into()),
        status,
    }
}

#[cold]
#[inline(never)]
pub(crate) fn duplicate_name(name: &str) -> Error {
    Error::DuplicateName {
        name: Cow::Owned(name.into()),
    }
}

#[cold]
#[inline(never)]
#[allow(unused)]
pub(crate) fn mprotect_error(msg: impl Into<Cow<'static, str>>, errno: i32) -> Error {
    Error::Mprotect {
        msg: msg.into(),
        errno,
    }
}
