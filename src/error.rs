//! Error types surfaced by the bridge.
//!
//! Protocol violations (an unknown handle, a message kind the ABI does not
//! define) are not represented here: they are bridge or VM bugs and panic.

use std::fmt;
use std::os::raw::c_int;

use crate::types::StatusCode;

/// Non-success outcome of an execution.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The executed code reverted.  Remaining gas is returned to the caller.
    #[error("execution reverted")]
    Revert,
    /// Any other status code reported by the VM, or chosen by a host for a
    /// sub-call.
    #[error("execution failed: {0}")]
    Status(StatusCode),
    /// A failure raised by the host itself while serving a sub-call.
    #[error("host error: {0}")]
    Host(String),
}

impl ExecutionError {
    /// Maps a raw status to an error, `None` meaning success.
    pub fn from_status(code: StatusCode) -> Option<Self> {
        match code {
            StatusCode::SUCCESS => None,
            StatusCode::REVERT => Some(Self::Revert),
            other => Some(Self::Status(other)),
        }
    }

    /// Status code this error is reported as over the ABI.
    ///
    /// A `Status` carrying the success code is not a valid error and is
    /// degraded to the generic failure code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Revert => StatusCode::REVERT,
            Self::Status(StatusCode::SUCCESS) => StatusCode::FAILURE,
            Self::Status(code) => *code,
            Self::Host(_) => StatusCode::INTERNAL_ERROR,
        }
    }

    pub fn is_revert(&self) -> bool {
        self.status_code() == StatusCode::REVERT
    }

    pub fn is_internal(&self) -> bool {
        self.status_code().is_internal()
    }
}

/// `enum zvmc_loader_error_code`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoaderErrorCode(pub c_int);

impl LoaderErrorCode {
    pub const SUCCESS: Self = Self(0);
    pub const CANNOT_OPEN: Self = Self(1);
    pub const SYMBOL_NOT_FOUND: Self = Self(2);
    pub const INVALID_ARGUMENT: Self = Self(3);
    pub const VM_CREATION_FAILURE: Self = Self(4);
    pub const ABI_VERSION_MISMATCH: Self = Self(5);
    pub const INVALID_OPTION_NAME: Self = Self(6);
    pub const INVALID_OPTION_VALUE: Self = Self(7);
    pub const UNSPECIFIED_ERROR: Self = Self(-1);
}

impl fmt::Display for LoaderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure to produce a usable VM instance from a module.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("ZVMC loading error: {message}")]
    Described { code: LoaderErrorCode, message: String },
    /// No message was available, only the loader code.
    #[error("ZVMC loading error {0}")]
    Code(LoaderErrorCode),
}

impl LoaderError {
    pub fn new(code: LoaderErrorCode, message: impl Into<String>) -> Self {
        Self::Described { code, message: message.into() }
    }

    pub fn from_code(code: LoaderErrorCode) -> Self {
        Self::Code(code)
    }

    pub fn code(&self) -> LoaderErrorCode {
        match self {
            Self::Described { code, .. } | Self::Code(code) => *code,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Described { message, .. } => Some(message),
            Self::Code(_) => None,
        }
    }
}

/// Rejection of a `set_option` call by the VM.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SetOptionError {
    #[error("zvmc: option '{0}' not accepted")]
    InvalidName(String),
    #[error("zvmc: option '{0}' has invalid value")]
    InvalidValue(String),
}
