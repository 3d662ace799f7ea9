//! Semantic types exchanged between the bridge and the embedding host.
//!
//! Fixed-size values reuse the REVM primitives (`Address`, `B256`) so hosts
//! built on REVM state can pass their values straight through.  Raw ABI
//! numbers are kept behind small newtypes or enums with explicit
//! discriminants; none of them is ever renumbered.

use std::fmt;
use std::os::raw::c_int;

pub use revm::primitives::{Address, Bytes, Log, B256};

use crate::error::ExecutionError;

/// VM status code as reported over the ABI.
///
/// Transparent over the raw value: codes unknown to this crate pass through
/// untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(pub c_int);

impl StatusCode {
    pub const SUCCESS: Self = Self(0);
    pub const FAILURE: Self = Self(1);
    pub const REVERT: Self = Self(2);
    pub const OUT_OF_GAS: Self = Self(3);
    pub const INVALID_INSTRUCTION: Self = Self(4);
    pub const UNDEFINED_INSTRUCTION: Self = Self(5);
    pub const STACK_OVERFLOW: Self = Self(6);
    pub const STACK_UNDERFLOW: Self = Self(7);
    pub const BAD_JUMP_DESTINATION: Self = Self(8);
    pub const INVALID_MEMORY_ACCESS: Self = Self(9);
    pub const CALL_DEPTH_EXCEEDED: Self = Self(10);
    pub const STATIC_MODE_VIOLATION: Self = Self(11);
    pub const PRECOMPILE_FAILURE: Self = Self(12);
    pub const CONTRACT_VALIDATION_FAILURE: Self = Self(13);
    pub const ARGUMENT_OUT_OF_RANGE: Self = Self(14);
    pub const WASM_UNREACHABLE_INSTRUCTION: Self = Self(15);
    pub const WASM_TRAP: Self = Self(16);
    pub const INSUFFICIENT_BALANCE: Self = Self(17);
    pub const INTERNAL_ERROR: Self = Self(-1);
    pub const REJECTED: Self = Self(-2);
    pub const OUT_OF_MEMORY: Self = Self(-3);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Negative codes are reserved for failures originating outside the
    /// executed code (VM internals, host, allocation).
    pub fn is_internal(self) -> bool {
        self.0 < 0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SUCCESS => "success",
            Self::FAILURE => "failure",
            Self::REVERT => "revert",
            Self::OUT_OF_GAS => "out of gas",
            Self::INVALID_INSTRUCTION => "invalid instruction",
            Self::UNDEFINED_INSTRUCTION => "undefined instruction",
            Self::STACK_OVERFLOW => "stack overflow",
            Self::STACK_UNDERFLOW => "stack underflow",
            Self::BAD_JUMP_DESTINATION => "bad jump destination",
            Self::INVALID_MEMORY_ACCESS => "invalid memory access",
            Self::CALL_DEPTH_EXCEEDED => "call depth exceeded",
            Self::STATIC_MODE_VIOLATION => "static mode violation",
            Self::PRECOMPILE_FAILURE => "precompile failure",
            Self::CONTRACT_VALIDATION_FAILURE => "contract validation failure",
            Self::ARGUMENT_OUT_OF_RANGE => "argument out of range",
            Self::WASM_UNREACHABLE_INSTRUCTION => "wasm unreachable instruction",
            Self::WASM_TRAP => "wasm trap",
            Self::INSUFFICIENT_BALANCE => "insufficient balance",
            Self::INTERNAL_ERROR => "internal error",
            Self::REJECTED => "rejected",
            Self::OUT_OF_MEMORY => "out of memory",
            _ => "<unknown>",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.0)
    }
}

/// Kind of call carried by a message.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Call = 0,
    DelegateCall = 1,
    Create = 3,
    Create2 = 4,
}

impl CallKind {
    pub fn as_raw(self) -> c_int {
        self as c_int
    }

    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            0 => Some(Self::Call),
            1 => Some(Self::DelegateCall),
            3 => Some(Self::Create),
            4 => Some(Self::Create2),
            _ => None,
        }
    }
}

/// Warm/cold classification used for access-list gas pricing.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessStatus {
    Cold = 0,
    Warm = 1,
}

impl AccessStatus {
    pub fn as_raw(self) -> c_int {
        self as c_int
    }
}

/// Effect of a storage write, computed by the host against the original
/// and current slot values.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageStatus {
    /// X -> X, or a write that does not fall into any other category.
    Assigned = 0,
    /// 0 -> 0 -> Z
    Added = 1,
    /// X -> X -> 0
    Deleted = 2,
    /// X -> X -> Z
    Modified = 3,
    /// X -> 0 -> Z
    DeletedAdded = 4,
    /// X -> Y -> 0
    ModifiedDeleted = 5,
    /// X -> 0 -> X
    DeletedRestored = 6,
    /// 0 -> Y -> 0
    AddedDeleted = 7,
    /// X -> Y -> X
    ModifiedRestored = 8,
}

impl StorageStatus {
    pub fn as_raw(self) -> c_int {
        self as c_int
    }
}

/// Execution semantics version handed to the VM.  Forwarded verbatim;
/// compatibility is negotiated between the loader and the VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Revision(pub c_int);

impl Revision {
    pub const SHANGHAI: Self = Self(0);
    pub const MAX: Self = Self::SHANGHAI;
    pub const LATEST_STABLE: Self = Self::SHANGHAI;
}

impl Default for Revision {
    fn default() -> Self {
        Self::LATEST_STABLE
    }
}

/// Execution models a VM instance can advertise.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Zvm1 = 1 << 0,
    Zwasm = 1 << 1,
    Precompiles = 1 << 2,
}

impl Capability {
    pub fn bit(self) -> u32 {
        self as u32
    }
}

/// Transaction and block information, fixed for one top-level execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxContext {
    /// Big-endian integer.
    pub gas_price: B256,
    pub origin: Address,
    pub coinbase: Address,
    pub number: i64,
    pub timestamp: i64,
    pub gas_limit: i64,
    pub prev_randao: B256,
    /// Big-endian integer.
    pub chain_id: B256,
    /// Big-endian integer.
    pub base_fee: B256,
}

/// A call request: either the top-level execution or a sub-call the VM
/// asked the host to perform.
///
/// `input` borrows memory owned by whoever built the message and is only
/// valid for the duration of the call that received it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Message<'a> {
    pub kind: CallKind,
    pub is_static: bool,
    pub depth: i32,
    pub gas: i64,
    pub recipient: Address,
    pub sender: Address,
    pub input: &'a [u8],
    /// Big-endian integer.
    pub value: B256,
    /// Only populated for `Create2` sub-calls.
    pub create2_salt: B256,
    /// Only populated for sub-calls whose code lives at another address.
    pub code_address: Address,
}

impl<'a> Message<'a> {
    /// A depth-0 message with zero value, salt and code address.
    pub fn new(
        kind: CallKind,
        recipient: Address,
        sender: Address,
        input: &'a [u8],
        gas: i64,
    ) -> Self {
        Self {
            kind,
            is_static: false,
            depth: 0,
            gas,
            recipient,
            sender,
            input,
            value: B256::ZERO,
            create2_salt: B256::ZERO,
            code_address: Address::ZERO,
        }
    }
}

/// Outcome of an execution, produced by [`Vm::execute`](crate::Vm::execute)
/// and by [`HostContext::call`](crate::HostContext::call).
///
/// `gas_left` and `gas_refund` are meaningful for every outcome, including
/// reverts.  `create_address` is only meaningful for `Create`/`Create2`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub output: Bytes,
    pub gas_left: i64,
    pub gas_refund: i64,
    pub create_address: Address,
    pub error: Option<ExecutionError>,
}

impl ExecutionOutput {
    pub fn success(output: Bytes, gas_left: i64) -> Self {
        Self { output, gas_left, ..Default::default() }
    }

    pub fn failure(error: ExecutionError, gas_left: i64, gas_refund: i64) -> Self {
        Self { gas_left, gas_refund, error: Some(error), ..Default::default() }
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.as_ref().map_or(StatusCode::SUCCESS, ExecutionError::status_code)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_names() {
        assert_eq!(StatusCode::SUCCESS.as_str(), "success");
        assert_eq!(StatusCode::REVERT.as_str(), "revert");
        assert_eq!(StatusCode::OUT_OF_MEMORY.as_str(), "out of memory");
        assert_eq!(StatusCode(99).as_str(), "<unknown>");
        assert_eq!(StatusCode::OUT_OF_GAS.to_string(), "out of gas (3)");
    }

    #[test]
    fn negative_codes_are_internal() {
        assert!(StatusCode::INTERNAL_ERROR.is_internal());
        assert!(StatusCode::REJECTED.is_internal());
        assert!(!StatusCode::REVERT.is_internal());
        assert!(!StatusCode::SUCCESS.is_internal());
    }

    #[test]
    fn call_kind_raw_values() {
        for kind in [CallKind::Call, CallKind::DelegateCall, CallKind::Create, CallKind::Create2] {
            assert_eq!(CallKind::from_raw(kind.as_raw()), Some(kind));
        }
        assert_eq!(CallKind::from_raw(2), None);
    }

    #[test]
    fn storage_status_discriminants() {
        assert_eq!(StorageStatus::Assigned.as_raw(), 0);
        assert_eq!(StorageStatus::Modified.as_raw(), 3);
        assert_eq!(StorageStatus::ModifiedRestored.as_raw(), 8);
        assert_eq!(AccessStatus::Warm.as_raw(), 1);
    }

    #[test]
    fn output_status() {
        let ok = ExecutionOutput::success(Bytes::from_static(b"hi"), 7);
        assert_eq!(ok.status_code(), StatusCode::SUCCESS);
        assert!(ok.is_success());

        let reverted = ExecutionOutput::failure(ExecutionError::Revert, 5, 1);
        assert_eq!(reverted.status_code(), StatusCode::REVERT);
        assert_eq!(reverted.gas_left, 5);
        assert!(reverted.error.unwrap().is_revert());
    }
}
