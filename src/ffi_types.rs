//! FFI-friendly representations of the ZVMC ABI structures.
//!
//! These types are the only "wire" format shared between the native VM and
//! the Rust host.  They MUST remain stable: **do not** change their memory
//! layout without bumping [`ABI_VERSION`] in lockstep with the C headers.
//!
//! All structs use `#[repr(C)]` and plain value fields so that they can cross
//! the FFI boundary without undefined behaviour.  C enums are carried as raw
//! `i32`/`u32` fields: a VM may hand back values this crate does not know
//! about, and materialising those as Rust enums would be UB.

use std::os::raw::{c_char, c_int};

/// ABI version this crate was written against.  The loader refuses modules
/// reporting anything else.
pub const ABI_VERSION: c_int = 10;

/// `ZVMC_STATIC` message flag.
pub const FLAG_STATIC: u32 = 1;

/// 160-bit account address (20 raw bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FfiAddress {
    pub bytes: [u8; 20],
}

/// 256-bit word: a hash, a storage key/value, or a big-endian integer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FfiBytes32 {
    pub bytes: [u8; 32],
}

/// Big-endian 256-bit unsigned integer.  Same layout as [`FfiBytes32`].
pub type FfiUint256be = FfiBytes32;

/// Opaque host context.  The bridge never passes a real pointer here: the
/// value is a registry handle cast to a pointer.
#[repr(C)]
pub struct FfiHostContext {
    _private: [u8; 0],
}

/// `struct zvmc_message`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FfiMessage {
    pub kind: c_int,
    pub flags: u32,
    pub depth: i32,
    pub gas: i64,
    pub recipient: FfiAddress,
    pub sender: FfiAddress,
    pub input_data: *const u8,
    pub input_size: usize,
    pub value: FfiUint256be,
    pub create2_salt: FfiBytes32,
    pub code_address: FfiAddress,
}

/// Release hook attached to a result by whoever allocated its payload.
pub type ReleaseResultFn = unsafe extern "C" fn(result: *const FfiResult);

/// `struct zvmc_result`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FfiResult {
    pub status_code: c_int,
    pub gas_left: i64,
    pub gas_refund: i64,
    pub output_data: *const u8,
    pub output_size: usize,
    pub release: Option<ReleaseResultFn>,
    pub create_address: FfiAddress,
    /// Reserved scratch space the result's owner may use for its own data.
    pub padding: [u8; 4],
}

impl FfiResult {
    /// A result with no output and no release hook.
    pub fn empty(status_code: c_int, gas_left: i64, gas_refund: i64) -> Self {
        Self {
            status_code,
            gas_left,
            gas_refund,
            output_data: std::ptr::null(),
            output_size: 0,
            release: None,
            create_address: FfiAddress::default(),
            padding: [0u8; 4],
        }
    }
}

/// `struct zvmc_tx_context`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FfiTxContext {
    pub tx_gas_price: FfiUint256be,
    pub tx_origin: FfiAddress,
    pub block_coinbase: FfiAddress,
    pub block_number: i64,
    pub block_timestamp: i64,
    pub block_gas_limit: i64,
    pub block_prev_randao: FfiBytes32,
    pub chain_id: FfiUint256be,
    pub block_base_fee: FfiUint256be,
}

// ---------------------------------------------------------------------------
//  Host interface function table
// ---------------------------------------------------------------------------

pub type AccountExistsFn =
    unsafe extern "C" fn(context: *mut FfiHostContext, address: *const FfiAddress) -> bool;
pub type GetStorageFn = unsafe extern "C" fn(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    key: *const FfiBytes32,
) -> FfiBytes32;
pub type SetStorageFn = unsafe extern "C" fn(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    key: *const FfiBytes32,
    value: *const FfiBytes32,
) -> c_int;
pub type GetBalanceFn =
    unsafe extern "C" fn(context: *mut FfiHostContext, address: *const FfiAddress) -> FfiUint256be;
pub type GetCodeSizeFn =
    unsafe extern "C" fn(context: *mut FfiHostContext, address: *const FfiAddress) -> usize;
pub type GetCodeHashFn =
    unsafe extern "C" fn(context: *mut FfiHostContext, address: *const FfiAddress) -> FfiBytes32;
pub type CopyCodeFn = unsafe extern "C" fn(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    code_offset: usize,
    buffer_data: *mut u8,
    buffer_size: usize,
) -> usize;
pub type CallFn =
    unsafe extern "C" fn(context: *mut FfiHostContext, msg: *const FfiMessage) -> FfiResult;
pub type GetTxContextFn = unsafe extern "C" fn(context: *mut FfiHostContext) -> FfiTxContext;
pub type GetBlockHashFn =
    unsafe extern "C" fn(context: *mut FfiHostContext, number: i64) -> FfiBytes32;
pub type EmitLogFn = unsafe extern "C" fn(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    data: *const u8,
    data_size: usize,
    topics: *const FfiBytes32,
    topics_count: usize,
);
pub type AccessAccountFn =
    unsafe extern "C" fn(context: *mut FfiHostContext, address: *const FfiAddress) -> c_int;
pub type AccessStorageFn = unsafe extern "C" fn(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    key: *const FfiBytes32,
) -> c_int;

/// `struct zvmc_host_interface`.  Field order is part of the ABI.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiHostInterface {
    pub account_exists: Option<AccountExistsFn>,
    pub get_storage: Option<GetStorageFn>,
    pub set_storage: Option<SetStorageFn>,
    pub get_balance: Option<GetBalanceFn>,
    pub get_code_size: Option<GetCodeSizeFn>,
    pub get_code_hash: Option<GetCodeHashFn>,
    pub copy_code: Option<CopyCodeFn>,
    pub call: Option<CallFn>,
    pub get_tx_context: Option<GetTxContextFn>,
    pub get_block_hash: Option<GetBlockHashFn>,
    pub emit_log: Option<EmitLogFn>,
    pub access_account: Option<AccessAccountFn>,
    pub access_storage: Option<AccessStorageFn>,
}

// ---------------------------------------------------------------------------
//  VM instance
// ---------------------------------------------------------------------------

pub type DestroyFn = unsafe extern "C" fn(vm: *mut FfiVm);
pub type ExecuteFn = unsafe extern "C" fn(
    vm: *mut FfiVm,
    host: *const FfiHostInterface,
    context: *mut FfiHostContext,
    revision: c_int,
    msg: *const FfiMessage,
    code: *const u8,
    code_size: usize,
) -> FfiResult;
pub type GetCapabilitiesFn = unsafe extern "C" fn(vm: *mut FfiVm) -> u32;
pub type SetOptionFn =
    unsafe extern "C" fn(vm: *mut FfiVm, name: *const c_char, value: *const c_char) -> c_int;

/// Symbol exported by a VM module to create an instance.
pub type CreateFn = unsafe extern "C" fn() -> *mut FfiVm;

/// `struct zvmc_vm`.  VMs usually embed this as the first member of a larger
/// private struct, so only ever handle it behind a pointer.
#[repr(C)]
pub struct FfiVm {
    pub abi_version: c_int,
    pub name: *const c_char,
    pub version: *const c_char,
    pub destroy: Option<DestroyFn>,
    pub execute: Option<ExecuteFn>,
    pub get_capabilities: Option<GetCapabilitiesFn>,
    pub set_option: Option<SetOptionFn>,
}

/// `enum zvmc_set_option_result`.
pub const SET_OPTION_SUCCESS: c_int = 0;
pub const SET_OPTION_INVALID_NAME: c_int = 1;
pub const SET_OPTION_INVALID_VALUE: c_int = 2;

// ---------------------------------------------------------------------------
//  Layout assertions
// ---------------------------------------------------------------------------
