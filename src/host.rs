//! Host side of the bridge: the [`HostContext`] trait a VM calls back into,
//! and the `extern "C"` trampolines that form the host function table.
//!
//! Every trampoline receives the opaque context pointer the VM was handed,
//! treats it as a registry handle, resolves the handle to the live host
//! context of the execution in flight and forwards the call.  Pointer
//! arguments are read only for the duration of the callback.

use std::os::raw::c_int;
use std::slice;

use tracing::trace;

use crate::ffi_types::{
    FfiAddress, FfiBytes32, FfiHostContext, FfiHostInterface, FfiMessage, FfiResult, FfiTxContext,
    FfiUint256be,
};
use crate::marshal::{message_from_ffi, BufferView, HexBytes};
use crate::registry::{host_contexts, Handle};
use crate::result::make_result;
use crate::types::{
    AccessStatus, Address, Bytes, ExecutionOutput, Log, Message, StorageStatus, TxContext, B256,
};

/// State and services the embedding application exposes to executing code.
///
/// Queries take `&self`; anything that mutates world state or bookkeeping
/// takes `&mut self`.  One context serves exactly one top-level execution
/// and every callback it triggers, all on the executing thread.
pub trait HostContext {
    fn account_exists(&self, address: &Address) -> bool;

    fn get_storage(&self, address: &Address, key: &B256) -> B256;

    /// Writes a slot and reports how the write changed it relative to the
    /// slot's original and current values.
    fn set_storage(&mut self, address: &Address, key: &B256, value: &B256) -> StorageStatus;

    /// Big-endian balance.
    fn get_balance(&self, address: &Address) -> B256;

    fn get_code_size(&self, address: &Address) -> usize;

    fn get_code_hash(&self, address: &Address) -> B256;

    /// Full code of an account.  Empty for accounts without code.
    fn get_code(&self, address: &Address) -> Bytes;

    /// Copies code starting at `offset` into `dest`, returning how many
    /// bytes were written.
    fn copy_code(&self, address: &Address, offset: usize, dest: &mut [u8]) -> usize {
        copy_code_into(&self.get_code(address), offset, dest)
    }

    fn get_tx_context(&self) -> TxContext;

    fn get_block_hash(&self, number: i64) -> B256;

    fn emit_log(&mut self, log: Log);

    /// Performs a sub-call requested by the VM.  May re-enter
    /// [`Vm::execute`](crate::Vm::execute).
    fn call(&mut self, msg: &Message<'_>) -> ExecutionOutput;

    fn access_account(&mut self, address: &Address) -> AccessStatus;

    fn access_storage(&mut self, address: &Address, key: &B256) -> AccessStatus;
}

/// Copies `code[offset..]` into `dest`, as much as fits.  An offset at or
/// past the end copies nothing.
pub fn copy_code_into(code: &[u8], offset: usize, dest: &mut [u8]) -> usize {
    let Some(tail) = code.get(offset..) else {
        return 0;
    };
    let n = tail.len().min(dest.len());
    dest[..n].copy_from_slice(&tail[..n]);
    n
}

// ---------------------------------------------------------------------------
//  Trampolines
// ---------------------------------------------------------------------------

/// Resolves the opaque context pointer.  Panics on a handle that is not live.
///
/// # Safety
/// Must only be called from a host callback of the execution that
/// registered the handle.
unsafe fn host<'a>(context: *mut FfiHostContext) -> &'a mut dyn HostContext {
    let handle = Handle::from_usize(context as usize);
    host_contexts().resolve(handle).as_mut()
}

unsafe extern "C" fn account_exists(context: *mut FfiHostContext, address: *const FfiAddress) -> bool {
    let address = Address::from(*address);
    trace!(%address, "account_exists");
    host(context).account_exists(&address)
}

unsafe extern "C" fn get_storage(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    key: *const FfiBytes32,
) -> FfiBytes32 {
    let address = Address::from(*address);
    let key = B256::from(*key);
    trace!(%address, %key, "get_storage");
    host(context).get_storage(&address, &key).into()
}

unsafe extern "C" fn set_storage(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    key: *const FfiBytes32,
    value: *const FfiBytes32,
) -> c_int {
    let address = Address::from(*address);
    let key = B256::from(*key);
    let value = B256::from(*value);
    trace!(%address, %key, %value, "set_storage");
    host(context).set_storage(&address, &key, &value).as_raw()
}

unsafe extern "C" fn get_balance(context: *mut FfiHostContext, address: *const FfiAddress) -> FfiUint256be {
    let address = Address::from(*address);
    trace!(%address, "get_balance");
    host(context).get_balance(&address).into()
}

unsafe extern "C" fn get_code_size(context: *mut FfiHostContext, address: *const FfiAddress) -> usize {
    let address = Address::from(*address);
    trace!(%address, "get_code_size");
    host(context).get_code_size(&address)
}

unsafe extern "C" fn get_code_hash(context: *mut FfiHostContext, address: *const FfiAddress) -> FfiBytes32 {
    let address = Address::from(*address);
    trace!(%address, "get_code_hash");
    host(context).get_code_hash(&address).into()
}

unsafe extern "C" fn copy_code(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    code_offset: usize,
    buffer_data: *mut u8,
    buffer_size: usize,
) -> usize {
    let address = Address::from(*address);
    trace!(%address, code_offset, buffer_size, "copy_code");
    if buffer_data.is_null() || buffer_size == 0 {
        return 0;
    }
    let dest = slice::from_raw_parts_mut(buffer_data, buffer_size);
    host(context).copy_code(&address, code_offset, dest)
}

unsafe extern "C" fn call(context: *mut FfiHostContext, msg: *const FfiMessage) -> FfiResult {
    let raw = &*msg;
    let Some(msg) = message_from_ffi(raw) else {
        panic!("zvmc bridge: unknown call kind {}", raw.kind);
    };
    trace!(
        kind = ?msg.kind,
        depth = msg.depth,
        gas = msg.gas,
        recipient = %msg.recipient,
        input = %HexBytes(msg.input),
        "call"
    );
    let out = host(context).call(&msg);
    call_result(&out)
}

/// Wire result for a host-served sub-call.  Gas figures and the create
/// address are passed through unchanged whatever the outcome.
pub(crate) fn call_result(out: &ExecutionOutput) -> FfiResult {
    make_result(out.status_code(), out.gas_left, out.gas_refund, &out.output, out.create_address)
}

unsafe extern "C" fn get_tx_context(context: *mut FfiHostContext) -> FfiTxContext {
    trace!("get_tx_context");
    host(context).get_tx_context().into()
}

unsafe extern "C" fn get_block_hash(context: *mut FfiHostContext, number: i64) -> FfiBytes32 {
    trace!(number, "get_block_hash");
    host(context).get_block_hash(number).into()
}

unsafe extern "C" fn emit_log(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    data: *const u8,
    data_size: usize,
    topics: *const FfiBytes32,
    topics_count: usize,
) {
    let address = Address::from(*address);
    let data = Bytes::copy_from_slice(BufferView::new(data, data_size).as_slice());
    let topics: Vec<B256> = if topics.is_null() || topics_count == 0 {
        Vec::new()
    } else {
        slice::from_raw_parts(topics, topics_count).iter().map(|t| B256::from(*t)).collect()
    };
    trace!(%address, topics = topics.len(), data = %HexBytes(&data), "emit_log");
    host(context).emit_log(Log::new_unchecked(address, topics, data));
}

unsafe extern "C" fn access_account(context: *mut FfiHostContext, address: *const FfiAddress) -> c_int {
    let address = Address::from(*address);
    trace!(%address, "access_account");
    host(context).access_account(&address).as_raw()
}

unsafe extern "C" fn access_storage(
    context: *mut FfiHostContext,
    address: *const FfiAddress,
    key: *const FfiBytes32,
) -> c_int {
    let address = Address::from(*address);
    let key = B256::from(*key);
    trace!(%address, %key, "access_storage");
    host(context).access_storage(&address, &key).as_raw()
}

/// Function table handed to every execution.  All entries are populated.
pub static HOST_INTERFACE: FfiHostInterface = FfiHostInterface {
    account_exists: Some(account_exists),
    get_storage: Some(get_storage),
    set_storage: Some(set_storage),
    get_balance: Some(get_balance),
    get_code_size: Some(get_code_size),
    get_code_hash: Some(get_code_hash),
    copy_code: Some(copy_code),
    call: Some(call),
    get_tx_context: Some(get_tx_context),
    get_block_hash: Some(get_block_hash),
    emit_log: Some(emit_log),
    access_account: Some(access_account),
    access_storage: Some(access_storage),
};
