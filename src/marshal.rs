//! Conversions between semantic values and their wire representation.
//!
//! Fixed-size values are copied byte for byte.  Words that carry big-endian
//! integers (gas price, value, base fee, ...) are already big-endian on both
//! sides, so no field is ever byte-swapped.

use std::alloc::{handle_alloc_error, Layout};
use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::{ptr, slice};

use crate::ffi_types::{FfiAddress, FfiBytes32, FfiMessage, FfiTxContext, FLAG_STATIC};
use crate::types::{Address, CallKind, Message, TxContext, B256};

// ---------------------------------------------------------------------------
//  Fixed-size values
// ---------------------------------------------------------------------------

impl From<Address> for FfiAddress {
    fn from(addr: Address) -> Self {
        let mut out = FfiAddress { bytes: [0u8; 20] };
        out.bytes.copy_from_slice(addr.as_slice());
        out
    }
}

impl From<FfiAddress> for Address {
    fn from(addr: FfiAddress) -> Self {
        Address::from(addr.bytes)
    }
}

impl From<B256> for FfiBytes32 {
    fn from(h: B256) -> Self {
        FfiBytes32 { bytes: h.0 }
    }
}

impl From<FfiBytes32> for B256 {
    fn from(h: FfiBytes32) -> Self {
        B256::from(h.bytes)
    }
}

impl From<TxContext> for FfiTxContext {
    fn from(tx: TxContext) -> Self {
        FfiTxContext {
            tx_gas_price: tx.gas_price.into(),
            tx_origin: tx.origin.into(),
            block_coinbase: tx.coinbase.into(),
            block_number: tx.number,
            block_timestamp: tx.timestamp,
            block_gas_limit: tx.gas_limit,
            block_prev_randao: tx.prev_randao.into(),
            chain_id: tx.chain_id.into(),
            block_base_fee: tx.base_fee.into(),
        }
    }
}

impl From<FfiTxContext> for TxContext {
    fn from(tx: FfiTxContext) -> Self {
        TxContext {
            gas_price: tx.tx_gas_price.into(),
            origin: tx.tx_origin.into(),
            coinbase: tx.block_coinbase.into(),
            number: tx.block_number,
            timestamp: tx.block_timestamp,
            gas_limit: tx.block_gas_limit,
            prev_randao: tx.block_prev_randao.into(),
            chain_id: tx.chain_id.into(),
            base_fee: tx.block_base_fee.into(),
        }
    }
}

// ---------------------------------------------------------------------------
//  Messages
// ---------------------------------------------------------------------------

impl From<&Message<'_>> for FfiMessage {
    fn from(msg: &Message<'_>) -> Self {
        FfiMessage {
            kind: msg.kind.as_raw(),
            flags: if msg.is_static { FLAG_STATIC } else { 0 },
            depth: msg.depth,
            gas: msg.gas,
            recipient: msg.recipient.into(),
            sender: msg.sender.into(),
            input_data: bytes_ptr(msg.input),
            input_size: msg.input.len(),
            value: msg.value.into(),
            create2_salt: msg.create2_salt.into(),
            code_address: msg.code_address.into(),
        }
    }
}

/// Wire message for a top-level execution.  Salt and code address are only
/// meaningful on sub-calls the VM builds itself, so they are sent as zero.
pub fn top_level_message(msg: &Message<'_>) -> FfiMessage {
    FfiMessage {
        create2_salt: FfiBytes32::default(),
        code_address: FfiAddress::default(),
        ..FfiMessage::from(msg)
    }
}

/// Reads a wire message.  Returns `None` when `kind` is not a call kind the
/// ABI defines.
///
/// # Safety
/// `input_data` must be null or point to `input_size` readable bytes that
/// stay valid while `msg` is borrowed.
pub unsafe fn message_from_ffi(msg: &FfiMessage) -> Option<Message<'_>> {
    let kind = CallKind::from_raw(msg.kind)?;
    Some(Message {
        kind,
        is_static: msg.flags & FLAG_STATIC != 0,
        depth: msg.depth,
        gas: msg.gas,
        recipient: msg.recipient.into(),
        sender: msg.sender.into(),
        input: BufferView::new(msg.input_data, msg.input_size).as_slice(),
        value: msg.value.into(),
        create2_salt: msg.create2_salt.into(),
        code_address: msg.code_address.into(),
    })
}

// ---------------------------------------------------------------------------
//  Buffers
// ---------------------------------------------------------------------------

/// Pointer for handing a slice to native code: null when empty.
pub fn bytes_ptr(bytes: &[u8]) -> *const u8 {
    if bytes.is_empty() {
        ptr::null()
    } else {
        bytes.as_ptr()
    }
}

/// Read-only view over memory owned by the other side of the boundary.
///
/// Only valid for the duration of the native call that handed out the
/// pointer; copy the bytes before returning if they are needed later.
#[derive(Clone, Copy, Debug)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
}

impl<'a> BufferView<'a> {
    /// # Safety
    /// `data` must be null or point to `len` readable bytes valid for `'a`.
    pub unsafe fn new(data: *const u8, len: usize) -> Self {
        let bytes = if data.is_null() || len == 0 {
            &[][..]
        } else {
            slice::from_raw_parts(data, len)
        };
        Self { bytes }
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }
}

impl Deref for BufferView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

/// A libc-allocated copy of host bytes that native code may hold on to.
///
/// Freed on drop unless ownership is surrendered with
/// [`into_raw`](OwnedBuffer::into_raw), after which whoever holds the pointer
/// must pass it to [`OwnedBuffer::free_raw`] exactly once.
#[derive(Debug)]
pub struct OwnedBuffer {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the buffer is uniquely owned plain memory.
unsafe impl Send for OwnedBuffer {}

impl OwnedBuffer {
    pub fn copy_from(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self { ptr: ptr::null_mut(), len: 0 };
        }
        // SAFETY: non-zero size; the copy stays within the fresh allocation.
        unsafe {
            let ptr = libc::malloc(bytes.len()) as *mut u8;
            if ptr.is_null() {
                handle_alloc_error(Layout::array::<u8>(bytes.len()).unwrap_or(Layout::new::<u8>()));
            }
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
            Self { ptr, len: bytes.len() }
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe our own live allocation, or are null/0.
        unsafe { BufferView::new(self.ptr, self.len).as_slice() }
    }

    /// Frees the allocation.  Calling it again is a no-op.
    pub fn release(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: allocated by libc::malloc in copy_from and not yet freed.
            unsafe { Self::free_raw(self.ptr) };
            self.ptr = ptr::null_mut();
            self.len = 0;
        }
    }

    /// Hands the allocation over to the caller.
    pub fn into_raw(self) -> (*mut u8, usize) {
        let me = ManuallyDrop::new(self);
        (me.ptr, me.len)
    }

    /// # Safety
    /// `ptr` must come from [`into_raw`](OwnedBuffer::into_raw) (or be null)
    /// and must not have been freed already.
    pub unsafe fn free_raw(ptr: *mut u8) {
        if !ptr.is_null() {
            libc::free(ptr as *mut c_void);
        }
    }
}

impl Drop for OwnedBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
//  Diagnostics
// ---------------------------------------------------------------------------

/// `0x`-prefixed hex rendering of a byte string, formatted only when
/// displayed, so it is free for disabled log levels.
#[derive(Clone, Copy)]
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
