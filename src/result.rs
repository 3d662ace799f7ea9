//! Ownership of `zvmc_result` payloads.
//!
//! Whoever produces a result may attach a release hook that frees its output
//! buffer.  The receiving side copies the payload into host memory and then
//! invokes the hook exactly once, for every status code.  A null hook means
//! there is nothing to free.

use tracing::trace;

use crate::error::ExecutionError;
use crate::ffi_types::{FfiAddress, FfiResult};
use crate::marshal::{BufferView, OwnedBuffer};
use crate::types::{Address, Bytes, ExecutionOutput, StatusCode};

/// A result handed over by native code, released on drop.
#[derive(Debug)]
pub struct NativeResult {
    raw: FfiResult,
    released: bool,
}

impl NativeResult {
    /// Takes ownership of a result.
    ///
    /// # Safety
    /// `raw` must not have been released yet, and its output pointer must
    /// stay valid until its release hook runs.
    pub unsafe fn new(raw: FfiResult) -> Self {
        Self { raw, released: false }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode(self.raw.status_code)
    }

    pub fn gas_left(&self) -> i64 {
        self.raw.gas_left
    }

    pub fn gas_refund(&self) -> i64 {
        self.raw.gas_refund
    }

    pub fn create_address(&self) -> Address {
        self.raw.create_address.into()
    }

    /// Borrowed output.  Empty once released.
    pub fn output(&self) -> &[u8] {
        if self.released {
            return &[];
        }
        // SAFETY: guaranteed valid until release by the constructor contract.
        unsafe { BufferView::new(self.raw.output_data, self.raw.output_size).as_slice() }
    }

    /// Runs the release hook if there is one.  Later calls do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(release) = self.raw.release {
            trace!(status = self.raw.status_code, size = self.raw.output_size, "releasing result");
            // SAFETY: first and only invocation for this result.
            unsafe { release(&self.raw) };
        }
    }

    /// Copies everything out into host memory, then releases the native
    /// payload.
    pub fn into_output(mut self) -> ExecutionOutput {
        let output = ExecutionOutput {
            output: Bytes::copy_from_slice(self.output()),
            gas_left: self.raw.gas_left,
            gas_refund: self.raw.gas_refund,
            create_address: self.create_address(),
            error: ExecutionError::from_status(self.status_code()),
        };
        self.release();
        output
    }
}

impl Drop for NativeResult {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builds a wire result whose output lives in a libc buffer freed by the
/// attached release hook.  Empty output gets no buffer and no hook.
pub fn make_result(
    status: StatusCode,
    gas_left: i64,
    gas_refund: i64,
    output: &[u8],
    create_address: Address,
) -> FfiResult {
    let mut result = FfiResult::empty(status.0, gas_left, gas_refund);
    result.create_address = FfiAddress::from(create_address);
    if !output.is_empty() {
        let (ptr, len) = OwnedBuffer::copy_from(output).into_raw();
        result.output_data = ptr;
        result.output_size = len;
        result.release = Some(release_owned_output);
    }
    result
}

unsafe extern "C" fn release_owned_output(result: *const FfiResult) {
    if let Some(result) = result.as_ref() {
        OwnedBuffer::free_raw(result.output_data as *mut u8);
    }
}
