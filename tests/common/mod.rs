//! In-process VM speaking the C ABI, plus a scriptable host.
//!
//! The mock interprets each code byte as one instruction:
//!
//! * `C` calls the host with the rest of the code as input, then stops.
//!   A failed call ends execution with the callee's status and gas.
//! * `L` emits a one-topic log, `S` stores 1 at slot 0 of the recipient.
//! * `T` appends the block number (8 bytes, little endian) to the output.
//! * `H` appends the host context handle (8 bytes, little endian).
//! * `R` reverts, `F` fails; both return the output accumulated so far.
//!
//! Gas is never charged.

#![allow(dead_code, unreachable_pub)]

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use zvmc_bridge::{
    AccessStatus, Address, Bytes, CallKind, Capability, ExecutionOutput, FfiAddress, FfiBytes32,
    FfiHostContext, FfiHostInterface, FfiMessage, FfiResult, FfiVm, HostContext, Log, Message,
    NativeResult, OwnedBuffer, Revision, StatusCode, StorageStatus, TxContext, Vm, ABI_VERSION,
    B256, FLAG_STATIC, SET_OPTION_INVALID_NAME, SET_OPTION_INVALID_VALUE, SET_OPTION_SUCCESS,
};

/// Number of output buffers the mock has freed, across all instances.
pub static OUTPUT_RELEASES: AtomicUsize = AtomicUsize::new(0);

pub const CALLEE: Address = Address::new([0xcc; 20]);

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[repr(C)]
struct MockVm {
    base: FfiVm,
    destroyed: Arc<AtomicUsize>,
    name: CString,
    version: CString,
}

/// Creates a mock instance and counts its destruction in `destroyed`.
pub fn mock_vm(destroyed: Arc<AtomicUsize>) -> Vm {
    mock_vm_with_abi(destroyed, ABI_VERSION).expect("mock VM is valid")
}

pub fn mock_vm_with_abi(
    destroyed: Arc<AtomicUsize>,
    abi_version: c_int,
) -> Result<Vm, zvmc_bridge::LoaderError> {
    let name = CString::new("mockvm").unwrap();
    let version = CString::new("1.2.3").unwrap();
    let vm = Box::new(MockVm {
        base: FfiVm {
            abi_version,
            name: name.as_ptr(),
            version: version.as_ptr(),
            destroy: Some(destroy),
            execute: Some(execute),
            get_capabilities: Some(get_capabilities),
            set_option: Some(set_option),
        },
        destroyed,
        name,
        version,
    });
    unsafe { Vm::from_raw(Box::into_raw(vm) as *mut FfiVm) }
}

unsafe extern "C" fn destroy(vm: *mut FfiVm) {
    let vm = Box::from_raw(vm as *mut MockVm);
    vm.destroyed.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn get_capabilities(_vm: *mut FfiVm) -> u32 {
    Capability::Zvm1.bit() | Capability::Precompiles.bit()
}

unsafe extern "C" fn set_option(_vm: *mut FfiVm, name: *const c_char, value: *const c_char) -> c_int {
    let name = CStr::from_ptr(name).to_str().unwrap_or_default();
    let value = CStr::from_ptr(value).to_str().unwrap_or_default();
    match (name, value) {
        ("verbose", "0" | "1") => SET_OPTION_SUCCESS,
        ("verbose", _) => SET_OPTION_INVALID_VALUE,
        _ => SET_OPTION_INVALID_NAME,
    }
}

unsafe extern "C" fn release_output(result: *const FfiResult) {
    OwnedBuffer::free_raw((*result).output_data as *mut u8);
    OUTPUT_RELEASES.fetch_add(1, Ordering::SeqCst);
}

fn finish(status: StatusCode, gas_left: i64, gas_refund: i64, output: &[u8]) -> FfiResult {
    let mut result = FfiResult::empty(status.0, gas_left, gas_refund);
    if !output.is_empty() {
        let (ptr, len) = OwnedBuffer::copy_from(output).into_raw();
        result.output_data = ptr;
        result.output_size = len;
        result.release = Some(release_output);
    }
    result
}

unsafe extern "C" fn execute(
    _vm: *mut FfiVm,
    host: *const FfiHostInterface,
    context: *mut FfiHostContext,
    _revision: c_int,
    msg: *const FfiMessage,
    code: *const u8,
    code_size: usize,
) -> FfiResult {
    let host = &*host;
    let msg = &*msg;
    let code: &[u8] = if code.is_null() { &[] } else { std::slice::from_raw_parts(code, code_size) };

    let mut output = Vec::new();
    let mut gas_left = msg.gas;
    let mut gas_refund = 0;

    for (pc, op) in code.iter().enumerate() {
        match *op {
            b'C' => {
                let input = &code[pc + 1..];
                let sub = FfiMessage {
                    kind: CallKind::Call.as_raw(),
                    flags: msg.flags & FLAG_STATIC,
                    depth: msg.depth + 1,
                    gas: gas_left,
                    recipient: FfiAddress::from(CALLEE),
                    sender: msg.recipient,
                    input_data: if input.is_empty() { ptr::null() } else { input.as_ptr() },
                    input_size: input.len(),
                    value: FfiBytes32::default(),
                    create2_salt: FfiBytes32::default(),
                    code_address: FfiAddress::from(CALLEE),
                };
                let result = NativeResult::new((host.call.unwrap())(context, &sub));
                output.extend_from_slice(result.output());
                let status = result.status_code();
                if !status.is_success() {
                    return finish(status, result.gas_left(), result.gas_refund(), &output);
                }
                gas_left = result.gas_left();
                gas_refund += result.gas_refund();
                break;
            }
            b'L' => {
                let topic = FfiBytes32 { bytes: [0x11; 32] };
                let data = b"log";
                (host.emit_log.unwrap())(context, &msg.recipient, data.as_ptr(), data.len(), &topic, 1);
            }
            b'S' => {
                let key = FfiBytes32::default();
                let value = FfiBytes32::from(B256::with_last_byte(1));
                (host.set_storage.unwrap())(context, &msg.recipient, &key, &value);
            }
            b'T' => {
                let tx = (host.get_tx_context.unwrap())(context);
                output.extend_from_slice(&tx.block_number.to_le_bytes());
            }
            b'H' => output.extend_from_slice(&(context as usize as u64).to_le_bytes()),
            b'R' => return finish(StatusCode::REVERT, gas_left, gas_refund, &output),
            b'F' => return finish(StatusCode::FAILURE, 0, 0, &output),
            _ => return finish(StatusCode::UNDEFINED_INSTRUCTION, 0, 0, &output),
        }
    }
    finish(StatusCode::SUCCESS, gas_left, gas_refund, &output)
}

/// Reads the handles a script recorded with `H`.
pub fn recorded_handles(output: &[u8]) -> Vec<zvmc_bridge::Handle> {
    output
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            zvmc_bridge::Handle::from_usize(u64::from_le_bytes(raw) as usize)
        })
        .collect()
}

/// What the host does when the VM asks it to perform a call.
pub enum CallBehaviour {
    /// Return a fixed outcome.
    Reply(ExecutionOutput),
    /// Execute the call input as code on the given VM.
    Reenter(Arc<Vm>),
}

pub struct TestHost {
    pub storage: HashMap<(Address, B256), B256>,
    pub logs: Vec<Log>,
    pub calls: Vec<(i32, i64, Address)>,
    pub block_number: i64,
    pub on_call: CallBehaviour,
}

impl TestHost {
    pub fn new(on_call: CallBehaviour) -> Self {
        Self {
            storage: HashMap::new(),
            logs: Vec::new(),
            calls: Vec::new(),
            block_number: 0,
            on_call,
        }
    }

    pub fn replying(reply: ExecutionOutput) -> Self {
        Self::new(CallBehaviour::Reply(reply))
    }

    pub fn reentrant(vm: Arc<Vm>) -> Self {
        Self::new(CallBehaviour::Reenter(vm))
    }
}

impl HostContext for TestHost {
    fn account_exists(&self, _address: &Address) -> bool {
        false
    }

    fn get_storage(&self, address: &Address, key: &B256) -> B256 {
        self.storage.get(&(*address, *key)).copied().unwrap_or_default()
    }

    fn set_storage(&mut self, address: &Address, key: &B256, value: &B256) -> StorageStatus {
        match self.storage.insert((*address, *key), *value) {
            None => StorageStatus::Added,
            Some(_) => StorageStatus::Assigned,
        }
    }

    fn get_balance(&self, _address: &Address) -> B256 {
        B256::ZERO
    }

    fn get_code_size(&self, _address: &Address) -> usize {
        0
    }

    fn get_code_hash(&self, _address: &Address) -> B256 {
        B256::ZERO
    }

    fn get_code(&self, _address: &Address) -> Bytes {
        Bytes::new()
    }

    fn get_tx_context(&self) -> TxContext {
        TxContext { number: self.block_number, ..Default::default() }
    }

    fn get_block_hash(&self, _number: i64) -> B256 {
        B256::ZERO
    }

    fn emit_log(&mut self, log: Log) {
        self.logs.push(log);
    }

    fn call(&mut self, msg: &Message<'_>) -> ExecutionOutput {
        self.calls.push((msg.depth, msg.gas, msg.recipient));
        match &self.on_call {
            CallBehaviour::Reply(reply) => reply.clone(),
            CallBehaviour::Reenter(vm) => {
                let vm = Arc::clone(vm);
                vm.execute(self, Revision::default(), msg, msg.input)
            }
        }
    }

    fn access_account(&mut self, _address: &Address) -> AccessStatus {
        AccessStatus::Cold
    }

    fn access_storage(&mut self, _address: &Address, _key: &B256) -> AccessStatus {
        AccessStatus::Cold
    }
}

pub fn top_level(gas: i64) -> Message<'static> {
    Message::new(CallKind::Call, Address::new([0xaa; 20]), Address::new([0xbb; 20]), &[], gas)
}
