//! A loaded VM instance and the execution entry point.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::ops::Deref;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr::NonNull;

use libloading::Library;
use tracing::{debug, warn};

use crate::config::VmConfig;
use crate::error::{LoaderError, LoaderErrorCode, SetOptionError};
use crate::ffi_types::{
    ExecuteFn, FfiHostContext, FfiVm, SET_OPTION_INVALID_NAME, SET_OPTION_INVALID_VALUE,
    SET_OPTION_SUCCESS,
};
use crate::host::{HostContext, HOST_INTERFACE};
use crate::loader::{check_instance, load_module};
use crate::marshal::{bytes_ptr, top_level_message};
use crate::registry::{host_contexts, ContextPtr};
use crate::result::NativeResult;
use crate::types::{Capability, ExecutionOutput, Message, Revision};

/// Handle to a native VM instance.
///
/// The instance is destroyed when the handle is dropped (or passed to
/// [`destroy`](Vm::destroy)), before the module it came from is unloaded.
pub struct Vm {
    instance: NonNull<FfiVm>,
    execute: ExecuteFn,
    _library: Option<Library>,
}

// SAFETY: an instance may be moved to and used from another thread, one
// thread at a time.  Shared use goes through `SharedVm`.
unsafe impl Send for Vm {}

/// A [`Vm`] that may execute on several threads at once.
///
/// Obtained from [`Vm::into_shared`], which is where the VM's support for
/// concurrent execution is asserted.
#[derive(Debug)]
pub struct SharedVm(Vm);

// SAFETY: `into_shared` requires the VM to support concurrent `execute`, the
// only native entry point reachable through `&Vm`.
unsafe impl Sync for SharedVm {}

impl Deref for SharedVm {
    type Target = Vm;

    fn deref(&self) -> &Vm {
        &self.0
    }
}

impl Vm {
    /// Loads a VM module from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let module = load_module(path.as_ref())?;
        Ok(Self { instance: module.instance, execute: module.execute, _library: Some(module.library) })
    }

    /// Loads the module named by `config` and applies its options in order.
    pub fn load_and_configure(config: &VmConfig) -> Result<Self, LoaderError> {
        let mut vm = Self::load(config.path())?;
        vm.configure(config.options())?;
        Ok(vm)
    }

    /// Wraps an instance created by a statically linked module.
    ///
    /// # Safety
    /// `raw` must be null or a live instance whose ownership passes to the
    /// returned handle.  The handle is `Send`, so the instance must tolerate
    /// being driven from a thread other than the one that created it.
    pub unsafe fn from_raw(raw: *mut FfiVm) -> Result<Self, LoaderError> {
        let (instance, execute) = check_instance(raw, "<static>")?;
        Ok(Self { instance, execute, _library: None })
    }

    /// Applies options in order, stopping at the first rejection.
    pub fn configure(&mut self, options: &[(String, String)]) -> Result<(), LoaderError> {
        for (name, value) in options {
            self.set_option(name, value).map_err(|e| {
                let code = match e {
                    SetOptionError::InvalidName(_) => LoaderErrorCode::INVALID_OPTION_NAME,
                    SetOptionError::InvalidValue(_) => LoaderErrorCode::INVALID_OPTION_VALUE,
                };
                LoaderError::new(code, format!("{} ({name}={value})", e))
            })?;
        }
        Ok(())
    }

    /// Allows `execute` to run on several threads at once.
    ///
    /// # Safety
    /// The VM must support concurrent calls to its `execute` entry point on
    /// the same instance.
    pub unsafe fn into_shared(self) -> SharedVm {
        SharedVm(self)
    }

    /// Releases the native instance.
    pub fn destroy(self) {
        drop(self);
    }

    fn raw(&self) -> &FfiVm {
        // SAFETY: the instance stays live until drop.
        unsafe { self.instance.as_ref() }
    }

    pub fn abi_version(&self) -> i32 {
        self.raw().abi_version
    }

    /// Invalid UTF-8 in the module's name is replaced, not dropped.
    pub fn name(&self) -> Cow<'_, str> {
        // SAFETY: metadata strings live as long as the instance.
        unsafe { c_str(self.raw().name) }
    }

    pub fn version(&self) -> Cow<'_, str> {
        // SAFETY: as for `name`.
        unsafe { c_str(self.raw().version) }
    }

    /// Capability bitmask.  A VM without the query reports none.
    pub fn capabilities(&self) -> u32 {
        match self.raw().get_capabilities {
            // SAFETY: live instance.
            Some(get) => unsafe { get(self.instance.as_ptr()) },
            None => 0,
        }
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities() & capability.bit() != 0
    }

    /// Forwards an option to the VM.  Names and values are not interpreted
    /// here.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), SetOptionError> {
        let Some(set) = self.raw().set_option else {
            warn!(vm = %self.name(), option = name, "VM does not accept options");
            return Err(SetOptionError::InvalidName(name.to_owned()));
        };
        let c_name = CString::new(name).map_err(|_| SetOptionError::InvalidName(name.to_owned()))?;
        let c_value = CString::new(value).map_err(|_| SetOptionError::InvalidValue(name.to_owned()))?;

        // SAFETY: live instance; both strings outlive the call.
        let rc = unsafe { set(self.instance.as_ptr(), c_name.as_ptr(), c_value.as_ptr()) };
        match rc {
            SET_OPTION_SUCCESS => Ok(()),
            SET_OPTION_INVALID_VALUE => {
                warn!(option = name, value, "option value rejected");
                Err(SetOptionError::InvalidValue(name.to_owned()))
            }
            other => {
                if other != SET_OPTION_INVALID_NAME {
                    warn!(option = name, code = other, "unknown set_option result");
                }
                Err(SetOptionError::InvalidName(name.to_owned()))
            }
        }
    }

    /// Executes `code` for `msg` against `host`.
    ///
    /// The host is reachable by the VM only for the duration of this call,
    /// through a handle that is released whatever the outcome.  The host may
    /// call back into `execute` from [`HostContext::call`].
    ///
    /// Calls on one thread, nested ones included, are always allowed.  Calls
    /// from several threads at once need a [`SharedVm`].
    pub fn execute(
        &self,
        host: &mut dyn HostContext,
        revision: Revision,
        msg: &Message<'_>,
        code: &[u8],
    ) -> ExecutionOutput {
        let guard = host_contexts().scoped(ContextPtr::new(host));
        let context = guard.handle().as_usize() as *mut FfiHostContext;
        let wire = top_level_message(msg);
        debug!(
            handle = %guard.handle(),
            kind = ?msg.kind,
            depth = msg.depth,
            gas = msg.gas,
            code_size = code.len(),
            "execute"
        );

        // SAFETY: every pointer stays valid for the duration of the call and
        // the handle resolves to `host` until the guard drops.
        let raw = unsafe {
            (self.execute)(
                self.instance.as_ptr(),
                &HOST_INTERFACE,
                context,
                revision.0,
                &wire,
                bytes_ptr(code),
                code.len(),
            )
        };
        // SAFETY: fresh result from the VM.
        let out = unsafe { NativeResult::new(raw) }.into_output();
        drop(guard);

        debug!(status = %out.status_code(), gas_left = out.gas_left, "execute finished");
        out
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        if let Some(destroy) = self.raw().destroy {
            debug!(vm = %self.name(), "destroying VM instance");
            // SAFETY: last use of the instance.
            unsafe { destroy(self.instance.as_ptr()) };
        }
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// # Safety
/// `ptr` must be null or a NUL-terminated string live for `'a`.
unsafe fn c_str<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed("");
    }
    CStr::from_ptr(ptr).to_string_lossy()
}
