//! Dynamic loading of VM modules.
//!
//! A module exports `zvmc_create_<name>()` where `<name>` is derived from
//! its file name (`libzvm-one.so` -> `zvm_one`), or failing that the generic
//! `zvmc_create()`.  The returned instance must report [`ABI_VERSION`].

use std::path::Path;
use std::ptr::NonNull;

use libloading::{Library, Symbol};
use tracing::{debug, warn};

use crate::error::{LoaderError, LoaderErrorCode};
use crate::ffi_types::{CreateFn, ExecuteFn, FfiVm, ABI_VERSION};

const CREATE_PREFIX: &str = "zvmc_create";

/// An opened module and the instance it created.
pub(crate) struct LoadedModule {
    pub(crate) library: Library,
    pub(crate) instance: NonNull<FfiVm>,
    pub(crate) execute: ExecuteFn,
}

/// Name of the module-specific create function for `path`, if the file
/// name yields one.
pub fn create_fn_name(path: &Path) -> Option<String> {
    let file = path.file_name()?.to_str()?;
    let base = file.strip_prefix("lib").unwrap_or(file);
    let stem = base.split('.').next().unwrap_or(base);
    if stem.is_empty() {
        return None;
    }
    Some(format!("{CREATE_PREFIX}_{}", stem.replace('-', "_")))
}

/// Opens the module at `path`, creates an instance and validates it.
pub(crate) fn load_module(path: &Path) -> Result<LoadedModule, LoaderError> {
    if path.as_os_str().is_empty() {
        return Err(LoaderError::new(
            LoaderErrorCode::INVALID_ARGUMENT,
            "invalid argument: file name cannot be empty",
        ));
    }
    let origin = path.display().to_string();

    // SAFETY: running a module's initialisers is inherent to loading it.
    let library = unsafe { Library::new(path) }.map_err(|e| {
        warn!(path = %origin, error = %e, "cannot open VM module");
        LoaderError::new(LoaderErrorCode::CANNOT_OPEN, format!("cannot load library {origin}: {e}"))
    })?;

    let create = find_create_fn(&library, path).ok_or_else(|| {
        warn!(path = %origin, "no create function exported");
        LoaderError::new(
            LoaderErrorCode::SYMBOL_NOT_FOUND,
            format!("ZVMC create function not found in {origin}"),
        )
    })?;

    // SAFETY: the symbol has the create function signature by contract.
    let raw = unsafe { create() };
    // SAFETY: `raw` was just produced by the module's create function.
    let (instance, execute) = unsafe { check_instance(raw, &origin) }?;
    debug!(path = %origin, "VM module loaded");
    Ok(LoadedModule { library, instance, execute })
}

fn find_create_fn(library: &Library, path: &Path) -> Option<CreateFn> {
    let specific = create_fn_name(path);
    let candidates = specific.as_deref().into_iter().chain(std::iter::once(CREATE_PREFIX));
    for name in candidates {
        // SAFETY: the symbol type matches the create function signature.
        let symbol: Result<Symbol<'_, CreateFn>, _> = unsafe { library.get(name.as_bytes()) };
        if let Ok(symbol) = symbol {
            debug!(symbol = name, "resolved create function");
            return Some(*symbol);
        }
    }
    None
}

/// Validates a freshly created instance.  A mismatching instance is
/// destroyed before the error is returned.
///
/// # Safety
/// `raw` must be null or point to a live instance not owned by anyone else.
pub(crate) unsafe fn check_instance(
    raw: *mut FfiVm,
    origin: &str,
) -> Result<(NonNull<FfiVm>, ExecuteFn), LoaderError> {
    let Some(instance) = NonNull::new(raw) else {
        return Err(LoaderError::new(
            LoaderErrorCode::VM_CREATION_FAILURE,
            format!("creating ZVMC VM of {origin} has failed"),
        ));
    };

    let vm = instance.as_ref();
    let error = if vm.abi_version != ABI_VERSION {
        LoaderError::new(
            LoaderErrorCode::ABI_VERSION_MISMATCH,
            format!(
                "ZVMC ABI version {} of {origin} mismatches the expected version {ABI_VERSION}",
                vm.abi_version
            ),
        )
    } else if let Some(execute) = vm.execute {
        return Ok((instance, execute));
    } else {
        LoaderError::new(
            LoaderErrorCode::VM_CREATION_FAILURE,
            format!("ZVMC VM of {origin} has no execute function"),
        )
    };

    warn!(origin, %error, "rejecting VM instance");
    if let Some(destroy) = vm.destroy {
        destroy(instance.as_ptr());
    }
    Err(error)
}
