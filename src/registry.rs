//! Opaque handle registry.
//!
//! Native code never sees a host object's address.  Each top-level execution
//! registers its host context under a fresh integer handle, the handle is
//! passed to the VM as its `zvmc_host_context*`, and every trampoline
//! resolves it back.  Nested executions register their own handle.
//!
//! The lock guards insert/lookup/remove only.  It is never held while host
//! code runs, so a trampoline can re-enter `execute` (which allocates) on the
//! same thread.

use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;

use crate::host::HostContext;

/// Process-unique key of a registered object.  Zero is never issued, so a
/// handle never looks like a null context pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    pub fn as_usize(self) -> usize {
        self.0
    }

    pub fn from_usize(raw: usize) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct RegistryState<T> {
    next: usize,
    entries: HashMap<usize, T>,
}

/// Thread-safe map from handles to live objects.
pub struct HandleRegistry<T> {
    state: Mutex<RegistryState<T>>,
}

impl<T: Clone> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState { next: 1, entries: HashMap::new() }),
        }
    }

    /// Registers `value` under a handle that has never been issued before.
    pub fn allocate(&self, value: T) -> Handle {
        let mut state = self.state.lock();
        let id = state.next;
        state.next = id + 1;
        state.entries.insert(id, value);
        trace!(handle = id, "handle allocated");
        Handle(id)
    }

    /// Looks up a live handle.
    ///
    /// # Panics
    /// An unknown or released handle is a protocol violation by the bridge or
    /// the VM and is not recoverable.
    pub fn resolve(&self, handle: Handle) -> T {
        let found = self.state.lock().entries.get(&handle.0).cloned();
        match found {
            Some(value) => value,
            None => panic!("zvmc bridge: unknown host context handle {handle}"),
        }
    }

    /// Removes a handle.  Releasing an unknown handle is a no-op.
    pub fn release(&self, handle: Handle) {
        if self.state.lock().entries.remove(&handle.0).is_some() {
            trace!(handle = handle.0, "handle released");
        }
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.state.lock().entries.contains_key(&handle.0)
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Allocates a handle that is released when the guard goes out of scope,
    /// including during unwinding.
    pub fn scoped(&self, value: T) -> HandleGuard<'_, T> {
        let handle = self.allocate(value);
        HandleGuard { registry: self, handle }
    }
}

impl<T: Clone> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its handle on drop.
pub struct HandleGuard<'r, T: Clone> {
    registry: &'r HandleRegistry<T>,
    handle: Handle,
}

impl<T: Clone> HandleGuard<'_, T> {
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl<T: Clone> Drop for HandleGuard<'_, T> {
    fn drop(&mut self) {
        self.registry.release(self.handle);
    }
}

// ---------------------------------------------------------------------------
//  Host context registry
// ---------------------------------------------------------------------------

/// Lifetime-erased pointer to the host context of an execution in flight.
///
/// Only created by `Vm::execute`, which keeps the borrowed context alive and
/// releases the handle before returning.
#[derive(Clone, Copy)]
pub(crate) struct ContextPtr(NonNull<dyn HostContext + 'static>);

// SAFETY: the pointer is only dereferenced by trampolines running inside the
// `execute` call that registered it, on the thread that owns the borrow.
unsafe impl Send for ContextPtr {}

impl ContextPtr {
    pub(crate) fn new(host: &mut dyn HostContext) -> Self {
        let ptr: NonNull<dyn HostContext + '_> = NonNull::from(host);
        // SAFETY: only the lifetime is erased; see the type-level invariant.
        Self(unsafe {
            std::mem::transmute::<NonNull<dyn HostContext + '_>, NonNull<dyn HostContext + 'static>>(ptr)
        })
    }

    /// # Safety
    /// The registering `execute` call must still be on the stack and no other
    /// live reference to the context may be used while the result is.
    pub(crate) unsafe fn as_mut<'a>(self) -> &'a mut dyn HostContext {
        &mut *self.0.as_ptr()
    }
}

static HOST_CONTEXTS: Lazy<HandleRegistry<ContextPtr>> = Lazy::new(HandleRegistry::new);

pub(crate) fn host_contexts() -> &'static HandleRegistry<ContextPtr> {
    &HOST_CONTEXTS
}

/// Whether a host-context handle belongs to an execution still in flight.
pub fn is_context_live(handle: Handle) -> bool {
    HOST_CONTEXTS.is_live(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn resolve_returns_registered_value() {
        let registry = HandleRegistry::new();
        let a = registry.allocate("alpha");
        let b = registry.allocate("beta");
        assert_ne!(a, b);
        assert_eq!(registry.resolve(a), "alpha");
        assert_eq!(registry.resolve(b), "beta");
    }

    #[test]
    fn handles_start_above_zero_and_are_not_reused() {
        let registry = HandleRegistry::new();
        let first = registry.allocate(1u32);
        assert!(first.as_usize() > 0);
        registry.release(first);
        let second = registry.allocate(2u32);
        assert!(second > first);
    }

    #[test]
    #[should_panic(expected = "unknown host context handle")]
    fn resolve_after_release_is_fatal() {
        let registry = HandleRegistry::new();
        let h = registry.allocate(7u64);
        registry.release(h);
        registry.resolve(h);
    }

    #[test]
    fn release_is_idempotent() {
        let registry = HandleRegistry::new();
        let h = registry.allocate(());
        registry.release(h);
        registry.release(h);
        assert!(!registry.is_live(h));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn guard_releases_on_drop() {
        let registry = HandleRegistry::new();
        let handle = {
            let guard = registry.scoped(5i32);
            assert!(registry.is_live(guard.handle()));
            guard.handle()
        };
        assert!(!registry.is_live(handle));
    }

    #[test]
    fn guard_releases_on_unwind() {
        let registry = Arc::new(HandleRegistry::new());
        let inner = Arc::clone(&registry);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.scoped(0u8);
            panic!("host blew up");
        }));
        assert!(result.is_err());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn concurrent_allocations_are_unique() {
        let registry = Arc::new(HandleRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..500).map(|i| registry.allocate(t * 1000 + i)).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for handle in worker.join().unwrap() {
                assert!(seen.insert(handle), "handle {handle} issued twice");
            }
        }
        assert_eq!(seen.len(), 8 * 500);
        assert_eq!(registry.live_count(), 8 * 500);
    }
}
