//! Object registry: raw module handles wrapped into safely disposable
//! host objects.
//!
//! Explicit disposal is the primary contract for long-lived handles (chart,
//! canvas); `Drop` is the finalization backstop that keeps short-lived
//! churn (snapshots, stored animations) from leaking native memory. Either
//! way the native free entry point runs exactly once per handle, and a
//! disposed wrapper fails every later native call instead of silently
//! touching a stale or reused handle.

use crate::error::BridgeError;
use crate::marshal::decode_fault;
use crate::Result;
use hashbrown::HashMap;
use plotwire_module_api::{ChartModule, NativeHandle, RawHandle};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// What kind of module object a handle refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    Chart,
    Canvas,
    Snapshot,
    Animation,
}

/// Owner of the wrapper-to-handle mapping. Sole holder of mutation rights
/// over the module's object-handle space.
#[derive(Debug)]
pub struct ObjectRegistry {
    module: Rc<dyn ChartModule>,
    live: RefCell<HashMap<u32, ObjectClass>>,
}

impl ObjectRegistry {
    pub fn new(module: Rc<dyn ChartModule>) -> Rc<Self> {
        Rc::new(Self {
            module,
            live: RefCell::new(HashMap::new()),
        })
    }

    /// Wrap a freshly obtained raw handle. A negative value is the module's
    /// error sentinel and a duplicate would break single-ownership, so both
    /// are registry errors.
    pub fn register(self: &Rc<Self>, raw: RawHandle, class: ObjectClass) -> Result<ManagedObject> {
        if raw < 0 || raw > u32::MAX as RawHandle {
            return Err(BridgeError::Registry {
                reason: format!("module returned invalid {class:?} handle {raw}"),
            });
        }
        let handle = NativeHandle(raw as u32);
        let mut live = self.live.borrow_mut();
        if let Some(existing) = live.get(&handle.0) {
            return Err(BridgeError::Registry {
                reason: format!(
                    "handle {} already registered as {existing:?}; refusing duplicate {class:?}",
                    handle.0
                ),
            });
        }
        live.insert(handle.0, class);
        log::debug!("registered {class:?} handle {}", handle.0);
        Ok(ManagedObject {
            registry: self.clone(),
            class,
            handle,
            disposed: Cell::new(false),
        })
    }

    /// Number of live (not yet freed) handles.
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    fn free(&self, handle: NativeHandle) -> Result<()> {
        self.module
            .object_free(handle)
            .map_err(|e| decode_fault(&*self.module, e))?;
        self.live.borrow_mut().remove(&handle.0);
        Ok(())
    }
}

/// Host-side wrapper owning exactly one native handle.
#[derive(Debug)]
pub struct ManagedObject {
    registry: Rc<ObjectRegistry>,
    class: ObjectClass,
    handle: NativeHandle,
    disposed: Cell<bool>,
}

impl ManagedObject {
    #[inline]
    pub fn class(&self) -> ObjectClass {
        self.class
    }

    /// The wrapped handle, or `UseAfterFree` once disposed.
    pub fn handle(&self) -> Result<NativeHandle> {
        if self.disposed.get() {
            return Err(BridgeError::UseAfterFree {
                class: self.class,
                handle: self.handle.0,
            });
        }
        Ok(self.handle)
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Explicit early release. Idempotent: the first call issues the native
    /// free, later calls are no-ops. On a module fault the wrapper stays
    /// valid so the caller can retry.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.get() {
            return Ok(());
        }
        self.registry.free(self.handle)?;
        self.disposed.set(true);
        log::debug!("disposed {:?} handle {}", self.class, self.handle.0);
        Ok(())
    }
}

impl Drop for ManagedObject {
    fn drop(&mut self) {
        if !self.disposed.get() {
            log::debug!(
                "{:?} handle {} dropped without explicit dispose; reclaiming",
                self.class,
                self.handle.0
            );
            if let Err(err) = self.registry.free(self.handle) {
                log::warn!(
                    "native free failed for {:?} handle {}: {err}",
                    self.class,
                    self.handle.0
                );
            }
        }
    }
}

/// A captured, restorable copy of chart state. Cheap to clone; the native
/// object is freed when the last clone goes away or `dispose` is called.
#[derive(Debug, Clone)]
pub struct Snapshot {
    object: Rc<ManagedObject>,
}

impl Snapshot {
    pub(crate) fn new(object: ManagedObject) -> Self {
        Self {
            object: Rc::new(object),
        }
    }

    pub(crate) fn handle(&self) -> Result<NativeHandle> {
        self.object.handle()
    }

    pub fn dispose(&self) -> Result<()> {
        self.object.dispose()
    }
}

/// A captured in-flight animation, restorable as an animate target.
#[derive(Debug, Clone)]
pub struct StoredAnimation {
    object: Rc<ManagedObject>,
}

impl StoredAnimation {
    pub(crate) fn new(object: ManagedObject) -> Self {
        Self {
            object: Rc::new(object),
        }
    }

    pub(crate) fn handle(&self) -> Result<NativeHandle> {
        self.object.handle()
    }

    pub fn dispose(&self) -> Result<()> {
        self.object.dispose()
    }
}
