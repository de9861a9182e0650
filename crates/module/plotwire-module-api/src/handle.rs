//! Identifier newtypes crossing the module boundary.

use serde::{Deserialize, Serialize};

/// Offset into the module's linear memory. `0` is the null pointer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ModulePtr(pub u32);

impl ModulePtr {
    pub const NULL: ModulePtr = ModulePtr(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Raw return value of a module object constructor. Negative values are
/// error sentinels and must never be registered as live handles.
pub type RawHandle = i64;

/// Validated identifier of an object living inside the compute module.
/// Opaque to the bridge; never dereferenced on the host side.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NativeHandle(pub u32);

/// Index into the host [`FunctionTable`](crate::table::FunctionTable).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CallbackSlot(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer() {
        assert!(ModulePtr::NULL.is_null());
        assert!(!ModulePtr(4).is_null());
    }
}
