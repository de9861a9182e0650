//! Host function table: the mechanism that lets the module invoke
//! host-defined closures through a plain integer slot.
//!
//! Slots are handed to the module (as animation-completion or event-listener
//! callbacks) and must stay valid until revoked. Revocation from inside the
//! slot's own invocation is legal — one-shot completion callbacks remove
//! themselves — and retires the slot once the invocation returns. A revoked
//! slot is never invoked again; its index is reused by later registrations.

use crate::handle::{CallbackSlot, ModulePtr};
use std::cell::RefCell;

/// A host closure invokable by the module. The two variants are the two
/// callback signatures crossing the boundary.
pub enum HostCallback {
    /// Animation completion: `true` ran to completion, `false` canceled.
    AnimCompleted(Box<dyn FnMut(bool)>),
    /// Event dispatch: opaque event record pointer + JSON payload string.
    Event(Box<dyn FnMut(ModulePtr, ModulePtr)>),
}

impl std::fmt::Debug for HostCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostCallback::AnimCompleted(_) => f.write_str("AnimCompleted"),
            HostCallback::Event(_) => f.write_str("Event"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    #[error("callback slot {0} is vacant")]
    Vacant(u32),
    #[error("callback slot {0} invoked with mismatched signature")]
    Signature(u32),
    #[error("callback slot {0} is already being invoked")]
    Reentered(u32),
}

#[derive(Debug)]
enum Slot {
    Empty,
    Occupied(HostCallback),
    /// Taken out for the duration of an invocation.
    InFlight,
    /// Revoked while in flight; freed when the invocation returns.
    Retired,
}

#[derive(Debug, Default)]
struct Inner {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

/// Slab of host callbacks indexed by [`CallbackSlot`].
#[derive(Debug, Default)]
pub struct FunctionTable {
    inner: RefCell<Inner>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback and return its slot.
    pub fn add(&self, callback: HostCallback) -> CallbackSlot {
        let mut inner = self.inner.borrow_mut();
        if let Some(index) = inner.free.pop() {
            inner.slots[index as usize] = Slot::Occupied(callback);
            CallbackSlot(index)
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Slot::Occupied(callback));
            CallbackSlot(index)
        }
    }

    /// Revoke a slot. After this returns the slot will never be invoked
    /// again. Calling it from inside the slot's own invocation retires the
    /// slot once the invocation unwinds back to the table.
    pub fn remove(&self, slot: CallbackSlot) -> Result<(), TableError> {
        let mut inner = self.inner.borrow_mut();
        match inner.slots.get_mut(slot.0 as usize) {
            Some(entry @ Slot::Occupied(_)) => {
                *entry = Slot::Empty;
                inner.free.push(slot.0);
                Ok(())
            }
            Some(entry @ Slot::InFlight) => {
                *entry = Slot::Retired;
                Ok(())
            }
            _ => Err(TableError::Vacant(slot.0)),
        }
    }

    /// Number of occupied (or in-flight) slots.
    pub fn live_len(&self) -> usize {
        self.inner
            .borrow()
            .slots
            .iter()
            .filter(|s| matches!(s, Slot::Occupied(_) | Slot::InFlight))
            .count()
    }

    pub fn invoke_anim_completed(&self, slot: CallbackSlot, ok: bool) -> Result<(), TableError> {
        match self.begin_invoke(slot)? {
            HostCallback::AnimCompleted(mut f) => {
                f(ok);
                self.end_invoke(slot, HostCallback::AnimCompleted(f));
                Ok(())
            }
            other => {
                self.end_invoke(slot, other);
                Err(TableError::Signature(slot.0))
            }
        }
    }

    pub fn invoke_event(
        &self,
        slot: CallbackSlot,
        event: ModulePtr,
        payload: ModulePtr,
    ) -> Result<(), TableError> {
        match self.begin_invoke(slot)? {
            HostCallback::Event(mut f) => {
                f(event, payload);
                self.end_invoke(slot, HostCallback::Event(f));
                Ok(())
            }
            other => {
                self.end_invoke(slot, other);
                Err(TableError::Signature(slot.0))
            }
        }
    }

    /// Take the callback out of its slot, leaving an in-flight marker so
    /// the table can be borrowed again (add/remove) during the invocation.
    fn begin_invoke(&self, slot: CallbackSlot) -> Result<HostCallback, TableError> {
        let mut inner = self.inner.borrow_mut();
        match inner.slots.get_mut(slot.0 as usize) {
            Some(entry @ Slot::Occupied(_)) => {
                let taken = std::mem::replace(entry, Slot::InFlight);
                match taken {
                    Slot::Occupied(cb) => Ok(cb),
                    _ => unreachable!(),
                }
            }
            Some(Slot::InFlight) | Some(Slot::Retired) => Err(TableError::Reentered(slot.0)),
            _ => Err(TableError::Vacant(slot.0)),
        }
    }

    fn end_invoke(&self, slot: CallbackSlot, callback: HostCallback) {
        let mut inner = self.inner.borrow_mut();
        match &inner.slots[slot.0 as usize] {
            Slot::InFlight => inner.slots[slot.0 as usize] = Slot::Occupied(callback),
            // Revoked mid-invocation: drop the callback and free the index.
            Slot::Retired => {
                inner.slots[slot.0 as usize] = Slot::Empty;
                inner.free.push(slot.0);
            }
            _ => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn add_invoke_remove() {
        let table = FunctionTable::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let slot = table.add(HostCallback::AnimCompleted(Box::new(move |ok| {
            assert!(ok);
            h.set(h.get() + 1);
        })));
        table.invoke_anim_completed(slot, true).unwrap();
        assert_eq!(hits.get(), 1);
        table.remove(slot).unwrap();
        assert_eq!(
            table.invoke_anim_completed(slot, true),
            Err(TableError::Vacant(slot.0))
        );
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn slot_index_is_reused_after_removal() {
        let table = FunctionTable::new();
        let a = table.add(HostCallback::AnimCompleted(Box::new(|_| {})));
        let b = table.add(HostCallback::AnimCompleted(Box::new(|_| {})));
        assert_ne!(a, b);
        table.remove(a).unwrap();
        let c = table.add(HostCallback::AnimCompleted(Box::new(|_| {})));
        assert_eq!(a, c);
        assert_eq!(table.live_len(), 2);
    }

    #[test]
    fn removing_own_slot_mid_invocation_retires_it() {
        let table = Rc::new(FunctionTable::new());
        let slot_cell = Rc::new(Cell::new(CallbackSlot(u32::MAX)));
        let t = table.clone();
        let s = slot_cell.clone();
        let slot = table.add(HostCallback::AnimCompleted(Box::new(move |_| {
            t.remove(s.get()).unwrap();
        })));
        slot_cell.set(slot);
        table.invoke_anim_completed(slot, true).unwrap();
        assert_eq!(table.live_len(), 0);
        assert_eq!(
            table.invoke_anim_completed(slot, false),
            Err(TableError::Vacant(slot.0))
        );
        // Index comes back through the free list.
        let again = table.add(HostCallback::AnimCompleted(Box::new(|_| {})));
        assert_eq!(again, slot);
    }

    #[test]
    fn signature_mismatch_is_reported_and_slot_survives() {
        let table = FunctionTable::new();
        let slot = table.add(HostCallback::Event(Box::new(|_, _| {})));
        assert_eq!(
            table.invoke_anim_completed(slot, true),
            Err(TableError::Signature(slot.0))
        );
        table
            .invoke_event(slot, ModulePtr::NULL, ModulePtr::NULL)
            .unwrap();
    }
}
