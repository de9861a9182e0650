//! Event bridge: host listeners registered as module-invokable callbacks.

use crate::error::BridgeError;
use crate::marshal::{decode_fault, read_string, with_str};
use crate::registry::ManagedObject;
use crate::Result;
use hashbrown::HashMap;
use plotwire_module_api::{CallbackSlot, ChartModule, FunctionTable, HostCallback, ModulePtr};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Token identifying one listener registration, returned by `on` and
/// consumed by `off`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ListenerId(u64);

/// A module-originated event handed to host listeners. The record pointer
/// is only valid for the duration of the dispatch, which the borrowed
/// receiver position enforces.
pub struct ChartEvent {
    module: Rc<dyn ChartModule>,
    record: ModulePtr,
    detail: Value,
}

impl ChartEvent {
    /// Decoded JSON payload of the event.
    #[inline]
    pub fn detail(&self) -> &Value {
        &self.detail
    }

    /// Stop the module's default handling of this event.
    pub fn prevent_default(&self) -> Result<()> {
        self.module
            .event_prevent_default(self.record)
            .map_err(|e| decode_fault(&*self.module, e))
    }
}

struct Registration {
    id: ListenerId,
    slot: CallbackSlot,
}

/// Listener bookkeeping for one chart instance.
pub struct EventBridge {
    module: Rc<dyn ChartModule>,
    table: Rc<FunctionTable>,
    chart: Rc<ManagedObject>,
    listeners: RefCell<HashMap<String, Vec<Registration>>>,
    next_id: Cell<u64>,
}

impl EventBridge {
    pub(crate) fn new(
        module: Rc<dyn ChartModule>,
        table: Rc<FunctionTable>,
        chart: Rc<ManagedObject>,
    ) -> Self {
        Self {
            module,
            table,
            chart,
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Register `handler` for `name`d module events. The handler receives a
    /// borrowed event wrapper; undecodable payloads are logged and dropped
    /// rather than unwound across the boundary.
    pub fn add(
        &self,
        name: &str,
        mut handler: impl FnMut(&ChartEvent) + 'static,
    ) -> Result<ListenerId> {
        let chart = self.chart.handle()?;
        let module = self.module.clone();
        let event_name = name.to_string();
        let slot = self
            .table
            .add(HostCallback::Event(Box::new(move |record, payload| {
                let detail = match read_string(&*module, payload)
                    .and_then(|raw| serde_json::from_str(&raw).map_err(BridgeError::from))
                {
                    Ok(value) => value,
                    Err(err) => {
                        log::warn!("dropping '{event_name}' event with undecodable payload: {err}");
                        return;
                    }
                };
                let event = ChartEvent {
                    module: module.clone(),
                    record,
                    detail,
                };
                handler(&event);
            })));

        let registered = with_str(&self.module, name, |cname| {
            self.module
                .add_event_listener(chart, cname, slot)
                .map_err(|e| decode_fault(&*self.module, e))
        });
        if let Err(err) = registered {
            // never leave a slot behind for a listener the module rejected
            if let Err(remove_err) = self.table.remove(slot) {
                log::warn!("revoking unregistered listener slot failed: {remove_err}");
            }
            return Err(err);
        }

        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(Registration { id, slot });
        Ok(id)
    }

    /// Remove one registration. The native listener is unregistered before
    /// the table slot is released, in that order, so the module can never
    /// invoke a freed slot.
    pub fn remove(&self, name: &str, id: ListenerId) -> Result<()> {
        let slot = {
            let listeners = self.listeners.borrow();
            listeners
                .get(name)
                .and_then(|regs| regs.iter().find(|r| r.id == id))
                .map(|r| r.slot)
        };
        let Some(slot) = slot else {
            return Err(BridgeError::marshalling(format!(
                "no listener {id:?} registered for '{name}'"
            )));
        };
        self.unregister(name, slot)?;
        let mut listeners = self.listeners.borrow_mut();
        if let Some(regs) = listeners.get_mut(name) {
            regs.retain(|r| r.id != id);
            if regs.is_empty() {
                listeners.remove(name);
            }
        }
        Ok(())
    }

    /// Tear down every registration. Best-effort: all of them are
    /// attempted, the first failure is reported.
    pub fn clear(&self) -> Result<()> {
        let drained: Vec<(String, Vec<Registration>)> =
            self.listeners.borrow_mut().drain().collect();
        let mut first_error = None;
        for (name, regs) in drained {
            for reg in regs {
                if let Err(err) = self.unregister(&name, reg.slot) {
                    log::warn!("removing '{name}' listener during teardown failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Count of live registrations for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .borrow()
            .get(name)
            .map_or(0, |regs| regs.len())
    }

    fn unregister(&self, name: &str, slot: CallbackSlot) -> Result<()> {
        let chart = self.chart.handle()?;
        with_str(&self.module, name, |cname| {
            self.module
                .remove_event_listener(chart, cname, slot)
                .map_err(|e| decode_fault(&*self.module, e))
        })?;
        self.table.remove(slot)?;
        Ok(())
    }
}
