//! Animation scheduler: serializes animate requests into the module's
//! single-threaded command protocol.
//!
//! An explicit FIFO with a one-in-flight pointer stands in for promise
//! chaining: every submission returns immediately with a handle, at most
//! one request has issued its native animate call at any time, and a
//! settled request — resolved, canceled, or rejected during target
//! application — never blocks its successors.

use crate::control::AnimControl;
use crate::data::DataBridge;
use crate::error::BridgeError;
use crate::marshal::decode_fault;
use crate::path::PropertyPath;
use crate::proxy::PropertyProxy;
use crate::registry::{ManagedObject, ObjectRegistry};
use crate::target::{normalize_config, AnimOptions, AnimTarget, Keyframe, KeyframeTarget};
use crate::Result;
use plotwire_module_api::{CallbackSlot, ChartModule, FunctionTable, HostCallback};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Lifecycle of one animation request.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RequestState {
    /// Submitted, predecessor not yet settled.
    Queued,
    /// Target and options written, native animate call issued.
    Active,
    /// The animation ran to completion.
    Resolved,
    /// Canceled, superseded, or failed during target application.
    Rejected,
}

pub(crate) struct RequestInner {
    id: u64,
    target: RefCell<Option<AnimTarget>>,
    options: RefCell<Option<AnimOptions>>,
    state: Cell<RequestState>,
    activated: Cell<bool>,
    outcome: RefCell<Option<Result<()>>>,
    control: RefCell<Option<AnimControl>>,
    slot: Cell<Option<CallbackSlot>>,
    #[allow(clippy::type_complexity)]
    on_settled: RefCell<Vec<Box<dyn FnOnce(&Result<()>)>>>,
}

impl RequestInner {
    pub(crate) fn new(id: u64, target: AnimTarget, options: Option<AnimOptions>) -> Rc<Self> {
        Rc::new(Self {
            id,
            target: RefCell::new(Some(target)),
            options: RefCell::new(options),
            state: Cell::new(RequestState::Queued),
            activated: Cell::new(false),
            outcome: RefCell::new(None),
            control: RefCell::new(None),
            slot: Cell::new(None),
            on_settled: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn is_settled(&self) -> bool {
        matches!(
            self.state.get(),
            RequestState::Resolved | RequestState::Rejected
        )
    }

    pub(crate) fn settle(&self, outcome: Result<()>) {
        if self.is_settled() {
            return;
        }
        self.state.set(match &outcome {
            Ok(()) => RequestState::Resolved,
            Err(_) => RequestState::Rejected,
        });
        log::debug!(
            "animation request {} settled: {:?}",
            self.id,
            self.state.get()
        );
        let callbacks = std::mem::take(&mut *self.on_settled.borrow_mut());
        *self.outcome.borrow_mut() = Some(outcome);
        let stored = self.outcome.borrow();
        let outcome = stored.as_ref().unwrap();
        for callback in callbacks {
            callback(outcome);
        }
    }
}

/// Awaitable, cancelable handle to one animation request. Cheap to clone.
#[derive(Clone)]
pub struct AnimationHandle {
    inner: Rc<RequestInner>,
}

impl AnimationHandle {
    pub(crate) fn new(inner: Rc<RequestInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> RequestState {
        self.inner.state.get()
    }

    pub fn is_settled(&self) -> bool {
        self.inner.is_settled()
    }

    /// `None` until settled; then `Ok(())` for a completed run, or the
    /// rejection reason (`Canceled`, or whatever failed during target
    /// application).
    pub fn outcome(&self) -> Option<Result<()>> {
        self.inner.outcome.borrow().clone()
    }

    /// The secondary activation signal: true as soon as the request's
    /// target and options have been written and the native animate call
    /// issued — long before completion.
    pub fn is_activated(&self) -> bool {
        self.inner.activated.get()
    }

    /// Control over the in-flight animation; available from activation
    /// onward, without waiting for completion.
    pub fn control(&self) -> Option<AnimControl> {
        self.inner.control.borrow().clone()
    }

    /// Run `callback` when the request settles; immediately if it already
    /// has.
    pub fn on_settled(&self, callback: impl FnOnce(&Result<()>) + 'static) {
        if self.inner.is_settled() {
            let outcome = self.inner.outcome.borrow();
            callback(outcome.as_ref().unwrap());
        } else {
            self.inner.on_settled.borrow_mut().push(Box::new(callback));
        }
    }

    /// Cancel the request. A queued request settles with `Canceled`
    /// immediately, its target never applied; an active one is canceled
    /// through the module, which then reports the animation as canceled.
    pub fn cancel(&self) -> Result<()> {
        match self.inner.state.get() {
            RequestState::Queued => {
                self.inner.settle(Err(BridgeError::Canceled));
                Ok(())
            }
            RequestState::Active => match self.control() {
                Some(control) => control.cancel(),
                None => Ok(()),
            },
            RequestState::Resolved | RequestState::Rejected => Ok(()),
        }
    }
}

pub(crate) struct SchedulerShared {
    module: Rc<dyn ChartModule>,
    table: Rc<FunctionTable>,
    chart: Rc<ManagedObject>,
    registry: Rc<ObjectRegistry>,
    config_proxy: PropertyProxy,
    style_proxy: PropertyProxy,
    anim_proxy: PropertyProxy,
    data: DataBridge,
    channel_names: Vec<String>,
    queue: RefCell<VecDeque<Rc<RequestInner>>>,
    active: RefCell<Option<Rc<RequestInner>>>,
    next_id: Cell<u64>,
}

/// Per-chart animation queue.
pub struct AnimationScheduler {
    shared: Rc<SchedulerShared>,
}

impl AnimationScheduler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        module: Rc<dyn ChartModule>,
        table: Rc<FunctionTable>,
        chart: Rc<ManagedObject>,
        registry: Rc<ObjectRegistry>,
        config_proxy: PropertyProxy,
        style_proxy: PropertyProxy,
        anim_proxy: PropertyProxy,
        data: DataBridge,
        channel_names: Vec<String>,
        first_id: u64,
    ) -> Self {
        Self {
            shared: Rc::new(SchedulerShared {
                module,
                table,
                chart,
                registry,
                config_proxy,
                style_proxy,
                anim_proxy,
                data,
                channel_names,
                queue: RefCell::new(VecDeque::new()),
                active: RefCell::new(None),
                next_id: Cell::new(first_id),
            }),
        }
    }

    /// Append a request and return its handle. Never blocks: the request
    /// activates as soon as every predecessor has settled, which may be
    /// within this call when the queue is idle.
    pub(crate) fn submit(
        &self,
        target: AnimTarget,
        options: Option<AnimOptions>,
    ) -> AnimationHandle {
        let id = self.shared.next_id.get();
        self.shared.next_id.set(id + 1);
        let request = RequestInner::new(id, target, options);
        log::debug!("animation request {id} queued");
        self.shared.queue.borrow_mut().push_back(request.clone());
        SchedulerShared::pump(&self.shared);
        AnimationHandle::new(request)
    }

    /// Adopt a request created before the scheduler existed (submitted
    /// while the module was still loading).
    pub(crate) fn adopt(&self, request: Rc<RequestInner>) {
        let floor = request.id + 1;
        if self.shared.next_id.get() < floor {
            self.shared.next_id.set(floor);
        }
        self.shared.queue.borrow_mut().push_back(request);
        SchedulerShared::pump(&self.shared);
    }

    /// Queued requests plus the active one, if any.
    pub fn in_flight(&self) -> usize {
        self.shared.queue.borrow().len() + usize::from(self.shared.active.borrow().is_some())
    }

    /// Reject everything still pending and revoke the active request's
    /// completion slot. Used by `detach`.
    pub(crate) fn shutdown(&self) {
        let drained: Vec<_> = self.shared.queue.borrow_mut().drain(..).collect();
        for request in drained {
            request.settle(Err(BridgeError::Canceled));
        }
        let active = self.shared.active.borrow_mut().take();
        if let Some(request) = active {
            if let Some(slot) = request.slot.take() {
                if let Err(err) = self.shared.table.remove(slot) {
                    log::warn!("revoking completion slot during shutdown failed: {err}");
                }
            }
            request.settle(Err(BridgeError::Canceled));
        }
    }
}

impl SchedulerShared {
    /// Advance the queue: activate the oldest unsettled request unless one
    /// is already in flight. Requests that fail during target application
    /// settle here and the loop keeps going — forward progress is
    /// unconditional.
    fn pump(shared: &Rc<Self>) {
        loop {
            if shared.active.borrow().is_some() {
                return;
            }
            let next = shared.queue.borrow_mut().pop_front();
            let Some(request) = next else { return };
            if request.is_settled() {
                // canceled while queued; its target was never applied
                continue;
            }
            match Self::activate(shared, &request) {
                Ok(()) => {
                    *shared.active.borrow_mut() = Some(request);
                    return;
                }
                Err(err) => {
                    log::debug!(
                        "animation request {} rejected before native call: {err}",
                        request.id
                    );
                    request.settle(Err(err));
                }
            }
        }
    }

    fn activate(shared: &Rc<Self>, request: &Rc<RequestInner>) -> Result<()> {
        request.state.set(RequestState::Active);
        let target = request
            .target
            .borrow_mut()
            .take()
            .ok_or_else(|| BridgeError::marshalling("animation target already consumed"))?;
        let options = request.options.borrow_mut().take();
        shared.apply_target(target, options.as_ref())?;

        let chart = shared.chart.handle()?;
        let weak_shared = Rc::downgrade(shared);
        let weak_table = Rc::downgrade(&shared.table);
        let completed = request.clone();
        let slot = shared
            .table
            .add(HostCallback::AnimCompleted(Box::new(move |ok| {
                // one-shot: revoke our own slot before settling
                if let Some(slot) = completed.slot.take() {
                    if let Some(table) = weak_table.upgrade() {
                        if let Err(err) = table.remove(slot) {
                            log::warn!("completion slot already revoked: {err}");
                        }
                    }
                }
                completed.settle(if ok {
                    Ok(())
                } else {
                    Err(BridgeError::Canceled)
                });
                if let Some(shared) = weak_shared.upgrade() {
                    let mut active = shared.active.borrow_mut();
                    if active.as_ref().map(|r| r.id) == Some(completed.id) {
                        *active = None;
                    }
                    drop(active);
                    Self::pump(&shared);
                }
            })));
        request.slot.set(Some(slot));

        if let Err(err) = shared.module.chart_animate(chart, slot) {
            request.slot.set(None);
            if let Err(remove_err) = shared.table.remove(slot) {
                log::warn!("revoking unused completion slot failed: {remove_err}");
            }
            return Err(decode_fault(&*shared.module, err));
        }

        *request.control.borrow_mut() = Some(AnimControl::new(
            shared.module.clone(),
            shared.chart.clone(),
            shared.registry.clone(),
        ));
        request.activated.set(true);
        log::debug!("animation request {} activated", request.id);
        Ok(())
    }

    /// Write the request's target, then its options, in enumeration order.
    /// Any failure here aborts before the native animate call.
    fn apply_target(&self, target: AnimTarget, options: Option<&AnimOptions>) -> Result<()> {
        match target {
            AnimTarget::Animation(animation) => {
                let chart = self.chart.handle()?;
                self.module
                    .restore_anim(chart, animation.handle()?)
                    .map_err(|e| decode_fault(&*self.module, e))?;
            }
            AnimTarget::Snapshot(snapshot) => {
                self.apply_keyframe(&Keyframe {
                    target: KeyframeTarget::Snapshot(snapshot),
                    options: None,
                })?;
            }
            AnimTarget::Keyframes(frames) => {
                for frame in &frames {
                    self.apply_keyframe(frame)?;
                }
            }
        }
        if let Some(options) = options {
            self.anim_proxy.write_tree(options.tree())?;
        }
        Ok(())
    }

    fn apply_keyframe(&self, frame: &Keyframe) -> Result<()> {
        let chart = self.chart.handle()?;
        match &frame.target {
            KeyframeTarget::Snapshot(snapshot) => {
                self.module
                    .restore_snapshot(chart, snapshot.handle()?)
                    .map_err(|e| decode_fault(&*self.module, e))?;
            }
            KeyframeTarget::State(state) => {
                if let Some(data) = &state.data {
                    self.data.set(data)?;
                }
                if let Some(style) = &state.style {
                    if style.is_null() {
                        // root path + literal "null": clear every style
                        self.style_proxy.set(&PropertyPath::root(), "null")?;
                    } else {
                        self.style_proxy.write_tree(style)?;
                    }
                }
                if let Some(config) = &state.config {
                    let mut config = config.clone();
                    normalize_config(&mut config, &self.channel_names);
                    self.config_proxy.write_tree(&config)?;
                }
            }
        }
        if let Some(options) = &frame.options {
            self.anim_proxy.write_tree(options.tree())?;
        }
        self.module
            .set_keyframe(chart)
            .map_err(|e| decode_fault(&*self.module, e))?;
        Ok(())
    }
}
