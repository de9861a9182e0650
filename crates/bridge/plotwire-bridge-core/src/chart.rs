//! Chart facade: the disposable handle external collaborators hold.
//!
//! Lifecycle is `Loading -> Ready -> Detached`. Animate requests submitted
//! while the module is still loading are parked and flushed on load; every
//! other operation requires the Ready state. `detach` tears down listeners,
//! pending requests, and registry entries symmetrically and is terminal.

use crate::data::{DataBridge, SeriesInfo};
use crate::error::BridgeError;
use crate::events::{ChartEvent, EventBridge, ListenerId};
use crate::input::{Key, KeyModifiers, Point, PointerEvent};
use crate::marshal::{decode_fault, read_string};
use crate::options::BridgeOptions;
use crate::proxy::{PropertyProxy, ProxyTarget};
use crate::registry::{ManagedObject, ObjectClass, ObjectRegistry, Snapshot};
use crate::scheduler::{AnimationHandle, AnimationScheduler, RequestInner};
use crate::target::{AnimOptions, AnimTarget};
use crate::Result;
use plotwire_module_api::{ChartModule, FunctionTable, ModulePtr, RenderControl};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

enum Lifecycle {
    Loading {
        parked: Vec<Rc<RequestInner>>,
        next_id: u64,
    },
    Ready(Rc<ChartInner>),
    Detached,
}

struct ChartInner {
    module: Rc<dyn ChartModule>,
    registry: Rc<ObjectRegistry>,
    chart: Rc<ManagedObject>,
    canvas: Rc<ManagedObject>,
    config_proxy: PropertyProxy,
    style_proxy: PropertyProxy,
    computed_style_proxy: PropertyProxy,
    data: DataBridge,
    scheduler: AnimationScheduler,
    events: EventBridge,
    channel_names: Vec<String>,
}

/// One chart instance bridged to the compute module.
pub struct Chart {
    options: BridgeOptions,
    lifecycle: RefCell<Lifecycle>,
}

impl Chart {
    /// Create a chart in the Loading state. [`finish_loading`](Self::finish_loading)
    /// completes initialization once the module is available.
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            options,
            lifecycle: RefCell::new(Lifecycle::Loading {
                parked: Vec::new(),
                next_id: 1,
            }),
        }
    }

    #[inline]
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lifecycle.borrow(), Lifecycle::Ready(_))
    }

    /// Wire the loaded module up: callback table, registry, chart and
    /// canvas handles, proxies, scheduler and event bridge, then flush any
    /// animate requests parked during loading.
    pub fn finish_loading(&self, module: Rc<dyn ChartModule>) -> Result<()> {
        match &*self.lifecycle.borrow() {
            Lifecycle::Loading { .. } => {}
            Lifecycle::Ready(_) => {
                return Err(BridgeError::marshalling("module already loaded"));
            }
            Lifecycle::Detached => return Err(BridgeError::Detached),
        }

        let table = Rc::new(FunctionTable::new());
        module.connect(table.clone());
        module
            .set_logging(self.options.module_logging)
            .map_err(|e| decode_fault(&*module, e))?;

        let registry = ObjectRegistry::new(module.clone());
        let chart = Rc::new(registry.register(
            module
                .create_chart()
                .map_err(|e| decode_fault(&*module, e))?,
            ObjectClass::Chart,
        )?);
        let canvas = Rc::new(registry.register(
            module
                .create_canvas()
                .map_err(|e| decode_fault(&*module, e))?,
            ObjectClass::Canvas,
        )?);

        let config_proxy = PropertyProxy::new(module.clone(), chart.clone(), ProxyTarget::Config);
        let style_proxy = PropertyProxy::new(
            module.clone(),
            chart.clone(),
            ProxyTarget::Style { computed: false },
        );
        let computed_style_proxy = PropertyProxy::new(
            module.clone(),
            chart.clone(),
            ProxyTarget::Style { computed: true },
        );
        let anim_proxy =
            PropertyProxy::new(module.clone(), chart.clone(), ProxyTarget::AnimOptions);
        let data = DataBridge::new(module.clone(), chart.clone());

        // the channel name set drives config shorthand expansion
        let initial = config_proxy.read_tree()?;
        let channel_names: Vec<String> = initial
            .get("channels")
            .and_then(Value::as_object)
            .map(|channels| channels.keys().cloned().collect())
            .unwrap_or_default();

        let scheduler = AnimationScheduler::new(
            module.clone(),
            table.clone(),
            chart.clone(),
            registry.clone(),
            config_proxy.clone(),
            style_proxy.clone(),
            anim_proxy,
            data.clone(),
            channel_names.clone(),
            1,
        );
        let events = EventBridge::new(module.clone(), table, chart.clone());

        let inner = Rc::new(ChartInner {
            module,
            registry,
            chart,
            canvas,
            config_proxy,
            style_proxy,
            computed_style_proxy,
            data,
            scheduler,
            events,
            channel_names,
        });

        let parked = {
            let mut lifecycle = self.lifecycle.borrow_mut();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Ready(inner.clone())) {
                Lifecycle::Loading { parked, .. } => parked,
                _ => unreachable!(),
            }
        };
        for request in parked {
            inner.scheduler.adopt(request);
        }
        log::debug!("chart bridge initialized");
        Ok(())
    }

    fn inner(&self) -> Result<Rc<ChartInner>> {
        match &*self.lifecycle.borrow() {
            Lifecycle::Ready(inner) => Ok(inner.clone()),
            Lifecycle::Loading { .. } => Err(BridgeError::NotInitialized),
            Lifecycle::Detached => Err(BridgeError::Detached),
        }
    }

    /// Queue an animation towards `target`. Returns immediately with a
    /// chained, cancelable handle; requests execute strictly in submission
    /// order, one at a time. Submitting while the module is loading parks
    /// the request until [`finish_loading`](Self::finish_loading).
    pub fn animate(
        &self,
        target: impl Into<AnimTarget>,
        options: impl Into<Option<AnimOptions>>,
    ) -> AnimationHandle {
        let target = target.into();
        let options = options.into();
        let mut lifecycle = self.lifecycle.borrow_mut();
        match &mut *lifecycle {
            Lifecycle::Ready(inner) => {
                let inner = inner.clone();
                drop(lifecycle);
                inner.scheduler.submit(target, options)
            }
            Lifecycle::Loading { parked, next_id } => {
                let id = *next_id;
                *next_id += 1;
                let request = RequestInner::new(id, target, options);
                parked.push(request.clone());
                log::debug!("animation request {id} parked until module load");
                AnimationHandle::new(request)
            }
            Lifecycle::Detached => {
                let request = RequestInner::new(0, target, options);
                request.settle(Err(BridgeError::Detached));
                AnimationHandle::new(request)
            }
        }
    }

    /// Untyped entry point: target and options as plain JSON trees, with
    /// the shorthands the configuration surface accepts.
    pub fn animate_json(&self, target: Value, options: Option<Value>) -> Result<AnimationHandle> {
        let target = AnimTarget::try_from(target)?;
        let options = options.map(AnimOptions::try_from).transpose()?;
        Ok(self.animate(target, options))
    }

    /// Point-in-time snapshot of the configuration tree.
    pub fn config(&self) -> Result<Value> {
        self.inner()?.config_proxy.read_tree()
    }

    /// Point-in-time snapshot of the style tree as set.
    pub fn style(&self) -> Result<Value> {
        self.inner()?.style_proxy.read_tree()
    }

    /// Point-in-time snapshot of the fully resolved style tree.
    pub fn computed_style(&self) -> Result<Value> {
        self.inner()?.computed_style_proxy.read_tree()
    }

    /// Channel names the configuration shorthand expansion recognizes.
    pub fn channel_names(&self) -> Result<Vec<String>> {
        Ok(self.inner()?.channel_names.clone())
    }

    /// Capture current chart state as a restorable snapshot.
    pub fn store(&self) -> Result<Snapshot> {
        let inner = self.inner()?;
        let raw = inner
            .module
            .store_snapshot(inner.chart.handle()?)
            .map_err(|e| decode_fault(&*inner.module, e))?;
        Ok(Snapshot::new(
            inner.registry.register(raw, ObjectClass::Snapshot)?,
        ))
    }

    /// Series descriptors of the data table currently in the module.
    pub fn data_info(&self) -> Result<Vec<SeriesInfo>> {
        self.inner()?.data.meta_info()
    }

    /// Subscribe to a named module event.
    pub fn on(
        &self,
        name: &str,
        handler: impl FnMut(&ChartEvent) + 'static,
    ) -> Result<ListenerId> {
        self.inner()?.events.add(name, handler)
    }

    /// Unsubscribe a listener registered with [`on`](Self::on).
    pub fn off(&self, name: &str, id: ListenerId) -> Result<()> {
        self.inner()?.events.remove(name, id)
    }

    /// Compute module version string.
    pub fn version(&self) -> Result<String> {
        let inner = self.inner()?;
        let ptr = inner
            .module
            .version()
            .map_err(|e| decode_fault(&*inner.module, e))?;
        read_string(&*inner.module, ptr)
    }

    pub fn set_module_logging(&self, enabled: bool) -> Result<()> {
        let inner = self.inner()?;
        inner
            .module
            .set_logging(enabled)
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    /// Drive one layout/render update. The embedder calls this on the
    /// cadence documented by [`BridgeOptions::update_interval_ms`].
    pub fn update(&self, width: f64, height: f64, render: RenderControl) -> Result<()> {
        let inner = self.inner()?;
        inner
            .module
            .update(
                inner.chart.handle()?,
                inner.canvas.handle()?,
                width,
                height,
                render,
            )
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    pub fn pointer_down(&self, event: PointerEvent) -> Result<()> {
        let inner = self.inner()?;
        inner
            .module
            .pointer_down(
                inner.chart.handle()?,
                inner.canvas.handle()?,
                event.pointer_id,
                event.position.x,
                event.position.y,
            )
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    pub fn pointer_move(&self, event: PointerEvent) -> Result<()> {
        let inner = self.inner()?;
        inner
            .module
            .pointer_move(
                inner.chart.handle()?,
                inner.canvas.handle()?,
                event.pointer_id,
                event.position.x,
                event.position.y,
            )
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    pub fn pointer_up(&self, event: PointerEvent) -> Result<()> {
        let inner = self.inner()?;
        inner
            .module
            .pointer_up(
                inner.chart.handle()?,
                inner.canvas.handle()?,
                event.pointer_id,
                event.position.x,
                event.position.y,
            )
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    pub fn pointer_leave(&self, pointer_id: i32) -> Result<()> {
        let inner = self.inner()?;
        inner
            .module
            .pointer_leave(inner.chart.handle()?, inner.canvas.handle()?, pointer_id)
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    pub fn wheel(&self, delta: f64) -> Result<()> {
        let inner = self.inner()?;
        inner
            .module
            .wheel(inner.chart.handle()?, inner.canvas.handle()?, delta)
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    /// Forward a key press. Keys without a native code are silently not
    /// forwarded.
    pub fn key_press(&self, key: Key, modifiers: KeyModifiers) -> Result<()> {
        let inner = self.inner()?;
        let Some(code) = key.native_code() else {
            return Ok(());
        };
        inner
            .module
            .key_press(
                inner.chart.handle()?,
                inner.canvas.handle()?,
                code,
                modifiers.ctrl,
                modifiers.alt,
                modifiers.shift,
            )
            .map_err(|e| decode_fault(&*inner.module, e))
    }

    /// Convert relative plot coordinates to canvas coordinates.
    pub fn to_canvas_coords(&self, point: Point) -> Result<Point> {
        let inner = self.inner()?;
        let ptr = inner
            .module
            .rel_to_canvas_coords(inner.chart.handle()?, point.x, point.y)
            .map_err(|e| decode_fault(&*inner.module, e))?;
        read_point(&*inner.module, ptr)
    }

    /// Convert canvas coordinates to relative plot coordinates.
    pub fn to_rel_coords(&self, point: Point) -> Result<Point> {
        let inner = self.inner()?;
        let ptr = inner
            .module
            .canvas_to_rel_coords(inner.chart.handle()?, point.x, point.y)
            .map_err(|e| decode_fault(&*inner.module, e))?;
        read_point(&*inner.module, ptr)
    }

    /// Queued requests plus the active one.
    pub fn in_flight_animations(&self) -> Result<usize> {
        Ok(self.inner()?.scheduler.in_flight())
    }

    /// Live native handles owned through the registry.
    pub fn live_objects(&self) -> Result<usize> {
        Ok(self.inner()?.registry.live_count())
    }

    /// Tear the instance down: reject pending animation requests, remove
    /// every listener registration, release the canvas and chart registry
    /// entries, and stop accepting update ticks. Idempotent and terminal.
    pub fn detach(&self) -> Result<()> {
        let previous = {
            let mut lifecycle = self.lifecycle.borrow_mut();
            std::mem::replace(&mut *lifecycle, Lifecycle::Detached)
        };
        match previous {
            Lifecycle::Detached => Ok(()),
            Lifecycle::Loading { parked, .. } => {
                for request in parked {
                    request.settle(Err(BridgeError::Canceled));
                }
                Ok(())
            }
            Lifecycle::Ready(inner) => {
                inner.scheduler.shutdown();
                let mut first_error = inner.events.clear().err();
                if let Err(err) = inner.canvas.dispose() {
                    log::warn!("disposing canvas during detach failed: {err}");
                    first_error.get_or_insert(err);
                }
                if let Err(err) = inner.chart.dispose() {
                    log::warn!("disposing chart during detach failed: {err}");
                    first_error.get_or_insert(err);
                }
                match first_error {
                    None => Ok(()),
                    Some(err) => Err(err),
                }
            }
        }
    }
}

fn read_point(module: &dyn ChartModule, ptr: ModulePtr) -> Result<Point> {
    let x = module
        .read_f64(ptr)
        .map_err(|e| decode_fault(module, e))?;
    let y = module
        .read_f64(ModulePtr(ptr.0 + 8))
        .map_err(|e| decode_fault(module, e))?;
    Ok(Point::new(x, y))
}
