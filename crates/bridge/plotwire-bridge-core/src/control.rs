//! Control handle over the in-flight animation.

use crate::marshal::{decode_fault, with_str2};
use crate::registry::{ManagedObject, ObjectClass, ObjectRegistry, StoredAnimation};
use crate::Result;
use plotwire_module_api::ChartModule;
use std::rc::Rc;

/// External control over the animation currently owned by the module.
/// Obtained from [`AnimationHandle::control`](crate::scheduler::AnimationHandle::control)
/// once a request has activated.
#[derive(Debug, Clone)]
pub struct AnimControl {
    module: Rc<dyn ChartModule>,
    chart: Rc<ManagedObject>,
    registry: Rc<ObjectRegistry>,
}

impl AnimControl {
    pub(crate) fn new(
        module: Rc<dyn ChartModule>,
        chart: Rc<ManagedObject>,
        registry: Rc<ObjectRegistry>,
    ) -> Self {
        Self {
            module,
            chart,
            registry,
        }
    }

    fn command(&self, command: &str, param: &str) -> Result<()> {
        let chart = self.chart.handle()?;
        with_str2(&self.module, command, param, |cmd, par| {
            self.module
                .anim_control(chart, cmd, par)
                .map_err(|e| decode_fault(&*self.module, e))
        })
    }

    /// Jump to a position, e.g. `"50%"` or `"1000ms"`.
    pub fn seek(&self, position: &str) -> Result<()> {
        self.command("seek", position)
    }

    pub fn pause(&self) -> Result<()> {
        self.command("pause", "")
    }

    pub fn play(&self) -> Result<()> {
        self.command("play", "")
    }

    /// Stop at the current position. The module reports the animation as
    /// canceled, rejecting its request.
    pub fn stop(&self) -> Result<()> {
        self.command("stop", "")
    }

    /// Abort and roll back. The module reports the animation as canceled,
    /// rejecting its request.
    pub fn cancel(&self) -> Result<()> {
        self.command("cancel", "")
    }

    pub fn reverse(&self) -> Result<()> {
        self.command("reverse", "")
    }

    /// Capture the in-flight animation as a restorable stored object.
    pub fn store(&self) -> Result<StoredAnimation> {
        let chart = self.chart.handle()?;
        let raw = self
            .module
            .store_anim(chart)
            .map_err(|e| decode_fault(&*self.module, e))?;
        Ok(StoredAnimation::new(
            self.registry.register(raw, ObjectClass::Animation)?,
        ))
    }
}
