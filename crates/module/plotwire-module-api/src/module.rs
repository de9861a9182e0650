//! The flat function table of the compute module, one trait method per
//! entry point.
//!
//! Every string crossing the boundary travels as a NUL-terminated UTF-8
//! buffer in module memory ([`ModulePtr`]); the bridge allocates and frees
//! buffers it passes in, the module owns buffers it returns. All calls
//! happen on the host event-loop thread — the module is non-reentrant and
//! not thread-safe.

use crate::handle::{CallbackSlot, ModulePtr, NativeHandle, RawHandle};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Render flag for the periodic update call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RenderControl {
    /// Render if the module decides the scene changed.
    Allowed,
    /// Render unconditionally.
    Forced,
    /// Layout only, no rendering.
    Disabled,
}

impl RenderControl {
    /// Numeric encoding used on the wire.
    #[inline]
    pub fn as_i32(self) -> i32 {
        match self {
            RenderControl::Allowed => 0,
            RenderControl::Forced => 1,
            RenderControl::Disabled => 2,
        }
    }
}

/// The compute module's function table.
///
/// Implementations must not call back into the host from inside any of
/// these methods; host callbacks registered through the
/// [`FunctionTable`](crate::table::FunctionTable) are only invoked from the
/// module's own safe points (its update loop), never from within a
/// bridge-issued call.
pub trait ChartModule {
    /// Hand the module the host function table it must use when invoking
    /// [`CallbackSlot`]s. Called once during bridge initialization.
    fn connect(&self, table: std::rc::Rc<crate::table::FunctionTable>);

    // --- memory ---

    /// Allocate `len` bytes of module memory.
    fn alloc(&self, len: usize) -> Result<ModulePtr>;

    /// Free a buffer previously returned by [`alloc`](Self::alloc).
    fn release(&self, ptr: ModulePtr) -> Result<()>;

    /// Copy `bytes` into module memory at `ptr`.
    fn write_bytes(&self, ptr: ModulePtr, bytes: &[u8]) -> Result<()>;

    /// Read a NUL-terminated byte string from module memory. The buffer
    /// stays owned by whoever allocated it.
    fn read_cstr(&self, ptr: ModulePtr) -> Result<Vec<u8>>;

    /// Read one f64 from module memory.
    fn read_f64(&self, ptr: ModulePtr) -> Result<f64>;

    // --- object lifecycle ---

    fn create_chart(&self) -> Result<RawHandle>;
    fn create_canvas(&self) -> Result<RawHandle>;
    fn object_free(&self, handle: NativeHandle) -> Result<()>;

    // --- configuration / style / animation-option properties ---

    /// JSON array of every meaningful configuration path.
    fn chart_param_list(&self) -> Result<ModulePtr>;
    fn chart_value(&self, chart: NativeHandle, path: ModulePtr) -> Result<ModulePtr>;
    fn chart_set_value(&self, chart: NativeHandle, path: ModulePtr, value: ModulePtr)
        -> Result<()>;

    /// JSON array of every style path.
    fn style_param_list(&self) -> Result<ModulePtr>;
    fn style_value(&self, chart: NativeHandle, path: ModulePtr, computed: bool)
        -> Result<ModulePtr>;
    fn style_set_value(&self, chart: NativeHandle, path: ModulePtr, value: ModulePtr)
        -> Result<()>;

    /// Animation options have no list/get entries; they are write-only.
    fn anim_set_value(&self, chart: NativeHandle, path: ModulePtr, value: ModulePtr)
        -> Result<()>;

    // --- animation command protocol ---

    /// Issue the animate command. The module invokes `done` exactly once
    /// with `true` (ran to completion) or `false` (canceled).
    fn chart_animate(&self, chart: NativeHandle, done: CallbackSlot) -> Result<()>;

    /// Commit the pending target state as one keyframe.
    fn set_keyframe(&self, chart: NativeHandle) -> Result<()>;

    /// String command channel of the in-flight animation
    /// (seek/pause/play/stop/cancel/reverse).
    fn anim_control(&self, chart: NativeHandle, command: ModulePtr, param: ModulePtr)
        -> Result<()>;

    fn store_snapshot(&self, chart: NativeHandle) -> Result<RawHandle>;
    fn restore_snapshot(&self, chart: NativeHandle, snapshot: NativeHandle) -> Result<()>;
    fn store_anim(&self, chart: NativeHandle) -> Result<RawHandle>;
    fn restore_anim(&self, chart: NativeHandle, anim: NativeHandle) -> Result<()>;

    // --- events ---

    fn add_event_listener(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        listener: CallbackSlot,
    ) -> Result<()>;
    fn remove_event_listener(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        listener: CallbackSlot,
    ) -> Result<()>;

    /// Stop default propagation of the event record currently being
    /// dispatched. Only valid while a listener invocation is on the stack.
    fn event_prevent_default(&self, event: ModulePtr) -> Result<()>;

    // --- data ---

    fn data_add_dimension(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        values_json: ModulePtr,
    ) -> Result<()>;
    fn data_add_measure(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        unit: ModulePtr,
        values_json: ModulePtr,
    ) -> Result<()>;
    fn data_add_record(&self, chart: NativeHandle, record_json: ModulePtr) -> Result<()>;

    /// JSON array of `{name, type, unit?}` series descriptors.
    fn data_meta_info(&self, chart: NativeHandle) -> Result<ModulePtr>;

    // --- input forwarding ---

    fn pointer_down(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        pointer_id: i32,
        x: f64,
        y: f64,
    ) -> Result<()>;
    fn pointer_move(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        pointer_id: i32,
        x: f64,
        y: f64,
    ) -> Result<()>;
    fn pointer_up(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        pointer_id: i32,
        x: f64,
        y: f64,
    ) -> Result<()>;
    fn pointer_leave(&self, chart: NativeHandle, canvas: NativeHandle, pointer_id: i32)
        -> Result<()>;
    fn wheel(&self, chart: NativeHandle, canvas: NativeHandle, delta: f64) -> Result<()>;
    fn key_press(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        key_code: i32,
        ctrl: bool,
        alt: bool,
        shift: bool,
    ) -> Result<()>;

    // --- misc ---

    fn update(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        width: f64,
        height: f64,
        render: RenderControl,
    ) -> Result<()>;

    /// Library version as a module-owned string.
    fn version(&self) -> Result<ModulePtr>;

    fn set_logging(&self, enabled: bool) -> Result<()>;

    /// Human-readable message for a fault code, as a module-owned string.
    fn error_message(&self, code: i32) -> Result<ModulePtr>;

    /// Convert relative plot coordinates to canvas coordinates; returns a
    /// pointer to two consecutive f64s.
    fn rel_to_canvas_coords(&self, chart: NativeHandle, x: f64, y: f64) -> Result<ModulePtr>;

    /// Convert canvas coordinates to relative plot coordinates; returns a
    /// pointer to two consecutive f64s.
    fn canvas_to_rel_coords(&self, chart: NativeHandle, x: f64, y: f64) -> Result<ModulePtr>;
}

impl std::fmt::Debug for dyn ChartModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChartModule")
    }
}
