//! plotwire-test-fixtures: an in-process stand-in for the chart compute
//! module.
//!
//! `MockModule` implements the full function table against host memory:
//! emulated linear memory with allocation counting, a handle space with
//! double-free detection, seeded config/style parameter stores, a call
//! recorder, failure injection, and drivable animation completion and
//! event dispatch. A reentrancy guard panics if any module entry point is
//! entered while another is still on the stack — the module contract the
//! bridge must uphold.

use hashbrown::{HashMap, HashSet};
use plotwire_module_api::{
    CallbackSlot, ChartModule, FunctionTable, ModuleError, ModulePtr, NativeHandle, RawHandle,
    RenderControl, Result,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

pub const ERR_UNKNOWN_PATH: i32 = 1;
pub const ERR_BAD_POINTER: i32 = 2;
pub const ERR_BAD_HANDLE: i32 = 3;
pub const ERR_DOUBLE_FREE: i32 = 4;
pub const ERR_BAD_VALUE: i32 = 5;
pub const ERR_UNKNOWN_LISTENER: i32 = 6;

pub const MOCK_VERSION: &str = "0.7.1-mock";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum MockClass {
    Chart,
    Canvas,
    Snapshot,
    Animation,
}

#[derive(Debug, Clone)]
enum MockSeries {
    Dimension { name: String, values: Vec<String> },
    Measure {
        name: String,
        unit: String,
        values: Vec<f64>,
    },
}

impl MockSeries {
    fn name(&self) -> &str {
        match self {
            MockSeries::Dimension { name, .. } | MockSeries::Measure { name, .. } => name,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    memory: HashMap<u32, Vec<u8>>,
    host_allocs: HashSet<u32>,
    next_ptr: u32,
    outstanding: usize,
    next_handle: RawHandle,
    live: HashMap<u32, MockClass>,
    freed: Vec<u32>,
    config_defaults: Vec<(String, String)>,
    config_current: HashMap<String, String>,
    style_defaults: Vec<(String, String)>,
    style_current: HashMap<String, String>,
    anim_options: HashMap<String, String>,
    listeners: HashMap<String, Vec<CallbackSlot>>,
    pending_anim: VecDeque<CallbackSlot>,
    series: Vec<MockSeries>,
    records: Vec<Vec<serde_json::Value>>,
    calls: Vec<String>,
    fail_next: HashMap<String, i32>,
    prevented: Vec<u32>,
    logging: bool,
}

const CHANNELS: [&str; 7] = ["color", "lightness", "label", "noop", "size", "x", "y"];

impl MockState {
    fn seeded() -> Self {
        let mut state = MockState {
            next_ptr: 16,
            next_handle: 1,
            ..MockState::default()
        };
        for (path, value) in [
            ("title", "null"),
            ("subtitle", "null"),
            ("caption", "null"),
            ("legend", "auto"),
            ("coordSystem", "cartesian"),
            ("geometry", "rectangle"),
            ("rotate", "0"),
            ("split", "false"),
            ("align", "none"),
        ] {
            state
                .config_defaults
                .push((path.to_string(), value.to_string()));
        }
        for channel in CHANNELS {
            for (field, value) in [("set", "[]"), ("title", "auto"), ("labelLevel", "0")] {
                state
                    .config_defaults
                    .push((format!("channels.{channel}.{field}"), value.to_string()));
            }
        }
        for (path, value) in [
            ("fontFamily", "Roboto, sans-serif"),
            ("fontSize", "11px"),
            ("backgroundColor", "#FFFFFF"),
            ("title.fontSize", "26px"),
            ("title.color", "#494949"),
            ("legend.width", "100px"),
            ("plot.marker.colorPalette", "#4171CD #03AE71 #F4941B"),
            ("plot.marker.fillOpacity", "1"),
            ("plot.xAxis.label.fontSize", "12px"),
            ("plot.yAxis.label.fontSize", "12px"),
        ] {
            state
                .style_defaults
                .push((path.to_string(), value.to_string()));
        }
        state
    }

    fn record(&mut self, call: impl Into<String>) {
        self.calls.push(call.into());
    }

    fn alloc_block(&mut self, len: usize, host: bool) -> u32 {
        let ptr = self.next_ptr;
        let span = (len.max(1) as u32 + 7) & !7;
        self.next_ptr += span;
        self.memory.insert(ptr, vec![0; len.max(1)]);
        if host {
            self.host_allocs.insert(ptr);
            self.outstanding += 1;
        }
        ptr
    }

    /// Module-owned string buffer (never counted against the bridge).
    fn intern(&mut self, text: &str) -> ModulePtr {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let ptr = self.alloc_block(bytes.len(), false);
        self.memory.insert(ptr, bytes);
        ModulePtr(ptr)
    }

    fn intern_bytes(&mut self, bytes: Vec<u8>) -> ModulePtr {
        let ptr = self.alloc_block(bytes.len(), false);
        self.memory.insert(ptr, bytes);
        ModulePtr(ptr)
    }

    /// Containing buffer start + offset for an interior pointer.
    fn locate(&self, ptr: u32) -> Option<(u32, usize)> {
        self.memory.iter().find_map(|(start, buf)| {
            let start = *start;
            if ptr >= start && (ptr - start) < buf.len() as u32 {
                Some((start, (ptr - start) as usize))
            } else {
                None
            }
        })
    }

    fn cstr_at(&self, ptr: ModulePtr) -> Result<Vec<u8>> {
        let (start, offset) = self
            .locate(ptr.0)
            .ok_or(ModuleError::new(ERR_BAD_POINTER))?;
        let buf = &self.memory[&start];
        let tail = &buf[offset..];
        let nul = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or(ModuleError::new(ERR_BAD_POINTER))?;
        Ok(tail[..nul].to_vec())
    }

    fn string_at(&self, ptr: ModulePtr) -> Result<String> {
        String::from_utf8(self.cstr_at(ptr)?).map_err(|_| ModuleError::new(ERR_BAD_VALUE))
    }

    fn new_handle(&mut self, class: MockClass) -> RawHandle {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.live.insert(raw as u32, class);
        raw
    }

    fn expect_handle(&self, handle: NativeHandle, class: MockClass) -> Result<()> {
        match self.live.get(&handle.0) {
            Some(actual) if *actual == class => Ok(()),
            _ => Err(ModuleError::new(ERR_BAD_HANDLE)),
        }
    }

    fn config_lookup(&self, path: &str) -> Option<String> {
        if let Some(current) = self.config_current.get(path) {
            return Some(current.clone());
        }
        self.config_defaults
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
    }

    fn style_lookup(&self, path: &str) -> Option<String> {
        if let Some(current) = self.style_current.get(path) {
            return Some(current.clone());
        }
        self.style_defaults
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
    }
}

struct Guard<'a>(&'a Cell<bool>);

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The mock compute module. Construct with [`MockModule::new`] and hand the
/// `Rc` to `Chart::finish_loading`.
#[derive(Debug)]
pub struct MockModule {
    table: RefCell<Option<Rc<FunctionTable>>>,
    busy: Cell<bool>,
    state: RefCell<MockState>,
}

impl MockModule {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            table: RefCell::new(None),
            busy: Cell::new(false),
            state: RefCell::new(MockState::seeded()),
        })
    }

    fn enter(&self, call: &str) -> Guard<'_> {
        if self.busy.replace(true) {
            panic!("compute module re-entered during '{call}'");
        }
        Guard(&self.busy)
    }

    fn take_failure(&self, method: &str) -> Result<()> {
        if let Some(code) = self.state.borrow_mut().fail_next.remove(method) {
            return Err(ModuleError::new(code));
        }
        Ok(())
    }

    // --- test driver surface ---

    /// Inject one failure for the next call of `method`.
    pub fn fail_next(&self, method: &str, code: i32) {
        self.state
            .borrow_mut()
            .fail_next
            .insert(method.to_string(), code);
    }

    /// Full call log, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Number of logged calls whose label starts with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Bridge-owned allocations not yet released. Zero between operations
    /// means every marshalled buffer was freed on every exit path.
    pub fn outstanding_host_allocs(&self) -> usize {
        self.state.borrow().outstanding
    }

    pub fn live_handles(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn freed_handles(&self) -> Vec<u32> {
        self.state.borrow().freed.clone()
    }

    pub fn pending_animations(&self) -> usize {
        self.state.borrow().pending_anim.len()
    }

    /// Complete the oldest pending animation; `ok = false` reports it as
    /// canceled. Invokes the parked completion callback through the
    /// function table, exactly as the real module's update loop would.
    pub fn finish_animation(&self, ok: bool) {
        assert!(
            !self.busy.get(),
            "finish_animation must be driven from outside the module"
        );
        let slot = self
            .state
            .borrow_mut()
            .pending_anim
            .pop_front()
            .expect("no pending animation to finish");
        let table = self
            .table
            .borrow()
            .clone()
            .expect("module not connected to a function table");
        table
            .invoke_anim_completed(slot, ok)
            .expect("animation completion slot was revoked");
    }

    /// Dispatch a named event with a JSON payload to every registered
    /// listener.
    pub fn fire_event(&self, name: &str, payload: &str) {
        assert!(
            !self.busy.get(),
            "fire_event must be driven from outside the module"
        );
        let (slots, record, payload_ptr) = {
            let mut state = self.state.borrow_mut();
            let slots = state.listeners.get(name).cloned().unwrap_or_default();
            let record = state.intern_bytes(vec![0; 8]);
            let payload_ptr = state.intern(payload);
            (slots, record, payload_ptr)
        };
        let table = self
            .table
            .borrow()
            .clone()
            .expect("module not connected to a function table");
        for slot in slots {
            table
                .invoke_event(slot, record, payload_ptr)
                .expect("event listener slot was revoked");
        }
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.state
            .borrow()
            .listeners
            .get(name)
            .map_or(0, |slots| slots.len())
    }

    pub fn prevent_default_count(&self) -> usize {
        self.state.borrow().prevented.len()
    }

    /// Effective config value (current write or seeded default).
    pub fn config_value_of(&self, path: &str) -> Option<String> {
        self.state.borrow().config_lookup(path)
    }

    /// Effective style value (current write or seeded default).
    pub fn style_value_of(&self, path: &str) -> Option<String> {
        self.state.borrow().style_lookup(path)
    }

    /// Last animation option written at `path`.
    pub fn anim_option(&self, path: &str) -> Option<String> {
        self.state.borrow().anim_options.get(path).cloned()
    }

    pub fn series_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .series
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.borrow().records.len()
    }
}

impl ChartModule for MockModule {
    fn connect(&self, table: Rc<FunctionTable>) {
        *self.table.borrow_mut() = Some(table);
    }

    fn alloc(&self, len: usize) -> Result<ModulePtr> {
        let _guard = self.enter("alloc");
        self.take_failure("alloc")?;
        Ok(ModulePtr(self.state.borrow_mut().alloc_block(len, true)))
    }

    fn release(&self, ptr: ModulePtr) -> Result<()> {
        let _guard = self.enter("release");
        self.take_failure("release")?;
        let mut state = self.state.borrow_mut();
        if !state.host_allocs.remove(&ptr.0) {
            return Err(ModuleError::new(ERR_BAD_POINTER));
        }
        state.memory.remove(&ptr.0);
        state.outstanding -= 1;
        Ok(())
    }

    fn write_bytes(&self, ptr: ModulePtr, bytes: &[u8]) -> Result<()> {
        let _guard = self.enter("write_bytes");
        self.take_failure("write_bytes")?;
        let mut state = self.state.borrow_mut();
        let buf = state
            .memory
            .get_mut(&ptr.0)
            .ok_or(ModuleError::new(ERR_BAD_POINTER))?;
        if bytes.len() > buf.len() {
            return Err(ModuleError::new(ERR_BAD_POINTER));
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_cstr(&self, ptr: ModulePtr) -> Result<Vec<u8>> {
        let _guard = self.enter("read_cstr");
        self.take_failure("read_cstr")?;
        self.state.borrow().cstr_at(ptr)
    }

    fn read_f64(&self, ptr: ModulePtr) -> Result<f64> {
        let _guard = self.enter("read_f64");
        let state = self.state.borrow();
        let (start, offset) = state
            .locate(ptr.0)
            .ok_or(ModuleError::new(ERR_BAD_POINTER))?;
        let buf = &state.memory[&start];
        let bytes: [u8; 8] = buf
            .get(offset..offset + 8)
            .ok_or(ModuleError::new(ERR_BAD_POINTER))?
            .try_into()
            .unwrap();
        Ok(f64::from_le_bytes(bytes))
    }

    fn create_chart(&self) -> Result<RawHandle> {
        let _guard = self.enter("create_chart");
        self.take_failure("create_chart")?;
        let mut state = self.state.borrow_mut();
        let raw = state.new_handle(MockClass::Chart);
        state.record(format!("create_chart->{raw}"));
        Ok(raw)
    }

    fn create_canvas(&self) -> Result<RawHandle> {
        let _guard = self.enter("create_canvas");
        self.take_failure("create_canvas")?;
        let mut state = self.state.borrow_mut();
        let raw = state.new_handle(MockClass::Canvas);
        state.record(format!("create_canvas->{raw}"));
        Ok(raw)
    }

    fn object_free(&self, handle: NativeHandle) -> Result<()> {
        let _guard = self.enter("object_free");
        self.take_failure("object_free")?;
        let mut state = self.state.borrow_mut();
        if state.live.remove(&handle.0).is_none() {
            return Err(ModuleError::new(ERR_DOUBLE_FREE));
        }
        state.freed.push(handle.0);
        state.record(format!("object_free({})", handle.0));
        Ok(())
    }

    fn chart_param_list(&self) -> Result<ModulePtr> {
        let _guard = self.enter("chart_param_list");
        self.take_failure("chart_param_list")?;
        let mut state = self.state.borrow_mut();
        let paths: Vec<&str> = state
            .config_defaults
            .iter()
            .map(|(p, _)| p.as_str())
            .collect();
        let json = serde_json::to_string(&paths).unwrap();
        state.record("chart_param_list");
        Ok(state.intern(&json))
    }

    fn chart_value(&self, chart: NativeHandle, path: ModulePtr) -> Result<ModulePtr> {
        let _guard = self.enter("chart_value");
        self.take_failure("chart_value")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let path = state.string_at(path)?;
        let value = state
            .config_lookup(&path)
            .ok_or(ModuleError::new(ERR_UNKNOWN_PATH))?;
        state.record(format!("chart_value({path})"));
        Ok(state.intern(&value))
    }

    fn chart_set_value(
        &self,
        chart: NativeHandle,
        path: ModulePtr,
        value: ModulePtr,
    ) -> Result<()> {
        let _guard = self.enter("chart_set_value");
        self.take_failure("chart_set_value")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let path = state.string_at(path)?;
        let value = state.string_at(value)?;
        if state.config_lookup(&path).is_none() {
            return Err(ModuleError::new(ERR_UNKNOWN_PATH));
        }
        state.record(format!("chart_set_value({path}={value})"));
        if value == "null" {
            state.config_current.remove(&path);
        } else {
            state.config_current.insert(path, value);
        }
        Ok(())
    }

    fn style_param_list(&self) -> Result<ModulePtr> {
        let _guard = self.enter("style_param_list");
        self.take_failure("style_param_list")?;
        let mut state = self.state.borrow_mut();
        let paths: Vec<&str> = state
            .style_defaults
            .iter()
            .map(|(p, _)| p.as_str())
            .collect();
        let json = serde_json::to_string(&paths).unwrap();
        state.record("style_param_list");
        Ok(state.intern(&json))
    }

    fn style_value(
        &self,
        chart: NativeHandle,
        path: ModulePtr,
        computed: bool,
    ) -> Result<ModulePtr> {
        let _guard = self.enter("style_value");
        self.take_failure("style_value")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let path = state.string_at(path)?;
        let value = state
            .style_lookup(&path)
            .ok_or(ModuleError::new(ERR_UNKNOWN_PATH))?;
        state.record(format!("style_value({path},computed={computed})"));
        Ok(state.intern(&value))
    }

    fn style_set_value(
        &self,
        chart: NativeHandle,
        path: ModulePtr,
        value: ModulePtr,
    ) -> Result<()> {
        let _guard = self.enter("style_set_value");
        self.take_failure("style_set_value")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let path = state.string_at(path)?;
        let value = state.string_at(value)?;
        state.record(format!("style_set_value({path}={value})"));
        if value == "null" {
            // subtree clear: the path addresses everything beneath it
            let matches = |key: &str| {
                path.is_empty() || key == path || key.starts_with(&format!("{path}."))
            };
            if !path.is_empty()
                && !state.style_defaults.iter().any(|(key, _)| matches(key))
            {
                return Err(ModuleError::new(ERR_UNKNOWN_PATH));
            }
            state.style_current.retain(|key, _| !matches(key));
        } else {
            if state
                .style_defaults
                .iter()
                .all(|(key, _)| key != &path)
            {
                return Err(ModuleError::new(ERR_UNKNOWN_PATH));
            }
            state.style_current.insert(path, value);
        }
        Ok(())
    }

    fn anim_set_value(
        &self,
        chart: NativeHandle,
        path: ModulePtr,
        value: ModulePtr,
    ) -> Result<()> {
        let _guard = self.enter("anim_set_value");
        self.take_failure("anim_set_value")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let path = state.string_at(path)?;
        let value = state.string_at(value)?;
        if path.is_empty() {
            return Err(ModuleError::new(ERR_UNKNOWN_PATH));
        }
        state.record(format!("anim_set_value({path}={value})"));
        state.anim_options.insert(path, value);
        Ok(())
    }

    fn chart_animate(&self, chart: NativeHandle, done: CallbackSlot) -> Result<()> {
        let _guard = self.enter("chart_animate");
        self.take_failure("chart_animate")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        assert!(
            state.pending_anim.is_empty(),
            "animate command issued while a previous animation is still pending"
        );
        state.pending_anim.push_back(done);
        state.record("chart_animate");
        Ok(())
    }

    fn set_keyframe(&self, chart: NativeHandle) -> Result<()> {
        let _guard = self.enter("set_keyframe");
        self.take_failure("set_keyframe")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.record("set_keyframe");
        Ok(())
    }

    fn anim_control(
        &self,
        chart: NativeHandle,
        command: ModulePtr,
        param: ModulePtr,
    ) -> Result<()> {
        let _guard = self.enter("anim_control");
        self.take_failure("anim_control")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let command = state.string_at(command)?;
        let param = state.string_at(param)?;
        state.record(format!("anim_control({command},{param})"));
        Ok(())
    }

    fn store_snapshot(&self, chart: NativeHandle) -> Result<RawHandle> {
        let _guard = self.enter("store_snapshot");
        self.take_failure("store_snapshot")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let raw = state.new_handle(MockClass::Snapshot);
        state.record(format!("store_snapshot->{raw}"));
        Ok(raw)
    }

    fn restore_snapshot(&self, chart: NativeHandle, snapshot: NativeHandle) -> Result<()> {
        let _guard = self.enter("restore_snapshot");
        self.take_failure("restore_snapshot")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(snapshot, MockClass::Snapshot)?;
        state.record(format!("restore_snapshot({})", snapshot.0));
        Ok(())
    }

    fn store_anim(&self, chart: NativeHandle) -> Result<RawHandle> {
        let _guard = self.enter("store_anim");
        self.take_failure("store_anim")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let raw = state.new_handle(MockClass::Animation);
        state.record(format!("store_anim->{raw}"));
        Ok(raw)
    }

    fn restore_anim(&self, chart: NativeHandle, anim: NativeHandle) -> Result<()> {
        let _guard = self.enter("restore_anim");
        self.take_failure("restore_anim")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(anim, MockClass::Animation)?;
        state.record(format!("restore_anim({})", anim.0));
        Ok(())
    }

    fn add_event_listener(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        listener: CallbackSlot,
    ) -> Result<()> {
        let _guard = self.enter("add_event_listener");
        self.take_failure("add_event_listener")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let name = state.string_at(name)?;
        state.record(format!("add_event_listener({name})"));
        state.listeners.entry(name).or_default().push(listener);
        Ok(())
    }

    fn remove_event_listener(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        listener: CallbackSlot,
    ) -> Result<()> {
        let _guard = self.enter("remove_event_listener");
        self.take_failure("remove_event_listener")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let name = state.string_at(name)?;
        let slots = state
            .listeners
            .get_mut(&name)
            .ok_or(ModuleError::new(ERR_UNKNOWN_LISTENER))?;
        let index = slots
            .iter()
            .position(|s| *s == listener)
            .ok_or(ModuleError::new(ERR_UNKNOWN_LISTENER))?;
        slots.remove(index);
        if slots.is_empty() {
            state.listeners.remove(&name);
        }
        state.record(format!("remove_event_listener({name})"));
        Ok(())
    }

    fn event_prevent_default(&self, event: ModulePtr) -> Result<()> {
        let _guard = self.enter("event_prevent_default");
        self.take_failure("event_prevent_default")?;
        let mut state = self.state.borrow_mut();
        state.prevented.push(event.0);
        state.record("event_prevent_default");
        Ok(())
    }

    fn data_add_dimension(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        values_json: ModulePtr,
    ) -> Result<()> {
        let _guard = self.enter("data_add_dimension");
        self.take_failure("data_add_dimension")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let name = state.string_at(name)?;
        let values: Vec<String> = serde_json::from_str(&state.string_at(values_json)?)
            .map_err(|_| ModuleError::new(ERR_BAD_VALUE))?;
        state.record(format!("data_add_dimension({name})"));
        state.series.push(MockSeries::Dimension { name, values });
        Ok(())
    }

    fn data_add_measure(
        &self,
        chart: NativeHandle,
        name: ModulePtr,
        unit: ModulePtr,
        values_json: ModulePtr,
    ) -> Result<()> {
        let _guard = self.enter("data_add_measure");
        self.take_failure("data_add_measure")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let name = state.string_at(name)?;
        let unit = state.string_at(unit)?;
        let values: Vec<f64> = serde_json::from_str(&state.string_at(values_json)?)
            .map_err(|_| ModuleError::new(ERR_BAD_VALUE))?;
        state.record(format!("data_add_measure({name})"));
        state.series.push(MockSeries::Measure { name, unit, values });
        Ok(())
    }

    fn data_add_record(&self, chart: NativeHandle, record_json: ModulePtr) -> Result<()> {
        let _guard = self.enter("data_add_record");
        self.take_failure("data_add_record")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let row: Vec<serde_json::Value> = serde_json::from_str(&state.string_at(record_json)?)
            .map_err(|_| ModuleError::new(ERR_BAD_VALUE))?;
        state.record("data_add_record");
        state.records.push(row);
        Ok(())
    }

    fn data_meta_info(&self, chart: NativeHandle) -> Result<ModulePtr> {
        let _guard = self.enter("data_meta_info");
        self.take_failure("data_meta_info")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let series: Vec<serde_json::Value> = state
            .series
            .iter()
            .map(|s| match s {
                MockSeries::Dimension { name, .. } => {
                    serde_json::json!({"name": name, "type": "dimension"})
                }
                MockSeries::Measure { name, unit, .. } => {
                    serde_json::json!({"name": name, "type": "measure", "unit": unit})
                }
            })
            .collect();
        let json = serde_json::to_string(&series).unwrap();
        state.record("data_meta_info");
        Ok(state.intern(&json))
    }

    fn pointer_down(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        pointer_id: i32,
        x: f64,
        y: f64,
    ) -> Result<()> {
        let _guard = self.enter("pointer_down");
        self.take_failure("pointer_down")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(canvas, MockClass::Canvas)?;
        state.record(format!("pointer_down({pointer_id},{x},{y})"));
        Ok(())
    }

    fn pointer_move(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        pointer_id: i32,
        x: f64,
        y: f64,
    ) -> Result<()> {
        let _guard = self.enter("pointer_move");
        self.take_failure("pointer_move")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(canvas, MockClass::Canvas)?;
        state.record(format!("pointer_move({pointer_id},{x},{y})"));
        Ok(())
    }

    fn pointer_up(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        pointer_id: i32,
        x: f64,
        y: f64,
    ) -> Result<()> {
        let _guard = self.enter("pointer_up");
        self.take_failure("pointer_up")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(canvas, MockClass::Canvas)?;
        state.record(format!("pointer_up({pointer_id},{x},{y})"));
        Ok(())
    }

    fn pointer_leave(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        pointer_id: i32,
    ) -> Result<()> {
        let _guard = self.enter("pointer_leave");
        self.take_failure("pointer_leave")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(canvas, MockClass::Canvas)?;
        state.record(format!("pointer_leave({pointer_id})"));
        Ok(())
    }

    fn wheel(&self, chart: NativeHandle, canvas: NativeHandle, delta: f64) -> Result<()> {
        let _guard = self.enter("wheel");
        self.take_failure("wheel")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(canvas, MockClass::Canvas)?;
        state.record(format!("wheel({delta})"));
        Ok(())
    }

    fn key_press(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        key_code: i32,
        ctrl: bool,
        alt: bool,
        shift: bool,
    ) -> Result<()> {
        let _guard = self.enter("key_press");
        self.take_failure("key_press")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(canvas, MockClass::Canvas)?;
        state.record(format!("key_press({key_code},{ctrl},{alt},{shift})"));
        Ok(())
    }

    fn update(
        &self,
        chart: NativeHandle,
        canvas: NativeHandle,
        width: f64,
        height: f64,
        render: RenderControl,
    ) -> Result<()> {
        let _guard = self.enter("update");
        self.take_failure("update")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        state.expect_handle(canvas, MockClass::Canvas)?;
        state.record(format!("update({width}x{height},{})", render.as_i32()));
        Ok(())
    }

    fn version(&self) -> Result<ModulePtr> {
        let _guard = self.enter("version");
        self.take_failure("version")?;
        let mut state = self.state.borrow_mut();
        state.record("version");
        Ok(state.intern(MOCK_VERSION))
    }

    fn set_logging(&self, enabled: bool) -> Result<()> {
        let _guard = self.enter("set_logging");
        self.take_failure("set_logging")?;
        let mut state = self.state.borrow_mut();
        state.logging = enabled;
        state.record(format!("set_logging({enabled})"));
        Ok(())
    }

    fn error_message(&self, code: i32) -> Result<ModulePtr> {
        let _guard = self.enter("error_message");
        let message = match code {
            ERR_UNKNOWN_PATH => "unknown property path".to_string(),
            ERR_BAD_POINTER => "invalid memory reference".to_string(),
            ERR_BAD_HANDLE => "unknown object handle".to_string(),
            ERR_DOUBLE_FREE => "object already freed".to_string(),
            ERR_BAD_VALUE => "malformed value".to_string(),
            ERR_UNKNOWN_LISTENER => "unknown event listener".to_string(),
            other => format!("fault {other}"),
        };
        Ok(self.state.borrow_mut().intern(&message))
    }

    fn rel_to_canvas_coords(&self, chart: NativeHandle, x: f64, y: f64) -> Result<ModulePtr> {
        let _guard = self.enter("rel_to_canvas_coords");
        self.take_failure("rel_to_canvas_coords")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&(x * 640.0).to_le_bytes());
        bytes.extend_from_slice(&(y * 480.0).to_le_bytes());
        Ok(state.intern_bytes(bytes))
    }

    fn canvas_to_rel_coords(&self, chart: NativeHandle, x: f64, y: f64) -> Result<ModulePtr> {
        let _guard = self.enter("canvas_to_rel_coords");
        self.take_failure("canvas_to_rel_coords")?;
        let mut state = self.state.borrow_mut();
        state.expect_handle(chart, MockClass::Chart)?;
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(&(x / 640.0).to_le_bytes());
        bytes.extend_from_slice(&(y / 480.0).to_le_bytes());
        Ok(state.intern_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_roundtrip_and_leak_counting() {
        let module = MockModule::new();
        let ptr = module.alloc(6).unwrap();
        module.write_bytes(ptr, b"hello\0").unwrap();
        assert_eq!(module.read_cstr(ptr).unwrap(), b"hello");
        assert_eq!(module.outstanding_host_allocs(), 1);
        module.release(ptr).unwrap();
        assert_eq!(module.outstanding_host_allocs(), 0);
        assert_eq!(
            module.release(ptr),
            Err(ModuleError::new(ERR_BAD_POINTER))
        );
    }

    #[test]
    fn double_free_is_detected() {
        let module = MockModule::new();
        let raw = module.create_chart().unwrap();
        let handle = NativeHandle(raw as u32);
        module.object_free(handle).unwrap();
        assert_eq!(
            module.object_free(handle),
            Err(ModuleError::new(ERR_DOUBLE_FREE))
        );
    }

    #[test]
    fn style_null_clears_subtree_to_defaults() {
        let module = MockModule::new();
        let raw = module.create_chart().unwrap();
        let chart = NativeHandle(raw as u32);
        let path = module.alloc(9).unwrap();
        module.write_bytes(path, b"fontSize\0").unwrap();
        let value = module.alloc(5).unwrap();
        module.write_bytes(value, b"20px\0").unwrap();
        module.style_set_value(chart, path, value).unwrap();
        assert_eq!(module.style_value_of("fontSize").unwrap(), "20px");
        let null_value = module.alloc(5).unwrap();
        module.write_bytes(null_value, b"null\0").unwrap();
        module.style_set_value(chart, path, null_value).unwrap();
        assert_eq!(module.style_value_of("fontSize").unwrap(), "11px");
    }

    #[test]
    fn unknown_config_path_is_a_fault() {
        let module = MockModule::new();
        let raw = module.create_chart().unwrap();
        let chart = NativeHandle(raw as u32);
        let path = module.alloc(8).unwrap();
        module.write_bytes(path, b"nonsense\0").unwrap_err();
        // 8 bytes cannot hold the terminator too
        let path = module.alloc(9).unwrap();
        module.write_bytes(path, b"nonsense\0").unwrap();
        let value = module.alloc(2).unwrap();
        module.write_bytes(value, b"1\0").unwrap();
        assert_eq!(
            module.chart_set_value(chart, path, value),
            Err(ModuleError::new(ERR_UNKNOWN_PATH))
        );
    }

    #[test]
    fn failure_injection_hits_once() {
        let module = MockModule::new();
        module.fail_next("version", 42);
        assert_eq!(module.version(), Err(ModuleError::new(42)));
        assert!(module.version().is_ok());
    }
}
