//! plotwire-bridge-core: host-side bridging layer for the chart compute
//! module.
//!
//! The compute module does the layout/animation math behind a flat,
//! numeric function table; this crate is everything between that table and
//! a safe host API: scoped string marshalling, an object registry with
//! exactly-once native frees, a path-based property proxy over nested
//! configuration trees, a strictly serialized animation request queue, and
//! a symmetric event/callback bridge.

pub mod chart;
pub mod control;
pub mod data;
pub mod error;
pub mod events;
pub mod input;
pub mod marshal;
pub mod options;
pub mod path;
pub mod proxy;
pub mod registry;
pub mod scheduler;
pub mod target;

pub use chart::Chart;
pub use control::AnimControl;
pub use data::{DataBridge, DataSet, DataValue, Record, Series, SeriesInfo, SeriesKind};
pub use error::BridgeError;
pub use events::{ChartEvent, EventBridge, ListenerId};
pub use input::{Key, KeyModifiers, Point, PointerEvent};
pub use options::BridgeOptions;
pub use path::PropertyPath;
pub use proxy::{PropertyProxy, ProxyTarget};
pub use registry::{ManagedObject, ObjectClass, ObjectRegistry, Snapshot, StoredAnimation};
pub use scheduler::{AnimationHandle, RequestState};
pub use target::{AnimOptions, AnimTarget, ChartState, Keyframe, KeyframeTarget};

// The boundary contract, re-exported for embedders implementing a module.
pub use plotwire_module_api as module_api;

/// Bridge result type.
pub type Result<T> = core::result::Result<T, BridgeError>;
