//! Core library for the Source Defaults filter.
//!
//! A Source Defaults filter sits on a template source. Whenever another source
//! of the same kind is created, the filter copies the template's settings,
//! filters and audio values onto it, and, once the new source is placed in a
//! scene, the template's transform, visibility and show/hide transitions from
//! a chosen parent scene. The host is reached only through the traits in
//! [`host`]; [`memory`] provides an in-process host for replaying scenarios.

pub mod config;
pub mod encounter;
pub mod error;
pub mod filter;
pub mod host;
pub mod memory;
pub mod plugin;
pub mod propagate;
pub mod properties;
pub mod resolve;
pub mod scenario;
pub mod subscription;
pub mod weak;

pub use config::{
    catalog, Capabilities, FilterSettings, OptionDescriptor, SceneItemOption, SourceOption,
};
pub use encounter::Encounter;
pub use error::{Result, SourceDefaultsError};
pub use filter::SourceDefaults;
pub use host::{Host, ObjectId, Scene, SceneItem, Settings, Source};
pub use memory::{MemoryHost, Session, SourceSpec};
pub use plugin::{FilterInfo, Plugin, FILTER_INFOS};
pub use propagate::{Outcome, Skip};
pub use properties::PropertySheet;
pub use resolve::{ResolveMiss, TemplateBinding};
pub use scenario::{Scenario, Snapshot};
pub use subscription::{FrontendEvent, LoadGate, Signal, SignalKey};
pub use weak::WeakSlot;
