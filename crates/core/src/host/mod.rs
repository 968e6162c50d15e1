//! Interfaces to the host application's object graph.
//!
//! The host owns every source, scene and scene item. The engine only ever
//! borrows them through the `Arc` handles defined here and keeps
//! [`std::sync::Weak`] handles (see [`crate::weak`]) across callbacks.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::subscription::SignalHub;

/// Persisted settings object of a source.
pub type Settings = serde_json::Map<String, serde_json::Value>;

pub type SourceRef = Arc<dyn Source>;
pub type SceneRef = Arc<dyn Scene>;
pub type SceneItemRef = Arc<dyn SceneItem>;

/// Unit of work submitted to the host's render task queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Stable identity of a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Input,
    Filter,
    Transition,
    Scene,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringType {
    #[default]
    None,
    MonitorOnly,
    MonitorAndOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsType {
    #[default]
    None,
    Stretch,
    ScaleInner,
    ScaleOuter,
    ScaleToWidth,
    ScaleToHeight,
    MaxOnly,
}

/// Position, rotation, scale and bounds of a scene item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformInfo {
    pub pos: Vec2,
    pub rot: f32,
    pub scale: Vec2,
    pub alignment: u32,
    pub bounds_type: BoundsType,
    pub bounds_alignment: u32,
    pub bounds: Vec2,
}

impl Default for TransformInfo {
    fn default() -> Self {
        Self {
            pos: Vec2::default(),
            rot: 0.0,
            scale: Vec2::new(1.0, 1.0),
            alignment: 5,
            bounds_type: BoundsType::None,
            bounds_alignment: 0,
            bounds: Vec2::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Crop {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// The two transition slots of a scene item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSlot {
    Show,
    Hide,
}

impl TransitionSlot {
    pub const ALL: [Self; 2] = [Self::Show, Self::Hide];

    pub fn index(self) -> usize {
        match self {
            Self::Show => 0,
            Self::Hide => 1,
        }
    }

    /// Name given to a transition copied into this slot of `owner`'s item.
    pub fn copy_name(self, owner: &str) -> String {
        match self {
            Self::Show => format!("{owner} Show Transition"),
            Self::Hide => format!("{owner} Hide Transition"),
        }
    }
}

/// A configurable host object: input, filter or transition.
pub trait Source: Send + Sync {
    fn id(&self) -> ObjectId;
    fn name(&self) -> String;
    /// Versioned kind identifier, e.g. `ffmpeg_source` or `text_gdiplus_v2`.
    fn kind(&self) -> String;
    fn unversioned_kind(&self) -> String;
    fn source_type(&self) -> SourceType;
    fn has_audio(&self) -> bool;
    fn is_hidden(&self) -> bool;

    fn settings(&self) -> Settings;
    /// Merges `settings` into the current settings and runs the source's
    /// update path.
    fn update(&self, settings: &Settings);

    /// Attached filters, in the order they are applied.
    fn filters(&self) -> Vec<SourceRef>;

    fn monitoring_type(&self) -> MonitoringType;
    fn set_monitoring_type(&self, monitoring: MonitoringType);
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);
    fn balance(&self) -> f32;
    fn set_balance(&self, balance: f32);
    fn sync_offset(&self) -> i64;
    fn set_sync_offset(&self, offset: i64);
    fn audio_mixers(&self) -> u32;
    fn set_audio_mixers(&self, mixers: u32);
}

/// A scene: an ordered list of scene items.
pub trait Scene: Send + Sync {
    fn id(&self) -> ObjectId;
    fn name(&self) -> String;
    /// Items in render order, bottommost first.
    fn items(&self) -> Vec<SceneItemRef>;
}

/// Placement of one source within one scene.
pub trait SceneItem: Send + Sync {
    fn id(&self) -> ObjectId;
    fn source(&self) -> SourceRef;

    fn info(&self) -> TransformInfo;
    fn set_info(&self, info: &TransformInfo);
    fn crop(&self) -> Crop;
    fn set_crop(&self, crop: &Crop);
    /// Transform changes between begin and end are applied as one update.
    fn defer_update_begin(&self);
    fn defer_update_end(&self);

    fn visible(&self) -> bool;
    fn set_visible(&self, visible: bool);

    fn transition(&self, slot: TransitionSlot) -> Option<SourceRef>;
    fn set_transition(&self, slot: TransitionSlot, transition: Option<SourceRef>);
    fn transition_duration(&self, slot: TransitionSlot) -> u32;
    fn set_transition_duration(&self, slot: TransitionSlot, duration_ms: u32);
}

/// Global host services.
pub trait Host {
    fn scenes(&self) -> Vec<SceneRef>;

    /// Exact, case-sensitive lookup. An empty name never matches.
    fn scene_by_name(&self, name: &str) -> Option<SceneRef> {
        if name.is_empty() {
            return None;
        }
        self.scenes().into_iter().find(|scene| scene.name() == name)
    }

    fn scene_names(&self) -> Vec<String> {
        self.scenes().iter().map(|scene| scene.name()).collect()
    }

    /// The source a filter is attached to.
    fn filter_parent(&self, filter: &SourceRef) -> Option<SourceRef>;

    /// Attaches a copy of `filter` to `dst`.
    fn duplicate_filter(&self, dst: &SourceRef, filter: &SourceRef);

    /// Creates a private copy of a transition under `name`.
    fn duplicate_transition(&self, transition: &SourceRef, name: &str) -> Option<SourceRef>;

    /// Runs `task` once, later, on the render task queue.
    fn queue_task(&self, task: Task);

    /// Asks the host to persist `source`, which calls back into its save path.
    fn save_source(&self, source: &SourceRef);

    fn signals(&self) -> &dyn SignalHub;
}
