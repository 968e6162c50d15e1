//! JSON-described host sessions, replayed against the in-memory host.

use std::{fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::{Capabilities, VIDEO_FILTER_KIND},
    error::{Result, SourceDefaultsError},
    host::{
        Crop, Host, MonitoringType, ObjectId, Scene, SceneItem, Settings, Source, SourceRef,
        TransformInfo, TransitionSlot, Vec2,
    },
    memory::{MemoryHost, MemoryScene, MemorySource, Session, SourceSpec},
    plugin,
    subscription::FrontendEvent,
};

fn default_true() -> bool {
    true
}

fn default_filter_kind() -> String {
    VIDEO_FILTER_KIND.to_string()
}

/// A filter that is not one of ours, e.g. a color correction.
#[derive(Debug, Clone, Deserialize)]
pub struct PlainFilterDecl {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceDecl {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub audio: bool,
    pub volume: Option<f32>,
    pub muted: Option<bool>,
    pub balance: Option<f32>,
    pub sync_offset: Option<i64>,
    pub mixers: Option<u32>,
    pub monitoring: Option<MonitoringType>,
    #[serde(default)]
    pub filters: Vec<PlainFilterDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDecl {
    pub source: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    pub position: Option<[f32; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SceneDecl {
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemDecl>,
}

/// A Source Defaults filter attached to `parent`.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterDecl {
    pub parent: String,
    #[serde(default = "default_filter_kind")]
    pub kind: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    FinishLoading,
    CollectionChanging,
    CollectionChanged,
    CreateSource(SourceDecl),
    CreateScene {
        name: String,
    },
    AddItem {
        scene: String,
        source: String,
        #[serde(default = "default_true")]
        visible: bool,
        position: Option<[f32; 2]>,
    },
    RenameScene {
        scene: String,
        to: String,
    },
    RemoveScene {
        scene: String,
    },
    UpdateFilter {
        parent: String,
        settings: Settings,
    },
    EnableFilter {
        parent: String,
        enabled: bool,
    },
    RunTasks,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config_only: bool,
    #[serde(default)]
    pub loaded: bool,
    #[serde(default)]
    pub sources: Vec<SourceDecl>,
    #[serde(default)]
    pub scenes: Vec<SceneDecl>,
    #[serde(default)]
    pub filters: Vec<FilterDecl>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSnapshot {
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub name: String,
    pub kind: String,
    pub settings: Settings,
    pub volume: f32,
    pub muted: bool,
    pub balance: f32,
    pub sync_offset: i64,
    pub audio_mixers: u32,
    pub monitoring: MonitoringType,
    pub filters: Vec<FilterSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSnapshot {
    pub source: String,
    pub visible: bool,
    pub transform: TransformInfo,
    pub crop: Crop,
    pub show_transition: Option<String>,
    pub hide_transition: Option<String>,
    pub show_duration: u32,
    pub hide_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSnapshot {
    pub name: String,
    pub items: Vec<ItemSnapshot>,
}

/// Object graph after a scenario ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub loaded: bool,
    pub sources: Vec<SourceSnapshot>,
    pub scenes: Vec<SceneSnapshot>,
}

impl Snapshot {
    fn capture(session: &Session) -> Self {
        let host = session.host();
        Self {
            loaded: session.plugin().gate().is_loaded(),
            sources: host.inputs().iter().map(|source| source_snapshot(host, source)).collect(),
            scenes: host
                .scenes()
                .iter()
                .map(|scene| SceneSnapshot {
                    name: scene.name(),
                    items: scene.items().iter().map(|item| item_snapshot(item.as_ref())).collect(),
                })
                .collect(),
        }
    }

    pub fn source(&self, name: &str) -> Option<&SourceSnapshot> {
        self.sources.iter().find(|source| source.name == name)
    }

    pub fn scene(&self, name: &str) -> Option<&SceneSnapshot> {
        self.scenes.iter().find(|scene| scene.name == name)
    }
}

fn source_snapshot(host: &MemoryHost, source: &MemorySource) -> SourceSnapshot {
    SourceSnapshot {
        name: source.name(),
        kind: source.kind(),
        settings: source.settings(),
        volume: source.volume(),
        muted: source.muted(),
        balance: source.balance(),
        sync_offset: source.sync_offset(),
        audio_mixers: source.audio_mixers(),
        monitoring: source.monitoring_type(),
        filters: source
            .filters()
            .iter()
            .map(|filter| FilterSnapshot {
                name: filter.name(),
                kind: filter.kind(),
                enabled: host
                    .source(filter.id())
                    .map_or(true, |filter| filter.is_enabled()),
                settings: filter.settings(),
            })
            .collect(),
    }
}

fn item_snapshot(item: &dyn SceneItem) -> ItemSnapshot {
    let transition_name = |slot| item.transition(slot).map(|t: SourceRef| t.name());
    ItemSnapshot {
        source: item.source().name(),
        visible: item.visible(),
        transform: item.info(),
        crop: item.crop(),
        show_transition: transition_name(TransitionSlot::Show),
        hide_transition: transition_name(TransitionSlot::Hide),
        show_duration: item.transition_duration(TransitionSlot::Show),
        hide_duration: item.transition_duration(TransitionSlot::Hide),
    }
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn capabilities(&self) -> Capabilities {
        if self.config_only {
            Capabilities::config_only()
        } else {
            Capabilities::full()
        }
    }

    /// Builds the initial object graph, attaches the filters, runs every step
    /// and returns the final graph.
    pub fn run(&self) -> Result<Snapshot> {
        let mut session = Session::new(self.capabilities());

        for decl in &self.sources {
            create_source(&session, decl);
        }
        for decl in &self.scenes {
            let scene = session.host().create_scene(&decl.name);
            for item in &decl.items {
                add_item(session.host(), &scene, item)?;
            }
        }
        if self.loaded {
            session.finish_loading();
        }
        for decl in &self.filters {
            let parent = find_source(session.host(), &decl.parent)?;
            session.attach_filter_with(
                &parent,
                SourceSpec::filter(plugin::DISPLAY_NAME, &decl.kind)
                    .with_settings(decl.settings.clone())
                    .hidden(decl.hidden),
            );
        }
        session.pump();

        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, ?step, "scenario step");
            apply_step(&mut session, step)?;
            session.pump();
        }

        let snapshot = Snapshot::capture(&session);
        session.unload();
        info!(
            sources = snapshot.sources.len(),
            scenes = snapshot.scenes.len(),
            "scenario finished"
        );
        Ok(snapshot)
    }
}

fn apply_step(session: &mut Session, step: &Step) -> Result<()> {
    match step {
        Step::FinishLoading => session.host().frontend(FrontendEvent::FinishedLoading),
        Step::CollectionChanging => session
            .host()
            .frontend(FrontendEvent::SceneCollectionChanging),
        Step::CollectionChanged => session
            .host()
            .frontend(FrontendEvent::SceneCollectionChanged),
        Step::CreateSource(decl) => {
            create_source(session, decl);
        }
        Step::CreateScene { name } => {
            session.host().create_scene(name);
        }
        Step::AddItem {
            scene,
            source,
            visible,
            position,
        } => {
            let scene = find_scene(session.host(), scene)?;
            let item = ItemDecl {
                source: source.clone(),
                visible: *visible,
                position: *position,
            };
            add_item(session.host(), &scene, &item)?;
        }
        Step::RenameScene { scene, to } => {
            let scene = find_scene(session.host(), scene)?;
            session.host().rename_scene(&scene, to);
        }
        Step::RemoveScene { scene } => {
            let id = find_scene(session.host(), scene)?.id();
            session.host().remove_scene(id);
        }
        Step::UpdateFilter { parent, settings } => {
            let filter = find_filter(session, parent)?;
            session.update_filter(filter, settings.clone());
        }
        Step::EnableFilter { parent, enabled } => {
            let filter = find_filter(session, parent)?;
            session.host().set_filter_enabled(filter, *enabled);
        }
        Step::RunTasks => {
            let ran = session.run_tasks();
            debug!(ran, "ran render tasks");
        }
    }
    Ok(())
}

fn create_source(session: &Session, decl: &SourceDecl) -> Arc<MemorySource> {
    let host = session.host();
    let source = host.create_source(
        SourceSpec::input(&decl.name, &decl.kind)
            .with_settings(decl.settings.clone())
            .with_audio(decl.audio),
    );
    if let Some(volume) = decl.volume {
        source.set_volume(volume);
    }
    if let Some(muted) = decl.muted {
        source.set_muted(muted);
    }
    if let Some(balance) = decl.balance {
        source.set_balance(balance);
    }
    if let Some(offset) = decl.sync_offset {
        source.set_sync_offset(offset);
    }
    if let Some(mixers) = decl.mixers {
        source.set_audio_mixers(mixers);
    }
    if let Some(monitoring) = decl.monitoring {
        source.set_monitoring_type(monitoring);
    }
    for filter in &decl.filters {
        host.create_filter(
            &source,
            SourceSpec::filter(&filter.name, &filter.kind).with_settings(filter.settings.clone()),
        );
    }
    source
}

fn add_item(host: &MemoryHost, scene: &Arc<MemoryScene>, decl: &ItemDecl) -> Result<()> {
    let source: SourceRef = find_source(host, &decl.source)?;
    let item = host.add_item(scene, &source);
    item.set_visible(decl.visible);
    if let Some([x, y]) = decl.position {
        item.set_position(Vec2::new(x, y));
    }
    Ok(())
}

fn find_source(host: &MemoryHost, name: &str) -> Result<Arc<MemorySource>> {
    host.source_by_name(name)
        .ok_or_else(|| SourceDefaultsError::UnknownSource(name.to_string()))
}

fn find_scene(host: &MemoryHost, name: &str) -> Result<Arc<MemoryScene>> {
    host.scene(name)
        .ok_or_else(|| SourceDefaultsError::UnknownScene(name.to_string()))
}

fn find_filter(session: &Session, parent: &str) -> Result<ObjectId> {
    let source = find_source(session.host(), parent)?;
    session
        .filter_on(&source)
        .ok_or_else(|| SourceDefaultsError::UnknownFilter(parent.to_string()))
}
