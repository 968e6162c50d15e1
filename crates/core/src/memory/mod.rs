//! In-memory host used by the scenario runner and the test suite.
//!
//! Signals raised by mutations are queued rather than delivered inline;
//! [`Session::pump`] drains the queue into the plugin, so no handler ever runs
//! inside another one.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tracing::debug;

use crate::{
    config::Capabilities,
    filter::SourceDefaults,
    host::{
        Crop, Host, MonitoringType, ObjectId, Scene, SceneItem, SceneItemRef, SceneRef, Settings,
        Source, SourceRef, SourceType, Task, TransformInfo, TransitionSlot, Vec2,
    },
    plugin::{self, Plugin},
    properties::PropertySheet,
    subscription::{FrontendEvent, Signal, SignalHub, SignalKey, SubscriptionTable},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Strips a trailing `_v<digits>` version suffix.
fn unversioned(kind: &str) -> &str {
    match kind.rsplit_once("_v") {
        Some((base, version))
            if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) =>
        {
            base
        }
        _ => kind,
    }
}

/// Blueprint for a source created through [`MemoryHost`].
#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub name: String,
    pub kind: String,
    pub source_type: SourceType,
    pub audio: bool,
    pub hidden: bool,
    pub settings: Settings,
}

impl SourceSpec {
    fn new(name: &str, kind: &str, source_type: SourceType) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            source_type,
            audio: false,
            hidden: false,
            settings: Settings::new(),
        }
    }

    pub fn input(name: &str, kind: &str) -> Self {
        Self::new(name, kind, SourceType::Input)
    }

    pub fn filter(name: &str, kind: &str) -> Self {
        Self::new(name, kind, SourceType::Filter)
    }

    pub fn transition(name: &str, kind: &str) -> Self {
        Self::new(name, kind, SourceType::Transition)
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

#[derive(Debug)]
struct SourceState {
    settings: Settings,
    filters: Vec<Arc<MemorySource>>,
    monitoring: MonitoringType,
    volume: f32,
    muted: bool,
    balance: f32,
    sync_offset: i64,
    mixers: u32,
    update_count: usize,
}

#[derive(Debug)]
pub struct MemorySource {
    id: ObjectId,
    name: String,
    kind: String,
    source_type: SourceType,
    audio: AtomicBool,
    hidden: AtomicBool,
    enabled: AtomicBool,
    state: Mutex<SourceState>,
}

impl MemorySource {
    fn new(id: ObjectId, spec: SourceSpec) -> Self {
        Self {
            id,
            name: spec.name,
            kind: spec.kind,
            source_type: spec.source_type,
            audio: AtomicBool::new(spec.audio),
            hidden: AtomicBool::new(spec.hidden),
            enabled: AtomicBool::new(true),
            state: Mutex::new(SourceState {
                settings: spec.settings,
                filters: Vec::new(),
                monitoring: MonitoringType::None,
                volume: 1.0,
                muted: false,
                balance: 0.5,
                sync_offset: 0,
                mixers: 0b11_1111,
                update_count: 0,
            }),
        }
    }

    /// How many times the update path ran.
    pub fn update_count(&self) -> usize {
        lock(&self.state).update_count
    }

    /// Overwrites the settings without running the update path, the way the
    /// host stores what a save callback produced.
    pub fn replace_settings(&self, settings: Settings) {
        lock(&self.state).settings = settings;
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn attach_filter(&self, filter: Arc<MemorySource>) {
        lock(&self.state).filters.push(filter);
    }

    fn detach_filter(&self, filter: ObjectId) -> bool {
        let mut state = lock(&self.state);
        let before = state.filters.len();
        state.filters.retain(|f| f.id != filter);
        state.filters.len() != before
    }
}

impl Source for MemorySource {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn kind(&self) -> String {
        self.kind.clone()
    }

    fn unversioned_kind(&self) -> String {
        unversioned(&self.kind).to_string()
    }

    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn has_audio(&self) -> bool {
        self.audio.load(Ordering::Acquire)
    }

    fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Acquire)
    }

    fn settings(&self) -> Settings {
        lock(&self.state).settings.clone()
    }

    fn update(&self, settings: &Settings) {
        let mut state = lock(&self.state);
        for (key, value) in settings {
            state.settings.insert(key.clone(), value.clone());
        }
        state.update_count += 1;
    }

    fn filters(&self) -> Vec<SourceRef> {
        lock(&self.state)
            .filters
            .iter()
            .map(|filter| Arc::clone(filter) as SourceRef)
            .collect()
    }

    fn monitoring_type(&self) -> MonitoringType {
        lock(&self.state).monitoring
    }

    fn set_monitoring_type(&self, monitoring: MonitoringType) {
        lock(&self.state).monitoring = monitoring;
    }

    fn volume(&self) -> f32 {
        lock(&self.state).volume
    }

    fn set_volume(&self, volume: f32) {
        lock(&self.state).volume = volume;
    }

    fn muted(&self) -> bool {
        lock(&self.state).muted
    }

    fn set_muted(&self, muted: bool) {
        lock(&self.state).muted = muted;
    }

    fn balance(&self) -> f32 {
        lock(&self.state).balance
    }

    fn set_balance(&self, balance: f32) {
        lock(&self.state).balance = balance;
    }

    fn sync_offset(&self) -> i64 {
        lock(&self.state).sync_offset
    }

    fn set_sync_offset(&self, offset: i64) {
        lock(&self.state).sync_offset = offset;
    }

    fn audio_mixers(&self) -> u32 {
        lock(&self.state).mixers
    }

    fn set_audio_mixers(&self, mixers: u32) {
        lock(&self.state).mixers = mixers;
    }
}

pub struct MemoryScene {
    id: ObjectId,
    name: Mutex<String>,
    /// Bottommost first; pushing adds on top.
    items: Mutex<Vec<Arc<MemorySceneItem>>>,
}

impl Scene for MemoryScene {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn name(&self) -> String {
        lock(&self.name).clone()
    }

    fn items(&self) -> Vec<SceneItemRef> {
        lock(&self.items)
            .iter()
            .map(|item| Arc::clone(item) as SceneItemRef)
            .collect()
    }
}

struct ItemState {
    info: TransformInfo,
    crop: Crop,
    visible: bool,
    transitions: [Option<SourceRef>; 2],
    durations: [u32; 2],
    defer_depth: u32,
    dirty: bool,
    update_count: usize,
}

impl ItemState {
    fn touch(&mut self) {
        if self.defer_depth == 0 {
            self.update_count += 1;
        } else {
            self.dirty = true;
        }
    }
}

pub struct MemorySceneItem {
    id: ObjectId,
    source: SourceRef,
    state: Mutex<ItemState>,
}

impl MemorySceneItem {
    /// How many transform updates reached the renderer.
    pub fn update_count(&self) -> usize {
        lock(&self.state).update_count
    }

    pub fn set_position(&self, pos: Vec2) {
        let mut state = lock(&self.state);
        state.info.pos = pos;
        state.touch();
    }
}

impl SceneItem for MemorySceneItem {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn source(&self) -> SourceRef {
        Arc::clone(&self.source)
    }

    fn info(&self) -> TransformInfo {
        lock(&self.state).info
    }

    fn set_info(&self, info: &TransformInfo) {
        let mut state = lock(&self.state);
        state.info = *info;
        state.touch();
    }

    fn crop(&self) -> Crop {
        lock(&self.state).crop
    }

    fn set_crop(&self, crop: &Crop) {
        let mut state = lock(&self.state);
        state.crop = *crop;
        state.touch();
    }

    fn defer_update_begin(&self) {
        lock(&self.state).defer_depth += 1;
    }

    fn defer_update_end(&self) {
        let mut state = lock(&self.state);
        state.defer_depth = state.defer_depth.saturating_sub(1);
        if state.defer_depth == 0 && state.dirty {
            state.dirty = false;
            state.update_count += 1;
        }
    }

    fn visible(&self) -> bool {
        lock(&self.state).visible
    }

    fn set_visible(&self, visible: bool) {
        lock(&self.state).visible = visible;
    }

    fn transition(&self, slot: TransitionSlot) -> Option<SourceRef> {
        lock(&self.state).transitions[slot.index()].clone()
    }

    fn set_transition(&self, slot: TransitionSlot, transition: Option<SourceRef>) {
        lock(&self.state).transitions[slot.index()] = transition;
    }

    fn transition_duration(&self, slot: TransitionSlot) -> u32 {
        lock(&self.state).durations[slot.index()]
    }

    fn set_transition_duration(&self, slot: TransitionSlot, duration_ms: u32) {
        lock(&self.state).durations[slot.index()] = duration_ms;
    }
}

/// Something the host wants the plugin to see.
pub enum HostEvent {
    Signal { key: SignalKey, signal: Signal },
    /// A save was requested for this source.
    Save(ObjectId),
}

#[derive(Default)]
pub struct MemoryHost {
    next_id: AtomicU64,
    /// Every source the host knows about, including filters and private
    /// transition copies.
    registry: Mutex<Vec<Arc<MemorySource>>>,
    /// Filter id to the id of the source it is attached to.
    parents: Mutex<HashMap<ObjectId, ObjectId>>,
    scenes: Mutex<Vec<Arc<MemoryScene>>>,
    signals: SubscriptionTable,
    events: Mutex<VecDeque<HostEvent>>,
    tasks: Mutex<Vec<Task>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn emit(&self, key: SignalKey, signal: Signal) {
        debug!(signal = signal.name(), ?key, "queued signal");
        lock(&self.events).push_back(HostEvent::Signal { key, signal });
    }

    fn register(&self, spec: SourceSpec) -> Arc<MemorySource> {
        let source = Arc::new(MemorySource::new(self.allocate_id(), spec));
        lock(&self.registry).push(Arc::clone(&source));
        source
    }

    pub fn create_source(&self, spec: SourceSpec) -> Arc<MemorySource> {
        let source = self.register(spec);
        self.emit(
            SignalKey::SourceCreate,
            Signal::SourceCreated(Arc::clone(&source) as SourceRef),
        );
        source
    }

    /// Creates a filter and attaches it on top of `parent`'s filter chain.
    pub fn create_filter(&self, parent: &MemorySource, spec: SourceSpec) -> Arc<MemorySource> {
        let filter = self.register(spec);
        parent.attach_filter(Arc::clone(&filter));
        lock(&self.parents).insert(filter.id, parent.id);
        self.emit(
            SignalKey::SourceCreate,
            Signal::SourceCreated(Arc::clone(&filter) as SourceRef),
        );
        filter
    }

    /// Detaches a filter from its parent and forgets it.
    pub fn remove_filter(&self, filter: ObjectId) -> bool {
        let Some(parent) = lock(&self.parents).remove(&filter) else {
            return false;
        };
        if let Some(parent) = self.source(parent) {
            parent.detach_filter(filter);
        }
        lock(&self.registry).retain(|source| source.id != filter);
        true
    }

    pub fn create_scene(&self, name: &str) -> Arc<MemoryScene> {
        let scene = Arc::new(MemoryScene {
            id: self.allocate_id(),
            name: Mutex::new(name.to_string()),
            items: Mutex::new(Vec::new()),
        });
        lock(&self.scenes).push(Arc::clone(&scene));
        // scenes are sources too, so they arrive on the creation signal
        self.emit(
            SignalKey::SourceCreate,
            Signal::SceneCreated(Arc::clone(&scene) as SceneRef),
        );
        scene
    }

    /// Adds `source` on top of `scene`.
    pub fn add_item(&self, scene: &Arc<MemoryScene>, source: &SourceRef) -> Arc<MemorySceneItem> {
        let item = Arc::new(MemorySceneItem {
            id: self.allocate_id(),
            source: Arc::clone(source),
            state: Mutex::new(ItemState {
                info: TransformInfo::default(),
                crop: Crop::default(),
                visible: true,
                transitions: [None, None],
                durations: [0, 0],
                defer_depth: 0,
                dirty: false,
                update_count: 0,
            }),
        });
        lock(&scene.items).push(Arc::clone(&item));
        self.emit(
            SignalKey::ItemAdd(scene.id),
            Signal::ItemAdded {
                scene: Arc::clone(scene) as SceneRef,
                item: Arc::clone(&item) as SceneItemRef,
            },
        );
        item
    }

    pub fn rename_scene(&self, scene: &MemoryScene, new_name: &str) {
        let prev_name = std::mem::replace(&mut *lock(&scene.name), new_name.to_string());
        self.emit(
            SignalKey::SceneRename(scene.id),
            Signal::SceneRenamed {
                scene: scene.id,
                new_name: new_name.to_string(),
                prev_name,
            },
        );
    }

    /// Drops the host's reference to a scene. Returns whether it existed.
    pub fn remove_scene(&self, scene: ObjectId) -> bool {
        let removed = {
            let mut scenes = lock(&self.scenes);
            let before = scenes.len();
            scenes.retain(|s| s.id != scene);
            scenes.len() != before
        };
        if removed {
            self.emit(
                SignalKey::SceneDestroy(scene),
                Signal::SceneDestroyed { scene },
            );
        }
        removed
    }

    pub fn set_filter_enabled(&self, filter: ObjectId, enabled: bool) {
        if let Some(source) = self.source(filter) {
            source.enabled.store(enabled, Ordering::Release);
        }
        self.emit(SignalKey::Enable(filter), Signal::Enable { enabled });
    }

    pub fn frontend(&self, event: FrontendEvent) {
        self.emit(SignalKey::Frontend, Signal::Frontend(event));
    }

    pub fn source(&self, id: ObjectId) -> Option<Arc<MemorySource>> {
        lock(&self.registry)
            .iter()
            .find(|source| source.id == id)
            .cloned()
    }

    /// Input source with this name.
    pub fn source_by_name(&self, name: &str) -> Option<Arc<MemorySource>> {
        lock(&self.registry)
            .iter()
            .find(|source| source.source_type == SourceType::Input && source.name == name)
            .cloned()
    }

    /// Input sources in creation order.
    pub fn inputs(&self) -> Vec<Arc<MemorySource>> {
        lock(&self.registry)
            .iter()
            .filter(|source| source.source_type == SourceType::Input)
            .cloned()
            .collect()
    }

    pub fn scene(&self, name: &str) -> Option<Arc<MemoryScene>> {
        lock(&self.scenes)
            .iter()
            .find(|scene| *lock(&scene.name) == name)
            .cloned()
    }

    pub fn signals_table(&self) -> &SubscriptionTable {
        &self.signals
    }

    pub fn next_event(&self) -> Option<HostEvent> {
        lock(&self.events).pop_front()
    }

    /// Discards every queued event.
    pub fn drain_events(&self) -> usize {
        let mut events = lock(&self.events);
        let count = events.len();
        events.clear();
        count
    }

    pub fn pending_tasks(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn take_tasks(&self) -> Vec<Task> {
        std::mem::take(&mut *lock(&self.tasks))
    }

    /// Runs every queued task and returns how many ran.
    pub fn run_tasks(&self) -> usize {
        let tasks = self.take_tasks();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

impl Host for MemoryHost {
    fn scenes(&self) -> Vec<SceneRef> {
        lock(&self.scenes)
            .iter()
            .map(|scene| Arc::clone(scene) as SceneRef)
            .collect()
    }

    fn filter_parent(&self, filter: &SourceRef) -> Option<SourceRef> {
        let parent = lock(&self.parents).get(&filter.id()).copied()?;
        self.source(parent).map(|source| source as SourceRef)
    }

    fn duplicate_filter(&self, dst: &SourceRef, filter: &SourceRef) {
        let Some(target) = self.source(dst.id()) else {
            debug!(dst = %dst.name(), "filter target is not known to this host");
            return;
        };
        let spec = SourceSpec::filter(&filter.name(), &filter.kind()).with_settings(filter.settings());
        self.create_filter(&target, spec);
    }

    fn duplicate_transition(&self, transition: &SourceRef, name: &str) -> Option<SourceRef> {
        // private copy: never announced on the creation signal
        let spec = SourceSpec::transition(name, &transition.kind()).with_settings(transition.settings());
        Some(self.register(spec) as SourceRef)
    }

    fn queue_task(&self, task: Task) {
        lock(&self.tasks).push(task);
    }

    fn save_source(&self, source: &SourceRef) {
        lock(&self.events).push_back(HostEvent::Save(source.id()));
    }

    fn signals(&self) -> &dyn SignalHub {
        &self.signals
    }
}

/// A [`MemoryHost`] with the plugin loaded into it.
pub struct Session {
    host: MemoryHost,
    plugin: Plugin,
}

impl Session {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            host: MemoryHost::new(),
            plugin: Plugin::load(capabilities),
        }
    }

    pub fn host(&self) -> &MemoryHost {
        &self.host
    }

    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    /// Delivers queued events until none are left. Returns how many were
    /// processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Some(event) = self.host.next_event() {
            processed += 1;
            match event {
                HostEvent::Signal { key, signal } => {
                    self.plugin.deliver(&self.host, key, &signal);
                    // a destroyed scene takes its signal handlers with it
                    if let Signal::SceneDestroyed { scene } = signal {
                        self.host.signals.forget_emitter(scene);
                    }
                }
                HostEvent::Save(id) => {
                    let Some(source) = self.host.source(id) else {
                        continue;
                    };
                    let mut settings = source.settings();
                    self.plugin.save_instance(id, &mut settings);
                    source.replace_settings(settings);
                }
            }
        }
        processed
    }

    pub fn finish_loading(&mut self) {
        self.host.frontend(FrontendEvent::FinishedLoading);
        self.pump();
    }

    /// Attaches a filter of `kind` named "Source Defaults".
    pub fn attach_filter(
        &mut self,
        parent: &Arc<MemorySource>,
        kind: &str,
        settings: Settings,
    ) -> ObjectId {
        self.attach_filter_with(
            parent,
            SourceSpec::filter(plugin::DISPLAY_NAME, kind).with_settings(settings),
        )
    }

    /// Attaches a filter. An instance is created when the kind is one of the
    /// plugin's own; anything else is a plain filter.
    pub fn attach_filter_with(&mut self, parent: &Arc<MemorySource>, spec: SourceSpec) -> ObjectId {
        // the parent already exists when a filter is added to it
        self.pump();
        let filter = self.host.create_filter(parent, spec);
        if plugin::is_filter_kind(&filter.kind) {
            self.plugin.create_instance(&self.host, filter.clone());
        }
        filter.id
    }

    pub fn detach_filter(&mut self, filter: ObjectId) {
        self.plugin.destroy_instance(&self.host, filter);
        self.host.remove_filter(filter);
    }

    /// Merges `settings` into the filter and runs its update callback.
    pub fn update_filter(&mut self, filter: ObjectId, settings: Settings) {
        let Some(source) = self.host.source(filter) else {
            return;
        };
        source.update(&settings);
        self.plugin.update_instance(&self.host, filter, &source.settings());
    }

    /// Shows or hides a filter in the host UI.
    pub fn set_filter_visible(&mut self, filter: ObjectId, visible: bool) {
        if let Some(source) = self.host.source(filter) {
            source.set_hidden(!visible);
        }
        if visible {
            self.plugin.show_instance(&self.host, filter);
        } else {
            self.plugin.hide_instance(&self.host, filter);
        }
    }

    pub fn properties(&mut self, filter: ObjectId) -> Option<PropertySheet> {
        self.plugin.properties(&self.host, filter)
    }

    pub fn run_tasks(&self) -> usize {
        self.host.run_tasks()
    }

    pub fn instance(&self, filter: ObjectId) -> Option<&SourceDefaults> {
        self.plugin.instance(filter)
    }

    pub fn filter_ids(&self) -> Vec<ObjectId> {
        self.plugin.instance_ids()
    }

    /// The Source Defaults filter attached to `parent`, if any.
    pub fn filter_on(&self, parent: &MemorySource) -> Option<ObjectId> {
        parent
            .filters()
            .iter()
            .map(|filter| filter.id())
            .find(|id| self.plugin.instance(*id).is_some())
    }

    /// Unloads the plugin, destroying every instance.
    pub fn unload(self) -> MemoryHost {
        self.plugin.unload(&self.host);
        self.host
    }
}
