//! One attached Source Defaults filter.

use tracing::{debug, warn};

use crate::{
    config::{
        Capabilities, FilterSettings, SceneItemOption, SceneItemOptions, SourceOption,
        SourceOptions,
    },
    encounter::{self, Encounter},
    host::{Host, ObjectId, SceneItemRef, SceneRef, Settings, Source, SourceRef, SourceType},
    propagate::{self, DeferredVisibility, Outcome, Skip},
    properties::{self, PropertySheet},
    resolve::{self, ResolveMiss, TemplateBinding},
    subscription::{FrontendEvent, LoadGate, Signal, SignalKey, Subscriptions},
    weak::WeakSlot,
};

/// Per-filter engine state.
///
/// Lifecycle: [`SourceDefaults::create`] binds settings and, unless the
/// filter is hidden, starts observing source creation; enable/disable and
/// show/hide toggle that observer; [`SourceDefaults::destroy`] detaches
/// everything and drops every handle.
pub struct SourceDefaults {
    id: ObjectId,
    filter: SourceRef,
    capabilities: Capabilities,
    gate: LoadGate,
    options: SourceOptions,
    scene_item_options: SceneItemOptions,
    parent_source: WeakSlot<dyn Source>,
    /// Sibling waiting for its first scene item.
    dst_source: WeakSlot<dyn Source>,
    parent_scene: TemplateBinding,
    deferred: DeferredVisibility,
    subscriptions: Subscriptions,
}

impl SourceDefaults {
    pub fn create(
        host: &dyn Host,
        filter: SourceRef,
        settings: &Settings,
        capabilities: Capabilities,
        gate: LoadGate,
    ) -> Self {
        let id = filter.id();
        let mut instance = Self {
            id,
            filter,
            capabilities,
            gate,
            options: SourceOptions::all(false),
            scene_item_options: SceneItemOptions::all(false),
            parent_source: WeakSlot::new(),
            dst_source: WeakSlot::new(),
            parent_scene: TemplateBinding::new(),
            deferred: DeferredVisibility::new(),
            subscriptions: Subscriptions::new(id),
        };
        instance.update(host, settings);

        instance
            .subscriptions
            .attach(host.signals(), SignalKey::Enable(id));
        if !instance.filter.is_hidden() {
            instance.set_enabled(host, true);
        }

        if capabilities.placement_sync {
            if instance.gate.is_loaded() {
                instance.watch_all_scenes(host);
            } else {
                instance
                    .subscriptions
                    .attach(host.signals(), SignalKey::Frontend);
            }
        }
        instance
    }

    /// Re-reads the options. A changed parent scene name is resolved right
    /// away once the host has loaded, otherwise at load time.
    pub fn update(&mut self, host: &dyn Host, settings: &Settings) {
        let decoded = FilterSettings::from_settings(settings, self.capabilities);
        self.options = decoded.options;
        self.scene_item_options = decoded.scene_item_options;
        self.deferred
            .set_enabled(self.scene_item_options.is_enabled(SceneItemOption::Visibility));

        let renamed = self.parent_scene.set_name(&decoded.parent_scene);
        if self.capabilities.placement_sync && self.gate.is_loaded() && renamed {
            self.rebind_parent_scene(host);
        }
    }

    /// Persists the parent scene name, which may have followed a rename.
    pub fn save(&self, settings: &mut Settings) {
        self.parent_scene.save(settings);
    }

    /// Detaches every subscription and drops every handle, including a
    /// deferred visibility pair that has not run yet.
    pub fn destroy(mut self, host: &dyn Host) {
        self.subscriptions.detach_all(host.signals());
        self.deferred.cancel();
        self.parent_source.release();
        self.dst_source.release();
        self.parent_scene.release();
        debug!(filter = %self.filter.name(), "source defaults filter destroyed");
    }

    /// Starts or stops observing source creation.
    pub fn set_enabled(&mut self, host: &dyn Host, enabled: bool) {
        if enabled {
            self.subscriptions
                .attach(host.signals(), SignalKey::SourceCreate);
        } else {
            self.subscriptions
                .detach(host.signals(), SignalKey::SourceCreate);
        }
    }

    /// Same as enabling.
    pub fn show(&mut self, host: &dyn Host) {
        self.set_enabled(host, true);
    }

    /// Same as disabling.
    pub fn hide(&mut self, host: &dyn Host) {
        self.set_enabled(host, false);
    }

    /// Entry point for every signal this instance is subscribed to.
    pub fn handle(&mut self, host: &dyn Host, signal: &Signal) {
        match signal {
            Signal::SourceCreated(source) => {
                self.on_source_created(host, source);
            }
            Signal::SceneCreated(scene) => self.on_scene_created(host, scene),
            Signal::ItemAdded { item, .. } => {
                self.on_item_added(host, item);
            }
            Signal::Enable { enabled } => self.set_enabled(host, *enabled),
            Signal::SceneDestroyed { scene } => self.on_scene_destroyed(host, *scene),
            Signal::SceneRenamed { new_name, .. } => self.on_parent_scene_renamed(host, new_name),
            Signal::Frontend(event) => self.on_frontend_event(host, *event),
        }
    }

    pub fn on_source_created(&mut self, host: &dyn Host, dst: &SourceRef) -> Outcome<SourceOption> {
        if !self.gate.is_loaded() {
            return Outcome::Skipped(Skip::NotLoaded);
        }

        let parent = host.filter_parent(&self.filter);
        self.parent_source.bind(parent.as_ref());
        let Some(parent) = parent else {
            warn!("Filter has no parent source, so new source was skipped.");
            return Outcome::Skipped(Skip::NoParent);
        };

        if parent.kind() != dst.kind() {
            return Outcome::Skipped(Skip::KindMismatch);
        }
        if dst.source_type() != SourceType::Input {
            return Outcome::Skipped(Skip::NotInput);
        }

        let copy_properties = self.options.is_enabled(SourceOption::Properties);
        if encounter::classify(dst.as_ref(), copy_properties) == Encounter::Recreated {
            return Outcome::Skipped(Skip::AlreadyEncountered);
        }

        let applied = propagate::copy_source_options(host, &parent, dst, &self.options);
        if self.capabilities.placement_sync && self.scene_item_options.any() {
            self.dst_source.bind(Some(dst));
        }
        propagate::log_applied(&applied, &parent.name(), &dst.name());
        Outcome::Applied(applied)
    }

    pub fn on_scene_created(&mut self, host: &dyn Host, scene: &SceneRef) {
        if !self.gate.is_loaded() || !self.capabilities.placement_sync {
            return;
        }
        self.watch_scene(host, scene.id());
    }

    pub fn on_item_added(&mut self, host: &dyn Host, item: &SceneItemRef) -> Outcome<SceneItemOption> {
        let Some(dst) = self.dst_source.resolve() else {
            return Outcome::Skipped(Skip::NotTracked);
        };
        if item.source().id() != dst.id() {
            return Outcome::Skipped(Skip::NotTracked);
        }
        self.dst_source.release();
        self.apply_scene_item_defaults(host, item)
    }

    fn apply_scene_item_defaults(
        &mut self,
        host: &dyn Host,
        dst_item: &SceneItemRef,
    ) -> Outcome<SceneItemOption> {
        let Some(scene) = self.parent_scene.resolve() else {
            let miss = ResolveMiss::SceneNotFound(self.parent_scene.name().to_string());
            warn!("{miss}");
            return Outcome::Skipped(Skip::Unresolved(miss));
        };

        let parent = self.parent_source.resolve();
        let parent_name = parent.as_ref().map(|source| source.name()).unwrap_or_default();
        let template = parent
            .as_ref()
            .and_then(|source| resolve::find_item(scene.as_ref(), source.id()));
        let Some(template) = template else {
            let miss = ResolveMiss::ItemNotFound {
                scene: self.parent_scene.name().to_string(),
                source_name: parent_name,
            };
            warn!("{miss}");
            return Outcome::Skipped(Skip::Unresolved(miss));
        };

        let applied = propagate::copy_scene_item_options(
            host,
            &template,
            dst_item,
            &self.scene_item_options,
            &self.deferred,
        );
        propagate::log_applied(&applied, &parent_name, &dst_item.source().name());
        Outcome::Applied(applied)
    }

    /// Forgets every signal of a destroyed scene, then handles the parent
    /// scene case.
    pub fn on_scene_destroyed(&mut self, host: &dyn Host, scene: ObjectId) {
        self.subscriptions.detach_where(host.signals(), |key| key.emitter() == Some(scene));
        if self.parent_scene.is_bound_to(scene) {
            self.on_parent_scene_destroyed(host);
        }
    }

    pub fn on_parent_scene_destroyed(&mut self, host: &dyn Host) {
        debug!(scene = %self.parent_scene.name(), "parent scene destroyed");
        self.parent_scene.invalidate();
        self.unwatch_parent_scene(host);
        host.save_source(&self.filter);
    }

    pub fn on_parent_scene_renamed(&mut self, host: &dyn Host, new_name: &str) {
        debug!(from = %self.parent_scene.name(), to = %new_name, "parent scene renamed");
        self.parent_scene.rename(new_name);
        host.save_source(&self.filter);
    }

    /// Loading finished: wire up every scene and resolve the parent scene
    /// now that it exists, then stop listening.
    pub fn on_frontend_event(&mut self, host: &dyn Host, event: FrontendEvent) {
        if !event.completes_loading() {
            return;
        }
        self.watch_all_scenes(host);
        self.rebind_parent_scene(host);
        self.subscriptions
            .detach(host.signals(), SignalKey::Frontend);
    }

    pub fn properties(&mut self, host: &dyn Host) -> PropertySheet {
        let parent = host.filter_parent(&self.filter);
        self.parent_source.bind(parent.as_ref());
        let has_audio = parent.as_ref().is_some_and(|source| source.has_audio());
        properties::build(has_audio, &host.scene_names(), self.capabilities)
    }

    fn watch_all_scenes(&mut self, host: &dyn Host) {
        for scene in host.scenes() {
            self.watch_scene(host, scene.id());
        }
    }

    fn watch_scene(&mut self, host: &dyn Host, scene: ObjectId) {
        let hub = host.signals();
        self.subscriptions.attach(hub, SignalKey::ItemAdd(scene));
        self.subscriptions.attach(hub, SignalKey::SceneDestroy(scene));
    }

    fn rebind_parent_scene(&mut self, host: &dyn Host) {
        self.unwatch_parent_scene(host);
        match self.parent_scene.bind(host) {
            Some(scene) => {
                let hub = host.signals();
                self.subscriptions
                    .attach(hub, SignalKey::SceneDestroy(scene.id()));
                self.subscriptions
                    .attach(hub, SignalKey::SceneRename(scene.id()));
                debug!(scene = %self.parent_scene.name(), "parent scene bound");
            }
            None if !self.parent_scene.name().is_empty() => {
                debug!(scene = %self.parent_scene.name(), "parent scene not found");
            }
            None => {}
        }
    }

    /// Only the rename signal is parent-specific; destroy stays attached for
    /// as long as the scene is watched for new items.
    fn unwatch_parent_scene(&mut self, host: &dyn Host) {
        self.subscriptions
            .detach_where(host.signals(), |key| matches!(key, SignalKey::SceneRename(_)));
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn parent_scene_name(&self) -> &str {
        self.parent_scene.name()
    }

    pub fn parent_scene(&self) -> Option<SceneRef> {
        self.parent_scene.resolve()
    }

    pub fn tracked_destination(&self) -> Option<SourceRef> {
        self.dst_source.resolve()
    }

    pub fn is_observing_creation(&self) -> bool {
        self.subscriptions.is_attached(SignalKey::SourceCreate)
    }

    pub fn is_subscribed(&self, key: SignalKey) -> bool {
        self.subscriptions.is_attached(key)
    }

    pub fn has_pending_visibility(&self) -> bool {
        self.deferred.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        config::{ENCOUNTERED_KEY, PARENT_SCENE_KEY, VIDEO_FILTER_KIND},
        host::{Scene, SceneItem, Vec2},
        memory::{MemoryHost, Session, SourceSpec},
    };

    fn settings(value: Value) -> Settings {
        match value {
            Value::Object(map) => map,
            _ => Settings::new(),
        }
    }

    fn loaded_session() -> Session {
        let mut session = Session::new(Capabilities::full());
        session.finish_loading();
        session
    }

    #[test]
    fn copies_onto_new_sibling_of_same_kind() {
        let mut session = loaded_session();
        let mic = session.host().create_source(
            SourceSpec::input("Mic", "wasapi_input_capture")
                .with_audio(true)
                .with_settings(settings(json!({ "gain": 3 }))),
        );
        mic.set_volume(0.8);
        session.attach_filter(
            &mic,
            "source_defaults_audio",
            settings(json!({
                "copy_filters": false,
                "copy_audio_monitoring": false,
                "copy_muted": false,
                "copy_balance": false,
                "copy_sync_offset": false,
                "copy_audio_tracks": false,
            })),
        );
        session.pump();

        let sibling = session
            .host()
            .create_source(SourceSpec::input("Mic 2", "wasapi_input_capture"));
        session.pump();

        assert_eq!(
            Value::Object(sibling.settings()),
            json!({ "gain": 3, ENCOUNTERED_KEY: true })
        );
        assert_eq!(sibling.volume(), 0.8);
    }

    #[test]
    fn skips_before_loading_and_for_other_kinds() {
        let host = MemoryHost::new();
        let cam = host.create_source(SourceSpec::input("Cam", "dshow_input"));
        let filter = host.create_filter(&cam, SourceSpec::filter("Defaults", VIDEO_FILTER_KIND));
        let gate = LoadGate::new();
        let mut instance =
            SourceDefaults::create(&host, filter, &Settings::new(), Capabilities::full(), gate.clone());

        let sibling: SourceRef = host.create_source(SourceSpec::input("Cam 2", "dshow_input"));
        assert_eq!(
            instance.on_source_created(&host, &sibling),
            Outcome::Skipped(Skip::NotLoaded)
        );

        gate.set_loaded(true);
        let other: SourceRef = host.create_source(SourceSpec::input("Img", "image_source"));
        assert_eq!(
            instance.on_source_created(&host, &other),
            Outcome::Skipped(Skip::KindMismatch)
        );
        assert!(other.settings().is_empty());

        let applied = instance.on_source_created(&host, &sibling);
        assert!(applied.is_applied());
        assert_eq!(
            instance.on_source_created(&host, &sibling),
            Outcome::Skipped(Skip::AlreadyEncountered)
        );
        instance.destroy(&host);
        assert!(host.signals_table().is_empty());
    }

    #[test]
    fn prefilled_sibling_is_left_alone() {
        let mut session = loaded_session();
        let cam = session.host().create_source(
            SourceSpec::input("Cam", "dshow_input").with_settings(settings(json!({ "fps": 60 }))),
        );
        session.attach_filter(&cam, VIDEO_FILTER_KIND, Settings::new());
        session.pump();

        let restored = session.host().create_source(
            SourceSpec::input("Cam 2", "dshow_input")
                .with_settings(settings(json!({ "fps": 30 }))),
        );
        session.pump();

        assert_eq!(restored.settings()["fps"], json!(30));
        assert_eq!(restored.settings()[ENCOUNTERED_KEY], json!(true));
    }

    #[test]
    fn missing_parent_skips() {
        let host = MemoryHost::new();
        let gate = LoadGate::new();
        gate.set_loaded(true);
        let orphan: SourceRef = host.create_source(SourceSpec::filter("Orphan", VIDEO_FILTER_KIND));
        let mut instance =
            SourceDefaults::create(&host, orphan, &Settings::new(), Capabilities::full(), gate);
        let sibling: SourceRef = host.create_source(SourceSpec::input("Cam 2", "dshow_input"));

        assert_eq!(
            instance.on_source_created(&host, &sibling),
            Outcome::Skipped(Skip::NoParent)
        );
    }

    #[test]
    fn disable_and_hide_stop_observing_creation() {
        let mut session = loaded_session();
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter(&cam, VIDEO_FILTER_KIND, Settings::new());
        session.pump();
        assert!(session.instance(id).is_some_and(SourceDefaults::is_observing_creation));

        session.host().set_filter_enabled(id, false);
        session.pump();
        assert!(!session.instance(id).is_some_and(SourceDefaults::is_observing_creation));

        let sibling = session
            .host()
            .create_source(SourceSpec::input("Cam 2", "dshow_input"));
        session.pump();
        assert!(sibling.settings().is_empty());

        session.host().set_filter_enabled(id, true);
        session.pump();
        assert!(session.instance(id).is_some_and(SourceDefaults::is_observing_creation));

        session.set_filter_visible(id, false);
        assert!(!session.instance(id).is_some_and(SourceDefaults::is_observing_creation));
        session.set_filter_visible(id, true);
        assert!(session.instance(id).is_some_and(SourceDefaults::is_observing_creation));
    }

    #[test]
    fn hidden_filters_start_disabled() {
        let mut session = loaded_session();
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter_with(
            &cam,
            SourceSpec::filter("Defaults", VIDEO_FILTER_KIND).hidden(true),
        );
        assert!(!session.instance(id).is_some_and(SourceDefaults::is_observing_creation));
        assert!(session
            .instance(id)
            .is_some_and(|instance| instance.is_subscribed(SignalKey::Enable(id))));
    }

    #[test]
    fn scene_item_values_follow_parent_scene() {
        let mut session = loaded_session();
        let host = session.host();
        let scene_a = host.create_scene("Scene A");
        let scene_b = host.create_scene("Scene B");
        let cam = host.create_source(SourceSpec::input("Cam", "dshow_input"));
        let cam_ref: SourceRef = cam.clone();
        let template = host.add_item(&scene_a, &cam_ref);
        template.set_visible(false);
        template.set_position(Vec2::new(320.0, 180.0));
        session.attach_filter(
            &cam,
            VIDEO_FILTER_KIND,
            settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
        );
        session.pump();

        let sibling: SourceRef = session
            .host()
            .create_source(SourceSpec::input("Cam 2", "dshow_input"));
        session.pump();
        let item = session.host().add_item(&scene_b, &sibling);
        session.pump();

        // immediate write
        assert!(!item.visible());
        assert_eq!(item.info().pos, Vec2::new(320.0, 180.0));
        let filter_id = session.filter_ids()[0];
        assert!(session
            .instance(filter_id)
            .is_some_and(SourceDefaults::has_pending_visibility));

        // the render queue writes it again and drops the pair
        item.set_visible(true);
        assert_eq!(session.run_tasks(), 1);
        assert!(!item.visible());
        assert!(!session
            .instance(filter_id)
            .is_some_and(SourceDefaults::has_pending_visibility));
        assert!(session
            .instance(filter_id)
            .is_some_and(|instance| instance.tracked_destination().is_none()));
    }

    #[test]
    fn only_the_first_item_of_a_sibling_is_synced() {
        let mut session = loaded_session();
        let host = session.host();
        let scene_a = host.create_scene("Scene A");
        let scene_b = host.create_scene("Scene B");
        let cam = host.create_source(SourceSpec::input("Cam", "dshow_input"));
        let cam_ref: SourceRef = cam.clone();
        host.add_item(&scene_a, &cam_ref).set_visible(false);
        session.attach_filter(
            &cam,
            VIDEO_FILTER_KIND,
            settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
        );
        session.pump();

        let sibling: SourceRef = session
            .host()
            .create_source(SourceSpec::input("Cam 2", "dshow_input"));
        session.pump();
        let first = session.host().add_item(&scene_b, &sibling);
        let second = session.host().add_item(&scene_b, &sibling);
        session.pump();
        session.run_tasks();

        assert!(!first.visible());
        assert!(second.visible());
    }

    #[test]
    fn unresolved_parent_scene_skips_scene_item_copy() {
        let host = MemoryHost::new();
        let gate = LoadGate::new();
        gate.set_loaded(true);
        let scene = host.create_scene("Scene B");
        let cam = host.create_source(SourceSpec::input("Cam", "dshow_input"));
        let filter = host.create_filter(&cam, SourceSpec::filter("Defaults", VIDEO_FILTER_KIND));
        let mut instance = SourceDefaults::create(
            &host,
            filter,
            &settings(json!({ PARENT_SCENE_KEY: "Nowhere" })),
            Capabilities::full(),
            gate,
        );

        let sibling: SourceRef = host.create_source(SourceSpec::input("Cam 2", "dshow_input"));
        assert!(instance.on_source_created(&host, &sibling).is_applied());
        let item: SceneItemRef = host.add_item(&scene, &sibling);
        assert_eq!(
            instance.on_item_added(&host, &item),
            Outcome::Skipped(Skip::Unresolved(ResolveMiss::SceneNotFound(
                "Nowhere".to_string()
            )))
        );
        assert!(!instance.has_pending_visibility());
    }

    #[test]
    fn parent_missing_from_scene_is_reported() {
        let host = MemoryHost::new();
        let gate = LoadGate::new();
        gate.set_loaded(true);
        let scene_a = host.create_scene("Scene A");
        let cam = host.create_source(SourceSpec::input("Cam", "dshow_input"));
        let filter = host.create_filter(&cam, SourceSpec::filter("Defaults", VIDEO_FILTER_KIND));
        let mut instance = SourceDefaults::create(
            &host,
            filter,
            &settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
            Capabilities::full(),
            gate,
        );

        let sibling: SourceRef = host.create_source(SourceSpec::input("Cam 2", "dshow_input"));
        instance.on_source_created(&host, &sibling);
        let item: SceneItemRef = host.add_item(&scene_a, &sibling);
        assert_eq!(
            instance.on_item_added(&host, &item),
            Outcome::Skipped(Skip::Unresolved(ResolveMiss::ItemNotFound {
                scene: "Scene A".to_string(),
                source_name: "Cam".to_string(),
            }))
        );
    }

    #[test]
    fn parent_scene_rename_and_destroy_are_persisted() {
        let mut session = loaded_session();
        let scene = session.host().create_scene("Scene A");
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter(
            &cam,
            VIDEO_FILTER_KIND,
            settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
        );
        session.pump();
        assert!(session
            .instance(id)
            .is_some_and(|instance| instance.parent_scene().is_some()));

        session.host().rename_scene(&scene, "Main");
        session.pump();
        let instance = session.instance(id).expect("instance");
        assert_eq!(instance.parent_scene_name(), "Main");
        assert!(instance.parent_scene().is_some());
        let filter = session.host().source(id).expect("filter source");
        assert_eq!(filter.settings()[PARENT_SCENE_KEY], json!("Main"));

        let scene_id = scene.id();
        drop(scene);
        session.host().remove_scene(scene_id);
        session.pump();
        let instance = session.instance(id).expect("instance");
        assert_eq!(instance.parent_scene_name(), "");
        assert!(instance.parent_scene().is_none());
        assert!(!instance.is_subscribed(SignalKey::SceneRename(scene_id)));
        assert_eq!(filter.settings()[PARENT_SCENE_KEY], json!(""));
    }

    #[test]
    fn parent_scene_resolves_once_loading_finishes() {
        let mut session = Session::new(Capabilities::full());
        let scene = session.host().create_scene("Scene A");
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter(
            &cam,
            VIDEO_FILTER_KIND,
            settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
        );
        session.pump();
        let instance = session.instance(id).expect("instance");
        assert!(instance.parent_scene().is_none());
        assert!(instance.is_subscribed(SignalKey::Frontend));

        session.finish_loading();
        let instance = session.instance(id).expect("instance");
        assert_eq!(instance.parent_scene().map(|s| s.id()), Some(scene.id()));
        assert!(instance.is_subscribed(SignalKey::ItemAdd(scene.id())));
        assert!(instance.is_subscribed(SignalKey::SceneDestroy(scene.id())));
        assert!(!instance.is_subscribed(SignalKey::Frontend));
    }

    #[test]
    fn changing_parent_scene_moves_the_watch() {
        let mut session = loaded_session();
        let a = session.host().create_scene("Scene A");
        let b = session.host().create_scene("Scene B");
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter(
            &cam,
            VIDEO_FILTER_KIND,
            settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
        );
        session.pump();

        session.update_filter(id, settings(json!({ PARENT_SCENE_KEY: "Scene B" })));
        let instance = session.instance(id).expect("instance");
        assert!(!instance.is_subscribed(SignalKey::SceneRename(a.id())));
        assert!(instance.is_subscribed(SignalKey::SceneRename(b.id())));
        assert_eq!(instance.parent_scene().map(|s| s.id()), Some(b.id()));
    }

    #[test]
    fn scenes_created_later_are_watched() {
        let mut session = loaded_session();
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter(&cam, VIDEO_FILTER_KIND, Settings::new());
        session.pump();

        let scene = session.host().create_scene("Late");
        session.pump();
        assert!(session
            .instance(id)
            .is_some_and(|instance| instance.is_subscribed(SignalKey::ItemAdd(scene.id()))));
    }

    #[test]
    fn destroyed_scenes_are_unwatched() {
        let mut session = loaded_session();
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter(&cam, VIDEO_FILTER_KIND, Settings::new());
        session.pump();
        let baseline = session.host().signals_table().len();

        let scene_ids: Vec<ObjectId> = (0..50)
            .map(|n| session.host().create_scene(&format!("Scene {n}")).id())
            .collect();
        session.pump();
        assert_eq!(session.host().signals_table().len(), baseline + 100);

        for scene in &scene_ids {
            assert!(session.host().remove_scene(*scene));
        }
        session.pump();

        let instance = session.instance(id).expect("instance");
        assert!(scene_ids.iter().all(|scene| {
            !instance.is_subscribed(SignalKey::ItemAdd(*scene))
                && !instance.is_subscribed(SignalKey::SceneDestroy(*scene))
        }));
        assert_eq!(session.host().signals_table().len(), baseline);
    }

    #[test]
    fn turning_visibility_off_cancels_the_second_write() {
        let mut session = loaded_session();
        let host = session.host();
        let scene_a = host.create_scene("Scene A");
        let scene_b = host.create_scene("Scene B");
        let cam = host.create_source(SourceSpec::input("Cam", "dshow_input"));
        let cam_ref: SourceRef = cam.clone();
        host.add_item(&scene_a, &cam_ref).set_visible(false);
        let id = session.attach_filter(
            &cam,
            VIDEO_FILTER_KIND,
            settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
        );
        session.pump();

        let sibling: SourceRef = session
            .host()
            .create_source(SourceSpec::input("Cam 2", "dshow_input"));
        session.pump();
        let item = session.host().add_item(&scene_b, &sibling);
        session.pump();
        assert!(!item.visible());

        item.set_visible(true);
        session.update_filter(id, settings(json!({ "copy_visibility": false })));
        assert_eq!(session.run_tasks(), 1);
        assert!(item.visible());
    }

    #[test]
    fn config_only_never_tracks_scene_items() {
        let mut session = Session::new(Capabilities::config_only());
        session.finish_loading();
        let scene = session.host().create_scene("Scene A");
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let id = session.attach_filter(&cam, VIDEO_FILTER_KIND, Settings::new());
        session.pump();

        let sibling = session
            .host()
            .create_source(SourceSpec::input("Cam 2", "dshow_input"));
        session.pump();
        let instance = session.instance(id).expect("instance");
        assert_eq!(sibling.settings()[ENCOUNTERED_KEY], json!(true));
        assert!(instance.tracked_destination().is_none());
        assert!(!instance.is_subscribed(SignalKey::ItemAdd(scene.id())));
    }

    #[test]
    fn destroy_detaches_everything() {
        let mut session = loaded_session();
        let scene_a = session.host().create_scene("Scene A");
        let scene_b = session.host().create_scene("Scene B");
        let cam = session
            .host()
            .create_source(SourceSpec::input("Cam", "dshow_input"));
        let cam_ref: SourceRef = cam.clone();
        session.host().add_item(&scene_a, &cam_ref);
        let id = session.attach_filter(
            &cam,
            VIDEO_FILTER_KIND,
            settings(json!({ PARENT_SCENE_KEY: "Scene A" })),
        );
        session.pump();
        let sibling: SourceRef = session
            .host()
            .create_source(SourceSpec::input("Cam 2", "dshow_input"));
        session.pump();
        session.host().add_item(&scene_b, &sibling);
        session.pump();
        assert!(!session.host().signals_table().is_empty());

        session.detach_filter(id);
        assert!(session.host().signals_table().is_empty());
        assert_eq!(session.run_tasks(), 1);
    }

    #[test]
    fn property_sheet_reflects_parent_audio() {
        let mut session = loaded_session();
        session.host().create_scene("Scene A");
        let mic = session.host().create_source(
            SourceSpec::input("Mic", "wasapi_input_capture").with_audio(true),
        );
        let id = session.attach_filter(&mic, "source_defaults_audio", Settings::new());
        let sheet = session.properties(id).expect("sheet");
        assert!(sheet.find("copy_volume").is_some());
        assert!(sheet.find(PARENT_SCENE_KEY).is_some());
    }
}
