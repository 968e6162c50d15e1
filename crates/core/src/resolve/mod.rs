//! Locating the scene and scene item that scene-item values are copied from.

use serde_json::Value;

use crate::{
    config::PARENT_SCENE_KEY,
    host::{Host, ObjectId, Scene, SceneItemRef, SceneRef, Settings},
    weak::WeakSlot,
};

/// Why scene-item values could not be copied. The message is what gets logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveMiss {
    #[error("Parent scene '{0}' not found, scene item settings not copied.")]
    SceneNotFound(String),
    #[error(
        "Selected parent scene '{scene}' does not contain '{source_name}', scene item settings not copied."
    )]
    ItemNotFound { scene: String, source_name: String },
}

/// The parent scene: its persisted name plus a live handle.
///
/// The name is authoritative. The handle may be empty while the name is set,
/// e.g. before loading finished or when no scene has that name.
#[derive(Debug, Default)]
pub struct TemplateBinding {
    name: String,
    scene: WeakSlot<dyn Scene>,
    /// Id of the bound scene, kept so its destroy signal can still be matched
    /// after the handle went stale.
    scene_id: Option<ObjectId>,
}

impl TemplateBinding {
    /// An unnamed, unbound binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// The persisted scene name, empty when none is selected.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the name changed.
    pub fn set_name(&mut self, name: &str) -> bool {
        if self.name == name {
            return false;
        }
        self.name = name.to_string();
        true
    }

    /// Looks the scene up by name and tracks it.
    pub fn bind(&mut self, host: &dyn Host) -> Option<SceneRef> {
        let scene = host.scene_by_name(&self.name);
        self.scene.bind(scene.as_ref());
        self.scene_id = scene.as_ref().map(|scene| scene.id());
        scene
    }

    /// The bound scene, if it is still alive.
    pub fn resolve(&self) -> Option<SceneRef> {
        self.scene.resolve()
    }

    /// The scene was renamed: keep the handle, follow the name.
    pub fn rename(&mut self, new_name: &str) {
        self.name = new_name.to_string();
    }

    /// The scene was destroyed: forget both name and handle.
    pub fn invalidate(&mut self) {
        self.name.clear();
        self.release();
    }

    /// Drops the handle but keeps the name, so a later `bind` can find the
    /// scene again.
    pub fn release(&mut self) {
        self.scene.release();
        self.scene_id = None;
    }

    /// Whether the bound scene is the one with id `scene`.
    pub fn is_bound_to(&self, scene: ObjectId) -> bool {
        self.scene_id == Some(scene)
    }

    /// Writes the scene name under the parent scene key.
    pub fn save(&self, settings: &mut Settings) {
        settings.insert(PARENT_SCENE_KEY.to_string(), Value::String(self.name.clone()));
    }
}

/// First item of `scene` whose source is `source`, in the scene's native
/// order. Scenes enumerate bottommost first, so among duplicates the
/// bottommost one wins.
pub fn find_item(scene: &dyn Scene, source: ObjectId) -> Option<SceneItemRef> {
    scene
        .items()
        .into_iter()
        .find(|item| item.source().id() == source)
}

/// Searches every scene except the one named `skip_scene`, returning the
/// first match of the first scene that has one.
pub fn find_item_in_other_scenes(
    host: &dyn Host,
    source: ObjectId,
    skip_scene: &str,
) -> Option<SceneItemRef> {
    host.scenes()
        .iter()
        .filter(|scene| scene.name() != skip_scene)
        .find_map(|scene| find_item(scene.as_ref(), source))
}
