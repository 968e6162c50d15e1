use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::Settings;

/// Marker written into a destination's settings once the engine has looked at
/// it, so recreated sources (undo/redo) never come back with empty settings.
pub const ENCOUNTERED_KEY: &str = "com.source_defaults.encountered";

/// Settings key holding the name of the scene scene-item values are copied from.
pub const PARENT_SCENE_KEY: &str = "parent_scene";

pub const VIDEO_FILTER_KIND: &str = "source_defaults_video";
pub const AUDIO_FILTER_KIND: &str = "source_defaults_audio";

/// Media sources get their properties from drag-and-drop before the creation
/// signal fires, so the empty-settings check cannot be applied to them.
pub const MEDIA_SOURCE_KIND: &str = "ffmpeg_source";

const SOURCE_OPTION_KEYS: [&str; 8] = [
    "copy_properties",
    "copy_filters",
    "copy_audio_monitoring",
    "copy_volume",
    "copy_muted",
    "copy_balance",
    "copy_sync_offset",
    "copy_audio_tracks",
];

const SOURCE_OPTION_LABELS: [&str; 8] = [
    "Properties",
    "Filters",
    "Audio Monitoring Type",
    "Volume",
    "Muted/Unmuted",
    "Stereo Balance",
    "Sync Offset",
    "Audio Tracks",
];

const SCENE_ITEM_OPTION_KEYS: [&str; 3] = [
    "copy_transform",
    "copy_visibility",
    "copy_visibility_transitions",
];

const SCENE_ITEM_OPTION_LABELS: [&str; 3] = ["Transform", "Show/Hide", "Show/Hide Transitions"];

/// An entry of one of the option vectors. The declaration order of `ALL` is
/// the index into the key, label and flag arrays.
pub trait OptionKey: Copy + PartialEq + 'static {
    const ALL: &'static [Self];

    fn index(self) -> usize;
    fn key(self) -> &'static str;
    fn label(self) -> &'static str;
}

/// Source-level values copied onto a new sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOption {
    Properties,
    Filters,
    AudioMonitoring,
    Volume,
    Muted,
    Balance,
    SyncOffset,
    AudioTracks,
}

impl OptionKey for SourceOption {
    const ALL: &'static [Self] = &[
        Self::Properties,
        Self::Filters,
        Self::AudioMonitoring,
        Self::Volume,
        Self::Muted,
        Self::Balance,
        Self::SyncOffset,
        Self::AudioTracks,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn key(self) -> &'static str {
        SOURCE_OPTION_KEYS[self.index()]
    }

    fn label(self) -> &'static str {
        SOURCE_OPTION_LABELS[self.index()]
    }
}

impl SourceOption {
    /// Options that only make sense for sources with audio output.
    pub fn is_audio(self) -> bool {
        !matches!(self, Self::Properties | Self::Filters)
    }
}

/// Scene-item-level values copied onto a new sibling's scene item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneItemOption {
    Transform,
    Visibility,
    VisibilityTransitions,
}

impl OptionKey for SceneItemOption {
    const ALL: &'static [Self] = &[Self::Transform, Self::Visibility, Self::VisibilityTransitions];

    fn index(self) -> usize {
        self as usize
    }

    fn key(self) -> &'static str {
        SCENE_ITEM_OPTION_KEYS[self.index()]
    }

    fn label(self) -> &'static str {
        SCENE_ITEM_OPTION_LABELS[self.index()]
    }
}

/// Fixed-length set of flags indexed by an [`OptionKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSet<O, const N: usize> {
    flags: [bool; N],
    _key: PhantomData<O>,
}

pub type SourceOptions = OptionSet<SourceOption, 8>;
pub type SceneItemOptions = OptionSet<SceneItemOption, 3>;

impl<O: OptionKey, const N: usize> OptionSet<O, N> {
    pub fn all(enabled: bool) -> Self {
        Self {
            flags: [enabled; N],
            _key: PhantomData,
        }
    }

    pub fn from_enabled(options: &[O]) -> Self {
        let mut set = Self::all(false);
        for option in options {
            set.set(*option, true);
        }
        set
    }

    /// Reads every flag from `settings`. Missing keys take the default (on);
    /// a key holding anything other than a boolean reads as off.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut set = Self::all(true);
        for option in O::ALL {
            let enabled = match settings.get(option.key()) {
                None => true,
                Some(value) => value.as_bool().unwrap_or(false),
            };
            set.set(*option, enabled);
        }
        set
    }

    pub fn is_enabled(&self, option: O) -> bool {
        self.flags[option.index()]
    }

    pub fn set(&mut self, option: O, enabled: bool) {
        self.flags[option.index()] = enabled;
    }

    pub fn any(&self) -> bool {
        self.flags.iter().any(|flag| *flag)
    }

    pub fn enabled(&self) -> impl Iterator<Item = O> + '_ {
        O::ALL.iter().copied().filter(|option| self.is_enabled(*option))
    }

    #[cfg(test)]
    pub fn enabled_labels(&self) -> Vec<&'static str> {
        self.enabled().map(O::label).collect()
    }
}

impl<O: OptionKey, const N: usize> Default for OptionSet<O, N> {
    fn default() -> Self {
        Self::all(true)
    }
}

/// Which parts of the engine an instance runs with. The configuration-only
/// flavour never touches scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub placement_sync: bool,
}

impl Capabilities {
    pub fn full() -> Self {
        Self {
            placement_sync: true,
        }
    }

    pub fn config_only() -> Self {
        Self {
            placement_sync: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Decoded filter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub options: SourceOptions,
    pub scene_item_options: SceneItemOptions,
    pub parent_scene: String,
}

impl FilterSettings {
    pub fn from_settings(settings: &Settings, capabilities: Capabilities) -> Self {
        let scene_item_options = if capabilities.placement_sync {
            SceneItemOptions::from_settings(settings)
        } else {
            SceneItemOptions::all(false)
        };
        Self {
            options: SourceOptions::from_settings(settings),
            scene_item_options,
            parent_scene: settings
                .get(PARENT_SCENE_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Fills in defaults for every key that is not already present.
    pub fn apply_defaults(settings: &mut Settings, capabilities: Capabilities) {
        for option in SourceOption::ALL {
            settings
                .entry(option.key())
                .or_insert(Value::Bool(true));
        }
        if capabilities.placement_sync {
            for option in SceneItemOption::ALL {
                settings
                    .entry(option.key())
                    .or_insert(Value::Bool(true));
            }
            settings
                .entry(PARENT_SCENE_KEY)
                .or_insert_with(|| Value::String(String::new()));
        }
    }
}

/// Serializable description of one persisted option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub group: String,
    pub key: String,
    pub label: String,
    pub default: bool,
}

/// Lists every persisted option in key order.
pub fn catalog(capabilities: Capabilities) -> Vec<OptionDescriptor> {
    let mut out: Vec<OptionDescriptor> = SourceOption::ALL
        .iter()
        .map(|option| OptionDescriptor {
            group: "source".to_string(),
            key: option.key().to_string(),
            label: option.label().to_string(),
            default: true,
        })
        .collect();
    if capabilities.placement_sync {
        out.extend(SceneItemOption::ALL.iter().map(|option| OptionDescriptor {
            group: "scene_item".to_string(),
            key: option.key().to_string(),
            label: option.label().to_string(),
            default: true,
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn settings(value: Value) -> Settings {
        match value {
            Value::Object(map) => map,
            _ => Settings::new(),
        }
    }

    #[test]
    fn keys_and_labels_stay_aligned() {
        assert_eq!(SourceOption::Volume.key(), "copy_volume");
        assert_eq!(SourceOption::Volume.label(), "Volume");
        assert_eq!(SourceOption::AudioTracks.key(), "copy_audio_tracks");
        assert_eq!(SceneItemOption::Visibility.key(), "copy_visibility");
        assert_eq!(SceneItemOption::Visibility.label(), "Show/Hide");
        assert_eq!(SourceOption::ALL.len(), SOURCE_OPTION_KEYS.len());
        assert_eq!(SceneItemOption::ALL.len(), SCENE_ITEM_OPTION_LABELS.len());
    }

    #[test]
    fn missing_keys_default_to_enabled() {
        let decoded = FilterSettings::from_settings(&Settings::new(), Capabilities::full());
        assert!(SourceOption::ALL
            .iter()
            .all(|option| decoded.options.is_enabled(*option)));
        assert!(decoded.scene_item_options.any());
        assert_eq!(decoded.parent_scene, "");
    }

    #[test]
    fn reads_flags_and_parent_scene() {
        let decoded = FilterSettings::from_settings(
            &settings(json!({
                "copy_filters": false,
                "copy_volume": "yes",
                "copy_transform": false,
                "parent_scene": "Scene A",
            })),
            Capabilities::full(),
        );
        assert!(decoded.options.is_enabled(SourceOption::Properties));
        assert!(!decoded.options.is_enabled(SourceOption::Filters));
        assert!(!decoded.options.is_enabled(SourceOption::Volume));
        assert!(!decoded
            .scene_item_options
            .is_enabled(SceneItemOption::Transform));
        assert_eq!(decoded.parent_scene, "Scene A");
    }

    #[test]
    fn config_only_disables_scene_item_options() {
        let decoded = FilterSettings::from_settings(&Settings::new(), Capabilities::config_only());
        assert!(!decoded.scene_item_options.any());
        assert!(decoded.options.any());
    }

    #[test]
    fn defaults_do_not_override_existing_values() {
        let mut data = settings(json!({ "copy_muted": false }));
        FilterSettings::apply_defaults(&mut data, Capabilities::full());
        assert_eq!(data["copy_muted"], json!(false));
        assert_eq!(data["copy_properties"], json!(true));
        assert_eq!(data["copy_visibility_transitions"], json!(true));
        assert_eq!(data[PARENT_SCENE_KEY], json!(""));

        let mut data = Settings::new();
        FilterSettings::apply_defaults(&mut data, Capabilities::config_only());
        assert!(!data.contains_key("copy_transform"));
    }

    #[test]
    fn enabled_labels_follow_declaration_order() {
        let set = SourceOptions::from_enabled(&[SourceOption::Volume, SourceOption::Properties]);
        assert_eq!(set.enabled_labels(), vec!["Properties", "Volume"]);
    }

    #[test]
    fn catalog_lists_scene_item_group_only_with_placement_sync() {
        assert_eq!(catalog(Capabilities::full()).len(), 11);
        assert_eq!(catalog(Capabilities::config_only()).len(), 8);
    }
}
