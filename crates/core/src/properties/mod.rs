use serde::{Deserialize, Serialize};

use crate::config::{Capabilities, OptionKey, SceneItemOption, SourceOption, PARENT_SCENE_KEY};

const DESCRIPTION: &str = "Tick the checkboxes for those that you want to be copied to newly created sources of the same type.";
const SCENE_ITEM_GROUP: &str = "scene_item_settings";
const SCENE_ITEM_GROUP_LABEL: &str = "Scene item settings";
const PARENT_SCENE_LABEL: &str = "Parent Scene";
const PARENT_SCENE_LONG_DESCRIPTION: &str = "Select the parent scene of the source that has this filter. \
The following settings of this source will be copied from the selected scene. \
If you have duplicates of this source, it will be copied from the bottommost one.";
const NO_SCENE_LABEL: &str = "--select scene--";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub label: String,
    pub value: String,
}

/// Description of one control on the filter's settings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Property {
    Info {
        name: String,
        text: String,
    },
    Bool {
        name: String,
        label: String,
    },
    List {
        name: String,
        label: String,
        long_description: String,
        entries: Vec<ListEntry>,
    },
    Group {
        name: String,
        label: String,
        properties: Vec<Property>,
    },
}

impl Property {
    pub fn name(&self) -> &str {
        match self {
            Self::Info { name, .. }
            | Self::Bool { name, .. }
            | Self::List { name, .. }
            | Self::Group { name, .. } => name,
        }
    }

    fn checkbox<O: OptionKey>(option: O) -> Self {
        Self::Bool {
            name: option.key().to_string(),
            label: option.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySheet {
    pub properties: Vec<Property>,
}

impl PropertySheet {
    /// Depth-first lookup by name, descending into groups.
    pub fn find(&self, name: &str) -> Option<&Property> {
        fn walk<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
            properties.iter().find_map(|property| {
                if property.name() == name {
                    return Some(property);
                }
                match property {
                    Property::Group { properties, .. } => walk(properties, name),
                    _ => None,
                }
            })
        }
        walk(&self.properties, name)
    }
}

/// Builds the settings page. Audio options only appear for sources that
/// produce audio.
pub fn build(parent_has_audio: bool, scene_names: &[String], capabilities: Capabilities) -> PropertySheet {
    let mut properties = vec![Property::Info {
        name: "description".to_string(),
        text: DESCRIPTION.to_string(),
    }];
    properties.extend(
        SourceOption::ALL
            .iter()
            .filter(|option| parent_has_audio || !option.is_audio())
            .map(|option| Property::checkbox(*option)),
    );

    if capabilities.placement_sync {
        let mut entries = vec![ListEntry {
            label: NO_SCENE_LABEL.to_string(),
            value: String::new(),
        }];
        entries.extend(scene_names.iter().map(|name| ListEntry {
            label: name.clone(),
            value: name.clone(),
        }));

        let mut group = vec![Property::List {
            name: PARENT_SCENE_KEY.to_string(),
            label: PARENT_SCENE_LABEL.to_string(),
            long_description: PARENT_SCENE_LONG_DESCRIPTION.to_string(),
            entries,
        }];
        group.extend(SceneItemOption::ALL.iter().map(|option| Property::checkbox(*option)));
        properties.push(Property::Group {
            name: SCENE_ITEM_GROUP.to_string(),
            label: SCENE_ITEM_GROUP_LABEL.to_string(),
            properties: group,
        });
    }

    PropertySheet { properties }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_sources_hide_audio_options() {
        let sheet = build(false, &[], Capabilities::full());
        assert!(sheet.find("copy_properties").is_some());
        assert!(sheet.find("copy_filters").is_some());
        assert!(sheet.find("copy_volume").is_none());
        assert!(sheet.find("copy_visibility").is_some());
    }

    #[test]
    fn scene_list_starts_with_placeholder() {
        let scenes = vec!["Scene A".to_string(), "Scene B".to_string()];
        let sheet = build(true, &scenes, Capabilities::full());
        assert!(sheet.find("copy_audio_tracks").is_some());
        match sheet.find(PARENT_SCENE_KEY) {
            Some(Property::List { entries, .. }) => {
                let values: Vec<&str> = entries.iter().map(|e| e.value.as_str()).collect();
                assert_eq!(values, vec!["", "Scene A", "Scene B"]);
                assert_eq!(entries[0].label, "--select scene--");
            }
            other => panic!("expected scene list, got {other:?}"),
        }
    }

    #[test]
    fn config_only_has_no_scene_group() {
        let sheet = build(true, &["Scene A".to_string()], Capabilities::config_only());
        assert!(sheet.find(SCENE_ITEM_GROUP).is_none());
        assert!(sheet.find(PARENT_SCENE_KEY).is_none());
        assert_eq!(sheet.properties.len(), 1 + SourceOption::ALL.len());
    }
}
