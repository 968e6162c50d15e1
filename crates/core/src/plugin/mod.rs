//! Plugin registration and signal routing.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    config::{Capabilities, FilterSettings, AUDIO_FILTER_KIND, VIDEO_FILTER_KIND},
    filter::SourceDefaults,
    host::{Host, ObjectId, Settings, SourceRef},
    properties::PropertySheet,
    subscription::{LoadGate, Signal, SignalKey},
};

pub const DISPLAY_NAME: &str = "Source Defaults";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Video,
    Audio,
}

/// A filter kind registered with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterInfo {
    pub id: &'static str,
    pub output: OutputKind,
    pub display_name: &'static str,
}

pub const FILTER_INFOS: [FilterInfo; 2] = [
    FilterInfo {
        id: VIDEO_FILTER_KIND,
        output: OutputKind::Video,
        display_name: DISPLAY_NAME,
    },
    FilterInfo {
        id: AUDIO_FILTER_KIND,
        output: OutputKind::Audio,
        display_name: DISPLAY_NAME,
    },
];

pub fn is_filter_kind(kind: &str) -> bool {
    FILTER_INFOS.iter().any(|info| info.id == kind)
}

/// The loaded plugin: the shared load gate plus every live filter instance,
/// keyed by the filter's object id.
pub struct Plugin {
    capabilities: Capabilities,
    gate: LoadGate,
    instances: BTreeMap<ObjectId, SourceDefaults>,
}

impl Plugin {
    /// Registers the filter kinds and logs the plugin version.
    pub fn load(capabilities: Capabilities) -> Self {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            placement_sync = capabilities.placement_sync,
            "plugin loaded successfully"
        );
        Self {
            capabilities,
            gate: LoadGate::new(),
            instances: BTreeMap::new(),
        }
    }

    /// Destroys every remaining instance.
    pub fn unload(mut self, host: &dyn Host) {
        for (_, instance) in std::mem::take(&mut self.instances) {
            instance.destroy(host);
        }
        info!("plugin unloaded");
    }

    /// The load gate shared by every instance.
    pub fn gate(&self) -> &LoadGate {
        &self.gate
    }

    /// Creates the instance for a freshly attached filter. Missing option
    /// keys are filled with their defaults first.
    pub fn create_instance(&mut self, host: &dyn Host, filter: SourceRef) -> ObjectId {
        let id = filter.id();
        let mut settings = filter.settings();
        FilterSettings::apply_defaults(&mut settings, self.capabilities);
        filter.update(&settings);

        let instance = SourceDefaults::create(
            host,
            filter,
            &settings,
            self.capabilities,
            self.gate.clone(),
        );
        if let Some(previous) = self.instances.insert(id, instance) {
            previous.destroy(host);
        }
        debug!(filter = %id, "source defaults filter created");
        id
    }

    /// Runs the update callback of the instance for `filter`, if any.
    pub fn update_instance(&mut self, host: &dyn Host, filter: ObjectId, settings: &Settings) {
        if let Some(instance) = self.instances.get_mut(&filter) {
            instance.update(host, settings);
        }
    }

    /// Lets the instance write what it persists into `settings`.
    pub fn save_instance(&self, filter: ObjectId, settings: &mut Settings) {
        if let Some(instance) = self.instances.get(&filter) {
            instance.save(settings);
        }
    }

    /// Returns whether an instance existed for `filter`.
    pub fn destroy_instance(&mut self, host: &dyn Host, filter: ObjectId) -> bool {
        match self.instances.remove(&filter) {
            Some(instance) => {
                instance.destroy(host);
                true
            }
            None => false,
        }
    }

    /// The filter was shown in the host UI.
    pub fn show_instance(&mut self, host: &dyn Host, filter: ObjectId) {
        if let Some(instance) = self.instances.get_mut(&filter) {
            instance.show(host);
        }
    }

    /// The filter was hidden in the host UI.
    pub fn hide_instance(&mut self, host: &dyn Host, filter: ObjectId) {
        if let Some(instance) = self.instances.get_mut(&filter) {
            instance.hide(host);
        }
    }

    /// The settings page for `filter`, or `None` for an unknown filter.
    pub fn properties(&mut self, host: &dyn Host, filter: ObjectId) -> Option<PropertySheet> {
        self.instances
            .get_mut(&filter)
            .map(|instance| instance.properties(host))
    }

    /// The live instance for `filter`.
    pub fn instance(&self, filter: ObjectId) -> Option<&SourceDefaults> {
        self.instances.get(&filter)
    }

    /// Ids of every live instance, ascending.
    pub fn instance_ids(&self) -> Vec<ObjectId> {
        self.instances.keys().copied().collect()
    }

    /// Routes one host signal. Frontend events always reach the load gate,
    /// then every instance subscribed to `key` handles the signal in id
    /// order.
    pub fn deliver(&mut self, host: &dyn Host, key: SignalKey, signal: &Signal) {
        if let Signal::Frontend(event) = signal {
            self.gate.observe(*event);
        }
        for id in host.signals().subscribers(key) {
            if let Some(instance) = self.instances.get_mut(&id) {
                instance.handle(host, signal);
            }
        }
    }
}
