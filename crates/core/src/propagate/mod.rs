//! Copying values from the parent source and its scene item onto a sibling.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::{
        OptionKey, SceneItemOption, SceneItemOptions, SourceOption, SourceOptions,
        AUDIO_FILTER_KIND, ENCOUNTERED_KEY, VIDEO_FILTER_KIND,
    },
    host::{Host, SceneItem, SceneItemRef, SourceRef, TransitionSlot},
    resolve::ResolveMiss,
};

/// Why an event did not lead to anything being copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// The host is still loading a scene collection.
    NotLoaded,
    /// The filter is not attached to a source.
    NoParent,
    /// The new source is of a different kind than the parent.
    KindMismatch,
    /// The new source is a filter, transition or scene.
    NotInput,
    /// The new source was already seen, or was filled in by something else.
    AlreadyEncountered,
    /// The scene item does not belong to the source being tracked.
    NotTracked,
    Unresolved(ResolveMiss),
}

/// Result of handling one creation or item-added event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<O> {
    Skipped(Skip),
    /// The options that were applied, in declaration order.
    Applied(Vec<O>),
}

impl<O> Outcome<O> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Whether `kind` is one of this plugin's own filters, which must never be
/// copied onto a sibling.
pub fn is_own_filter_kind(kind: &str) -> bool {
    kind == VIDEO_FILTER_KIND || kind == AUDIO_FILTER_KIND
}

/// Copies every enabled source-level option from `parent` to `dst`.
pub fn copy_source_options(
    host: &dyn Host,
    parent: &SourceRef,
    dst: &SourceRef,
    options: &SourceOptions,
) -> Vec<SourceOption> {
    for option in options.enabled() {
        match option {
            SourceOption::Properties => {
                let mut settings = parent.settings();
                settings.insert(ENCOUNTERED_KEY.to_string(), Value::Bool(true));
                dst.update(&settings);
                let dump = Value::Object(dst.settings());
                debug!(source = %dst.name(), settings = %dump, "destination settings after copy");
            }
            SourceOption::Filters => {
                for filter in parent.filters() {
                    if !is_own_filter_kind(&filter.unversioned_kind()) {
                        host.duplicate_filter(dst, &filter);
                    }
                }
            }
            SourceOption::AudioMonitoring => dst.set_monitoring_type(parent.monitoring_type()),
            SourceOption::Volume => dst.set_volume(parent.volume()),
            SourceOption::Muted => dst.set_muted(parent.muted()),
            SourceOption::Balance => dst.set_balance(parent.balance()),
            SourceOption::SyncOffset => dst.set_sync_offset(parent.sync_offset()),
            SourceOption::AudioTracks => dst.set_audio_mixers(parent.audio_mixers()),
        }
    }
    options.enabled().collect()
}

/// Copies position, scale, bounds and crop as one deferred update.
pub fn copy_transform(src: &dyn SceneItem, dst: &dyn SceneItem) {
    dst.defer_update_begin();
    dst.set_info(&src.info());
    dst.set_crop(&src.crop());
    dst.defer_update_end();
}

/// Gives `dst` its own copies of `src`'s show and hide transitions.
pub fn copy_visibility_transitions(host: &dyn Host, src: &dyn SceneItem, dst: &dyn SceneItem) {
    let dst_name = dst.source().name();
    for slot in TransitionSlot::ALL {
        let copy = src
            .transition(slot)
            .and_then(|transition| host.duplicate_transition(&transition, &slot.copy_name(&dst_name)));
        dst.set_transition(slot, copy);
        dst.set_transition_duration(slot, src.transition_duration(slot));
    }
}

struct PendingPair {
    template: SceneItemRef,
    target: SceneItemRef,
}

/// Second, deferred visibility write.
///
/// Setting visibility on the same tick an item is created does not always
/// stick, so the value is written again from the render task queue. Only the
/// latest request is kept; scheduling again drops (releases) the pair held by
/// the previous one. The visibility option is checked again when the task
/// runs, so turning it off in between drops the write.
#[derive(Clone, Default)]
pub struct DeferredVisibility {
    pending: Arc<Mutex<Option<PendingPair>>>,
    suppressed: Arc<AtomicBool>,
}

impl DeferredVisibility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, host: &dyn Host, template: SceneItemRef, target: SceneItemRef) {
        let previous = self
            .lock()
            .replace(PendingPair { template, target });
        drop(previous);

        let pending = Arc::clone(&self.pending);
        let suppressed = Arc::clone(&self.suppressed);
        host.queue_task(Box::new(move || {
            let pair = pending.lock().unwrap_or_else(PoisonError::into_inner).take();
            if suppressed.load(Ordering::Acquire) {
                return;
            }
            if let Some(pair) = pair {
                pair.target.set_visible(pair.template.visible());
            }
        }));
    }

    /// Mirrors the visibility option, read by tasks that have not run yet.
    pub fn set_enabled(&self, enabled: bool) {
        self.suppressed.store(!enabled, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    /// Releases the held pair without applying it.
    pub fn cancel(&self) {
        let pair = self.lock().take();
        drop(pair);
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingPair>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Copies every enabled scene-item option from `template` to `dst`.
pub fn copy_scene_item_options(
    host: &dyn Host,
    template: &SceneItemRef,
    dst: &SceneItemRef,
    options: &SceneItemOptions,
    deferred: &DeferredVisibility,
) -> Vec<SceneItemOption> {
    for option in options.enabled() {
        match option {
            SceneItemOption::Transform => copy_transform(template.as_ref(), dst.as_ref()),
            SceneItemOption::Visibility => {
                dst.set_visible(template.visible());
                deferred.schedule(host, Arc::clone(template), Arc::clone(dst));
            }
            SceneItemOption::VisibilityTransitions => {
                copy_visibility_transitions(host, template.as_ref(), dst.as_ref())
            }
        }
    }
    options.enabled().collect()
}

/// `Applied A, B from 'src' to 'dst'`, or `None` when nothing was applied.
pub fn applied_message<O: OptionKey>(applied: &[O], from: &str, to: &str) -> Option<String> {
    if applied.is_empty() {
        return None;
    }
    let labels: Vec<&str> = applied.iter().map(|option| option.label()).collect();
    Some(format!("Applied {} from '{from}' to '{to}'", labels.join(", ")))
}

pub fn log_applied<O: OptionKey>(applied: &[O], from: &str, to: &str) {
    if let Some(message) = applied_message(applied, from, to) {
        info!("{message}");
    }
}
