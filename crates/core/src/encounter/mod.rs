use serde_json::Value;
use tracing::debug;

use crate::{
    config::{ENCOUNTERED_KEY, MEDIA_SOURCE_KIND},
    host::Source,
};

/// Whether a freshly observed source is new or an old one brought back by
/// undo/redo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encounter {
    New,
    Recreated,
}

/// Classifies `dst` and writes the encountered marker back when the source
/// will not go through a properties copy.
///
/// A source without the marker but with non-empty settings was filled in by
/// something else (a recreated source, a drag-and-drop import), so it is
/// treated as already encountered. Media sources are exempt from that check.
///
/// A source deleted and restored from before the filter existed will still
/// look new; nothing distinguishes it from a fresh one.
pub fn classify(dst: &dyn Source, copy_properties: bool) -> Encounter {
    let mut settings = dst.settings();
    let dump = Value::Object(settings.clone());
    debug!(source = %dst.name(), settings = %dump, "destination settings");

    let mut encountered = settings
        .get(ENCOUNTERED_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !encountered {
        if dst.unversioned_kind() != MEDIA_SOURCE_KIND {
            encountered = !settings.is_empty();
        }
        // Marked even when nothing is copied, so that resetting the source to
        // its defaults later cannot make it look new.
        if encountered || !copy_properties {
            settings.insert(ENCOUNTERED_KEY.to_string(), Value::Bool(true));
            dst.update(&settings);
        }
    }

    if encountered {
        Encounter::Recreated
    } else {
        Encounter::New
    }
}
