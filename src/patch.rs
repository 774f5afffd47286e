//! JSON-patch documents for playlist mutation.
//!
//! The server applies these against the user's playlist on
//! `PATCH /api/playlist`. Operation order within a document is significant
//! and preserved by construction.

use crate::PlaylistKind;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One JSON-patch operation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PatchOp {
    pub op: String,
    pub path: String,
    pub value: Value,
}

impl PatchOp {
    fn add(path: &str, value: Value) -> Self {
        Self {
            op: "add".to_string(),
            path: path.to_string(),
            value,
        }
    }

    fn replace(path: &str, value: Value) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.to_string(),
            value,
        }
    }
}

/// Append one unresolved reference to the end of the playlist.
pub fn append(entry_ref: &str) -> Vec<PatchOp> {
    vec![PatchOp::add("/playlist/track/-", json!({ "$ref": entry_ref }))]
}

/// Remove every entry from the playlist.
pub fn clear() -> Vec<PatchOp> {
    vec![PatchOp::replace("/playlist/track", json!([]))]
}

/// Store the current entry index and position.
pub fn position(index: usize, position: f64) -> Vec<PatchOp> {
    vec![
        PatchOp::replace("/index", json!(index)),
        PatchOp::replace("/position", json!(position)),
    ]
}

/// Reset the playlist to a single unresolved reference.
///
/// Emits seven operations: rewind index and position, retag the kind, retitle
/// the header, empty the track list, then add the reference.
pub fn replace(entry_ref: &str, kind: PlaylistKind, creator: &str, title: &str) -> Vec<PatchOp> {
    vec![
        PatchOp::replace("/index", json!(0)),
        PatchOp::replace("/position", json!(0)),
        PatchOp::replace("/type", json!(kind.as_ref())),
        PatchOp::replace("/playlist/creator", json!(creator)),
        PatchOp::replace("/playlist/title", json!(title)),
        PatchOp::replace("/playlist/track", json!([])),
        PatchOp::add("/playlist/track/-", json!({ "$ref": entry_ref })),
    ]
}
