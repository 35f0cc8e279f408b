//! Turn input construction for `turn/start`.

use serde_json::{json, Value};
use std::path::Path;

/// True for image references the peer fetches itself rather than reading
/// from the local filesystem.
fn is_remote_image(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("data:image/")
}

/// Build the `input` array for a turn submission.
///
/// A text item leads iff the text is non-empty or there are no attachments.
/// Images become `image` (remote) or `localImage` (path) items, files become
/// `mention` items, all in caller order. An empty build gets one empty text
/// placeholder so the peer always sees at least one item.
pub fn build_inputs(text: &str, images: &[String], files: &[String]) -> Vec<Value> {
    let mut items = Vec::with_capacity(1 + images.len() + files.len());

    if !text.is_empty() || (images.is_empty() && files.is_empty()) {
        items.push(json!({"type": "text", "text": text}));
    }

    for image in images {
        if is_remote_image(image) {
            items.push(json!({"type": "image", "url": image}));
        } else {
            items.push(json!({"type": "localImage", "path": image}));
        }
    }

    for file in files {
        let name = Path::new(file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.clone());
        items.push(json!({"type": "mention", "name": name, "path": file}));
    }

    if items.is_empty() {
        items.push(json!({"type": "text", "text": ""}));
    }

    items
}

#[cfg(test)]
#[path = "inputs_tests.rs"]
mod tests;
