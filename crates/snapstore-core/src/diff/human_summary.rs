//! Human-readable summary renderer for snapshot diffs

use serde_json::Value;

use crate::diff::model::{ChangeKind, CompareMode, DiffClassification, SnapshotDiff};

/// Render a plain-text summary of a [`SnapshotDiff`]
///
/// Informational only; it carries nothing the structured diff does not.
pub fn render_human_summary(diff: &SnapshotDiff) -> String {
    let mut out = String::new();

    let mode = match diff.mode {
        CompareMode::Deep => "deep",
        CompareMode::Shallow => "shallow",
    };
    out.push_str(&format!(
        "Snapshot diff ({mode}): {}@v{} -> {}@v{}\n",
        diff.left.reference(),
        diff.left.version,
        diff.right.reference(),
        diff.right.version,
    ));

    let class_label = match diff.classification {
        DiffClassification::Identical => "identical",
        DiffClassification::MetadataOnly => "metadata only",
        DiffClassification::Changed => "changed",
    };
    out.push_str(&format!("Classification: {class_label}\n"));
    out.push_str(&format!("Version delta: {:+}\n", diff.version_delta));
    out.push_str(&format!(
        "Data digests: {} / {}\n",
        short(&diff.left.data_digest),
        short(&diff.right.data_digest)
    ));

    if diff.differences.is_empty() {
        out.push_str("No differences.\n");
        return out;
    }

    out.push_str(&format!("Differences ({}):\n", diff.differences.len()));
    for change in &diff.differences {
        let line = match change.kind {
            ChangeKind::Added => format!("  + {}: {}", change.path, render(change.right.as_ref())),
            ChangeKind::Removed => {
                format!("  - {}: {}", change.path, render(change.left.as_ref()))
            }
            ChangeKind::Changed => format!(
                "  ~ {}: {} -> {}",
                change.path,
                render(change.left.as_ref()),
                render(change.right.as_ref())
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

fn render(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<none>".to_string(),
    }
}
