//! Snapshot diff engine
//!
//! Compares two snapshots (or two payloads) and produces a structured,
//! deterministic diff used for conflict detection and change logging.
//!
//! ## Entry point
//!
//! ```
//! use snapstore_core::diff::{compare_values, CompareMode};
//! use serde_json::json;
//!
//! let changes = compare_values(&json!({"a": 1}), &json!({"a": 2}), CompareMode::Deep);
//! assert_eq!(changes[0].path, "a");
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism**: identical inputs produce identical output regardless of
//!   argument order in the store (keys are walked in sorted order).
//! - **Noise suppression**: `timestamp`, `version`, `last_updated` and
//!   subscriber sets never count as differences; they are reported on the
//!   diff sides instead.

pub mod engine;
pub mod human_summary;
pub mod model;

pub use engine::{compare_snapshot_data, compare_snapshots, compare_values, content_digest};
pub use human_summary::render_human_summary;
pub use model::{
    ChangeKind, CompareMode, DiffClassification, DiffSide, FieldChange, SnapshotDiff,
};
