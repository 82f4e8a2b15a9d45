use snapstore_core_types::{RequestId, TraceId};
use thiserror::Error;

use crate::batch::BatchFailure;
use crate::model::{Category, Snapshot, SnapshotId, SnapshotRef, StoreId};

/// Result type alias using SnapStoreError
pub type Result<T> = std::result::Result<T, SnapStoreError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that the notification/UI side can
/// switch on without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Lookup
    NotFound,
    StoreNotFound,
    AlreadyExists,
    AmbiguousSelection,

    // Validation
    InvalidCategory,
    InvalidInput,

    // Reconciliation
    MergeConflict,

    // Hierarchy
    ParentNotFound,
    ChildNotFound,
    MultipleParents,
    CycleDetected,

    // Batch
    BatchFailed,

    // Boundary collaborators
    Config,
    Serialization,
    ExternalService,
    Cancelled,
    Timeout,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::StoreNotFound => "ERR_STORE_NOT_FOUND",
            ExErrorKind::AlreadyExists => "ERR_ALREADY_EXISTS",
            ExErrorKind::AmbiguousSelection => "ERR_AMBIGUOUS_SELECTION",
            ExErrorKind::InvalidCategory => "ERR_INVALID_CATEGORY",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::MergeConflict => "ERR_MERGE_CONFLICT",
            ExErrorKind::ParentNotFound => "ERR_PARENT_NOT_FOUND",
            ExErrorKind::ChildNotFound => "ERR_CHILD_NOT_FOUND",
            ExErrorKind::MultipleParents => "ERR_MULTIPLE_PARENTS",
            ExErrorKind::CycleDetected => "ERR_CYCLE_DETECTED",
            ExErrorKind::BatchFailed => "ERR_BATCH_FAILED",
            ExErrorKind::Config => "ERR_CONFIG",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::ExternalService => "ERR_EXTERNAL_SERVICE",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Timeout => "ERR_TIMEOUT",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a caller can reasonably retry or recover from this kind
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ExErrorKind::Internal | ExErrorKind::Config)
    }
}

/// Canonical structured error type
///
/// Carries classification fields for programmatic handling and enough
/// context (offending ids, store, candidates) for a UI to render a message.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_id: Option<String>,
    store_id: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
    candidates: Option<Vec<String>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_id: None,
            store_id: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
            candidates: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add store ID context
    pub fn with_store_id(mut self, id: impl Into<String>) -> Self {
        self.store_id = Some(id.into());
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Add candidate ids (stores holding an ambiguous id, failed batch targets)
    pub fn with_candidates(mut self, ids: Vec<String>) -> Self {
        self.candidates = Some(ids);
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn store_id(&self) -> Option<&str> {
        self.store_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    pub fn candidates(&self) -> Option<&[String]> {
        self.candidates.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(store_id) = &self.store_id {
            write!(f, " (store_id: {})", store_id)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for snapshot store, container, and batch operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapStoreError {
    // ===== Lookup =====
    /// Operation targets an id that is absent (or expired) in the store
    #[error("Snapshot not found: {id} in store {store_id}")]
    NotFound { store_id: StoreId, id: SnapshotId },

    /// No store registered under this id
    #[error("Store not found: {store_id}")]
    StoreNotFound { store_id: StoreId },

    /// A store with this id is already registered in the container
    #[error("Store already registered: {store_id}")]
    StoreAlreadyExists { store_id: StoreId },

    /// Create was given an id already held by a live snapshot
    #[error("Snapshot already exists: {id} in store {store_id}")]
    AlreadyExists { store_id: StoreId, id: SnapshotId },

    /// A bare id resolved to live snapshots in more than one store
    #[error("Snapshot id {id} is ambiguous across stores: {candidates:?}")]
    AmbiguousId {
        id: SnapshotId,
        candidates: Vec<StoreId>,
    },

    // ===== Validation =====
    /// Category missing where required, or not in the store's accepted set
    #[error("Invalid category {category:?} for store {store_id}: {reason}")]
    InvalidCategory {
        store_id: StoreId,
        category: Option<Category>,
        reason: String,
    },

    /// Patch could not be applied to the snapshot
    #[error("Invalid patch for snapshot {id}: {reason}")]
    InvalidPatch { id: SnapshotId, reason: String },

    // ===== Reconciliation =====
    /// The caller-supplied resolver failed on a field
    #[error("Merge conflict on field '{field}' between {} and {}: {message}", .left.reference(), .right.reference())]
    MergeConflict {
        field: String,
        left: Box<Snapshot>,
        right: Box<Snapshot>,
        message: String,
    },

    // ===== Hierarchy =====
    #[error("Parent snapshot not found: {parent}")]
    ParentNotFound { parent: String },

    #[error("Child snapshot not found: {child}")]
    ChildNotFound {
        child: String,
        parent: Option<String>,
    },

    /// A child has exactly one structural parent
    #[error("Snapshot {child} already has parent {current_parent}")]
    ChildAlreadyHasParent {
        child: SnapshotRef,
        current_parent: SnapshotRef,
    },

    /// Linking would make a snapshot its own ancestor
    #[error("Cycle detected: linking {child} under {parent} would create a cycle")]
    CycleDetected {
        parent: SnapshotRef,
        child: SnapshotRef,
    },

    // ===== Batch =====
    /// Every item of a non-empty batch failed
    #[error("Batch {batch_id} failed: all {} items failed", .failures.len())]
    BatchFailed {
        batch_id: String,
        failures: Vec<BatchFailure>,
    },

    // ===== Boundary collaborators =====
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Persistence/transport collaborator failed
    #[error("External service error for {target}: {message}")]
    ExternalService { target: String, message: String },

    /// A late result arrived for an abandoned or superseded request
    #[error("Request for {target} was cancelled (generation {generation})")]
    Cancelled { target: String, generation: u64 },

    #[error("Request for {target} timed out after {after_ms}ms")]
    Timeout { target: String, after_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SnapStoreError {
    /// Canonical kind for this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            SnapStoreError::NotFound { .. } => ExErrorKind::NotFound,
            SnapStoreError::StoreNotFound { .. } => ExErrorKind::StoreNotFound,
            SnapStoreError::StoreAlreadyExists { .. } | SnapStoreError::AlreadyExists { .. } => {
                ExErrorKind::AlreadyExists
            }
            SnapStoreError::AmbiguousId { .. } => ExErrorKind::AmbiguousSelection,
            SnapStoreError::InvalidCategory { .. } => ExErrorKind::InvalidCategory,
            SnapStoreError::InvalidPatch { .. } => ExErrorKind::InvalidInput,
            SnapStoreError::MergeConflict { .. } => ExErrorKind::MergeConflict,
            SnapStoreError::ParentNotFound { .. } => ExErrorKind::ParentNotFound,
            SnapStoreError::ChildNotFound { .. } => ExErrorKind::ChildNotFound,
            SnapStoreError::ChildAlreadyHasParent { .. } => ExErrorKind::MultipleParents,
            SnapStoreError::CycleDetected { .. } => ExErrorKind::CycleDetected,
            SnapStoreError::BatchFailed { .. } => ExErrorKind::BatchFailed,
            SnapStoreError::Config { .. } => ExErrorKind::Config,
            SnapStoreError::Serialization { .. } => ExErrorKind::Serialization,
            SnapStoreError::ExternalService { .. } => ExErrorKind::ExternalService,
            SnapStoreError::Cancelled { .. } => ExErrorKind::Cancelled,
            SnapStoreError::Timeout { .. } => ExErrorKind::Timeout,
            SnapStoreError::Internal { .. } => ExErrorKind::Internal,
        }
    }

    /// True for the per-item conditions a batch reports instead of escalating
    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapStoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for SnapStoreError {
    fn from(err: serde_json::Error) -> Self {
        SnapStoreError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Conversion from SnapStoreError to the canonical ExError
impl From<SnapStoreError> for ExError {
    fn from(err: SnapStoreError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        let base = ExError::new(kind).with_message(message);
        match err {
            SnapStoreError::NotFound { store_id, id }
            | SnapStoreError::AlreadyExists { store_id, id } => base
                .with_store_id(store_id.to_string())
                .with_entity_id(id.to_string()),

            SnapStoreError::StoreNotFound { store_id }
            | SnapStoreError::StoreAlreadyExists { store_id } => {
                base.with_store_id(store_id.to_string())
            }

            SnapStoreError::AmbiguousId { id, candidates } => base
                .with_entity_id(id.to_string())
                .with_candidates(candidates.iter().map(|s| s.to_string()).collect()),

            SnapStoreError::InvalidCategory { store_id, .. } => {
                base.with_store_id(store_id.to_string())
            }

            SnapStoreError::InvalidPatch { id, .. } => base.with_entity_id(id.to_string()),

            SnapStoreError::MergeConflict { left, right, .. } => base
                .with_store_id(left.store_id.to_string())
                .with_entity_id(left.id.to_string())
                .with_candidates(vec![
                    left.reference().to_string(),
                    right.reference().to_string(),
                ]),

            SnapStoreError::ParentNotFound { parent } => {
                base.with_op("find_parent").with_entity_id(parent)
            }

            SnapStoreError::ChildNotFound { child, .. } => {
                base.with_op("find_child").with_entity_id(child)
            }

            SnapStoreError::ChildAlreadyHasParent {
                child,
                current_parent,
            } => base
                .with_store_id(child.store_id.to_string())
                .with_entity_id(child.id.to_string())
                .with_candidates(vec![current_parent.to_string()]),

            SnapStoreError::CycleDetected { parent, child } => base
                .with_store_id(child.store_id.to_string())
                .with_entity_id(child.id.to_string())
                .with_candidates(vec![parent.to_string()]),

            SnapStoreError::BatchFailed { batch_id, failures } => base
                .with_entity_id(batch_id)
                .with_candidates(failures.iter().map(|f| f.target.clone()).collect()),

            SnapStoreError::ExternalService { target, .. }
            | SnapStoreError::Cancelled { target, .. }
            | SnapStoreError::Timeout { target, .. } => base.with_entity_id(target),

            SnapStoreError::Config { .. }
            | SnapStoreError::Serialization { .. }
            | SnapStoreError::Internal { .. } => base,
        }
    }
}
