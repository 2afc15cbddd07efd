//! Error types for the prooftree core.

use thiserror::Error;

/// Result type alias for prooftree core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The tagged-sum error taxonomy (spec §7).
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // InvalidArgument
    // ==========================================================================
    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    // ==========================================================================
    // NotFound
    // ==========================================================================
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("external not found: {0}")]
    ExternalNotFound(String),

    #[error("definition not found: {0}")]
    DefinitionNotFound(String),

    // ==========================================================================
    // AlreadyExists
    // ==========================================================================
    #[error("node id already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("proof already initialized")]
    AlreadyInitialized,

    #[error("external already exists: {0}")]
    ExternalAlreadyExists(String),

    // ==========================================================================
    // Conflict
    // ==========================================================================
    #[error("node {node} is busy, claimed by {owner}")]
    Busy { node: String, owner: String },

    #[error("challenge {0} already closed")]
    ChallengeAlreadyClosed(String),

    #[error("epistemic state of {node} is terminal ({state}); transition rejected")]
    TerminalState { node: String, state: String },

    #[error("node {node} is not claimed by {owner}")]
    NotOwner { node: String, owner: String },

    // ==========================================================================
    // PreconditionFailed
    // ==========================================================================
    #[error("unmet validation dependencies for {node}: {deps:?}")]
    UnmetValidationDeps { node: String, deps: Vec<String> },

    #[error("node {0} has open challenges")]
    OpenChallenges(String),

    #[error("node {0} is not pending")]
    NotPending(String),

    #[error("cycle detected introducing validation dependency into {0}")]
    ValidationCycle(String),

    #[error("node {0} is not a local_assume node")]
    NotLocalAssume(String),

    #[error("no active scope on node {0}")]
    NoActiveScope(String),

    #[error("{discharger} is not a descendant of {scope}")]
    NotDescendant { scope: String, discharger: String },

    // ==========================================================================
    // LedgerCorrupt
    // ==========================================================================
    #[error("ledger corrupt: {0}")]
    LedgerCorrupt(String),

    // ==========================================================================
    // IoError
    // ==========================================================================
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // ==========================================================================
    // Cancelled
    // ==========================================================================
    #[error("cancelled")]
    Cancelled,
}

/// Coarse classification used for exit codes and JSON `"error_type"` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Conflict,
    PreconditionFailed,
    LedgerCorrupt,
    IoError,
    Cancelled,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Conflict => "conflict",
            Self::PreconditionFailed => "precondition_failed",
            Self::LedgerCorrupt => "ledger_corrupt",
            Self::IoError => "io_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Error {
    /// Classify this error into one of the §7 taxonomy categories.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidNodeId(_) | Self::InvalidArgument(_) | Self::MissingField(_) => {
                ErrorKind::InvalidArgument
            }
            Self::NodeNotFound(_)
            | Self::ChallengeNotFound(_)
            | Self::ExternalNotFound(_)
            | Self::DefinitionNotFound(_) => ErrorKind::NotFound,
            Self::NodeAlreadyExists(_) | Self::AlreadyInitialized | Self::ExternalAlreadyExists(_) => {
                ErrorKind::AlreadyExists
            }
            Self::Busy { .. }
            | Self::ChallengeAlreadyClosed(_)
            | Self::TerminalState { .. }
            | Self::NotOwner { .. } => ErrorKind::Conflict,
            Self::UnmetValidationDeps { .. }
            | Self::OpenChallenges(_)
            | Self::NotPending(_)
            | Self::ValidationCycle(_)
            | Self::NotLocalAssume(_)
            | Self::NoActiveScope(_)
            | Self::NotDescendant { .. } => ErrorKind::PreconditionFailed,
            Self::LedgerCorrupt(_) => ErrorKind::LedgerCorrupt,
            Self::Io(_) | Self::Json(_) => ErrorKind::IoError,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether retrying the same operation (after re-folding state) could plausibly succeed.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::IoError | ErrorKind::Cancelled
        )
    }
}

/// Replace a known working-directory prefix in an error message with a placeholder.
///
/// Lives here rather than in the CLI only because it is a pure string function with
/// no I/O; presentation (when to call it) remains a CLI concern.
pub fn sanitize_message(message: &str, root: &std::path::Path) -> String {
    let Some(root_str) = root.to_str() else {
        return message.to_string();
    };
    if root_str.is_empty() {
        return message.to_string();
    }
    message.replace(root_str, "<proof-dir>")
}
