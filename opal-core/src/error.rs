//! Error types for the Opal runtime support layer.

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, OpalError>;

/// Main error type shared by the bridge, the sequence algebra, and the
/// evaluator-facing operations.
///
/// Errors carry enough context (argument index, expected vs. actual kind,
/// handle value) to diagnose scripting mistakes without inspecting host
/// internals.
#[derive(Debug, thiserror::Error)]
pub enum OpalError {
    /// Wrong number of arguments to a bridge operation
    #[error("wrong number of arguments to `{op}`: expected {expected}, got {got}")]
    Arity {
        op: String,
        expected: String,
        got: usize,
    },

    /// Wrong argument kind, rejected before any host resource is touched
    #[error("invalid argument {index} to `{op}`: expected {expected}, got {got}")]
    Argument {
        op: String,
        index: usize,
        expected: String,
        got: String,
    },

    /// Stale process handle reused after removal
    #[error("unknown process handle {0}")]
    UnknownHandle(u64),

    /// Stale consumer id reused after removal
    #[error("unknown consumer {consumer} for watcher key {key}")]
    UnknownConsumer { key: i64, consumer: u64 },

    /// The executable could not be started
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    /// Native OS failure, message preserved from the host
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A streaming or watcher invariant was violated by a callback
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Error raised by an applied script callable
    #[error("script error: {0}")]
    Script(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OpalError {
    /// Create a new arity error
    pub fn arity(op: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        Self::Arity {
            op: op.into(),
            expected: expected.into(),
            got,
        }
    }

    /// Create a new argument error
    pub fn argument(
        op: impl Into<String>,
        index: usize,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self::Argument {
            op: op.into(),
            index,
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a new spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a new protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new script error
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is an unknown-handle error
    pub fn is_unknown_handle(&self) -> bool {
        matches!(self, Self::UnknownHandle(_))
    }

    /// Check if this is an argument or arity error
    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument { .. } | Self::Arity { .. })
    }

    /// Check if this is a protocol violation
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}
