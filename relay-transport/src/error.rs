use relay_event::error::EventError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("event: {0}")]
    Event(#[from] EventError),

    #[error("unsupported transport: {kind}")]
    UnsupportedTransport { kind: String },

    #[error("transport already registered: {kind}")]
    DuplicateTransport { kind: String },

    #[error("pipeline closed: {kind}")]
    PipelineClosed { kind: String },

    #[error("pipeline full: kind={kind}, capacity={capacity}")]
    PipelineFull { kind: String, capacity: usize },

    #[error("handler not found: {descriptor}")]
    HandlerNotFound { descriptor: String },

    #[error("handler already registered: {descriptor}")]
    AlreadyRegistered { descriptor: String },

    #[error("listener failed: descriptor={descriptor}, reason={reason}")]
    Listener { descriptor: String, reason: String },

    #[error("invalid batch: {reason}")]
    InvalidBatch { reason: String },

    #[error("commit failed: partition={partition}, offset={offset}, reason={reason}")]
    Commit {
        partition: String,
        offset: i64,
        reason: String,
    },

    #[error("client: {0}")]
    Client(String),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;
