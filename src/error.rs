use crate::value::Rank;

/// Error taxonomy for the IV engine.
///
/// Forwarding toward the root is not a failure, so it has no variant
/// here. It is modeled as `class::Disposition::Forward`, a success
/// value the upcalls return to ask the engine to escalate. Only
/// genuine upcall/transport/argument failures live here.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IvError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("allocation failed: {0}")]
    NoMemory(String),

    #[error("namespace not found")]
    NamespaceNotFound,

    #[error("namespace already attached")]
    NamespaceAlreadyAttached,

    #[error("class id {0} is out of range for this namespace")]
    UnknownClass(u32),

    #[error("forward at root rank {0}: protocol violation")]
    ForwardAtRoot(Rank),

    #[error("upcall failed: {0}")]
    Upcall(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("bulk transfer error: {0}")]
    Bulk(String),
}

pub type IvResult<T> = std::result::Result<T, IvError>;

impl From<anyhow::Error> for IvError {
    fn from(err: anyhow::Error) -> Self {
        IvError::Transport(err.to_string())
    }
}

impl IvError {
    /// Stable numeric code carried over the wire in RPC replies. `0` is
    /// reserved for success, so every variant here maps to `1..`.
    pub fn to_rc(&self) -> u32 {
        match self {
            IvError::InvalidArgument(_) => 1,
            IvError::NoMemory(_) => 2,
            IvError::NamespaceNotFound => 3,
            IvError::NamespaceAlreadyAttached => 4,
            IvError::UnknownClass(_) => 5,
            IvError::ForwardAtRoot(_) => 6,
            IvError::Upcall(_) => 7,
            IvError::Transport(_) => 8,
            IvError::Bulk(_) => 9,
        }
    }
}
