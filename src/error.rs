use crate::{BlockId, ConnectionId, ConnectionKind};

/// Structural violations raised by the block core.
///
/// Every variant is a caller bug: the operation that raised it is abandoned
/// and the workspace is left as it was before the offending step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BlockError {
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// Also raised for connections owned by a different workspace.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("unknown block type '{0}'")]
    UnknownBlockType(String),

    #[error("block type '{0}' declares both an output and a previous-statement connection")]
    OutputAndPrevious(String),

    #[error("cannot connect block {0} to itself")]
    SelfConnection(BlockId),

    #[error("cannot connect a {0:?} connection to a {1:?} connection")]
    IncompatibleKinds(ConnectionKind, ConnectionKind),

    #[error("connection types of {0} and {1} do not overlap")]
    TypeMismatch(ConnectionId, ConnectionId),

    #[error("source connection {0} is already connected")]
    AlreadyConnected(ConnectionId),

    #[error("socket {0} is already occupied and cannot be spliced")]
    SocketOccupied(ConnectionId),

    #[error("connecting would nest block {0} inside its own subtree")]
    WouldCreateCycle(BlockId),

    #[error("connection {0} is not connected")]
    NotConnected(ConnectionId),

    #[error("connection {0} points at a partner that does not point back")]
    AsymmetricLink(ConnectionId),

    #[error("orphan block {0} has neither an output nor a previous connection")]
    OrphanWithoutPlug(BlockId),

    #[error("connection {0} is already in the index")]
    AlreadyIndexed(ConnectionId),

    #[error("connection {0} is not in the index")]
    NotIndexed(ConnectionId),

    #[error("connection {0} is marked indexed but missing from the index")]
    IndexEntryMissing(ConnectionId),

    #[error("connection {0} is still connected")]
    StillConnected(ConnectionId),

    #[error("block {block} has no input named '{name}'")]
    MissingInput { block: BlockId, name: String },

    #[error("block {0} has no next-statement connection")]
    NoNextConnection(BlockId),

    #[error("block {block} already has an input named '{name}'")]
    DuplicateInput { block: BlockId, name: String },

    #[error("block {block} has no field named '{name}'")]
    MissingField { block: BlockId, name: String },

    #[error("'{value}' is not an option of field '{name}'")]
    InvalidFieldValue { name: String, value: String },

    #[error("invalid mutation for block {block}: {reason}")]
    InvalidMutation { block: BlockId, reason: String },
}

pub type Result<T, E = BlockError> = std::result::Result<T, E>;
