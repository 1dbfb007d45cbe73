use crate::{BlockId, ConnectionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A workspace event with timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceEvent {
    pub timestamp: DateTime<Utc>,
    pub event: EventType,
}

impl WorkspaceEvent {
    /// Create a new event with the current timestamp
    pub fn new(event: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }

    /// Create a new event with a specific timestamp
    pub fn with_timestamp(timestamp: DateTime<Utc>, event: EventType) -> Self {
        Self { timestamp, event }
    }
}

/// Mutations recorded by the workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    BlockCreated {
        id: BlockId,
        block_type: String,
    },

    BlockDestroyed {
        id: BlockId,
        block_type: String,
        gentle: bool,
    },

    /// Explicit move by the user or a caller, not layout tightening
    BlockMoved {
        id: BlockId,
        dx: f32,
        dy: f32,
    },

    /// Nudged aside to clear an unintended overlap
    BlockBumped {
        id: BlockId,
        dx: f32,
        dy: f32,
    },

    Connected {
        parent: BlockId,
        child: BlockId,
        parent_connection: ConnectionId,
        child_connection: ConnectionId,
    },

    Disconnected {
        parent: BlockId,
        child: BlockId,
    },

    CollapseChanged {
        id: BlockId,
        collapsed: bool,
    },

    InlineChanged {
        id: BlockId,
        inline: bool,
    },

    InputAdded {
        id: BlockId,
        name: String,
    },

    InputRemoved {
        id: BlockId,
        name: String,
    },

    FieldChanged {
        id: BlockId,
        name: String,
        old_value: String,
        new_value: String,
    },

    CommentChanged {
        id: BlockId,
        comment: Option<String>,
    },
}
