use crate::{BlockId, ConnectionId, Point};
use serde::{Deserialize, Serialize};

/// The four connector kinds a block can carry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Socket accepting a value block (parent side)
    InputValue,
    /// Plug on a value block (child side)
    OutputValue,
    /// Bottom of a statement block (parent side)
    NextStatement,
    /// Top of a statement block (child side)
    PreviousStatement,
}

impl ConnectionKind {
    pub const ALL: [ConnectionKind; 4] = [
        ConnectionKind::InputValue,
        ConnectionKind::OutputValue,
        ConnectionKind::NextStatement,
        ConnectionKind::PreviousStatement,
    ];

    /// The only kind this kind can be partnered with
    pub fn opposite(self) -> ConnectionKind {
        match self {
            ConnectionKind::InputValue => ConnectionKind::OutputValue,
            ConnectionKind::OutputValue => ConnectionKind::InputValue,
            ConnectionKind::NextStatement => ConnectionKind::PreviousStatement,
            ConnectionKind::PreviousStatement => ConnectionKind::NextStatement,
        }
    }

    /// Superior kinds sit on the parent side of a tree edge
    pub fn is_superior(self) -> bool {
        matches!(
            self,
            ConnectionKind::InputValue | ConnectionKind::NextStatement
        )
    }

    pub fn is_value(self) -> bool {
        matches!(self, ConnectionKind::InputValue | ConnectionKind::OutputValue)
    }

    /// Slot of this kind's index inside the workspace
    pub(crate) fn slot(self) -> usize {
        match self {
            ConnectionKind::InputValue => 0,
            ConnectionKind::OutputValue => 1,
            ConnectionKind::NextStatement => 2,
            ConnectionKind::PreviousStatement => 3,
        }
    }
}

/// Value-type tags a connection accepts. `None` accepts anything.
pub type TypeCheck = Option<Vec<String>>;

/// Build a type check from a list of tags
pub fn check(tags: &[&str]) -> TypeCheck {
    Some(tags.iter().map(|t| t.to_string()).collect())
}

/// A single typed connector owned by one block
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) block: BlockId,
    pub(crate) kind: ConnectionKind,
    pub(crate) position: Point,
    pub(crate) check: TypeCheck,
    pub(crate) target: Option<ConnectionId>,
    pub(crate) in_index: bool,
    pub(crate) hidden: bool,
    pub(crate) highlighted: bool,
}

impl Connection {
    pub(crate) fn new(block: BlockId, kind: ConnectionKind, check: TypeCheck) -> Self {
        Self {
            id: ConnectionId::new(),
            block,
            kind,
            position: Point::ORIGIN,
            check,
            target: None,
            in_index: false,
            hidden: false,
            highlighted: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Owning block
    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Absolute position in workspace coordinates
    pub fn position(&self) -> Point {
        self.position
    }

    pub fn x(&self) -> f32 {
        self.position.x
    }

    pub fn y(&self) -> f32 {
        self.position.y
    }

    pub fn check(&self) -> Option<&[String]> {
        self.check.as_deref()
    }

    /// Partner connection, if linked
    pub fn target(&self) -> Option<ConnectionId> {
        self.target
    }

    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_superior(&self) -> bool {
        self.kind.is_superior()
    }

    /// Whether the connection currently sits in its kind's index
    pub fn is_indexed(&self) -> bool {
        self.in_index
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    /// Whether the type-check lists of two connections overlap.
    /// An unconstrained side accepts anything.
    pub fn accepts(&self, other: &Connection) -> bool {
        match (&self.check, &other.check) {
            (Some(mine), Some(theirs)) => mine.iter().any(|tag| theirs.contains(tag)),
            _ => true,
        }
    }
}
