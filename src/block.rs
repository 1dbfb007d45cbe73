use crate::definition::BlockDefinition;
use crate::{BlockId, ConnectionId, Point, Size};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A node in the program tree
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) id: BlockId,

    /// Behavior descriptor looked up once at construction
    pub(crate) definition: Rc<BlockDefinition>,

    pub(crate) colour: u16,

    /// Title row items, in display order
    pub(crate) fields: Vec<Field>,

    /// Input sockets, in display order
    pub(crate) inputs: Vec<Input>,

    pub(crate) output: Option<ConnectionId>,
    pub(crate) previous: Option<ConnectionId>,
    pub(crate) next: Option<ConnectionId>,

    pub(crate) collapsed: bool,
    pub(crate) inputs_inline: bool,

    /// Fixed at creation
    pub(crate) editable: bool,
    pub(crate) deletable: bool,

    pub(crate) comment: Option<String>,
    pub(crate) tooltip: String,

    /// Lookup only; the parent owns this block through `children`
    pub(crate) parent: Option<BlockId>,
    pub(crate) children: Vec<BlockId>,

    /// Top-left corner in workspace coordinates
    pub(crate) position: Point,

    /// Own size as of the last render (excludes the next-statement chain)
    pub(crate) size: Size,

    pub(crate) dragging: bool,
}

impl Block {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn block_type(&self) -> &str {
        &self.definition.type_tag
    }

    pub fn definition(&self) -> &BlockDefinition {
        &self.definition
    }

    pub fn colour(&self) -> u16 {
        self.colour
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn get_input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output_connection(&self) -> Option<ConnectionId> {
        self.output
    }

    pub fn previous_connection(&self) -> Option<ConnectionId> {
        self.previous
    }

    pub fn next_connection(&self) -> Option<ConnectionId> {
        self.next
    }

    /// The connection through which this block hangs off a parent
    pub fn inferior_connection(&self) -> Option<ConnectionId> {
        self.output.or(self.previous)
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn inputs_inline(&self) -> bool {
        self.inputs_inline
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn is_deletable(&self) -> bool {
        self.deletable
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }

    pub fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    pub fn children(&self) -> &[BlockId] {
        &self.children
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Value of a named field, searching the title row and then
    /// local-variable inputs
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .map(|f| f.value())
            .or_else(|| {
                self.inputs
                    .iter()
                    .filter_map(|i| i.variable.as_ref())
                    .find(|f| f.name.as_deref() == Some(name))
                    .map(|f| f.value())
            })
    }

    pub(crate) fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        let in_title = self.fields.iter().position(|f| f.name.as_deref() == Some(name));
        match in_title {
            Some(at) => self.fields.get_mut(at),
            None => self
                .inputs
                .iter_mut()
                .filter_map(|i| i.variable.as_mut())
                .find(|f| f.name.as_deref() == Some(name)),
        }
    }

    /// Connections owned by this block: output, previous, next, then one per
    /// connected input. A collapsed block only reports its outer connections
    /// unless `all` is set.
    pub fn connections(&self, all: bool) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = [self.output, self.previous, self.next]
            .into_iter()
            .flatten()
            .collect();
        if all || !self.collapsed {
            connections.extend(self.inputs.iter().filter_map(|i| i.connection));
        }
        connections
    }

    /// Text shown for a collapsed block
    pub fn summary(&self) -> String {
        let parts: Vec<&str> = self
            .fields
            .iter()
            .map(|f| f.display_text())
            .chain(self.inputs.iter().filter_map(|i| i.label.as_deref()))
            .filter(|s| !s.is_empty())
            .collect();
        parts.join(" ")
    }
}

/// Input socket kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputKind {
    /// Accepts a value block
    Value,
    /// Accepts a statement stack
    Statement,
    /// Label-only row
    Dummy,
    /// Inline editable variable name, no connection
    LocalVariable,
}

/// An input socket on a block
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub(crate) name: String,
    pub(crate) kind: InputKind,
    pub(crate) label: Option<String>,
    pub(crate) connection: Option<ConnectionId>,
    pub(crate) variable: Option<Field>,
}

impl Input {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    /// The editable field of a local-variable input
    pub fn variable(&self) -> Option<&Field> {
        self.variable.as_ref()
    }
}

/// A title row item or local-variable field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: Option<String>,
    pub kind: FieldKind,
}

/// What a field displays and how it is edited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Static text
    Label(String),

    /// Free text entry
    Text(String),

    /// Choice from (display text, value) pairs
    Dropdown {
        options: Vec<(String, String)>,
        value: String,
    },
}

impl Field {
    pub fn label(text: impl Into<String>) -> Self {
        Self {
            name: None,
            kind: FieldKind::Label(text.into()),
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            kind: FieldKind::Text(value.into()),
        }
    }

    /// Dropdown starting at its first option
    pub fn dropdown(name: impl Into<String>, options: Vec<(String, String)>) -> Self {
        let value = options.first().map(|(_, v)| v.clone()).unwrap_or_default();
        Self {
            name: Some(name.into()),
            kind: FieldKind::Dropdown { options, value },
        }
    }

    /// Stored value (the option value for dropdowns)
    pub fn value(&self) -> &str {
        match &self.kind {
            FieldKind::Label(text) | FieldKind::Text(text) => text,
            FieldKind::Dropdown { value, .. } => value,
        }
    }

    /// Text as drawn on the block
    pub fn display_text(&self) -> &str {
        match &self.kind {
            FieldKind::Label(text) | FieldKind::Text(text) => text,
            FieldKind::Dropdown { options, value } => options
                .iter()
                .find(|(_, v)| v == value)
                .map(|(text, _)| text.as_str())
                .unwrap_or(value),
        }
    }

    pub fn is_editable(&self) -> bool {
        !matches!(self.kind, FieldKind::Label(_))
    }
}
