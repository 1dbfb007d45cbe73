use crate::block::{FieldKind, Input, InputKind};
use crate::connection::TypeCheck;
use crate::connection_index::ConnectionIndex;
use crate::definition::{BlockBuilder, BlockRegistry, InputSpec};
use crate::error::{BlockError, Result};
use crate::event::{EventType, WorkspaceEvent};
use crate::render::{BlockRenderer, MetricsRenderer};
use crate::scheduler::{Scheduler, Task};
use crate::wiring::WiringTable;
use crate::{Block, BlockId, Connection, ConnectionId, ConnectionKind, EditorConfig, Point, Rectangle, Size};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, trace};

/// Per-block settings fixed at creation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockOptions {
    pub editable: bool,
    pub deletable: bool,
    pub position: Point,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            editable: true,
            deletable: true,
            position: Point::ORIGIN,
        }
    }
}

impl BlockOptions {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            position: Point::new(x, y),
            ..Self::default()
        }
    }
}

/// Screen region that swallows dropped blocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeletionTarget {
    pub bounds: Rectangle,
    /// Lid state; only an open target deletes
    pub open: bool,
}

/// Arena holding every block and connection of one editing surface.
///
/// Blocks and connections refer to each other by id only. A stale id simply
/// fails lookup with `BlockNotFound`/`ConnectionNotFound`.
#[derive(Debug)]
pub struct Workspace {
    pub(crate) config: EditorConfig,
    pub(crate) registry: Rc<BlockRegistry>,
    pub(crate) wiring: WiringTable,

    pub(crate) blocks: HashMap<BlockId, Block>,
    pub(crate) connections: HashMap<ConnectionId, Connection>,

    /// One y-sorted index per connection kind, see `ConnectionKind::slot`
    pub(crate) indexes: [ConnectionIndex; 4],

    /// Roots in z-order, last is topmost
    pub(crate) top_blocks: Vec<BlockId>,

    pub(crate) renderer: Box<dyn BlockRenderer>,
    pub(crate) scheduler: Scheduler,

    /// Event log for history tracking
    events: Vec<WorkspaceEvent>,

    /// Set while a pointer drag is in progress; suppresses bumping
    pub(crate) drag_active: bool,
    pub(crate) deletion_target: Option<DeletionTarget>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// Empty workspace with the built-in block library
    pub fn new() -> Self {
        Self::with_config(EditorConfig::default())
    }

    pub fn with_config(config: EditorConfig) -> Self {
        Self::with_registry(Rc::new(BlockRegistry::with_builtins()), config)
    }

    pub fn with_registry(registry: Rc<BlockRegistry>, config: EditorConfig) -> Self {
        Self {
            config,
            registry,
            wiring: WiringTable::new(),
            blocks: HashMap::new(),
            connections: HashMap::new(),
            indexes: Default::default(),
            top_blocks: Vec::new(),
            renderer: Box::new(MetricsRenderer::default()),
            scheduler: Scheduler::new(),
            events: Vec::new(),
            drag_active: false,
            deletion_target: None,
        }
    }

    pub fn set_renderer(&mut self, renderer: Box<dyn BlockRenderer>) {
        self.renderer = renderer;
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Board pins; pin dropdowns read this when a block is created
    pub fn wiring(&self) -> &WiringTable {
        &self.wiring
    }

    pub fn wiring_mut(&mut self) -> &mut WiringTable {
        &mut self.wiring
    }

    // ========== Block Creation ==========

    /// Create a root block at the origin
    pub fn new_block(&mut self, type_tag: &str) -> Result<BlockId> {
        self.new_block_with(type_tag, BlockOptions::default())
    }

    /// Create a root block from its registered definition
    pub fn new_block_with(&mut self, type_tag: &str, options: BlockOptions) -> Result<BlockId> {
        self.create_block(BlockId::new(), type_tag, options)
    }

    /// Create a root block under a caller-chosen id, as when loading
    pub(crate) fn create_block(&mut self, id: BlockId, type_tag: &str, options: BlockOptions) -> Result<BlockId> {
        let definition = self
            .registry
            .get(type_tag)
            .ok_or_else(|| BlockError::UnknownBlockType(type_tag.to_string()))?;

        let mut builder = BlockBuilder::new(type_tag, self.wiring.clone());
        (definition.init)(&mut builder);

        if builder.output.is_some() && builder.previous.is_some() {
            return Err(BlockError::OutputAndPrevious(type_tag.to_string()));
        }

        let mut seen = HashSet::new();
        for spec in &builder.inputs {
            if !spec.name.is_empty() && !seen.insert(spec.name.as_str()) {
                return Err(BlockError::DuplicateInput {
                    block: id,
                    name: spec.name.clone(),
                });
            }
        }

        let BlockBuilder {
            colour,
            fields,
            inputs,
            output,
            previous,
            next,
            inputs_inline,
            tooltip,
            ..
        } = builder;

        let position = options.position;
        let output = output
            .map(|check| self.create_connection(id, position, ConnectionKind::OutputValue, check))
            .transpose()?;
        let previous = previous
            .map(|check| self.create_connection(id, position, ConnectionKind::PreviousStatement, check))
            .transpose()?;
        let next = next
            .map(|check| self.create_connection(id, position, ConnectionKind::NextStatement, check))
            .transpose()?;

        let mut materialized = Vec::with_capacity(inputs.len());
        for spec in inputs {
            materialized.push(self.create_input(id, position, spec)?);
        }

        let block = Block {
            id,
            definition,
            colour,
            fields,
            inputs: materialized,
            output,
            previous,
            next,
            collapsed: false,
            inputs_inline,
            editable: options.editable,
            deletable: options.deletable,
            comment: None,
            tooltip,
            parent: None,
            children: Vec::new(),
            position,
            size: Size::default(),
            dragging: false,
        };

        self.blocks.insert(id, block);
        self.top_blocks.push(id);

        self.log_event(EventType::BlockCreated {
            id,
            block_type: type_tag.to_string(),
        });
        debug!(block = %id, block_type = type_tag, "created block");

        self.render(id)?;
        Ok(id)
    }

    fn create_connection(
        &mut self,
        block: BlockId,
        position: Point,
        kind: ConnectionKind,
        check: TypeCheck,
    ) -> Result<ConnectionId> {
        let mut connection = Connection::new(block, kind, check);
        connection.position = position;
        self.indexes[kind.slot()].add(&mut connection)?;

        let id = connection.id;
        self.connections.insert(id, connection);
        Ok(id)
    }

    fn create_input(&mut self, block: BlockId, position: Point, spec: InputSpec) -> Result<Input> {
        let connection = match spec.kind {
            InputKind::Value => Some(self.create_connection(
                block,
                position,
                ConnectionKind::InputValue,
                spec.check,
            )?),
            InputKind::Statement => Some(self.create_connection(
                block,
                position,
                ConnectionKind::NextStatement,
                spec.check,
            )?),
            InputKind::Dummy | InputKind::LocalVariable => None,
        };

        Ok(Input {
            name: spec.name,
            kind: spec.kind,
            label: spec.label,
            connection,
            variable: spec.variable,
        })
    }

    /// Drop a connection that nothing links to any more
    fn dispose_connection(&mut self, id: ConnectionId) -> Result<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(BlockError::ConnectionNotFound(id))?;
        if connection.target.is_some() {
            return Err(BlockError::StillConnected(id));
        }
        if connection.in_index {
            self.indexes[connection.kind.slot()].remove(connection)?;
        }
        self.connections.remove(&id);
        Ok(())
    }

    // ========== Lookup ==========

    pub fn get_block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn block(&self, id: BlockId) -> Result<&Block> {
        self.blocks.get(&id).ok_or(BlockError::BlockNotFound(id))
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        self.blocks.get_mut(&id).ok_or(BlockError::BlockNotFound(id))
    }

    pub fn get_connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.connections
            .get(&id)
            .ok_or(BlockError::ConnectionNotFound(id))
    }

    pub(crate) fn connection_mut(&mut self, id: ConnectionId) -> Result<&mut Connection> {
        self.connections
            .get_mut(&id)
            .ok_or(BlockError::ConnectionNotFound(id))
    }

    pub fn contains_block(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The index holding connections of one kind
    pub fn index(&self, kind: ConnectionKind) -> &ConnectionIndex {
        &self.indexes[kind.slot()]
    }

    /// Root blocks, in z-order or sorted top-to-bottom then left-to-right
    pub fn top_blocks(&self, ordered: bool) -> Vec<BlockId> {
        let mut roots = self.top_blocks.clone();
        if ordered {
            roots.sort_by(|a, b| {
                let pa = self.blocks.get(a).map(|b| b.position).unwrap_or(Point::ORIGIN);
                let pb = self.blocks.get(b).map(|b| b.position).unwrap_or(Point::ORIGIN);
                pa.y.total_cmp(&pb.y).then(pa.x.total_cmp(&pb.x))
            });
        }
        roots
    }

    /// Every block, root by root in z-order, each tree in pre-order
    pub fn all_blocks(&self) -> Vec<BlockId> {
        self.top_blocks
            .iter()
            .flat_map(|root| self.descendants(*root).unwrap_or_default())
            .collect()
    }

    /// The block itself followed by its subtree in pre-order
    pub fn descendants(&self, id: BlockId) -> Result<Vec<BlockId>> {
        self.block(id)?;
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            found.push(current);
            if let Some(block) = self.blocks.get(&current) {
                stack.extend(block.children.iter().rev());
            }
        }
        Ok(found)
    }

    pub fn root_block(&self, id: BlockId) -> Result<BlockId> {
        let mut current = id;
        while let Some(parent) = self.block(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Whether `block` is `root` or lies below it
    pub fn is_in_subtree(&self, block: BlockId, root: BlockId) -> Result<bool> {
        let mut current = Some(block);
        while let Some(id) = current {
            if id == root {
                return Ok(true);
            }
            current = self.block(id)?.parent;
        }
        Ok(false)
    }

    /// Block on the other end of a connection
    pub fn target_block(&self, connection: ConnectionId) -> Result<Option<BlockId>> {
        match self.connection(connection)?.target {
            Some(target) => Ok(Some(self.connection(target)?.block)),
            None => Ok(None),
        }
    }

    /// Block attached below through the next-statement connection
    pub fn next_block(&self, id: BlockId) -> Result<Option<BlockId>> {
        match self.block(id)?.next {
            Some(next) => self.target_block(next),
            None => Ok(None),
        }
    }

    /// Block this one hangs from through its previous-statement connection
    pub fn previous_block(&self, id: BlockId) -> Result<Option<BlockId>> {
        match self.block(id)?.previous {
            Some(previous) => self.target_block(previous),
            None => Ok(None),
        }
    }

    pub fn input_target_block(&self, id: BlockId, name: &str) -> Result<Option<BlockId>> {
        let input = self
            .block(id)?
            .get_input(name)
            .ok_or_else(|| BlockError::MissingInput {
                block: id,
                name: name.to_string(),
            })?;
        match input.connection {
            Some(connection) => self.target_block(connection),
            None => Ok(None),
        }
    }

    // ========== Tree Mutation ==========

    /// Re-home a block under `new_parent`, or make it a root.
    ///
    /// Leaving an old parent also severs the superior-side link of the
    /// block's output or previous connection. Positions are absolute, so
    /// re-parenting leaves coordinates unchanged; `render` aligns the child.
    pub fn set_parent(&mut self, child: BlockId, new_parent: Option<BlockId>) -> Result<()> {
        self.block(child)?;
        if let Some(parent) = new_parent {
            if self.is_in_subtree(parent, child)? {
                return Err(BlockError::WouldCreateCycle(child));
            }
        }

        self.detach_edge(child)?;

        match new_parent {
            Some(parent) => {
                self.block_mut(parent)?.children.push(child);
                self.block_mut(child)?.parent = Some(parent);
                trace!(child = %child, parent = %parent, "set parent");
            }
            None => {
                self.top_blocks.push(child);
                // Leaving a collapsed parent makes the tree visible again.
                let hidden = match self.block(child)?.inferior_connection() {
                    Some(plug) => self.connection(plug)?.hidden,
                    None => false,
                };
                if hidden {
                    self.unhide_block(child)?;
                }
                trace!(child = %child, "now a root block");
            }
        }
        Ok(())
    }

    /// Remove the tree edge above `child` without giving it a new home
    fn detach_edge(&mut self, child: BlockId) -> Result<()> {
        let Some(old_parent) = self.block(child)?.parent else {
            self.top_blocks.retain(|b| *b != child);
            return Ok(());
        };

        if let Some(parent) = self.blocks.get_mut(&old_parent) {
            parent.children.retain(|c| *c != child);
        }
        let plug = {
            let block = self.block_mut(child)?;
            block.parent = None;
            block.inferior_connection()
        };
        if let Some(plug) = plug {
            if let Some(socket) = self.connection(plug)?.target {
                self.unlink(plug, socket)?;
            }
        }
        Ok(())
    }

    /// Move a block, its connections and its whole subtree
    pub fn move_block_by(&mut self, id: BlockId, dx: f32, dy: f32) -> Result<()> {
        self.translate_block(id, dx, dy)?;
        self.log_event(EventType::BlockMoved { id, dx, dy });
        Ok(())
    }

    pub fn move_block_to(&mut self, id: BlockId, to: Point) -> Result<()> {
        let from = self.block(id)?.position;
        self.move_block_by(id, to.x - from.x, to.y - from.y)
    }

    /// Shift a subtree without recording an event
    pub(crate) fn translate_block(&mut self, id: BlockId, dx: f32, dy: f32) -> Result<()> {
        if dx == 0.0 && dy == 0.0 {
            return Ok(());
        }

        let (connections, children) = {
            let block = self.block_mut(id)?;
            block.position = block.position.offset(dx, dy);
            (block.connections(true), block.children.clone())
        };
        for connection in connections {
            self.move_connection_by(connection, dx, dy)?;
        }
        for child in children {
            self.translate_block(child, dx, dy)?;
        }
        Ok(())
    }

    /// Reposition a connection, re-indexing it unless hidden
    pub fn move_connection_to(&mut self, id: ConnectionId, to: Point) -> Result<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(BlockError::ConnectionNotFound(id))?;
        let index = &mut self.indexes[connection.kind.slot()];

        if connection.in_index {
            index.remove(connection)?;
        }
        connection.position = to;
        if !connection.hidden {
            index.add(connection)?;
        }
        Ok(())
    }

    pub fn move_connection_by(&mut self, id: ConnectionId, dx: f32, dy: f32) -> Result<()> {
        let at = self.connection(id)?.position;
        self.move_connection_to(id, at.offset(dx, dy))
    }

    pub(crate) fn set_connection_hidden(&mut self, id: ConnectionId, hidden: bool) -> Result<()> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(BlockError::ConnectionNotFound(id))?;
        let index = &mut self.indexes[connection.kind.slot()];

        connection.hidden = hidden;
        if hidden && connection.in_index {
            index.remove(connection)?;
        } else if !hidden && !connection.in_index {
            index.add(connection)?;
        }
        Ok(())
    }

    /// Hide a connection and every connection of the subtree behind it
    pub(crate) fn hide_all(&mut self, id: ConnectionId) -> Result<()> {
        self.set_connection_hidden(id, true)?;
        if let Some(child) = self.target_block(id)? {
            for block in self.descendants(child)? {
                for connection in self.block(block)?.connections(true) {
                    self.set_connection_hidden(connection, true)?;
                }
            }
        }
        Ok(())
    }

    /// Reveal a connection and the subtree behind it. Collapsed blocks in
    /// the subtree only reveal their outer connections.
    fn unhide_all(&mut self, id: ConnectionId) -> Result<()> {
        self.set_connection_hidden(id, false)?;
        if self.connection(id)?.is_superior() {
            if let Some(child) = self.target_block(id)? {
                self.unhide_block(child)?;
            }
        }
        Ok(())
    }

    fn unhide_block(&mut self, id: BlockId) -> Result<()> {
        for connection in self.block(id)?.connections(false) {
            self.unhide_all(connection)?;
        }
        Ok(())
    }

    pub(crate) fn set_dragging(&mut self, id: BlockId, dragging: bool) -> Result<()> {
        for block in self.descendants(id)? {
            self.block_mut(block)?.dragging = dragging;
        }
        Ok(())
    }

    /// Raise a root block to the top of the z-order
    pub(crate) fn bring_to_front(&mut self, id: BlockId) {
        if let Some(at) = self.top_blocks.iter().position(|b| *b == id) {
            let root = self.top_blocks.remove(at);
            self.top_blocks.push(root);
        }
    }

    // ========== Block State ==========

    /// Fold a block down to one row. Input subtrees leave the connection
    /// indexes while folded.
    pub fn set_collapsed(&mut self, id: BlockId, collapsed: bool) -> Result<()> {
        let block = self.block(id)?;
        if block.collapsed == collapsed {
            return Ok(());
        }
        let inputs: Vec<ConnectionId> = block.inputs.iter().filter_map(|i| i.connection).collect();
        // Inside a collapsed ancestor everything stays hidden either way.
        let within_hidden = match block.inferior_connection() {
            Some(plug) => self.connection(plug)?.hidden,
            None => false,
        };

        self.block_mut(id)?.collapsed = collapsed;
        if !within_hidden {
            for connection in inputs {
                if collapsed {
                    self.hide_all(connection)?;
                } else {
                    self.unhide_all(connection)?;
                }
            }
        }

        self.log_event(EventType::CollapseChanged { id, collapsed });
        debug!(block = %id, collapsed, "collapse changed");

        self.render(id)?;
        self.bump_neighbours(id)
    }

    pub fn set_inputs_inline(&mut self, id: BlockId, inline: bool) -> Result<()> {
        let block = self.block_mut(id)?;
        if block.inputs_inline == inline {
            return Ok(());
        }
        block.inputs_inline = inline;
        self.log_event(EventType::InlineChanged { id, inline });
        self.render(id)
    }

    pub fn set_comment(&mut self, id: BlockId, comment: Option<String>) -> Result<()> {
        self.block_mut(id)?.comment = comment.clone();
        self.log_event(EventType::CommentChanged { id, comment });
        Ok(())
    }

    pub fn field_value(&self, id: BlockId, name: &str) -> Result<&str> {
        self.block(id)?
            .field_value(name)
            .ok_or_else(|| BlockError::MissingField {
                block: id,
                name: name.to_string(),
            })
    }

    /// Set a text or dropdown field. Dropdowns only take one of their option
    /// values.
    pub fn set_field_value(&mut self, id: BlockId, name: &str, value: &str) -> Result<()> {
        let old_value = {
            let field = self
                .block_mut(id)?
                .field_mut(name)
                .ok_or_else(|| BlockError::MissingField {
                    block: id,
                    name: name.to_string(),
                })?;
            let old_value = field.value().to_string();
            match &mut field.kind {
                FieldKind::Label(text) | FieldKind::Text(text) => *text = value.to_string(),
                FieldKind::Dropdown { options, value: current } => {
                    if !options.iter().any(|(_, v)| v == value) {
                        return Err(BlockError::InvalidFieldValue {
                            name: name.to_string(),
                            value: value.to_string(),
                        });
                    }
                    *current = value.to_string();
                }
            }
            old_value
        };

        if old_value != value {
            self.log_event(EventType::FieldChanged {
                id,
                name: name.to_string(),
                old_value,
                new_value: value.to_string(),
            });
            self.render(id)?;
        }
        Ok(())
    }

    /// Add an input at the bottom of a block. Returns its connection, if the
    /// input kind has one.
    pub fn append_input(&mut self, id: BlockId, spec: InputSpec) -> Result<Option<ConnectionId>> {
        let block = self.block(id)?;
        if !spec.name.is_empty() && block.get_input(&spec.name).is_some() {
            return Err(BlockError::DuplicateInput {
                block: id,
                name: spec.name,
            });
        }
        let position = block.position;
        let hide = block.collapsed
            || match block.inferior_connection() {
                Some(plug) => self.connection(plug)?.hidden,
                None => false,
            };

        let name = spec.name.clone();
        let input = self.create_input(id, position, spec)?;
        let connection = input.connection;
        if let (Some(connection), true) = (connection, hide) {
            self.set_connection_hidden(connection, true)?;
        }
        self.block_mut(id)?.inputs.push(input);

        self.log_event(EventType::InputAdded { id, name });
        self.render(id)?;
        Ok(connection)
    }

    /// Remove a named input, detaching whatever was plugged into it
    pub fn remove_input(&mut self, id: BlockId, name: &str) -> Result<()> {
        let at = self
            .block(id)?
            .inputs
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| BlockError::MissingInput {
                block: id,
                name: name.to_string(),
            })?;

        if let Some(connection) = self.block(id)?.inputs[at].connection {
            if let Some(child) = self.target_block(connection)? {
                self.set_parent(child, None)?;
                self.log_event(EventType::Disconnected { parent: id, child });
            }
            self.dispose_connection(connection)?;
        }
        self.block_mut(id)?.inputs.remove(at);

        self.log_event(EventType::InputRemoved {
            id,
            name: name.to_string(),
        });
        self.render(id)
    }

    /// Saved extra shape of a block, if its type has one
    pub fn mutation_of(&self, id: BlockId) -> Result<Option<serde_json::Value>> {
        let block = self.block(id)?;
        Ok(block.definition.mutation.and_then(|hooks| (hooks.save)(block)))
    }

    /// Reshape a block from a saved mutation
    pub fn apply_mutation(&mut self, id: BlockId, mutation: &serde_json::Value) -> Result<()> {
        let hooks = self
            .block(id)?
            .definition
            .mutation
            .ok_or_else(|| BlockError::InvalidMutation {
                block: id,
                reason: "block type has no mutation".to_string(),
            })?;
        (hooks.load)(self, id, mutation)
    }

    // ========== Destruction ==========

    /// Destroy a block and its subtree.
    ///
    /// A gentle destroy of a statement block in the middle of a stack
    /// re-joins the blocks above and below it instead of taking the rest of
    /// the stack along. Destroying a procedure definition also gently
    /// destroys every caller of that procedure.
    pub fn destroy_block(&mut self, id: BlockId, gentle: bool) -> Result<()> {
        let block = self.block(id)?;
        let block_type = block.block_type().to_string();
        let old_parent = block.parent;
        let procedure = if block.definition.capabilities.procedure_definition {
            block.field_value("NAME").map(str::to_string)
        } else {
            None
        };

        if block.output.is_some() {
            self.set_parent(id, None)?;
        } else {
            let feed = match block.previous {
                Some(previous) => self.connection(previous)?.target,
                None => None,
            };
            self.set_parent(id, None)?;

            if gentle {
                let below = match self.block(id)?.next {
                    Some(next) => self.connection(next)?.target,
                    None => None,
                };
                if let Some(below) = below {
                    let next_block = self.connection(below)?.block;
                    self.set_parent(next_block, None)?;
                    if let Some(feed) = feed {
                        self.connect(feed, below)?;
                    }
                }
            }
        }

        self.top_blocks.retain(|b| *b != id);
        self.dispose_block(id)?;

        if let Some(parent) = old_parent {
            if self.blocks.contains_key(&parent) {
                self.render(parent)?;
            }
        }

        self.log_event(EventType::BlockDestroyed {
            id,
            block_type: block_type.clone(),
            gentle,
        });
        debug!(block = %id, block_type = %block_type, gentle, "destroyed block");

        if let Some(name) = procedure {
            self.destroy_callers(&name)?;
        }
        Ok(())
    }

    /// Tear down a detached block, children last-first
    fn dispose_block(&mut self, id: BlockId) -> Result<()> {
        let children = self.block(id)?.children.clone();
        for child in children.into_iter().rev() {
            self.detach_edge(child)?;
            self.dispose_block(child)?;
        }

        let block = self.blocks.remove(&id).ok_or(BlockError::BlockNotFound(id))?;
        for connection in block.connections(true) {
            if let Some(target) = self.connection(connection)?.target {
                self.unlink(connection, target)?;
            }
            self.dispose_connection(connection)?;
        }
        trace!(block = %id, "disposed block");
        Ok(())
    }

    /// Names of defined procedures as (without return, with return), each
    /// sorted case-insensitively
    pub fn all_procedures(&self) -> (Vec<String>, Vec<String>) {
        let mut plain = Vec::new();
        let mut returning = Vec::new();
        for block in self.blocks.values() {
            let capabilities = block.definition.capabilities;
            if !capabilities.procedure_definition {
                continue;
            }
            let name = block.field_value("NAME").unwrap_or_default().to_string();
            if capabilities.procedure_returns {
                returning.push(name);
            } else {
                plain.push(name);
            }
        }
        plain.sort_by_key(|n| n.to_lowercase());
        returning.sort_by_key(|n| n.to_lowercase());
        (plain, returning)
    }

    /// Distinct variable names used by variable and loop blocks, in order of
    /// first use
    pub fn all_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for id in self.all_blocks() {
            let Some(name) = self.blocks.get(&id).and_then(|b| b.field_value("VAR")) else {
                continue;
            };
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Call blocks naming a procedure, compared case-insensitively
    pub fn procedure_callers(&self, name: &str) -> Vec<BlockId> {
        self.all_blocks()
            .into_iter()
            .filter(|id| {
                self.blocks.get(id).is_some_and(|b| {
                    b.definition.capabilities.procedure_call
                        && b.field_value("NAME").is_some_and(|n| n.eq_ignore_ascii_case(name))
                })
            })
            .collect()
    }

    /// Gently destroy every caller of a procedure. Returns how many went.
    pub fn destroy_callers(&mut self, name: &str) -> Result<usize> {
        let mut destroyed = 0;
        for caller in self.procedure_callers(name) {
            // An earlier caller may have taken this one with it.
            if self.blocks.contains_key(&caller) {
                self.destroy_block(caller, true)?;
                destroyed += 1;
            }
        }
        Ok(destroyed)
    }

    // ========== Deferred Work ==========

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn schedule(&mut self, delay_ms: u64, task: Task) {
        trace!(?task, delay_ms, "scheduled task");
        self.scheduler.schedule(delay_ms, task);
    }

    /// Advance the logical clock, running every task that falls due.
    /// Returns the number of tasks run.
    pub fn advance_time(&mut self, ms: u64) -> Result<usize> {
        let until = self.scheduler.now() + ms;
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due(until) {
            self.run_task(task)?;
            ran += 1;
        }
        self.scheduler.advance_to(until);
        Ok(ran)
    }

    /// Run everything pending, whatever its delay
    pub fn flush_tasks(&mut self) -> Result<usize> {
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due(u64::MAX) {
            self.run_task(task)?;
            ran += 1;
        }
        Ok(ran)
    }

    fn run_task(&mut self, task: Task) -> Result<()> {
        match task {
            Task::BumpNeighbours { block } => {
                if !self.blocks.contains_key(&block) {
                    debug!(block = %block, "skipping bump of a destroyed block");
                    return Ok(());
                }
                self.bump_neighbours(block)
            }
            Task::BumpAwayFrom { block, away_from } => {
                let plug = match self.blocks.get(&block) {
                    Some(b) if b.parent.is_none() => b.inferior_connection(),
                    Some(_) => {
                        debug!(block = %block, "orphan was re-attached before its nudge");
                        return Ok(());
                    }
                    None => {
                        debug!(block = %block, "skipping nudge of a destroyed block");
                        return Ok(());
                    }
                };
                match plug {
                    Some(plug) if self.connections.contains_key(&away_from) => {
                        self.bump_away_from(plug, away_from)
                    }
                    _ => Ok(()),
                }
            }
            Task::CloseDeletionTarget => {
                if let Some(target) = self.deletion_target.as_mut() {
                    target.open = false;
                }
                Ok(())
            }
        }
    }

    // ========== Drag State ==========

    pub fn is_drag_active(&self) -> bool {
        self.drag_active
    }

    /// Place (or remove) the deletion target. It starts closed.
    pub fn set_deletion_target(&mut self, bounds: Option<Rectangle>) {
        self.deletion_target = bounds.map(|bounds| DeletionTarget { bounds, open: false });
    }

    pub fn deletion_target(&self) -> Option<&DeletionTarget> {
        self.deletion_target.as_ref()
    }

    // ========== Events ==========

    pub fn events(&self) -> &[WorkspaceEvent] {
        &self.events
    }

    /// Drain the event log
    pub fn take_events(&mut self) -> Vec<WorkspaceEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn log_event(&mut self, event: EventType) {
        self.events.push(WorkspaceEvent::new(event));
    }
}
