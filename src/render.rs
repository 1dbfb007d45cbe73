//! Block layout.
//!
//! Rendering here means geometry only: sizes and connection offsets. Drawing
//! is up to the host, which reads sizes and positions back off the blocks.

use crate::block::InputKind;
use crate::error::Result;
use crate::{Block, BlockId, ConnectionId, Point, Size, Workspace};
use std::fmt;

const COLLAPSED_SUFFIX: &str = " ...";

/// Computed shape of one block, relative to its top-left corner
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockLayout {
    pub size: Size,
    /// Offset of every connection that should be live
    pub connections: Vec<(ConnectionId, Point)>,
}

/// Computes the geometry of one block.
///
/// The output or previous connection must sit at the origin, so that a
/// child's position is the position of the socket it hangs from.
pub trait BlockRenderer: fmt::Debug {
    fn layout(&self, workspace: &Workspace, block: &Block) -> BlockLayout;
}

/// Row-based layout from fixed font and spacing metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRenderer {
    pub char_width: f32,
    pub row_height: f32,
    pub min_width: f32,
    pub padding: f32,
    /// Minimum distance of a statement arm from the left edge
    pub statement_indent: f32,
    pub empty_socket_width: f32,
    /// Height of the bar closing a statement arm
    pub bottom_bar: f32,
}

impl Default for MetricsRenderer {
    fn default() -> Self {
        Self {
            char_width: 7.0,
            row_height: 24.0,
            min_width: 40.0,
            padding: 8.0,
            statement_indent: 16.0,
            empty_socket_width: 16.0,
            bottom_bar: 8.0,
        }
    }
}

impl MetricsRenderer {
    fn text_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.char_width
    }

    fn title_width(&self, block: &Block) -> f32 {
        self.padding
            + block
                .fields
                .iter()
                .map(|f| self.text_width(f.display_text()) + self.padding)
                .sum::<f32>()
    }

    fn label_width(&self, label: Option<&str>) -> f32 {
        label.map_or(0.0, |l| self.text_width(l) + self.padding)
    }
}

impl BlockRenderer for MetricsRenderer {
    fn layout(&self, workspace: &Workspace, block: &Block) -> BlockLayout {
        let mut connections = Vec::new();
        if let Some(plug) = block.inferior_connection() {
            connections.push((plug, Point::ORIGIN));
        }

        if block.collapsed {
            let text = self.text_width(&block.summary()) + self.text_width(COLLAPSED_SUFFIX);
            let width = (text + self.padding * 2.0).max(self.min_width);
            if let Some(next) = block.next {
                connections.push((next, Point::new(0.0, self.row_height)));
            }
            return BlockLayout {
                size: Size::new(width, self.row_height),
                connections,
            };
        }

        let attached = |connection: Option<ConnectionId>| -> Option<Size> {
            let child = workspace.target_block(connection?).ok().flatten()?;
            Some(workspace.stack_size(child))
        };

        let title = self.title_width(block);
        let mut width = title.max(self.min_width);
        let mut y = 0.0;
        // Height of the open row; zero when no row is open.
        let mut row = if block.fields.is_empty() { 0.0 } else { self.row_height };
        let mut cursor = title;
        let mut right_edge = Vec::new();

        for input in &block.inputs {
            let label = self.label_width(input.label.as_deref());
            match input.kind {
                InputKind::Statement => {
                    y += row;
                    let arm_x = (self.padding + label).max(self.statement_indent);
                    if let Some(connection) = input.connection {
                        connections.push((connection, Point::new(arm_x, y)));
                    }
                    let arm = attached(input.connection)
                        .map_or(0.0, |s| s.height)
                        .max(self.row_height);
                    width = width.max(arm_x + self.padding);
                    y += arm + self.bottom_bar;
                    row = 0.0;
                    cursor = self.padding;
                }
                InputKind::Value if block.inputs_inline => {
                    if row == 0.0 {
                        row = self.row_height;
                        cursor = self.padding;
                    }
                    cursor += label;
                    if let Some(connection) = input.connection {
                        connections.push((connection, Point::new(cursor, y)));
                    }
                    let child = attached(input.connection)
                        .unwrap_or(Size::new(self.empty_socket_width, self.row_height));
                    cursor += child.width + self.padding;
                    row = row.max(child.height);
                    width = width.max(cursor);
                }
                InputKind::Value => {
                    y += row;
                    let child_height = attached(input.connection).map_or(0.0, |s| s.height);
                    row = self.row_height.max(child_height);
                    width = width.max(self.padding * 2.0 + label);
                    if let Some(connection) = input.connection {
                        right_edge.push((connection, y));
                    }
                    cursor = self.padding + label;
                }
                InputKind::Dummy | InputKind::LocalVariable => {
                    let variable = input
                        .variable
                        .as_ref()
                        .map_or(0.0, |f| self.text_width(f.display_text()) + self.padding);
                    if !(block.inputs_inline && row > 0.0) {
                        y += row;
                        row = self.row_height;
                        cursor = self.padding;
                    }
                    cursor += label + variable;
                    width = width.max(cursor);
                }
            }
        }

        let height = (y + row).max(self.row_height);
        for (connection, row_y) in right_edge {
            connections.push((connection, Point::new(width, row_y)));
        }
        if let Some(next) = block.next {
            connections.push((next, Point::new(0.0, height)));
        }

        BlockLayout {
            size: Size::new(width, height),
            connections,
        }
    }
}

impl Workspace {
    /// Lay a block out, move its connections into place and pull attached
    /// children along. Repeats for every ancestor, since a parent's shape
    /// depends on its children.
    pub fn render(&mut self, id: BlockId) -> Result<()> {
        let mut current = Some(id);
        while let Some(block_id) = current {
            let layout = self.renderer.layout(self, self.block(block_id)?);
            let origin = {
                let block = self.block_mut(block_id)?;
                block.size = layout.size;
                block.position
            };
            for (connection, offset) in layout.connections {
                self.move_connection_to(connection, origin.offset(offset.x, offset.y))?;
                self.tighten(connection)?;
            }
            current = self.block(block_id)?.parent;
        }
        Ok(())
    }

    /// Snap the block hanging from a superior connection onto it
    fn tighten(&mut self, id: ConnectionId) -> Result<()> {
        let connection = self.connection(id)?;
        if !connection.is_superior() {
            return Ok(());
        }
        let Some(target) = connection.target else {
            return Ok(());
        };
        let at = connection.position;
        let plug = self.connection(target)?;
        let (child, dx, dy) = (plug.block, at.x - plug.position.x, at.y - plug.position.y);
        self.translate_block(child, dx, dy)
    }

    /// Bounding size of a statement stack starting at `id`
    pub fn stack_size(&self, id: BlockId) -> Size {
        let mut size = Size::default();
        let mut current = self.blocks.get(&id);
        while let Some(block) = current {
            size.width = size.width.max(block.size.width);
            size.height += block.size.height;
            current = block
                .next
                .and_then(|next| self.connections.get(&next))
                .and_then(|next| next.target)
                .and_then(|below| self.connections.get(&below))
                .and_then(|below| self.blocks.get(&below.block));
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::BlockOptions;
    use crate::{BlockRegistry, EditorConfig};
    use std::rc::Rc;

    #[test]
    fn test_statement_stacks_under_parent() {
        let mut ws = Workspace::new();
        let a = ws.new_block_with("led", BlockOptions::at(50.0, 50.0)).unwrap();
        let b = ws.new_block_with("led", BlockOptions::at(400.0, 400.0)).unwrap();
        let a_next = ws.block(a).unwrap().next_connection().unwrap();
        let b_prev = ws.block(b).unwrap().previous_connection().unwrap();

        ws.connect(a_next, b_prev).unwrap();

        let a_block = ws.block(a).unwrap();
        let expected = Point::new(50.0, 50.0 + a_block.size().height);
        assert_eq!(ws.block(b).unwrap().position(), expected);
        assert_eq!(ws.connection(b_prev).unwrap().position(), expected);
        assert_eq!(ws.stack_size(a).height, a_block.size().height * 2.0);
    }

    #[test]
    fn test_statement_arm_grows_with_body() {
        let mut ws = Workspace::new();
        let loop_block = ws.new_block("controls_while").unwrap();
        let empty_height = ws.block(loop_block).unwrap().size().height;

        let body = ws.new_block("led").unwrap();
        let more = ws.new_block("led").unwrap();
        let body_next = ws.block(body).unwrap().next_connection().unwrap();
        let more_prev = ws.block(more).unwrap().previous_connection().unwrap();
        ws.connect(body_next, more_prev).unwrap();

        let socket = ws
            .block(loop_block)
            .unwrap()
            .get_input("DO")
            .unwrap()
            .connection()
            .unwrap();
        let body_prev = ws.block(body).unwrap().previous_connection().unwrap();
        ws.connect(socket, body_prev).unwrap();

        let grown = ws.block(loop_block).unwrap().size().height;
        assert!(grown > empty_height);
        assert_eq!(ws.block(body).unwrap().position(), ws.connection(socket).unwrap().position());
        let body_height = ws.block(body).unwrap().size().height;
        assert_eq!(
            ws.block(more).unwrap().position().y,
            ws.block(body).unwrap().position().y + body_height
        );
    }

    #[test]
    fn test_collapsed_block_is_one_row() {
        let mut ws = Workspace::new();
        let id = ws.new_block("controls_while").unwrap();
        ws.set_collapsed(id, true).unwrap();

        let metrics = MetricsRenderer::default();
        assert_eq!(ws.block(id).unwrap().size().height, metrics.row_height);
        let next = ws.block(id).unwrap().next_connection().unwrap();
        assert_eq!(ws.connection(next).unwrap().y(), metrics.row_height);
    }

    #[derive(Debug)]
    struct SquareRenderer;

    impl BlockRenderer for SquareRenderer {
        fn layout(&self, _workspace: &Workspace, block: &Block) -> BlockLayout {
            let mut connections = Vec::new();
            if let Some(plug) = block.inferior_connection() {
                connections.push((plug, Point::ORIGIN));
            }
            if let Some(next) = block.next_connection() {
                connections.push((next, Point::new(0.0, 10.0)));
            }
            BlockLayout {
                size: Size::new(10.0, 10.0),
                connections,
            }
        }
    }

    #[test]
    fn test_custom_renderer() {
        let mut ws = Workspace::with_registry(Rc::new(BlockRegistry::with_builtins()), EditorConfig::default());
        ws.set_renderer(Box::new(SquareRenderer));
        let a = ws.new_block("led").unwrap();
        let b = ws.new_block("led").unwrap();
        let a_next = ws.block(a).unwrap().next_connection().unwrap();
        let b_prev = ws.block(b).unwrap().previous_connection().unwrap();
        ws.connect(a_next, b_prev).unwrap();

        assert_eq!(ws.block(b).unwrap().position(), Point::new(0.0, 10.0));
        assert_eq!(ws.block(a).unwrap().size(), Size::new(10.0, 10.0));
    }
}
