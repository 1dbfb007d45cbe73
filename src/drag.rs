//! Pointer gesture handling: press, drag, snap and drop.
//!
//! The dragged block's connections stay at their indexed positions for the
//! whole gesture; snap searches use the pointer offset instead. The offset is
//! committed with a single move on release.

use crate::error::Result;
use crate::scheduler::Task;
use crate::{BlockId, ConnectionId, Point, Workspace};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// Where a gesture is
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragPhase {
    Idle,

    /// Pressed, still within the drag radius
    Armed { block: BlockId, start: Point },

    /// Moving freely; `dx`/`dy` is the pointer travel so far
    Dragging {
        block: BlockId,
        start: Point,
        dx: f32,
        dy: f32,
    },
}

/// Best snap found for the dragged block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapCandidate {
    /// Connection on the dragged block
    pub local: ConnectionId,
    pub target: ConnectionId,
    pub radius: f32,
}

/// What a release did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// Released without passing the drag radius
    Clicked,
    Moved,
    Connected,
    Deleted,
    /// No gesture was in progress
    Ignored,
}

/// Drives one press-drag-release gesture at a time
#[derive(Debug, Clone)]
pub struct DragController {
    phase: DragPhase,
    selected: Option<BlockId>,
    highlighted: Option<SnapCandidate>,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            phase: DragPhase::Idle,
            selected: None,
            highlighted: None,
        }
    }

    pub fn phase(&self) -> DragPhase {
        self.phase
    }

    pub fn selected(&self) -> Option<BlockId> {
        self.selected
    }

    pub fn highlighted(&self) -> Option<SnapCandidate> {
        self.highlighted
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging { .. })
    }

    /// Press on a block. Selects it, and arms a drag unless this is a
    /// secondary press or the block is locked. Returns whether it armed.
    pub fn pointer_down(
        &mut self,
        workspace: &mut Workspace,
        block: BlockId,
        at: Point,
        button: PointerButton,
    ) -> Result<bool> {
        if self.phase != DragPhase::Idle {
            return Ok(false);
        }

        let editable = workspace.block(block)?.editable;
        self.selected = Some(block);
        if button == PointerButton::Secondary || !editable {
            return Ok(false);
        }

        self.phase = DragPhase::Armed { block, start: at };
        debug!(block = %block, "drag armed");
        Ok(true)
    }

    pub fn pointer_move(&mut self, workspace: &mut Workspace, at: Point) -> Result<()> {
        match self.phase {
            DragPhase::Idle => Ok(()),
            DragPhase::Armed { block, start } => {
                if start.distance_to(&at) <= workspace.config.drag_radius {
                    return Ok(());
                }
                self.begin_drag(workspace, block)?;
                self.phase = DragPhase::Dragging {
                    block,
                    start,
                    dx: 0.0,
                    dy: 0.0,
                };
                self.drag_to(workspace, block, start, at)
            }
            DragPhase::Dragging { block, start, .. } => self.drag_to(workspace, block, start, at),
        }
    }

    /// Tear the block off its parent and mark its tree as dragging
    fn begin_drag(&mut self, workspace: &mut Workspace, block: BlockId) -> Result<()> {
        if workspace.block(block)?.parent.is_some() {
            if let Some(plug) = workspace.block(block)?.inferior_connection() {
                workspace.disconnect(plug)?;
            }
        }
        workspace.set_dragging(block, true)?;
        workspace.drag_active = true;
        workspace.bring_to_front(block);
        debug!(block = %block, "drag started");
        Ok(())
    }

    fn drag_to(&mut self, workspace: &mut Workspace, block: BlockId, start: Point, at: Point) -> Result<()> {
        let (dx, dy) = (at.x - start.x, at.y - start.y);
        self.phase = DragPhase::Dragging { block, start, dx, dy };

        let candidate = Self::best_candidate(workspace, block, dx, dy)?;
        if candidate.map(|c| c.target) != self.highlighted.map(|c| c.target) {
            if let Some(old) = self.highlighted {
                if let Ok(connection) = workspace.connection_mut(old.target) {
                    connection.highlighted = false;
                }
            }
            if let Some(new) = candidate {
                workspace.connection_mut(new.target)?.highlighted = true;
            }
        }
        self.highlighted = candidate;

        if let Some(target) = workspace.deletion_target.as_mut() {
            target.open = target.bounds.contains_point(at);
        }
        Ok(())
    }

    /// Closest snap over the block's own connections, each search bounded
    /// by the best radius found so far
    fn best_candidate(workspace: &Workspace, block: BlockId, dx: f32, dy: f32) -> Result<Option<SnapCandidate>> {
        let mut best = None;
        let mut radius = workspace.config.snap_radius;
        for local in workspace.block(block)?.connections(false) {
            let found = workspace.closest(local, radius, dx, dy)?;
            if let Some(target) = found.connection {
                radius = found.radius;
                best = Some(SnapCandidate {
                    local,
                    target,
                    radius,
                });
            }
        }
        Ok(best)
    }

    /// Release. Commits the move, then connects to the highlighted
    /// candidate, deletes over an open deletion target, or just drops.
    pub fn pointer_up(&mut self, workspace: &mut Workspace, at: Point) -> Result<DropOutcome> {
        let phase = std::mem::replace(&mut self.phase, DragPhase::Idle);
        let (block, start) = match phase {
            DragPhase::Idle => return Ok(DropOutcome::Ignored),
            DragPhase::Armed { .. } => return Ok(DropOutcome::Clicked),
            DragPhase::Dragging { block, start, .. } => (block, start),
        };

        // Bookkeeping first, so a failing connect still ends the gesture.
        let candidate = self.highlighted.take();
        if let Some(candidate) = candidate {
            if let Ok(connection) = workspace.connection_mut(candidate.target) {
                connection.highlighted = false;
            }
        }
        let over_trash = workspace.deletion_target.is_some_and(|t| t.open);
        workspace.drag_active = false;
        workspace.set_dragging(block, false)?;
        workspace.move_block_by(block, at.x - start.x, at.y - start.y)?;

        let bump_delay = workspace.config.bump_delay_ms;
        if let Some(candidate) = candidate {
            // A snap wins over the deletion target.
            if let Some(target) = workspace.deletion_target.as_mut() {
                target.open = false;
            }
            workspace.connect(candidate.local, candidate.target)?;
            workspace.schedule(bump_delay, Task::BumpNeighbours { block });
            debug!(block = %block, "dropped onto connection");
            return Ok(DropOutcome::Connected);
        }

        if over_trash && workspace.block(block)?.deletable {
            workspace.destroy_block(block, false)?;
            let close_delay = workspace.config.deletion_close_delay_ms;
            workspace.schedule(close_delay, Task::CloseDeletionTarget);
            if self.selected == Some(block) {
                self.selected = None;
            }
            debug!(block = %block, "dropped into deletion target");
            return Ok(DropOutcome::Deleted);
        }

        if let Some(target) = workspace.deletion_target.as_mut() {
            target.open = false;
        }
        workspace.render(block)?;
        workspace.schedule(bump_delay, Task::BumpNeighbours { block });
        debug!(block = %block, "dropped");
        Ok(DropOutcome::Moved)
    }
}
