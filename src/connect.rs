//! Linking connections: connect, disconnect, snap search and bumping.

use crate::error::{BlockError, Result};
use crate::event::EventType;
use crate::scheduler::Task;
use crate::{BlockId, Connection, ConnectionId, ConnectionKind, Workspace};
use tracing::debug;

/// Result of a snap search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestMatch {
    pub connection: Option<ConnectionId>,
    /// Distance to the match, or the search radius when there is none
    pub radius: f32,
}

impl Workspace {
    /// Link two connections and make the inferior side's block a child of
    /// the superior side's block.
    ///
    /// When `other` is a superior connection that is already filled, the
    /// block sitting there is displaced: it is re-attached further down the
    /// incoming block where that is unambiguous, and otherwise nudged aside
    /// after `bump_delay_ms`.
    pub fn connect(&mut self, source: ConnectionId, other: ConnectionId) -> Result<()> {
        let this = self.connection(source)?.clone();
        let that = self.connection(other)?.clone();

        if this.block == that.block {
            return Err(BlockError::SelfConnection(this.block));
        }
        if this.kind.opposite() != that.kind {
            return Err(BlockError::IncompatibleKinds(this.kind, that.kind));
        }
        if !this.accepts(&that) {
            return Err(BlockError::TypeMismatch(source, other));
        }
        if this.target.is_some() {
            return Err(BlockError::AlreadyConnected(source));
        }

        let (parent, child) = if this.is_superior() {
            (this.block, that.block)
        } else {
            (that.block, this.block)
        };
        if self.is_in_subtree(parent, child)? {
            return Err(BlockError::WouldCreateCycle(child));
        }

        if let Some(occupant) = that.target {
            if !that.is_superior() {
                return Err(BlockError::SocketOccupied(other));
            }
            let orphan = self.connection(occupant)?.block;
            self.displace_orphan(&this, other, orphan)?;
        }

        self.link(source, other)?;
        self.set_parent(child, Some(parent))?;

        let (parent_connection, child_connection) = if this.is_superior() {
            (source, other)
        } else {
            (other, source)
        };
        // Plugged into a folded socket: the new subtree starts hidden.
        if self.connection(parent_connection)?.hidden {
            self.hide_all(parent_connection)?;
        }

        self.log_event(EventType::Connected {
            parent,
            child,
            parent_connection,
            child_connection,
        });
        debug!(parent = %parent, child = %child, "connected");

        self.render(child)
    }

    /// Make room for `this` by taking the current occupant off `socket`
    fn displace_orphan(&mut self, this: &Connection, socket: ConnectionId, orphan: BlockId) -> Result<()> {
        self.set_parent(orphan, None)?;

        match this.kind {
            ConnectionKind::OutputValue => {
                let plug = self
                    .block(orphan)?
                    .output
                    .ok_or(BlockError::OrphanWithoutPlug(orphan))?;
                // Follow single compatible value inputs down the incoming block.
                let mut host = this.block;
                while let Some(input) = self.single_compatible_input(host, plug)? {
                    match self.target_block(input)? {
                        Some(filled) => host = filled,
                        None => {
                            debug!(orphan = %orphan, host = %host, "re-attached orphan value");
                            return self.connect(input, plug);
                        }
                    }
                }
            }
            ConnectionKind::PreviousStatement => {
                let plug = self
                    .block(orphan)?
                    .previous
                    .ok_or(BlockError::OrphanWithoutPlug(orphan))?;
                // Walk to the bottom of the incoming stack.
                let mut host = this.block;
                while let Some(next) = self.block(host)?.next {
                    match self.target_block(next)? {
                        Some(below) => host = below,
                        None => {
                            debug!(orphan = %orphan, host = %host, "re-attached orphan stack");
                            return self.connect(next, plug);
                        }
                    }
                }
            }
            ConnectionKind::InputValue | ConnectionKind::NextStatement => {}
        }

        debug!(orphan = %orphan, "no home for orphan, scheduling nudge");
        let delay = self.config.bump_delay_ms;
        self.schedule(
            delay,
            Task::BumpAwayFrom {
                block: orphan,
                away_from: socket,
            },
        );
        Ok(())
    }

    /// The one value input of `host` whose type accepts `plug`. None when
    /// there are zero or several.
    fn single_compatible_input(&self, host: BlockId, plug: ConnectionId) -> Result<Option<ConnectionId>> {
        let plug = self.connection(plug)?;
        let mut found = None;
        for input in self.block(host)?.inputs.iter() {
            let Some(socket) = input.connection else {
                continue;
            };
            let socket = self.connection(socket)?;
            if socket.kind != ConnectionKind::InputValue || !socket.accepts(plug) {
                continue;
            }
            if found.is_some() {
                return Ok(None);
            }
            found = Some(socket.id);
        }
        Ok(found)
    }

    /// Break a link, making the inferior side's block a root
    pub fn disconnect(&mut self, id: ConnectionId) -> Result<()> {
        let connection = self.connection(id)?;
        let target = connection.target.ok_or(BlockError::NotConnected(id))?;
        let partner = self.connection(target)?;
        if partner.target != Some(id) {
            return Err(BlockError::AsymmetricLink(id));
        }

        let (parent, child) = if connection.is_superior() {
            (connection.block, partner.block)
        } else {
            (partner.block, connection.block)
        };

        self.unlink(id, target)?;
        self.set_parent(child, None)?;

        self.log_event(EventType::Disconnected { parent, child });
        debug!(parent = %parent, child = %child, "disconnected");

        self.render(parent)?;
        self.render(child)
    }

    pub(crate) fn link(&mut self, a: ConnectionId, b: ConnectionId) -> Result<()> {
        self.connection_mut(a)?.target = Some(b);
        self.connection_mut(b)?.target = Some(a);
        Ok(())
    }

    pub(crate) fn unlink(&mut self, a: ConnectionId, b: ConnectionId) -> Result<()> {
        self.connection_mut(a)?.target = None;
        self.connection_mut(b)?.target = None;
        Ok(())
    }

    /// Nearest compatible connection within `max_radius` of this one's
    /// position shifted by (`dx`, `dy`).
    ///
    /// Connected inferior connections and type mismatches are skipped, as is
    /// anything on this connection's block, its subtree or its ancestors. An already
    /// connected connection never searches.
    pub fn closest(&self, id: ConnectionId, max_radius: f32, dx: f32, dy: f32) -> Result<ClosestMatch> {
        let connection = self.connection(id)?;
        let none = ClosestMatch {
            connection: None,
            radius: max_radius,
        };
        if connection.target.is_some() {
            return Ok(none);
        }

        let origin = connection.position.offset(dx, dy);
        let index = &self.indexes[connection.kind.opposite().slot()];
        let found = index.closest(origin, max_radius, |candidate| {
            self.is_snap_candidate(connection, candidate)
        });

        Ok(match found {
            Some((connection, radius)) => ClosestMatch {
                connection: Some(connection),
                radius,
            },
            None => none,
        })
    }

    fn is_snap_candidate(&self, connection: &Connection, candidate: ConnectionId) -> bool {
        let Some(other) = self.connections.get(&candidate) else {
            return false;
        };
        if !other.is_superior() && other.target.is_some() {
            return false;
        }
        if !connection.accepts(other) {
            return false;
        }
        // Never offer a connection on our own block, below it or above it.
        let below = self.is_in_subtree(other.block, connection.block).unwrap_or(true);
        let above = self.is_in_subtree(connection.block, other.block).unwrap_or(true);
        !below && !above
    }

    /// Opposite-kind connections within `radius`, unfiltered
    pub fn neighbours(&self, id: ConnectionId, radius: f32) -> Result<Vec<ConnectionId>> {
        let connection = self.connection(id)?;
        Ok(self.indexes[connection.kind.opposite().slot()].neighbours(connection.position, radius))
    }

    /// Push away unrelated blocks whose connections ended up within snap
    /// range of this block or its subtree. Does nothing mid-drag.
    pub fn bump_neighbours(&mut self, id: BlockId) -> Result<()> {
        if self.drag_active {
            return Ok(());
        }
        let root = self.root_block(id)?;
        let snap_radius = self.config.snap_radius;

        for connection_id in self.block(id)?.connections(false) {
            let connection = self.connection(connection_id)?.clone();
            if connection.is_superior() {
                if let Some(child) = self.target_block(connection_id)? {
                    self.bump_neighbours(child)?;
                }
            }

            for neighbour_id in self.neighbours(connection_id, snap_radius)? {
                let Some(neighbour) = self.connections.get(&neighbour_id) else {
                    continue;
                };
                if connection.target.is_some() && neighbour.target.is_some() {
                    continue;
                }
                if self.root_block(neighbour.block)? == root {
                    continue;
                }
                // The inferior side moves.
                if connection.is_superior() {
                    self.bump_away_from(neighbour_id, connection_id)?;
                } else {
                    self.bump_away_from(connection_id, neighbour_id)?;
                }
            }
        }
        Ok(())
    }

    /// Move the root block owning `moving` so it sits diagonally clear of
    /// `fixed`. If that root is locked, the other root moves the opposite
    /// way; if both are locked nothing happens.
    pub(crate) fn bump_away_from(&mut self, moving: ConnectionId, fixed: ConnectionId) -> Result<()> {
        if self.drag_active {
            return Ok(());
        }

        let (mut moving, mut fixed) = (moving, fixed);
        let mut root = self.root_block(self.connection(moving)?.block)?;
        let mut reverse = false;
        if !self.block(root)?.editable {
            root = self.root_block(self.connection(fixed)?.block)?;
            if !self.block(root)?.editable {
                return Ok(());
            }
            std::mem::swap(&mut moving, &mut fixed);
            reverse = true;
        }

        let from = self.connection(moving)?.position;
        let away = self.connection(fixed)?.position;
        let snap_radius = self.config.snap_radius;
        let offset_y = if reverse { -2.0 * snap_radius } else { 2.0 * snap_radius };
        let dx = away.x + snap_radius - from.x;
        let dy = away.y + offset_y - from.y;

        self.translate_block(root, dx, dy)?;
        self.bring_to_front(root);

        self.log_event(EventType::BlockBumped { id: root, dx, dy });
        debug!(block = %root, dx, dy, "bumped block");
        Ok(())
    }
}
