// Wireblocks - block editor core for AVR wiring programs

pub mod block;
pub mod codegen;
pub mod config;
pub mod connect;
pub mod connection;
pub mod connection_index;
pub mod definition;
pub mod drag;
pub mod error;
pub mod event;
pub mod geometry;
pub mod ids;
pub mod library;
pub mod names;
pub mod render;
pub mod scheduler;
pub mod serialization;
pub mod validation;
pub mod wiring;
pub mod workspace;

// Re-export main types for convenience
pub use block::{Block, Field, FieldKind, Input, InputKind};
pub use codegen::CGenerator;
pub use config::EditorConfig;
pub use connect::ClosestMatch;
pub use connection::{Connection, ConnectionKind, TypeCheck};
pub use connection_index::ConnectionIndex;
pub use definition::{BlockBuilder, BlockDefinition, BlockRegistry, Capabilities, InputSpec, MutationHooks};
pub use drag::{DragController, DragPhase, DropOutcome, PointerButton, SnapCandidate};
pub use error::BlockError;
pub use event::{EventType, WorkspaceEvent};
pub use geometry::{Point, Rectangle, Size};
pub use ids::{BlockId, ConnectionId};
pub use names::{NameDb, NameType};
pub use render::{BlockLayout, BlockRenderer, MetricsRenderer};
pub use scheduler::{ScheduledTask, Scheduler, Task};
pub use serialization::{BlockState, InputState, Manifest, Project, WorkspaceState};
pub use validation::{ValidatedWorkspace, ValidationIssue, ValidationIssueType, ValidationResult, ValidationSeverity, Validator};
pub use wiring::{PinKind, WiringPin, WiringTable};
pub use workspace::{BlockOptions, DeletionTarget, Workspace};
