use crate::error::BlockError;
use crate::event::WorkspaceEvent;
use crate::wiring::WiringTable;
use crate::workspace::BlockOptions;
use crate::{BlockId, Point, Workspace};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Version written into every saved program
pub const STATE_VERSION: u32 = 1;

fn is_true(value: &bool) -> bool {
    *value
}

fn default_true() -> bool {
    true
}

/// Snapshot of one block and everything attached below it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockState {
    #[serde(rename = "type")]
    pub block_type: String,
    pub id: BlockId,
    pub position: Point,

    /// Editable field values by name, local-variable fields included
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,

    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub inline: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub editable: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub deletable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<serde_json::Value>,

    /// Filled inputs, in input order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<BlockState>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub name: String,
    pub block: BlockState,
}

/// Snapshot of a whole workspace: the pin table and every root tree in
/// z-order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub version: u32,
    #[serde(default)]
    pub wiring: WiringTable,
    #[serde(default)]
    pub blocks: Vec<BlockState>,
}

impl Workspace {
    pub fn to_state(&self) -> crate::error::Result<WorkspaceState> {
        let blocks = self
            .top_blocks
            .iter()
            .map(|root| self.block_state(*root))
            .collect::<crate::error::Result<Vec<_>>>()?;
        Ok(WorkspaceState {
            version: STATE_VERSION,
            wiring: self.wiring.clone(),
            blocks,
        })
    }

    pub fn block_state(&self, id: BlockId) -> crate::error::Result<BlockState> {
        let block = self.block(id)?;

        let fields = block
            .fields
            .iter()
            .chain(block.inputs.iter().filter_map(|i| i.variable.as_ref()))
            .filter(|f| f.is_editable())
            .filter_map(|f| Some((f.name.clone()?, f.value().to_string())))
            .collect();

        let mut inputs = Vec::new();
        for input in &block.inputs {
            let Some(connection) = input.connection else {
                continue;
            };
            if let Some(child) = self.target_block(connection)? {
                inputs.push(InputState {
                    name: input.name.clone(),
                    block: self.block_state(child)?,
                });
            }
        }

        let next = match self.next_block(id)? {
            Some(below) => Some(Box::new(self.block_state(below)?)),
            None => None,
        };

        Ok(BlockState {
            block_type: block.block_type().to_string(),
            id,
            position: block.position,
            fields,
            collapsed: block.collapsed,
            inline: block.inputs_inline,
            editable: block.editable,
            deletable: block.deletable,
            comment: block.comment.clone(),
            mutation: self.mutation_of(id)?,
            inputs,
            next,
        })
    }

    /// Add the blocks of a snapshot to this workspace. Pins of the snapshot
    /// are attached first so pin dropdowns see them. Returns the new roots.
    pub fn load_state(&mut self, state: &WorkspaceState) -> crate::error::Result<Vec<BlockId>> {
        for pin in state.wiring.pins() {
            self.wiring.attach(pin.pin, pin.name.clone(), pin.kind);
        }
        state
            .blocks
            .iter()
            .map(|block| self.load_block(block))
            .collect()
    }

    /// Rebuild one tree, connecting children in the order they were saved
    pub fn load_block(&mut self, state: &BlockState) -> crate::error::Result<BlockId> {
        let id = if self.contains_block(state.id) {
            debug!(block = %state.id, "id already in use, loading under a fresh id");
            BlockId::new()
        } else {
            state.id
        };
        let options = BlockOptions {
            editable: state.editable,
            deletable: state.deletable,
            position: state.position,
        };
        self.create_block(id, &state.block_type, options)?;

        if let Some(mutation) = &state.mutation {
            self.apply_mutation(id, mutation)?;
        }
        for (name, value) in &state.fields {
            self.set_field_value(id, name, value)?;
        }
        self.set_inputs_inline(id, state.inline)?;
        if state.comment.is_some() {
            self.set_comment(id, state.comment.clone())?;
        }

        for input in &state.inputs {
            let socket = self
                .block(id)?
                .get_input(&input.name)
                .and_then(|i| i.connection)
                .ok_or_else(|| BlockError::MissingInput {
                    block: id,
                    name: input.name.clone(),
                })?;
            let child = self.load_block(&input.block)?;
            let plug = self
                .block(child)?
                .inferior_connection()
                .ok_or(BlockError::OrphanWithoutPlug(child))?;
            self.connect(socket, plug)?;
        }

        if let Some(next) = &state.next {
            let socket = self
                .block(id)?
                .next
                .ok_or(BlockError::NoNextConnection(id))?;
            let below = self.load_block(next)?;
            let plug = self
                .block(below)?
                .previous
                .ok_or(BlockError::OrphanWithoutPlug(below))?;
            self.connect(socket, plug)?;
        }

        if state.collapsed {
            self.set_collapsed(id, true)?;
        }
        Ok(id)
    }
}

/// Project manifest containing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub block_count: usize,
}

impl Manifest {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: "0.1.0".to_string(),
            created: now,
            modified: now,
            block_count: 0,
        }
    }

    /// Update the modified timestamp
    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create manifest file: {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Failed to write manifest to: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open manifest file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse manifest from: {}", path.display()))
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Project directory: manifest.json, program.json and events.jsonl
pub struct Project {
    root_dir: PathBuf,
}

impl Project {
    /// Create a new, empty project at the given path
    pub fn create(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create project directory: {}", path.display()))?;

        let project = Self {
            root_dir: path.to_path_buf(),
        };
        Manifest::new().save(&project.manifest_path())?;
        project.save_program(&WorkspaceState {
            version: STATE_VERSION,
            wiring: WiringTable::new(),
            blocks: Vec::new(),
        })?;

        let events_path = project.events_path();
        File::create(&events_path)
            .with_context(|| format!("Failed to create events.jsonl: {}", events_path.display()))?;

        Ok(project)
    }

    /// Open an existing project
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!("Project directory does not exist: {}", path.display()));
        }
        if !path.join("manifest.json").exists() {
            return Err(anyhow!("manifest.json not found in project directory"));
        }
        if !path.join("program.json").exists() {
            return Err(anyhow!("program.json not found in project directory"));
        }

        Ok(Self {
            root_dir: path.to_path_buf(),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root_dir.join("manifest.json")
    }

    pub fn program_path(&self) -> PathBuf {
        self.root_dir.join("program.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.root_dir.join("events.jsonl")
    }

    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        manifest.save(&self.manifest_path())
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        Manifest::load(&self.manifest_path())
    }

    pub fn save_program(&self, state: &WorkspaceState) -> Result<()> {
        let path = self.program_path();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create program.json: {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, state)
            .with_context(|| format!("Failed to write program.json: {}", path.display()))?;
        Ok(())
    }

    pub fn load_program(&self) -> Result<WorkspaceState> {
        let path = self.program_path();
        let file = File::open(&path)
            .with_context(|| format!("Failed to open program.json: {}", path.display()))?;
        let reader = BufReader::new(file);
        let state: WorkspaceState = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse program.json: {}", path.display()))?;

        if state.version > STATE_VERSION {
            bail!(
                "program.json has version {}, newest supported is {}",
                state.version,
                STATE_VERSION
            );
        }
        Ok(state)
    }

    /// Append events to events.jsonl, one JSON object per line
    pub fn append_events(&self, events: &[WorkspaceEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let path = self.events_path();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open events.jsonl: {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        for event in events {
            serde_json::to_writer(&mut writer, event)
                .with_context(|| format!("Failed to serialize event: {}", path.display()))?;
            writer
                .write_all(b"\n")
                .with_context(|| format!("Failed to write event to: {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush events.jsonl: {}", path.display()))?;
        debug!(count = events.len(), "appended events");
        Ok(())
    }

    /// Load the event log. Lines that do not parse are skipped with a
    /// warning.
    pub fn load_events(&self) -> Result<Vec<WorkspaceEvent>> {
        let path = self.events_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .with_context(|| format!("Failed to open events.jsonl: {}", path.display()))?;

        let mut events = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read events.jsonl: {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WorkspaceEvent>(&line) {
                Ok(event) => events.push(event),
                Err(err) => warn!(line = number + 1, "Skipping unreadable event: {err}"),
            }
        }
        Ok(events)
    }

    /// Save the program and manifest, and drain the workspace's event log
    /// into events.jsonl
    pub fn save(&self, workspace: &mut Workspace) -> Result<()> {
        let state = workspace.to_state()?;

        let mut manifest = match self.load_manifest() {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!("Replacing unreadable manifest: {err:#}");
                Manifest::new()
            }
        };
        manifest.touch();
        manifest.block_count = workspace.block_count();
        self.save_manifest(&manifest)?;

        self.save_program(&state)?;
        self.append_events(&workspace.take_events())?;

        Ok(())
    }

    /// Load the program into `workspace`
    pub fn load_into(&self, workspace: &mut Workspace) -> Result<Manifest> {
        let manifest = self.load_manifest()?;
        let state = self.load_program()?;
        workspace
            .load_state(&state)
            .with_context(|| format!("Failed to rebuild program from: {}", self.program_path().display()))?;

        Ok(manifest)
    }
}
