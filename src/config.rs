use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Editor tuning knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum distance at which a dragged connector snaps
    pub snap_radius: f32,

    /// Pointer travel before a press turns into a drag
    pub drag_radius: f32,

    /// Delay before decluttering after a connect, and before nudging orphans
    pub bump_delay_ms: u64,

    /// Delay before the deletion target closes after swallowing a block
    pub deletion_close_delay_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap_radius: 25.0,
            drag_radius: 5.0,
            bump_delay_ms: 250,
            deletion_close_delay_ms: 100,
        }
    }
}

impl EditorConfig {
    /// Load configuration from a JSON file; missing keys take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config from: {}", path.display()))
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create config file: {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Failed to write config to: {}", path.display()))?;
        Ok(())
    }
}
