//! Named sweep presets.

use std::collections::BTreeMap;
use std::path::Path;

use crate::params::SweepSpec;
use crate::SweepError;

const BUILTIN: &str = include_str!("../presets.json");

/// Preset name to sweep specification.
#[derive(Debug, Clone)]
pub struct PresetTable {
    presets: BTreeMap<String, SweepSpec>,
}

impl PresetTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self, SweepError> {
        Self::from_json(BUILTIN)
    }

    pub fn from_json(json: &str) -> Result<Self, SweepError> {
        let presets: BTreeMap<String, SweepSpec> = serde_json::from_str(json)?;
        Ok(PresetTable { presets })
    }

    /// Load a table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let table = Self::from_json(&std::fs::read_to_string(path)?)?;
        log::info!("Loaded {} presets from {}", table.presets.len(), path.display());
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Result<&SweepSpec, SweepError> {
        self.presets.get(name).ok_or_else(|| SweepError::UnknownPreset {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }
}
