//! Structured `[[windows]]` table support (§4.2, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaneSpec {
    #[serde(default)]
    pub dir: String,
    pub run: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSpec {
    pub name: String,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub panes: Vec<PaneSpec>,
}

/// Top-level `[[windows]]` array, as it appears in a repo-local config or
/// nested under `[repos.<name>]` in the global config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowsTable {
    #[serde(default, rename = "windows")]
    pub windows: Vec<WindowSpec>,
}

