// Profile
// Optional YAML configuration: tool binary locations plus default
// stage options

use forge_service::{
    GeometryOptions, LightingOptions, ProcessTool, ServiceResult, VisibilityOptions,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Explicit binary path per unit name; unlisted units resolve by
    /// name on the search path.
    pub tools: HashMap<String, PathBuf>,
    pub geometry: GeometryOptions,
    pub lighting: LightingOptions,
    pub visibility: VisibilityOptions,
}

impl Profile {
    /// `<config dir>/bspforge/profile.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("bspforge").join("profile.yaml"))
    }

    /// Load from an explicit path, or from the default location if a
    /// profile exists there, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> color_eyre::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Build the process tool for a unit, honoring a configured path.
    pub fn resolve_tool(&self, unit: &str) -> ServiceResult<ProcessTool> {
        match self.tools.get(unit) {
            Some(path) => Ok(ProcessTool::new(path.clone())),
            None => ProcessTool::resolve(unit),
        }
    }
}
