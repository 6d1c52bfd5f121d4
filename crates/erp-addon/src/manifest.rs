//! Module manifest parsing.
//!
//! Manifests are declarative data (`manifest.toml` or `manifest.json`)
//! parsed with a real parser. Nothing inside an addon directory is ever
//! executed by the scanner, so a broken addon can only fail its own parse.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AddonError;
use crate::schema::ModelDefinition;
use crate::validator;

pub const DEFAULT_VERSION: &str = "1.0.0";

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_sequence() -> i32 {
    10
}

/// Module manifest.
///
/// JSON manifests may use camelCase keys (`displayName`, `autoInstall`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module identity. Always the addon directory name once read from disk.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, alias = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub application: bool,
    #[serde(default, alias = "autoInstall")]
    pub auto_install: bool,
    /// `false` keeps the module from being installed. The scan copies it to
    /// the module row.
    #[serde(default = "default_true")]
    pub installable: bool,
    #[serde(default)]
    pub routes: Vec<RouteDecl>,
    #[serde(default)]
    pub models: Vec<ModelDefinition>,
    #[serde(default)]
    pub menus: Vec<MenuEntry>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A client route declared by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecl {
    pub path: String,
    pub component: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Navigation menu entry. `parent` refers to another entry's `id`; entries
/// without a parent are roots. Siblings sort by ascending `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub id: String,
    pub name: String,
    #[serde(default = "default_sequence")]
    pub sequence: i32,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

/// Manifest source format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Json,
}

impl ManifestFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Some(ManifestFormat::Toml),
            Some("json") => Some(ManifestFormat::Json),
            _ => None,
        }
    }
}

impl ModuleManifest {
    /// Parse a manifest from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, AddonError> {
        let manifest: ModuleManifest = toml::from_str(s)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, AddonError> {
        let manifest: ModuleManifest = serde_json::from_str(s)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn parse(s: &str, format: ManifestFormat) -> Result<Self, AddonError> {
        match format {
            ManifestFormat::Toml => Self::from_toml_str(s),
            ManifestFormat::Json => Self::from_json_str(s),
        }
    }

    fn validate(&self) -> Result<(), AddonError> {
        for dep in &self.dependencies {
            if dep.trim().is_empty() {
                return Err(AddonError::InvalidManifest(
                    "dependencies must not contain empty names".into(),
                ));
            }
            if !self.name.is_empty() && dep == &self.name {
                return Err(AddonError::InvalidManifest(format!(
                    "module '{}' cannot depend on itself",
                    self.name
                )));
            }
        }

        for menu in &self.menus {
            if menu.id.is_empty() {
                return Err(AddonError::InvalidManifest(format!(
                    "menu '{}' has an empty id",
                    menu.name
                )));
            }
        }

        Ok(())
    }

    /// Bind the manifest to its directory name, filling defaults that
    /// depend on it.
    pub fn with_identity(mut self, dir_name: &str) -> Self {
        if !self.name.is_empty() && self.name != dir_name {
            tracing::warn!(
                module = %dir_name,
                declared = %self.name,
                "manifest name differs from directory name, using directory name"
            );
        }
        self.name = dir_name.to_string();
        if self.display_name.trim().is_empty() {
            self.display_name = dir_name.to_string();
        }
        if self.version.trim().is_empty() {
            self.version = default_version();
        } else if semver::Version::parse(&self.version).is_err() {
            tracing::warn!(
                module = %dir_name,
                version = %self.version,
                "manifest version is not valid semver"
            );
        }
        self
    }

    /// Names of the data models declared by this module.
    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }
}

/// Read and parse the manifest of the addon at `dir`.
///
/// Returns `None` (after logging) when the manifest is missing, unreadable
/// or malformed. Callers skip the module for this cycle.
pub async fn read_manifest(dir: &Path) -> Option<ModuleManifest> {
    let dir_name = dir.file_name()?.to_string_lossy().to_string();

    let Some(path) = validator::manifest_file(dir) else {
        tracing::warn!(module = %dir_name, "no manifest file found");
        return None;
    };
    let format = ManifestFormat::from_path(&path)?;

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(module = %dir_name, path = %path.display(), "failed to read manifest: {e}");
            return None;
        }
    };

    match ModuleManifest::parse(&content, format) {
        Ok(manifest) => Some(manifest.with_identity(&dir_name)),
        Err(e) => {
            tracing::warn!(module = %dir_name, path = %path.display(), "failed to parse manifest: {e}");
            None
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
