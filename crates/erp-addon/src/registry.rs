//! Addon directory listing and the generated `.registry.json`.
//!
//! The registry file is the list of valid module names found under the
//! addons root. The client loader reads it to know which catalog entries to
//! load; scan regenerates it every run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AddonError;
use crate::validator;

pub const REGISTRY_FILE: &str = ".registry.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile {
    pub modules: Vec<String>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Valid addon directories directly under `root`, sorted by name.
///
/// Hidden directories are ignored. Fails only when `root` itself cannot be
/// listed.
pub async fn valid_module_dirs(root: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !path.is_dir() {
            continue;
        }
        if validator::is_valid_module(&path) {
            found.push((name, path));
        } else {
            tracing::debug!(module = %name, "directory is not a valid addon");
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Rewrite `<root>/.registry.json` from the directories currently on disk.
pub async fn generate_registry(root: &Path) -> Result<Vec<String>, AddonError> {
    let modules: Vec<String> = valid_module_dirs(root)
        .await?
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    let file = RegistryFile {
        modules: modules.clone(),
        generated_at: chrono::Utc::now(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    tokio::fs::write(root.join(REGISTRY_FILE), json).await?;

    tracing::debug!(count = modules.len(), "addon registry regenerated");
    Ok(modules)
}

/// Module names listed in `<root>/.registry.json`, or `None` when the file
/// is absent or unreadable.
pub async fn read_registry(root: &Path) -> Option<Vec<String>> {
    let path = root.join(REGISTRY_FILE);
    let content = tokio::fs::read_to_string(&path).await.ok()?;
    match serde_json::from_str::<RegistryFile>(&content) {
        Ok(file) => Some(file.modules),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring malformed addon registry: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_addon;

    #[tokio::test]
    async fn test_generate_and_read_registry() {
        let tmp = tempfile::tempdir().unwrap();
        write_addon(tmp.path(), "sales", "");
        write_addon(tmp.path(), "hr", "");
        std::fs::create_dir(tmp.path().join("not_an_addon")).unwrap();
        std::fs::create_dir(tmp.path().join(".hidden")).unwrap();

        let modules = generate_registry(tmp.path()).await.unwrap();
        assert_eq!(modules, vec!["hr", "sales"]);
        assert_eq!(read_registry(tmp.path()).await.unwrap(), vec!["hr", "sales"]);
    }

    #[tokio::test]
    async fn test_read_registry_absent_or_malformed() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_registry(tmp.path()).await.is_none());

        std::fs::write(tmp.path().join(REGISTRY_FILE), "[broken").unwrap();
        assert!(read_registry(tmp.path()).await.is_none());
    }

    #[tokio::test]
    async fn test_valid_module_dirs_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(valid_module_dirs(&tmp.path().join("nope")).await.is_err());
    }
}
