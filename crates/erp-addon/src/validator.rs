//! Addon directory validation.
//!
//! A directory is an addon when it carries an entry file and a manifest.
//! Scan, install and registry generation all go through
//! [`is_valid_module`] so they agree on what counts as a module.

use std::path::{Path, PathBuf};

/// Entry file stem, e.g. `index.rs`.
pub const ENTRY_FILE_STEM: &str = "index";

/// Manifest file stem, e.g. `manifest.toml`.
pub const MANIFEST_FILE_STEM: &str = "manifest";

/// Source entry (`index.rs`) or a prebuilt artifact (`index.wasm`).
pub const ENTRY_EXTENSIONS: &[&str] = &["rs", "wasm"];

/// Declarative manifest formats.
pub const MANIFEST_EXTENSIONS: &[&str] = &["toml", "json"];

/// Return the first existing `<stem>.<ext>` file in `dir`.
fn find_with_extensions(dir: &Path, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Locate the entry file of an addon directory.
pub fn entry_file(dir: &Path) -> Option<PathBuf> {
    find_with_extensions(dir, ENTRY_FILE_STEM, ENTRY_EXTENSIONS)
}

/// Locate the manifest file of an addon directory.
pub fn manifest_file(dir: &Path) -> Option<PathBuf> {
    find_with_extensions(dir, MANIFEST_FILE_STEM, MANIFEST_EXTENSIONS)
}

/// Whether `dir` is a well-formed addon: it must contain both an entry
/// file and a manifest file, each in one of the recognized extensions.
pub fn is_valid_module(dir: &Path) -> bool {
    dir.is_dir() && entry_file(dir).is_some() && manifest_file(dir).is_some()
}
