//! Addon system error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AddonError {
    #[error("module not found: {0}")]
    NotFound(String),

    #[error("module files not found on disk: {0}")]
    ModuleFilesMissing(String),

    #[error("module is already installed: {0}")]
    AlreadyInstalled(String),

    #[error("module is not installed: {0}")]
    NotInstalled(String),

    #[error("module is marked not installable: {0}")]
    NotInstallable(String),

    #[error("module {name} is already {state}")]
    AlreadyInState { name: String, state: &'static str },

    #[error("cannot install {name}: missing dependencies {}", .missing.join(", "))]
    MissingDependencies { name: String, missing: Vec<String> },

    #[error("cannot {action} {name}: required by {}", .dependents.join(", "))]
    DependentModules {
        name: String,
        action: &'static str,
        dependents: Vec<String>,
    },

    #[error("cannot activate {name}: inactive dependencies {}", .inactive.join(", "))]
    InactiveDependencies { name: String, inactive: Vec<String> },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid model definition: {0}")]
    InvalidModel(String),

    #[error("module load failed: {0}")]
    Load(String),

    #[error("schema sync failed for {name}: {source}")]
    SchemaSync {
        name: String,
        #[source]
        source: sea_orm::DbErr,
    },

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AddonError {
    /// Whether the failure is the caller's to fix (bad name, wrong state,
    /// dependency conflict) rather than an infrastructure fault.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AddonError::AlreadyInstalled(_)
                | AddonError::NotInstalled(_)
                | AddonError::NotInstallable(_)
                | AddonError::AlreadyInState { .. }
                | AddonError::MissingDependencies { .. }
                | AddonError::DependentModules { .. }
                | AddonError::InactiveDependencies { .. }
                | AddonError::InvalidManifest(_)
                | AddonError::InvalidModel(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AddonError::NotFound(_) | AddonError::ModuleFilesMissing(_)
        )
    }
}
