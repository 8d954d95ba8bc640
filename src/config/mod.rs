//! Lane configuration
//!
//! Configuration is merged from three layers, later layers winning:
//! 1. Built-in defaults (derived from the invoking user's identity)
//! 2. Host config (`~/.config/condor-mc/config.toml` or `--config`)
//! 3. Explicit overrides (the catalog root from `MCDIRPATH`)
//!
//! The merged value is deserialized into a plain [`LaneConfig`] that is
//! handed to the orchestrator; nothing downstream reads the environment.

mod defaults;
mod identity;
mod lane;
mod merge;

pub use defaults::BuiltinDefaults;
pub use identity::UserIdentity;
pub use lane::{
    catalog_root_from_env, default_host_config_path, CatalogSettings, ConfigError,
    CredentialSettings, LaneConfig, StorageSettings, CATALOG_ROOT_ENV,
};
pub use merge::{deep_merge, merge_layers};
