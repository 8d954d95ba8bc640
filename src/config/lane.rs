//! Effective lane configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::defaults::BuiltinDefaults;
use super::identity::UserIdentity;
use super::merge::merge_layers;

/// Environment variable naming the catalog root
pub const CATALOG_ROOT_ENV: &str = "MCDIRPATH";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingEnv(&'static str),

    #[error("catalog root {0} is not a directory")]
    CatalogRootMissing(PathBuf),

    #[error("could not determine the invoking user")]
    UnknownUser,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Remote output storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// xrootd redirector, e.g. `root://cmsxrootd.hep.wisc.edu/`
    pub redirector: String,

    /// Full destination prefix; derived from redirector and user when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Proxy issuing and validation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSettings {
    pub default_path: PathBuf,
    pub voms_group: String,
    pub validity: String,
    pub min_lifetime_hours: f64,
    pub disallowed_prefixes: Vec<String>,
}

/// Campaign catalog policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Only directories starting with this prefix are campaigns
    pub name_prefix: String,
}

/// Merged configuration handed to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Submitting user's login name
    pub user: String,

    /// Root holding the `campaigns/` directory
    pub catalog_root: PathBuf,

    /// Root under which `<job-name>/<timestamp>` directories are created
    pub scratch_root: PathBuf,

    pub storage: StorageSettings,

    pub credential: CredentialSettings,

    pub catalog: CatalogSettings,
}

impl LaneConfig {
    /// Built-in defaults only; no filesystem access
    pub fn from_defaults(identity: &UserIdentity, catalog_root: impl Into<PathBuf>) -> Self {
        let defaults = BuiltinDefaults::for_user(identity);
        Self {
            user: identity.name.clone(),
            catalog_root: catalog_root.into(),
            scratch_root: PathBuf::from(defaults.scratch_root),
            storage: StorageSettings {
                redirector: defaults.redirector,
                prefix: None,
            },
            credential: CredentialSettings {
                default_path: PathBuf::from(defaults.default_proxy_path),
                voms_group: defaults.voms_group,
                validity: defaults.proxy_validity,
                min_lifetime_hours: defaults.min_lifetime_hours,
                disallowed_prefixes: defaults.disallowed_prefixes,
            },
            catalog: CatalogSettings {
                name_prefix: defaults.campaign_prefix,
            },
        }
    }

    /// Merge defaults, the optional host config file and the catalog root
    pub fn load(
        identity: &UserIdentity,
        host_config: Option<&Path>,
        catalog_root: &Path,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::for_user(identity).to_value()];

        if let Some(path) = host_config {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading host config");
                layers.push(load_toml_file(path)?);
            }
        }

        layers.push(overrides(identity, catalog_root));

        let config: LaneConfig = serde_json::from_value(merge_layers(layers))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.catalog_root.is_dir() {
            return Err(ConfigError::CatalogRootMissing(self.catalog_root.clone()));
        }
        let hours = self.credential.min_lifetime_hours;
        if hours.is_nan() || hours < 0.0 {
            return Err(ConfigError::Validation(
                "credential.min_lifetime_hours must be non-negative".to_string(),
            ));
        }
        if self.catalog.name_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "catalog.name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory scanned for campaigns
    pub fn campaigns_dir(&self) -> PathBuf {
        self.catalog_root.join("campaigns")
    }

    /// Remote prefix that output directories are appended to
    pub fn storage_prefix(&self) -> String {
        match self.storage.prefix {
            Some(ref prefix) => prefix.clone(),
            None => format!("{}/store/user/{}/", self.storage.redirector, self.user),
        }
    }

    /// Override the scratch root
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Override the default proxy location
    pub fn with_default_proxy(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential.default_path = path.into();
        self
    }
}

fn overrides(identity: &UserIdentity, catalog_root: &Path) -> Value {
    json!({
        "user": identity.name,
        "catalog_root": catalog_root.to_string_lossy(),
    })
}

fn load_toml_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the catalog root from [`CATALOG_ROOT_ENV`]
pub fn catalog_root_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var_os(CATALOG_ROOT_ENV) {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => Err(ConfigError::MissingEnv(CATALOG_ROOT_ENV)),
    }
}

/// `~/.config/condor-mc/config.toml`, if HOME is known
pub fn default_host_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/condor-mc/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn identity() -> UserIdentity {
        UserIdentity::new("athete", 5021)
    }

    #[test]
    fn test_from_defaults() {
        let config = LaneConfig::from_defaults(&identity(), "/opt/mc");

        assert_eq!(config.user, "athete");
        assert_eq!(config.catalog_root, PathBuf::from("/opt/mc"));
        assert_eq!(config.campaigns_dir(), PathBuf::from("/opt/mc/campaigns"));
        assert_eq!(
            config.credential.default_path,
            PathBuf::from("/tmp/x509up_u5021")
        );
        assert_eq!(
            config.storage_prefix(),
            "root://cmsxrootd.hep.wisc.edu//store/user/athete/"
        );
    }

    #[test]
    fn test_load_without_host_config() {
        let root = TempDir::new().unwrap();
        let config = LaneConfig::load(&identity(), None, root.path()).unwrap();

        assert_eq!(config.catalog_root, root.path());
        assert_eq!(config.catalog.name_prefix, "Run");
    }

    #[test]
    fn test_load_host_config_overrides() {
        let root = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
scratch_root = "/scratch/athete/jobs"

[storage]
redirector = "root://eosuser.cern.ch/"

[credential]
validity = "96:00"
"#
        )
        .unwrap();

        let config = LaneConfig::load(&identity(), Some(file.path()), root.path()).unwrap();

        assert_eq!(config.scratch_root, PathBuf::from("/scratch/athete/jobs"));
        assert_eq!(config.credential.validity, "96:00");
        assert_eq!(config.credential.voms_group, "cms");
        assert_eq!(
            config.storage_prefix(),
            "root://eosuser.cern.ch//store/user/athete/"
        );
    }

    #[test]
    fn test_explicit_storage_prefix_wins() {
        let mut config = LaneConfig::from_defaults(&identity(), "/opt/mc");
        config.storage.prefix = Some("root://host//store/group/mc/".to_string());
        assert_eq!(config.storage_prefix(), "root://host//store/group/mc/");
    }

    #[test]
    fn test_missing_host_config_is_ignored() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope.toml");
        assert!(LaneConfig::load(&identity(), Some(&missing), root.path()).is_ok());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let root = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "scratch_root = [").unwrap();

        let err = LaneConfig::load(&identity(), Some(file.path()), root.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let root = TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[credential]\nmin_lifetime_hours = \"soon\"").unwrap();

        let err = LaneConfig::load(&identity(), Some(file.path()), root.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_catalog_root_rejected() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("absent");

        let err = LaneConfig::load(&identity(), None, &missing).unwrap_err();
        assert!(matches!(err, ConfigError::CatalogRootMissing(_)));
    }
}
