//! x509 proxy resolution
//!
//! Every job needs a VOMS proxy with enough lifetime left to outlast the
//! job array, stored somewhere the scheduler can read. A user-supplied
//! proxy that fails validation is replaced by a freshly issued one at the
//! default location; failing to issue that replacement is fatal.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{CommandRunner, Invocation, ToolError};
use crate::config::CredentialSettings;
use crate::job::absolute_path;

/// Tool that reports proxy details
pub const PROXY_INFO: &str = "voms-proxy-info";

/// Tool that issues proxies
pub const PROXY_INIT: &str = "voms-proxy-init";

/// Credential errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("the scheduler cannot use proxies stored under {prefix}: {path}")]
    DisallowedLocation { path: PathBuf, prefix: String },

    #[error("could not find voms proxy at {0}")]
    Missing(PathBuf),

    #[error("proxy {path} expires in {hours:.1} hours (minimum {min_hours})")]
    Expiring {
        path: PathBuf,
        hours: f64,
        min_hours: f64,
    },

    #[error("failed to query proxy lifetime: {0}")]
    Query(#[source] ToolError),

    #[error("unparseable proxy lifetime {output:?}")]
    Parse { output: String },

    #[error("failed to issue a new proxy: {0}")]
    Creation(#[source] ToolError),

    #[error("voms-proxy-init reported success but {0} does not exist")]
    NotCreated(PathBuf),

    #[error("failed to resolve proxy path: {0}")]
    Io(#[from] io::Error),
}

impl CredentialError {
    /// Validation failures are recovered by issuing a new proxy; failures
    /// while issuing are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CredentialError::Creation(_) | CredentialError::NotCreated(_)
        )
    }
}

/// Resolves, validates and issues proxies
pub struct CredentialManager<'a> {
    runner: &'a dyn CommandRunner,
    settings: &'a CredentialSettings,
}

impl<'a> CredentialManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a CredentialSettings) -> Self {
        Self { runner, settings }
    }

    /// Location used for newly issued proxies
    pub fn default_path(&self) -> &Path {
        &self.settings.default_path
    }

    /// Pick the proxy to submit with
    ///
    /// A given path is returned (made absolute) only if it passes
    /// [`validate`](Self::validate). Otherwise, and when no path is given,
    /// a valid proxy already at the default location is reused, else a new
    /// one is issued there.
    pub fn resolve(&self, path: Option<&Path>) -> Result<PathBuf, CredentialError> {
        if let Some(path) = path {
            match self.validate(path) {
                Ok(valid) => return Ok(valid),
                Err(e) if e.is_recoverable() => {
                    warn!("could not find a suitable x509 proxy ({e}); generating one now");
                    return self.issue_default();
                }
                Err(e) => return Err(e),
            }
        }

        let default = self.default_path();
        if default.is_file() {
            match self.validate(default) {
                Ok(valid) => return Ok(valid),
                Err(e) if e.is_recoverable() => {
                    info!("existing proxy at default location unusable ({e}); renewing");
                }
                Err(e) => return Err(e),
            }
        }
        self.issue_default()
    }

    fn issue_default(&self) -> Result<PathBuf, CredentialError> {
        let default = self.default_path().to_path_buf();
        self.create(&default)?;
        Ok(default)
    }

    /// Check location, presence and remaining lifetime of a proxy
    pub fn validate(&self, path: &Path) -> Result<PathBuf, CredentialError> {
        let path = absolute_path(path)?;

        if let Some(prefix) = self
            .settings
            .disallowed_prefixes
            .iter()
            .find(|prefix| path.starts_with(prefix.as_str()))
        {
            return Err(CredentialError::DisallowedLocation {
                path,
                prefix: prefix.clone(),
            });
        }

        if !path.is_file() {
            return Err(CredentialError::Missing(path));
        }

        let hours = self.lifetime_hours(&path)?;
        if hours < self.settings.min_lifetime_hours {
            return Err(CredentialError::Expiring {
                path,
                hours,
                min_hours: self.settings.min_lifetime_hours,
            });
        }

        Ok(path)
    }

    /// Issue a new proxy at `path`
    ///
    /// `voms-proxy-init` prompts for the grid passphrase, so it shares the
    /// terminal.
    pub fn create(&self, path: &Path) -> Result<(), CredentialError> {
        let invocation = Invocation::new(PROXY_INIT)
            .args(["-voms", self.settings.voms_group.as_str()])
            .arg("-out")
            .arg(path.to_string_lossy())
            .args(["-valid", self.settings.validity.as_str()])
            .inherit_streams();

        info!(path = %path.display(), validity = %self.settings.validity, "issuing x509 proxy");
        self.runner
            .run_checked(&invocation)
            .map_err(CredentialError::Creation)?;

        if !path.is_file() {
            return Err(CredentialError::NotCreated(path.to_path_buf()));
        }
        Ok(())
    }

    /// Remaining proxy lifetime in hours
    ///
    /// `voms-proxy-info -timeleft` prints whole seconds.
    pub fn lifetime_hours(&self, path: &Path) -> Result<f64, CredentialError> {
        let invocation = Invocation::new(PROXY_INFO)
            .args(["-timeleft", "-file"])
            .arg(path.to_string_lossy());

        let output = self
            .runner
            .run_checked(&invocation)
            .map_err(CredentialError::Query)?;

        parse_timeleft_hours(&output.stdout)
    }
}

fn parse_timeleft_hours(stdout: &str) -> Result<f64, CredentialError> {
    let text = stdout.trim();
    match text.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() => Ok(seconds / 3600.0),
        _ => Err(CredentialError::Parse {
            output: text.to_string(),
        }),
    }
}
