//! Transfer manifest assembly
//!
//! The manifest lists, in order, every file the scheduler stages into a
//! job's scratch directory. The worker script refers to these files by
//! basename, so order and presence matter; duplicates are kept as-is.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{Campaign, ENV_BUILDER, PILEUP_GENERATOR};
use crate::command::{CommandRunner, Invocation, ToolError};
use crate::job::JobRequest;

/// Errors for manifest assembly
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("campaign {campaign} has no run script at {path}")]
    MissingRunScript { campaign: String, path: PathBuf },

    #[error("failed to generate {artifact}: {source}")]
    Generation {
        artifact: PathBuf,
        #[source]
        source: ToolError,
    },

    #[error("{script} finished but {artifact} was not produced")]
    StillMissing { artifact: PathBuf, script: String },
}

/// Ordered list of absolute paths staged to every job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferManifest {
    entries: Vec<PathBuf>,
}

impl TransferManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(path.into());
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as strings, in order
    pub fn to_strings(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }
}

/// Builds the manifest for a request, generating optional campaign
/// artifacts on demand
pub struct TransferManifestAssembler<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> TransferManifestAssembler<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Fragment, run script, then the pileup list and environment bundle
    /// when requested
    pub fn assemble(
        &self,
        campaign: &Campaign,
        request: &JobRequest,
    ) -> Result<TransferManifest, ManifestError> {
        let run_script = campaign.run_script();
        if !run_script.is_file() {
            return Err(ManifestError::MissingRunScript {
                campaign: campaign.name.clone(),
                path: run_script,
            });
        }

        let mut manifest = TransferManifest::new();
        manifest.push(request.fragment_path.clone());
        manifest.push(run_script);

        if request.flags.use_pileup_file {
            let pileup = campaign.pileup_file();
            self.ensure_artifact(campaign, &pileup, PILEUP_GENERATOR, "pileup input file")?;
            manifest.push(pileup);
        }

        if request.flags.ship_env {
            let bundle = campaign.env_bundle();
            self.ensure_artifact(campaign, &bundle, ENV_BUILDER, "environment tarball")?;
            manifest.push(bundle);
        }

        info!(files = ?manifest.to_strings(), "files to transfer to condor nodes");
        Ok(manifest)
    }

    /// Run `script` inside the campaign directory if `artifact` is absent,
    /// then require that it exists
    fn ensure_artifact(
        &self,
        campaign: &Campaign,
        artifact: &Path,
        script: &str,
        what: &str,
    ) -> Result<(), ManifestError> {
        if artifact.is_file() {
            return Ok(());
        }

        info!(campaign = %campaign.name, "creating {what}");
        let invocation = Invocation::new("bash")
            .arg("-c")
            .arg(format!("source ./{}", script))
            .current_dir(&campaign.dir)
            .inherit_streams();

        self.runner
            .run_checked(&invocation)
            .map_err(|source| ManifestError::Generation {
                artifact: artifact.to_path_buf(),
                source,
            })?;

        if !artifact.is_file() {
            return Err(ManifestError::StillMissing {
                artifact: artifact.to_path_buf(),
                script: script.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ENV_BUNDLE, PILEUP_FILE};
    use crate::command::{MockRunner, ToolOutput};
    use crate::job::JobFlags;
    use std::fs;
    use tempfile::TempDir;

    fn create_campaign(dir: &TempDir) -> Campaign {
        let campaign_dir = dir.path().join("campaigns/Run3Summer23");
        fs::create_dir_all(&campaign_dir).unwrap();
        fs::write(campaign_dir.join("run.sh"), "#!/bin/bash\n").unwrap();
        Campaign::new("Run3Summer23", campaign_dir)
    }

    fn request(flags: JobFlags) -> JobRequest {
        JobRequest::builder("ttbarDM", "Run3Summer23", "/data/frag.py")
            .flags(flags)
            .build()
            .unwrap()
    }

    /// Runner whose generator scripts produce their artifact
    fn generating_runner() -> MockRunner {
        MockRunner::new(|inv| {
            let dir = inv.current_dir.clone().unwrap();
            let script = inv.args.last().cloned().unwrap_or_default();
            if script.ends_with(PILEUP_GENERATOR) {
                fs::write(dir.join(PILEUP_FILE), "/store/mc/pileup.root\n").unwrap();
            } else if script.ends_with(ENV_BUILDER) {
                fs::write(dir.join(ENV_BUNDLE), "tarball").unwrap();
            }
            ToolOutput::success("")
        })
    }

    #[test]
    fn test_minimal_manifest() {
        let dir = TempDir::new().unwrap();
        let campaign = create_campaign(&dir);
        let runner = MockRunner::succeeding();

        let manifest = TransferManifestAssembler::new(&runner)
            .assemble(&campaign, &request(JobFlags::default()))
            .unwrap();

        assert_eq!(
            manifest.entries(),
            &[PathBuf::from("/data/frag.py"), campaign.run_script()]
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_existing_optional_artifacts_not_regenerated() {
        let dir = TempDir::new().unwrap();
        let campaign = create_campaign(&dir);
        fs::write(campaign.pileup_file(), "files").unwrap();
        fs::write(campaign.env_bundle(), "tarball").unwrap();
        let runner = MockRunner::succeeding();
        let flags = JobFlags {
            ship_env: true,
            use_pileup_file: true,
            ..JobFlags::default()
        };

        let manifest = TransferManifestAssembler::new(&runner)
            .assemble(&campaign, &request(flags))
            .unwrap();

        assert_eq!(
            manifest.entries(),
            &[
                PathBuf::from("/data/frag.py"),
                campaign.run_script(),
                campaign.pileup_file(),
                campaign.env_bundle(),
            ]
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_missing_artifacts_generated_in_campaign_dir() {
        let dir = TempDir::new().unwrap();
        let campaign = create_campaign(&dir);
        let runner = generating_runner();
        let flags = JobFlags {
            ship_env: true,
            use_pileup_file: true,
            ..JobFlags::default()
        };

        let manifest = TransferManifestAssembler::new(&runner)
            .assemble(&campaign, &request(flags))
            .unwrap();

        assert_eq!(manifest.len(), 4);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, vec!["-c", "source ./getpileupfiles.sh"]);
        assert_eq!(calls[1].args, vec!["-c", "source ./build_env.sh"]);
        for call in &calls {
            assert_eq!(call.current_dir.as_deref(), Some(campaign.dir.as_path()));
        }
    }

    #[test]
    fn test_generator_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let campaign = create_campaign(&dir);
        let runner = MockRunner::new(|_| ToolOutput::failure(2, "dasgoclient: not found"));
        let flags = JobFlags {
            use_pileup_file: true,
            ..JobFlags::default()
        };

        let err = TransferManifestAssembler::new(&runner)
            .assemble(&campaign, &request(flags))
            .unwrap_err();

        assert!(matches!(err, ManifestError::Generation { .. }));
    }

    #[test]
    fn test_generator_without_output_detected() {
        let dir = TempDir::new().unwrap();
        let campaign = create_campaign(&dir);
        let runner = MockRunner::succeeding();
        let flags = JobFlags {
            ship_env: true,
            ..JobFlags::default()
        };

        let err = TransferManifestAssembler::new(&runner)
            .assemble(&campaign, &request(flags))
            .unwrap_err();

        match err {
            ManifestError::StillMissing { artifact, script } => {
                assert_eq!(artifact, campaign.env_bundle());
                assert_eq!(script, ENV_BUILDER);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_run_script() {
        let dir = TempDir::new().unwrap();
        let campaign = Campaign::new("Run3Empty", dir.path());
        let runner = MockRunner::succeeding();

        let err = TransferManifestAssembler::new(&runner)
            .assemble(&campaign, &request(JobFlags::default()))
            .unwrap_err();

        assert!(matches!(err, ManifestError::MissingRunScript { .. }));
    }

    #[test]
    fn test_duplicates_kept() {
        let mut manifest = TransferManifest::new();
        manifest.push("/a");
        manifest.push("/a");
        assert_eq!(manifest.to_strings(), vec!["/a", "/a"]);
        assert_eq!(serde_json::to_string(&manifest).unwrap(), r#"["/a","/a"]"#);
    }
}
