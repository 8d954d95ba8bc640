//! Submission orchestration
//!
//! Drives one job array submission end to end:
//! - Validate the request against the filesystem and the campaign catalog
//! - Resolve the x509 proxy
//! - Create a fresh submission directory
//! - Write the worker script, then assemble the transfer manifest and the
//!   submit description
//! - Hand the description to `condor_submit` unless this is a dry run
//!
//! Nothing touches the filesystem until input validation and credential
//! resolution have both succeeded. A failure after that leaves the
//! partially populated directory in place for inspection.

pub mod record;
pub mod state;

pub use record::{ArtifactDigest, RecordError, SubmissionRecord, RECORD_FILE};
pub use state::SubmissionState;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use condor_jdl::DescriptorError;

use crate::catalog::{Campaign, CampaignCatalog, CatalogError};
use crate::command::{CommandRunner, Invocation, ToolError};
use crate::config::{ConfigError, LaneConfig};
use crate::credential::{CredentialError, CredentialManager};
use crate::descriptor::DescriptorGenerator;
use crate::executable::ExecutableBuilder;
use crate::job::{absolute_path, JobError, JobRequest, EXECUTABLE_NAME};
use crate::manifest::{ManifestError, TransferManifestAssembler};

/// Scheduler client
pub const CONDOR_SUBMIT: &str = "condor_submit";

/// Timestamp format of submission directory names
pub const WORKDIR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M";

/// Submission errors
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid job request: {0}")]
    Job(#[from] JobError),

    #[error("could not find fragment at {0}")]
    FragmentNotFound(PathBuf),

    #[error("{0}")]
    Catalog(#[from] CatalogError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("external tool failure: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("submission record error: {0}")]
    Record(#[from] RecordError),
}

impl SubmitError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SubmitError::Config(_) => 1,
            SubmitError::Job(_) => 2,
            SubmitError::FragmentNotFound(_) => 2,
            SubmitError::Catalog(CatalogError::UnknownCampaign { .. }) => 2,
            SubmitError::Catalog(_) => 1,
            SubmitError::Credential(_) => 3,
            SubmitError::Manifest(_) => 4,
            SubmitError::Tool(_) => 4,
            SubmitError::Descriptor(_) => 5,
            SubmitError::Io { .. } => 1,
            SubmitError::Record(_) => 1,
        }
    }

    /// Errors raised while validating the request, before anything is written
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            SubmitError::Job(_)
                | SubmitError::FragmentNotFound(_)
                | SubmitError::Catalog(CatalogError::UnknownCampaign { .. })
        )
    }
}

/// Result type for submission operations
pub type SubmitResult<T> = Result<T, SubmitError>;

/// How a prepared submission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `condor_submit` ran and exited with this status
    Submitted { exit_code: i32 },
    /// Artifacts were written and nothing was submitted
    DryRun,
}

/// Files produced by a successful run
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub directory: PathBuf,
    pub executable: PathBuf,
    pub descriptor: PathBuf,
    pub record: PathBuf,
    pub credential: PathBuf,
    pub completion: Completion,
}

impl SubmissionOutcome {
    /// Process exit status: the scheduler client's, or success for a dry run
    pub fn exit_code(&self) -> i32 {
        match self.completion {
            Completion::Submitted { exit_code } => exit_code,
            Completion::DryRun => 0,
        }
    }
}

/// Top-level coordinator for a submission
pub struct Orchestrator {
    config: LaneConfig,
    catalog: Box<dyn CampaignCatalog>,
    runner: Box<dyn CommandRunner>,
    state: SubmissionState,
}

impl Orchestrator {
    pub fn new(
        config: LaneConfig,
        catalog: Box<dyn CampaignCatalog>,
        runner: Box<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            catalog,
            runner,
            state: SubmissionState::Init,
        }
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    /// State reached by the last run
    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// Submit `request`, optionally with a user-supplied proxy
    pub fn run(
        &mut self,
        request: &JobRequest,
        x509: Option<&Path>,
    ) -> SubmitResult<SubmissionOutcome> {
        self.run_at(request, x509, Local::now().naive_local())
    }

    /// Like [`run`](Self::run) with an explicit submission time
    pub fn run_at(
        &mut self,
        request: &JobRequest,
        x509: Option<&Path>,
        now: NaiveDateTime,
    ) -> SubmitResult<SubmissionOutcome> {
        self.state = SubmissionState::Init;
        let result = self.drive(request, x509, now);
        if let Err(ref e) = result {
            debug!(state = ?self.state, error = %e, "submission failed");
            self.advance(SubmissionState::Failed);
        }
        result
    }

    fn advance(&mut self, next: SubmissionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(from = ?self.state, to = ?next, "submission state");
        self.state = next;
    }

    fn drive(
        &mut self,
        request: &JobRequest,
        x509: Option<&Path>,
        now: NaiveDateTime,
    ) -> SubmitResult<SubmissionOutcome> {
        self.advance(SubmissionState::ValidateInput);
        let (request, campaign) = self.validate_input(request)?;
        self.log_summary(&request, &campaign);

        self.advance(SubmissionState::ResolveCredential);
        let credential = self.resolve_credential(x509)?;

        self.advance(SubmissionState::PrepareWorkdir);
        let stamp = now.format(WORKDIR_TIMESTAMP_FORMAT).to_string();
        let directory = self.prepare_workdir(&request, &stamp)?;
        info!(dir = %directory.display(), "created submission directory");

        self.advance(SubmissionState::BuildArtifacts);
        let script = ExecutableBuilder::new(self.config.storage_prefix())
            .build(&request, &request.fragment_path);
        let executable = directory.join(EXECUTABLE_NAME);
        script.write_to(&executable).map_err(|source| SubmitError::Io {
            path: executable.clone(),
            source,
        })?;

        let manifest =
            TransferManifestAssembler::new(self.runner.as_ref()).assemble(&campaign, &request)?;

        let log_base = request.log_base(&stamp);
        let descriptor = DescriptorGenerator::new().generate(
            &request,
            &credential,
            &manifest,
            EXECUTABLE_NAME,
            &log_base,
        )?;
        let descriptor_name = request.descriptor_filename();
        let descriptor_path = directory.join(&descriptor_name);
        let descriptor_text = descriptor.render();
        fs::write(&descriptor_path, &descriptor_text).map_err(|source| SubmitError::Io {
            path: descriptor_path.clone(),
            source,
        })?;

        let record = SubmissionRecord {
            schema_version: record::SCHEMA_VERSION,
            schema_id: record::SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            request: request.clone(),
            campaign,
            credential: credential.clone(),
            total_events: request.total_events(),
            remote_destination: script.destination().to_string(),
            executable: ArtifactDigest::of(EXECUTABLE_NAME, script.text().as_bytes()),
            descriptor: ArtifactDigest::of(descriptor_name.as_str(), descriptor_text.as_bytes()),
            manifest,
        };
        let record_path = record.write_to_dir(&directory)?;

        let completion = if request.flags.no_submit {
            self.advance(SubmissionState::DryRun);
            info!(
                dir = %directory.display(),
                "no_submit set; run `{} {}` there to submit", CONDOR_SUBMIT, descriptor_name
            );
            Completion::DryRun
        } else {
            self.advance(SubmissionState::Submit);
            Completion::Submitted {
                exit_code: self.submit(&directory, &descriptor_name)?,
            }
        };

        self.advance(SubmissionState::Done);
        Ok(SubmissionOutcome {
            directory,
            executable,
            descriptor: descriptor_path,
            record: record_path,
            credential,
            completion,
        })
    }

    /// Field checks, fragment presence and catalog membership. The returned
    /// request carries an absolute fragment path.
    fn validate_input(&self, request: &JobRequest) -> SubmitResult<(JobRequest, Campaign)> {
        request.validate()?;

        if !request.fragment_path.is_file() {
            return Err(SubmitError::FragmentNotFound(request.fragment_path.clone()));
        }
        let fragment = absolute_path(&request.fragment_path).map_err(|source| SubmitError::Io {
            path: request.fragment_path.clone(),
            source,
        })?;

        let campaign = self.catalog.lookup(&request.campaign)?;

        let mut request = request.clone();
        request.fragment_path = fragment;
        Ok((request, campaign))
    }

    fn log_summary(&self, request: &JobRequest, campaign: &Campaign) {
        info!(
            name = %request.name,
            fragment = %request.fragment_path.display(),
            campaign = %campaign.name,
            "preparing submission"
        );
        match campaign.os() {
            Ok(os) => debug!(%os, "campaign worker OS"),
            Err(e) => debug!("{e}"),
        }
        info!(
            "{} jobs x {} events = {} events total",
            request.n_jobs,
            request.nevents_per_job,
            request.total_events()
        );
        if request.flags.scouting {
            warn!("scouting mode: only ScoutingNanoAOD is produced, regular NanoAOD is not");
        }
        info!(
            destination = %request.remote_destination(&self.config.storage_prefix()),
            "output will be copied to remote storage"
        );
    }

    fn resolve_credential(&self, x509: Option<&Path>) -> SubmitResult<PathBuf> {
        let manager = CredentialManager::new(self.runner.as_ref(), &self.config.credential);
        let credential = manager.resolve(x509)?;

        match manager.lifetime_hours(&credential) {
            Ok(hours) => info!(
                proxy = %credential.display(),
                "using proxy with {:.1} hours left", hours
            ),
            Err(e) => warn!(proxy = %credential.display(), "could not report proxy lifetime: {e}"),
        }
        Ok(credential)
    }

    /// Create `<scratch>/<name>/<stamp>`, appending `-1`, `-2`, ... when a
    /// directory with that name already exists
    fn prepare_workdir(&self, request: &JobRequest, stamp: &str) -> SubmitResult<PathBuf> {
        debug_assert!(self.state.has_workdir(), "workdir created in {:?}", self.state);

        let parent = self.config.scratch_root.join(&request.name);
        fs::create_dir_all(&parent).map_err(|source| SubmitError::Io {
            path: parent.clone(),
            source,
        })?;

        let mut attempt = 0u32;
        loop {
            let candidate = if attempt == 0 {
                parent.join(stamp)
            } else {
                parent.join(format!("{}-{}", stamp, attempt))
            };
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(dir = %candidate.display(), "submission directory exists");
                    attempt += 1;
                }
                Err(source) => {
                    return Err(SubmitError::Io {
                        path: candidate,
                        source,
                    })
                }
            }
        }
    }

    fn submit(&self, directory: &Path, descriptor_name: &str) -> SubmitResult<i32> {
        let invocation = Invocation::new(CONDOR_SUBMIT)
            .arg(descriptor_name)
            .current_dir(directory)
            .inherit_streams();

        info!(command = %invocation, "submitting to condor");
        let output = self.runner.run(&invocation)?;
        let exit_code = output.code.unwrap_or(1);
        if exit_code == 0 {
            info!("condor_submit succeeded");
        } else {
            warn!(exit_code, "condor_submit failed");
        }
        Ok(exit_code)
    }
}
