//! condor-mc - Monte Carlo job array submission lane
//!
//! Prepares HTCondor submissions for Monte Carlo production: resolves an
//! x509 proxy, assembles the files staged to each job, writes the worker
//! script and submit description into a fresh submission directory, and
//! optionally hands the description to `condor_submit`.

pub mod catalog;
pub mod command;
pub mod config;
pub mod credential;
pub mod descriptor;
pub mod executable;
pub mod job;
pub mod manifest;
pub mod submit;

pub use catalog::{Campaign, CampaignCatalog, CampaignOs, CatalogError, DirectoryCatalog, StaticCatalog};
pub use command::{CommandRunner, Invocation, MockRunner, SystemRunner, ToolError, ToolOutput};
pub use config::{ConfigError, LaneConfig, UserIdentity};
pub use credential::{CredentialError, CredentialManager};
pub use descriptor::DescriptorGenerator;
pub use executable::{ExecutableBuilder, ExecutableScript, OutputTree};
pub use job::{JobError, JobFlags, JobFlavor, JobRequest};
pub use manifest::{ManifestError, TransferManifest, TransferManifestAssembler};
pub use submit::{Completion, Orchestrator, SubmissionOutcome, SubmissionState, SubmitError};
