//! Job request model
//!
//! A [`JobRequest`] is the validated, immutable description of one job
//! array submission: what to generate, how many jobs, and what each job
//! asks the scheduler for.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Worker-side executable written into every submission directory
pub const EXECUTABLE_NAME: &str = "run_mc.sh";

/// Descriptor file name used when no custom name is given
pub const DEFAULT_DESCRIPTOR_NAME: &str = "condor_cfg.jdl";

/// `+JobFlavour` class-of-service tags, shortest to longest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobFlavor {
    /// 20 minutes
    Espresso,
    /// 1 hour
    Microcentury,
    /// 2 hours
    #[default]
    Longlunch,
    /// 8 hours
    Workday,
    /// 1 day
    Tomorrow,
    /// 3 days
    Testmatch,
    /// 1 week
    Nextweek,
}

impl JobFlavor {
    pub const ALL: [JobFlavor; 7] = [
        JobFlavor::Espresso,
        JobFlavor::Microcentury,
        JobFlavor::Longlunch,
        JobFlavor::Workday,
        JobFlavor::Tomorrow,
        JobFlavor::Testmatch,
        JobFlavor::Nextweek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobFlavor::Espresso => "espresso",
            JobFlavor::Microcentury => "microcentury",
            JobFlavor::Longlunch => "longlunch",
            JobFlavor::Workday => "workday",
            JobFlavor::Tomorrow => "tomorrow",
            JobFlavor::Testmatch => "testmatch",
            JobFlavor::Nextweek => "nextweek",
        }
    }

    /// Comma-separated list of accepted names
    pub fn allowed() -> String {
        Self::ALL
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for JobFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobFlavor {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| JobError::InvalidFlavor(s.to_string()))
    }
}

/// Boolean switches of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    /// Ship a pre-packed software environment instead of setting one up on the worker
    pub ship_env: bool,
    /// Use a pre-generated pileup list instead of a runtime query
    pub use_pileup_file: bool,
    /// Also stage the intermediate MiniAOD tree
    pub keep_mini: bool,
    /// Produce scouting NanoAOD instead of regular NanoAOD
    pub scouting: bool,
    /// Prepare the submission directory without calling the scheduler
    pub no_submit: bool,
}

/// Validated job array request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Dataset name; keys the submission directory and remote output path
    pub name: String,
    /// Campaign name, resolved against the catalog
    pub campaign: String,
    pub nevents_per_job: u32,
    pub n_jobs: u32,
    pub n_threads: u32,
    pub memory_mb: u32,
    pub job_flavor: JobFlavor,
    /// Remote output directory relative to the storage prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    pub flags: JobFlags,
    /// Absolute path of the generator fragment
    pub fragment_path: PathBuf,
    /// Custom descriptor base name (`<name>_cfg.jdl`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit_filename: Option<String>,
    /// Custom base name for scheduler log/out/err files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_name: Option<String>,
}

impl JobRequest {
    /// Start a request with the CLI defaults
    pub fn builder(
        name: impl Into<String>,
        campaign: impl Into<String>,
        fragment_path: impl Into<PathBuf>,
    ) -> JobRequestBuilder {
        JobRequestBuilder::new(name, campaign, fragment_path)
    }

    /// Total events over the whole array
    pub fn total_events(&self) -> u64 {
        u64::from(self.n_jobs) * u64::from(self.nevents_per_job)
    }

    /// Descriptor file name in the submission directory
    pub fn descriptor_filename(&self) -> String {
        match self.submit_filename {
            Some(ref base) => format!("{}_cfg.jdl", base),
            None => DEFAULT_DESCRIPTOR_NAME.to_string(),
        }
    }

    /// Base name for scheduler output files; falls back to `timestamp`
    pub fn log_base(&self, timestamp: &str) -> String {
        self.log_name
            .clone()
            .unwrap_or_else(|| timestamp.to_string())
    }

    /// Remote destination of staged output
    pub fn remote_destination(&self, storage_prefix: &str) -> String {
        match self.output_dir {
            Some(ref dir) => format!("{}{}", storage_prefix, dir),
            None => format!("{}{}/{}/", storage_prefix, self.name, self.campaign),
        }
    }

    /// File name of the fragment once transferred to the worker
    pub fn fragment_basename(&self) -> String {
        self.fragment_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Check field-level invariants. Catalog membership and the fragment's
    /// existence are checked by the orchestrator.
    pub fn validate(&self) -> Result<(), JobError> {
        validate_identifier("name", &self.name)?;
        validate_identifier("campaign", &self.campaign)?;
        for (field, value) in [
            ("nevents_per_job", self.nevents_per_job),
            ("n_jobs", self.n_jobs),
            ("n_threads", self.n_threads),
            ("memory", self.memory_mb),
        ] {
            if value == 0 {
                return Err(JobError::NotPositive(field));
            }
        }
        if let Some(ref dir) = self.output_dir {
            validate_remote_path(dir)?;
        }
        if let Some(ref base) = self.submit_filename {
            validate_identifier("submit_filename", base)?;
        }
        if let Some(ref base) = self.log_name {
            validate_identifier("log", base)?;
        }
        let fragment = self.fragment_basename();
        if fragment.is_empty() || fragment.chars().any(breaks_script_or_list) {
            return Err(JobError::InvalidFragment(self.fragment_path.clone()));
        }
        Ok(())
    }
}

/// Builder for [`JobRequest`]
#[derive(Debug, Clone)]
pub struct JobRequestBuilder {
    request: JobRequest,
}

impl JobRequestBuilder {
    pub fn new(
        name: impl Into<String>,
        campaign: impl Into<String>,
        fragment_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            request: JobRequest {
                name: name.into(),
                campaign: campaign.into(),
                nevents_per_job: 100,
                n_jobs: 1,
                n_threads: 8,
                memory_mb: 3000,
                job_flavor: JobFlavor::default(),
                output_dir: None,
                flags: JobFlags::default(),
                fragment_path: fragment_path.into(),
                submit_filename: None,
                log_name: None,
            },
        }
    }

    pub fn nevents_per_job(mut self, n: u32) -> Self {
        self.request.nevents_per_job = n;
        self
    }

    pub fn n_jobs(mut self, n: u32) -> Self {
        self.request.n_jobs = n;
        self
    }

    pub fn n_threads(mut self, n: u32) -> Self {
        self.request.n_threads = n;
        self
    }

    pub fn memory_mb(mut self, mb: u32) -> Self {
        self.request.memory_mb = mb;
        self
    }

    pub fn job_flavor(mut self, flavor: JobFlavor) -> Self {
        self.request.job_flavor = flavor;
        self
    }

    pub fn output_dir(mut self, dir: Option<String>) -> Self {
        self.request.output_dir = dir;
        self
    }

    pub fn flags(mut self, flags: JobFlags) -> Self {
        self.request.flags = flags;
        self
    }

    pub fn submit_filename(mut self, base: Option<String>) -> Self {
        self.request.submit_filename = base;
        self
    }

    pub fn log_name(mut self, base: Option<String>) -> Self {
        self.request.log_name = base;
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<JobRequest, JobError> {
        self.request.validate()?;
        Ok(self.request)
    }
}

/// Errors for job request construction
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job flavor '{0}'; allowed: {}", JobFlavor::allowed())]
    InvalidFlavor(String),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    #[error("invalid output directory '{0}'")]
    InvalidOutputDir(String),

    #[error("invalid fragment path: {0}")]
    InvalidFragment(PathBuf),
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// The fragment basename lands unquoted in the worker's `run.sh` line and in
/// the comma-joined `transfer_input_files`.
fn breaks_script_or_list(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ',' | '\'' | '"' | '$' | '`' | ';' | '&' | '|' | '<' | '>' | '(' | ')' | '\\'
        )
}

/// Names end up in directory names, file names and the worker script, so
/// only a shell- and path-safe alphabet is accepted.
fn validate_identifier(field: &'static str, value: &str) -> Result<(), JobError> {
    let invalid = |reason: &str| JobError::InvalidIdentifier {
        field,
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if value.starts_with('.') || value.starts_with('-') {
        return Err(invalid("must start with a letter, digit or underscore"));
    }
    if let Some(c) = value.chars().find(|c| !is_safe_char(*c)) {
        return Err(invalid(&format!("contains invalid character {:?}", c)));
    }
    Ok(())
}

fn validate_remote_path(path: &str) -> Result<(), JobError> {
    let ok = !path.is_empty()
        && !path.split('/').any(|seg| seg == "..")
        && path.chars().all(|c| is_safe_char(c) || c == '/');
    if ok {
        Ok(())
    } else {
        Err(JobError::InvalidOutputDir(path.to_string()))
    }
}

/// Resolve `path` against the current directory without touching symlinks
pub fn absolute_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JobRequestBuilder {
        JobRequest::builder("ttbarDM", "Run3Summer23", "/data/fragments/ttbarDM_cfg.py")
    }

    #[test]
    fn test_builder_defaults() {
        let req = sample().build().unwrap();
        assert_eq!(req.nevents_per_job, 100);
        assert_eq!(req.n_jobs, 1);
        assert_eq!(req.n_threads, 8);
        assert_eq!(req.memory_mb, 3000);
        assert_eq!(req.job_flavor, JobFlavor::Longlunch);
        assert_eq!(req.flags, JobFlags::default());
    }

    #[test]
    fn test_flavor_round_trip_names() {
        for flavor in JobFlavor::ALL {
            assert_eq!(flavor.as_str().parse::<JobFlavor>().unwrap(), flavor);
        }
        assert!(matches!(
            "lunch".parse::<JobFlavor>(),
            Err(JobError::InvalidFlavor(_))
        ));
        assert!("Longlunch".parse::<JobFlavor>().is_err());
    }

    #[test]
    fn test_flavor_error_lists_allowed() {
        let err = "brunch".parse::<JobFlavor>().unwrap_err();
        assert!(err.to_string().contains("espresso, microcentury, longlunch"));
    }

    #[test]
    fn test_zero_counts_rejected() {
        assert!(matches!(
            sample().nevents_per_job(0).build(),
            Err(JobError::NotPositive("nevents_per_job"))
        ));
        assert!(matches!(
            sample().n_jobs(0).build(),
            Err(JobError::NotPositive("n_jobs"))
        ));
        assert!(matches!(
            sample().memory_mb(0).build(),
            Err(JobError::NotPositive("memory"))
        ));
    }

    #[test]
    fn test_total_events() {
        let req = sample().n_jobs(5).nevents_per_job(100).build().unwrap();
        assert_eq!(req.total_events(), 500);

        let req = sample()
            .n_jobs(u32::MAX)
            .nevents_per_job(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(req.total_events(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn test_descriptor_filename() {
        assert_eq!(sample().build().unwrap().descriptor_filename(), "condor_cfg.jdl");
        let req = sample()
            .submit_filename(Some("ttbar".to_string()))
            .build()
            .unwrap();
        assert_eq!(req.descriptor_filename(), "ttbar_cfg.jdl");
    }

    #[test]
    fn test_log_base() {
        let req = sample().build().unwrap();
        assert_eq!(req.log_base("2026-10-18-0930"), "2026-10-18-0930");
        let req = sample().log_name(Some("ttbar".to_string())).build().unwrap();
        assert_eq!(req.log_base("2026-10-18-0930"), "ttbar");
    }

    #[test]
    fn test_remote_destination() {
        let prefix = "root://cmsxrootd.hep.wisc.edu//store/user/athete/";
        let req = sample().build().unwrap();
        assert_eq!(
            req.remote_destination(prefix),
            "root://cmsxrootd.hep.wisc.edu//store/user/athete/ttbarDM/Run3Summer23/"
        );

        let req = sample()
            .output_dir(Some("signal/ttbar".to_string()))
            .build()
            .unwrap();
        assert_eq!(
            req.remote_destination(prefix),
            "root://cmsxrootd.hep.wisc.edu//store/user/athete/signal/ttbar"
        );
    }

    #[test]
    fn test_unsafe_names_rejected() {
        assert!(JobRequest::builder("a b", "Run3", "/f.py").build().is_err());
        assert!(JobRequest::builder("../x", "Run3", "/f.py").build().is_err());
        assert!(JobRequest::builder("x;rm", "Run3", "/f.py").build().is_err());
        assert!(JobRequest::builder("", "Run3", "/f.py").build().is_err());
        assert!(sample()
            .output_dir(Some("a/../../b".to_string()))
            .build()
            .is_err());
        assert!(JobRequest::builder("ok", "Run3", "/dir/has space.py")
            .build()
            .is_err());
    }

    #[test]
    fn test_fragment_names_accepted_unless_unsafe_for_shell_or_list() {
        for ok in ["ttbar+DM_cfg.py", "a=b@c%d~.py", "v1.2-final_cfg.py"] {
            assert!(
                JobRequest::builder("ok", "Run3", format!("/frags/{}", ok))
                    .build()
                    .is_ok(),
                "{} rejected",
                ok
            );
        }
        for bad in [
            "a b.py", "a,b.py", "a'b.py", "a\"b.py", "a$b.py", "a`b.py", "a;b.py", "a&b.py",
            "a|b.py", "a<b.py", "a>b.py", "a\tb.py", "frag(v2).py", "a\\b.py",
        ] {
            assert!(
                matches!(
                    JobRequest::builder("ok", "Run3", format!("/frags/{}", bad)).build(),
                    Err(JobError::InvalidFragment(_))
                ),
                "{} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_fragment_basename() {
        assert_eq!(sample().build().unwrap().fragment_basename(), "ttbarDM_cfg.py");
    }

    #[test]
    fn test_absolute_path() {
        let abs = absolute_path(Path::new("frag.py")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("frag.py"));
        assert_eq!(
            absolute_path(Path::new("/x/frag.py")).unwrap(),
            PathBuf::from("/x/frag.py")
        );
    }
}
