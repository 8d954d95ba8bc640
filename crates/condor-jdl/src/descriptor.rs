//! Submit description model and renderer

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;
use crate::{CLUSTER_ID_MACRO, PROC_ID_MACRO};

/// Jobs run as plain processes on the worker's host OS
pub const UNIVERSE: &str = "vanilla";

/// A single `key = value` line of a submit description
#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    key: &'static str,
    value: String,
}

impl Directive {
    fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.key, self.value)
    }
}

/// Fully-resolved submit description for one job array
///
/// Field order in the rendered file is fixed: execution and credential
/// directives, resource requests, file-transfer policy, per-process
/// output naming, then the queue statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitDescriptor {
    /// Executable file name, relative to the submission directory
    pub executable: String,

    /// Path of the x509 proxy the scheduler forwards to the job
    pub x509_proxy: String,

    /// Memory request in MB
    pub request_memory_mb: u32,

    /// CPU request
    pub request_cpus: u32,

    /// `+JobFlavour` class-of-service tag
    pub job_flavour: String,

    /// Files staged to the worker, in order
    pub transfer_input_files: Vec<String>,

    /// Base name for the per-process output, error and log files
    pub log_base: String,

    /// Number of processes queued in the cluster
    pub queue: u32,
}

impl SubmitDescriptor {
    /// Start building a descriptor for the given executable
    pub fn builder(executable: impl Into<String>) -> SubmitDescriptorBuilder {
        SubmitDescriptorBuilder::new(executable)
    }

    /// Per-process file name template, e.g. `base.$(ClusterId).$(ProcId).out`
    pub fn per_process_file(&self, extension: &str) -> String {
        format!(
            "{}.{}.{}.{}",
            self.log_base, CLUSTER_ID_MACRO, PROC_ID_MACRO, extension
        )
    }

    fn sections(&self) -> [Vec<Directive>; 3] {
        let execution = vec![
            Directive::new("universe", UNIVERSE),
            Directive::new("executable", self.executable.as_str()),
            Directive::new("use_x509userproxy", "true"),
            Directive::new("X509userproxy", self.x509_proxy.as_str()),
            Directive::new("transfer_executable", "true"),
            Directive::new("notification", "never"),
            Directive::new("request_memory", self.request_memory_mb.to_string()),
            Directive::new("request_cpus", self.request_cpus.to_string()),
            Directive::new("+JobFlavour", self.job_flavour.as_str()),
        ];

        // Output staging happens inside the executable, so the scheduler
        // transfers nothing back.
        let transfer = vec![
            Directive::new("should_transfer_files", "yes"),
            Directive::new("transfer_input_files", self.transfer_input_files.join(",")),
            Directive::new("transfer_output_files", "\"\""),
            Directive::new("when_to_transfer_output", "on_exit"),
        ];

        let process = vec![
            Directive::new("output", self.per_process_file("out")),
            Directive::new("error", self.per_process_file("err")),
            Directive::new("log", self.per_process_file("log")),
            Directive::new("arguments", PROC_ID_MACRO),
        ];

        [execution, transfer, process]
    }

    /// Render the submit description text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections().iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for directive in section {
                out.push_str(&directive.to_string());
                out.push('\n');
            }
        }
        out.push_str(&format!("queue {}\n", self.queue));
        out
    }
}

impl fmt::Display for SubmitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Builder for [`SubmitDescriptor`]
#[derive(Debug, Clone, Default)]
pub struct SubmitDescriptorBuilder {
    executable: String,
    x509_proxy: Option<String>,
    request_memory_mb: Option<u32>,
    request_cpus: Option<u32>,
    job_flavour: Option<String>,
    transfer_input_files: Vec<String>,
    log_base: Option<String>,
    queue: Option<u32>,
}

impl SubmitDescriptorBuilder {
    /// Create a builder for the given executable name
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    /// Set the x509 proxy path
    pub fn x509_proxy(mut self, path: impl Into<String>) -> Self {
        self.x509_proxy = Some(path.into());
        self
    }

    /// Set the memory request in MB
    pub fn request_memory_mb(mut self, mb: u32) -> Self {
        self.request_memory_mb = Some(mb);
        self
    }

    /// Set the CPU request
    pub fn request_cpus(mut self, cpus: u32) -> Self {
        self.request_cpus = Some(cpus);
        self
    }

    /// Set the job flavour tag
    pub fn job_flavour(mut self, flavour: impl Into<String>) -> Self {
        self.job_flavour = Some(flavour.into());
        self
    }

    /// Append one input file to the transfer list
    pub fn transfer_input(mut self, path: impl Into<String>) -> Self {
        self.transfer_input_files.push(path.into());
        self
    }

    /// Append input files to the transfer list, preserving order
    pub fn transfer_inputs<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transfer_input_files
            .extend(paths.into_iter().map(Into::into));
        self
    }

    /// Set the base name for per-process output files
    pub fn log_base(mut self, base: impl Into<String>) -> Self {
        self.log_base = Some(base.into());
        self
    }

    /// Set the number of queued processes
    pub fn queue(mut self, count: u32) -> Self {
        self.queue = Some(count);
        self
    }

    /// Validate and build the descriptor
    pub fn build(self) -> Result<SubmitDescriptor, DescriptorError> {
        if self.executable.is_empty() {
            return Err(DescriptorError::MissingField("executable"));
        }
        let x509_proxy = self
            .x509_proxy
            .ok_or(DescriptorError::MissingField("x509_proxy"))?;
        let request_memory_mb = positive(self.request_memory_mb, "request_memory")?;
        let request_cpus = positive(self.request_cpus, "request_cpus")?;
        let queue = positive(self.queue, "queue")?;
        let job_flavour = self
            .job_flavour
            .ok_or(DescriptorError::MissingField("job_flavour"))?;
        let log_base = self
            .log_base
            .ok_or(DescriptorError::MissingField("log_base"))?;

        if self.transfer_input_files.is_empty() {
            return Err(DescriptorError::MissingField("transfer_input_files"));
        }
        for path in &self.transfer_input_files {
            if path.is_empty() || path.contains(',') || path.contains('\n') {
                return Err(DescriptorError::InvalidInputPath(path.clone()));
            }
        }

        single_line("executable", &self.executable)?;
        single_line("X509userproxy", &x509_proxy)?;
        single_line("+JobFlavour", &job_flavour)?;
        single_line("log", &log_base)?;

        Ok(SubmitDescriptor {
            executable: self.executable,
            x509_proxy,
            request_memory_mb,
            request_cpus,
            job_flavour,
            transfer_input_files: self.transfer_input_files,
            log_base,
            queue,
        })
    }
}

fn positive(value: Option<u32>, field: &'static str) -> Result<u32, DescriptorError> {
    match value {
        None => Err(DescriptorError::MissingField(field)),
        Some(0) => Err(DescriptorError::NotPositive { field }),
        Some(v) => Ok(v),
    }
}

fn single_line(key: &'static str, value: &str) -> Result<(), DescriptorError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(DescriptorError::MultilineValue { key });
    }
    Ok(())
}
