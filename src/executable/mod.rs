//! Worker-side executable synthesis
//!
//! The generated script runs in the job's scratch directory on the worker:
//! it sets up the software environment, runs the campaign's generation
//! chain for one job of the array, and copies the produced trees to remote
//! storage with `xrdcp`. The scheduler passes the process index as `$1`.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{ENV_BUNDLE, PILEUP_FILE, RUN_SCRIPT};
use crate::job::JobRequest;

/// Worker scratch directory, expanded by the shell on the worker
pub const SCRATCH_DIR_VAR: &str = "$_CONDOR_SCRATCH_DIR";

/// Site baseline environment
pub const SITE_SETUP: &str = "/cvmfs/cms.cern.ch/cmsset_default.sh";

/// Output tree staged back to remote storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputTree {
    NanoAod,
    ScoutingNanoAod,
    MiniAod,
}

impl OutputTree {
    /// Directory the run script writes this tree into
    pub fn dir_name(&self) -> &'static str {
        match self {
            OutputTree::NanoAod => "NanoAOD",
            OutputTree::ScoutingNanoAod => "ScoutingNanoAOD",
            OutputTree::MiniAod => "MiniAOD",
        }
    }

    /// Trees staged for a request: one NanoAOD flavour, plus MiniAOD
    /// when it is kept
    pub fn selected(request: &JobRequest) -> Vec<OutputTree> {
        let mut trees = vec![if request.flags.scouting {
            OutputTree::ScoutingNanoAod
        } else {
            OutputTree::NanoAod
        }];
        if request.flags.keep_mini {
            trees.push(OutputTree::MiniAod);
        }
        trees
    }
}

impl fmt::Display for OutputTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Generated script text plus what it stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableScript {
    text: String,
    destination: String,
    staged: Vec<OutputTree>,
}

impl ExecutableScript {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Remote directory the trees are copied to
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn staged_trees(&self) -> &[OutputTree] {
        &self.staged
    }

    /// Write the script and mark it executable
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, &self.text)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

/// Synthesizes [`ExecutableScript`]s
#[derive(Debug, Clone)]
pub struct ExecutableBuilder {
    storage_prefix: String,
}

impl ExecutableBuilder {
    /// `storage_prefix` is the remote root output directories are appended to
    pub fn new(storage_prefix: impl Into<String>) -> Self {
        Self {
            storage_prefix: storage_prefix.into(),
        }
    }

    /// Build the script for `request`, whose fragment is staged from `fragment`
    pub fn build(&self, request: &JobRequest, fragment: &Path) -> ExecutableScript {
        let destination = request.remote_destination(&self.storage_prefix);
        let staged = OutputTree::selected(request);

        let mut script = String::new();
        script.push_str("#!/bin/bash\n");
        script.push_str("mkdir jobs && cd jobs\n");
        script.push_str(&format!("source {}\n", SITE_SETUP));
        script.push_str("echo 'The OS on HTCondor is:'\n");
        script.push_str("cat /etc/os-release\n");
        script.push_str("echo 'Validating x509 proxy...'\n");
        script.push_str("voms-proxy-info -all\n");

        if request.flags.ship_env {
            script.push_str(&unpack_environment());
        }

        script.push_str(&run_command(request, fragment));
        script.push('\n');

        for tree in &staged {
            script.push_str(&format!(
                "xrdcp -f -r -p ./{}/ {}\n",
                tree.dir_name(),
                destination
            ));
        }

        ExecutableScript {
            text: script,
            destination,
            staged,
        }
    }
}

/// Unpack the shipped environment and relocate every CMSSW project in it
fn unpack_environment() -> String {
    format!(
        r#"mv ../{bundle} .
tar -xzf {bundle}
echo "After extracting the environment"
ls -lrth
for cdir in ./CMSSW*; do
    cd $cdir/src
    echo $cdir
    scramv1 b ProjectRename
    eval `scram runtime -sh`
    cd ../..
done
"#,
        bundle = ENV_BUNDLE
    )
}

/// `run.sh <name> <fragment> <nevents> <proc index> <threads> [pileup] [scouting]`
fn run_command(request: &JobRequest, fragment: &Path) -> String {
    let fragment_name = fragment
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| request.fragment_basename());

    let mut words = vec![
        "source".to_string(),
        format!("{}/{}", SCRATCH_DIR_VAR, RUN_SCRIPT),
        request.name.clone(),
        format!("{}/{}", SCRATCH_DIR_VAR, fragment_name),
        request.nevents_per_job.to_string(),
        "$1".to_string(),
        request.n_threads.to_string(),
    ];
    if request.flags.use_pileup_file {
        words.push(format!("{}/{}", SCRATCH_DIR_VAR, PILEUP_FILE));
    }
    if request.flags.scouting {
        words.push("true".to_string());
    }
    words.push("2>&1".to_string());
    words.join(" ")
}
