//! condor-mc CLI
//!
//! Entry point for the `condor-mc` command-line tool.

use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use condor_mc::catalog::{campaign_help, CampaignSummary};
use condor_mc::config::{catalog_root_from_env, default_host_config_path};
use condor_mc::{
    CampaignCatalog, Completion, DirectoryCatalog, JobFlags, JobFlavor, JobRequest, LaneConfig,
    Orchestrator, SystemRunner, UserIdentity,
};

#[derive(Parser)]
#[command(name = "condor-mc")]
#[command(about = "Submit Monte Carlo generation job arrays to HTCondor", version)]
#[command(subcommand_negates_reqs = true, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Dataset name; names the submission directory and remote output
    #[arg(long, required = true)]
    name: Option<String>,

    /// Generator fragment passed to the campaign's run script
    #[arg(long, required = true)]
    fragment: Option<PathBuf>,

    /// Campaign directory name under $MCDIRPATH/campaigns
    #[arg(long, required = true)]
    campaign: Option<String>,

    /// Ship the campaign's packed environment instead of building it on the worker
    #[arg(short = 'e', long = "ship_env")]
    ship_env: bool,

    /// Use the campaign's pre-generated pileup list
    #[arg(long = "use_pileup_file")]
    use_pileup_file: bool,

    /// Events generated by each job
    #[arg(long = "nevents_per_job", default_value_t = 100)]
    nevents_per_job: u32,

    /// Number of jobs in the array
    #[arg(long = "n_jobs", default_value_t = 1)]
    n_jobs: u32,

    /// Threads (and requested CPUs) per job
    #[arg(long = "n_threads", default_value_t = 8)]
    n_threads: u32,

    /// x509 proxy to use; a new one is issued if it is unusable
    #[arg(long)]
    x509: Option<PathBuf>,

    /// Remote output directory relative to the storage prefix
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<String>,

    /// Also copy the MiniAOD tree to remote storage
    #[arg(long = "keep_mini")]
    keep_mini: bool,

    /// Produce ScoutingNanoAOD instead of NanoAOD
    #[arg(long)]
    scouting: bool,

    /// Job flavour (espresso, microcentury, longlunch, workday, tomorrow, testmatch, nextweek)
    #[arg(short = 't', long = "job_flavor", default_value = "longlunch")]
    job_flavor: JobFlavor,

    /// Memory request in MB
    #[arg(short = 'm', long, default_value_t = 3000)]
    memory: u32,

    /// Descriptor base name, written as <name>_cfg.jdl
    #[arg(short = 's', long = "submit_filename")]
    submit_filename: Option<String>,

    /// Base name for condor log/out/err files
    #[arg(short = 'l', long)]
    log: Option<String>,

    /// Prepare the submission directory without calling condor_submit
    #[arg(long = "no_submit")]
    no_submit: bool,

    /// Host config file (default: ~/.config/condor-mc/config.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the campaigns available under $MCDIRPATH
    Campaigns {
        /// Host config file (default: ~/.config/condor-mc/config.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // MCDIRPATH is needed before parsing: `--campaign` help lists its campaigns.
    let catalog_root = match catalog_root_from_env() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Error: {}; point it at the directory holding campaigns/", e);
            process::exit(1);
        }
    };

    let identity = match UserIdentity::current() {
        Some(identity) => identity,
        None => {
            eprintln!("Error: could not determine the invoking user");
            process::exit(1);
        }
    };

    let default_config = load_config(&identity, &catalog_root, None);
    let help = campaign_help(&directory_catalog(&default_config));
    let matches = Cli::command()
        .mut_arg("campaign", |arg| arg.help(help))
        .get_matches();
    let mut cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    match cli.command.take() {
        Some(Commands::Campaigns { config, json }) => {
            let config = match config {
                Some(path) => load_config(&identity, &catalog_root, Some(path)),
                None => default_config,
            };
            run_campaigns(config, json)
        }
        None => {
            let config = match cli.config.take() {
                Some(path) => load_config(&identity, &catalog_root, Some(path)),
                None => default_config,
            };
            run_submit(cli, config)
        }
    }
}

fn load_config(identity: &UserIdentity, catalog_root: &Path, config_path: Option<PathBuf>) -> LaneConfig {
    let host_config = config_path.or_else(default_host_config_path);
    match LaneConfig::load(identity, host_config.as_deref(), catalog_root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn directory_catalog(config: &LaneConfig) -> DirectoryCatalog {
    DirectoryCatalog::new(config.campaigns_dir(), config.catalog.name_prefix.clone())
}

fn run_submit(cli: Cli, config: LaneConfig) {
    let (Some(name), Some(fragment), Some(campaign)) = (cli.name, cli.fragment, cli.campaign)
    else {
        eprintln!("Error: --name, --fragment and --campaign are required");
        process::exit(2);
    };

    let flags = JobFlags {
        ship_env: cli.ship_env,
        use_pileup_file: cli.use_pileup_file,
        keep_mini: cli.keep_mini,
        scouting: cli.scouting,
        no_submit: cli.no_submit,
    };

    let request = match JobRequest::builder(name, campaign, fragment)
        .nevents_per_job(cli.nevents_per_job)
        .n_jobs(cli.n_jobs)
        .n_threads(cli.n_threads)
        .memory_mb(cli.memory)
        .job_flavor(cli.job_flavor)
        .output_dir(cli.output_dir)
        .flags(flags)
        .submit_filename(cli.submit_filename)
        .log_name(cli.log)
        .build()
    {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    let catalog = directory_catalog(&config);
    let mut orchestrator = Orchestrator::new(config, Box::new(catalog), Box::new(SystemRunner));

    match orchestrator.run(&request, cli.x509.as_deref()) {
        Ok(outcome) => {
            println!("Submission directory: {}", outcome.directory.display());
            match outcome.completion {
                Completion::DryRun => println!("Dry run: nothing submitted"),
                Completion::Submitted { exit_code } => {
                    println!("condor_submit exited with status {}", exit_code)
                }
            }
            process::exit(outcome.exit_code());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_campaigns(config: LaneConfig, json: bool) {
    let catalog = directory_catalog(&config);

    let campaigns = match catalog.campaigns() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let entries: Vec<CampaignSummary> = campaigns.iter().map(|c| c.summary()).collect();

    if json {
        match serde_json::to_string_pretty(&entries) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing campaigns: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if entries.is_empty() {
        println!("No campaigns found in {}", catalog.dir().display());
        return;
    }

    println!(
        "{:<32} {:<4} {:<7} {:<3} {}",
        "CAMPAIGN", "OS", "PILEUP", "ENV", "CONTAINER"
    );
    for entry in &entries {
        println!(
            "{:<32} {:<4} {:<7} {:<3} {}",
            entry.name,
            entry.os.map(|os| os.to_string()).unwrap_or_else(|| "-".to_string()),
            if entry.pileup_file { "yes" } else { "no" },
            if entry.env_bundle { "yes" } else { "no" },
            entry.container.as_deref().unwrap_or("-"),
        );
    }
}
