//! Campaign catalog
//!
//! A campaign is a directory bundling the per-campaign run script and its
//! optional pileup list and packed environment. The catalog resolves a
//! campaign name to that directory; [`DirectoryCatalog`] scans the
//! filesystem and [`StaticCatalog`] is an explicit mapping.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Run script every campaign must provide
pub const RUN_SCRIPT: &str = "run.sh";

/// Pre-generated pileup input list
pub const PILEUP_FILE: &str = "pileupinput.dat";

/// Script producing [`PILEUP_FILE`]
pub const PILEUP_GENERATOR: &str = "getpileupfiles.sh";

/// Packed software environment
pub const ENV_BUNDLE: &str = "env.tar.gz";

/// Script producing [`ENV_BUNDLE`]
pub const ENV_BUILDER: &str = "build_env.sh";

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown campaign '{name}'; allowed: {}", .known.join(", "))]
    UnknownCampaign { name: String, known: Vec<String> },

    #[error("failed to scan campaign directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown MC campaign type: {0}")]
    UnknownOs(String),
}

/// Worker operating system a campaign's software release targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignOs {
    El6,
    El7,
    El9,
}

impl fmt::Display for CampaignOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignOs::El6 => write!(f, "el6"),
            CampaignOs::El7 => write!(f, "el7"),
            CampaignOs::El9 => write!(f, "el9"),
        }
    }
}

impl CampaignOs {
    /// RHEL container image for this OS. The rh* images are used because
    /// the x509 proxy does not work in the unpacked el* images.
    pub fn container_image(&self) -> String {
        format!(
            "/cvmfs/singularity.opensciencegrid.org/cmssw/cms:rh{}-x86_64",
            self
        )
    }
}

/// A resolved catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub name: String,
    pub dir: PathBuf,
}

impl Campaign {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    pub fn run_script(&self) -> PathBuf {
        self.dir.join(RUN_SCRIPT)
    }

    pub fn pileup_file(&self) -> PathBuf {
        self.dir.join(PILEUP_FILE)
    }

    pub fn env_bundle(&self) -> PathBuf {
        self.dir.join(ENV_BUNDLE)
    }

    /// Worker OS derived from the campaign name
    pub fn os(&self) -> Result<CampaignOs, CatalogError> {
        if self.name.contains("Run3") {
            Ok(CampaignOs::El9)
        } else if self.name.contains("RunII") {
            if self.name.contains("UL") {
                Ok(CampaignOs::El7)
            } else {
                Ok(CampaignOs::El6)
            }
        } else {
            Err(CatalogError::UnknownOs(self.name.clone()))
        }
    }

    /// Listing view: OS, container image and which optional artifacts exist
    pub fn summary(&self) -> CampaignSummary {
        let os = self.os().ok();
        CampaignSummary {
            name: self.name.clone(),
            dir: self.dir.clone(),
            os,
            container: os.map(|os| os.container_image()),
            pileup_file: self.pileup_file().is_file(),
            env_bundle: self.env_bundle().is_file(),
        }
    }
}

/// One row of the campaign listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignSummary {
    pub name: String,
    pub dir: PathBuf,
    pub os: Option<CampaignOs>,
    pub container: Option<String>,
    pub pileup_file: bool,
    pub env_bundle: bool,
}

/// `--campaign` help text listing what the catalog offers
pub fn campaign_help(catalog: &dyn CampaignCatalog) -> String {
    match catalog.names() {
        Ok(names) if !names.is_empty() => format!("Campaign to produce; one of: {}", names.join(", ")),
        Ok(_) => "Campaign to produce (no campaigns found)".to_string(),
        Err(e) => format!("Campaign to produce ({})", e),
    }
}

/// Source of campaigns
pub trait CampaignCatalog {
    /// All campaigns, sorted by name
    fn campaigns(&self) -> Result<Vec<Campaign>, CatalogError>;

    /// Campaign names, sorted
    fn names(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.campaigns()?.into_iter().map(|c| c.name).collect())
    }

    /// Resolve a campaign by exact name
    fn lookup(&self, name: &str) -> Result<Campaign, CatalogError> {
        let campaigns = self.campaigns()?;
        let known: Vec<String> = campaigns.iter().map(|c| c.name.clone()).collect();
        campaigns
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CatalogError::UnknownCampaign {
                name: name.to_string(),
                known,
            })
    }
}

/// Catalog backed by the subdirectories of a campaigns directory
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    dir: PathBuf,
    name_prefix: String,
}

impl DirectoryCatalog {
    /// Catalog of `dir`'s subdirectories whose names start with `name_prefix`
    pub fn new(dir: impl Into<PathBuf>, name_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name_prefix: name_prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CampaignCatalog for DirectoryCatalog {
    fn campaigns(&self) -> Result<Vec<Campaign>, CatalogError> {
        let scan_err = |source| CatalogError::Scan {
            path: self.dir.clone(),
            source,
        };

        let mut campaigns = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(scan_err)? {
            let entry = entry.map_err(scan_err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&self.name_prefix) {
                continue;
            }
            if entry.path().is_dir() {
                campaigns.push(Campaign::new(name, entry.path()));
            }
        }
        campaigns.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(campaigns)
    }
}

/// Catalog backed by an explicit name → directory mapping
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: BTreeMap<String, PathBuf>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a campaign
    pub fn with_campaign(mut self, name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.entries.insert(name.into(), dir.into());
        self
    }
}

impl CampaignCatalog for StaticCatalog {
    fn campaigns(&self) -> Result<Vec<Campaign>, CatalogError> {
        Ok(self
            .entries
            .iter()
            .map(|(name, dir)| Campaign::new(name.clone(), dir.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_catalog_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in ["Run3Summer23", "RunIISummer20UL18", "Run3Winter24", "scratch"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        // Files never count as campaigns, even with the right prefix.
        fs::write(dir.path().join("Run3README"), "notes").unwrap();
        dir
    }

    #[test]
    fn test_directory_catalog_filters_and_sorts() {
        let dir = create_catalog_dir();
        let catalog = DirectoryCatalog::new(dir.path(), "Run");

        assert_eq!(
            catalog.names().unwrap(),
            vec!["Run3Summer23", "Run3Winter24", "RunIISummer20UL18"]
        );
    }

    #[test]
    fn test_directory_catalog_lookup() {
        let dir = create_catalog_dir();
        let catalog = DirectoryCatalog::new(dir.path(), "Run");

        let campaign = catalog.lookup("Run3Summer23").unwrap();
        assert_eq!(campaign.dir, dir.path().join("Run3Summer23"));
        assert_eq!(campaign.run_script(), dir.path().join("Run3Summer23/run.sh"));
    }

    #[test]
    fn test_lookup_unknown_lists_known() {
        let dir = create_catalog_dir();
        let catalog = DirectoryCatalog::new(dir.path(), "Run");

        let err = catalog.lookup("scratch").unwrap_err();
        match err {
            CatalogError::UnknownCampaign { name, known } => {
                assert_eq!(name, "scratch");
                assert_eq!(known.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directory_catalog_missing_dir() {
        let dir = TempDir::new().unwrap();
        let catalog = DirectoryCatalog::new(dir.path().join("campaigns"), "Run");
        assert!(matches!(
            catalog.campaigns().unwrap_err(),
            CatalogError::Scan { .. }
        ));
    }

    #[test]
    fn test_static_catalog() {
        let catalog = StaticCatalog::new()
            .with_campaign("Run3Summer23", "/mc/campaigns/Run3Summer23")
            .with_campaign("Run3Winter24", "/mc/campaigns/Run3Winter24");

        assert_eq!(catalog.names().unwrap().len(), 2);
        assert_eq!(
            catalog.lookup("Run3Winter24").unwrap().env_bundle(),
            PathBuf::from("/mc/campaigns/Run3Winter24/env.tar.gz")
        );
        assert!(catalog.lookup("Run2").is_err());
    }

    #[test]
    fn test_campaign_os() {
        assert_eq!(Campaign::new("Run3Summer23", "/x").os().unwrap(), CampaignOs::El9);
        assert_eq!(
            Campaign::new("RunIISummer20UL18", "/x").os().unwrap(),
            CampaignOs::El7
        );
        assert_eq!(
            Campaign::new("RunIIFall17", "/x").os().unwrap(),
            CampaignOs::El6
        );
        assert!(Campaign::new("Phase2Fall22", "/x").os().is_err());
    }

    #[test]
    fn test_summary_reports_image_and_artifacts() {
        let dir = TempDir::new().unwrap();
        let run3 = dir.path().join("Run3Summer23");
        fs::create_dir(&run3).unwrap();
        fs::write(run3.join(PILEUP_FILE), "/store/mc/pu.root\n").unwrap();

        let summary = Campaign::new("Run3Summer23", &run3).summary();
        assert_eq!(summary.os, Some(CampaignOs::El9));
        assert_eq!(
            summary.container.as_deref(),
            Some("/cvmfs/singularity.opensciencegrid.org/cmssw/cms:rhel9-x86_64")
        );
        assert!(summary.pileup_file);
        assert!(!summary.env_bundle);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["os"], "el9");
        assert_eq!(json["container"], summary.container.clone().unwrap());

        let unknown = Campaign::new("Phase2Fall22", &run3).summary();
        assert_eq!(unknown.os, None);
        assert_eq!(unknown.container, None);
    }

    #[test]
    fn test_campaign_help_lists_names() {
        let dir = create_catalog_dir();
        let catalog = DirectoryCatalog::new(dir.path(), "Run");
        assert_eq!(
            campaign_help(&catalog),
            "Campaign to produce; one of: Run3Summer23, Run3Winter24, RunIISummer20UL18"
        );

        let missing = DirectoryCatalog::new(dir.path().join("absent"), "Run");
        assert!(campaign_help(&missing).starts_with("Campaign to produce (failed to scan"));
        assert_eq!(
            campaign_help(&StaticCatalog::new()),
            "Campaign to produce (no campaigns found)"
        );
    }

    #[test]
    fn test_container_image() {
        assert_eq!(
            CampaignOs::El9.container_image(),
            "/cvmfs/singularity.opensciencegrid.org/cmssw/cms:rhel9-x86_64"
        );
    }
}
