//! Built-in lane defaults (layer 1)

use serde::{Deserialize, Serialize};

use super::identity::UserIdentity;

/// Default xrootd redirector for remote output storage
pub const DEFAULT_REDIRECTOR: &str = "root://cmsxrootd.hep.wisc.edu/";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Per-user root under which submission directories are created
    pub scratch_root: String,

    /// xrootd redirector used for output staging
    pub redirector: String,

    /// Proxy location used whenever a new credential has to be issued
    pub default_proxy_path: String,

    /// VOMS virtual organisation requested for new proxies
    pub voms_group: String,

    /// Validity requested for new proxies (`HH:MM`)
    pub proxy_validity: String,

    /// Minimum remaining proxy lifetime accepted at submission time
    pub min_lifetime_hours: f64,

    /// Path prefixes the scheduler cannot read proxies from
    pub disallowed_prefixes: Vec<String>,

    /// Directory-name prefix a campaign must carry to be listed
    pub campaign_prefix: String,
}

impl BuiltinDefaults {
    /// Defaults for the given user
    pub fn for_user(identity: &UserIdentity) -> Self {
        Self {
            scratch_root: format!("/nfs_scratch/{}/condor-jobs", identity.name),
            redirector: DEFAULT_REDIRECTOR.to_string(),
            default_proxy_path: format!("/tmp/x509up_u{}", identity.uid),
            voms_group: "cms".to_string(),
            proxy_validity: "192:00".to_string(),
            min_lifetime_hours: 24.0,
            disallowed_prefixes: vec!["/afs".to_string()],
            campaign_prefix: "Run".to_string(),
        }
    }

    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "scratch_root": self.scratch_root,
            "storage": {
                "redirector": self.redirector
            },
            "credential": {
                "default_path": self.default_proxy_path,
                "voms_group": self.voms_group,
                "validity": self.proxy_validity,
                "min_lifetime_hours": self.min_lifetime_hours,
                "disallowed_prefixes": self.disallowed_prefixes
            },
            "catalog": {
                "name_prefix": self.campaign_prefix
            }
        })
    }
}
