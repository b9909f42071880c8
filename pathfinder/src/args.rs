//! Arguments for the pathfinder utility

use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Certification path builder and validator
#[derive(Parser, Debug, Serialize, Deserialize, Default)]
#[command(arg_required_else_help(true))]
#[clap(author, version, about, long_about = None)]
pub struct PathfinderArgs {
    /// Full path of folder containing binary DER-encoded trust anchors. When absent, the
    /// psTrustAnchorFolder value from the settings file is used.
    #[clap(short, long, help_heading = "COMMON OPTIONS")]
    pub ta_folder: Option<String>,

    /// Full path of folder containing binary DER-encoded intermediate CA certificates. When absent,
    /// the psCertificationAuthorityFolder value from the settings file is used, if any.
    #[clap(short, long, help_heading = "COMMON OPTIONS")]
    pub ca_folder: Option<String>,

    /// Time to use for path validation expressed as the number of seconds since Unix epoch
    /// (defaults to the value from the settings file, else current system time). Use 0 to skip
    /// validity checks.
    #[clap(short = 'i', long, help_heading = "COMMON OPTIONS")]
    pub time_of_interest: Option<u64>,

    /// Full path and filename of JSON-formatted path settings.
    #[clap(short, long, help_heading = "COMMON OPTIONS")]
    pub settings: Option<String>,

    /// Full path and filename of YAML-formatted configuration file for log4rs logging mechanism.
    /// See <https://docs.rs/log4rs/latest/log4rs/> for details.
    #[clap(short, long, help_heading = "COMMON OPTIONS")]
    pub logging_config: Option<String>,

    /// Full path and filename of a binary DER-encoded or PEM-encoded certificate to build a path for.
    #[clap(short, long, help_heading = "BUILDING")]
    pub end_entity_file: Option<String>,

    /// Maximum number of intermediate CA certificates in a path (-1 for no limit).
    #[clap(short, long, allow_negative_numbers = true, help_heading = "BUILDING")]
    pub max_path_length: Option<i32>,

    /// Follow caIssuers references from authority information access extensions when locating
    /// intermediate CA certificates.
    #[clap(short = 'y', long, help_heading = "BUILDING")]
    pub follow_aia: bool,

    /// Whitespace separated list of locations caIssuers references may be fetched from, i.e.,
    /// "http://ca.example.com/certs ldap://dir.example.com". Use "any" to allow every location.
    /// When absent, the settings file and then the CERTPATH_ALLOWED_AIA_LOCATIONS environment
    /// variable are consulted.
    #[clap(short = 'w', long, help_heading = "BUILDING")]
    pub allowed_aia_locations: Option<String>,

    /// Check the status of the end entity certificate using the OCSP responder named in its
    /// authority information access extension.
    #[clap(short = 'o', long, help_heading = "REVOCATION")]
    pub check_ocsp: bool,
}

/// Returns the current time as seconds since the Unix epoch
pub fn get_now_as_unix_epoch() -> u64 {
    if let Ok(n) = SystemTime::now().duration_since(UNIX_EPOCH) {
        n.as_secs()
    } else {
        0
    }
}
