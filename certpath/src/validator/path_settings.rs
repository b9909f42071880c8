//! Structures and functions related to configuring certification path building and validation

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use log::error;
use serde::{Deserialize, Serialize};

use const_oid::db::rfc5280::ANY_POLICY;
use der::asn1::ObjectIdentifier;

use pkiprocmacros::*;

use crate::source::file_utils::get_file_as_byte_vec;
use crate::source::remote::{timeout_from_millis, RemoteKind, RemoteTimeouts};
use crate::util::error::*;

//-----------------------------------------------------------------------------------------------
// Type definitions used in the definition of path settings
//-----------------------------------------------------------------------------------------------
/// `ObjectIdentifierSet` is a typedef for a set of ObjectIdentifier values.
pub type ObjectIdentifierSet = BTreeSet<ObjectIdentifier>;

/// `Strings` is a typedef for a vector of String values.
pub type Strings = Vec<String>;

/// `PathSettings` maps `PS_*` names to values that govern path building, validation and
/// revocation status determination. Instances serialize to and from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSettings(pub BTreeMap<String, PathSettingsTypes>);

impl PathSettings {
    /// Creates a new empty [`PathSettings`]
    pub fn new() -> Self {
        Self::default()
    }
}

/// `OcspNonceSetting` controls how OCSP responses are processed with respect to nonce values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OcspNonceSetting {
    /// DoNotSendNonce indicates that the OCSP client should not include nonce values in OCSP requests
    DoNotSendNonce,
    /// SendNonceRequireMatch indicates that the OCSP client should include nonce values in OCSP requests
    /// and should fail when responses do not feature the value.
    SendNonceRequireMatch,
    /// SendNonceTolerateMismatchAbsence indicates that the OCSP client should include nonce values in
    /// OCSP requests and should not fail when responses omit the value.
    SendNonceTolerateMismatchAbsence,
}

/// `PathSettingsTypes` is used to define a variant map with types associated with certification
/// path building and validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSettingsTypes {
    /// Represents bool values
    Bool(bool),
    /// Represents i32 values
    I32(i32),
    /// Represents u64 values
    U64(u64),
    /// Represents String values
    String(String),
    /// Represents vectors of Strings
    Strings(Strings),
    /// Represents instruction for nonce handling in OCSP client
    OcspNonceSetting(OcspNonceSetting),
}

//-----------------------------------------------------------------------------------------------
// Types of path settings
//-----------------------------------------------------------------------------------------------
/// `PS_TIME_OF_INTEREST` is used to retrieve a u64 value containing seconds since the Unix epoch at
/// which certificates must be valid. Defaults to the current time. The value may be in the past to
/// support retrospective validation.
pub static PS_TIME_OF_INTEREST: &str = "psTimeOfInterest";

/// `PS_MAX_PATH_LENGTH` is used to retrieve an i32 value limiting the number of CA certificates in
/// a path. -1 means no limit is imposed by the caller, in which case the search stops at
/// [`PS_MAX_PATH_LENGTH_UNCONSTRAINED_DEPTH`] CA certificates.
pub static PS_MAX_PATH_LENGTH: &str = "psMaxPathLength";

/// Depth limit used when `PS_MAX_PATH_LENGTH` is -1
pub const PS_MAX_PATH_LENGTH_UNCONSTRAINED_DEPTH: usize = 15;

/// `PS_INITIAL_EXPLICIT_POLICY_INDICATOR` corresponds to the initial-explicit-policy value described in
/// [RFC 5280 Section 6.1.1]: <https://datatracker.ietf.org/doc/html/rfc5280#section-6.1.1>. By default,
/// this setting is set to false.
pub static PS_INITIAL_EXPLICIT_POLICY_INDICATOR: &str = "psInitialExplicitPolicyIndicator";

/// `PS_INITIAL_POLICY_MAPPING_INHIBIT_INDICATOR` corresponds to the initial-policy-mapping-inhibit
/// value described in [RFC 5280 Section 6.1.1]. By default, this setting is set to false.
pub static PS_INITIAL_POLICY_MAPPING_INHIBIT_INDICATOR: &str =
    "psInitialPolicyMappingInhibitIndicator";

/// `PS_INITIAL_INHIBIT_ANY_POLICY_INDICATOR` corresponds to the initial-any-policy-inhibit value
/// described in [RFC 5280 Section 6.1.1]. By default, this setting is set to false.
pub static PS_INITIAL_INHIBIT_ANY_POLICY_INDICATOR: &str = "psInitialInhibitAnyPolicyIndicator";

/// `PS_INITIAL_POLICY_SET` corresponds to the user-initial-policy-set value described in
/// [RFC 5280 Section 6.1.1]. By default, a set containing anyPolicy is used.
pub static PS_INITIAL_POLICY_SET: &str = "psInitialPolicySet";

/// `PS_FOLLOW_AIA` indicates whether caIssuers URIs from the authority information access
/// extension are used to locate candidate issuers. Defaults to false.
pub static PS_FOLLOW_AIA: &str = "psFollowAia";

/// `PS_ALLOWED_AIA_LOCATIONS` holds whitespace separated allow-list entries for AIA retrieval. When
/// absent, the `CERTPATH_ALLOWED_AIA_LOCATIONS` environment variable is consulted.
pub static PS_ALLOWED_AIA_LOCATIONS: &str = "psAllowedAiaLocations";

/// `PS_CHECK_OCSP_FROM_AIA` indicates whether OCSP responders named in AIA extensions are consulted
/// for the target certificate. Defaults to false.
pub static PS_CHECK_OCSP_FROM_AIA: &str = "psCheckOcspFromAia";

/// `PS_OCSP_USE_GET` indicates whether short OCSP requests may be sent using HTTP GET. Defaults to
/// true. When false, POST is always used.
pub static PS_OCSP_USE_GET: &str = "psOcspUseGet";

/// `PS_OCSP_AIA_NONCE_SETTING` governs nonce handling for OCSP requests. Defaults to
/// [`OcspNonceSetting::DoNotSendNonce`].
pub static PS_OCSP_AIA_NONCE_SETTING: &str = "psOcspAiaNonceSetting";

/// `PS_VALIDATION_VARIANT` names the context in which validation is performed. The value is passed
/// to algorithm constraints when checking OCSP response signatures. Defaults to "generic".
pub static PS_VALIDATION_VARIANT: &str = "psValidationVariant";

/// `PS_DISABLED_ALGORITHMS` holds a comma separated list of disabled algorithm rules. When absent,
/// the process-wide default constraints are used.
pub static PS_DISABLED_ALGORITHMS: &str = "psDisabledAlgorithms";

/// `PS_CONNECT_TIMEOUT` holds a connect timeout in milliseconds applied to all remote interactions.
/// 0 disables the timeout. When absent, environment variables or a 15 second default apply.
pub static PS_CONNECT_TIMEOUT: &str = "psConnectTimeout";

/// `PS_READ_TIMEOUT` holds a read timeout in milliseconds applied to all remote interactions.
/// 0 disables the timeout. When absent, environment variables or a 15 second default apply.
pub static PS_READ_TIMEOUT: &str = "psReadTimeout";

/// `PS_TRUST_ANCHOR_FOLDER` names a folder containing trust anchor certificates
pub static PS_TRUST_ANCHOR_FOLDER: &str = "psTrustAnchorFolder";

/// `PS_CERTIFICATION_AUTHORITY_FOLDER` names a folder containing intermediate CA certificates
pub static PS_CERTIFICATION_AUTHORITY_FOLDER: &str = "psCertificationAuthorityFolder";

/// Default validation variant
pub static VARIANT_GENERIC: &str = "generic";

//-----------------------------------------------------------------------------------------------
// Getters/setters for settings
//-----------------------------------------------------------------------------------------------
ps_gets_and_sets_with_default!(PS_MAX_PATH_LENGTH, i32, -1);
ps_gets_and_sets_with_default!(PS_INITIAL_EXPLICIT_POLICY_INDICATOR, bool, false);
ps_gets_and_sets_with_default!(PS_INITIAL_POLICY_MAPPING_INHIBIT_INDICATOR, bool, false);
ps_gets_and_sets_with_default!(PS_INITIAL_INHIBIT_ANY_POLICY_INDICATOR, bool, false);
ps_gets_and_sets_with_default!(PS_FOLLOW_AIA, bool, false);
ps_gets_and_sets!(PS_ALLOWED_AIA_LOCATIONS, String);
ps_gets_and_sets_with_default!(PS_CHECK_OCSP_FROM_AIA, bool, false);
ps_gets_and_sets_with_default!(PS_OCSP_USE_GET, bool, true);
ps_gets_and_sets_with_default!(
    PS_OCSP_AIA_NONCE_SETTING,
    OcspNonceSetting,
    OcspNonceSetting::DoNotSendNonce
);
ps_gets_and_sets_with_default!(PS_VALIDATION_VARIANT, String, VARIANT_GENERIC.to_string());
ps_gets_and_sets!(PS_DISABLED_ALGORITHMS, String);
ps_gets_and_sets!(PS_CONNECT_TIMEOUT, u64);
ps_gets_and_sets!(PS_READ_TIMEOUT, u64);
ps_gets_and_sets!(PS_TRUST_ANCHOR_FOLDER, String);
ps_gets_and_sets!(PS_CERTIFICATION_AUTHORITY_FOLDER, String);

impl PathSettings {
    /// `get_time_of_interest` is used to retrieve `PS_TIME_OF_INTEREST` from a [`PathSettings`]
    /// instance, defaulting to the current time.
    pub fn get_time_of_interest(&self) -> u64 {
        match self.0.get(PS_TIME_OF_INTEREST) {
            Some(PathSettingsTypes::U64(v)) => *v,
            _ => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// `set_time_of_interest` is used to set `PS_TIME_OF_INTEREST` in a [`PathSettings`] instance
    pub fn set_time_of_interest(&mut self, v: u64) {
        self.0
            .insert(PS_TIME_OF_INTEREST.to_string(), PathSettingsTypes::U64(v));
    }

    /// `get_initial_policy_set` is used to retrieve `PS_INITIAL_POLICY_SET` items from a [`PathSettings`] instance
    pub fn get_initial_policy_set(&self) -> Strings {
        match self.0.get(PS_INITIAL_POLICY_SET) {
            Some(PathSettingsTypes::Strings(v)) => v.clone(),
            _ => vec![ANY_POLICY.to_string()],
        }
    }

    /// `set_initial_policy_set` is used to set `PS_INITIAL_POLICY_SET` items in a [`PathSettings`] instance
    pub fn set_initial_policy_set(&mut self, v: Strings) {
        self.0
            .insert(PS_INITIAL_POLICY_SET.to_string(), PathSettingsTypes::Strings(v));
    }

    /// `set_initial_policy_set_from_oid_set` sets `PS_INITIAL_POLICY_SET` given an ObjectIdentifierSet
    pub fn set_initial_policy_set_from_oid_set(&mut self, v: ObjectIdentifierSet) {
        self.set_initial_policy_set(v.iter().map(|o| o.to_string()).collect());
    }

    /// `get_initial_policy_set_as_oid_set` retrieves `PS_INITIAL_POLICY_SET` as an ObjectIdentifierSet.
    /// Entries that are not valid dotted OIDs are logged and skipped.
    pub fn get_initial_policy_set_as_oid_set(&self) -> ObjectIdentifierSet {
        let mut bts = BTreeSet::new();
        for s in self.get_initial_policy_set() {
            match ObjectIdentifier::from_str(s.as_str()) {
                Ok(oid) => {
                    bts.insert(oid);
                }
                Err(_) => error!("Ignoring invalid policy OID {} in initial policy set", s),
            }
        }
        bts
    }

    /// Returns the depth limit for path building: the maximum path length if one was set, else
    /// [`PS_MAX_PATH_LENGTH_UNCONSTRAINED_DEPTH`].
    pub fn get_effective_max_path_length(&self) -> usize {
        let mpl = self.get_max_path_length();
        if mpl < 0 {
            PS_MAX_PATH_LENGTH_UNCONSTRAINED_DEPTH
        } else {
            mpl as usize
        }
    }

    /// Returns connect and read timeouts for the indicated kind of remote interaction. Values from
    /// `PS_CONNECT_TIMEOUT` and `PS_READ_TIMEOUT` take precedence over environment variables.
    pub fn get_remote_timeouts(&self, kind: RemoteKind) -> RemoteTimeouts {
        let mut timeouts = RemoteTimeouts::from_env(kind);
        if let Some(ms) = self.get_connect_timeout() {
            timeouts.connect = timeout_from_millis(ms);
        }
        if let Some(ms) = self.get_read_timeout() {
            timeouts.read = timeout_from_millis(ms);
        }
        timeouts
    }
}

/// `read_settings` accepts a string containing the name of a file that notionally contains JSON data that
/// represents [`PathSettings`]. An empty settings object is returned when no file name is provided.
pub fn read_settings(fname: &Option<String>) -> Result<PathSettings> {
    if let Some(fname) = fname {
        let p = Path::new(fname.as_str());
        if !Path::exists(p) {
            error!("Settings file {} does not exist", fname);
            return Err(Error::NotFound);
        }
        let json = get_file_as_byte_vec(p)?;
        return match serde_json::from_slice::<PathSettings>(&json) {
            Ok(ps) => Ok(ps),
            Err(e) => {
                error!("Failed to parse settings file {}: {}", fname, e);
                Err(Error::ParseError)
            }
        };
    }
    Ok(PathSettings::new())
}

/// `write_settings` serializes [`PathSettings`] as JSON to the named file.
pub fn write_settings(fname: &str, ps: &PathSettings) -> Result<()> {
    let json = match serde_json::to_vec_pretty(ps) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize settings: {}", e);
            return Err(Error::ParseError);
        }
    };
    std::fs::write(fname, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_gets_ps() {
        let ps = PathSettings::default();

        assert!(!ps.get_initial_explicit_policy_indicator());
        assert!(!ps.get_initial_policy_mapping_inhibit_indicator());
        assert!(!ps.get_initial_inhibit_any_policy_indicator());
        assert_eq!(-1, ps.get_max_path_length());
        assert_eq!(15, ps.get_effective_max_path_length());
        assert!(!ps.get_follow_aia());
        assert!(!ps.get_check_ocsp_from_aia());
        assert!(ps.get_ocsp_use_get());
        assert_eq!(
            OcspNonceSetting::DoNotSendNonce,
            ps.get_ocsp_aia_nonce_setting()
        );
        assert_eq!("generic", ps.get_validation_variant());
        assert_eq!(vec![ANY_POLICY.to_string()], ps.get_initial_policy_set());
        assert!(ps.get_initial_policy_set_as_oid_set().contains(&ANY_POLICY));

        let before = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        assert!(ps.get_time_of_interest() >= before.as_secs());
    }

    #[test]
    fn test_no_default_gets_ps() {
        let ps = PathSettings::default();
        assert_eq!(None, ps.get_allowed_aia_locations());
        assert_eq!(None, ps.get_disabled_algorithms());
        assert_eq!(None, ps.get_connect_timeout());
        assert_eq!(None, ps.get_read_timeout());
        assert_eq!(None, ps.get_trust_anchor_folder());
        assert_eq!(None, ps.get_certification_authority_folder());
    }

    #[test]
    fn test_sets_ps() {
        let mut ps = PathSettings::default();
        ps.set_time_of_interest(1798761600);
        assert_eq!(1798761600, ps.get_time_of_interest());
        ps.set_max_path_length(2);
        assert_eq!(2, ps.get_effective_max_path_length());
        ps.set_initial_explicit_policy_indicator(true);
        assert!(ps.get_initial_explicit_policy_indicator());
        ps.set_follow_aia(true);
        assert!(ps.get_follow_aia());
        ps.set_allowed_aia_locations("http://ca.example.com/certs/".to_string());
        assert_eq!(
            Some("http://ca.example.com/certs/".to_string()),
            ps.get_allowed_aia_locations()
        );
        ps.set_ocsp_aia_nonce_setting(OcspNonceSetting::SendNonceRequireMatch);
        assert_eq!(
            OcspNonceSetting::SendNonceRequireMatch,
            ps.get_ocsp_aia_nonce_setting()
        );

        let mut oids = ObjectIdentifierSet::new();
        oids.insert(ObjectIdentifier::new_unwrap("2.16.840.1.101.3.2.1.48.1"));
        ps.set_initial_policy_set_from_oid_set(oids.clone());
        assert_eq!(oids, ps.get_initial_policy_set_as_oid_set());

        ps.set_initial_policy_set(vec!["not an oid".to_string()]);
        assert!(ps.get_initial_policy_set_as_oid_set().is_empty());

        // a value of the wrong type is treated as absent
        ps.0.insert(PS_FOLLOW_AIA.to_string(), PathSettingsTypes::U64(1));
        assert!(!ps.get_follow_aia());
    }

    #[test]
    fn test_timeouts_from_settings() {
        let mut ps = PathSettings::default();
        ps.set_connect_timeout(0);
        ps.set_read_timeout(2000);
        let t = ps.get_remote_timeouts(RemoteKind::Ocsp);
        assert_eq!(None, t.connect);
        assert_eq!(Some(Duration::from_millis(2000)), t.read);
    }

    #[test]
    fn test_settings_file_round_trip() {
        let mut ps = PathSettings::default();
        ps.set_time_of_interest(1798761600);
        ps.set_max_path_length(3);
        ps.set_ocsp_aia_nonce_setting(OcspNonceSetting::SendNonceTolerateMismatchAbsence);
        ps.set_trust_anchor_folder("tas".to_string());

        let dir = tempfile::tempdir().unwrap();
        let fname = dir.path().join("settings.json");
        let fname = fname.to_str().unwrap().to_string();
        write_settings(&fname, &ps).unwrap();
        let read = read_settings(&Some(fname)).unwrap();
        assert_eq!(ps, read);

        assert_eq!(PathSettings::new(), read_settings(&None).unwrap());
        assert_eq!(
            Err(Error::NotFound),
            read_settings(&Some("no/such/settings.json".to_string()))
        );

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, b"{ not json").unwrap();
        assert_eq!(
            Err(Error::ParseError),
            read_settings(&Some(bad.to_str().unwrap().to_string()))
        );
    }
}
