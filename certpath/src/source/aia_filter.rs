//! Allow-list consulted before following AIA caIssuers references to remote locations

use std::env;

use log::{error, warn};
use url::Url;
use x509_cert::name::Name;

use crate::util::pdv_utilities::compare_names;

/// Environment variable consulted by [`AiaLocationFilter::from_env`]
pub const ALLOWED_AIA_LOCATIONS_ENV: &str = "CERTPATH_ALLOWED_AIA_LOCATIONS";

const ALLOW_ANY: &str = "any";

/// Schemes that may appear in an allow-list rule
pub const ALLOWED_AIA_SCHEMES: &[&str] = &["http", "https", "ldap", "ldaps", "ftp"];

fn is_ldap_scheme(scheme: &str) -> bool {
    scheme == "ldap" || scheme == "ldaps"
}

fn default_port(url: &Url) -> Option<u16> {
    match url.scheme() {
        "ldap" => url.port().or(Some(389)),
        "ldaps" => url.port().or(Some(636)),
        _ => url.port_or_known_default(),
    }
}

fn path_segments(url: &Url) -> Vec<String> {
    match url.path_segments() {
        Some(segments) => segments
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect(),
        None => vec![],
    }
}

fn base_dn(url: &Url) -> String {
    let path = url.path().trim_start_matches('/');
    percent_encoding::percent_decode_str(path)
        .decode_utf8_lossy()
        .trim()
        .to_string()
}

fn dns_equal(left: &str, right: &str) -> bool {
    if left.eq_ignore_ascii_case(right) {
        return true;
    }
    // RFC 4514 strings are parsed with most significant RDN last
    match (left.parse::<Name>(), right.parse::<Name>()) {
        (Ok(l), Ok(r)) => compare_names(&l, &r),
        _ => false,
    }
}

/// A single allow-list entry
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AiaLocationRule {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: Vec<String>,
    base_dn: Option<String>,
}

impl AiaLocationRule {
    /// Parses a rule. Returns None, after logging a diagnostic, for entries that are not absolute
    /// hierarchical URIs with a host and a supported scheme.
    pub fn parse(entry: &str) -> Option<AiaLocationRule> {
        let url = match Url::parse(entry) {
            Ok(url) => url,
            Err(e) => {
                error!("Ignoring malformed allowed AIA location {}: {}", entry, e);
                return None;
            }
        };
        let scheme = url.scheme().to_lowercase();
        if !ALLOWED_AIA_SCHEMES.contains(&scheme.as_str()) {
            error!(
                "Ignoring allowed AIA location {} with unsupported scheme {}",
                entry, scheme
            );
            return None;
        }
        if url.cannot_be_a_base() {
            error!("Ignoring opaque allowed AIA location {}", entry);
            return None;
        }
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_lowercase(),
            _ => {
                error!("Ignoring allowed AIA location {} with no host", entry);
                return None;
            }
        };
        let (path, base_dn) = if is_ldap_scheme(&scheme) {
            (vec![], Some(base_dn(&url)))
        } else {
            (path_segments(&url), None)
        };
        Some(AiaLocationRule {
            port: default_port(&url),
            scheme,
            host,
            path,
            base_dn,
        })
    }

    /// Returns true if the URI satisfies the rule
    pub fn matches(&self, uri: &Url) -> bool {
        if uri.scheme() != self.scheme {
            return false;
        }
        match uri.host_str() {
            Some(h) if h.eq_ignore_ascii_case(&self.host) => {}
            _ => return false,
        }
        if default_port(uri) != self.port {
            return false;
        }
        if let Some(dn) = &self.base_dn {
            return dns_equal(dn, &base_dn(uri));
        }
        let segments = path_segments(uri);
        segments.len() >= self.path.len() && segments.iter().zip(self.path.iter()).all(|(l, r)| l == r)
    }
}

/// [`AiaLocationFilter`] decides whether a caIssuers URI may be fetched.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum AiaLocationFilter {
    /// No caIssuers URI may be fetched
    #[default]
    Disabled,
    /// Every caIssuers URI may be fetched
    AllowAny,
    /// Only URIs matching at least one rule may be fetched
    Rules(Vec<AiaLocationRule>),
}

impl AiaLocationFilter {
    /// Parses a whitespace separated list of allow-list entries. An empty list yields
    /// [`AiaLocationFilter::Disabled`] and the entry "any" yields [`AiaLocationFilter::AllowAny`].
    pub fn parse(config: &str) -> AiaLocationFilter {
        let entries: Vec<&str> = config.split_whitespace().collect();
        if entries.is_empty() {
            return AiaLocationFilter::Disabled;
        }
        if entries.iter().any(|e| e.eq_ignore_ascii_case(ALLOW_ANY)) {
            warn!("Allowed AIA locations includes \"any\": caIssuers references will be fetched from any location. This is dangerous.");
            return AiaLocationFilter::AllowAny;
        }
        let rules: Vec<AiaLocationRule> = entries
            .iter()
            .filter_map(|e| AiaLocationRule::parse(e))
            .collect();
        if rules.is_empty() {
            return AiaLocationFilter::Disabled;
        }
        AiaLocationFilter::Rules(rules)
    }

    /// Reads the allow-list from the CERTPATH_ALLOWED_AIA_LOCATIONS environment variable.
    pub fn from_env() -> AiaLocationFilter {
        match env::var(ALLOWED_AIA_LOCATIONS_ENV) {
            Ok(v) => AiaLocationFilter::parse(&v),
            Err(_) => AiaLocationFilter::Disabled,
        }
    }

    /// Returns true if the URI may be fetched. Denials are logged.
    pub fn is_allowed(&self, uri: &str) -> bool {
        let rules = match self {
            AiaLocationFilter::Disabled => {
                warn!(
                    "Not fetching {}: following caIssuers references is not enabled",
                    uri
                );
                return false;
            }
            AiaLocationFilter::AllowAny => return true,
            AiaLocationFilter::Rules(rules) => rules,
        };
        let url = match Url::parse(uri) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => {
                warn!("Not fetching malformed caIssuers URI {}", uri);
                return false;
            }
        };
        if rules.iter().any(|r| r.matches(&url)) {
            true
        } else {
            warn!(
                "Not fetching {}: location does not match the allowed AIA locations",
                uri
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let f = AiaLocationFilter::default();
        assert!(!f.is_allowed("http://ca.example.com/certs/leaf.p7c"));
        assert_eq!(AiaLocationFilter::Disabled, AiaLocationFilter::parse("  "));
    }

    #[test]
    fn allow_any() {
        let f = AiaLocationFilter::parse("http://ca.example.com/ any");
        assert_eq!(AiaLocationFilter::AllowAny, f);
        assert!(f.is_allowed("http://evil.example.com/x.p7c"));
    }

    #[test]
    fn http_prefix_rules() {
        let f = AiaLocationFilter::parse("http://ca.example.com/certs/");
        assert!(f.is_allowed("http://ca.example.com/certs/sub/leaf.p7c"));
        assert!(f.is_allowed("http://CA.example.com:80/certs/leaf.p7c"));
        assert!(!f.is_allowed("http://evil.example.com/certs/leaf.p7c"));
        assert!(!f.is_allowed("http://ca.example.com/other/leaf.p7c"));
        assert!(!f.is_allowed("http://ca.example.com/certsx/leaf.p7c"));
        assert!(!f.is_allowed("https://ca.example.com/certs/leaf.p7c"));
        assert!(!f.is_allowed("http://ca.example.com:8080/certs/leaf.p7c"));
        assert!(!f.is_allowed("http://ca.example.com/certs/../private/leaf.p7c"));
    }

    #[test]
    fn ldap_rules() {
        let f = AiaLocationFilter::parse("ldap://ldap.example.com/ou=certs,o=Example");
        assert!(f.is_allowed("ldap://ldap.example.com/ou=certs,o=Example?cACertificate;binary"));
        assert!(f.is_allowed("ldap://ldap.example.com:389/OU=Certs,O=Example"));
        assert!(!f.is_allowed("ldap://ldap.example.com/ou=other,o=Example"));
        assert!(!f.is_allowed("ldaps://ldap.example.com/ou=certs,o=Example"));
    }

    #[test]
    fn malformed_entries_skipped() {
        let f = AiaLocationFilter::parse("notauri mailto:ca@example.com gopher://x.example.com/ http://ca.example.com/");
        match &f {
            AiaLocationFilter::Rules(rules) => assert_eq!(1, rules.len()),
            _ => panic!("expected rules"),
        }
        assert!(f.is_allowed("http://ca.example.com/anything.der"));
        assert_eq!(
            AiaLocationFilter::Disabled,
            AiaLocationFilter::parse("notauri file:///tmp/x")
        );
    }
}
