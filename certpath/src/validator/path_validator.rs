//! Validation of a completed certification path, performed anchor-adjacent first as described in
//! [RFC 5280 Section 6.1]: <https://datatracker.ietf.org/doc/html/rfc5280.html#section-6.1>.
//!
//! The path builder discovers paths target first. Once a candidate path reaches a trust anchor,
//! [`validate_path`] evaluates the path in the opposite direction, threading the working public
//! key, name constraints, policy state and algorithm context from certificate to certificate.

use std::collections::BTreeSet;

use const_oid::db::rfc5912::{
    ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES, ID_CE_EXT_KEY_USAGE,
    ID_CE_INHIBIT_ANY_POLICY, ID_CE_KEY_USAGE, ID_CE_NAME_CONSTRAINTS, ID_CE_POLICY_CONSTRAINTS,
    ID_CE_POLICY_MAPPINGS, ID_CE_SUBJECT_ALT_NAME,
};
use der::asn1::ObjectIdentifier;
use der::Decode;
use log::{error, info};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;

use crate::environment::pki_environment::PkiEnvironment;
use crate::util::error::*;
use crate::util::pdv_utilities::*;
use crate::validator::algorithm_checker::*;
use crate::validator::cert_path::CertificationPath;
use crate::validator::path_settings::*;
use crate::validator::pdv_certificate::*;
use crate::validator::pdv_extension::*;
use crate::validator::policy_checker::*;

/// Extensions processed by path building and validation. Critical extensions outside this list
/// (and outside the list supported by caller supplied checkers) cause a certificate to be rejected.
pub const PROCESSED_EXTENSIONS: &[ObjectIdentifier] = &[
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_NAME_CONSTRAINTS,
    ID_CE_CERTIFICATE_POLICIES,
    ID_CE_POLICY_MAPPINGS,
    ID_CE_POLICY_CONSTRAINTS,
    ID_CE_INHIBIT_ANY_POLICY,
    ID_CE_SUBJECT_ALT_NAME,
    ID_CE_KEY_USAGE,
    ID_CE_EXT_KEY_USAGE,
];

/// Outcome of successful path validation
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathValidationResult {
    /// Policies valid for the path. Empty when the valid_policy_tree is NULL.
    pub valid_policies: ObjectIdentifierSet,
    /// Public key of the target certificate, with any inherited DSA parameters applied
    pub working_public_key: SubjectPublicKeyInfoOwned,
}

/// `validate_path` validates a completed [`CertificationPath`]. `supported_extensions` lists
/// extensions handled by caller supplied checkers in addition to [`PROCESSED_EXTENSIONS`].
pub fn validate_path(
    pe: &PkiEnvironment,
    ps: &PathSettings,
    cp: &CertificationPath,
    supported_extensions: &BTreeSet<ObjectIdentifier>,
) -> Result<PathValidationResult> {
    if cp.is_empty() {
        return Err(Error::PathValidation(
            PathValidationStatus::MissingCertificate,
        ));
    }

    check_validity(ps, cp)?;
    check_basic_constraints(cp)?;
    check_key_usage(cp)?;
    check_names(cp)?;
    check_critical_extensions(cp, supported_extensions)?;
    let valid_policies = check_certificate_policies(ps, cp)?;
    let working_public_key = check_algorithm_constraints(pe, ps, cp)?;
    verify_signatures(pe, cp)?;

    if let Some(target) = cp.target() {
        info!(
            "Successfully completed path validation checks for certificate issued to {}",
            name_to_string(target.subject())
        );
    }
    Ok(PathValidationResult {
        valid_policies,
        working_public_key,
    })
}

/// Returns the certificates of the path ordered anchor-adjacent first
fn anchor_first(cp: &CertificationPath) -> impl Iterator<Item = &PDVCertificate> {
    cp.certificates.iter().rev()
}

//-----------------------------------------------------------------------------
// Functions that perform some small aspect of path validation
//-----------------------------------------------------------------------------
/// `check_validity` evaluates each certificate against `PS_TIME_OF_INTEREST`.
pub fn check_validity(ps: &PathSettings, cp: &CertificationPath) -> Result<()> {
    let toi = ps.get_time_of_interest();
    for cert in anchor_first(cp) {
        valid_at_time(&cert.decoded_cert.tbs_certificate, toi, false)?;
    }
    Ok(())
}

/// `check_basic_constraints` ensures all intermediate CA certificates feature a basicConstraints extension
/// with the cA field set to true and that the certificate path length does not violate length constraints
/// (RFC 5280 6.1.4 (k), (l) and (m)).
pub fn check_basic_constraints(cp: &CertificationPath) -> Result<()> {
    let mut max_path_length = cp.len();
    for ca_cert in cp.intermediates().iter().rev() {
        // (l)
        if !ca_cert.is_self_issued() {
            if 0 == max_path_length {
                log_error_for_ca(ca_cert, "path length constraint violation");
                return Err(Error::PathValidation(
                    PathValidationStatus::InvalidPathLength,
                ));
            }
            max_path_length -= 1;
        }

        // (k)
        let bc = match ca_cert.basic_constraints() {
            Some(bc) => bc,
            None => {
                log_error_for_ca(ca_cert, "missing basic constraints");
                return Err(Error::PathValidation(
                    PathValidationStatus::MissingBasicConstraints,
                ));
            }
        };
        if !bc.ca {
            log_error_for_ca(ca_cert, "invalid basic constraints");
            return Err(Error::PathValidation(
                PathValidationStatus::InvalidBasicConstraints,
            ));
        }

        // (m)
        if let Some(pl) = bc.path_len_constraint {
            max_path_length = max_path_length.min(pl as usize);
        }
    }
    Ok(())
}

/// `check_key_usage` requires keyCertSign in intermediate CA certificates that include a key usage
/// extension (RFC 5280 6.1.4 (n)).
pub fn check_key_usage(cp: &CertificationPath) -> Result<()> {
    for ca_cert in cp.intermediates() {
        if let Some(ku) = ca_cert.key_usage_bits()? {
            if !ku[5] {
                log_error_for_ca(ca_cert, "key usage does not include keyCertSign");
                return Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage));
            }
        }
    }
    Ok(())
}

/// Accumulated name constraints state. Each entry of a permitted list must be satisfied, which
/// is equivalent to satisfying the intersection of the permitted subtrees.
#[derive(Default)]
struct NameConstraintsState {
    permitted_dns: Vec<Vec<Name>>,
    excluded_dns: Vec<Name>,
    permitted_hosts: Vec<Vec<String>>,
    excluded_hosts: Vec<String>,
}

impl NameConstraintsState {
    fn dn_permitted(&self, name: &Name) -> bool {
        if name.0.is_empty() {
            return true;
        }
        if self.excluded_dns.iter().any(|s| descended_from_dn(s, name)) {
            return false;
        }
        self.permitted_dns
            .iter()
            .all(|set| set.iter().any(|s| descended_from_dn(s, name)))
    }

    fn host_permitted(&self, host: &str) -> bool {
        if self
            .excluded_hosts
            .iter()
            .any(|s| descended_from_host(s, host))
        {
            return false;
        }
        self.permitted_hosts
            .iter()
            .all(|set| set.iter().any(|s| descended_from_host(s, host)))
    }

    fn check(&self, cert: &PDVCertificate) -> bool {
        if !self.dn_permitted(cert.subject()) {
            return false;
        }
        if let Ok(Some(PDVExtension::SubjectAltName(san))) =
            cert.get_extension(&ID_CE_SUBJECT_ALT_NAME)
        {
            for gn in &san.0 {
                let ok = match gn {
                    GeneralName::DirectoryName(dn) => self.dn_permitted(dn),
                    GeneralName::DnsName(dns) => self.host_permitted(dns.as_str()),
                    _ => true,
                };
                if !ok {
                    return false;
                }
            }
        }
        true
    }

    fn add(&mut self, cert: &PDVCertificate) {
        let nc = match cert.get_extension(&ID_CE_NAME_CONSTRAINTS) {
            Ok(Some(PDVExtension::NameConstraints(nc))) => nc,
            _ => return,
        };
        if let Some(permitted) = &nc.permitted_subtrees {
            let mut dns = vec![];
            let mut hosts = vec![];
            for subtree in permitted {
                match &subtree.base {
                    GeneralName::DirectoryName(dn) => dns.push(dn.clone()),
                    GeneralName::DnsName(host) => hosts.push(host.as_str().to_string()),
                    _ => {}
                }
            }
            if !dns.is_empty() {
                self.permitted_dns.push(dns);
            }
            if !hosts.is_empty() {
                self.permitted_hosts.push(hosts);
            }
        }
        if let Some(excluded) = &nc.excluded_subtrees {
            for subtree in excluded {
                match &subtree.base {
                    GeneralName::DirectoryName(dn) => self.excluded_dns.push(dn.clone()),
                    GeneralName::DnsName(host) => {
                        self.excluded_hosts.push(host.as_str().to_string())
                    },
                    _ => {}
                }
            }
        }
    }
}

/// `check_names` verifies name chaining and enforces name constraints on directory names and DNS
/// names (RFC 5280 6.1.3 (a)(4), (b), (c) and 6.1.4 (g)).
pub fn check_names(cp: &CertificationPath) -> Result<()> {
    let mut working_issuer_name = cp.trust_anchor.subject();
    let mut state = NameConstraintsState::default();
    let n = cp.len();
    for (i, cert) in anchor_first(cp).enumerate() {
        if !compare_names(working_issuer_name, cert.issuer()) {
            log_error_for_ca(cert, "issuer name does not match working issuer name");
            return Err(Error::PathValidation(
                PathValidationStatus::NameChainingFailure,
            ));
        }

        let is_final = i + 1 == n;
        if (is_final || !cert.is_self_issued()) && !state.check(cert) {
            log_error_for_ca(cert, "name constraints violation");
            return Err(Error::PathValidation(
                PathValidationStatus::NameConstraintsViolation,
            ));
        }

        if !is_final {
            state.add(cert);
        }
        working_issuer_name = cert.subject();
    }
    Ok(())
}

/// `check_critical_extensions` rejects certificates bearing critical extensions that are neither in
/// [`PROCESSED_EXTENSIONS`] nor in `supported_extensions`.
pub fn check_critical_extensions(
    cp: &CertificationPath,
    supported_extensions: &BTreeSet<ObjectIdentifier>,
) -> Result<()> {
    for cert in anchor_first(cp) {
        for oid in cert.critical_extensions() {
            if !PROCESSED_EXTENSIONS.contains(&oid) && !supported_extensions.contains(&oid) {
                log_error_for_ca(
                    cert,
                    format!("unprocessed critical extension {}", oid).as_str(),
                );
                return Err(Error::PathValidation(
                    PathValidationStatus::UnprocessedCriticalExtension,
                ));
            }
        }
    }
    Ok(())
}

/// `check_certificate_policies` performs policy processing using the PS_INITIAL_* values in the
/// [`PathSettings`] and returns the set of valid policies.
pub fn check_certificate_policies(
    ps: &PathSettings,
    cp: &CertificationPath,
) -> Result<ObjectIdentifierSet> {
    let checker = PolicyChecker::from_settings(ps);
    let mut state = checker.init(cp.len());
    for cert in anchor_first(cp) {
        checker.check(&mut state, cert)?;
    }
    match cp.target() {
        Some(target) => checker.finish(&mut state, target),
        None => Ok(ObjectIdentifierSet::new()),
    }
}

/// `check_algorithm_constraints` runs the [`AlgorithmChecker`] over the path, seeded with the trust
/// anchor key, and returns the final working public key.
pub fn check_algorithm_constraints(
    pe: &PkiEnvironment,
    ps: &PathSettings,
    cp: &CertificationPath,
) -> Result<SubjectPublicKeyInfoOwned> {
    let checker = AlgorithmChecker::new(
        pe.algorithm_constraints(),
        Some(&cp.trust_anchor),
        &ps.get_validation_variant(),
    );
    let mut ctx = checker.init(false)?;
    for cert in anchor_first(cp) {
        ctx = checker.check(&ctx, cert)?;
    }
    match ctx.prev_pub_key {
        Some(key) => Ok(key),
        None => Err(Error::Unrecognized),
    }
}

/// `verify_signatures` verifies each certificate signature using the public key of the superior
/// certificate, beginning with the trust anchor key.
pub fn verify_signatures(pe: &PkiEnvironment, cp: &CertificationPath) -> Result<()> {
    let mut working_spki = cp.trust_anchor.public_key();
    for cert in anchor_first(cp) {
        verify_certificate_signature(pe, cert, working_spki)?;
        working_spki = cert.public_key();
    }
    Ok(())
}

/// `verify_certificate_signature` verifies the signature on `cert` using `spki`.
pub fn verify_certificate_signature(
    pe: &PkiEnvironment,
    cert: &PDVCertificate,
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<()> {
    let defer_cert = match DeferDecodeSigned::from_der(cert.encoded_cert.as_slice()) {
        Ok(dc) => dc,
        Err(e) => {
            error!("Failed to parse certificate for signature verification: {}", e);
            return Err(Error::Asn1Error(e));
        }
    };
    if let Err(e) = pe.verify_signature_message(
        pe,
        &defer_cert.tbs_field,
        defer_cert.signature.raw_bytes(),
        &defer_cert.signature_algorithm,
        spki,
    ) {
        log_error_for_ca(
            cert,
            format!("signature verification error: {}", e).as_str(),
        );
        return Err(Error::PathValidation(
            PathValidationStatus::SignatureVerificationFailure,
        ));
    }
    Ok(())
}
