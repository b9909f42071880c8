//! Selectors used to query certificate stores for certificates and CRLs

use std::collections::BTreeSet;

use der::asn1::ObjectIdentifier;
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::crl::CertificateList;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::util::pdv_utilities::{compare_names, valid_at_time};
use crate::PDVCertificate;

/// Basic constraints criterion value that matches any certificate
pub const BC_ANY: i32 = -1;

/// Basic constraints criterion value that matches only end entity certificates
pub const BC_END_ENTITY_ONLY: i32 = -2;

/// [`CertSelector`] describes criteria a certificate must satisfy. Criteria that are not set are
/// not evaluated, so `CertSelector::default()` matches every certificate.
#[derive(Clone, Debug)]
pub struct CertSelector {
    /// Required subject name
    pub subject: Option<Name>,
    /// Required issuer name
    pub issuer: Option<Name>,
    /// Required serial number
    pub serial_number: Option<SerialNumber>,
    /// Required certificate (exact match over the encoding)
    pub certificate: Option<PDVCertificate>,
    /// Required subject key identifier
    pub subject_key_identifier: Option<Vec<u8>>,
    /// Required subject public key
    pub subject_public_key: Option<SubjectPublicKeyInfoOwned>,
    /// [`BC_ANY`], [`BC_END_ENTITY_ONLY`] or a value of zero or more requiring a CA certificate
    /// whose path length constraint (if any) is at least the value.
    pub basic_constraints: i32,
    /// Time, in seconds since the Unix epoch, at which the certificate must be valid
    pub certificate_valid: Option<u64>,
    /// When set, the certificate must assert at least one of the policies. An empty set requires
    /// only that a certificate policies extension is present.
    pub policy: Option<BTreeSet<ObjectIdentifier>>,
    /// Key usage bits that must be asserted, indexed per RFC 5280
    pub key_usage: Option<Vec<bool>>,
}

impl Default for CertSelector {
    fn default() -> Self {
        CertSelector {
            subject: None,
            issuer: None,
            serial_number: None,
            certificate: None,
            subject_key_identifier: None,
            subject_public_key: None,
            basic_constraints: BC_ANY,
            certificate_valid: None,
            policy: None,
            key_usage: None,
        }
    }
}

impl CertSelector {
    /// Returns a selector that matches exactly the given certificate
    pub fn for_certificate(cert: &PDVCertificate) -> Self {
        CertSelector {
            certificate: Some(cert.clone()),
            ..Default::default()
        }
    }

    /// Returns a selector that matches certificates with the given subject name
    pub fn for_subject(subject: &Name) -> Self {
        CertSelector {
            subject: Some(subject.clone()),
            ..Default::default()
        }
    }

    /// Returns true if the selector can only match CA certificates or places no constraint on the
    /// CA flag.
    pub fn allows_ca(&self) -> bool {
        self.basic_constraints != BC_END_ENTITY_ONLY
    }

    /// Returns true if the certificate satisfies every criterion that is set.
    pub fn matches(&self, cert: &PDVCertificate) -> bool {
        if let Some(c) = &self.certificate {
            if c != cert {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if !compare_names(subject, cert.subject()) {
                return false;
            }
        }
        if let Some(issuer) = &self.issuer {
            if !compare_names(issuer, cert.issuer()) {
                return false;
            }
        }
        if let Some(serial) = &self.serial_number {
            if serial != cert.serial_number() {
                return false;
            }
        }
        if let Some(skid) = &self.subject_key_identifier {
            match cert.subject_key_identifier() {
                Some(cert_skid) if cert_skid == skid.as_slice() => {}
                _ => return false,
            }
        }
        if let Some(spki) = &self.subject_public_key {
            if spki != cert.public_key() {
                return false;
            }
        }
        if !self.matches_basic_constraints(cert) {
            return false;
        }
        if let Some(toi) = self.certificate_valid {
            if valid_at_time(&cert.decoded_cert.tbs_certificate, toi, true).is_err() {
                return false;
            }
        }
        if let Some(policies) = &self.policy {
            match cert.policy_oids() {
                Some(cert_policies) => {
                    if !policies.is_empty() && !cert_policies.iter().any(|p| policies.contains(p))
                    {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(required) = &self.key_usage {
            if let Ok(Some(ku)) = cert.key_usage_bits() {
                for (i, bit) in required.iter().enumerate() {
                    if *bit && !ku.get(i).copied().unwrap_or(false) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn matches_basic_constraints(&self, cert: &PDVCertificate) -> bool {
        if BC_ANY == self.basic_constraints {
            return true;
        }
        let bc = cert.basic_constraints().filter(|bc| bc.ca);
        if BC_END_ENTITY_ONLY == self.basic_constraints {
            return bc.is_none();
        }
        match bc {
            Some(bc) => match bc.path_len_constraint {
                Some(pl) => i32::from(pl) >= self.basic_constraints,
                None => true,
            },
            None => false,
        }
    }
}

/// [`CrlSelector`] describes criteria a CRL must satisfy.
#[derive(Clone, Debug, Default)]
pub struct CrlSelector {
    /// When non-empty, the CRL issuer must match one of these names
    pub issuer_names: Vec<Name>,
    /// Time, in seconds since the Unix epoch, that must fall between thisUpdate and nextUpdate
    pub date: Option<u64>,
}

impl CrlSelector {
    /// Returns true if the CRL satisfies every criterion that is set.
    pub fn matches(&self, crl: &CertificateList) -> bool {
        if !self.issuer_names.is_empty()
            && !self
                .issuer_names
                .iter()
                .any(|n| compare_names(n, &crl.tbs_cert_list.issuer))
        {
            return false;
        }
        if let Some(date) = self.date {
            let this_update = crl.tbs_cert_list.this_update.to_unix_duration().as_secs();
            if this_update > date {
                return false;
            }
            if let Some(nu) = crl.tbs_cert_list.next_update {
                if nu.to_unix_duration().as_secs() < date {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_cert;
    use std::str::FromStr;

    fn ee() -> PDVCertificate {
        parse_cert(include_bytes!("../../tests/examples/ee.der"), "ee.der").unwrap()
    }

    fn inter() -> PDVCertificate {
        parse_cert(include_bytes!("../../tests/examples/inter.der"), "inter.der").unwrap()
    }

    #[test]
    fn basic_constraints_selection() {
        let mut sel = CertSelector {
            basic_constraints: BC_END_ENTITY_ONLY,
            ..Default::default()
        };
        assert!(sel.matches(&ee()));
        assert!(!sel.matches(&inter()));
        assert!(!sel.allows_ca());

        // intermediate asserts a path length constraint of zero
        sel.basic_constraints = 0;
        assert!(!sel.matches(&ee()));
        assert!(sel.matches(&inter()));
        sel.basic_constraints = 1;
        assert!(!sel.matches(&inter()));
    }

    #[test]
    fn name_and_date_selection() {
        let inter = inter();
        let sel = CertSelector::for_subject(inter.subject());
        assert!(sel.matches(&inter));
        assert!(!sel.matches(&ee()));

        let sel = CertSelector {
            issuer: Some(Name::from_str("CN=Test Root CA,O=Example Org,C=US").unwrap()),
            certificate_valid: Some(1798761600),
            ..Default::default()
        };
        assert!(sel.matches(&inter));
        let sel = CertSelector {
            certificate_valid: Some(1577836800),
            ..Default::default()
        };
        assert!(!sel.matches(&inter));
    }

    #[test]
    fn skid_selection() {
        let inter = inter();
        let sel = CertSelector {
            subject_key_identifier: Some(
                hex_literal::hex!("A05E4D83DA28A64C37BC3F903564FD1A78DD6B50").to_vec(),
            ),
            ..Default::default()
        };
        assert!(sel.matches(&inter));
        assert!(CertSelector::for_certificate(&inter).matches(&inter));
        assert!(!CertSelector::for_certificate(&inter).matches(&ee()));
    }
}
