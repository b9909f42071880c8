//! Utility functions that support certification path processing

use lazy_static::lazy_static;
use log::{debug, error};
use regex::Regex;

use const_oid::db::rfc5912::{ID_AD_CA_ISSUERS, ID_AD_OCSP, ID_PE_AUTHORITY_INFO_ACCESS};
use der::asn1::{Ia5String, PrintableString, Utf8StringRef};
use der::{asn1::ObjectIdentifier, Decode, Encode, Tagged};
use spki::{AlgorithmIdentifier, AlgorithmIdentifierOwned};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::pkix::{name::GeneralName, AuthorityInfoAccessSyntax};
use x509_cert::name::{Name, RelativeDistinguishedName};
use x509_cert::{Certificate, TbsCertificate};

use crate::{
    environment::pki_environment::PkiEnvironment, pdv_certificate::*, util::error::*,
    util::pdv_alg_oids::*,
};
use crate::validator::pdv_extension::{ExtensionProcessing, PDVExtension};

/// countryName attribute type (2.5.4.6)
pub const ID_AT_COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
/// localityName attribute type (2.5.4.7)
pub const ID_AT_LOCALITY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
/// stateOrProvinceName attribute type (2.5.4.8)
pub const ID_AT_STATE_OR_PROVINCE_NAME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.4.8");
/// streetAddress attribute type (2.5.4.9)
pub const ID_AT_STREET_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");

lazy_static! {
    static ref WHITESPACE_RUN: Option<Regex> = Regex::new(r"\s+").ok();
}

/// `is_self_signed_with_buffer` returns true if the public key in the parsed certificate can be
/// used to verify the TBSCertificate field as parsed from the encoded certificate object.
pub fn is_self_signed_with_buffer(pe: &PkiEnvironment, cert: &Certificate, enc_cert: &[u8]) -> bool {
    match DeferDecodeSigned::from_der(enc_cert) {
        Ok(defer_cert) => pe
            .verify_signature_message(
                pe,
                &defer_cert.tbs_field,
                cert.signature.raw_bytes(),
                &cert.tbs_certificate.signature,
                &cert.tbs_certificate.subject_public_key_info,
            )
            .is_ok(),
        Err(e) => {
            error!(
                "Failed to defer decode certificate in is_self_signed with: {}",
                e
            );
            false
        }
    }
}

/// `is_self_issued` returns true if the subject field in the certificate matches the issuer field.
pub fn is_self_issued(cert: &Certificate) -> bool {
    compare_names(&cert.tbs_certificate.issuer, &cert.tbs_certificate.subject)
}

/// `valid_at_time` evaluates the validity period of a certificate against the time of interest,
/// expressed as seconds since the Unix epoch. A time of interest of zero disables the check. On
/// success, the number of seconds until the certificate expires is returned.
pub fn valid_at_time(target: &TbsCertificate, toi: u64, stifle_log: bool) -> Result<u64> {
    if 0 == toi {
        return Ok(0);
    }

    let nb = target.validity.not_before.to_unix_duration().as_secs();
    if nb > toi {
        if !stifle_log {
            log_error_for_name(
                &target.subject,
                "certificate is not yet valid relative to the configured time of interest",
            );
        }
        return Err(Error::PathValidation(
            PathValidationStatus::InvalidNotBeforeDate,
        ));
    }

    let na = target.validity.not_after.to_unix_duration().as_secs();
    if na < toi {
        if !stifle_log {
            log_error_for_name(
                &target.subject,
                format!(
                    "certificate is expired relative to the configured time of interest: {}",
                    target.validity.not_after
                )
                .as_str(),
            );
        }
        Err(Error::PathValidation(
            PathValidationStatus::InvalidNotAfterDate,
        ))
    } else {
        Ok(na - toi)
    }
}

/// `name_to_string` returns an RFC 4514 string representation of a Name.
pub fn name_to_string(name: &Name) -> String {
    name.to_string()
}

/// `get_leaf_rdn` returns the string form of the last (most specific) RDN of a name, or an empty
/// string for an empty name.
pub fn get_leaf_rdn(name: &Name) -> String {
    match name.0.last() {
        Some(rdn) => rdn.to_string(),
        None => String::new(),
    }
}

/// `get_value_from_rdn` returns the escaped string value of an attribute. Values that are not
/// PrintableString, UTF8String or IA5String are rendered as a hex encoding of the DER value.
pub fn get_value_from_rdn(atav: &AttributeTypeAndValue) -> Result<String> {
    let val = match atav.value.tag() {
        der::Tag::PrintableString => atav
            .value
            .decode_as()
            .ok()
            .map(|s: PrintableString| s.to_string()),
        der::Tag::Utf8String => atav
            .value
            .decode_as()
            .ok()
            .map(|s: Utf8StringRef<'_>| s.to_string()),
        der::Tag::Ia5String => atav
            .value
            .decode_as()
            .ok()
            .map(|s: Ia5String| s.to_string()),
        _ => None,
    };

    let mut s = String::new();
    if let Some(val) = val {
        let mut iter = val.char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            match c {
                '#' if i == 0 => s.push_str("\\#"),
                ' ' if i == 0 || iter.peek().is_none() => s.push_str("\\ "),
                '"' | '+' | ',' | ';' | '<' | '>' | '\\' => s.push_str(format!("\\{}", c).as_str()),
                '\x00'..='\x1f' | '\x7f' => s.push_str(format!("\\{:02x}", c as u8).as_str()),
                _ => s.push(c),
            }
        }
    } else {
        let val = atav.value.to_der()?;
        s.push_str(format!("{}=#", atav.oid).as_str());
        s.push_str(&buffer_to_hex(&val));
    }
    Ok(s)
}

fn normalize_value(atav: &AttributeTypeAndValue) -> Option<String> {
    let val = get_value_from_rdn(atav).ok()?.replace("\\ ", " ");
    let val = val.trim().to_lowercase();
    match WHITESPACE_RUN.as_ref() {
        Some(re) => Some(re.replace_all(val.as_str(), " ").to_string()),
        None => Some(val),
    }
}

/// `compare_rdns` compares two RDNs, tolerating differences in case, leading and trailing
/// whitespace and runs of internal whitespace.
pub fn compare_rdns(left: &RelativeDistinguishedName, right: &RelativeDistinguishedName) -> bool {
    if left == right {
        return true;
    }
    if left.0.len() != right.0.len() {
        return false;
    }
    for (l, r) in left.0.iter().zip(right.0.iter()) {
        if l.oid != r.oid {
            return false;
        }
        match (normalize_value(l), normalize_value(r)) {
            (Some(lv), Some(rv)) if lv == rv => {}
            _ => return false,
        }
    }
    true
}

/// `compare_names` compares two Name values RDN by RDN using [`compare_rdns`].
pub fn compare_names(left: &Name, right: &Name) -> bool {
    if left.0.len() != right.0.len() {
        return false;
    }
    left.0
        .iter()
        .zip(right.0.iter())
        .all(|(l, r)| compare_rdns(l, r))
}

/// `common_rdn_prefix_len` returns the number of leading RDNs the two names have in common.
pub fn common_rdn_prefix_len(left: &Name, right: &Name) -> usize {
    left.0
        .iter()
        .zip(right.0.iter())
        .take_while(|(l, r)| compare_rdns(l, r))
        .count()
}

/// `is_geographic_rdn` returns true when every attribute in the RDN is a country, state or
/// province, locality or street address.
pub fn is_geographic_rdn(rdn: &RelativeDistinguishedName) -> bool {
    !rdn.0.is_empty()
        && rdn.0.iter().all(|atav| {
            atav.oid == ID_AT_COUNTRY_NAME
                || atav.oid == ID_AT_STATE_OR_PROVINCE_NAME
                || atav.oid == ID_AT_LOCALITY_NAME
                || atav.oid == ID_AT_STREET_ADDRESS
        })
}

/// `naming_distance` returns the number of hops between two names through their closest common
/// ancestor, or None when the names share no ancestor or the closest common ancestor ends with a
/// purely geographic RDN (i.e., C=US alone does not place two names in the same namespace).
pub fn naming_distance(left: &Name, right: &Name) -> Option<usize> {
    let common = common_rdn_prefix_len(left, right);
    if 0 == common || is_geographic_rdn(&left.0[common - 1]) {
        return None;
    }
    Some((left.0.len() - common) + (right.0.len() - common))
}

/// `descended_from_dn` returns true if `name` is equal to or subordinate to `subtree`.
pub fn descended_from_dn(subtree: &Name, name: &Name) -> bool {
    if subtree.0.len() > name.0.len() {
        return false;
    }
    subtree
        .0
        .iter()
        .zip(name.0.iter())
        .all(|(l, r)| compare_rdns(l, r))
}

/// `descended_from_host` returns true if `host` equals `base` or is a subdomain of `base`. A base
/// with a leading period matches only subdomains.
pub fn descended_from_host(base: &str, host: &str) -> bool {
    let base = base.to_lowercase();
    let host = host.to_lowercase();
    if let Some(stripped) = base.strip_prefix('.') {
        return host.ends_with(&base) && host.len() > stripped.len() + 1;
    }
    if host == base {
        return true;
    }
    host.ends_with(format!(".{}", base).as_str())
}

/// `get_hash_alg_from_sig_alg` returns the hash algorithm identifier associated with a signature
/// algorithm identifier.
pub fn get_hash_alg_from_sig_alg(sig_alg: &ObjectIdentifier) -> Result<AlgorithmIdentifierOwned> {
    let oid = if PKIXALG_SHA256_WITH_RSA_ENCRYPTION == *sig_alg
        || PKIXALG_ECDSA_WITH_SHA256 == *sig_alg
        || PKIXALG_DSA_WITH_SHA256 == *sig_alg
    {
        PKIXALG_SHA256
    } else if PKIXALG_SHA384_WITH_RSA_ENCRYPTION == *sig_alg
        || PKIXALG_ECDSA_WITH_SHA384 == *sig_alg
    {
        PKIXALG_SHA384
    } else if PKIXALG_SHA224_WITH_RSA_ENCRYPTION == *sig_alg
        || PKIXALG_ECDSA_WITH_SHA224 == *sig_alg
    {
        PKIXALG_SHA224
    } else if PKIXALG_SHA512_WITH_RSA_ENCRYPTION == *sig_alg
        || PKIXALG_ECDSA_WITH_SHA512 == *sig_alg
    {
        PKIXALG_SHA512
    } else if PKIXALG_SHA1_WITH_RSA_ENCRYPTION == *sig_alg
        || PKIXALG_ECDSA_WITH_SHA1 == *sig_alg
        || PKIXALG_DSA_WITH_SHA1 == *sig_alg
    {
        PKIXALG_SHA1
    } else {
        return Err(Error::Unrecognized);
    };
    Ok(AlgorithmIdentifier {
        oid,
        parameters: None,
    })
}

/// `collect_uris_from_aia` returns the URIs from the AIA extension of the certificate that are
/// associated with the indicated access method, i.e., id-ad-caIssuers or id-ad-ocsp.
pub fn collect_uris_from_aia(cert: &PDVCertificate, access_method: ObjectIdentifier) -> Vec<String> {
    let mut uris = vec![];
    if let Ok(Some(PDVExtension::AuthorityInfoAccessSyntax(aia))) =
        cert.get_extension(&ID_PE_AUTHORITY_INFO_ACCESS)
    {
        collect_uris_from_access_descriptions(aia, access_method, &mut uris);
    }
    uris
}

fn collect_uris_from_access_descriptions(
    aia: &AuthorityInfoAccessSyntax,
    access_method: ObjectIdentifier,
    uris: &mut Vec<String>,
) {
    for ad in &aia.0 {
        if access_method != ad.access_method {
            continue;
        }
        if let GeneralName::UniformResourceIdentifier(uri) = &ad.access_location {
            let s = uri.to_string();
            if !uris.contains(&s) {
                uris.push(s);
            }
        }
    }
}

/// `get_ca_issuers_uris` returns the id-ad-caIssuers URIs from the AIA extension, if any.
pub fn get_ca_issuers_uris(cert: &PDVCertificate) -> Vec<String> {
    collect_uris_from_aia(cert, ID_AD_CA_ISSUERS)
}

/// `get_ocsp_uris` returns the id-ad-ocsp URIs from the AIA extension, if any.
pub fn get_ocsp_uris(cert: &PDVCertificate) -> Vec<String> {
    collect_uris_from_aia(cert, ID_AD_OCSP)
}

/// `buffer_to_hex` returns an upper case hex representation of the buffer.
pub fn buffer_to_hex(buffer: &[u8]) -> String {
    buffer.iter().map(|b| format!("{:02X}", b)).collect()
}

pub(crate) fn log_error_for_name(name: &Name, msg: &str) {
    error!(
        "Encountered error while processing certificate with subject {}: {}",
        name_to_string(name),
        msg
    );
}

pub(crate) fn log_error_for_ca(ca: &PDVCertificate, msg: &str) {
    log_error_for_name(&ca.decoded_cert.tbs_certificate.subject, msg);
}

pub(crate) fn log_rejection(cert: &PDVCertificate, status: PathValidationStatus) {
    debug!(
        "Rejected candidate {} issued by {}: {}",
        name_to_string(&cert.decoded_cert.tbs_certificate.subject),
        name_to_string(&cert.decoded_cert.tbs_certificate.issuer),
        status
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    #[test]
    fn compare_names_tolerates_case_and_whitespace() {
        assert!(compare_names(
            &name("CN=Test  CA,O=Example Org,C=US"),
            &name("CN=test ca,O=EXAMPLE ORG,C=US")
        ));
        assert!(!compare_names(
            &name("CN=Test CA,O=Example Org,C=US"),
            &name("CN=Test CA,O=Other Org,C=US")
        ));
    }

    #[test]
    fn naming_distance_skips_geographic_ancestors() {
        // RFC 4514 strings list the most specific RDN first
        let anchor = name("CN=Root,O=Example Org,C=US");
        let same_org = name("CN=Issuing CA,OU=Issuing,O=Example Org,C=US");
        let other_org = name("CN=Other CA,O=Other Org,C=US");
        assert_eq!(Some(3), naming_distance(&anchor, &same_org));
        assert_eq!(None, naming_distance(&anchor, &other_org));
        assert_eq!(Some(0), naming_distance(&anchor, &anchor));
    }

    #[test]
    fn host_descent() {
        assert!(descended_from_host("example.com", "www.example.com"));
        assert!(descended_from_host("example.com", "example.com"));
        assert!(!descended_from_host("example.com", "badexample.com"));
        assert!(descended_from_host(".example.com", "a.example.com"));
        assert!(!descended_from_host(".example.com", "example.com"));
    }

    #[test]
    fn get_hash_alg_from_sig_alg_test() {
        assert_eq!(
            PKIXALG_SHA256,
            get_hash_alg_from_sig_alg(&PKIXALG_ECDSA_WITH_SHA256)
                .unwrap()
                .oid
        );
        assert_eq!(
            PKIXALG_SHA1,
            get_hash_alg_from_sig_alg(&PKIXALG_SHA1_WITH_RSA_ENCRYPTION)
                .unwrap()
                .oid
        );
        assert!(get_hash_alg_from_sig_alg(&PKIXALG_RSA_ENCRYPTION).is_err());
    }

    #[test]
    fn aia_uris_and_attribute_values() {
        let ee = crate::parse_cert(include_bytes!("../../tests/examples/ee.der"), "ee.der").unwrap();
        assert_eq!(
            vec!["http://ca.example.com/certs/intermediate.der".to_string()],
            get_ca_issuers_uris(&ee)
        );
        assert_eq!(vec!["http://ocsp.example.com/".to_string()], get_ocsp_uris(&ee));

        let cn = ee.subject().0.last().unwrap().0.iter().next().unwrap();
        assert_eq!("Test End Entity", get_value_from_rdn(cn).unwrap());
    }
}
