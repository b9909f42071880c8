//! Certificate identifiers used in OCSP requests and responses

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use der::asn1::{AnyRef, OctetString};
use der::{Any, Decode, Encode, Tag, Tagged};
use sha1::{Digest, Sha1};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;

use crate::util::error::*;
use crate::util::pdv_alg_oids::PKIXALG_SHA1;
use crate::util::pdv_utilities::buffer_to_hex;
use crate::{PDVCertificate, TrustAnchor};

/// [`CertId`] identifies a certificate by the hash of its issuer's name, the hash of its issuer's
/// public key and its serial number, as described in
/// [RFC 6960 Section 4.1.1](https://datatracker.ietf.org/doc/html/rfc6960#section-4.1.1).
///
/// Equality and hashing cover all four fields. An absent hash algorithm parameter and an explicit
/// NULL parameter are treated as the same algorithm.
#[derive(Clone, Debug)]
pub struct CertId {
    hash_algorithm: AlgorithmIdentifierOwned,
    issuer_name_hash: Vec<u8>,
    issuer_key_hash: Vec<u8>,
    serial_number: SerialNumber,
    hash_code: OnceLock<u64>,
}

fn sha1_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: PKIXALG_SHA1,
        parameters: Some(Any::from(AnyRef::NULL)),
    }
}

fn is_null_parameter(param: &Any) -> bool {
    param.tag() == Tag::Null && param.value().is_empty()
}

impl CertId {
    /// Creates a SHA-1 based [`CertId`] from the issuer's name and public key and the serial number
    /// of the certificate being identified.
    pub fn new(
        issuer_name: &Name,
        issuer_key: &SubjectPublicKeyInfoOwned,
        serial_number: SerialNumber,
    ) -> Result<CertId> {
        let enc_name = issuer_name.to_der()?;
        Ok(CertId {
            hash_algorithm: sha1_algorithm(),
            issuer_name_hash: Sha1::digest(enc_name).to_vec(),
            issuer_key_hash: Sha1::digest(issuer_key.subject_public_key.raw_bytes()).to_vec(),
            serial_number,
            hash_code: OnceLock::new(),
        })
    }

    /// Creates a [`CertId`] for `target` given the certificate that issued it.
    pub fn for_certificate(target: &PDVCertificate, issuer: &PDVCertificate) -> Result<CertId> {
        CertId::new(
            issuer.subject(),
            issuer.public_key(),
            target.serial_number().clone(),
        )
    }

    /// Creates a [`CertId`] for `target` given the trust anchor that issued it.
    pub fn for_trust_anchor_issued(target: &PDVCertificate, ta: &TrustAnchor) -> Result<CertId> {
        CertId::new(ta.subject(), ta.public_key(), target.serial_number().clone())
    }

    /// Parses a DER encoded CertID structure.
    pub fn from_der(enc: &[u8]) -> Result<CertId> {
        let cert_id = x509_ocsp::CertId::from_der(enc)?;
        Ok(CertId::from(&cert_id))
    }

    /// Returns the DER encoding of the CertID structure.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.to_ocsp()?.to_der()?)
    }

    /// Returns the structure used when preparing OCSP requests.
    pub fn to_ocsp(&self) -> Result<x509_ocsp::CertId> {
        Ok(x509_ocsp::CertId {
            hash_algorithm: self.hash_algorithm.clone(),
            issuer_name_hash: OctetString::new(self.issuer_name_hash.as_slice())?,
            issuer_key_hash: OctetString::new(self.issuer_key_hash.as_slice())?,
            serial_number: self.serial_number.clone(),
        })
    }

    /// Hash algorithm used to compute the issuer name and key hashes
    pub fn hash_algorithm(&self) -> &AlgorithmIdentifierOwned {
        &self.hash_algorithm
    }

    /// Hash of the DER encoded issuer name
    pub fn issuer_name_hash(&self) -> &[u8] {
        &self.issuer_name_hash
    }

    /// Hash of the issuer's public key, excluding tag, length and unused bits count
    pub fn issuer_key_hash(&self) -> &[u8] {
        &self.issuer_key_hash
    }

    /// Serial number of the identified certificate
    pub fn serial_number(&self) -> &SerialNumber {
        &self.serial_number
    }

    /// Hash algorithm parameters with NULL folded into absent
    fn normalized_parameters(&self) -> Option<&Any> {
        match &self.hash_algorithm.parameters {
            Some(p) if is_null_parameter(p) => None,
            p => p.as_ref(),
        }
    }

    fn hash_code(&self) -> u64 {
        *self.hash_code.get_or_init(|| {
            let mut hasher = DefaultHasher::new();
            self.hash_algorithm.oid.hash(&mut hasher);
            if let Some(p) = self.normalized_parameters() {
                u8::from(p.tag()).hash(&mut hasher);
                p.value().hash(&mut hasher);
            }
            self.issuer_name_hash.hash(&mut hasher);
            self.issuer_key_hash.hash(&mut hasher);
            self.serial_number.as_bytes().hash(&mut hasher);
            hasher.finish()
        })
    }
}

impl From<&x509_ocsp::CertId> for CertId {
    fn from(cert_id: &x509_ocsp::CertId) -> Self {
        CertId {
            hash_algorithm: cert_id.hash_algorithm.clone(),
            issuer_name_hash: cert_id.issuer_name_hash.as_bytes().to_vec(),
            issuer_key_hash: cert_id.issuer_key_hash.as_bytes().to_vec(),
            serial_number: cert_id.serial_number.clone(),
            hash_code: OnceLock::new(),
        }
    }
}

impl PartialEq for CertId {
    fn eq(&self, other: &Self) -> bool {
        if self.hash_code() != other.hash_code() {
            return false;
        }
        self.hash_algorithm.oid == other.hash_algorithm.oid
            && self.normalized_parameters() == other.normalized_parameters()
            && self.issuer_name_hash == other.issuer_name_hash
            && self.issuer_key_hash == other.issuer_key_hash
            && self.serial_number == other.serial_number
    }
}

impl Eq for CertId {}

impl Hash for CertId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl core::fmt::Display for CertId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "CertId(issuerNameHash: {}, issuerKeyHash: {}, serialNumber: {})",
            buffer_to_hex(&self.issuer_name_hash),
            buffer_to_hex(&self.issuer_key_hash),
            buffer_to_hex(self.serial_number.as_bytes())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_cert;
    use hex_literal::hex;
    use std::collections::HashSet;

    #[test]
    fn cert_id_from_issuer() {
        let inter =
            parse_cert(include_bytes!("../../tests/examples/inter.der"), "inter.der").unwrap();
        let ee = parse_cert(include_bytes!("../../tests/examples/ee.der"), "ee.der").unwrap();

        let cert_id = CertId::for_certificate(&ee, &inter).unwrap();
        assert_eq!(
            &hex!("FB1A959FE4187B7B50077C431B528903481151D4"),
            cert_id.issuer_name_hash()
        );
        assert_eq!(inter.subject_key_identifier(), Some(cert_id.issuer_key_hash()));
        assert_eq!(&[0x10u8], cert_id.serial_number().as_bytes());

        let req = include_bytes!("../../tests/examples/req_good.der");
        assert_eq!(&req[8..], cert_id.encode().unwrap().as_slice());
        assert_eq!(cert_id, CertId::from_der(&req[8..]).unwrap());

        let ta = TrustAnchor::from(inter.clone());
        assert_eq!(cert_id, CertId::for_trust_anchor_issued(&ee, &ta).unwrap());
    }

    #[test]
    fn absent_and_null_parameters_are_equal() {
        let inter =
            parse_cert(include_bytes!("../../tests/examples/inter.der"), "inter.der").unwrap();
        let ee = parse_cert(include_bytes!("../../tests/examples/ee.der"), "ee.der").unwrap();
        let eerev =
            parse_cert(include_bytes!("../../tests/examples/eerev.der"), "eerev.der").unwrap();

        let with_null = CertId::for_certificate(&ee, &inter).unwrap();
        let mut ocsp = with_null.to_ocsp().unwrap();
        ocsp.hash_algorithm.parameters = None;
        let absent = CertId::from(&ocsp);
        assert_eq!(with_null, absent);

        let mut set = HashSet::new();
        set.insert(with_null.clone());
        assert!(set.contains(&absent));

        let other = CertId::for_certificate(&eerev, &inter).unwrap();
        assert_ne!(with_null, other);
        assert!(!set.contains(&other));
        assert!(with_null.to_string().contains("FB1A959F"));
    }
}
