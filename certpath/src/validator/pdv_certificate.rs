//! Wrappers around asn.1 encoder/decoder structures to support certification path processing

use std::collections::BTreeMap;

use const_oid::db::rfc5912::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_BASIC_CONSTRAINTS, ID_CE_CERTIFICATE_POLICIES,
    ID_CE_EXT_KEY_USAGE, ID_CE_INHIBIT_ANY_POLICY, ID_CE_KEY_USAGE, ID_CE_NAME_CONSTRAINTS,
    ID_CE_POLICY_CONSTRAINTS, ID_CE_POLICY_MAPPINGS, ID_CE_SUBJECT_ALT_NAME,
    ID_CE_SUBJECT_KEY_IDENTIFIER, ID_PE_AUTHORITY_INFO_ACCESS,
};
use const_oid::db::rfc6960::ID_PKIX_OCSP_NOCHECK;
use der::asn1::BitString;
use der::{asn1::ObjectIdentifier, Decode, Encode};
use log::error;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::ext::pkix::*;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use crate::pdv_extension::*;
use crate::util::error::*;
use crate::util::pdv_utilities::is_self_issued;

/// [`Asn1Metadata`] associates types represented by the [`Asn1MetadataTypes`] enum with arbitrary
/// string keys. At present this is used to convey where a certificate was obtained.
pub type Asn1Metadata = BTreeMap<String, Asn1MetadataTypes>;

/// [`MD_LOCATOR`] is used to set/get a String value to/from an [`Asn1Metadata`] object. The value
/// may represent a file name, URI or other locator for troubleshooting purposes.
pub static MD_LOCATOR: &str = "mdLocator";

/// Small assortment of types that can be saved as metadata alongside a certificate.
#[derive(PartialEq, Clone, Eq, Debug)]
pub enum Asn1MetadataTypes {
    /// Used for metadata represented as a bool
    Bool(bool),
    /// Used for metadata represented as a u32
    Number(u32),
    /// Used for metadata represented as a String
    String(String),
    /// Used for metadata represented as a `Vec<u8>`
    Buffer(Vec<u8>),
}

/// Extensions parsed when a [`PDVCertificate`] is instantiated.
pub const EXTS_OF_INTEREST: &[ObjectIdentifier] = &[
    ID_CE_BASIC_CONSTRAINTS,
    ID_CE_SUBJECT_KEY_IDENTIFIER,
    ID_CE_AUTHORITY_KEY_IDENTIFIER,
    ID_CE_KEY_USAGE,
    ID_CE_EXT_KEY_USAGE,
    ID_CE_SUBJECT_ALT_NAME,
    ID_CE_NAME_CONSTRAINTS,
    ID_CE_CERTIFICATE_POLICIES,
    ID_CE_POLICY_MAPPINGS,
    ID_CE_POLICY_CONSTRAINTS,
    ID_CE_INHIBIT_ANY_POLICY,
    ID_PE_AUTHORITY_INFO_ACCESS,
    ID_PKIX_OCSP_NOCHECK,
];

/// [`PDVCertificate`] is used to aggregate a binary, DER-encoded Certificate, a parsed Certificate,
/// optional metadata and parsed extensions in support of certification path development and
/// validation operations.
///
/// Equality is defined over the encoded certificate.
#[derive(Clone, Debug)]
pub struct PDVCertificate {
    /// Binary, encoded Certificate object
    pub encoded_cert: Vec<u8>,
    /// Decoded Certificate object
    pub decoded_cert: Certificate,
    /// Optional metadata about the certificate
    pub metadata: Option<Asn1Metadata>,
    /// Parsed extensions from the Certificate
    pub parsed_extensions: ParsedExtensions,
}

impl PartialEq for PDVCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.encoded_cert == other.encoded_cert
    }
}

impl Eq for PDVCertificate {}

impl TryFrom<&[u8]> for PDVCertificate {
    type Error = der::Error;

    fn try_from(enc_cert: &[u8]) -> der::Result<Self> {
        let cert = Certificate::from_der(enc_cert)?;
        let mut pdv_cert = PDVCertificate {
            encoded_cert: enc_cert.to_vec(),
            decoded_cert: cert,
            metadata: None,
            parsed_extensions: Default::default(),
        };
        pdv_cert.parse_extensions(EXTS_OF_INTEREST);
        Ok(pdv_cert)
    }
}

impl TryFrom<Certificate> for PDVCertificate {
    type Error = der::Error;

    fn try_from(cert: Certificate) -> der::Result<Self> {
        let enc_cert = cert.to_der()?;
        let mut pdv_cert = PDVCertificate {
            encoded_cert: enc_cert,
            decoded_cert: cert,
            metadata: None,
            parsed_extensions: Default::default(),
        };
        pdv_cert.parse_extensions(EXTS_OF_INTEREST);
        Ok(pdv_cert)
    }
}

impl PDVCertificate {
    /// Subject name of the certificate
    pub fn subject(&self) -> &Name {
        &self.decoded_cert.tbs_certificate.subject
    }

    /// Issuer name of the certificate
    pub fn issuer(&self) -> &Name {
        &self.decoded_cert.tbs_certificate.issuer
    }

    /// Serial number of the certificate
    pub fn serial_number(&self) -> &SerialNumber {
        &self.decoded_cert.tbs_certificate.serial_number
    }

    /// Subject public key of the certificate
    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        &self.decoded_cert.tbs_certificate.subject_public_key_info
    }

    /// Signature algorithm used to sign the certificate
    pub fn signature_algorithm(&self) -> &AlgorithmIdentifierOwned {
        &self.decoded_cert.signature_algorithm
    }

    /// Returns true if the subject and issuer names match
    pub fn is_self_issued(&self) -> bool {
        is_self_issued(&self.decoded_cert)
    }

    /// Returns the list of extensions, which may be empty.
    pub fn extensions(&self) -> &[Extension] {
        match &self.decoded_cert.tbs_certificate.extensions {
            Some(exts) => exts.as_slice(),
            None => &[],
        }
    }

    /// Returns the set of critical extension OIDs.
    pub fn critical_extensions(&self) -> Vec<ObjectIdentifier> {
        self.extensions()
            .iter()
            .filter(|e| e.critical)
            .map(|e| e.extn_id)
            .collect()
    }

    /// Returns the basic constraints extension, if present and parsed.
    pub fn basic_constraints(&self) -> Option<&BasicConstraints> {
        match self.get_extension(&ID_CE_BASIC_CONSTRAINTS) {
            Ok(Some(PDVExtension::BasicConstraints(bc))) => Some(bc),
            _ => None,
        }
    }

    /// Returns true if the certificate asserts cA in a basic constraints extension.
    pub fn is_ca(&self) -> bool {
        matches!(self.basic_constraints(), Some(bc) if bc.ca)
    }

    /// Returns the key identifier from the subject key identifier extension, if present.
    pub fn subject_key_identifier(&self) -> Option<&[u8]> {
        match self.get_extension(&ID_CE_SUBJECT_KEY_IDENTIFIER) {
            Ok(Some(PDVExtension::SubjectKeyIdentifier(skid))) => Some(skid.0.as_bytes()),
            _ => None,
        }
    }

    /// Returns the key identifier from the authority key identifier extension, if present.
    pub fn authority_key_identifier(&self) -> Option<&[u8]> {
        match self.get_extension(&ID_CE_AUTHORITY_KEY_IDENTIFIER) {
            Ok(Some(PDVExtension::AuthorityKeyIdentifier(akid))) => {
                akid.key_identifier.as_ref().map(|kid| kid.as_bytes())
            }
            _ => None,
        }
    }

    /// Returns the key usage bits, indexed per RFC 5280 (digitalSignature is bit 0), padded to the
    /// nine named bits when the encoding omits trailing zero bits. Returns None when no key usage
    /// extension is present and an InvalidKeyUsage error when the extension cannot be decoded.
    pub fn key_usage_bits(&self) -> Result<Option<Vec<bool>>> {
        let ext = match self
            .extensions()
            .iter()
            .find(|e| e.extn_id == ID_CE_KEY_USAGE)
        {
            Some(ext) => ext,
            None => return Ok(None),
        };
        let bits = match BitString::from_der(ext.extn_value.as_bytes()) {
            Ok(bs) => bs,
            Err(e) => {
                error!("Failed to parse key usage extension: {}", e);
                return Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage));
            }
        };
        let mut ku: Vec<bool> = bits.bits().collect();
        if ku.len() < 9 {
            ku.resize(9, false);
        }
        Ok(Some(ku))
    }

    /// Returns the policy OIDs asserted in the certificate policies extension, if present.
    pub fn policy_oids(&self) -> Option<Vec<ObjectIdentifier>> {
        match self.get_extension(&ID_CE_CERTIFICATE_POLICIES) {
            Ok(Some(PDVExtension::CertificatePolicies(cp))) => {
                Some(cp.0.iter().map(|p| p.policy_identifier).collect())
            }
            _ => None,
        }
    }

    /// Returns true if the certificate asserts the given extended key usage.
    pub fn has_extended_key_usage(&self, eku: &ObjectIdentifier) -> bool {
        match self.get_extension(&ID_CE_EXT_KEY_USAGE) {
            Ok(Some(PDVExtension::ExtendedKeyUsage(ekus))) => ekus.0.contains(eku),
            _ => false,
        }
    }
}

impl ExtensionProcessing for PDVCertificate {
    fn get_extension(&self, oid: &ObjectIdentifier) -> Result<Option<&'_ PDVExtension>> {
        Ok(self.parsed_extensions.get(oid))
    }

    fn parse_extensions(&'_ mut self, oids: &[ObjectIdentifier]) {
        for oid in oids {
            if let Err(e) = self.parse_extension(oid) {
                error!(
                    "Failed to parse extension {} from certificate issued to {}: {}",
                    oid,
                    self.decoded_cert.tbs_certificate.subject,
                    e
                );
            }
        }
    }

    fn parse_extension(&mut self, oid: &ObjectIdentifier) -> Result<Option<&PDVExtension>> {
        macro_rules! add_and_return {
            ($pe:ident, $v:ident, $t:ident) => {
                match $t::from_der($v) {
                    Ok(r) => {
                        $pe.insert(*oid, PDVExtension::$t(r));
                        return Ok($pe.get(oid));
                    }
                    Err(e) => {
                        return Err(Error::Asn1Error(e));
                    }
                }
            };
        }

        let pe = &mut self.parsed_extensions;
        if pe.contains_key(oid) {
            return Ok(pe.get(oid));
        }

        if let Some(exts) = self.decoded_cert.tbs_certificate.extensions.as_ref() {
            if let Some(i) = exts.iter().find(|&ext| ext.extn_id == *oid) {
                let v = i.extn_value.as_bytes();
                match *oid {
                    ID_CE_BASIC_CONSTRAINTS => add_and_return!(pe, v, BasicConstraints),
                    ID_CE_SUBJECT_KEY_IDENTIFIER => add_and_return!(pe, v, SubjectKeyIdentifier),
                    ID_CE_AUTHORITY_KEY_IDENTIFIER => {
                        add_and_return!(pe, v, AuthorityKeyIdentifier)
                    }
                    ID_CE_KEY_USAGE => add_and_return!(pe, v, KeyUsage),
                    ID_CE_EXT_KEY_USAGE => add_and_return!(pe, v, ExtendedKeyUsage),
                    ID_CE_SUBJECT_ALT_NAME => add_and_return!(pe, v, SubjectAltName),
                    ID_CE_NAME_CONSTRAINTS => add_and_return!(pe, v, NameConstraints),
                    ID_CE_CERTIFICATE_POLICIES => add_and_return!(pe, v, CertificatePolicies),
                    ID_CE_POLICY_MAPPINGS => add_and_return!(pe, v, PolicyMappings),
                    ID_CE_POLICY_CONSTRAINTS => add_and_return!(pe, v, PolicyConstraints),
                    ID_CE_INHIBIT_ANY_POLICY => add_and_return!(pe, v, InhibitAnyPolicy),
                    ID_PE_AUTHORITY_INFO_ACCESS => {
                        add_and_return!(pe, v, AuthorityInfoAccessSyntax)
                    }
                    ID_PKIX_OCSP_NOCHECK => {
                        pe.insert(*oid, PDVExtension::OcspNoCheck);
                        return Ok(pe.get(oid));
                    }
                    _ => {
                        // ignore unrecognized
                    }
                }
            }
        }
        Ok(None)
    }
}

/// [`DeferDecodeSigned`] used to parse only the top-level Certificate structure, without parsing
/// the details of the TBSCertificate.
///
/// Deferred decoding is used when verifying certificates to avoid re-encoding the TBSCertificate
/// (and potentially encountering problems with structures that were not DER-encoded prior to
/// signing).
pub struct DeferDecodeSigned {
    /// tbsCertificate       TBSCertificate,
    pub tbs_field: Vec<u8>,
    /// signatureAlgorithm   AlgorithmIdentifier,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    /// signature            BIT STRING
    pub signature: BitString,
}

impl ::der::FixedTag for DeferDecodeSigned {
    const TAG: ::der::Tag = ::der::Tag::Sequence;
}

impl<'a> ::der::DecodeValue<'a> for DeferDecodeSigned {
    fn decode_value<R: ::der::Reader<'a>>(
        reader: &mut R,
        header: ::der::Header,
    ) -> ::der::Result<Self> {
        use ::der::Reader as _;
        reader.read_nested(header.length, |reader| {
            let tbs_field = reader.tlv_bytes()?.to_vec();
            let signature_algorithm = reader.decode()?;
            let signature = reader.decode()?;
            Ok(Self {
                tbs_field,
                signature_algorithm,
                signature,
            })
        })
    }
}

/// `parse_cert` takes a buffer containing a binary DER encoded certificate and returns
/// a [`PDVCertificate`] containing the parsed certificate if parsing was successful. The locator
/// is saved as [`MD_LOCATOR`] metadata.
pub fn parse_cert(buffer: &[u8], locator: &str) -> Result<PDVCertificate> {
    match PDVCertificate::try_from(buffer) {
        Ok(mut cert) => {
            let mut md = Asn1Metadata::new();
            md.insert(
                MD_LOCATOR.to_string(),
                Asn1MetadataTypes::String(locator.to_string()),
            );
            cert.metadata = Some(md);
            Ok(cert)
        }
        Err(e) => {
            error!("Failed to parse certificate from {}: {}", locator, e);
            Err(Error::Asn1Error(e))
        }
    }
}

/// `get_locator` returns the [`MD_LOCATOR`] metadata value, if present, or an empty string.
pub fn get_locator(cert: &PDVCertificate) -> String {
    if let Some(md) = &cert.metadata {
        if let Some(Asn1MetadataTypes::String(locator)) = md.get(MD_LOCATOR) {
            return locator.to_owned();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cert_test() {
        let der_encoded_cert = include_bytes!("../../tests/examples/ee.der");
        let cert = parse_cert(der_encoded_cert, "ee.der").unwrap();
        assert_eq!("ee.der", get_locator(&cert));
        assert!(!cert.is_ca());
        assert!(cert.subject_key_identifier().is_some());
        assert_eq!(
            cert.authority_key_identifier().unwrap(),
            hex_literal::hex!("A05E4D83DA28A64C37BC3F903564FD1A78DD6B50")
        );
        let ku = cert.key_usage_bits().unwrap().unwrap();
        assert_eq!(9, ku.len());
        assert!(ku[0]);
        assert!(!ku[5]);

        let ca = parse_cert(include_bytes!("../../tests/examples/inter.der"), "inter.der").unwrap();
        assert!(ca.is_ca());
        assert_eq!(
            ca.subject_key_identifier().unwrap(),
            hex_literal::hex!("A05E4D83DA28A64C37BC3F903564FD1A78DD6B50")
        );
        assert!(ca.key_usage_bits().unwrap().unwrap()[5]);

        assert!(parse_cert(&der_encoded_cert[1..], "bad.der").is_err());
    }

    #[test]
    fn defer_decode_test() {
        let der_encoded_cert = include_bytes!("../../tests/examples/ee.der");
        let cert = parse_cert(der_encoded_cert, "ee.der").unwrap();
        let defer = DeferDecodeSigned::from_der(der_encoded_cert).unwrap();
        assert_eq!(
            defer.tbs_field,
            cert.decoded_cert.tbs_certificate.to_der().unwrap()
        );
        assert_eq!(&defer.signature_algorithm, cert.signature_algorithm());
    }
}
