//! Decoded certificate extensions consulted while building and validating paths

use std::collections::BTreeMap;

use der::asn1::ObjectIdentifier;
use x509_cert::ext::pkix::*;

use crate::util::error::*;

/// The [`ExtensionProcessing`] trait is implemented by objects that decode their extensions once
/// and hand out the decoded values on request, i.e., `PDVCertificate`.
pub trait ExtensionProcessing {
    /// Returns the decoded extension of the given type, or None if the extension is absent or was
    /// not decoded.
    fn get_extension(&self, oid: &ObjectIdentifier) -> Result<Option<&'_ PDVExtension>>;

    /// Decodes and caches the extension of the given type, if present.
    fn parse_extension(&'_ mut self, oid: &ObjectIdentifier) -> Result<Option<&'_ PDVExtension>>;

    /// Decodes each listed extension type. Extensions that fail to decode are logged and skipped.
    fn parse_extensions(&'_ mut self, oids: &[ObjectIdentifier]);
}

/// Decoded extensions keyed by extension type
pub type ParsedExtensions = BTreeMap<ObjectIdentifier, PDVExtension>;

/// [`PDVExtension`] provides a wrapper for the extension types consulted while building and
/// validating certification paths.
#[derive(PartialEq, Clone, Eq, Debug)]
pub enum PDVExtension {
    /// Parsed BasicConstraints extension
    BasicConstraints(BasicConstraints),
    /// Parsed SubjectKeyIdentifier extension
    SubjectKeyIdentifier(SubjectKeyIdentifier),
    /// Parsed ExtendedKeyUsage extension
    ExtendedKeyUsage(ExtendedKeyUsage),
    /// Parsed AuthorityInfoAccessSyntax extension
    AuthorityInfoAccessSyntax(AuthorityInfoAccessSyntax),
    /// Parsed KeyUsage extension
    KeyUsage(KeyUsage),
    /// Parsed SubjectAltName extension
    SubjectAltName(SubjectAltName),
    /// Parsed NameConstraints extension
    NameConstraints(NameConstraints),
    /// Parsed CertificatePolicies extension
    CertificatePolicies(CertificatePolicies),
    /// Parsed PolicyMappings extension
    PolicyMappings(PolicyMappings),
    /// Parsed AuthorityKeyIdentifier extension
    AuthorityKeyIdentifier(AuthorityKeyIdentifier),
    /// Parsed PolicyConstraints extension
    PolicyConstraints(PolicyConstraints),
    /// Parsed InhibitAnyPolicy extension
    InhibitAnyPolicy(InhibitAnyPolicy),
    /// Presence of the id-pkix-ocsp-nocheck extension
    OcspNoCheck,
    /// Unparsed, unrecognized extension
    Unrecognized(),
}
