//! Provides structure that represents a certification path built from a target certificate toward
//! a trust anchor.

use crate::{PDVCertificate, TrustAnchor};

/// `CertificationPath` is used to represent the certificates and the trust anchor returned by a
/// successful path building operation.
#[derive(Clone, Debug)]
#[readonly::make]
pub struct CertificationPath {
    /// `certificates` contains the target certificate followed by zero or more intermediate CA
    /// certificates, i.e., `certificates\[0\]` is the target, `certificates\[1\]` issued
    /// `certificates\[0\]` and so on, with the last element having been issued by `trust_anchor`.
    #[readonly]
    pub certificates: Vec<PDVCertificate>,
    /// `trust_anchor` contains the trust anchor for the certification path
    #[readonly]
    pub trust_anchor: TrustAnchor,
}

impl CertificationPath {
    /// instantiates a new CertificationPath from certificates in forward order (target first)
    pub fn new(trust_anchor: TrustAnchor, certificates: Vec<PDVCertificate>) -> CertificationPath {
        CertificationPath {
            certificates,
            trust_anchor,
        }
    }

    /// Returns the target certificate, if any.
    pub fn target(&self) -> Option<&PDVCertificate> {
        self.certificates.first()
    }

    /// Returns the intermediate CA certificates in forward order.
    pub fn intermediates(&self) -> &[PDVCertificate] {
        if self.certificates.is_empty() {
            &[]
        } else {
            &self.certificates[1..]
        }
    }

    /// Number of certificates in the path, excluding the trust anchor.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Returns true if the path contains no certificates.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}
