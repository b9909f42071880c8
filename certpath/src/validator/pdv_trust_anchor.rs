//! Trust anchor representation used as the terminus of certification path building

use spki::SubjectPublicKeyInfoOwned;
use x509_cert::name::Name;

use crate::util::error::*;
use crate::util::pdv_utilities::{compare_names, name_to_string};
use crate::validator::pdv_certificate::*;

/// [`TrustAnchor`] is either a trusted certificate or a trusted (name, public key) pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TrustAnchor {
    /// Trust anchor represented by a self-signed (or otherwise trusted) certificate
    Certificate(PDVCertificate),
    /// Trust anchor represented by a distinguished name and public key
    NameAndKey {
        /// Subject name of the trust anchor
        name: Name,
        /// Public key of the trust anchor
        public_key: SubjectPublicKeyInfoOwned,
    },
}

impl TryFrom<&[u8]> for TrustAnchor {
    type Error = Error;

    fn try_from(enc_cert: &[u8]) -> Result<Self> {
        let cert = PDVCertificate::try_from(enc_cert)?;
        Ok(TrustAnchor::Certificate(cert))
    }
}

impl From<PDVCertificate> for TrustAnchor {
    fn from(cert: PDVCertificate) -> Self {
        TrustAnchor::Certificate(cert)
    }
}

impl TrustAnchor {
    /// Instantiates a name and key trust anchor
    pub fn from_name_and_key(name: Name, public_key: SubjectPublicKeyInfoOwned) -> Self {
        TrustAnchor::NameAndKey { name, public_key }
    }

    /// Subject name of the trust anchor
    pub fn subject(&self) -> &Name {
        match self {
            TrustAnchor::Certificate(cert) => cert.subject(),
            TrustAnchor::NameAndKey { name, .. } => name,
        }
    }

    /// Public key of the trust anchor
    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        match self {
            TrustAnchor::Certificate(cert) => cert.public_key(),
            TrustAnchor::NameAndKey { public_key, .. } => public_key,
        }
    }

    /// Returns the trusted certificate, if the trust anchor was supplied as a certificate
    pub fn certificate(&self) -> Option<&PDVCertificate> {
        match self {
            TrustAnchor::Certificate(cert) => Some(cert),
            TrustAnchor::NameAndKey { .. } => None,
        }
    }

    /// Returns true if the certificate bears the subject name and public key of this trust anchor.
    pub fn matches_name_and_key(&self, cert: &PDVCertificate) -> bool {
        compare_names(self.subject(), cert.subject()) && self.public_key() == cert.public_key()
    }

    /// Returns a string suitable for logging.
    pub fn describe(&self) -> String {
        match self {
            TrustAnchor::Certificate(cert) => {
                let locator = get_locator(cert);
                if locator.is_empty() {
                    name_to_string(cert.subject())
                } else {
                    format!("{} ({})", name_to_string(cert.subject()), locator)
                }
            }
            TrustAnchor::NameAndKey { name, .. } => name_to_string(name),
        }
    }
}
