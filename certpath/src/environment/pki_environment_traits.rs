//! The pki_environment_traits module features trait definitions and type definitions that are used
//! by [`PkiEnvironment`] and by path building to obtain certificates, CRLs, remote resources and
//! supplemental certificate checks.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use der::asn1::ObjectIdentifier;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::crl::CertificateList;

use crate::util::error::*;
use crate::{CertSelector, CrlSelector, PDVCertificate, PkiEnvironment};

/// `CalculateHash` provides a function signature for implementations that perform hashing
pub type CalculateHash = fn(
    &PkiEnvironment,
    &AlgorithmIdentifierOwned, // hash alg
    &[u8],                     // buffer to hash
) -> Result<Vec<u8>>;

/// `VerifySignatureMessage` provides a function signature for implementations that perform
/// signature verification over a message.
pub type VerifySignatureMessage = fn(
    &PkiEnvironment,
    &[u8],                      // message to hash and verify
    &[u8],                      // signature
    &AlgorithmIdentifierOwned,  // signature algorithm
    &SubjectPublicKeyInfoOwned, // public key
) -> Result<()>;

/// The [`CertStore`] trait is the lookup collaborator consulted while building paths: given a
/// selector, return the matching certificates or CRLs. Implementations may be backed by memory,
/// the file system or remote locations.
pub trait CertStore: Send + Sync {
    /// Returns certificates that satisfy the selector. Stores backed by remote resources return an
    /// empty vector when the resource cannot be retrieved.
    fn get_certificates(&self, selector: &CertSelector) -> Result<Vec<PDVCertificate>>;

    /// Returns CRLs that satisfy the selector.
    fn get_crls(&self, selector: &CrlSelector) -> Result<Vec<CertificateList>>;

    /// Short label used in log output
    fn describe(&self) -> String {
        String::from("CertStore")
    }
}

/// The [`PathChecker`] trait allows callers to add certificate checks to path building.
///
/// Checkers that support forward checking are invoked on each candidate as it is considered, in
/// order from target toward trust anchor. All other checkers are invoked on completed paths, in
/// order from the certificate issued by the trust anchor toward the target.
pub trait PathChecker: Send + Sync {
    /// Name used in log output
    fn name(&self) -> &str;

    /// Returns true if the checker can process certificates from target toward trust anchor.
    fn is_forward_checking_supported(&self) -> bool;

    /// Extension OIDs this checker processes. Critical extensions in this list are not treated as
    /// unrecognized.
    fn supported_extensions(&self) -> Vec<ObjectIdentifier>;

    /// Checks a certificate, removing any extension OIDs it processed from `unresolved`.
    fn check(
        &self,
        pe: &PkiEnvironment,
        cert: &PDVCertificate,
        unresolved: &mut BTreeSet<ObjectIdentifier>,
    ) -> Result<()>;
}

/// Type of artifact expected from a URI
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum FetchKind {
    /// DER encoded certificate or PKCS #7 certs-only bundle
    Certificates,
    /// DER encoded CRL
    Crl,
}

/// Outcome of a conditional fetch
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchResponse {
    /// The origin reported that the resource has not changed since the supplied last modified value
    NotModified,
    /// Fresh content along with the last modified value reported by the origin, if any
    Content {
        /// Resource content
        bytes: Vec<u8>,
        /// Last-Modified value from the origin
        last_modified: Option<String>,
    },
}

/// The [`UriFetcher`] trait performs conditional retrieval of remote certificates and CRLs.
pub trait UriFetcher: Send + Sync {
    /// Retrieves `uri`. When `last_modified` is present it is sent as an If-Modified-Since value and
    /// [`FetchResponse::NotModified`] is returned if the origin reports no change.
    fn fetch(&self, uri: &str, kind: FetchKind, last_modified: Option<&str>)
        -> Result<FetchResponse>;
}

/// The [`OcspTransport`] trait sends encoded OCSP requests and returns encoded responses.
pub trait OcspTransport: Send + Sync {
    /// Sends an HTTP GET to the given URL, which already carries the encoded request.
    fn get(&self, url: &str) -> Result<Vec<u8>>;

    /// Sends an HTTP POST with content type application/ocsp-request.
    fn post(&self, url: &str, request: &[u8]) -> Result<Vec<u8>>;
}

/// The [`DirectoryStoreProvider`] trait supplies stores for ldap and ldaps URIs. Returned stores
/// perform their own caching.
pub trait DirectoryStoreProvider: Send + Sync {
    /// Returns a store for the URI or None if the URI cannot be served.
    fn get_store(&self, uri: &str) -> Option<Arc<dyn CertStore>>;
}

/// The [`Clock`] trait supplies the current time, in seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> u64;
}

/// [`Clock`] implementation that reads the system clock
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs(),
            Err(_) => 0,
        }
    }
}
