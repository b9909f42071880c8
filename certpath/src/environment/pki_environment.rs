//! PkiEnvironment aggregates a set of function pointers and shared objects that supply
//! functionality useful when building certification paths or checking revocation status.
//!
//! The sample below illustrates preparation of a PkiEnvironment object for use in building
//! certification paths.
//! ```
//! use certpath::*;
//!
//! let mut pe = PkiEnvironment::default();
//!
//! // add basic hashing and signature verification capabilities
//! populate_5280_pki_environment(&mut pe);
//!
//! // algorithm constraints default to the process-wide disabled algorithm list
//! let constraints = DisabledAlgorithmConstraints::parse("MD5, RSA keySize < 2048").unwrap();
//! pe.set_algorithm_constraints(std::sync::Arc::new(constraints));
//! ```
//!
//! The aggregation of function pointers allows for implementations of cryptographic features to
//! vary, i.e., an application may supply signature verification backed by a hardware module.

use std::sync::Arc;

use log::debug;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::{
    environment::pki_environment_traits::*, util::crypto::*, util::error::*,
    validator::algorithm_checker::*, UriStoreCache,
};

/// [`PkiEnvironment`] provides a switchboard of callback functions that allow support to vary on
/// different platforms or to allow support to be tailored for specific use cases. It also carries
/// the algorithm constraints and the remote store cache consulted while building paths.
#[derive(Clone)]
pub struct PkiEnvironment {
    /// List of functions that provide a message digest functionality
    calculate_hash_callbacks: Vec<CalculateHash>,

    /// List of functions that provide a signature verification functionality given a message
    verify_signature_message_callbacks: Vec<VerifySignatureMessage>,

    /// Algorithm constraints consulted by the algorithm checker and the OCSP client
    algorithm_constraints: Arc<dyn AlgorithmConstraints>,

    /// Cache of URI-backed stores used when following AIA caIssuers references
    uri_store_cache: Option<Arc<UriStoreCache>>,
}

impl Default for PkiEnvironment {
    /// PkiEnvironment::default returns a new [`PkiEnvironment`] with empty callback vectors, the
    /// default algorithm constraints and no URI store cache.
    fn default() -> Self {
        PkiEnvironment::new()
    }
}

impl PkiEnvironment {
    /// PkiEnvironment::new returns a new [`PkiEnvironment`] with empty callback vectors
    pub fn new() -> PkiEnvironment {
        PkiEnvironment {
            calculate_hash_callbacks: vec![],
            verify_signature_message_callbacks: vec![],
            algorithm_constraints: default_algorithm_constraints(),
            uri_store_cache: None,
        }
    }

    /// clear_all_callbacks clears the contents of all function pointer vectors associated with an
    /// instance of [`PkiEnvironment`].
    pub fn clear_all_callbacks(&mut self) {
        self.clear_calculate_hash_callbacks();
        self.clear_verify_signature_message_callbacks();
    }

    /// add_calculate_hash_callback adds a [`CalculateHash`] callback to the list used by calculate_hash.
    pub fn add_calculate_hash_callback(&mut self, c: CalculateHash) {
        self.calculate_hash_callbacks.push(c);
    }

    /// clear_calculate_hash_callbacks clears the list of [`CalculateHash`] callbacks used by calculate_hash.
    pub fn clear_calculate_hash_callbacks(&mut self) {
        self.calculate_hash_callbacks.clear();
    }

    /// calculate_hash iterates over calculate_hash_callbacks until an authoritative answer is found
    /// or all options have been exhausted
    pub fn calculate_hash(
        &self,
        pe: &PkiEnvironment,
        hash_alg: &AlgorithmIdentifierOwned,
        buffer_to_hash: &[u8],
    ) -> Result<Vec<u8>> {
        for f in &self.calculate_hash_callbacks {
            let r = f(pe, hash_alg, buffer_to_hash);
            if let Ok(r) = r {
                return Ok(r);
            }
        }
        Err(Error::Unrecognized)
    }

    /// add_verify_signature_message_callback adds a [`VerifySignatureMessage`] callback to the list
    /// used by verify_signature_message.
    pub fn add_verify_signature_message_callback(&mut self, c: VerifySignatureMessage) {
        self.verify_signature_message_callbacks.push(c);
    }

    /// clear_verify_signature_message_callbacks clears the list of [`VerifySignatureMessage`]
    /// callbacks used by verify_signature_message.
    pub fn clear_verify_signature_message_callbacks(&mut self) {
        self.verify_signature_message_callbacks.clear();
    }

    /// verify_signature_message iterates over verify_signature_message_callbacks until an
    /// authoritative answer is found or all options have been exhausted. When no callback verifies
    /// the signature, `SignatureVerificationFailure` is returned.
    pub fn verify_signature_message(
        &self,
        pe: &PkiEnvironment,
        message_to_verify: &[u8],                 // buffer to verify
        signature: &[u8],                         // signature
        signature_alg: &AlgorithmIdentifierOwned, // signature algorithm
        spki: &SubjectPublicKeyInfoOwned,         // public key
    ) -> Result<()> {
        for f in &self.verify_signature_message_callbacks {
            match f(pe, message_to_verify, signature, signature_alg, spki) {
                Ok(r) => return Ok(r),
                Err(e) => debug!("Signature verification callback failed: {}", e),
            }
        }
        Err(Error::PathValidation(
            PathValidationStatus::SignatureVerificationFailure,
        ))
    }

    /// Replaces the algorithm constraints consulted during path building and OCSP processing.
    pub fn set_algorithm_constraints(&mut self, constraints: Arc<dyn AlgorithmConstraints>) {
        self.algorithm_constraints = constraints;
    }

    /// Returns the algorithm constraints.
    pub fn algorithm_constraints(&self) -> Arc<dyn AlgorithmConstraints> {
        self.algorithm_constraints.clone()
    }

    /// Sets the cache used to resolve AIA caIssuers references.
    pub fn set_uri_store_cache(&mut self, cache: Arc<UriStoreCache>) {
        self.uri_store_cache = Some(cache);
    }

    /// Returns the cache used to resolve AIA caIssuers references, if any.
    pub fn uri_store_cache(&self) -> Option<&Arc<UriStoreCache>> {
        self.uri_store_cache.as_ref()
    }
}

/// `populate_5280_pki_environment` populates a [`PkiEnvironment`] instance with a default set of
/// callback functions.
///
/// The following callbacks are added:
/// - [`calculate_hash_rust_crypto`]
/// - [`verify_signature_message_rust_crypto`]
pub fn populate_5280_pki_environment(pe: &mut PkiEnvironment) {
    pe.add_calculate_hash_callback(calculate_hash_rust_crypto);
    pe.add_verify_signature_message_callback(verify_signature_message_rust_crypto);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::pdv_alg_oids::PKIXALG_SHA256;

    #[test]
    fn empty_environment_test() {
        let pe = PkiEnvironment::new();
        let hash_alg = AlgorithmIdentifierOwned {
            oid: PKIXALG_SHA256,
            parameters: None,
        };
        assert_eq!(
            Err(Error::Unrecognized),
            pe.calculate_hash(&pe, &hash_alg, b"abc")
        );
        assert!(pe.uri_store_cache().is_none());

        let mut pe = PkiEnvironment::default();
        populate_5280_pki_environment(&mut pe);
        assert!(pe.calculate_hash(&pe, &hash_alg, b"abc").is_ok());
        pe.clear_all_callbacks();
        assert!(pe.calculate_hash(&pe, &hash_alg, b"abc").is_err());
    }
}
