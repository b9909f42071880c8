//! Inputs to a single path building operation

use std::collections::BTreeSet;
use std::sync::Arc;

use der::asn1::ObjectIdentifier;
use log::error;
use x509_cert::name::Name;

use crate::environment::pki_environment_traits::{CertStore, PathChecker};
use crate::source::cert_source::CollectionCertStore;
use crate::util::error::*;
use crate::{CertSelector, PDVCertificate, PathSettings, TrustAnchor};

/// [`BuilderParams`] combines the [`PathSettings`] governing a build (time of interest, maximum
/// path length, initial policy values, AIA handling) with the target selector, the trust anchors,
/// caller supplied checkers and the certificate stores to search.
#[derive(Clone)]
pub struct BuilderParams {
    /// Settings governing path building and validation
    pub settings: PathSettings,
    /// Criteria the target certificate must satisfy
    pub target_selector: CertSelector,
    /// Trust anchors at which a path may terminate
    pub trust_anchors: Vec<TrustAnchor>,
    /// Caller supplied certificate checks
    pub checkers: Vec<Arc<dyn PathChecker>>,
    /// Certificate stores searched for the target and intermediate CA certificates
    pub stores: Vec<Arc<dyn CertStore>>,
}

impl BuilderParams {
    /// Creates parameters for a build. Fails with `MissingTrustAnchor` when no trust anchors are
    /// provided. When the selector names a specific certificate, that certificate is made available
    /// through a store ahead of any added later.
    pub fn new(
        settings: PathSettings,
        target_selector: CertSelector,
        trust_anchors: Vec<TrustAnchor>,
    ) -> Result<BuilderParams> {
        if trust_anchors.is_empty() {
            error!("At least one trust anchor is required to build a certification path");
            return Err(Error::PathValidation(
                PathValidationStatus::MissingTrustAnchor,
            ));
        }
        let mut stores: Vec<Arc<dyn CertStore>> = vec![];
        if let Some(target) = &target_selector.certificate {
            stores.push(Arc::new(CollectionCertStore::from_certs(vec![target.clone()])));
        }
        Ok(BuilderParams {
            settings,
            target_selector,
            trust_anchors,
            checkers: vec![],
            stores,
        })
    }

    /// Creates parameters for building a path for the given target certificate
    pub fn for_target(
        settings: PathSettings,
        target: &PDVCertificate,
        trust_anchors: Vec<TrustAnchor>,
    ) -> Result<BuilderParams> {
        BuilderParams::new(settings, CertSelector::for_certificate(target), trust_anchors)
    }

    /// Adds a certificate store
    pub fn add_store(&mut self, store: Arc<dyn CertStore>) {
        self.stores.push(store);
    }

    /// Adds a caller supplied checker
    pub fn add_checker(&mut self, checker: Arc<dyn PathChecker>) {
        self.checkers.push(checker);
    }

    /// Time of interest, or None when validity is not evaluated
    pub fn date(&self) -> Option<u64> {
        match self.settings.get_time_of_interest() {
            0 => None,
            toi => Some(toi),
        }
    }

    /// Checkers that process candidates as they are considered
    pub fn forward_checkers(&self) -> Vec<Arc<dyn PathChecker>> {
        self.checkers
            .iter()
            .filter(|c| c.is_forward_checking_supported())
            .cloned()
            .collect()
    }

    /// Checkers that process completed paths
    pub fn reverse_checkers(&self) -> Vec<Arc<dyn PathChecker>> {
        self.checkers
            .iter()
            .filter(|c| !c.is_forward_checking_supported())
            .cloned()
            .collect()
    }

    /// Extensions processed by caller supplied checkers
    pub fn supported_extensions(&self) -> BTreeSet<ObjectIdentifier> {
        self.checkers
            .iter()
            .flat_map(|c| c.supported_extensions())
            .collect()
    }

    /// Subject names of the trust anchors
    pub fn trusted_subjects(&self) -> Vec<Name> {
        self.trust_anchors
            .iter()
            .map(|ta| ta.subject().clone())
            .collect()
    }

    /// Returns true if the certificate is one of the trust anchors
    pub fn is_trusted_cert(&self, cert: &PDVCertificate) -> bool {
        self.trust_anchors
            .iter()
            .any(|ta| ta.certificate() == Some(cert))
    }
}
