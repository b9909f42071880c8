//! Depth-first certification path building from the target toward a trust anchor
//!
//! ```no_run
//! use std::sync::Arc;
//! use certpath::*;
//!
//! let mut pe = PkiEnvironment::default();
//! populate_5280_pki_environment(&mut pe);
//!
//! let mut tas = TaSource::new();
//! tas.add_folder("/some/path/tas", 0).unwrap();
//! let mut cas = CollectionCertStore::new();
//! cas.add_folder("/some/path/cas", 0).unwrap();
//!
//! let target = parse_cert(&std::fs::read("/some/path/target.der").unwrap(), "target.der").unwrap();
//! let mut params =
//!     BuilderParams::for_target(PathSettings::default(), &target, tas.into_trust_anchors()).unwrap();
//! params.add_store(Arc::new(cas));
//!
//! let result = build_path(&pe, &params).unwrap();
//! for cert in &result.path.certificates {
//!     println!("{}", name_to_string(cert.subject()));
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::sync::Arc;

use der::asn1::ObjectIdentifier;
use der::Decode;
use log::{debug, info, warn};
use x509_cert::name::Name;

use crate::builder::budget::SearchBudget;
use crate::builder::builder_params::BuilderParams;
use crate::builder::comparator::CandidateComparator;
use crate::builder::forward_state::ForwardState;
use crate::builder::path_builder::*;
use crate::environment::pki_environment::PkiEnvironment;
use crate::environment::pki_environment_traits::CertStore;
use crate::util::error::*;
use crate::util::pdv_utilities::*;
use crate::validator::algorithm_checker::*;
use crate::validator::path_validator::{validate_path, PathValidationResult, PROCESSED_EXTENSIONS};
use crate::validator::policy_checker::PolicyChecker;
use crate::{
    CertSelector, CertificationPath, DeferDecodeSigned, PDVCertificate, TrustAnchor,
    BC_ANY, BC_END_ENTITY_ONLY,
};

thread_local! {
    static AIA_FETCH_IN_PROGRESS: Cell<bool> = Cell::new(false);
}

/// Marks AIA retrieval as in progress on the current thread until dropped. Retrieval may consult
/// stores that build paths of their own, which must not recurse into AIA retrieval.
struct AiaFetchGuard;

impl AiaFetchGuard {
    fn acquire() -> Option<AiaFetchGuard> {
        AIA_FETCH_IN_PROGRESS.with(|f| {
            if f.get() {
                None
            } else {
                f.set(true);
                Some(AiaFetchGuard)
            }
        })
    }
}

impl Drop for AiaFetchGuard {
    fn drop(&mut self) {
        AIA_FETCH_IN_PROGRESS.with(|f| f.set(false));
    }
}

/// Outcome of a successful path building operation
#[derive(Clone, Debug)]
pub struct PathBuilderResult {
    /// The certification path, target first
    pub path: CertificationPath,
    /// Results of validating the completed path
    pub validation: PathValidationResult,
}

/// [`ForwardBuilder`] discovers paths from the target toward a trust anchor.
pub struct ForwardBuilder<'a> {
    pe: &'a PkiEnvironment,
    params: &'a BuilderParams,
    budget: SearchBudget,
    trusted_subjects: Vec<Name>,
    algorithm_checker: AlgorithmChecker,
    policy_filter: Option<BTreeSet<ObjectIdentifier>>,
    reverse_extensions: BTreeSet<ObjectIdentifier>,
    last_rejection: RefCell<Option<PathValidationStatus>>,
}

impl<'a> ForwardBuilder<'a> {
    /// Creates a builder for the parameters using the default search budget
    pub fn new(pe: &'a PkiEnvironment, params: &'a BuilderParams) -> ForwardBuilder<'a> {
        ForwardBuilder::with_budget(pe, params, SearchBudget::default())
    }

    /// Creates a builder for the parameters with an explicit search budget
    pub fn with_budget(
        pe: &'a PkiEnvironment,
        params: &'a BuilderParams,
        budget: SearchBudget,
    ) -> ForwardBuilder<'a> {
        let reverse_extensions = params
            .reverse_checkers()
            .iter()
            .flat_map(|c| c.supported_extensions())
            .collect();
        ForwardBuilder {
            pe,
            params,
            budget,
            trusted_subjects: params.trusted_subjects(),
            algorithm_checker: AlgorithmChecker::new(
                pe.algorithm_constraints(),
                None,
                &params.settings.get_validation_variant(),
            ),
            policy_filter: PolicyChecker::from_settings(&params.settings).end_entity_policy_filter(),
            reverse_extensions,
            last_rejection: RefCell::new(None),
        }
    }

    /// The search budget consumed by this builder
    pub fn budget(&self) -> &SearchBudget {
        &self.budget
    }

    fn reject(&self, cert: &PDVCertificate, status: PathValidationStatus) -> CandidateError {
        log_rejection(cert, status);
        *self.last_rejection.borrow_mut() = Some(status);
        CandidateError::Rejected(status)
    }

    fn add_matching_certs(
        &self,
        selector: &CertSelector,
        stores: &[Arc<dyn CertStore>],
        certs: &mut Vec<PDVCertificate>,
    ) {
        for store in stores {
            match store.get_certificates(selector) {
                Ok(found) => {
                    for c in found {
                        if !certs.contains(&c) {
                            certs.push(c);
                        }
                    }
                }
                Err(e) => {
                    debug!("Failed to retrieve certificates from {}: {}", store.describe(), e);
                }
            }
        }
    }

    fn get_matching_ee_certs(&self, stores: &[Arc<dyn CertStore>], certs: &mut Vec<PDVCertificate>) {
        let mut selector = self.params.target_selector.clone();
        if let Some(date) = self.params.date() {
            selector.certificate_valid = Some(date);
        }
        if let Some(policies) = &self.policy_filter {
            selector.policy = Some(policies.clone());
        }
        selector.basic_constraints = BC_END_ENTITY_ONLY;
        self.add_matching_certs(&selector, stores, certs);
    }

    fn get_matching_ca_certs(
        &self,
        state: &ForwardState,
        stores: &[Arc<dyn CertStore>],
        certs: &mut Vec<PDVCertificate>,
    ) {
        let mut selector = if state.is_initial() {
            if !self.params.target_selector.allows_ca() {
                return;
            }
            self.params.target_selector.clone()
        } else {
            match &state.issuer_name {
                Some(issuer) => CertSelector::for_subject(issuer),
                None => return,
            }
        };

        selector.basic_constraints = BC_ANY;
        for ta in &self.params.trust_anchors {
            if let Some(ta_cert) = ta.certificate() {
                if selector.matches(ta_cert) && !certs.contains(ta_cert) {
                    certs.push(ta_cert.clone());
                }
            }
        }

        selector.certificate_valid = self.params.date();
        selector.basic_constraints = state.traversed_ca_certs as i32;
        let max_path_length = self.params.settings.get_max_path_length();
        let depth = self.params.settings.get_effective_max_path_length();
        if (max_path_length == -1 || max_path_length > state.traversed_ca_certs as i32)
            && state.traversed_ca_certs < depth
        {
            self.add_matching_certs(&selector, stores, certs);
        } else {
            debug!(
                "Not searching stores for issuers: {} CA certificates traversed",
                state.traversed_ca_certs
            );
            return;
        }

        // AIA is consulted only when anchors and stores produced nothing
        if certs.is_empty() && !state.is_initial() && self.params.settings.get_follow_aia() {
            if let Some(cert) = &state.cert {
                self.get_certs_from_aia(cert, &selector, certs);
            }
        }
    }

    fn get_certs_from_aia(
        &self,
        cert: &PDVCertificate,
        selector: &CertSelector,
        certs: &mut Vec<PDVCertificate>,
    ) {
        let cache = match self.pe.uri_store_cache() {
            Some(cache) => cache,
            None => return,
        };
        let uris = get_ca_issuers_uris(cert);
        if uris.is_empty() {
            return;
        }
        let _guard = match AiaFetchGuard::acquire() {
            Some(g) => g,
            None => {
                debug!("Skipping nested AIA retrieval");
                return;
            }
        };
        for uri in uris {
            if let Some(store) = cache.get_store_for_aia(&uri) {
                let before = certs.len();
                self.add_matching_certs(selector, &[store], certs);
                info!(
                    "Retrieved {} candidate issuer certificates from {}",
                    certs.len() - before,
                    uri
                );
            }
        }
    }

    fn verify_signature_quietly(&self, cert: &PDVCertificate, ta: &TrustAnchor) -> bool {
        if !self.budget.try_consume_signatures(1) {
            return false;
        }
        match DeferDecodeSigned::from_der(cert.encoded_cert.as_slice()) {
            Ok(dc) => self
                .pe
                .verify_signature_message(
                    self.pe,
                    &dc.tbs_field,
                    dc.signature.raw_bytes(),
                    &dc.signature_algorithm,
                    ta.public_key(),
                )
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Validates a completed path, anchor-adjacent first, including caller supplied checkers that
    /// do not support forward checking.
    fn validate_completed_path(&self, cp: &CertificationPath) -> Result<PathValidationResult> {
        if !self.budget.try_consume_signatures(cp.len()) {
            return Err(Error::BudgetExceeded);
        }
        let supported = self.params.supported_extensions();
        let result = validate_path(self.pe, &self.params.settings, cp, &supported)?;

        for cert in cp.certificates.iter().rev() {
            let mut unresolved: BTreeSet<ObjectIdentifier> =
                cert.critical_extensions().into_iter().collect();
            for checker in self.params.reverse_checkers() {
                checker.check(self.pe, cert, &mut unresolved)?;
            }
        }
        Ok(result)
    }

    fn search(
        &self,
        state: &ForwardState,
        path: &mut Vec<PDVCertificate>,
    ) -> CandidateResult<Option<PathBuilderResult>> {
        let candidates = self.get_matching_certs(state, &self.params.stores)?;
        debug!(
            "Found {} candidates at depth {}",
            candidates.len(),
            path.len()
        );

        for cert in candidates {
            let mut next_state = state.clone();
            match self.verify_cert(&cert, &mut next_state, path) {
                Ok(()) => {}
                Err(CandidateError::Rejected(_)) => continue,
                Err(fatal) => return Err(fatal),
            }

            if let Some(ta) = self.is_path_completed(&cert) {
                self.budget.check()?;
                let mut certs = path.clone();
                if certs.is_empty() || ta.certificate() != Some(&cert) {
                    certs.push(cert.clone());
                }
                let cp = CertificationPath::new(ta.clone(), certs);
                match self.validate_completed_path(&cp) {
                    Ok(validation) => {
                        info!("Found path terminating at {}", ta.describe());
                        return Ok(Some(PathBuilderResult {
                            path: cp,
                            validation,
                        }));
                    }
                    Err(e) => match CandidateError::from(e) {
                        CandidateError::Rejected(status) => {
                            debug!(
                                "Completed path terminating at {} failed validation: {}",
                                ta.describe(),
                                status
                            );
                            *self.last_rejection.borrow_mut() = Some(status);
                            continue;
                        }
                        fatal => return Err(fatal),
                    },
                }
            }
            self.budget.check()?;

            next_state.update_state(&cert)?;
            self.add_cert_to_path(&cert, path);
            let found = self.search(&next_state, path)?;
            if found.is_some() {
                return Ok(found);
            }
            self.remove_final_cert_from_path(path);
        }
        Ok(None)
    }

    /// Runs the search. Returns the first path that completes and validates, or the last reason a
    /// candidate was rejected, or `NoPathsFound`.
    pub fn build(&self) -> Result<PathBuilderResult> {
        let state = self.initial_state();
        let mut path = vec![];
        match self.search(&state, &mut path) {
            Ok(Some(result)) => Ok(result),
            Ok(None) => {
                let status = self
                    .last_rejection
                    .borrow()
                    .unwrap_or(PathValidationStatus::NoPathsFound);
                warn!("Failed to find a valid certification path: {}", status);
                Err(Error::PathValidation(status))
            }
            Err(CandidateError::Rejected(status)) => Err(Error::PathValidation(status)),
            Err(CandidateError::Fatal(e)) => Err(e),
        }
    }
}

impl<'a> PathBuilder for ForwardBuilder<'a> {
    type State = ForwardState;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn initial_state(&self) -> ForwardState {
        ForwardState::new(self.params.forward_checkers())
    }

    fn get_matching_certs(
        &self,
        state: &ForwardState,
        stores: &[Arc<dyn CertStore>],
    ) -> CandidateResult<Vec<PDVCertificate>> {
        let mut certs = vec![];
        if state.is_initial() {
            self.get_matching_ee_certs(stores, &mut certs);
        }
        self.get_matching_ca_certs(state, stores, &mut certs);

        if state.is_initial() && certs.is_empty() {
            *self.last_rejection.borrow_mut() = Some(PathValidationStatus::MissingCertificate);
        }
        let comparator = CandidateComparator::new(&self.trusted_subjects, state.cert.as_ref());
        comparator.sort(&mut certs);
        Ok(certs)
    }

    fn verify_cert(
        &self,
        cert: &PDVCertificate,
        state: &mut ForwardState,
        path: &[PDVCertificate],
    ) -> CandidateResult<()> {
        self.budget.consume_candidate()?;

        if path
            .iter()
            .any(|c| compare_names(c.subject(), cert.subject()) && c.public_key() == cert.public_key())
        {
            return Err(self.reject(cert, PathValidationStatus::CertificateAlreadyInPath));
        }

        let is_trusted_cert = self.params.is_trusted_cert(cert);
        if !is_trusted_cert {
            let mut unresolved: BTreeSet<ObjectIdentifier> =
                cert.critical_extensions().into_iter().collect();
            for checker in &state.forward_checkers {
                if let Err(e) = checker.check(self.pe, cert, &mut unresolved) {
                    debug!("{} rejected candidate: {}", checker.name(), e);
                    return match CandidateError::from(e) {
                        CandidateError::Rejected(status) => Err(self.reject(cert, status)),
                        fatal => Err(fatal),
                    };
                }
            }
            for oid in &self.reverse_extensions {
                unresolved.remove(oid);
            }
            for oid in PROCESSED_EXTENSIONS {
                unresolved.remove(oid);
            }
            if !unresolved.is_empty() {
                for oid in &unresolved {
                    warn!(
                        "Certificate issued to {} contains unrecognized critical extension {}",
                        name_to_string(cert.subject()),
                        oid
                    );
                }
                return Err(self.reject(cert, PathValidationStatus::UnprocessedCriticalExtension));
            }
        }

        if let Err(e) = self
            .algorithm_checker
            .check(&AlgorithmCheckContext::standalone(), cert)
        {
            return match CandidateError::from(e) {
                CandidateError::Rejected(status) => Err(self.reject(cert, status)),
                fatal => Err(fatal),
            };
        }

        if state.is_initial() || is_trusted_cert {
            return Ok(());
        }

        match cert.basic_constraints() {
            Some(bc) if bc.ca => {}
            Some(_) => {
                return Err(self.reject(cert, PathValidationStatus::InvalidBasicConstraints))
            }
            None => {
                return Err(self.reject(cert, PathValidationStatus::MissingBasicConstraints))
            }
        }
        match cert.key_usage_bits() {
            Ok(Some(ku)) if !ku[5] => {
                Err(self.reject(cert, PathValidationStatus::InvalidKeyUsage))
            }
            Ok(_) => Ok(()),
            Err(_) => Err(self.reject(cert, PathValidationStatus::InvalidKeyUsage)),
        }
    }

    fn is_path_completed(&self, cert: &PDVCertificate) -> Option<&TrustAnchor> {
        let mut other_anchors = vec![];
        for ta in &self.params.trust_anchors {
            if let Some(ta_cert) = ta.certificate() {
                if ta_cert == cert {
                    return Some(ta);
                }
                continue;
            }
            if ta.matches_name_and_key(cert) {
                return Some(ta);
            }
            other_anchors.push(ta);
        }

        for ta in other_anchors {
            if !compare_names(ta.subject(), cert.issuer()) {
                continue;
            }
            if is_dsa_key_missing_parameters(ta.public_key()) {
                continue;
            }
            if self.verify_signature_quietly(cert, ta) {
                return Some(ta);
            }
        }
        None
    }

    fn add_cert_to_path(&self, cert: &PDVCertificate, path: &mut Vec<PDVCertificate>) {
        path.push(cert.clone());
    }

    fn remove_final_cert_from_path(&self, path: &mut Vec<PDVCertificate>) {
        path.pop();
    }
}

/// `build_path` searches the stores in `params` for a certification path from the target to one
/// of the trust anchors, validating each completed path before returning it.
pub fn build_path(pe: &PkiEnvironment, params: &BuilderParams) -> Result<PathBuilderResult> {
    let builder = ForwardBuilder::new(pe, params);
    let r = builder.build();
    debug!(
        "Path building used {} signature verifications and {} candidate verifications",
        builder.budget().signatures_used(),
        builder.budget().candidates_used()
    );
    r
}
