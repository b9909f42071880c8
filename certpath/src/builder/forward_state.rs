//! State accumulated while building a certification path from the target toward a trust anchor

use std::sync::Arc;

use x509_cert::name::Name;

use crate::builder::path_builder::PathValidationState;
use crate::environment::pki_environment_traits::PathChecker;
use crate::util::error::*;
use crate::PDVCertificate;

/// [`ForwardState`] records the certificate most recently accepted into the path, the issuer name
/// expected of the next candidate, the number of CA certificates traversed and the caller supplied
/// checkers that process certificates as they are accepted.
#[derive(Clone)]
pub struct ForwardState {
    /// Issuer name of the most recently accepted certificate
    pub issuer_name: Option<Name>,
    /// Most recently accepted certificate
    pub cert: Option<PDVCertificate>,
    /// Number of non-self-issued CA certificates accepted after the target
    pub traversed_ca_certs: usize,
    /// True until the target certificate has been accepted
    pub init: bool,
    /// Checkers that run on each candidate as it is considered
    pub forward_checkers: Vec<Arc<dyn PathChecker>>,
}

impl ForwardState {
    /// Creates an initial state carrying the forward-capable checkers
    pub fn new(forward_checkers: Vec<Arc<dyn PathChecker>>) -> ForwardState {
        ForwardState {
            issuer_name: None,
            cert: None,
            traversed_ca_certs: 0,
            init: true,
            forward_checkers,
        }
    }
}

impl Default for ForwardState {
    fn default() -> Self {
        ForwardState::new(vec![])
    }
}

impl PathValidationState for ForwardState {
    fn is_initial(&self) -> bool {
        self.init
    }

    fn update_state(&mut self, cert: &PDVCertificate) -> Result<()> {
        if !cert.is_self_issued() && !self.init && cert.is_ca() {
            self.traversed_ca_certs += 1;
        }
        self.issuer_name = Some(cert.issuer().clone());
        self.cert = Some(cert.clone());
        self.init = false;
        Ok(())
    }
}
