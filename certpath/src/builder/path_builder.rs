//! Capabilities shared by certification path building strategies
//!
//! A [`PathBuilder`] discovers candidate certificates, verifies each candidate against the state
//! accumulated so far and recognizes when a candidate completes a path to a trust anchor. The
//! search driving a builder is implemented by [`build_path`](crate::build_path).

use std::sync::Arc;

use crate::environment::pki_environment_traits::CertStore;
use crate::util::error::*;
use crate::{PDVCertificate, TrustAnchor};

/// Direction in which a [`PathBuilder`] traverses candidate certificates
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// From the target toward a trust anchor
    Forward,
}

/// `PathValidationState` accumulates the progress of path building. Each accepted certificate
/// yields a new state, so the state belonging to an abandoned branch is simply dropped when the
/// search backtracks.
pub trait PathValidationState: Clone {
    /// Returns true until the first (target) certificate has been accepted.
    fn is_initial(&self) -> bool;

    /// Folds an accepted certificate into the state.
    fn update_state(&mut self, cert: &PDVCertificate) -> Result<()>;
}

/// `PathBuilder` is the capability implemented by a path building strategy.
pub trait PathBuilder {
    /// State threaded through the search
    type State: PathValidationState;

    /// Direction in which this builder traverses certificates
    fn direction(&self) -> Direction;

    /// Returns the state used to begin a search.
    fn initial_state(&self) -> Self::State;

    /// Returns candidates for the next position in the path, in the order they should be tried.
    fn get_matching_certs(
        &self,
        state: &Self::State,
        stores: &[Arc<dyn CertStore>],
    ) -> CandidateResult<Vec<PDVCertificate>>;

    /// Verifies that `cert` may occupy the next position given the state and the certificates
    /// accepted so far. The state may be updated with checker progress.
    fn verify_cert(
        &self,
        cert: &PDVCertificate,
        state: &mut Self::State,
        path: &[PDVCertificate],
    ) -> CandidateResult<()>;

    /// Returns the trust anchor that `cert` chains to or represents, if any.
    fn is_path_completed(&self, cert: &PDVCertificate) -> Option<&TrustAnchor>;

    /// Appends an accepted certificate to the path.
    fn add_cert_to_path(&self, cert: &PDVCertificate, path: &mut Vec<PDVCertificate>);

    /// Removes the most recently appended certificate when backtracking.
    fn remove_final_cert_from_path(&self, path: &mut Vec<PDVCertificate>);
}
