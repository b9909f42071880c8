//! Limits on the work performed by a single path building operation

use std::cell::Cell;

use log::error;

use crate::util::error::*;

/// Default number of signature verifications a search may perform
pub const MAX_SIGNATURE_VERIFICATIONS: usize = 100;

/// Default number of candidate verifications a search may perform
pub const MAX_CANDIDATE_VERIFICATIONS: usize = 200000;

/// [`SearchBudget`] counts signature and candidate verifications. Once either limit is reached the
/// budget is exhausted and the search is abandoned with [`Error::BudgetExceeded`].
#[derive(Debug)]
pub struct SearchBudget {
    max_signatures: usize,
    max_candidates: usize,
    signatures: Cell<usize>,
    candidates: Cell<usize>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        SearchBudget::new(MAX_SIGNATURE_VERIFICATIONS, MAX_CANDIDATE_VERIFICATIONS)
    }
}

impl SearchBudget {
    /// Creates a budget with the given limits
    pub fn new(max_signatures: usize, max_candidates: usize) -> SearchBudget {
        SearchBudget {
            max_signatures,
            max_candidates,
            signatures: Cell::new(0),
            candidates: Cell::new(0),
        }
    }

    /// Records `count` signature verifications. Returns false, without recording anything, when
    /// doing so would exceed the limit.
    pub fn try_consume_signatures(&self, count: usize) -> bool {
        let used = self.signatures.get() + count;
        if used > self.max_signatures {
            self.signatures.set(self.max_signatures + 1);
            return false;
        }
        self.signatures.set(used);
        true
    }

    /// Records a candidate verification, failing when the limit has been reached.
    pub fn consume_candidate(&self) -> Result<()> {
        let used = self.candidates.get() + 1;
        self.candidates.set(used);
        if used > self.max_candidates {
            error!(
                "Path building abandoned after {} candidate verifications",
                self.max_candidates
            );
            return Err(Error::BudgetExceeded);
        }
        Ok(())
    }

    /// Fails if either limit has been exceeded.
    pub fn check(&self) -> Result<()> {
        if self.signatures.get() > self.max_signatures {
            error!(
                "Path building abandoned after {} signature verifications",
                self.max_signatures
            );
            return Err(Error::BudgetExceeded);
        }
        if self.candidates.get() > self.max_candidates {
            return Err(Error::BudgetExceeded);
        }
        Ok(())
    }

    /// Signature verifications recorded so far
    pub fn signatures_used(&self) -> usize {
        self.signatures.get().min(self.max_signatures)
    }

    /// Candidate verifications recorded so far
    pub fn candidates_used(&self) -> usize {
        self.candidates.get()
    }
}

#[test]
fn budget_limits() {
    let b = SearchBudget::new(3, 2);
    assert!(b.try_consume_signatures(2));
    assert!(b.check().is_ok());
    assert!(!b.try_consume_signatures(2));
    assert_eq!(Err(Error::BudgetExceeded), b.check());
    assert_eq!(3, b.signatures_used());

    let b = SearchBudget::new(3, 2);
    assert!(b.consume_candidate().is_ok());
    assert!(b.consume_candidate().is_ok());
    assert_eq!(Err(Error::BudgetExceeded), b.consume_candidate());
    assert_eq!(Err(Error::BudgetExceeded), b.check());

    let b = SearchBudget::default();
    assert!(b.try_consume_signatures(MAX_SIGNATURE_VERIFICATIONS));
    assert!(b.check().is_ok());
}
