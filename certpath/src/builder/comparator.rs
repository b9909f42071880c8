//! Ordering of candidate issuer certificates
//!
//! Candidates are tried in ascending order of the key (tier, distance, encoding):
//!
//! - tier 0: the subject key identifier matches the authority key identifier of the previously
//!   accepted certificate
//! - tier 1: the issuer name is the subject name of a trust anchor
//! - tier 2: the issuer name shares a common ancestor with a trust anchor subject that is not
//!   purely geographic, with `distance` being the naming distance to the nearest such subject
//! - tier 3: everything else
//!
//! The encoding breaks ties, so only identical certificates compare equal.

use std::cmp::Ordering;

use x509_cert::name::Name;

use crate::util::pdv_utilities::{compare_names, naming_distance};
use crate::PDVCertificate;

/// Ordering key for a candidate, excluding the encoding tie breaker
pub type CandidateRank = (u8, usize);

/// [`CandidateComparator`] orders candidates relative to a set of trusted subject names and the
/// certificate most recently accepted into the path.
pub struct CandidateComparator<'a> {
    trusted_subjects: &'a [Name],
    previous_akid: Option<&'a [u8]>,
}

impl<'a> CandidateComparator<'a> {
    /// Creates a comparator. `previous` is the most recently accepted certificate, if any.
    pub fn new(
        trusted_subjects: &'a [Name],
        previous: Option<&'a PDVCertificate>,
    ) -> CandidateComparator<'a> {
        CandidateComparator {
            trusted_subjects,
            previous_akid: previous.and_then(|p| p.authority_key_identifier()),
        }
    }

    /// Returns the (tier, distance) portion of the ordering key for a candidate.
    pub fn rank(&self, cert: &PDVCertificate) -> CandidateRank {
        if let (Some(akid), Some(skid)) = (self.previous_akid, cert.subject_key_identifier()) {
            if akid == skid {
                return (0, 0);
            }
        }

        let issuer = cert.issuer();
        if self
            .trusted_subjects
            .iter()
            .any(|s| compare_names(s, issuer))
        {
            return (1, 0);
        }

        match self
            .trusted_subjects
            .iter()
            .filter_map(|s| naming_distance(issuer, s))
            .min()
        {
            Some(distance) => (2, distance),
            None => (3, 0),
        }
    }

    /// Total order over candidates
    pub fn compare(&self, left: &PDVCertificate, right: &PDVCertificate) -> Ordering {
        if left.encoded_cert == right.encoded_cert {
            return Ordering::Equal;
        }
        self.rank(left)
            .cmp(&self.rank(right))
            .then_with(|| left.encoded_cert.cmp(&right.encoded_cert))
    }

    /// Sorts candidates and removes duplicates.
    pub fn sort(&self, certs: &mut Vec<PDVCertificate>) {
        let mut keyed: Vec<(CandidateRank, PDVCertificate)> =
            certs.drain(..).map(|c| (self.rank(&c), c)).collect();
        keyed.sort_by(|(lr, lc), (rr, rc)| {
            lr.cmp(rr)
                .then_with(|| lc.encoded_cert.cmp(&rc.encoded_cert))
        });
        keyed.dedup_by(|(_, a), (_, b)| a.encoded_cert == b.encoded_cert);
        certs.extend(keyed.into_iter().map(|(_, c)| c));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_cert;

    fn load(name: &str) -> PDVCertificate {
        let path = format!("{}/tests/examples/{}", env!("CARGO_MANIFEST_DIR"), name);
        parse_cert(&std::fs::read(path).unwrap(), name).unwrap()
    }

    #[test]
    fn tiers() {
        let root = load("root.der");
        let trusted = vec![root.subject().clone()];
        let ee = load("ee.der");
        let inter = load("inter.der");
        let inter2 = load("inter2.der");
        let polinter = load("polinter.der");

        // inter's SKID matches ee's AKID
        let c = CandidateComparator::new(&trusted, Some(&ee));
        assert_eq!((0, 0), c.rank(&inter));
        // issued by the trust anchor
        assert_eq!((1, 0), c.rank(&polinter));

        let c = CandidateComparator::new(&trusted, None);
        assert_eq!((1, 0), c.rank(&inter));
        // ee is issued by a name sharing C=US,O=Example Org with the anchor subject
        assert_eq!((2, 3), c.rank(&ee));
        assert_eq!(Ordering::Less, c.compare(&inter, &ee));
        assert_eq!(Ordering::Equal, c.compare(&ee, &ee.clone()));
        assert_ne!(Ordering::Equal, c.compare(&inter, &inter2));

        let mut certs = vec![ee.clone(), inter.clone(), ee.clone()];
        c.sort(&mut certs);
        assert_eq!(vec![inter, ee], certs);
    }
}
