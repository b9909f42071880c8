//! The ta_source module provides [`TaSource`], a simple container of trust anchors that can be
//! populated from buffers or from a folder of certificate files.

use log::{error, info};
use x509_cert::name::Name;

use crate::source::file_utils::cert_folder_to_vec;
use crate::util::error::*;
use crate::util::pdv_utilities::{compare_names, name_to_string};
use crate::{get_locator, PDVCertificate, TrustAnchor};

/// [`TaSource`] holds the trust anchors supplied to path building.
#[derive(Clone, Debug, Default)]
pub struct TaSource {
    tas: Vec<TrustAnchor>,
}

impl TaSource {
    /// Creates an empty trust anchor source
    pub fn new() -> TaSource {
        TaSource::default()
    }

    /// Adds a trust anchor, ignoring duplicates.
    pub fn add_trust_anchor(&mut self, ta: TrustAnchor) {
        if !self.tas.contains(&ta) {
            self.tas.push(ta);
        }
    }

    /// Parses a DER encoded certificate and adds it as a trust anchor.
    pub fn add_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        let ta = TrustAnchor::try_from(bytes)?;
        self.add_trust_anchor(ta);
        Ok(())
    }

    /// Adds each certificate found in the folder that is valid at the time of interest as a trust
    /// anchor. Returns the number of trust anchors read.
    pub fn add_folder(&mut self, folder: &str, time_of_interest: u64) -> Result<usize> {
        let certs: Vec<PDVCertificate> = cert_folder_to_vec(folder, time_of_interest)?;
        if certs.is_empty() {
            error!("No trust anchors were found in {}", folder);
        }
        let count = certs.len();
        for c in certs {
            info!(
                "Loaded trust anchor {} from {}",
                name_to_string(c.subject()),
                get_locator(&c)
            );
            self.add_trust_anchor(TrustAnchor::Certificate(c));
        }
        Ok(count)
    }

    /// Returns the trust anchors
    pub fn get_trust_anchors(&self) -> &[TrustAnchor] {
        &self.tas
    }

    /// Returns the trust anchors whose subject matches the name
    pub fn get_trust_anchors_by_name(&self, name: &Name) -> Vec<&TrustAnchor> {
        self.tas
            .iter()
            .filter(|ta| compare_names(ta.subject(), name))
            .collect()
    }

    /// Returns true if the certificate is one of the trust anchors
    pub fn is_cert_a_trust_anchor(&self, cert: &PDVCertificate) -> bool {
        self.tas.iter().any(|ta| ta.certificate() == Some(cert))
    }

    /// Consumes the source, returning the trust anchors
    pub fn into_trust_anchors(self) -> Vec<TrustAnchor> {
        self.tas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_cert;

    #[test]
    fn ta_source_test() {
        let mut tas = TaSource::new();
        tas.add_encoded(include_bytes!("../../tests/examples/root.der"))
            .unwrap();
        tas.add_encoded(include_bytes!("../../tests/examples/root.der"))
            .unwrap();
        assert_eq!(1, tas.get_trust_anchors().len());
        assert!(tas.add_encoded(&[0x30, 0x00]).is_err());

        let root = parse_cert(include_bytes!("../../tests/examples/root.der"), "root.der").unwrap();
        assert!(tas.is_cert_a_trust_anchor(&root));
        assert_eq!(1, tas.get_trust_anchors_by_name(root.subject()).len());
        let inter = parse_cert(include_bytes!("../../tests/examples/inter.der"), "inter.der").unwrap();
        assert!(!tas.is_cert_a_trust_anchor(&inter));
        assert!(tas.get_trust_anchors_by_name(inter.subject()).is_empty());
    }
}
