//! The cert_source module provides [`CollectionCertStore`], an in-memory [`CertStore`]
//! implementation indexed by subject name and subject key identifier.
//!
//! ```
//! use certpath::*;
//!
//! let mut store = CollectionCertStore::default();
//! // populate from DER buffers, PKCS #7 bundles or a folder of certificate files
//! let _ = store.add_folder("tests/examples/store", 0);
//! let selector = CertSelector::default();
//! let _certs = store.get_certificates(&selector);
//! ```

use std::collections::BTreeMap;

use log::{debug, info};
use x509_cert::crl::CertificateList;

use crate::environment::pki_environment_traits::CertStore;
use crate::source::file_utils::*;
use crate::util::error::*;
use crate::util::pdv_utilities::{buffer_to_hex, name_to_string};
use crate::{get_locator, CertSelector, CrlSelector, PDVCertificate};

/// [`CollectionCertStore`] holds certificates and CRLs in memory. Certificates are indexed by the
/// string form of the subject name and by subject key identifier so that selectors that name a
/// subject or key identifier avoid a linear scan.
#[derive(Clone, Default)]
pub struct CollectionCertStore {
    certs: Vec<PDVCertificate>,
    crls: Vec<CertificateList>,
    name_map: BTreeMap<String, Vec<usize>>,
    skid_map: BTreeMap<String, Vec<usize>>,
}

impl CollectionCertStore {
    /// Creates an empty store
    pub fn new() -> CollectionCertStore {
        CollectionCertStore::default()
    }

    /// Creates a store containing the given certificates
    pub fn from_certs(certs: Vec<PDVCertificate>) -> CollectionCertStore {
        let mut store = CollectionCertStore::default();
        for c in certs {
            store.add_certificate(c);
        }
        store
    }

    /// Adds a certificate to the store, ignoring duplicates.
    pub fn add_certificate(&mut self, cert: PDVCertificate) {
        if self.certs.contains(&cert) {
            return;
        }
        let index = self.certs.len();
        self.name_map
            .entry(name_to_string(cert.subject()))
            .or_default()
            .push(index);
        if let Some(skid) = cert.subject_key_identifier() {
            self.skid_map
                .entry(buffer_to_hex(skid))
                .or_default()
                .push(index);
        }
        self.certs.push(cert);
    }

    /// Parses a DER encoded certificate or PKCS #7 bundle and adds the certificates to the store.
    /// Returns the number of certificates parsed.
    pub fn add_encoded(&mut self, bytes: &[u8], locator: &str) -> Result<usize> {
        let certs = certs_from_bytes(bytes, locator)?;
        let count = certs.len();
        for c in certs {
            self.add_certificate(c);
        }
        Ok(count)
    }

    /// Adds certificates valid at the time of interest from a folder (see [`cert_folder_to_vec`])
    /// and CRLs from the same folder. Returns the number of certificates read.
    pub fn add_folder(&mut self, folder: &str, time_of_interest: u64) -> Result<usize> {
        let certs = cert_folder_to_vec(folder, time_of_interest)?;
        let count = certs.len();
        for c in certs {
            self.add_certificate(c);
        }
        self.crls.append(&mut crl_folder_to_vec(folder)?);
        info!("Read {} certificates from {}", count, folder);
        Ok(count)
    }

    /// Adds a CRL to the store
    pub fn add_crl(&mut self, crl: CertificateList) {
        if !self.crls.contains(&crl) {
            self.crls.push(crl);
        }
    }

    /// Number of certificates in the store
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    /// Returns true if the store contains no certificates
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Logs the subject and locator of each certificate at debug level
    pub fn log_certs(&self) {
        for (i, c) in self.certs.iter().enumerate() {
            debug!(
                "Index: {:3}; Subject: {}; Locator: {}",
                i,
                name_to_string(c.subject()),
                get_locator(c)
            );
        }
    }

    fn candidates(&self, selector: &CertSelector) -> Vec<&PDVCertificate> {
        let indices = if let Some(subject) = &selector.subject {
            self.name_map.get(&name_to_string(subject))
        } else if let Some(skid) = &selector.subject_key_identifier {
            self.skid_map.get(&buffer_to_hex(skid))
        } else {
            return self.certs.iter().collect();
        };
        match indices {
            Some(indices) => indices.iter().filter_map(|i| self.certs.get(*i)).collect(),
            // string forms may differ for names that compare equal
            None if selector.subject.is_some() => self.certs.iter().collect(),
            None => vec![],
        }
    }
}

impl CertStore for CollectionCertStore {
    fn get_certificates(&self, selector: &CertSelector) -> Result<Vec<PDVCertificate>> {
        Ok(self
            .candidates(selector)
            .into_iter()
            .filter(|c| selector.matches(c))
            .cloned()
            .collect())
    }

    fn get_crls(&self, selector: &CrlSelector) -> Result<Vec<CertificateList>> {
        Ok(self
            .crls
            .iter()
            .filter(|c| selector.matches(c))
            .cloned()
            .collect())
    }

    fn describe(&self) -> String {
        format!("CollectionCertStore ({} certificates)", self.certs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_cert;

    #[test]
    fn collection_store_test() {
        let mut store = CollectionCertStore::new();
        assert!(store.is_empty());
        assert_eq!(
            2,
            store
                .add_encoded(
                    include_bytes!("../../tests/examples/intermediates.p7c"),
                    "intermediates.p7c"
                )
                .unwrap()
        );
        // duplicate is ignored
        store
            .add_encoded(include_bytes!("../../tests/examples/inter.der"), "inter.der")
            .unwrap();
        assert_eq!(2, store.len());

        let inter = parse_cert(include_bytes!("../../tests/examples/inter.der"), "inter.der").unwrap();
        let found = store
            .get_certificates(&CertSelector::for_subject(inter.subject()))
            .unwrap();
        assert_eq!(1, found.len());
        assert_eq!(inter, found[0]);

        let sel = CertSelector {
            subject_key_identifier: Some(inter.subject_key_identifier().unwrap().to_vec()),
            ..Default::default()
        };
        assert_eq!(1, store.get_certificates(&sel).unwrap().len());
        assert_eq!(2, store.get_certificates(&CertSelector::default()).unwrap().len());
        assert!(store.get_crls(&CrlSelector::default()).unwrap().is_empty());
    }
}
