//! URI-backed certificate stores with time-bounded caching and conditional refetch, along with
//! the process-wide cache of such stores consulted when following AIA caIssuers references.
//!
//! A [`UriCertStore`] serves the certificates or CRL found at a single http, https or ftp URI.
//! Results are reused for [`CHECK_INTERVAL_SECS`] seconds. After that, the resource is fetched
//! again using the last modified value observed previously, keeping the cached value when the
//! origin reports no change. Failures clear the cached value.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use url::Url;
use x509_cert::crl::CertificateList;

use crate::environment::pki_environment_traits::*;
use crate::source::aia_filter::AiaLocationFilter;
use crate::source::file_utils::{certs_from_bytes, crl_from_bytes};
use crate::util::error::*;
use crate::{CertSelector, CrlSelector, PDVCertificate};

/// Number of seconds a fetched result is reused before the origin is consulted again
pub const CHECK_INTERVAL_SECS: u64 = 30;

/// Maximum number of stores retained by a [`UriStoreCache`]
pub const MAX_CACHED_STORES: usize = 185;

#[derive(Clone, Debug)]
struct CachedResource<T> {
    value: T,
    last_checked: Option<u64>,
    last_modified: Option<String>,
}

impl<T: Default> Default for CachedResource<T> {
    fn default() -> Self {
        CachedResource {
            value: T::default(),
            last_checked: None,
            last_modified: None,
        }
    }
}

impl<T: Default> CachedResource<T> {
    fn is_fresh(&self, now: u64) -> bool {
        match self.last_checked {
            Some(lc) => now >= lc && now - lc < CHECK_INTERVAL_SECS,
            None => false,
        }
    }

    fn clear(&mut self) {
        self.value = T::default();
        self.last_modified = None;
    }
}

#[derive(Default)]
struct UriCacheState {
    certs: CachedResource<Vec<PDVCertificate>>,
    crl: CachedResource<Option<CertificateList>>,
}

/// [`UriCertStore`] is a [`CertStore`] backed by a single remote resource.
pub struct UriCertStore {
    uri: String,
    fetcher: Arc<dyn UriFetcher>,
    clock: Arc<dyn Clock>,
    state: Mutex<UriCacheState>,
}

impl UriCertStore {
    /// Creates a store for the URI that uses the given fetcher and clock
    pub fn new(uri: &str, fetcher: Arc<dyn UriFetcher>, clock: Arc<dyn Clock>) -> UriCertStore {
        UriCertStore {
            uri: uri.to_string(),
            fetcher,
            clock,
            state: Mutex::new(UriCacheState::default()),
        }
    }

    /// URI served by this store
    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, UriCacheState>> {
        self.state.lock().map_err(|_| {
            error!("Cache lock for {} is poisoned", self.uri);
            Error::Unrecognized
        })
    }

    fn refresh_certs(&self, state: &mut UriCacheState, now: u64) {
        if state.certs.is_fresh(now) {
            debug!("Returning certificates cached for {}", self.uri);
            return;
        }
        state.certs.last_checked = Some(now);
        let last_modified = state.certs.last_modified.clone();
        match self
            .fetcher
            .fetch(&self.uri, FetchKind::Certificates, last_modified.as_deref())
        {
            Ok(FetchResponse::NotModified) => {
                debug!("{} has not been modified", self.uri);
            }
            Ok(FetchResponse::Content {
                last_modified: lm, ..
            }) if lm.is_some() && lm == last_modified => {
                debug!("{} reported an unchanged last modified value", self.uri);
            }
            Ok(FetchResponse::Content {
                bytes,
                last_modified: lm,
            }) => match certs_from_bytes(&bytes, &self.uri) {
                Ok(certs) => {
                    info!("Fetched {} certificates from {}", certs.len(), self.uri);
                    state.certs.value = certs;
                    state.certs.last_modified = lm;
                }
                Err(e) => {
                    error!("Failed to parse certificates from {}: {}", self.uri, e);
                    state.certs.clear();
                }
            },
            Err(e) => {
                error!("Failed to fetch certificates from {}: {}", self.uri, e);
                state.certs.clear();
            }
        }
    }

    fn refresh_crl(&self, state: &mut UriCacheState, now: u64) -> Result<()> {
        if state.crl.is_fresh(now) {
            return Ok(());
        }
        state.crl.last_checked = Some(now);
        let last_modified = state.crl.last_modified.clone();
        match self
            .fetcher
            .fetch(&self.uri, FetchKind::Crl, last_modified.as_deref())
        {
            Ok(FetchResponse::NotModified) => Ok(()),
            Ok(FetchResponse::Content {
                last_modified: lm, ..
            }) if lm.is_some() && lm == last_modified => Ok(()),
            Ok(FetchResponse::Content {
                bytes,
                last_modified: lm,
            }) => match crl_from_bytes(&bytes, &self.uri) {
                Ok(crl) => {
                    state.crl.value = Some(crl);
                    state.crl.last_modified = lm;
                    Ok(())
                }
                Err(e) => {
                    error!("Failed to parse CRL from {}: {}", self.uri, e);
                    state.crl.clear();
                    Err(Error::NetworkError)
                }
            },
            Err(e) => {
                error!("Failed to fetch CRL from {}: {}", self.uri, e);
                state.crl.clear();
                Err(Error::NetworkError)
            }
        }
    }
}

impl CertStore for UriCertStore {
    fn get_certificates(&self, selector: &CertSelector) -> Result<Vec<PDVCertificate>> {
        let mut state = self.lock()?;
        self.refresh_certs(&mut state, self.clock.now());
        Ok(state
            .certs
            .value
            .iter()
            .filter(|c| selector.matches(c))
            .cloned()
            .collect())
    }

    fn get_crls(&self, selector: &CrlSelector) -> Result<Vec<CertificateList>> {
        let mut state = self.lock()?;
        self.refresh_crl(&mut state, self.clock.now())?;
        match &state.crl.value {
            Some(crl) if selector.matches(crl) => Ok(vec![crl.clone()]),
            _ => Ok(vec![]),
        }
    }

    fn describe(&self) -> String {
        format!("UriCertStore ({})", self.uri)
    }
}

#[derive(Default)]
struct StoreMap {
    stores: BTreeMap<String, Arc<UriCertStore>>,
    insertion_order: VecDeque<String>,
}

/// [`UriStoreCache`] retains up to [`MAX_CACHED_STORES`] [`UriCertStore`] instances keyed by
/// normalized URI, evicting the oldest insertion when full. ldap and ldaps URIs are delegated to a
/// [`DirectoryStoreProvider`], when one is configured.
pub struct UriStoreCache {
    fetcher: Arc<dyn UriFetcher>,
    clock: Arc<dyn Clock>,
    filter: AiaLocationFilter,
    directory: Option<Arc<dyn DirectoryStoreProvider>>,
    stores: Mutex<StoreMap>,
}

impl UriStoreCache {
    /// Creates a cache that uses the given fetcher, the system clock and the allow-list read from
    /// the environment (see [`AiaLocationFilter::from_env`]).
    pub fn new(fetcher: Arc<dyn UriFetcher>) -> UriStoreCache {
        UriStoreCache {
            fetcher,
            clock: Arc::new(SystemClock),
            filter: AiaLocationFilter::from_env(),
            directory: None,
            stores: Mutex::new(StoreMap::default()),
        }
    }

    /// Replaces the clock used by stores created subsequently
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> UriStoreCache {
        self.clock = clock;
        self
    }

    /// Replaces the AIA allow-list
    pub fn with_filter(mut self, filter: AiaLocationFilter) -> UriStoreCache {
        self.filter = filter;
        self
    }

    /// Sets the provider of stores for ldap and ldaps URIs
    pub fn with_directory_provider(
        mut self,
        provider: Arc<dyn DirectoryStoreProvider>,
    ) -> UriStoreCache {
        self.directory = Some(provider);
        self
    }

    /// Returns the AIA allow-list
    pub fn filter(&self) -> &AiaLocationFilter {
        &self.filter
    }

    /// Number of cached stores
    pub fn len(&self) -> usize {
        match self.stores.lock() {
            Ok(m) => m.stores.len(),
            Err(_) => 0,
        }
    }

    /// Returns true if no stores are cached
    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    /// Returns a store for the URI, creating and caching one if necessary. Returns Ok(None) for
    /// ldap URIs when no directory provider is configured and `InvalidUriScheme` for schemes other
    /// than http, https, ftp, ldap and ldaps. The allow-list is not consulted.
    pub fn get_store(&self, uri: &str) -> Result<Option<Arc<dyn CertStore>>> {
        let url = match Url::parse(uri) {
            Ok(url) => url,
            Err(e) => {
                error!("Failed to parse URI {}: {}", uri, e);
                return Err(Error::ParseError);
            }
        };
        match url.scheme() {
            "ldap" | "ldaps" => {
                return Ok(self.directory.as_ref().and_then(|d| d.get_store(uri)));
            }
            "http" | "https" | "ftp" => {}
            other => {
                error!("Unsupported URI scheme {} in {}", other, uri);
                return Err(Error::InvalidUriScheme);
            }
        }

        let key = url.to_string();
        let mut map = self.stores.lock().map_err(|_| Error::Unrecognized)?;
        if let Some(store) = map.stores.get(&key) {
            return Ok(Some(store.clone() as Arc<dyn CertStore>));
        }
        if map.stores.len() >= MAX_CACHED_STORES {
            if let Some(oldest) = map.insertion_order.pop_front() {
                debug!("Evicting cached store for {}", oldest);
                map.stores.remove(&oldest);
            }
        }
        let store = Arc::new(UriCertStore::new(
            &key,
            self.fetcher.clone(),
            self.clock.clone(),
        ));
        map.stores.insert(key.clone(), store.clone());
        map.insertion_order.push_back(key);
        Ok(Some(store as Arc<dyn CertStore>))
    }

    /// Returns a store for a caIssuers URI if the allow-list permits it, else None. Errors are
    /// logged and mapped to None.
    pub fn get_store_for_aia(&self, uri: &str) -> Option<Arc<dyn CertStore>> {
        if !self.filter.is_allowed(uri) {
            return None;
        }
        match self.get_store(uri) {
            Ok(store) => store,
            Err(e) => {
                debug!("No store available for {}: {}", uri, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        content: Option<Vec<u8>>,
        last_modified: Option<String>,
        honor_if_modified_since: bool,
    }

    impl UriFetcher for CountingFetcher {
        fn fetch(
            &self,
            _uri: &str,
            _kind: FetchKind,
            last_modified: Option<&str>,
        ) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.honor_if_modified_since
                && last_modified.is_some()
                && last_modified == self.last_modified.as_deref()
            {
                return Ok(FetchResponse::NotModified);
            }
            match &self.content {
                Some(bytes) => Ok(FetchResponse::Content {
                    bytes: bytes.clone(),
                    last_modified: self.last_modified.clone(),
                }),
                None => Err(Error::NetworkError),
            }
        }
    }

    struct FakeClock(AtomicU64);

    impl Clock for FakeClock {
        fn now(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn cache_interval_and_not_modified() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            content: Some(include_bytes!("../../tests/examples/intermediates.p7c").to_vec()),
            last_modified: Some("Tue, 01 Mar 2022 19:21:02 GMT".to_string()),
            honor_if_modified_since: true,
        });
        let clock = Arc::new(FakeClock(AtomicU64::new(1000)));
        let store = UriCertStore::new("http://ca.example.com/certs/intermediates.p7c", fetcher.clone(), clock.clone());

        assert_eq!(2, store.get_certificates(&CertSelector::default()).unwrap().len());
        assert_eq!(1, fetcher.calls.load(Ordering::SeqCst));

        clock.0.store(1029, Ordering::SeqCst);
        assert_eq!(2, store.get_certificates(&CertSelector::default()).unwrap().len());
        assert_eq!(1, fetcher.calls.load(Ordering::SeqCst));

        clock.0.store(1030, Ordering::SeqCst);
        assert_eq!(2, store.get_certificates(&CertSelector::default()).unwrap().len());
        assert_eq!(2, fetcher.calls.load(Ordering::SeqCst));
        {
            let state = store.state.lock().unwrap();
            assert_eq!(Some(1030), state.certs.last_checked);
            assert_eq!(
                Some("Tue, 01 Mar 2022 19:21:02 GMT"),
                state.certs.last_modified.as_deref()
            );
        }
    }

    #[test]
    fn failure_clears_cache() {
        let clock = Arc::new(FakeClock(AtomicU64::new(1000)));
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            content: None,
            last_modified: None,
            honor_if_modified_since: false,
        });
        let store = UriCertStore::new("http://ca.example.com/x.p7c", fetcher.clone(), clock);
        assert!(store.get_certificates(&CertSelector::default()).unwrap().is_empty());
        assert_eq!(
            Err(Error::NetworkError),
            store.get_crls(&CrlSelector::default())
        );

        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            content: Some(b"not a certificate".to_vec()),
            last_modified: Some("x".to_string()),
            honor_if_modified_since: false,
        });
        let store = UriCertStore::new(
            "http://ca.example.com/x.p7c",
            fetcher,
            Arc::new(SystemClock),
        );
        assert!(store.get_certificates(&CertSelector::default()).unwrap().is_empty());
        assert!(store.state.lock().unwrap().certs.last_modified.is_none());

        // content that does not decode as a CRL is reported and not retained
        assert_eq!(
            Err(Error::NetworkError),
            store.get_crls(&CrlSelector::default())
        );
        {
            let state = store.state.lock().unwrap();
            assert!(state.crl.value.is_none());
            assert!(state.crl.last_modified.is_none());
        }
    }

    #[test]
    fn store_cache_bounds_and_schemes() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            content: None,
            last_modified: None,
            honor_if_modified_since: false,
        });
        let cache = UriStoreCache::new(fetcher.clone()).with_filter(AiaLocationFilter::parse(
            "http://ca.example.com/certs/",
        ));
        let a = cache.get_store("http://ca.example.com/a.der").unwrap().unwrap();
        let b = cache.get_store("HTTP://CA.example.com/a.der").unwrap().unwrap();
        assert_eq!(a.describe(), b.describe());
        assert_eq!(1, cache.len());

        for i in 0..MAX_CACHED_STORES + 10 {
            cache
                .get_store(&format!("http://ca.example.com/{}.der", i))
                .unwrap();
        }
        assert_eq!(MAX_CACHED_STORES, cache.len());

        assert!(cache.get_store("ldap://ldap.example.com/o=Example").unwrap().is_none());
        assert_eq!(
            Some(Error::InvalidUriScheme),
            cache.get_store("file:///etc/passwd").err()
        );

        assert!(cache.get_store_for_aia("http://evil.example.com/certs/a.der").is_none());
        assert!(cache.get_store_for_aia("http://ca.example.com/certs/a.der").is_some());
        // the allow-list is consulted before any network access
        assert_eq!(0, fetcher.calls.load(Ordering::SeqCst));
    }
}
