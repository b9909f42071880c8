//! Path building scenarios exercised through the public API

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use certpath::*;
use const_oid::ObjectIdentifier;

const TOI: u64 = 1798761600;
const P3: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.99999.1.3");

fn examples() -> String {
    format!("{}/tests/examples", env!("CARGO_MANIFEST_DIR"))
}

fn load(name: &str) -> PDVCertificate {
    let path = format!("{}/{}", examples(), name);
    parse_cert(&std::fs::read(path).unwrap(), name).unwrap()
}

fn setup() -> (PkiEnvironment, PathSettings) {
    let mut pe = PkiEnvironment::default();
    populate_5280_pki_environment(&mut pe);
    let mut ps = PathSettings::default();
    ps.set_time_of_interest(TOI);
    (pe, ps)
}

fn root_anchor() -> Vec<TrustAnchor> {
    vec![TrustAnchor::from(load("root.der"))]
}

#[test]
fn build_with_store_folder() {
    let (pe, ps) = setup();
    let ee = load("ee.der");

    let mut store = CollectionCertStore::new();
    assert_eq!(
        2,
        store
            .add_folder(&format!("{}/store", examples()), TOI)
            .unwrap()
    );

    let mut params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    params.add_store(Arc::new(store));
    let result = build_path(&pe, &params).unwrap();

    assert_eq!(2, result.path.certificates.len());
    assert_eq!(ee, result.path.certificates[0]);
    assert_eq!(load("inter.der"), result.path.certificates[1]);
    assert_eq!(load("root.der").subject(), result.path.trust_anchor.subject());

    // the returned path passes standalone validation
    validate_path(&pe, &params.settings, &result.path, &BTreeSet::new()).unwrap();
}

#[test]
fn no_path_without_intermediate() {
    let (pe, ps) = setup();
    let ee = load("ee.der");
    let params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    assert_eq!(
        Err(Error::PathValidation(PathValidationStatus::NoPathsFound)),
        build_path(&pe, &params).map(|r| r.path.certificates.len())
    );
}

#[test]
fn trust_anchor_required() {
    let (_pe, ps) = setup();
    assert_eq!(
        Some(Error::PathValidation(PathValidationStatus::MissingTrustAnchor)),
        BuilderParams::for_target(ps, &load("ee.der"), vec![]).err()
    );
}

#[test]
fn name_and_key_anchor_terminates_at_intermediate() {
    let (pe, ps) = setup();
    let ee = load("ee.der");
    let inter = load("inter.der");
    let ta = TrustAnchor::from_name_and_key(inter.subject().clone(), inter.public_key().clone());
    let params = BuilderParams::for_target(ps, &ee, vec![ta]).unwrap();
    let result = build_path(&pe, &params).unwrap();
    assert_eq!(vec![ee], result.path.certificates);
}

#[test]
fn expired_at_time_of_interest() {
    let (pe, mut ps) = setup();
    // 2051-01-01, after the end entity expires
    ps.set_time_of_interest(2556144000);
    let ee = load("ee.der");
    let mut store = CollectionCertStore::new();
    store.add_certificate(load("inter.der"));
    let mut params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    params.add_store(Arc::new(store));
    // the expired target is filtered out before any issuer is sought
    assert_eq!(
        Err(Error::PathValidation(PathValidationStatus::MissingCertificate)),
        build_path(&pe, &params).map(|r| r.path.certificates.len())
    );
}

#[test]
fn max_path_length_bounds_search() {
    let (pe, mut ps) = setup();
    let ee = load("ee.der");
    let mut store = CollectionCertStore::new();
    store.add_certificate(load("inter.der"));
    let store: Arc<dyn CertStore> = Arc::new(store);

    ps.set_max_path_length(0);
    let mut params = BuilderParams::for_target(ps.clone(), &ee, root_anchor()).unwrap();
    params.add_store(store.clone());
    assert_eq!(
        Err(Error::PathValidation(PathValidationStatus::NoPathsFound)),
        build_path(&pe, &params).map(|r| r.path.certificates.len())
    );

    ps.set_max_path_length(1);
    let mut params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    params.add_store(store);
    let result = build_path(&pe, &params).unwrap();
    assert_eq!(vec![ee, load("inter.der")], result.path.certificates);
}

#[test]
fn policy_path() {
    let (pe, mut ps) = setup();
    ps.set_initial_explicit_policy_indicator(true);

    let mut store = CollectionCertStore::new();
    store.add_certificate(load("polinter.der"));
    store.add_certificate(load("inter.der"));
    let store: Arc<dyn CertStore> = Arc::new(store);

    let polee3 = load("polee3.der");
    let mut params = BuilderParams::for_target(ps.clone(), &polee3, root_anchor()).unwrap();
    params.add_store(store.clone());
    let result = build_path(&pe, &params).unwrap();
    assert_eq!(load("polinter.der"), result.path.certificates[1]);
    assert!(result.validation.valid_policies.contains(&P3));

    // ee carries no policies at all
    let ee = load("ee.der");
    let mut params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    params.add_store(store);
    assert!(build_path(&pe, &params).is_err());
}

#[test]
fn disabled_algorithm_prevents_path() {
    let (mut pe, mut ps) = setup();
    ps.set_disabled_algorithms("EC keySize < 384".to_string());
    pe.set_algorithm_constraints(algorithm_constraints_from_settings(&ps).unwrap());

    let ee = load("ee.der");
    let mut store = CollectionCertStore::new();
    store.add_certificate(load("inter.der"));
    let mut params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    params.add_store(Arc::new(store));
    assert_eq!(
        Err(Error::PathValidation(PathValidationStatus::AlgorithmConstrained)),
        build_path(&pe, &params).map(|r| r.path.certificates.len())
    );
}

#[test]
fn comparator_is_a_total_order() {
    let root = load("root.der");
    let ee = load("ee.der");
    let trusted = vec![root.subject().clone()];
    let comparator = CandidateComparator::new(&trusted, Some(&ee));

    let certs = vec![
        load("inter.der"),
        load("inter2.der"),
        load("notca.der"),
        load("polinter.der"),
        load("rsaroot.der"),
        root.clone(),
        ee.clone(),
    ];

    for a in &certs {
        assert_eq!(Ordering::Equal, comparator.compare(a, a));
        for b in &certs {
            assert_eq!(comparator.compare(a, b), comparator.compare(b, a).reverse());
            for c in &certs {
                if comparator.compare(a, b) == Ordering::Less
                    && comparator.compare(b, c) == Ordering::Less
                {
                    assert_eq!(Ordering::Less, comparator.compare(a, c));
                }
            }
        }
    }

    let mut sorted = certs.clone();
    comparator.sort(&mut sorted);
    // inter carries the subject key identifier named by the end entity
    assert_eq!(load("inter.der"), sorted[0]);
    assert_eq!((0, 0), comparator.rank(&sorted[0]));
    // certificates issued by the trusted subject precede those that are not
    assert_eq!((1, 0), comparator.rank(&load("inter2.der")));
    assert!(comparator.rank(&load("rsaroot.der")).0 > 1);
}

struct StaticFetcher {
    calls: AtomicUsize,
    content: Vec<u8>,
}

impl UriFetcher for StaticFetcher {
    fn fetch(
        &self,
        _uri: &str,
        _kind: FetchKind,
        _last_modified: Option<&str>,
    ) -> Result<FetchResponse> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(FetchResponse::Content {
            bytes: self.content.clone(),
            last_modified: None,
        })
    }
}

fn aia_environment(allowed: &str) -> (PkiEnvironment, Arc<StaticFetcher>) {
    let (mut pe, _) = setup();
    let fetcher = Arc::new(StaticFetcher {
        calls: AtomicUsize::new(0),
        content: std::fs::read(format!("{}/inter.der", examples())).unwrap(),
    });
    let cache = UriStoreCache::new(fetcher.clone()).with_filter(AiaLocationFilter::parse(allowed));
    pe.set_uri_store_cache(Arc::new(cache));
    (pe, fetcher)
}

#[test]
fn intermediate_from_aia() {
    let (pe, fetcher) = aia_environment("http://ca.example.com/certs/");
    let (_, mut ps) = setup();
    ps.set_follow_aia(true);
    let ee = load("ee.der");
    let params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    let result = build_path(&pe, &params).unwrap();
    assert_eq!(load("inter.der"), result.path.certificates[1]);
    assert_eq!(1, fetcher.calls.load(AtomicOrdering::SeqCst));
}

#[test]
fn aia_location_not_allowed() {
    let (pe, fetcher) = aia_environment("http://other.example.com/");
    let (_, mut ps) = setup();
    ps.set_follow_aia(true);
    let ee = load("ee.der");
    let params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    assert!(build_path(&pe, &params).is_err());
    assert_eq!(0, fetcher.calls.load(AtomicOrdering::SeqCst));

    // following AIA disabled in settings
    let (pe, fetcher) = aia_environment("any");
    let (_, ps) = setup();
    let params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    assert!(build_path(&pe, &params).is_err());
    assert_eq!(0, fetcher.calls.load(AtomicOrdering::SeqCst));
}

#[test]
fn aia_not_followed_when_store_supplies_issuer() {
    let (pe, fetcher) = aia_environment("any");
    let (_, mut ps) = setup();
    ps.set_follow_aia(true);
    let ee = load("ee.der");
    let mut store = CollectionCertStore::new();
    store.add_certificate(load("inter.der"));
    let mut params = BuilderParams::for_target(ps, &ee, root_anchor()).unwrap();
    params.add_store(Arc::new(store));
    let result = build_path(&pe, &params).unwrap();
    assert_eq!(2, result.path.certificates.len());
    assert_eq!(0, fetcher.calls.load(AtomicOrdering::SeqCst));
}
