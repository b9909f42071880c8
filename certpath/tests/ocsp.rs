//! OCSP status checks following path building, using a transport that serves canned responses

#![cfg(feature = "revocation")]

use std::sync::{Arc, Mutex};

use certpath::*;

const TOI: u64 = 1798761600;

fn examples() -> String {
    format!("{}/tests/examples", env!("CARGO_MANIFEST_DIR"))
}

fn load(name: &str) -> PDVCertificate {
    let path = format!("{}/{}", examples(), name);
    parse_cert(&std::fs::read(path).unwrap(), name).unwrap()
}

struct CannedTransport {
    response: Vec<u8>,
    requests: Mutex<Vec<String>>,
}

impl CannedTransport {
    fn new(name: &str) -> CannedTransport {
        CannedTransport {
            response: std::fs::read(format!("{}/{}", examples(), name)).unwrap(),
            requests: Mutex::new(vec![]),
        }
    }
}

impl OcspTransport for CannedTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(format!("GET {}", url));
        Ok(self.response.clone())
    }

    fn post(&self, url: &str, _request: &[u8]) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(format!("POST {}", url));
        Ok(self.response.clone())
    }
}

fn build(pe: &PkiEnvironment, ps: &PathSettings, target: &PDVCertificate) -> CertificationPath {
    let mut store = CollectionCertStore::new();
    store.add_certificate(load("inter.der"));
    let mut params =
        BuilderParams::for_target(ps.clone(), target, vec![TrustAnchor::from(load("root.der"))])
            .unwrap();
    params.add_store(Arc::new(store));
    build_path(pe, &params).unwrap().path
}

fn setup() -> (PkiEnvironment, PathSettings) {
    let mut pe = PkiEnvironment::default();
    populate_5280_pki_environment(&mut pe);
    let mut ps = PathSettings::default();
    ps.set_time_of_interest(TOI);
    (pe, ps)
}

#[test]
fn revoked_after_path_building() {
    let (pe, ps) = setup();
    let eerev = load("eerev.der");
    let path = build(&pe, &ps, &eerev);
    let issuer = &path.certificates[1];

    let cert_id = CertId::for_certificate(&eerev, issuer).unwrap();
    let transport = CannedTransport::new("resp_revoked.der");
    let info = OcspRequestInfo::from_settings(
        &ps,
        vec![cert_id.clone()],
        "http://ocsp.example.com/",
        issuer.into(),
    );
    let resp = send_ocsp_request(&pe, &transport, &info).unwrap();
    assert!(matches!(
        resp.status_for(&cert_id),
        Some(OcspCertStatus::Revoked { .. })
    ));
    assert_eq!(1, transport.requests.lock().unwrap().len());
    assert!(transport.requests.lock().unwrap()[0].starts_with("GET http://ocsp.example.com/"));
}

#[test]
fn good_status_via_aia() {
    let (pe, mut ps) = setup();
    ps.set_ocsp_use_get(false);
    let ee = load("ee.der");
    let path = build(&pe, &ps, &ee);

    // resp_good.der carries no responder certificate, so the signer cannot be located
    let transport = CannedTransport::new("resp_good.der");
    let status = check_revocation_ocsp(&pe, &ps, &transport, &ee, (&path.certificates[1]).into());
    assert_eq!(PathValidationStatus::RevocationStatusNotDetermined, status);
    assert_eq!(
        vec!["POST http://ocsp.example.com/".to_string()],
        *transport.requests.lock().unwrap()
    );

    // with the responder certificate configured locally the response is accepted
    let responder = load("resp.der");
    let cert_id = CertId::for_certificate(&ee, &path.certificates[1]).unwrap();
    let mut info = OcspRequestInfo::from_settings(
        &ps,
        vec![cert_id.clone()],
        "http://ocsp.example.com/",
        (&path.certificates[1]).into(),
    );
    info.responder_cert = Some(&responder);
    let resp = send_ocsp_request(&pe, &transport, &info).unwrap();
    assert_eq!(Some(&OcspCertStatus::Good), resp.status_for(&cert_id));
}
