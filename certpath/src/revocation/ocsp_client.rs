//! Structures and functions to perform OCSP client functionality

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64ct::{Base64, Encoding};
use const_oid::db::rfc5912::ID_KP_OCSP_SIGNING;
use const_oid::db::rfc6960::{ID_PKIX_OCSP_BASIC, ID_PKIX_OCSP_NOCHECK, ID_PKIX_OCSP_NONCE};
use der::asn1::OctetString;
use der::{Any, Decode, Encode};
use log::{debug, error, info};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use spki::SubjectPublicKeyInfoOwned;
use x509_cert::ext::pkix::CrlReason;
use x509_cert::ext::{Extension, Extensions};
use x509_cert::name::Name;
use x509_ocsp::{
    BasicOcspResponse, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus, Request,
    ResponseData, SingleResponse, TbsRequest, Version,
};

use crate::environment::pki_environment_traits::OcspTransport;
use crate::revocation::cert_id::CertId;
use crate::util::error::*;
use crate::util::pdv_utilities::{compare_names, get_ocsp_uris, name_to_string, valid_at_time};
use crate::validator::algorithm_checker::ConstraintsParameters;
use crate::validator::path_validator::verify_certificate_signature;
use crate::{
    parse_cert, OcspNonceSetting, PDVCertificate, PathSettings, PkiEnvironment, TrustAnchor,
    VARIANT_GENERIC,
};

/// Tolerance, in seconds, applied when comparing thisUpdate and nextUpdate to the check date
pub const OCSP_MAX_CLOCK_SKEW: u64 = 900;

/// Longest URL, in bytes, for which a request is sent using HTTP GET
pub const OCSP_GET_MAX_URL_LENGTH: usize = 255;

/// Length of generated nonce values
pub const OCSP_NONCE_LENGTH: usize = 16;

/// Characters left unescaped when the base64 request is placed in a URL
const OCSP_URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'*');

/// Revocation status reported for a single certificate
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OcspCertStatus {
    /// The certificate is not revoked
    Good,
    /// The certificate was revoked at the given time, in seconds since the Unix epoch
    Revoked {
        /// Revocation time
        revocation_time: u64,
        /// Revocation reason, when the responder supplied one
        reason: Option<CrlReason>,
    },
    /// The responder does not know about the certificate
    Unknown,
}

/// Status information for one certificate drawn from a verified OCSP response
#[derive(Clone, Debug)]
pub struct OcspSingleStatus {
    /// Certificate status
    pub status: OcspCertStatus,
    /// thisUpdate, in seconds since the Unix epoch
    pub this_update: u64,
    /// nextUpdate, in seconds since the Unix epoch
    pub next_update: Option<u64>,
    /// singleExtensions
    pub single_extensions: Vec<Extension>,
}

/// Results of processing a verified OCSP response
#[derive(Clone, Debug)]
pub struct OcspResponseInfo {
    /// Status of each requested certificate
    pub statuses: HashMap<CertId, OcspSingleStatus>,
    /// producedAt, in seconds since the Unix epoch
    pub produced_at: u64,
    /// Subject name of the key that signed the response
    pub signer: Name,
    /// Encoded response as received
    pub encoded_response: Vec<u8>,
}

impl OcspResponseInfo {
    /// Returns the status for the given certificate identifier
    pub fn status_for(&self, cert_id: &CertId) -> Option<&OcspCertStatus> {
        self.statuses.get(cert_id).map(|s| &s.status)
    }
}

/// Name and public key of the CA that issued the certificates being checked
#[derive(Clone, Copy, Debug)]
pub struct OcspIssuer<'a> {
    /// Subject name of the issuer
    pub name: &'a Name,
    /// Public key of the issuer
    pub public_key: &'a SubjectPublicKeyInfoOwned,
}

impl<'a> From<&'a PDVCertificate> for OcspIssuer<'a> {
    fn from(cert: &'a PDVCertificate) -> Self {
        OcspIssuer {
            name: cert.subject(),
            public_key: cert.public_key(),
        }
    }
}

impl<'a> From<&'a TrustAnchor> for OcspIssuer<'a> {
    fn from(ta: &'a TrustAnchor) -> Self {
        OcspIssuer {
            name: ta.subject(),
            public_key: ta.public_key(),
        }
    }
}

/// Inputs to a single OCSP exchange
#[derive(Clone, Debug)]
pub struct OcspRequestInfo<'a> {
    /// Certificates whose status is requested
    pub cert_ids: Vec<CertId>,
    /// URI of the responder
    pub responder_uri: &'a str,
    /// CA that issued the certificates being checked
    pub issuer: OcspIssuer<'a>,
    /// Locally trusted responder certificate, if any
    pub responder_cert: Option<&'a PDVCertificate>,
    /// Time at which the response must be current. The current time is used when absent.
    pub check_date: Option<u64>,
    /// Nonce handling
    pub nonce_setting: OcspNonceSetting,
    /// Nonce to send. A random value is generated when absent and the nonce setting calls for one.
    pub nonce: Option<Vec<u8>>,
    /// Additional request extensions
    pub extensions: Vec<Extension>,
    /// Validation variant passed to algorithm constraints
    pub variant: String,
    /// When false, requests are always sent using POST
    pub use_get: bool,
}

impl<'a> OcspRequestInfo<'a> {
    /// Creates request information with default handling: no nonce, current time, GET permitted.
    pub fn new(
        cert_ids: Vec<CertId>,
        responder_uri: &'a str,
        issuer: OcspIssuer<'a>,
    ) -> OcspRequestInfo<'a> {
        OcspRequestInfo {
            cert_ids,
            responder_uri,
            issuer,
            responder_cert: None,
            check_date: None,
            nonce_setting: OcspNonceSetting::DoNotSendNonce,
            nonce: None,
            extensions: vec![],
            variant: VARIANT_GENERIC.to_string(),
            use_get: true,
        }
    }

    /// Creates request information governed by `ps`, i.e., time of interest, nonce handling,
    /// validation variant and use of GET.
    pub fn from_settings(
        ps: &PathSettings,
        cert_ids: Vec<CertId>,
        responder_uri: &'a str,
        issuer: OcspIssuer<'a>,
    ) -> OcspRequestInfo<'a> {
        let mut info = OcspRequestInfo::new(cert_ids, responder_uri, issuer);
        info.check_date = match ps.get_time_of_interest() {
            0 => None,
            toi => Some(toi),
        };
        info.nonce_setting = ps.get_ocsp_aia_nonce_setting();
        info.variant = ps.get_validation_variant();
        info.use_get = ps.get_ocsp_use_get();
        info
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a fresh nonce value
pub fn generate_nonce() -> Vec<u8> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_be_bytes());
    hasher.update(NONCE_COUNTER.fetch_add(1, Ordering::Relaxed).to_be_bytes());
    hasher.update(std::process::id().to_be_bytes());
    hasher.finalize()[..OCSP_NONCE_LENGTH].to_vec()
}

/// Returns a non-critical nonce extension carrying the given value
pub fn nonce_extension(nonce: &[u8]) -> Result<Extension> {
    let value = OctetString::new(nonce)?.to_der()?;
    Ok(Extension {
        extn_id: ID_PKIX_OCSP_NONCE,
        critical: false,
        extn_value: OctetString::new(value)?,
    })
}

/// Returns true if the certificate carries the id-pkix-ocsp-nocheck extension
pub fn no_check_present(cert: &PDVCertificate) -> bool {
    cert.extensions()
        .iter()
        .any(|ext| ext.extn_id == ID_PKIX_OCSP_NOCHECK)
}

/// Returns the first OCSP URI from the certificate's authority information access extension
pub fn get_ocsp_responder_uri(cert: &PDVCertificate) -> Option<String> {
    get_ocsp_uris(cert).into_iter().next()
}

/// Prepares a DER encoded, unsigned OCSP request for the given certificates
pub fn prepare_ocsp_request(cert_ids: &[CertId], extensions: &[Extension]) -> Result<Vec<u8>> {
    let mut request_list = vec![];
    for cert_id in cert_ids {
        request_list.push(Request {
            req_cert: cert_id.to_ocsp()?,
            single_request_extensions: None,
        });
    }
    let request_extensions: Option<Extensions> = if extensions.is_empty() {
        None
    } else {
        Some(extensions.to_vec())
    };
    let ocsp_req = OcspRequest {
        tbs_request: TbsRequest {
            version: Version::V1,
            requestor_name: None,
            request_list,
            request_extensions,
        },
        optional_signature: None,
    };
    Ok(ocsp_req.to_der()?)
}

/// Returns the URL used to send the request using HTTP GET, i.e., the responder URI followed by the
/// URL encoded base64 request
pub fn ocsp_get_url(responder_uri: &str, enc_ocsp_req: &[u8]) -> String {
    let b64 = Base64::encode_string(enc_ocsp_req);
    let sep = if responder_uri.ends_with('/') { "" } else { "/" };
    format!(
        "{}{}{}",
        responder_uri,
        sep,
        utf8_percent_encode(&b64, OCSP_URL_ENCODE_SET)
    )
}

/// send_ocsp_request sends an OCSP request for the certificates identified in `info` to the
/// responder it names, then verifies and processes the response.
///
/// Requests whose GET form fits within [`OCSP_GET_MAX_URL_LENGTH`] bytes are sent using GET unless
/// `info.use_get` is false. All others are sent using POST.
///
/// The only request extension added by this function is nonce, the usage of which is governed by
/// `info.nonce_setting`. Non-critical extensions may be present in a response without error.
/// Presence of any critical extension other than nonce results in failure.
pub fn send_ocsp_request(
    pe: &PkiEnvironment,
    transport: &dyn OcspTransport,
    info: &OcspRequestInfo<'_>,
) -> Result<OcspResponseInfo> {
    let uri = info.responder_uri;
    if !uri.starts_with("http://") && !uri.starts_with("https://") {
        debug!("Ignored non-HTTP URI presented to OCSP client: {}", uri);
        return Err(Error::InvalidUriScheme);
    }
    if info.cert_ids.is_empty() {
        error!("OCSP request to {} would identify no certificates", uri);
        return Err(Error::Misconfiguration);
    }

    let nonce = match (&info.nonce, info.nonce_setting) {
        (Some(n), _) => Some(n.clone()),
        (None, OcspNonceSetting::DoNotSendNonce) => None,
        (None, _) => Some(generate_nonce()),
    };

    let mut extensions = vec![];
    if let Some(n) = &nonce {
        extensions.push(nonce_extension(n)?);
    }
    extensions.extend(info.extensions.iter().cloned());
    let enc_ocsp_req = prepare_ocsp_request(&info.cert_ids, &extensions)?;

    let get_url = ocsp_get_url(uri, &enc_ocsp_req);
    let enc_ocsp_resp = if info.use_get && get_url.len() <= OCSP_GET_MAX_URL_LENGTH {
        debug!("Sending OCSP request to {} using GET", uri);
        transport.get(&get_url)
    } else {
        debug!("Sending OCSP request to {} using POST", uri);
        transport.post(uri, &enc_ocsp_req)
    };
    let enc_ocsp_resp = match enc_ocsp_resp {
        Ok(r) => r,
        Err(e) => {
            error!("Failed sending OCSP request to {} with {:?}", uri, e);
            return Err(e);
        }
    };

    process_ocsp_response_internal(pe, info, &enc_ocsp_resp, nonce.as_deref())
}

/// Processes an OCSP response that may have been dynamically obtained or obtained via stapling.
/// The nonce, if any, is taken from `info.nonce`.
pub fn process_ocsp_response(
    pe: &PkiEnvironment,
    info: &OcspRequestInfo<'_>,
    enc_ocsp_resp: &[u8],
) -> Result<OcspResponseInfo> {
    process_ocsp_response_internal(pe, info, enc_ocsp_resp, info.nonce.as_deref())
}

struct DeferDecodeBasicOcspResponse {
    ///   tbsResponseData          ResponseData,
    pub tbs_response_data: Vec<u8>,

    ///    certs               \[0\] EXPLICIT SEQUENCE OF Certificate OPTIONAL }
    pub certs: Option<Vec<Any>>,
}

impl ::der::FixedTag for DeferDecodeBasicOcspResponse {
    const TAG: ::der::Tag = ::der::Tag::Sequence;
}

impl<'a> ::der::DecodeValue<'a> for DeferDecodeBasicOcspResponse {
    fn decode_value<R: ::der::Reader<'a>>(
        reader: &mut R,
        header: ::der::Header,
    ) -> ::der::Result<Self> {
        use ::der::Reader as _;
        reader.read_nested(header.length, |reader| {
            let tbs_response_data = reader.tlv_bytes()?;
            // signatureAlgorithm and signature are read from the fully decoded structure
            reader.tlv_bytes()?;
            reader.tlv_bytes()?;
            let certs =
                ::der::asn1::ContextSpecific::decode_explicit(reader, ::der::TagNumber::N0)?
                    .map(|cs| cs.value);
            Ok(Self {
                tbs_response_data: tbs_response_data.to_vec(),
                certs,
            })
        })
    }
}

fn unsupported_critical_extensions_present(exts: &Option<Extensions>) -> bool {
    if let Some(exts) = exts {
        for ext in exts {
            if ext.critical && ext.extn_id != ID_PKIX_OCSP_NONCE {
                return true;
            }
        }
    }
    false
}

fn gt_to_secs(t: &x509_ocsp::OcspGeneralizedTime) -> u64 {
    t.0.to_unix_duration().as_secs()
}

fn check_response_time(sr: &SingleResponse, check_date: u64) -> bool {
    let this_update = gt_to_secs(&sr.this_update);
    if this_update > check_date + OCSP_MAX_CLOCK_SKEW {
        //future response
        return false;
    }
    let until = match &sr.next_update {
        Some(nu) => gt_to_secs(nu),
        None => this_update,
    };
    until + OCSP_MAX_CLOCK_SKEW >= check_date
}

fn verify_response_signature(
    pe: &PkiEnvironment,
    tbs_response_data: &[u8],
    bor: &BasicOcspResponse,
    signer_key: &SubjectPublicKeyInfoOwned,
) -> Result<()> {
    let signature = match bor.signature.as_bytes() {
        Some(s) => s,
        None => return Err(Error::OcspResponseError),
    };
    pe.verify_signature_message(
        pe,
        tbs_response_data,
        signature,
        &bor.signature_algorithm,
        signer_key,
    )
}

/// Returns true if `cert` was issued by `issuer`, verifies with the issuer's key, is valid at the
/// check date and asserts id-kp-OCSPSigning.
fn is_delegated_responder(
    pe: &PkiEnvironment,
    cert: &PDVCertificate,
    issuer: &OcspIssuer<'_>,
    check_date: u64,
) -> bool {
    if !compare_names(cert.issuer(), issuer.name) {
        return false;
    }
    if !cert.has_extended_key_usage(&ID_KP_OCSP_SIGNING) {
        debug!(
            "Ignoring candidate OCSP responder {} that lacks id-kp-OCSPSigning",
            name_to_string(cert.subject())
        );
        return false;
    }
    if verify_certificate_signature(pe, cert, issuer.public_key).is_err() {
        debug!(
            "Ignoring candidate OCSP responder {} that was not signed by {}",
            name_to_string(cert.subject()),
            name_to_string(issuer.name)
        );
        return false;
    }
    if valid_at_time(&cert.decoded_cert.tbs_certificate, check_date, true).is_err() {
        error!(
            "Candidate OCSP responder {} is not valid at the check date",
            name_to_string(cert.subject())
        );
        return false;
    }
    if !no_check_present(cert) {
        info!(
            "OCSP responder {} lacks id-pkix-ocsp-nocheck; its status is not checked",
            name_to_string(cert.subject())
        );
    }
    true
}

/// Locates the authorized signer of the response and verifies the response signature. Returns the
/// signer's name and key.
fn find_signer(
    pe: &PkiEnvironment,
    info: &OcspRequestInfo<'_>,
    ddbor: &DeferDecodeBasicOcspResponse,
    bor: &BasicOcspResponse,
    check_date: u64,
) -> Result<(Name, SubjectPublicKeyInfoOwned)> {
    let uri = info.responder_uri;

    // locally trusted responder
    if let Some(responder) = info.responder_cert {
        if valid_at_time(&responder.decoded_cert.tbs_certificate, check_date, true).is_ok()
            && verify_response_signature(pe, &ddbor.tbs_response_data, bor, responder.public_key())
                .is_ok()
        {
            return Ok((responder.subject().clone(), responder.public_key().clone()));
        }
        debug!(
            "Configured OCSP responder {} did not verify response from {}",
            name_to_string(responder.subject()),
            uri
        );
    }

    // the issuing CA
    if verify_response_signature(pe, &ddbor.tbs_response_data, bor, info.issuer.public_key).is_ok()
    {
        return Ok((info.issuer.name.clone(), info.issuer.public_key.clone()));
    }

    // delegated responders included in the response
    if let Some(certs) = &ddbor.certs {
        for a in certs {
            let certbuf = match a.to_der() {
                Ok(cb) => cb,
                Err(_) => continue,
            };
            let cert = match parse_cert(&certbuf, uri) {
                Ok(c) => c,
                Err(_) => continue,
            };
            if !is_delegated_responder(pe, &cert, &info.issuer, check_date) {
                continue;
            }
            if verify_response_signature(pe, &ddbor.tbs_response_data, bor, cert.public_key())
                .is_ok()
            {
                return Ok((cert.subject().clone(), cert.public_key().clone()));
            }
            error!(
                "Verified candidate responder cert from OCSP response from {} but response signature verification failed",
                uri
            );
        }
    }

    error!("Failed to find authorized OCSP responder for response from {}", uri);
    Err(Error::OcspResponseError)
}

fn check_nonce(
    info: &OcspRequestInfo<'_>,
    response_data: &ResponseData,
    nonce: Option<&[u8]>,
) -> Result<()> {
    let nonce = match nonce {
        Some(n) => n,
        None => return Ok(()),
    };
    let expected = nonce_extension(nonce)?;
    let received = response_data
        .response_extensions
        .as_ref()
        .and_then(|exts| exts.iter().find(|e| e.extn_id == ID_PKIX_OCSP_NONCE));
    match received {
        Some(ext) if ext.extn_value == expected.extn_value => Ok(()),
        Some(_) => {
            error!(
                "Nonce in OCSP response from {} does not match request",
                info.responder_uri
            );
            Err(Error::OcspNonceMismatch)
        }
        None if OcspNonceSetting::SendNonceRequireMatch == info.nonce_setting => {
            error!(
                "OCSP response from {} omitted the nonce sent in the request",
                info.responder_uri
            );
            Err(Error::OcspNonceMismatch)
        }
        None => {
            debug!("OCSP response from {} omitted nonce", info.responder_uri);
            Ok(())
        }
    }
}

fn single_status(sr: &SingleResponse) -> OcspSingleStatus {
    let status = match &sr.cert_status {
        CertStatus::Good(_) => OcspCertStatus::Good,
        CertStatus::Revoked(ri) => OcspCertStatus::Revoked {
            revocation_time: gt_to_secs(&ri.revocation_time),
            reason: ri.revocation_reason,
        },
        CertStatus::Unknown(_) => OcspCertStatus::Unknown,
    };
    OcspSingleStatus {
        status,
        this_update: gt_to_secs(&sr.this_update),
        next_update: sr.next_update.as_ref().map(gt_to_secs),
        single_extensions: sr.single_extensions.clone().unwrap_or_default(),
    }
}

fn process_ocsp_response_internal(
    pe: &PkiEnvironment,
    info: &OcspRequestInfo<'_>,
    enc_ocsp_resp: &[u8],
    nonce: Option<&[u8]>,
) -> Result<OcspResponseInfo> {
    let uri = info.responder_uri;
    let check_date = info.check_date.unwrap_or_else(now);

    let or = match OcspResponse::from_der(enc_ocsp_resp) {
        Ok(or) => or,
        Err(e) => {
            error!("Failed to parse OcspResponse from {}: {}", uri, e);
            return Err(Error::OcspResponseError);
        }
    };

    if or.response_status != OcspResponseStatus::Successful {
        error!(
            "OcspResponse from {} indicates failure ({:?})",
            uri, or.response_status
        );
        return Err(Error::OcspResponseError);
    }

    let rb = match &or.response_bytes {
        Some(rb) => rb,
        None => {
            error!("OcspResponse from {} contained no response bytes", uri);
            return Err(Error::OcspResponseError);
        }
    };

    if rb.response_type != ID_PKIX_OCSP_BASIC {
        error!(
            "OcspResponse from {} contained response bytes other than basic type ({})",
            uri, rb.response_type
        );
        return Err(Error::OcspResponseError);
    }

    let (bor, ddbor) = match (
        BasicOcspResponse::from_der(rb.response.as_bytes()),
        DeferDecodeBasicOcspResponse::from_der(rb.response.as_bytes()),
    ) {
        (Ok(bor), Ok(ddbor)) => (bor, ddbor),
        (Err(e), _) | (_, Err(e)) => {
            error!(
                "OcspResponse from {} contained BasicOcspResponse that could not be parsed with: {}",
                uri, e
            );
            return Err(Error::OcspResponseError);
        }
    };

    if unsupported_critical_extensions_present(&bor.tbs_response_data.response_extensions) {
        error!(
            "OcspResponse from {} contained at least one unsupported critical extension",
            uri
        );
        return Err(Error::PathValidation(
            PathValidationStatus::UnprocessedCriticalExtension,
        ));
    }

    let (signer, signer_key) = find_signer(pe, info, &ddbor, &bor, check_date)?;

    let params = ConstraintsParameters {
        algorithm: &bor.signature_algorithm,
        public_key: Some(&signer_key),
        variant: &info.variant,
    };
    if !pe.algorithm_constraints().permits(&params) {
        error!(
            "Signature algorithm {} used by OCSP responder {} is not permitted",
            bor.signature_algorithm.oid,
            name_to_string(&signer)
        );
        return Err(Error::OcspResponseError);
    }

    check_nonce(info, &bor.tbs_response_data, nonce)?;

    let mut statuses = HashMap::new();
    for cert_id in &info.cert_ids {
        let sr = match bor
            .tbs_response_data
            .responses
            .iter()
            .find(|sr| CertId::from(&sr.cert_id) == *cert_id)
        {
            Some(sr) => sr,
            None => {
                error!("OCSP response from {} omitted {}", uri, cert_id);
                return Err(Error::OcspResponseError);
            }
        };
        if unsupported_critical_extensions_present(&sr.single_extensions) {
            error!(
                "OCSP response from {} featured unrecognized critical extensions in single response",
                uri
            );
            return Err(Error::PathValidation(
                PathValidationStatus::UnprocessedCriticalExtension,
            ));
        }
        if !check_response_time(sr, check_date) {
            error!(
                "OCSP response from {} for {} is not current relative to {}",
                uri, cert_id, check_date
            );
            return Err(Error::OcspResponseError);
        }
        statuses.insert(cert_id.clone(), single_status(sr));
    }

    Ok(OcspResponseInfo {
        statuses,
        produced_at: gt_to_secs(&bor.tbs_response_data.produced_at),
        signer,
        encoded_response: enc_ocsp_resp.to_vec(),
    })
}

/// Determines the status of `target_cert` using the OCSP responders named in its authority
/// information access extension, stopping at the first responder that yields a definitive answer.
pub fn check_revocation_ocsp(
    pe: &PkiEnvironment,
    ps: &PathSettings,
    transport: &dyn OcspTransport,
    target_cert: &PDVCertificate,
    issuer: OcspIssuer<'_>,
) -> PathValidationStatus {
    let subject = name_to_string(target_cert.subject());
    let cert_id = match CertId::new(
        issuer.name,
        issuer.public_key,
        target_cert.serial_number().clone(),
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to prepare CertId for {}: {:?}", subject, e);
            return PathValidationStatus::RevocationStatusNotDetermined;
        }
    };

    let ocsp_uris = get_ocsp_uris(target_cert);
    if ocsp_uris.is_empty() {
        info!("No OCSP AIAs found for {}", subject);
    }
    for uri in &ocsp_uris {
        let info = OcspRequestInfo::from_settings(ps, vec![cert_id.clone()], uri, issuer);
        let status = match send_ocsp_request(pe, transport, &info) {
            Ok(resp) => match resp.status_for(&cert_id) {
                Some(OcspCertStatus::Good) => PathValidationStatus::Valid,
                Some(OcspCertStatus::Revoked { .. }) => PathValidationStatus::CertificateRevoked,
                _ => PathValidationStatus::RevocationStatusNotDetermined,
            },
            Err(Error::PathValidation(pvs)) => pvs,
            Err(_) => PathValidationStatus::RevocationStatusNotDetermined,
        };
        if status != PathValidationStatus::RevocationStatusNotDetermined {
            info!(
                "Determined revocation status ({}) using OCSP for certificate issued to {} via {}",
                status, subject, uri
            );
            return status;
        }
        info!("Failed to determine status for {} via {}", subject, uri);
    }
    PathValidationStatus::RevocationStatusNotDetermined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::populate_5280_pki_environment;
    use hex_literal::hex;
    use std::sync::Mutex;

    const CHECK_DATE: u64 = 1798761600;
    const NONCE: [u8; 16] = hex!("CB214A42B408C5F51E1B9758226B1E84");

    fn load(name: &str) -> PDVCertificate {
        let path = format!("{}/tests/examples/{}", env!("CARGO_MANIFEST_DIR"), name);
        parse_cert(&std::fs::read(path).unwrap(), name).unwrap()
    }

    fn load_bytes(name: &str) -> Vec<u8> {
        std::fs::read(format!(
            "{}/tests/examples/{}",
            env!("CARGO_MANIFEST_DIR"),
            name
        ))
        .unwrap()
    }

    fn pe() -> PkiEnvironment {
        let mut pe = PkiEnvironment::default();
        populate_5280_pki_environment(&mut pe);
        pe
    }

    struct RecordingTransport {
        response: Vec<u8>,
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingTransport {
        fn new(response: Vec<u8>) -> Self {
            RecordingTransport {
                response,
                calls: Mutex::new(vec![]),
            }
        }
    }

    impl OcspTransport for RecordingTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(("GET", url.to_string()));
            Ok(self.response.clone())
        }
        fn post(&self, url: &str, _request: &[u8]) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(("POST", url.to_string()));
            Ok(self.response.clone())
        }
    }

    #[test]
    fn request_encoding() {
        let inter = load("inter.der");
        let ee = load("ee.der");
        let cert_id = CertId::for_certificate(&ee, &inter).unwrap();

        let req = prepare_ocsp_request(&[cert_id.clone()], &[]).unwrap();
        assert_eq!(load_bytes("req_good.der"), req);

        let ext = nonce_extension(&NONCE).unwrap();
        let req = prepare_ocsp_request(&[cert_id], &[ext]).unwrap();
        assert_eq!(load_bytes("req_nonce.der"), req);

        assert_ne!(generate_nonce(), generate_nonce());
        assert_eq!(OCSP_NONCE_LENGTH, generate_nonce().len());
    }

    #[test]
    fn responder_helpers() {
        let ee = load("ee.der");
        assert_eq!(
            Some("http://ocsp.example.com/".to_string()),
            get_ocsp_responder_uri(&ee)
        );
        assert_eq!(None, get_ocsp_responder_uri(&load("inter.der")));
        assert!(no_check_present(&load("resp.der")));
        assert!(!no_check_present(&ee));

        let url = ocsp_get_url("http://ocsp.example.com", &[0xfb, 0xff]);
        assert_eq!("http://ocsp.example.com/%2B%2F8%3D", url);
        let url = ocsp_get_url("http://ocsp.example.com/", &[0xfb, 0xff]);
        assert_eq!("http://ocsp.example.com/%2B%2F8%3D", url);
    }

    #[test]
    fn good_response_with_configured_responder() {
        let pe = pe();
        let inter = load("inter.der");
        let ee = load("ee.der");
        let responder = load("resp.der");
        let cert_id = CertId::for_certificate(&ee, &inter).unwrap();
        let resp = load_bytes("resp_good.der");

        let mut info =
            OcspRequestInfo::new(vec![cert_id.clone()], "http://ocsp.example.com", (&inter).into());
        info.check_date = Some(CHECK_DATE);

        // no certificates in the response and not signed by the issuer
        assert_eq!(
            Some(Error::OcspResponseError),
            process_ocsp_response(&pe, &info, &resp).err()
        );

        info.responder_cert = Some(&responder);
        let result = process_ocsp_response(&pe, &info, &resp).unwrap();
        assert_eq!(Some(&OcspCertStatus::Good), result.status_for(&cert_id));
        assert_eq!(responder.subject(), &result.signer);
        assert!(result.produced_at < CHECK_DATE);
        let single = &result.statuses[&cert_id];
        assert!(single.next_update.is_some());
        assert!(single.single_extensions.is_empty());

        // response is stale
        info.check_date = Some(single.next_update.unwrap() + OCSP_MAX_CLOCK_SKEW + 1);
        assert_eq!(
            Some(Error::OcspResponseError),
            process_ocsp_response(&pe, &info, &resp).err()
        );
        // response is from the future, but within tolerance
        info.check_date = Some(single.this_update - OCSP_MAX_CLOCK_SKEW);
        assert!(process_ocsp_response(&pe, &info, &resp).is_ok());
        info.check_date = Some(single.this_update - OCSP_MAX_CLOCK_SKEW - 1);
        assert_eq!(
            Some(Error::OcspResponseError),
            process_ocsp_response(&pe, &info, &resp).err()
        );
    }

    #[test]
    fn revoked_response_with_delegated_responder() {
        let pe = pe();
        let inter = load("inter.der");
        let eerev = load("eerev.der");
        let ee = load("ee.der");
        let cert_id = CertId::for_certificate(&eerev, &inter).unwrap();
        let resp = load_bytes("resp_revoked.der");

        let mut info =
            OcspRequestInfo::new(vec![cert_id.clone()], "http://ocsp.example.com", (&inter).into());
        info.check_date = Some(CHECK_DATE);
        let result = process_ocsp_response(&pe, &info, &resp).unwrap();
        match result.status_for(&cert_id) {
            Some(OcspCertStatus::Revoked {
                revocation_time,
                reason,
            }) => {
                // 2025-03-01 12:00:00
                assert_eq!(1740830400, *revocation_time);
                assert_eq!(Some(CrlReason::KeyCompromise), *reason);
            }
            other => panic!("unexpected status {:?}", other),
        }

        // response does not cover ee
        info.cert_ids.push(CertId::for_certificate(&ee, &inter).unwrap());
        assert_eq!(
            Some(Error::OcspResponseError),
            process_ocsp_response(&pe, &info, &resp).err()
        );

        // responder certificate was not issued by root
        let root = load("root.der");
        let mut info =
            OcspRequestInfo::new(vec![cert_id], "http://ocsp.example.com", (&root).into());
        info.check_date = Some(CHECK_DATE);
        assert_eq!(
            Some(Error::OcspResponseError),
            process_ocsp_response(&pe, &info, &resp).err()
        );
    }

    #[test]
    fn nonce_handling() {
        let pe = pe();
        let inter = load("inter.der");
        let ee = load("ee.der");
        let cert_id = CertId::for_certificate(&ee, &inter).unwrap();

        let mut info =
            OcspRequestInfo::new(vec![cert_id.clone()], "http://ocsp.example.com", (&inter).into());
        info.check_date = Some(CHECK_DATE);
        info.nonce_setting = OcspNonceSetting::SendNonceRequireMatch;
        info.nonce = Some(NONCE.to_vec());

        // signed by the issuing CA and echoes the nonce
        let resp = load_bytes("resp_nonce.der");
        let result = process_ocsp_response(&pe, &info, &resp).unwrap();
        assert_eq!(Some(&OcspCertStatus::Good), result.status_for(&cert_id));
        assert_eq!(inter.subject(), &result.signer);

        info.nonce = Some(vec![0; 16]);
        assert_eq!(
            Some(Error::OcspNonceMismatch),
            process_ocsp_response(&pe, &info, &resp).err()
        );

        // no nonce in the response
        let responder = load("resp.der");
        info.responder_cert = Some(&responder);
        let resp = load_bytes("resp_good.der");
        assert_eq!(
            Some(Error::OcspNonceMismatch),
            process_ocsp_response(&pe, &info, &resp).err()
        );
        info.nonce_setting = OcspNonceSetting::SendNonceTolerateMismatchAbsence;
        assert!(process_ocsp_response(&pe, &info, &resp).is_ok());
    }

    #[test]
    fn get_and_post_boundary() {
        let pe = pe();
        let inter = load("inter.der");
        let ee = load("ee.der");
        let responder = load("resp.der");
        let cert_id = CertId::for_certificate(&ee, &inter).unwrap();
        let req = prepare_ocsp_request(&[cert_id.clone()], &[]).unwrap();

        let base = "http://a";
        let suffix_len = ocsp_get_url(base, &req).len() - base.len();
        let uri_with_url_len = |len: usize| {
            format!("http://{}", "a".repeat(len - suffix_len - "http://".len()))
        };

        for (len, method) in [(254, "GET"), (255, "GET"), (256, "POST")] {
            let uri = uri_with_url_len(len);
            assert_eq!(len, ocsp_get_url(&uri, &req).len());
            let transport = RecordingTransport::new(load_bytes("resp_good.der"));
            let mut info = OcspRequestInfo::new(vec![cert_id.clone()], &uri, (&inter).into());
            info.check_date = Some(CHECK_DATE);
            info.responder_cert = Some(&responder);
            let result = send_ocsp_request(&pe, &transport, &info).unwrap();
            assert_eq!(Some(&OcspCertStatus::Good), result.status_for(&cert_id));
            let calls = transport.calls.lock().unwrap();
            assert_eq!(1, calls.len());
            assert_eq!(method, calls[0].0);
            if "POST" == method {
                assert_eq!(uri, calls[0].1);
            }
        }

        // GET disabled
        let transport = RecordingTransport::new(load_bytes("resp_good.der"));
        let mut info =
            OcspRequestInfo::new(vec![cert_id.clone()], "http://ocsp.example.com", (&inter).into());
        info.check_date = Some(CHECK_DATE);
        info.responder_cert = Some(&responder);
        info.use_get = false;
        assert!(send_ocsp_request(&pe, &transport, &info).is_ok());
        assert_eq!("POST", transport.calls.lock().unwrap()[0].0);

        let info = OcspRequestInfo::new(vec![cert_id], "ldap://ocsp.example.com", (&inter).into());
        assert_eq!(
            Some(Error::InvalidUriScheme),
            send_ocsp_request(&pe, &transport, &info).err()
        );
    }

    #[test]
    fn settings_and_aia_driven_checks() {
        let pe = pe();
        let inter = load("inter.der");
        let ee = load("ee.der");

        let mut ps = PathSettings::default();
        ps.set_time_of_interest(CHECK_DATE);
        ps.set_ocsp_use_get(false);
        ps.set_ocsp_aia_nonce_setting(OcspNonceSetting::SendNonceTolerateMismatchAbsence);
        let info =
            OcspRequestInfo::from_settings(&ps, vec![], "http://ocsp.example.com", (&inter).into());
        assert_eq!(Some(CHECK_DATE), info.check_date);
        assert!(!info.use_get);
        assert_eq!(VARIANT_GENERIC, info.variant);

        // the generated nonce differs from the one echoed in resp_nonce
        let transport = RecordingTransport::new(load_bytes("resp_nonce.der"));
        assert_eq!(
            PathValidationStatus::RevocationStatusNotDetermined,
            check_revocation_ocsp(&pe, &ps, &transport, &ee, (&inter).into())
        );
        assert_eq!(
            "http://ocsp.example.com/",
            transport.calls.lock().unwrap()[0].1
        );

        ps.set_ocsp_aia_nonce_setting(OcspNonceSetting::DoNotSendNonce);
        assert_eq!(
            PathValidationStatus::Valid,
            check_revocation_ocsp(&pe, &ps, &transport, &ee, (&inter).into())
        );
    }
}
