//! Error types

use core::fmt;

/// Result type
pub type Result<T> = core::result::Result<T, Error>;

/// Reasons a certificate or certification path was rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum PathValidationStatus {
    /// No errors were encountered while validating certification path
    Valid,
    /// NameChainingFailure occurs when the subject name of a superior certificate does not match the
    /// issuer name of the immediately subordinate certificate.
    NameChainingFailure,
    /// SignatureVerificationFailure occurs when the subject public key of a superior certificate does
    /// not verify the signature of the immediately subordinate certificate.
    SignatureVerificationFailure,
    /// InvalidNotBeforeDate occurs when a certificate contains a notBefore date that is after the
    /// time of interest.
    InvalidNotBeforeDate,
    /// InvalidNotAfterDate occurs when a certificate contains a notAfter date that is before the time
    /// of interest.
    InvalidNotAfterDate,
    /// MissingBasicConstraints occurs when an intermediate CA certificate does not contain a
    /// basicConstraints extension.
    MissingBasicConstraints,
    /// InvalidBasicConstraints occurs when an intermediate CA certificate contains a basicConstraints
    /// extension with the cA field set to false.
    InvalidBasicConstraints,
    /// InvalidPathLength occurs when a path has more CA certificates than allowed by either the
    /// maximum path length setting or a constraint asserted by a CA certificate in the path.
    InvalidPathLength,
    /// InvalidKeyUsage occurs when a key usage extension is malformed, has fewer than nine bits, does
    /// not permit any primitive or, for a CA certificate, lacks keyCertSign.
    InvalidKeyUsage,
    /// AlgorithmConstrained occurs when a signature algorithm, public key algorithm or key size is
    /// disabled by the operative algorithm constraints.
    AlgorithmConstrained,
    /// NullPolicySet occurs when the set of valid policies becomes empty while explicit policy is
    /// required.
    NullPolicySet,
    /// InvalidPolicyMapping occurs when a policy mappings extension maps to or from anyPolicy.
    InvalidPolicyMapping,
    /// NameConstraintsViolation occurs when a name constraint is violated.
    NameConstraintsViolation,
    /// UnprocessedCriticalExtension occurs when a certificate features a critical extension that no
    /// component recognizes.
    UnprocessedCriticalExtension,
    /// CertificateAlreadyInPath occurs when a candidate has the same subject and public key as a
    /// certificate already accepted into the partial path.
    CertificateAlreadyInPath,
    /// MissingTrustAnchor occurs when no trust anchors are available.
    MissingTrustAnchor,
    /// EncodingError occurs when an object cannot be parsed.
    EncodingError,
    /// MissingCertificate occurs when no certificate matching the target selector could be found.
    MissingCertificate,
    /// NoPathsFound occurs when all candidates were exhausted without completing a path.
    NoPathsFound,
    /// CertificateRevoked occurs when a certificate has been revoked.
    CertificateRevoked,
    /// RevocationStatusNotDetermined occurs when revocation status could not be determined.
    RevocationStatusNotDetermined,
    /// A configuration error was detected. See textual log output for more details.
    Misconfiguration,
}

/// Error type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// PathValidationError encountered
    PathValidation(PathValidationStatus),
    /// NotFound occurs when an action failed because a necessary artifact was not found.
    NotFound,
    /// Unrecognized occurs when an error conditions does not match anything else here.
    Unrecognized,
    /// A URI scheme was encountered that was not valid in given context, i.e., ldap URI presented to OCSP
    InvalidUriScheme,
    /// A URI was not fetched because it did not satisfy the AIA location allow-list.
    UriNotAllowed,
    /// An artifact could not be parsed
    ParseError,
    /// A networking issue occurred.
    NetworkError,
    /// A remote server answered with an HTTP status other than 200.
    UnexpectedHttpStatus(u16),
    /// An error occurred processing an OCSP response
    OcspResponseError,
    /// The nonce in an OCSP response did not match the nonce sent in the request.
    OcspNonceMismatch,
    /// Asn1Error is used to propagate error information from the der crate.
    Asn1Error(der::Error),
    /// A resource was not retrieved due to no change since saved last modified time
    ResourceUnchanged,
    /// An operation or mode is not supported by the component it was requested from.
    Unsupported,
    /// A configuration error was detected. See textual log output for more details.
    Misconfiguration,
    /// The path building search exhausted its signature or candidate budget.
    BudgetExceeded,
    /// Error encapsulates an error derived from [std::io::ErrorKind]
    StdIoError(std::io::ErrorKind),
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Error {
        Error::Asn1Error(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::StdIoError(err.kind())
    }
}

impl From<PathValidationStatus> for Error {
    fn from(status: PathValidationStatus) -> Error {
        Error::PathValidation(status)
    }
}

impl fmt::Display for PathValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathValidationStatus::Valid => write!(f, "Valid"),
            PathValidationStatus::NameChainingFailure => write!(f, "Name chaining failure"),
            PathValidationStatus::SignatureVerificationFailure => {
                write!(f, "Signature verification failure")
            }
            PathValidationStatus::InvalidNotBeforeDate => write!(f, "InvalidNotBeforeDate"),
            PathValidationStatus::InvalidNotAfterDate => write!(f, "InvalidNotAfterDate"),
            PathValidationStatus::MissingBasicConstraints => write!(f, "MissingBasicConstraints"),
            PathValidationStatus::InvalidBasicConstraints => write!(f, "InvalidBasicConstraints"),
            PathValidationStatus::InvalidPathLength => write!(f, "InvalidPathLength"),
            PathValidationStatus::InvalidKeyUsage => write!(f, "InvalidKeyUsage"),
            PathValidationStatus::AlgorithmConstrained => write!(f, "AlgorithmConstrained"),
            PathValidationStatus::NullPolicySet => write!(f, "NullPolicySet"),
            PathValidationStatus::InvalidPolicyMapping => write!(f, "InvalidPolicyMapping"),
            PathValidationStatus::NameConstraintsViolation => write!(f, "NameConstraintsViolation"),
            PathValidationStatus::UnprocessedCriticalExtension => {
                write!(f, "UnprocessedCriticalExtension")
            }
            PathValidationStatus::CertificateAlreadyInPath => {
                write!(f, "CertificateAlreadyInPath")
            }
            PathValidationStatus::MissingTrustAnchor => write!(f, "MissingTrustAnchor"),
            PathValidationStatus::EncodingError => write!(f, "EncodingError"),
            PathValidationStatus::MissingCertificate => write!(f, "MissingCertificate"),
            PathValidationStatus::NoPathsFound => write!(f, "NoPathsFound"),
            PathValidationStatus::CertificateRevoked => write!(f, "CertificateRevoked"),
            PathValidationStatus::RevocationStatusNotDetermined => {
                write!(f, "RevocationStatusNotDetermined")
            }
            PathValidationStatus::Misconfiguration => write!(f, "Misconfiguration"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PathValidation(err) => write!(f, "PathValidationError: {}", err),
            Error::NotFound => write!(f, "NotFound"),
            Error::Unrecognized => write!(f, "Unrecognized"),
            Error::InvalidUriScheme => write!(f, "InvalidUriScheme"),
            Error::UriNotAllowed => write!(f, "UriNotAllowed"),
            Error::ParseError => write!(f, "ParseError"),
            Error::NetworkError => write!(f, "NetworkError"),
            Error::UnexpectedHttpStatus(status) => write!(f, "UnexpectedHttpStatus: {}", status),
            Error::OcspResponseError => write!(f, "OcspResponseError"),
            Error::OcspNonceMismatch => write!(f, "OcspNonceMismatch"),
            Error::Asn1Error(err) => write!(f, "Asn1Error: {}", err),
            Error::ResourceUnchanged => write!(f, "ResourceUnchanged"),
            Error::Unsupported => write!(f, "Unsupported"),
            Error::Misconfiguration => write!(f, "Misconfiguration"),
            Error::BudgetExceeded => write!(f, "BudgetExceeded"),
            Error::StdIoError(err) => write!(f, "StdIoError: {:?}", err),
        }
    }
}

impl std::error::Error for Error {}

/// Outcome of evaluating a single candidate certificate during path building. A rejected
/// candidate is skipped and the search continues. A fatal error aborts the search.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CandidateError {
    /// The candidate was rejected for the indicated reason
    Rejected(PathValidationStatus),
    /// An error that terminates path building
    Fatal(Error),
}

/// Result type for candidate evaluation
pub type CandidateResult<T> = core::result::Result<T, CandidateError>;

impl From<PathValidationStatus> for CandidateError {
    fn from(status: PathValidationStatus) -> CandidateError {
        CandidateError::Rejected(status)
    }
}

impl From<Error> for CandidateError {
    fn from(err: Error) -> CandidateError {
        match err {
            Error::PathValidation(status) => CandidateError::Rejected(status),
            Error::BudgetExceeded => CandidateError::Fatal(err),
            Error::Asn1Error(_) | Error::ParseError => {
                CandidateError::Rejected(PathValidationStatus::EncodingError)
            }
            _ => CandidateError::Fatal(err),
        }
    }
}

impl fmt::Display for CandidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateError::Rejected(status) => write!(f, "Rejected: {}", status),
            CandidateError::Fatal(err) => write!(f, "Fatal: {}", err),
        }
    }
}

#[test]
fn error_test() {
    let s = format!(
        "{}",
        Error::PathValidation(PathValidationStatus::AlgorithmConstrained)
    );
    assert_eq!(s, "PathValidationError: AlgorithmConstrained");
    let s = format!("{}", Error::UnexpectedHttpStatus(404));
    assert_eq!(s, "UnexpectedHttpStatus: 404");
    let s = format!("{}", Error::from(PathValidationStatus::NoPathsFound));
    assert_eq!(s, "PathValidationError: NoPathsFound");
    let s = format!("{}", Error::Asn1Error(der::Error::from(der::ErrorKind::Failed)));
    assert!(s.starts_with("Asn1Error"));
    {
        let e: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(e, Error::StdIoError(std::io::ErrorKind::NotFound));
    }
}
