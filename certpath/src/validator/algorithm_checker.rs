//! Algorithm and key usage constraint checking applied to each certificate of a candidate path
//!
//! [`DisabledAlgorithmConstraints`] parses rule lists like `MD5, RSA keySize < 2048` and answers
//! whether an algorithm or key is permitted. [`AlgorithmChecker`] applies the constraints to a
//! certificate, threading the previous certificate's public key through an
//! [`AlgorithmCheckContext`] so that signatures are evaluated alongside the key that produced them
//! and so that DSA keys lacking domain parameters can inherit them.

use std::env;
use std::sync::Arc;

use der::asn1::Uint;
use der::{Any, Decode, Encode, Sequence};
use flagset::{flags, FlagSet};
use lazy_static::lazy_static;
use log::{error, warn};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::util::crypto::get_named_curve_parameter;
use crate::util::error::*;
use crate::util::pdv_alg_oids::*;
use crate::util::pdv_utilities::name_to_string;
use crate::validator::path_settings::PathSettings;
use crate::validator::pdv_certificate::PDVCertificate;
use crate::validator::pdv_trust_anchor::TrustAnchor;

/// Environment variable consulted for the process-wide disabled algorithm rules
pub const DISABLED_ALGORITHMS_ENV: &str = "CERTPATH_DISABLED_ALGORITHMS";

/// Rules used when neither settings nor the environment provide any
pub const DEFAULT_DISABLED_ALGORITHMS: &str =
    "MD2, MD5, RSA keySize < 1024, DSA keySize < 1024, EC keySize < 224";

flags! {
    /// Cryptographic primitives a key or algorithm may be used for
    pub enum CryptoPrimitive: u8 {
        /// Digital signature, including certificate and CRL signing
        Signature = 0b0001,
        /// Key encapsulation (keyEncipherment)
        KeyEncapsulation = 0b0010,
        /// Public key encryption (dataEncipherment)
        PublicKeyEncryption = 0b0100,
        /// Key agreement
        KeyAgreement = 0b1000,
    }
}

/// Set of [`CryptoPrimitive`] values
pub type PrimitiveSet = FlagSet<CryptoPrimitive>;

/// Primitive set used when evaluating signature algorithms
pub fn signature_primitive_set() -> PrimitiveSet {
    CryptoPrimitive::Signature.into()
}

/// `ConstraintsParameters` bundles the inputs to a combined algorithm and key check, i.e., when
/// verifying an OCSP response signature on behalf of a particular validation variant.
#[derive(Clone, Debug)]
pub struct ConstraintsParameters<'a> {
    /// Signature algorithm being evaluated
    pub algorithm: &'a AlgorithmIdentifierOwned,
    /// Key that produced the signature, if known
    pub public_key: Option<&'a SubjectPublicKeyInfoOwned>,
    /// Validation variant, i.e., "generic" or "tls server"
    pub variant: &'a str,
}

/// The `AlgorithmConstraints` trait answers whether algorithms and keys may be used.
pub trait AlgorithmConstraints: Send + Sync {
    /// Returns true if the algorithm is permitted for the given primitives and variant
    fn permits_algorithm(
        &self,
        primitives: PrimitiveSet,
        algorithm: &AlgorithmIdentifierOwned,
        variant: &str,
    ) -> bool;

    /// Returns true if the key (algorithm and size) is permitted for the given primitives and variant
    fn permits_key(
        &self,
        primitives: PrimitiveSet,
        key: &SubjectPublicKeyInfoOwned,
        variant: &str,
    ) -> bool;

    /// Returns true if the signature algorithm and, if present, the signing key are permitted
    fn permits(&self, params: &ConstraintsParameters<'_>) -> bool {
        let primitives = signature_primitive_set();
        if !self.permits_algorithm(primitives, params.algorithm, params.variant) {
            return false;
        }
        match params.public_key {
            Some(key) => self.permits_key(primitives, key, params.variant),
            None => true,
        }
    }
}

//-----------------------------------------------------------------------------------------------
// Algorithm naming
//-----------------------------------------------------------------------------------------------
fn normalize_name(name: &str) -> String {
    name.replace('-', "").to_uppercase()
}

/// Returns the names an algorithm identifier answers to, i.e., SHA256withECDSA decomposes into
/// SHA256withECDSA, SHA256, ECDSA and EC. Unknown algorithms answer to their dotted OID.
pub fn algorithm_names(oid: &der::asn1::ObjectIdentifier) -> Vec<&'static str> {
    match *oid {
        PKIXALG_MD2_WITH_RSA_ENCRYPTION => vec!["MD2withRSA", "MD2", "RSA"],
        PKIXALG_MD5_WITH_RSA_ENCRYPTION => vec!["MD5withRSA", "MD5", "RSA"],
        PKIXALG_SHA1_WITH_RSA_ENCRYPTION => vec!["SHA1withRSA", "SHA1", "RSA"],
        PKIXALG_SHA224_WITH_RSA_ENCRYPTION => vec!["SHA224withRSA", "SHA224", "RSA"],
        PKIXALG_SHA256_WITH_RSA_ENCRYPTION => vec!["SHA256withRSA", "SHA256", "RSA"],
        PKIXALG_SHA384_WITH_RSA_ENCRYPTION => vec!["SHA384withRSA", "SHA384", "RSA"],
        PKIXALG_SHA512_WITH_RSA_ENCRYPTION => vec!["SHA512withRSA", "SHA512", "RSA"],
        PKIXALG_RSASSA_PSS => vec!["RSASSA-PSS", "RSA"],
        PKIXALG_ECDSA_WITH_SHA1 => vec!["SHA1withECDSA", "SHA1", "ECDSA", "EC"],
        PKIXALG_ECDSA_WITH_SHA224 => vec!["SHA224withECDSA", "SHA224", "ECDSA", "EC"],
        PKIXALG_ECDSA_WITH_SHA256 => vec!["SHA256withECDSA", "SHA256", "ECDSA", "EC"],
        PKIXALG_ECDSA_WITH_SHA384 => vec!["SHA384withECDSA", "SHA384", "ECDSA", "EC"],
        PKIXALG_ECDSA_WITH_SHA512 => vec!["SHA512withECDSA", "SHA512", "ECDSA", "EC"],
        PKIXALG_DSA_WITH_SHA1 => vec!["SHA1withDSA", "SHA1", "DSA"],
        PKIXALG_DSA_WITH_SHA256 => vec!["SHA256withDSA", "SHA256", "DSA"],
        PKIXALG_RSA_ENCRYPTION => vec!["RSA"],
        PKIXALG_EC_PUBLIC_KEY => vec!["EC"],
        PKIXALG_DSA => vec!["DSA"],
        PKIXALG_ED25519 => vec!["Ed25519", "EdDSA"],
        PKIXALG_ED448 => vec!["Ed448", "EdDSA"],
        PKIXALG_SHA1 => vec!["SHA1"],
        PKIXALG_SHA224 => vec!["SHA224"],
        PKIXALG_SHA256 => vec!["SHA256"],
        PKIXALG_SHA384 => vec!["SHA384"],
        PKIXALG_SHA512 => vec!["SHA512"],
        _ => vec![],
    }
}

fn answers_to(oid: &der::asn1::ObjectIdentifier, name: &str) -> bool {
    if normalize_name(&oid.to_string()) == name {
        return true;
    }
    algorithm_names(oid)
        .iter()
        .any(|n| normalize_name(n) == name)
}

//-----------------------------------------------------------------------------------------------
// Key sizes and DSA parameters
//-----------------------------------------------------------------------------------------------
/// DSA domain parameters
///
/// ```text
/// Dss-Parms  ::=  SEQUENCE  {
///     p             INTEGER,
///     q             INTEGER,
///     g             INTEGER  }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct DsaParameters {
    /// prime modulus
    pub p: Uint,
    /// prime divisor
    pub q: Uint,
    /// generator
    pub g: Uint,
}

fn bit_length(bytes: &[u8]) -> usize {
    let mut iter = bytes.iter().skip_while(|b| 0 == **b);
    match iter.next() {
        Some(first) => (8 - first.leading_zeros() as usize) + 8 * iter.count(),
        None => 0,
    }
}

fn dsa_parameters(params: &Any) -> Result<DsaParameters> {
    Ok(DsaParameters::from_der(&params.to_der()?)?)
}

/// Returns true if the key is a DSA key without domain parameters
pub fn is_dsa_key_missing_parameters(key: &SubjectPublicKeyInfoOwned) -> bool {
    PKIXALG_DSA == key.algorithm.oid
        && match &key.algorithm.parameters {
            None => true,
            Some(p) => p.is_null(),
        }
}

/// Returns the size of the key in bits, or None if the size cannot be determined.
pub fn key_size(key: &SubjectPublicKeyInfoOwned) -> Option<usize> {
    match key.algorithm.oid {
        PKIXALG_RSA_ENCRYPTION => {
            match rsa::pkcs1::RsaPublicKey::from_der(key.subject_public_key.raw_bytes()) {
                Ok(rsa) => Some(bit_length(rsa.modulus.as_bytes())),
                Err(e) => {
                    error!("Failed to parse RSA public key: {}", e);
                    None
                }
            }
        }
        PKIXALG_EC_PUBLIC_KEY => match get_named_curve_parameter(&key.algorithm) {
            Ok(PKIXALG_SECP224R1) => Some(224),
            Ok(PKIXALG_SECP256R1) => Some(256),
            Ok(PKIXALG_SECP384R1) => Some(384),
            Ok(PKIXALG_SECP521R1) => Some(521),
            _ => None,
        },
        PKIXALG_DSA => match &key.algorithm.parameters {
            Some(params) if !params.is_null() => match dsa_parameters(params) {
                Ok(dsa) => Some(bit_length(dsa.p.as_bytes())),
                Err(e) => {
                    error!("Failed to parse DSA parameters: {}", e);
                    None
                }
            },
            _ => None,
        },
        PKIXALG_ED25519 => Some(255),
        PKIXALG_ED448 => Some(448),
        _ => None,
    }
}

/// Returns a copy of `key` carrying the domain parameters of `prev_key`. Fails if `prev_key` is not
/// a DSA key or also lacks parameters.
pub fn inherit_dsa_parameters(
    key: &SubjectPublicKeyInfoOwned,
    prev_key: Option<&SubjectPublicKeyInfoOwned>,
) -> Result<SubjectPublicKeyInfoOwned> {
    let prev_key = match prev_key {
        Some(k) => k,
        None => {
            error!("DSA key lacks parameters and no previous key is available to inherit from");
            return Err(Error::PathValidation(
                PathValidationStatus::AlgorithmConstrained,
            ));
        }
    };
    if PKIXALG_DSA != prev_key.algorithm.oid || is_dsa_key_missing_parameters(prev_key) {
        error!("DSA key lacks parameters and previous key is not a parameterized DSA key");
        return Err(Error::PathValidation(
            PathValidationStatus::AlgorithmConstrained,
        ));
    }
    let mut inherited = key.clone();
    inherited.algorithm.parameters = prev_key.algorithm.parameters.clone();
    Ok(inherited)
}

//-----------------------------------------------------------------------------------------------
// Disabled algorithm rules
//-----------------------------------------------------------------------------------------------
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn parse(s: &str) -> Option<Comparison> {
        match s {
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Ne),
            _ => None,
        }
    }

    fn holds(&self, lhs: usize, rhs: usize) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum RuleConstraint {
    KeySize(Comparison, usize),
    Usage(Vec<String>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct DisabledAlgorithm {
    name: String,
    constraints: Vec<RuleConstraint>,
}

fn usage_matches_variant(usage: &str, variant: &str) -> bool {
    let variant = variant.to_lowercase();
    match usage.to_lowercase().as_str() {
        "tlsserver" => "tls server" == variant,
        "tlsclient" => "tls client" == variant,
        "signedjar" => {
            "code signing" == variant || "plugin code signing" == variant || "tsa server" == variant
        }
        "all" => true,
        other => other == variant,
    }
}

impl DisabledAlgorithm {
    fn parse(entry: &str) -> Result<DisabledAlgorithm> {
        let mut tokens = entry.split_whitespace();
        let name = match tokens.next() {
            Some(n) => normalize_name(n),
            None => return Err(Error::Misconfiguration),
        };
        let rest: Vec<&str> = tokens.collect();
        let rest = rest.join(" ");
        let mut constraints = vec![];
        for clause in rest.split('&').map(|c| c.trim()).filter(|c| !c.is_empty()) {
            let parts: Vec<&str> = clause.split_whitespace().collect();
            match parts.first().copied() {
                Some("keySize") => {
                    if 3 != parts.len() {
                        error!("Malformed keySize constraint in disabled algorithm entry: {}", entry);
                        return Err(Error::Misconfiguration);
                    }
                    let cmp = match Comparison::parse(parts[1]) {
                        Some(c) => c,
                        None => {
                            error!("Unrecognized comparison {} in entry: {}", parts[1], entry);
                            return Err(Error::Misconfiguration);
                        }
                    };
                    let size = match parts[2].parse::<usize>() {
                        Ok(s) => s,
                        Err(_) => {
                            error!("Unrecognized key size {} in entry: {}", parts[2], entry);
                            return Err(Error::Misconfiguration);
                        }
                    };
                    constraints.push(RuleConstraint::KeySize(cmp, size));
                }
                Some("usage") if parts.len() > 1 => {
                    constraints.push(RuleConstraint::Usage(
                        parts[1..].iter().map(|s| s.to_string()).collect(),
                    ));
                }
                _ => {
                    error!("Unrecognized constraint \"{}\" in entry: {}", clause, entry);
                    return Err(Error::Misconfiguration);
                }
            }
        }
        Ok(DisabledAlgorithm { name, constraints })
    }

    fn has_key_size_constraint(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, RuleConstraint::KeySize(_, _)))
    }

    fn applies_to_variant(&self, variant: &str) -> bool {
        self.constraints.iter().all(|c| match c {
            RuleConstraint::Usage(usages) => usages.iter().any(|u| usage_matches_variant(u, variant)),
            _ => true,
        })
    }

    fn key_size_violated(&self, size: Option<usize>) -> bool {
        // keys of undetermined size are not rejected by size rules
        let size = match size {
            Some(s) => s,
            None => return false,
        };
        self.constraints.iter().any(|c| match c {
            RuleConstraint::KeySize(cmp, limit) => cmp.holds(size, *limit),
            _ => false,
        })
    }
}

/// `DisabledAlgorithmConstraints` implements [`AlgorithmConstraints`] using a comma separated
/// list of rules. Each rule names an algorithm optionally followed by `&` separated constraints:
/// `keySize <op> <bits>` (op one of <, <=, >, >=, ==, !=) and `usage <name>...` (TLSServer,
/// TLSClient, SignedJAR or a variant name). An entry without a keySize constraint disables the
/// algorithm outright. Names are compared case insensitively with hyphens ignored.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DisabledAlgorithmConstraints {
    entries: Vec<DisabledAlgorithm>,
}

impl DisabledAlgorithmConstraints {
    /// Parses a rule list, i.e., `MD2, MD5, RSA keySize < 1024`.
    pub fn parse(rules: &str) -> Result<DisabledAlgorithmConstraints> {
        let mut entries = vec![];
        for entry in rules.split(',').map(|e| e.trim()).filter(|e| !e.is_empty()) {
            entries.push(DisabledAlgorithm::parse(entry)?);
        }
        Ok(DisabledAlgorithmConstraints { entries })
    }

    /// Reads rules from `CERTPATH_DISABLED_ALGORITHMS`, falling back to [`DEFAULT_DISABLED_ALGORITHMS`]
    /// when the variable is absent or cannot be parsed.
    pub fn from_env() -> DisabledAlgorithmConstraints {
        if let Ok(rules) = env::var(DISABLED_ALGORITHMS_ENV) {
            match Self::parse(&rules) {
                Ok(c) => return c,
                Err(e) => error!(
                    "Ignoring {} due to error ({}); using default rules",
                    DISABLED_ALGORITHMS_ENV, e
                ),
            }
        }
        Self::parse(DEFAULT_DISABLED_ALGORITHMS).unwrap_or_default()
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no rules are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AlgorithmConstraints for DisabledAlgorithmConstraints {
    fn permits_algorithm(
        &self,
        primitives: PrimitiveSet,
        algorithm: &AlgorithmIdentifierOwned,
        variant: &str,
    ) -> bool {
        if primitives.is_empty() {
            return false;
        }
        for entry in &self.entries {
            if !entry.has_key_size_constraint()
                && entry.applies_to_variant(variant)
                && answers_to(&algorithm.oid, &entry.name)
            {
                warn!(
                    "Algorithm {} is disabled by rule {}",
                    algorithm.oid, entry.name
                );
                return false;
            }
        }
        true
    }

    fn permits_key(
        &self,
        primitives: PrimitiveSet,
        key: &SubjectPublicKeyInfoOwned,
        variant: &str,
    ) -> bool {
        if primitives.is_empty() {
            return false;
        }
        let size = key_size(key);
        for entry in &self.entries {
            if !entry.applies_to_variant(variant) || !answers_to(&key.algorithm.oid, &entry.name) {
                continue;
            }
            if !entry.has_key_size_constraint() || entry.key_size_violated(size) {
                warn!(
                    "Key of type {} and size {:?} is disabled by rule {}",
                    key.algorithm.oid, size, entry.name
                );
                return false;
            }
        }
        true
    }
}

lazy_static! {
    static ref DEFAULT_CONSTRAINTS: Arc<dyn AlgorithmConstraints> =
        Arc::new(DisabledAlgorithmConstraints::from_env());
}

/// Returns the process-wide default constraints, read once from `CERTPATH_DISABLED_ALGORITHMS` or
/// [`DEFAULT_DISABLED_ALGORITHMS`].
pub fn default_algorithm_constraints() -> Arc<dyn AlgorithmConstraints> {
    DEFAULT_CONSTRAINTS.clone()
}

/// Returns constraints built from `PS_DISABLED_ALGORITHMS`, when present, else the process-wide
/// default constraints.
pub fn algorithm_constraints_from_settings(
    ps: &PathSettings,
) -> Result<Arc<dyn AlgorithmConstraints>> {
    match ps.get_disabled_algorithms() {
        Some(rules) => Ok(Arc::new(DisabledAlgorithmConstraints::parse(&rules)?)),
        None => Ok(default_algorithm_constraints()),
    }
}

//-----------------------------------------------------------------------------------------------
// Checker
//-----------------------------------------------------------------------------------------------
/// Derives the set of primitives a key may be used for from key usage bits. Fails with
/// InvalidKeyUsage when fewer than nine bits are presented or when none of the bits map to a
/// primitive.
pub fn primitives_from_key_usage(ku: &[bool]) -> Result<PrimitiveSet> {
    if ku.len() < 9 {
        error!("Key usage has fewer than nine bits");
        return Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage));
    }
    let mut primitives = PrimitiveSet::default();
    // digitalSignature, nonRepudiation, keyCertSign, cRLSign
    if ku[0] || ku[1] || ku[5] || ku[6] {
        primitives |= CryptoPrimitive::Signature;
    }
    if ku[2] {
        primitives |= CryptoPrimitive::KeyEncapsulation;
    }
    if ku[3] {
        primitives |= CryptoPrimitive::PublicKeyEncryption;
    }
    if ku[4] {
        primitives |= CryptoPrimitive::KeyAgreement;
    }
    if primitives.is_empty() {
        error!("Key usage does not permit any cryptographic primitive");
        return Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage));
    }
    Ok(primitives)
}

/// `AlgorithmCheckContext` carries the public key of the most recently checked certificate (seeded
/// from the trust anchor) between successive calls to [`AlgorithmChecker::check`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AlgorithmCheckContext {
    /// Public key of the previous certificate, with inherited DSA parameters applied
    pub prev_pub_key: Option<SubjectPublicKeyInfoOwned>,
}

impl AlgorithmCheckContext {
    /// Context with no previous key, used when checking candidates in isolation
    pub fn standalone() -> AlgorithmCheckContext {
        AlgorithmCheckContext::default()
    }

    /// Context seeded with a known previous key
    pub fn with_previous_key(key: SubjectPublicKeyInfoOwned) -> AlgorithmCheckContext {
        AlgorithmCheckContext {
            prev_pub_key: Some(key),
        }
    }
}

/// `AlgorithmChecker` applies [`AlgorithmConstraints`] to certificates, anchor-adjacent first.
#[derive(Clone)]
pub struct AlgorithmChecker {
    constraints: Arc<dyn AlgorithmConstraints>,
    trusted_key: Option<SubjectPublicKeyInfoOwned>,
    variant: String,
}

impl AlgorithmChecker {
    /// Creates a checker that seeds the previous key from the trust anchor, if one is provided
    pub fn new(
        constraints: Arc<dyn AlgorithmConstraints>,
        anchor: Option<&TrustAnchor>,
        variant: &str,
    ) -> AlgorithmChecker {
        AlgorithmChecker {
            constraints,
            trusted_key: anchor.map(|ta| ta.public_key().clone()),
            variant: variant.to_string(),
        }
    }

    /// Returns the initial context. Only reverse (anchor toward target) checking is supported;
    /// requesting forward checking fails with [`Error::Unsupported`].
    pub fn init(&self, forward: bool) -> Result<AlgorithmCheckContext> {
        if forward {
            error!("Forward checking is not supported by the algorithm checker");
            return Err(Error::Unsupported);
        }
        Ok(AlgorithmCheckContext {
            prev_pub_key: self.trusted_key.clone(),
        })
    }

    /// Checks `cert` against the constraints and returns the context for the next certificate.
    pub fn check(
        &self,
        ctx: &AlgorithmCheckContext,
        cert: &PDVCertificate,
    ) -> Result<AlgorithmCheckContext> {
        let primitives = match cert.key_usage_bits()? {
            Some(ku) => primitives_from_key_usage(&ku)?,
            None => FlagSet::full(),
        };

        let sig_alg = cert.signature_algorithm();
        let sig_primitives = signature_primitive_set();
        if !self
            .constraints
            .permits_algorithm(sig_primitives, sig_alg, &self.variant)
        {
            error!(
                "Signature algorithm {} used to sign certificate issued to {} is disabled",
                sig_alg.oid,
                name_to_string(cert.subject())
            );
            return Err(Error::PathValidation(
                PathValidationStatus::AlgorithmConstrained,
            ));
        }
        if let Some(prev) = &ctx.prev_pub_key {
            if !self.constraints.permits(&ConstraintsParameters {
                algorithm: sig_alg,
                public_key: Some(prev),
                variant: &self.variant,
            }) {
                error!(
                    "Key used to sign certificate issued to {} is disabled",
                    name_to_string(cert.subject())
                );
                return Err(Error::PathValidation(
                    PathValidationStatus::AlgorithmConstrained,
                ));
            }
        }

        // standalone checks have no previous key, so parameter inheritance waits for the
        // completed path
        let mut cur_key = cert.public_key().clone();
        if is_dsa_key_missing_parameters(&cur_key) && ctx.prev_pub_key.is_some() {
            cur_key = inherit_dsa_parameters(&cur_key, ctx.prev_pub_key.as_ref())?;
        }
        if !self
            .constraints
            .permits_key(primitives, &cur_key, &self.variant)
        {
            error!(
                "Public key in certificate issued to {} is disabled",
                name_to_string(cert.subject())
            );
            return Err(Error::PathValidation(
                PathValidationStatus::AlgorithmConstrained,
            ));
        }

        Ok(AlgorithmCheckContext {
            prev_pub_key: Some(cur_key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::path_settings::VARIANT_GENERIC;
    use crate::validator::pdv_certificate::parse_cert;

    fn load(name: &str) -> PDVCertificate {
        let path = format!("{}/tests/examples/{}", env!("CARGO_MANIFEST_DIR"), name);
        let bytes = std::fs::read(path).unwrap();
        parse_cert(&bytes, name).unwrap()
    }

    fn dsa_spki() -> SubjectPublicKeyInfoOwned {
        let bytes = include_bytes!("../../tests/examples/dsa_spki.der");
        SubjectPublicKeyInfoOwned::from_der(bytes).unwrap()
    }

    #[test]
    fn parse_rules() {
        let c = DisabledAlgorithmConstraints::parse(DEFAULT_DISABLED_ALGORITHMS).unwrap();
        assert_eq!(5, c.len());
        let c = DisabledAlgorithmConstraints::parse("").unwrap();
        assert!(c.is_empty());
        let c = DisabledAlgorithmConstraints::parse("SHA1 usage TLSServer & keySize >= 0").unwrap();
        assert_eq!(1, c.len());
        assert_eq!(
            Err(Error::Misconfiguration),
            DisabledAlgorithmConstraints::parse("RSA keySize << 1024")
        );
        assert_eq!(
            Err(Error::Misconfiguration),
            DisabledAlgorithmConstraints::parse("RSA denyAfter 2019-01-01")
        );
    }

    #[test]
    fn constraints_from_settings() {
        let ee = load("ee.der");
        let mut ps = PathSettings::default();
        let c = algorithm_constraints_from_settings(&ps).unwrap();
        assert!(c.permits_key(signature_primitive_set(), ee.public_key(), VARIANT_GENERIC));

        ps.set_disabled_algorithms("EC keySize < 384".to_string());
        let c = algorithm_constraints_from_settings(&ps).unwrap();
        assert!(!c.permits_key(signature_primitive_set(), ee.public_key(), VARIANT_GENERIC));

        ps.set_disabled_algorithms("EC keySize <".to_string());
        assert!(algorithm_constraints_from_settings(&ps).is_err());
    }

    #[test]
    fn key_sizes() {
        assert_eq!(Some(256), key_size(load("ee.der").public_key()));
        assert_eq!(Some(2048), key_size(load("rsaee.der").public_key()));
        assert_eq!(Some(1024), key_size(&dsa_spki()));
        assert_eq!(0, bit_length(&[0, 0]));
        assert_eq!(9, bit_length(&[0, 1, 0xFF]));
    }

    #[test]
    fn disabled_signature_algorithm() {
        let ee = load("ee.der");
        let c: Arc<dyn AlgorithmConstraints> =
            Arc::new(DisabledAlgorithmConstraints::parse("SHA256withECDSA").unwrap());
        let checker = AlgorithmChecker::new(c, None, VARIANT_GENERIC);
        let ctx = checker.init(false).unwrap();
        assert_eq!(
            Err(Error::PathValidation(
                PathValidationStatus::AlgorithmConstrained
            )),
            checker.check(&ctx, &ee)
        );

        // hash component and hyphenated spelling match as well
        let c = DisabledAlgorithmConstraints::parse("sha-256").unwrap();
        assert!(!c.permits_algorithm(
            signature_primitive_set(),
            ee.signature_algorithm(),
            VARIANT_GENERIC
        ));

        // usage restricted rules only apply to the named variant
        let c = DisabledAlgorithmConstraints::parse("ECDSA usage TLSServer").unwrap();
        assert!(c.permits_algorithm(
            signature_primitive_set(),
            ee.signature_algorithm(),
            VARIANT_GENERIC
        ));
        assert!(!c.permits_algorithm(
            signature_primitive_set(),
            ee.signature_algorithm(),
            "tls server"
        ));
    }

    #[test]
    fn disabled_key_size() {
        let rsaee = load("rsaee.der");
        let rsaroot = load("rsaroot.der");
        let c: Arc<dyn AlgorithmConstraints> =
            Arc::new(DisabledAlgorithmConstraints::parse("RSA keySize < 4096").unwrap());
        let ta = TrustAnchor::from(rsaroot);
        let checker = AlgorithmChecker::new(c, Some(&ta), VARIANT_GENERIC);
        let ctx = checker.init(false).unwrap();
        assert_eq!(
            Err(Error::PathValidation(
                PathValidationStatus::AlgorithmConstrained
            )),
            checker.check(&ctx, &rsaee)
        );

        let checker = AlgorithmChecker::new(
            default_algorithm_constraints(),
            Some(&ta),
            VARIANT_GENERIC,
        );
        let ctx = checker.init(false).unwrap();
        let next = checker.check(&ctx, &rsaee).unwrap();
        assert_eq!(Some(rsaee.public_key().clone()), next.prev_pub_key);
    }

    #[test]
    fn forward_init_unsupported() {
        let checker =
            AlgorithmChecker::new(default_algorithm_constraints(), None, VARIANT_GENERIC);
        assert_eq!(Err(Error::Unsupported), checker.init(true));
        assert!(checker.init(false).unwrap().prev_pub_key.is_none());
    }

    #[test]
    fn key_usage_primitives() {
        assert_eq!(
            Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage)),
            primitives_from_key_usage(&[true; 8])
        );
        assert_eq!(
            Err(Error::PathValidation(PathValidationStatus::InvalidKeyUsage)),
            primitives_from_key_usage(&[false; 9])
        );
        // encipherOnly alone maps to no primitive
        let mut ku = [false; 9];
        ku[7] = true;
        assert!(primitives_from_key_usage(&ku).is_err());

        let mut ku = [false; 9];
        ku[5] = true;
        let p = primitives_from_key_usage(&ku).unwrap();
        assert!(p.contains(CryptoPrimitive::Signature));
        assert!(!p.contains(CryptoPrimitive::KeyAgreement));

        let mut ku = [false; 9];
        ku[2] = true;
        ku[4] = true;
        let p = primitives_from_key_usage(&ku).unwrap();
        assert!(p.contains(CryptoPrimitive::KeyEncapsulation));
        assert!(p.contains(CryptoPrimitive::KeyAgreement));
        assert!(!p.contains(CryptoPrimitive::Signature));
    }

    #[test]
    fn dsa_parameter_inheritance() {
        let with_params = dsa_spki();
        let mut without_params = with_params.clone();
        without_params.algorithm.parameters = None;
        assert!(is_dsa_key_missing_parameters(&without_params));
        assert!(!is_dsa_key_missing_parameters(&with_params));

        let inherited = inherit_dsa_parameters(&without_params, Some(&with_params)).unwrap();
        assert_eq!(with_params.algorithm, inherited.algorithm);

        assert!(inherit_dsa_parameters(&without_params, Some(&without_params)).is_err());
        assert!(inherit_dsa_parameters(&without_params, None).is_err());
        let ec = load("root.der").public_key().clone();
        assert!(inherit_dsa_parameters(&without_params, Some(&ec)).is_err());

        // certificate carrying a parameterless DSA key, checked after a parameterized DSA key
        let mut ee = load("ee.der").decoded_cert;
        ee.tbs_certificate.subject_public_key_info = without_params;
        let ee = PDVCertificate::try_from(ee).unwrap();
        let checker =
            AlgorithmChecker::new(default_algorithm_constraints(), None, VARIANT_GENERIC);
        let ctx = AlgorithmCheckContext::with_previous_key(with_params.clone());
        let next = checker.check(&ctx, &ee).unwrap();
        assert_eq!(
            with_params.algorithm.parameters,
            next.prev_pub_key.unwrap().algorithm.parameters
        );

        let ctx = AlgorithmCheckContext::with_previous_key(ec);
        assert_eq!(
            Err(Error::PathValidation(
                PathValidationStatus::AlgorithmConstrained
            )),
            checker.check(&ctx, &ee)
        );

        assert!(checker.check(&AlgorithmCheckContext::standalone(), &ee).is_ok());
    }
}
