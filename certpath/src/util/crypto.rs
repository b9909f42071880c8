//! Signature verification and hashing callbacks backed by RustCrypto implementations

use der::{asn1::ObjectIdentifier, Encode};
use log::error;
use p256::ecdsa::{Signature as Signature256, VerifyingKey as VerifyingKey256};
use p384::ecdsa::{Signature as Signature384, VerifyingKey as VerifyingKey384};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use signature::Verifier;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::environment::pki_environment::PkiEnvironment;
use crate::util::error::{Error, PathValidationStatus, Result};
use crate::util::pdv_alg_oids::*;
use crate::util::pdv_utilities::get_hash_alg_from_sig_alg;

pub(crate) fn is_rsa(oid: &ObjectIdentifier) -> bool {
    *oid == PKIXALG_SHA1_WITH_RSA_ENCRYPTION
        || *oid == PKIXALG_SHA224_WITH_RSA_ENCRYPTION
        || *oid == PKIXALG_SHA256_WITH_RSA_ENCRYPTION
        || *oid == PKIXALG_SHA384_WITH_RSA_ENCRYPTION
        || *oid == PKIXALG_SHA512_WITH_RSA_ENCRYPTION
}

pub(crate) fn is_ecdsa(oid: &ObjectIdentifier) -> bool {
    *oid == PKIXALG_ECDSA_WITH_SHA256 || *oid == PKIXALG_ECDSA_WITH_SHA384
}

fn pkcs1v15_scheme(hash_alg: &ObjectIdentifier) -> Result<Pkcs1v15Sign> {
    match *hash_alg {
        PKIXALG_SHA1 => Ok(Pkcs1v15Sign::new::<Sha1>()),
        PKIXALG_SHA224 => Ok(Pkcs1v15Sign::new::<Sha224>()),
        PKIXALG_SHA256 => Ok(Pkcs1v15Sign::new::<Sha256>()),
        PKIXALG_SHA384 => Ok(Pkcs1v15Sign::new::<Sha384>()),
        PKIXALG_SHA512 => Ok(Pkcs1v15Sign::new::<Sha512>()),
        _ => Err(Error::Unrecognized),
    }
}

/// `get_named_curve_parameter` returns the named curve OID from the parameters of an
/// id-ecPublicKey algorithm identifier.
pub fn get_named_curve_parameter(alg_id: &AlgorithmIdentifierOwned) -> Result<ObjectIdentifier> {
    match &alg_id.parameters {
        Some(params) => Ok(params.decode_as::<ObjectIdentifier>()?),
        None => Err(Error::Unrecognized),
    }
}

/// `calculate_hash_rust_crypto` implements the [`CalculateHash`](../pki_environment_traits/type.CalculateHash.html)
/// interface for [`PkiEnvironment`] using SHA-1 and SHA-2 implementations from the RustCrypto
/// project.
pub fn calculate_hash_rust_crypto(
    _pe: &PkiEnvironment,
    hash_alg: &AlgorithmIdentifierOwned,
    buffer_to_hash: &[u8],
) -> Result<Vec<u8>> {
    match hash_alg.oid {
        PKIXALG_SHA1 => Ok(Sha1::digest(buffer_to_hash).to_vec()),
        PKIXALG_SHA224 => Ok(Sha224::digest(buffer_to_hash).to_vec()),
        PKIXALG_SHA256 => Ok(Sha256::digest(buffer_to_hash).to_vec()),
        PKIXALG_SHA384 => Ok(Sha384::digest(buffer_to_hash).to_vec()),
        PKIXALG_SHA512 => Ok(Sha512::digest(buffer_to_hash).to_vec()),
        _ => Err(Error::Unrecognized),
    }
}

/// `verify_signature_message_rust_crypto` implements the
/// [`VerifySignatureMessage`](../pki_environment_traits/type.VerifySignatureMessage.html) interface
/// for [`PkiEnvironment`]. RSA PKCS #1 v1.5 signatures with SHA-1 or SHA-2, ECDSA with P-256 and
/// SHA-256, and ECDSA with P-384 and SHA-384 are supported. Unsupported combinations yield
/// `Error::Unrecognized` so other callbacks may be tried.
pub fn verify_signature_message_rust_crypto(
    pe: &PkiEnvironment,
    message_to_verify: &[u8],
    signature: &[u8],
    signature_alg: &AlgorithmIdentifierOwned,
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<()> {
    if is_rsa(&signature_alg.oid) {
        if spki.algorithm.oid != PKIXALG_RSA_ENCRYPTION {
            return Err(Error::Unrecognized);
        }
        let enc_spki = spki.to_der()?;
        let rsa = match RsaPublicKey::from_public_key_der(&enc_spki) {
            Ok(rsa) => rsa,
            Err(e) => {
                error!("Failed to parse RSA public key: {}", e);
                return Err(Error::ParseError);
            }
        };
        let hash_alg = get_hash_alg_from_sig_alg(&signature_alg.oid)?;
        let hash_to_verify = pe.calculate_hash(pe, &hash_alg, message_to_verify)?;
        let scheme = pkcs1v15_scheme(&hash_alg.oid)?;
        return rsa
            .verify(scheme, hash_to_verify.as_slice(), signature)
            .map_err(|_| Error::PathValidation(PathValidationStatus::SignatureVerificationFailure));
    } else if is_ecdsa(&signature_alg.oid) {
        if spki.algorithm.oid != PKIXALG_EC_PUBLIC_KEY {
            return Err(Error::Unrecognized);
        }
        let named_curve = get_named_curve_parameter(&spki.algorithm)?;
        let failed = |_| Error::PathValidation(PathValidationStatus::SignatureVerificationFailure);
        return match (named_curve, signature_alg.oid) {
            (PKIXALG_SECP256R1, PKIXALG_ECDSA_WITH_SHA256) => {
                let key = VerifyingKey256::from_sec1_bytes(spki.subject_public_key.raw_bytes())
                    .map_err(|_| Error::ParseError)?;
                let s = Signature256::from_der(signature).map_err(failed)?;
                key.verify(message_to_verify, &s).map_err(failed)
            }
            (PKIXALG_SECP384R1, PKIXALG_ECDSA_WITH_SHA384) => {
                let key = VerifyingKey384::from_sec1_bytes(spki.subject_public_key.raw_bytes())
                    .map_err(|_| Error::ParseError)?;
                let s = Signature384::from_der(signature).map_err(failed)?;
                key.verify(message_to_verify, &s).map_err(failed)
            }
            _ => {
                error!(
                    "Unsupported named curve and signature algorithm combination: {} with {}",
                    named_curve, signature_alg.oid
                );
                Err(Error::Unrecognized)
            }
        };
    }
    error!("Unrecognized signature algorithm: {}", signature_alg.oid);
    Err(Error::Unrecognized)
}
