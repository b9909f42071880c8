//! Provides definitions of algorithm OIDs from PKIXAlgs-2009, RFC 3279 and RFC 8410 used when
//! verifying signatures and evaluating algorithm constraints

use der::asn1::ObjectIdentifier;

// -------------------------------------------------------------------------------------------------
// Public key algorithms
// -------------------------------------------------------------------------------------------------

/// rsaEncryption OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) rsadsi(113549) pkcs(1)
///     pkcs-1(1) 1 }
pub const PKIXALG_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// id-ecPublicKey OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) ansi-X9-62(10045) keyType(2) 1 }
pub const PKIXALG_EC_PUBLIC_KEY: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// id-dsa OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) x9-57(10040) x9algorithm(4) 1 }
pub const PKIXALG_DSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10040.4.1");

/// id-Ed25519 OBJECT IDENTIFIER ::= { 1 3 101 112 }
pub const PKIXALG_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// id-Ed448 OBJECT IDENTIFIER ::= { 1 3 101 113 }
pub const PKIXALG_ED448: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.113");

// -------------------------------------------------------------------------------------------------
// Named curves
// -------------------------------------------------------------------------------------------------

///    secp224r1 OBJECT IDENTIFIER ::= {
///     iso(1) identified-organization(3) certicom(132) curve(0) 33 }
pub const PKIXALG_SECP224R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.33");

///    secp256r1 OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) ansi-X9-62(10045) curves(3)
///     prime(1) 7 }
pub const PKIXALG_SECP256R1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

///    secp384r1 OBJECT IDENTIFIER ::= {
///     iso(1) identified-organization(3) certicom(132) curve(0) 34 }
pub const PKIXALG_SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

///    secp521r1 OBJECT IDENTIFIER ::= {
///     iso(1) identified-organization(3) certicom(132) curve(0) 35 }
pub const PKIXALG_SECP521R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.35");

// -------------------------------------------------------------------------------------------------
// Signature algorithms
// -------------------------------------------------------------------------------------------------

/// md2WithRSAEncryption OBJECT IDENTIFIER ::= { pkcs-1 2 }
pub const PKIXALG_MD2_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.2");

/// md5WithRSAEncryption OBJECT IDENTIFIER ::= { pkcs-1 4 }
pub const PKIXALG_MD5_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.4");

/// sha1WithRSAEncryption OBJECT IDENTIFIER ::= { pkcs-1 5 }
pub const PKIXALG_SHA1_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");

/// sha224WithRSAEncryption OBJECT IDENTIFIER ::= { pkcs-1 14 }
pub const PKIXALG_SHA224_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.14");

/// sha256WithRSAEncryption OBJECT IDENTIFIER ::= { pkcs-1 11 }
pub const PKIXALG_SHA256_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// sha384WithRSAEncryption OBJECT IDENTIFIER ::= { pkcs-1 12 }
pub const PKIXALG_SHA384_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");

/// sha512WithRSAEncryption OBJECT IDENTIFIER ::= { pkcs-1 13 }
pub const PKIXALG_SHA512_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");

/// id-RSASSA-PSS OBJECT IDENTIFIER ::= { pkcs-1 10 }
pub const PKIXALG_RSASSA_PSS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");

/// ecdsa-with-SHA1 OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) ansi-X9-62(10045) signatures(4) 1 }
pub const PKIXALG_ECDSA_WITH_SHA1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");

/// ecdsa-with-SHA224 OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) ansi-X9-62(10045) signatures(4)
///     ecdsa-with-SHA2(3) 1 }
pub const PKIXALG_ECDSA_WITH_SHA224: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.1");

/// ecdsa-with-SHA256 OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) ansi-X9-62(10045) signatures(4)
///     ecdsa-with-SHA2(3) 2 }
pub const PKIXALG_ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// ecdsa-with-SHA384 OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) ansi-X9-62(10045) signatures(4)
///     ecdsa-with-SHA2(3) 3 }
pub const PKIXALG_ECDSA_WITH_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

/// ecdsa-with-SHA512 OBJECT IDENTIFIER ::= {
///     iso(1) member-body(2) us(840) ansi-X9-62(10045) signatures(4)
///     ecdsa-with-SHA2(3) 4 }
pub const PKIXALG_ECDSA_WITH_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");

/// id-dsa-with-sha1 OBJECT IDENTIFIER ::=  {
///     iso(1) member-body(2) us(840) x9-57(10040) x9algorithm(4) 3 }
pub const PKIXALG_DSA_WITH_SHA1: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10040.4.3");

/// id-dsa-with-sha256 OBJECT IDENTIFIER ::= {
///     joint-iso-ccitt(2) country(16) us(840) organization(1) gov(101)
///     csor(3) algorithms(4) id-dsa-with-sha2(3) 2 }
pub const PKIXALG_DSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.3.2");

// -------------------------------------------------------------------------------------------------
// Hash algorithms
// -------------------------------------------------------------------------------------------------

/// id-sha1 OBJECT IDENTIFIER ::= {
///     iso(1) identified-organization(3) oiw(14) secsig(3)
///     algorithms(2) 26 }
pub const PKIXALG_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

/// id-sha224 OBJECT IDENTIFIER ::= {
///     joint-iso-itu-t(2) country(16) us(840) organization(1) gov(101)
///     csor(3) nistalgorithm(4) hashalgs(2) 4 }
pub const PKIXALG_SHA224: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.4");

/// id-sha256 OBJECT IDENTIFIER ::= {
///     joint-iso-itu-t(2) country(16) us(840) organization(1) gov(101)
///     csor(3) nistalgorithm(4) hashalgs(2) 1 }
pub const PKIXALG_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// id-sha384 OBJECT IDENTIFIER ::= {
///     joint-iso-itu-t(2) country(16) us(840) organization(1) gov(101)
///     csor(3) nistalgorithm(4) hashalgs(2) 2 }
pub const PKIXALG_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");

/// id-sha512 OBJECT IDENTIFIER ::= {
///     joint-iso-itu-t(2) country(16) us(840) organization(1) gov(101)
///     csor(3) nistalgorithm(4) hashalgs(2) 3 }
pub const PKIXALG_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");
