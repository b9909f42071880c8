//! Revocation status determination using OCSP
//!
//! The revocation module provides an OCSP client that prepares requests, sends them via an
//! [`OcspTransport`](crate::OcspTransport) and verifies responses. Revocation support is available
//! when the `revocation` feature is enabled. The `remote` feature adds a reqwest-backed transport.
//!
//! Status is typically determined after a path has been built, using the certificate that issued
//! the target:
//!
//! ```no_run
//! # #[cfg(feature = "remote")]
//! # fn example() -> certpath::Result<()> {
//! use certpath::*;
//!
//! let mut pe = PkiEnvironment::default();
//! populate_5280_pki_environment(&mut pe);
//! let ps = PathSettings::default();
//!
//! let target = parse_cert(&std::fs::read("ee.der")?, "ee.der")?;
//! let issuer = parse_cert(&std::fs::read("ca.der")?, "ca.der")?;
//!
//! let transport = HttpOcspTransport::new()?;
//! let status = check_revocation_ocsp(&pe, &ps, &transport, &target, (&issuer).into());
//! println!("{}", status);
//! # Ok(())
//! # }
//! ```
//!
//! OCSP processing is influenced by values included in the [`PathSettings`](crate::PathSettings)
//! object, including:
//!
//! - [`PS_TIME_OF_INTEREST`](crate::PS_TIME_OF_INTEREST)
//! - [`PS_OCSP_USE_GET`](crate::PS_OCSP_USE_GET)
//! - [`PS_OCSP_AIA_NONCE_SETTING`](crate::PS_OCSP_AIA_NONCE_SETTING)
//! - [`PS_VALIDATION_VARIANT`](crate::PS_VALIDATION_VARIANT)

pub mod cert_id;
pub mod ocsp_client;

pub use crate::revocation::cert_id::*;
pub use crate::revocation::ocsp_client::*;
