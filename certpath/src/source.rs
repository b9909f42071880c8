//! Sources of trust anchors, certificates and CRLs, including URI-backed stores consulted when
//! following AIA caIssuers references

pub mod aia_filter;
pub mod cert_source;
pub mod file_utils;
pub mod remote;
pub mod selectors;
pub mod ta_source;
pub mod uri_store;

pub use crate::{
    source::aia_filter::*, source::cert_source::*, source::file_utils::*, source::remote::*,
    source::selectors::*, source::ta_source::*, source::uri_store::*,
};
