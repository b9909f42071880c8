//! Certificate wrappers, path settings and the checks applied to candidate certificates and
//! completed certification paths

pub mod algorithm_checker;
pub mod cert_path;
pub mod path_settings;
pub mod path_validator;
pub mod pdv_certificate;
pub mod pdv_extension;
pub mod pdv_trust_anchor;
pub mod policy_checker;

pub use crate::{
    validator::algorithm_checker::*, validator::cert_path::*, validator::path_settings::*,
    validator::path_validator::*, validator::pdv_certificate::*, validator::pdv_extension::*,
    validator::pdv_trust_anchor::*, validator::policy_checker::*,
};
