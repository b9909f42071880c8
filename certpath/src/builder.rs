//! Certification path building: a depth-first search from the target certificate toward a trust
//! anchor, with candidate ordering, per-candidate checks and validation of completed paths

pub mod budget;
pub mod builder_params;
pub mod comparator;
pub mod forward_builder;
pub mod forward_state;
pub mod path_builder;

pub use crate::builder::{
    budget::*, builder_params::*, comparator::*, forward_builder::*, forward_state::*,
    path_builder::*,
};
