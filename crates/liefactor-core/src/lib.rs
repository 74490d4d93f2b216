//! Core math for manifold-aware least squares.
//!
//! This crate contains:
//! - scalar and linear algebra aliases (`Real`, `Vec3`, `DMat`, ...),
//! - the Lie groups SO(2), SO(3), SE(2), SE(3) behind the [`LieGroup`] trait,
//! - local parameterizations that apply tangent updates to flat parameter blocks.

pub mod error;
pub mod groups;
/// Linear algebra type aliases and helpers.
pub mod math;
pub mod parameterization;
pub mod test_utils;

pub use error::ManifoldError;
pub use groups::{LieGroup, Se2, Se3, So2, So3};
pub use math::*;
pub use parameterization::{
    EuclideanParameterization, LieGroupParameterization, LocalParameterization, ManifoldKind,
    Se2Parameterization, Se3Parameterization, So2Parameterization, So3Parameterization,
};
