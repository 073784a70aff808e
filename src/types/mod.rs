//! Value types for device control parameters.

mod dim;

pub use dim::Dim;
