//! Testing utilities and mock implementations
//!
//! Mock collaborators for every trait seam, so pipelines can be exercised
//! without a model provider, retriever, or policy backend.

pub mod mocks;

pub use mocks::*;
