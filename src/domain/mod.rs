//! Domain layer types and invariants.

pub mod entities;
pub mod rating;
pub mod validation;
