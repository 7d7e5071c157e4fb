//! Application layer: repository contracts, listing queries and services.

pub mod books;
pub mod error;
pub mod query;
pub mod repos;
pub mod reviews;
