//! Bookshelf: book reviews with composable popularity and rating listings.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod util;
