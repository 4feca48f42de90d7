//! API clients for external services
//!
//! - Catalog: the sample media catalog (fetched once, read-only)

pub mod catalog;

pub use catalog::{Catalog, CatalogClient};
