//! Domain modules organized as vertical slices.
//!
//! Each sub-module contains:
//! - `mod.rs`: Rich domain types (ordered, deduplicated, display-ready)
//! - `wire.rs`: Raw serde structs matching upstream responses
//! - `convert.rs`: `TryFrom`/`From` conversions with validation
//! - `client.rs`: Fetcher with HTTP methods (and caching where it applies)

pub mod macro_series;
pub mod price;
