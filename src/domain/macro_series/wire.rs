//! Wire types for the macro series API.

use serde::{Deserialize, Serialize};

/// `GET /series/observations` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationsResponse {
    pub observations: Vec<Observation>,
}

/// A single observation. Both fields arrive as strings; missing values are `"."`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub date: String,
    pub value: String,
}
