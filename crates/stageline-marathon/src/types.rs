//! Wire types for the Marathon v2 API.
//!
//! Marathon responses carry far more than we read; unknown fields are
//! ignored on deserialization throughout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One service application as reported by `GET /v2/apps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceApp {
    pub id: String,
    #[serde(default)]
    pub instances: u32,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Envelope of `GET /v2/apps`.
#[derive(Debug, Deserialize)]
pub(crate) struct AppsPage {
    pub apps: Vec<ServiceApp>,
}
