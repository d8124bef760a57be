use serde::{Deserialize, Serialize};

pub use crate::acquire::AnalysisRequest;
pub use crate::analysis::AnalysisResponse;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub detail: String,
}
