//! Models listing handler
//!
//! Serves the static model catalog in an openai-compatible list shape.

use axum::Json;
use serde::Serialize;

use crate::providers::catalog::{ModelInfo, MODEL_CATALOG};

#[derive(Debug, Serialize)]
pub struct ModelsListResponse {
    pub object: &'static str,
    pub data: &'static [ModelInfo],
}

/// List available models.
///
/// GET /api/v1/models
pub async fn list_models() -> Json<ModelsListResponse> {
    Json(ModelsListResponse {
        object: "list",
        data: MODEL_CATALOG,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_models_shape() {
        let response = list_models().await;
        assert_eq!(response.0.object, "list");
        assert!(!response.0.data.is_empty());

        let json = serde_json::to_value(&response.0).unwrap();
        assert_eq!(json["object"], "list");
        assert!(json["data"].as_array().unwrap().len() >= 10);
    }
}
