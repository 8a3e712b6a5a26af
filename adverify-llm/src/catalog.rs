//! Picking a generation model from the provider's catalog.
//!
//! Preference order: the first model whose name mentions `flash` (fast
//! tier), then the first mentioning `pro` (general tier), then whatever
//! generation-capable model comes first. Catalog order is preserved.

use crate::traits::{ModelCatalog, ModelInfo};
use adverify_common::{AdverifyError, Result};

const TIER_PREFERENCE: &[&str] = &["flash", "pro"];

/// Choose a model id from `models`, or explain why none qualifies.
pub fn select_model(models: &[ModelInfo]) -> Result<String> {
    let eligible: Vec<&ModelInfo> = models.iter().filter(|m| m.supports_generation()).collect();

    if eligible.is_empty() {
        let seen = if models.is_empty() {
            "catalog returned no models".to_string()
        } else {
            format!(
                "none of [{}] support generateContent",
                models
                    .iter()
                    .map(|m| m.id())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        return Err(AdverifyError::ModelUnavailable(seen));
    }

    let chosen = TIER_PREFERENCE
        .iter()
        .find_map(|tier| {
            eligible
                .iter()
                .find(|m| m.name.to_lowercase().contains(*tier))
        })
        .unwrap_or(&eligible[0]);

    Ok(chosen.id().to_string())
}

/// List the catalog and apply [`select_model`].
pub async fn resolve_model(catalog: &dyn ModelCatalog) -> Result<String> {
    let models = catalog.list_models().await?;
    tracing::debug!(count = models.len(), "llm.catalog.listed");
    let model = select_model(&models)?;
    tracing::info!(%model, "llm.catalog.selected");
    Ok(model)
}
