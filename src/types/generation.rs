//! Model configuration handed to the transport.

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Per-agent model settings sent along with every transport call.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Provider key resolved through the [`Registry`](crate::registry::Registry).
    #[builder(into)]
    pub provider: String,
    #[builder(into)]
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    /// Context window size in tokens, used for context warnings and compaction.
    pub context_window: Option<u64>,
    /// USD per million input tokens.
    pub input_price_per_m: Option<f64>,
    /// USD per million output tokens.
    pub output_price_per_m: Option<f64>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            context_window: None,
            input_price_per_m: None,
            output_price_per_m: None,
        }
    }
}
