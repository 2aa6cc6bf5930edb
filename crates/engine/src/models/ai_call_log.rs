//! Audit record for AI extraction calls.

use serde::Serialize;

/// Provider label written to every log row.
pub const AI_PROVIDER: &str = "openai";

/// One AI call, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAiCallLog {
    /// Component that made the call.
    pub script_name: String,
    /// Local order ID.
    pub order_id: i64,
    pub order_number: String,
    pub marketplace: Option<String>,
    pub ai_provider: String,
    pub model_used: String,
    /// Full prompt, system and user parts.
    pub prompt_sent: String,
    /// Raw model output, if any was received.
    pub raw_response: Option<String>,
    pub processing_time_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub tasks_generated: i32,
    pub needs_review_count: i32,
}
