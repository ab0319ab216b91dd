use serde::Deserialize;
use telemetry_core::NewTelemetryRecord;

use crate::error::{AppError, Result};

pub const MAX_AGENT_LEN: usize = 80;
pub const MAX_MODEL_LEN: usize = 120;
pub const MAX_TAG_LEN: usize = 200;
pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

/// The raw write payload. Numeric fields are `f64` so that NaN, infinite,
/// and fractional values reach the gate and are rejected with a message
/// instead of being coerced at the boundary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordInput {
    pub task_id: String,
    pub agent: String,
    pub model: String,
    pub input_tokens: f64,
    pub output_tokens: f64,
    pub estimated_cost_usd: f64,
    pub timestamp: Option<f64>,
    pub run_id: Option<String>,
    pub session_key: Option<String>,
}

/// Validates and normalizes one write payload. Checks run in a fixed order
/// so a given invalid input always produces the same message.
pub fn validate_record(input: &RecordInput, now_ms: i64) -> Result<NewTelemetryRecord> {
    let agent = required_text(&input.agent, "agent", MAX_AGENT_LEN)?;
    let model = required_text(&input.model, "model", MAX_MODEL_LEN)?;
    let input_tokens = non_negative_integer(input.input_tokens, "inputTokens")?;
    let output_tokens = non_negative_integer(input.output_tokens, "outputTokens")?;
    let estimated_cost_usd = non_negative_number(input.estimated_cost_usd, "estimatedCostUsd")?;
    let timestamp = match input.timestamp {
        Some(value) => non_negative_integer(value, "timestamp")? as i64,
        None => now_ms,
    };
    let run_id = optional_tag(input.run_id.as_deref(), "runId")?;
    let session_key = optional_tag(input.session_key.as_deref(), "sessionKey")?;
    Ok(NewTelemetryRecord {
        task_id: input.task_id.clone(),
        agent,
        model,
        input_tokens,
        output_tokens,
        estimated_cost_usd,
        timestamp,
        run_id,
        session_key,
    })
}

/// List limit: default 50, hard ceiling 200.
pub fn resolve_limit(limit: Option<f64>) -> Result<u32> {
    let Some(value) = limit else {
        return Ok(DEFAULT_LIST_LIMIT);
    };
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(AppError::InvalidInput("limit must be an integer".to_string()));
    }
    if value < 1.0 {
        return Err(AppError::InvalidInput("limit must be >= 1".to_string()));
    }
    Ok((value as u32).min(MAX_LIST_LIMIT))
}

/// Run ids on the read path get the write-side rules, except that an empty
/// id is an error here rather than "absent".
pub fn validate_run_id(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(
            "runId must be a non-empty string".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_TAG_LEN {
        return Err(AppError::InvalidInput(
            "runId must be <= 200 characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn required_text(value: &str, field: &str, max_len: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "{field} must be a non-empty string"
        )));
    }
    if trimmed.chars().count() > max_len {
        return Err(AppError::InvalidInput(format!(
            "{field} must be <= {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn non_negative_integer(value: f64, field: &str) -> Result<u64> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be a non-negative integer"
        )));
    }
    Ok(value as u64)
}

fn non_negative_number(value: f64, field: &str) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(value)
}

fn optional_tag(value: Option<&str>, field: &str) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.chars().count() > MAX_TAG_LEN {
        return Err(AppError::InvalidInput(format!(
            "{field} must be <= {MAX_TAG_LEN} characters"
        )));
    }
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}
