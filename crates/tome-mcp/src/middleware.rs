//! Tool-call middleware
//!
//! Every tool goes through [`run_tool`], which owns the cross-cutting parts of
//! a call: a tracing span, timing, outcome logging, and a per-call read
//! counter. Handlers only supply the file operation itself.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use rmcp::{ErrorData as McpError, model::*};
use serde::Serialize;
use tome::{AccessError, ErrorEnvelope, FileAccess, ReadCounter};
use tracing::Instrument;

/// Run a blocking file operation as one tool call.
///
/// The operation runs on tokio's blocking pool against a copy of `access`
/// that counts bytes read for this call alone. A successful result becomes
/// the JSON envelope as text; an [`AccessError`] becomes a tool error result
/// carrying the error envelope, so the caller sees the typed failure rather
/// than a protocol error.
pub async fn run_tool<P, T, F>(
    access: &FileAccess,
    tool: &'static str,
    params: P,
    op: F,
) -> Result<CallToolResult, McpError>
where
    P: Debug + Send + 'static,
    T: Serialize + Send + 'static,
    F: FnOnce(&FileAccess, P) -> Result<T, AccessError> + Send + 'static,
{
    let span = tracing::info_span!("tool", name = tool);
    async move {
        tracing::debug!(?params, "tool called");
        let counter = Arc::new(ReadCounter::new());
        let scoped = access.clone().with_observer(counter.clone());
        let started = Instant::now();

        let outcome = tokio::task::spawn_blocking(move || op(&scoped, params))
            .await
            .map_err(|e| McpError::internal_error(format!("Tool task failed: {}", e), None))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let bytes_read = counter.bytes_read();

        match outcome {
            Ok(value) => {
                tracing::info!(elapsed_ms, bytes_read, outcome = "ok", "tool finished");
                let json = serde_json::to_string(&value).map_err(|e| {
                    McpError::internal_error(format!("Failed to encode result: {}", e), None)
                })?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(err) => {
                let kind = err.kind();
                tracing::info!(elapsed_ms, bytes_read, outcome = ?kind, error = %err, "tool failed");
                let json = serde_json::to_string(&ErrorEnvelope::from(&err)).map_err(|e| {
                    McpError::internal_error(format!("Failed to encode error: {}", e), None)
                })?;
                Ok(CallToolResult::error(vec![Content::text(json)]))
            }
        }
    }
    .instrument(span)
    .await
}
