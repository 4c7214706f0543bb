use std::io::{self, Write};

use crate::error::SyncError;
use crate::protocol::{JsonRpcError, JsonRpcNotification, JsonRpcResponse, INTERNAL_ERROR};

/// NDJSON transport over stdout for JSON-RPC 2.0 communication.
///
/// Writes one JSON object per line to stdout; logging stays on stderr so
/// the protocol stream is never interleaved with diagnostics. Cloneable so
/// concurrently dispatched handlers can respond independently.
#[derive(Clone, Default)]
pub struct NdjsonTransport;

impl NdjsonTransport {
    /// Create a new transport.
    pub fn new() -> Self {
        Self
    }

    /// Write a successful JSON-RPC response.
    pub fn write_response(&self, id: u64, result: serde_json::Value) {
        let msg = JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        };
        self.write_line(&msg);
    }

    /// Write a JSON-RPC error response.
    pub fn write_error(&self, id: u64, code: i32, message: impl Into<String>) {
        let msg = JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        };
        self.write_line(&msg);
    }

    /// Write a sync-layer error, carrying its machine-readable code in the
    /// error data.
    pub fn write_sync_error(&self, id: u64, error: &SyncError) {
        let msg = JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code: INTERNAL_ERROR,
                message: error.to_string(),
                data: Some(serde_json::json!({ "code": error.code() })),
            }),
        };
        self.write_line(&msg);
    }

    /// Write a JSON-RPC notification (no id — fire and forget).
    pub fn write_notification(&self, method: &str, params: serde_json::Value) {
        let msg = JsonRpcNotification {
            jsonrpc: "2.0",
            method: method.to_string(),
            params: Some(params),
        };
        self.write_line(&msg);
    }

    fn write_line(&self, value: &impl serde::Serialize) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = serde_json::to_writer(&mut stdout, value) {
            tracing::error!("Failed to serialize response: {}", e);
            return;
        }
        if let Err(e) = writeln!(stdout) {
            tracing::error!("Failed to write newline: {}", e);
        }
        if let Err(e) = stdout.flush() {
            tracing::error!("Failed to flush stdout: {}", e);
        }
    }
}
