//! JSON-RPC 2.0 message shapes for the stdio transport.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatcher::{ContentBlock, ToolReply, ToolRequest};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "vidrelay";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// A request or notification read from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Incoming {
    /// Parse one line. `Err` carries the JSON-RPC code to answer with.
    pub fn parse(line: &str) -> Result<Self, (i64, String)> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| (PARSE_ERROR, format!("Parse error: {e}")))?;
        serde_json::from_value(value)
            .map_err(|e| (INVALID_REQUEST, format!("Invalid request: {e}")))
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RequestMeta {
    #[serde(rename = "progressToken")]
    progress_token: Option<Value>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Default, Deserialize)]
pub struct CallParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Value,
    #[serde(default, rename = "_meta")]
    meta: Option<RequestMeta>,
}

impl CallParams {
    pub fn from_params(params: &Value) -> Self {
        serde_json::from_value(params.clone()).unwrap_or_default()
    }

    pub fn progress_token(&self) -> Option<Value> {
        self.meta.as_ref().and_then(|m| m.progress_token.clone())
    }

    /// The tool request, or `None` when no tool name was given.
    pub fn into_request(self) -> Option<ToolRequest> {
        let name = self.name.filter(|n| !n.is_empty())?;
        Some(ToolRequest::new(name, self.arguments))
    }
}

/// Parameters of `notifications/cancelled`.
#[derive(Debug, Deserialize)]
pub struct CancelledParams {
    #[serde(rename = "requestId")]
    pub request_id: Value,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Key identifying an in-flight request by its JSON-RPC id.
pub fn request_key(id: &Value) -> String {
    id.to_string()
}

pub fn response(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    })
}

pub fn error_response(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message },
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {}, "logging": {} },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// `tools/call` result for a completed dispatch.
pub fn call_result(outcome: &vr_core::Result<ToolReply>) -> Value {
    match outcome {
        Ok(reply) => json!({ "content": reply.content, "isError": false }),
        Err(e) => {
            let content = vec![ContentBlock::Text { text: e.to_string() }];
            json!({
                "content": content,
                "isError": true,
                "_meta": { "errorKind": e.kind(), "errorCode": e.rpc_code() },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vr_core::Error;

    #[test]
    fn parse_distinguishes_bad_json_from_bad_shape() {
        assert_eq!(Incoming::parse("{not json").unwrap_err().0, PARSE_ERROR);
        assert_eq!(Incoming::parse(r#"{"id": 1}"#).unwrap_err().0, INVALID_REQUEST);

        let msg = Incoming::parse(r#"{"jsonrpc":"2.0","method":"ping","id":7}"#).unwrap();
        assert_eq!(msg.method, "ping");
        assert_eq!(msg.id, Some(json!(7)));
        assert!(!msg.is_notification());
    }

    #[test]
    fn call_params_extract_progress_token() {
        let params = json!({
            "name": "trim",
            "arguments": {"timestamp_start": "00:01", "timestamp_end": "00:02"},
            "_meta": {"progressToken": "tok-1"}
        });
        let call = CallParams::from_params(&params);
        assert_eq!(call.progress_token(), Some(json!("tok-1")));
        let request = call.into_request().unwrap();
        assert_eq!(request.name, "trim");
        assert_eq!(request.arguments["timestamp_start"], "00:01");
    }

    #[test]
    fn call_params_without_name() {
        assert!(CallParams::from_params(&json!({"arguments": {}})).into_request().is_none());
        assert!(CallParams::from_params(&json!({"name": ""})).into_request().is_none());
        assert!(CallParams::from_params(&Value::Null).into_request().is_none());
    }

    #[test]
    fn failed_call_is_flagged() {
        let outcome: vr_core::Result<ToolReply> = Err(Error::invalid("No video imported"));
        let result = call_result(&outcome);
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["_meta"]["errorKind"], "invalid_input");
        assert_eq!(result["_meta"]["errorCode"], -32602);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("No video imported"));
    }

    #[test]
    fn request_keys_distinguish_number_and_string_ids() {
        assert_ne!(request_key(&json!(1)), request_key(&json!("1")));
    }
}
