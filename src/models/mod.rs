// JSON-RPC 2.0 envelopes exchanged with clients and upstream providers

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id: Value::from(id),
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }
}

fn default_version() -> String {
    "2.0".to_string()
}

fn empty_params() -> Value {
    Value::Array(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_params_and_id_get_defaults() {
        let request: JsonRpcRequest = serde_json::from_value(json!({"method": "getSlot"})).unwrap();
        assert_eq!(request.jsonrpc, "2.0");
        assert_eq!(request.id, Value::Null);
        assert_eq!(request.params, json!([]));
    }

    #[test]
    fn success_response_omits_error() {
        let body = serde_json::to_value(JsonRpcResponse::success(json!(7), json!(123))).unwrap();
        assert_eq!(body, json!({"jsonrpc": "2.0", "id": 7, "result": 123}));
    }
}
