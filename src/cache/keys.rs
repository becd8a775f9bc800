//! Cache key generation

use serde_json::Value;
use std::fmt;

/// A structured cache key that can be converted to a string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Result of one RPC method call against one provider
    RpcCall {
        provider: String,
        method: String,
        /// Compact JSON of the call parameters
        params: String,
    },
}

impl CacheKey {
    /// Create a new RPC call key
    pub fn rpc_call(provider: &str, method: &str, params: &Value) -> Self {
        Self::RpcCall {
            provider: provider.to_string(),
            method: method.to_string(),
            params: params.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RpcCall { provider, method, params } => {
                write!(f, "rpc:{}:{}:{}", provider, method, params)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rpc_call_key_includes_provider_method_and_params() {
        let key = CacheKey::rpc_call("syndica", "getBalance", &json!(["wallet", {"commitment": "confirmed"}]));
        assert_eq!(
            key.to_string(),
            r#"rpc:syndica:getBalance:["wallet",{"commitment":"confirmed"}]"#
        );
    }

    #[test]
    fn keys_differ_by_provider() {
        let params = json!([]);
        assert_ne!(
            CacheKey::rpc_call("syndica", "getSlot", &params).to_string(),
            CacheKey::rpc_call("helius", "getSlot", &params).to_string()
        );
    }
}
