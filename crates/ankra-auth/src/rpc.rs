use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::verifier::AuthError;

// ── Account permission model ─────────────────────────────────────────────────

/// One entry in a permission's key list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyWeight {
    pub key: String,
    pub weight: u32,
}

/// A delegated authority: some other account+permission may authorize on
/// this account's behalf.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: String,
    pub permission: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountWeight {
    pub permission: PermissionLevel,
    pub weight: u32,
}

/// Time-delayed authority; carries no signing key and is ignored by the
/// verifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitWeight {
    pub wait_sec: u32,
    pub weight: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequiredAuth {
    #[serde(default)]
    pub keys: Vec<KeyWeight>,
    #[serde(default)]
    pub accounts: Vec<AccountWeight>,
    #[serde(default)]
    pub waits: Vec<WaitWeight>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Permission {
    pub perm_name: String,
    #[serde(default)]
    pub parent: String,
    pub required_auth: RequiredAuth,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_name: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl AccountInfo {
    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.permissions.iter().find(|p| p.perm_name == name)
    }
}

// ── RPC client ───────────────────────────────────────────────────────────────

/// Seam for account lookups so the verifier is testable against a fixture
/// graph of accounts.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn get_account(&self, name: &str) -> Result<AccountInfo, AuthError>;
}

/// Chain RPC client for account-permission lookups.
pub struct ChainRpcClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl ChainRpcClient {
    pub fn new(rpc_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AccountLookup for ChainRpcClient {
    async fn get_account(&self, name: &str) -> Result<AccountInfo, AuthError> {
        let url = format!("{}/v1/chain/get_account", self.rpc_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "account_name": name }))
            .send()
            .await
            .map_err(|e| AuthError::Rpc(format!("get_account {name}: {e}")))?;
        if !resp.status().is_success() {
            return Err(AuthError::Rpc(format!(
                "get_account {name}: {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AuthError::Rpc(format!("get_account {name} decode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_response_parses() {
        let info: AccountInfo = serde_json::from_value(json!({
            "account_name": "alice",
            "permissions": [
                {
                    "perm_name": "active",
                    "parent": "owner",
                    "required_auth": {
                        "keys": [{ "key": "02aabb", "weight": 1 }],
                        "accounts": [
                            { "permission": { "actor": "ops", "permission": "active" }, "weight": 1 }
                        ],
                        "waits": [{ "wait_sec": 600, "weight": 1 }]
                    }
                }
            ]
        }))
        .unwrap();
        let active = info.permission("active").unwrap();
        assert_eq!(active.required_auth.keys[0].key, "02aabb");
        assert_eq!(active.required_auth.accounts[0].permission.actor, "ops");
        assert!(info.permission("owner").is_none());
    }
}
