use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ankra_core::{ACCOUNT_CACHE_TTL_SECS, MAX_AUTH_DEPTH};

use crate::rpc::{AccountInfo, AccountLookup};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("chain rpc: {0}")]
    Rpc(String),

    #[error("no chain RPC configured")]
    NoRpc,
}

/// Result of an authorization proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthzOutcome {
    /// The key is reachable from `account@permission` on chain.
    Authorized,
    /// Permissive-mode acceptance while the chain view is unavailable.
    AssumedAuthorized { reason: String },
    Denied { reason: String },
}

impl AuthzOutcome {
    pub fn authorized(&self) -> bool {
        !matches!(self, AuthzOutcome::Denied { .. })
    }
}

#[derive(Clone, Debug)]
pub struct AuthorizerConfig {
    /// Strict mode denies whenever the chain cannot prove authorization.
    /// The default; permissive mode is an explicit dev-only opt-out.
    pub strict: bool,
    pub cache_ttl_secs: u64,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self { strict: true, cache_ttl_secs: ACCOUNT_CACHE_TTL_SECS }
    }
}

struct CachedAccount {
    info: AccountInfo,
    expires_at: i64,
}

/// Proves that a public key is authorized by an on-chain account under a
/// named permission.
///
/// Direct key entries are checked first; delegated account entries are then
/// resolved with an explicit work stack. Termination does not rely on the
/// permission graph being a DAG: a visited set of `account@permission`
/// tuples breaks cycles and a hard depth cap bounds delegation chains.
pub struct AuthorizationVerifier {
    lookup: Option<Arc<dyn AccountLookup>>,
    cache: Mutex<HashMap<String, CachedAccount>>,
    config: AuthorizerConfig,
}

impl AuthorizationVerifier {
    pub fn new(lookup: Option<Arc<dyn AccountLookup>>, config: AuthorizerConfig) -> Self {
        Self { lookup, cache: Mutex::new(HashMap::new()), config }
    }

    pub async fn verify(&self, account: &str, permission: &str, pubkey: &str) -> AuthzOutcome {
        if self.lookup.is_none() {
            return self.unprovable(account, permission, "no chain RPC configured");
        }

        let mut stack: Vec<(String, String, usize)> =
            vec![(account.to_string(), permission.to_string(), 0)];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some((acct, perm, depth)) = stack.pop() {
            if !visited.insert(format!("{acct}@{perm}")) {
                debug!(account = %acct, permission = %perm, "authority cycle, skipping");
                continue;
            }

            let info = match self.account(&acct).await {
                Ok(info) => info,
                Err(e) => {
                    if !self.config.strict || depth == 0 {
                        return self.unprovable(account, permission, &e.to_string());
                    }
                    // Only this delegation branch is unprovable; a sibling
                    // delegate may still hold the key.
                    warn!(account = %acct, permission = %perm, error = %e,
                          "delegate lookup failed, skipping branch");
                    continue;
                }
            };

            let Some(entry) = info.permission(&perm) else {
                if depth == 0 {
                    return self.unprovable(
                        account,
                        permission,
                        &format!("permission {perm} not found on {acct}"),
                    );
                }
                // Dangling delegated reference; it grants nothing.
                debug!(account = %acct, permission = %perm, "delegated permission missing");
                continue;
            };

            if entry.required_auth.keys.iter().any(|k| k.key == pubkey) {
                debug!(account = %acct, permission = %perm, depth, "key authorized");
                return AuthzOutcome::Authorized;
            }

            // Waits are time-delayed authorities; they bind no signing key.
            if depth < MAX_AUTH_DEPTH {
                for delegated in &entry.required_auth.accounts {
                    stack.push((
                        delegated.permission.actor.clone(),
                        delegated.permission.permission.clone(),
                        depth + 1,
                    ));
                }
            } else {
                warn!(account = %acct, permission = %perm, depth,
                      "authority delegation depth cap reached");
            }
        }

        AuthzOutcome::Denied {
            reason: format!("key not authorized for {account}@{permission}"),
        }
    }

    /// Strict mode turns every unprovable condition into a deny; permissive
    /// mode lets it pass with a warning.
    fn unprovable(&self, account: &str, permission: &str, reason: &str) -> AuthzOutcome {
        if self.config.strict {
            AuthzOutcome::Denied { reason: reason.to_string() }
        } else {
            warn!(account, permission, reason, "authorization unavailable, allowing (permissive mode)");
            AuthzOutcome::AssumedAuthorized { reason: reason.to_string() }
        }
    }

    async fn account(&self, name: &str) -> Result<AccountInfo, AuthError> {
        let now = chrono::Utc::now().timestamp();
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(name) {
                if cached.expires_at > now {
                    return Ok(cached.info.clone());
                }
            }
        }

        let lookup = self.lookup.as_ref().ok_or(AuthError::NoRpc)?;
        let info = lookup.get_account(name).await?;

        let mut cache = self.cache.lock().await;
        cache.insert(
            name.to_string(),
            CachedAccount {
                info: info.clone(),
                expires_at: now + self.config.cache_ttl_secs as i64,
            },
        );
        Ok(info)
    }
}
