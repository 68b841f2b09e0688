pub mod rpc;
pub mod verifier;

pub use rpc::{AccountInfo, AccountLookup, ChainRpcClient, Permission};
pub use verifier::{AuthError, AuthzOutcome, AuthorizationVerifier, AuthorizerConfig};
