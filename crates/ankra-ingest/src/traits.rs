use async_trait::async_trait;

use ankra_auth::{AuthorizationVerifier, AuthzOutcome};
use ankra_core::{ContentHash, Event};
use ankra_store::{EventStore, Retrieved, RetrieveOptions, StoreError};

/// Retrieval seam between the processor and the tiered store.
#[async_trait]
pub trait EventRetriever: Send + Sync {
    async fn retrieve_event(
        &self,
        hash: &ContentHash,
        opts: RetrieveOptions,
    ) -> Result<Retrieved, StoreError>;

    async fn retrieve_by_cid(&self, cid: &str) -> Result<Event, StoreError>;
}

#[async_trait]
impl EventRetriever for EventStore {
    async fn retrieve_event(
        &self,
        hash: &ContentHash,
        opts: RetrieveOptions,
    ) -> Result<Retrieved, StoreError> {
        EventStore::retrieve_event(self, hash, opts).await
    }

    async fn retrieve_by_cid(&self, cid: &str) -> Result<Event, StoreError> {
        EventStore::retrieve_by_cid(self, cid).await
    }
}

/// Authorization seam between the processor and the chain.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn verify(&self, account: &str, permission: &str, pubkey: &str) -> AuthzOutcome;
}

#[async_trait]
impl Authorizer for AuthorizationVerifier {
    async fn verify(&self, account: &str, permission: &str, pubkey: &str) -> AuthzOutcome {
        AuthorizationVerifier::verify(self, account, permission, pubkey).await
    }
}
