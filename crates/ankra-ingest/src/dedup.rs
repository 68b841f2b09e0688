use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::warn;

use ankra_core::ContentHash;

/// In-memory, process-local dedup state.
///
/// The primary set holds processed content hashes and is cleared outright
/// when it reaches capacity — safe only because downstream handlers are
/// idempotent. The secondary map keys on the physical chain action
/// `(block_num, trx_id, action_ordinal)` and absorbs the overlap window
/// during a source switchover; sources clear it between blocks.
pub struct DedupState {
    processed: Mutex<HashSet<ContentHash>>,
    max_processed: usize,
    clears: AtomicU64,
    actions_seen: Mutex<BlockWindow>,
}

/// Secondary dedup window: the actions of the block currently in flight.
#[derive(Default)]
struct BlockWindow {
    block_num: Option<u64>,
    actions: HashMap<(u64, String, u32), ContentHash>,
}

impl DedupState {
    pub fn new(max_processed: usize) -> Self {
        Self {
            processed: Mutex::new(HashSet::new()),
            max_processed,
            clears: AtomicU64::new(0),
            actions_seen: Mutex::new(BlockWindow::default()),
        }
    }

    pub fn is_processed(&self, hash: &ContentHash) -> bool {
        self.processed.lock().expect("dedup lock").contains(hash)
    }

    pub fn mark_processed(&self, hash: &ContentHash) {
        let mut processed = self.processed.lock().expect("dedup lock");
        if processed.len() >= self.max_processed {
            let cleared = processed.len();
            processed.clear();
            self.clears.fetch_add(1, Ordering::Relaxed);
            warn!(cleared, cap = self.max_processed,
                  "processed-hash set reached capacity and was cleared");
        }
        processed.insert(hash.clone());
    }

    /// Record a physical chain action. Returns true when it was already
    /// seen, i.e. this observation is a duplicate.
    ///
    /// The window self-bounds to one block: observing a different block
    /// rolls it over, so a source that never calls
    /// [`clear_block_window`](Self::clear_block_window) (the push webhook)
    /// cannot grow it without limit.
    pub fn action_seen(
        &self,
        block_num: u64,
        trx_id: &str,
        action_ordinal: u32,
        hash: &ContentHash,
    ) -> bool {
        let mut window = self.actions_seen.lock().expect("dedup lock");
        if window.block_num != Some(block_num) {
            window.block_num = Some(block_num);
            window.actions.clear();
        }
        window
            .actions
            .insert((block_num, trx_id.to_string(), action_ordinal), hash.clone())
            .is_some()
    }

    /// Called by sources between blocks; the secondary window only needs to
    /// cover the handover overlap.
    pub fn clear_block_window(&self) {
        let mut window = self.actions_seen.lock().expect("dedup lock");
        window.block_num = None;
        window.actions.clear();
    }

    pub fn processed_len(&self) -> usize {
        self.processed.lock().expect("dedup lock").len()
    }

    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }
}
