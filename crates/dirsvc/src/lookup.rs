//! Lookup-node collaborator interface.
//!
//! Directory nodes never gossip with lookups directly; they go through this
//! narrow trait. The offline-lookups fetch is a two-step handshake: the node
//! issues [`Lookup::fetch_offline_lookups`] and then blocks in
//! [`Lookup::wait_offline_lookups`] until the answer arrives or the wait
//! times out; the timeout is returned as a value, never an error.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Gateway to the lookup-node gossip protocol.
pub trait Lookup: Send + Sync {
    /// Ask the lookup network for the current set of offline lookups.
    fn fetch_offline_lookups(&self);

    /// Block until the offline-lookups answer arrives, consuming it.
    /// Returns `false` on timeout.
    fn wait_offline_lookups(&self, timeout: Duration) -> bool;

    /// Ask the lookup network for the current DS committee.
    fn fetch_ds_info(&self);

    /// Pull DS blocks starting at `from_block`.
    fn fetch_latest_ds_blocks(&self, from_block: u64);

    /// Pull Tx blocks starting at `from_block`.
    fn fetch_latest_tx_blocks(&self, from_block: u64);

    /// Broadcast a raw message to every lookup node.
    fn send_message_to_lookup_nodes(&self, message: &[u8]);
}

/// A request recorded by [`QueueLookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    /// Offline-lookups fetch.
    OfflineLookups,
    /// DS-committee fetch.
    DsInfo,
    /// DS blocks from the given number.
    DsBlocks {
        /// First block number requested.
        from_block: u64,
    },
    /// Tx blocks from the given number.
    TxBlocks {
        /// First block number requested.
        from_block: u64,
    },
    /// Raw broadcast to the lookup nodes.
    Broadcast(Vec<u8>),
}

/// In-process [`Lookup`] implementation backed by a request queue.
///
/// The node's network layer drains [`QueueLookup::drain_requests`] and feeds
/// responses back via [`QueueLookup::note_offline_lookups_received`]; tests
/// use it to observe outbound traffic.
#[derive(Default)]
pub struct QueueLookup {
    requests: Mutex<VecDeque<LookupRequest>>,
    offline_fetched: Mutex<bool>,
    offline_cv: Condvar,
}

impl QueueLookup {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the offline-lookups answer arrived, waking any waiter.
    pub fn note_offline_lookups_received(&self) {
        let mut fetched = self.offline_fetched.lock();
        *fetched = true;
        self.offline_cv.notify_all();
    }

    /// Take every recorded request, oldest first.
    pub fn drain_requests(&self) -> Vec<LookupRequest> {
        self.requests.lock().drain(..).collect()
    }

    fn push(&self, request: LookupRequest) {
        self.requests.lock().push_back(request);
    }
}

impl Lookup for QueueLookup {
    fn fetch_offline_lookups(&self) {
        self.push(LookupRequest::OfflineLookups);
    }

    fn wait_offline_lookups(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut fetched = self.offline_fetched.lock();
        while !*fetched {
            if self.offline_cv.wait_until(&mut fetched, deadline).timed_out() {
                return false;
            }
        }
        *fetched = false;
        true
    }

    fn fetch_ds_info(&self) {
        self.push(LookupRequest::DsInfo);
    }

    fn fetch_latest_ds_blocks(&self, from_block: u64) {
        self.push(LookupRequest::DsBlocks { from_block });
    }

    fn fetch_latest_tx_blocks(&self, from_block: u64) {
        self.push(LookupRequest::TxBlocks { from_block });
    }

    fn send_message_to_lookup_nodes(&self, message: &[u8]) {
        self.push(LookupRequest::Broadcast(message.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn wait_times_out_without_answer() {
        let lookup = QueueLookup::new();
        assert!(!lookup.wait_offline_lookups(Duration::from_millis(20)));
    }

    #[test]
    fn wait_consumes_the_answer() {
        let lookup = Arc::new(QueueLookup::new());
        let waiter = {
            let lookup = lookup.clone();
            std::thread::spawn(move || lookup.wait_offline_lookups(Duration::from_secs(5)))
        };
        lookup.note_offline_lookups_received();
        assert!(waiter.join().unwrap());
        // Flag was consumed; a second wait times out again.
        assert!(!lookup.wait_offline_lookups(Duration::from_millis(20)));
    }

    #[test]
    fn requests_are_recorded_in_order() {
        let lookup = QueueLookup::new();
        lookup.fetch_offline_lookups();
        lookup.fetch_ds_info();
        lookup.fetch_latest_ds_blocks(5);
        assert_eq!(
            lookup.drain_requests(),
            vec![
                LookupRequest::OfflineLookups,
                LookupRequest::DsInfo,
                LookupRequest::DsBlocks { from_block: 5 },
            ]
        );
        assert!(lookup.drain_requests().is_empty());
    }
}
