//! In-process event store.
//!
//! [`MemoryStore`] implements the [`EventStore`] seam against plain
//! in-memory state: a per-stream record log, live catch-up fan-out, and
//! round-robin persistent groups with in-flight tracking. It backs the test
//! suites and local development; a networked store implementation plugs in
//! behind the same trait.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use sluice_core::{RecordDraft, RecordId, StoredRecord};
use tokio::sync::mpsc;
use tracing::debug;

use super::{EventStore, Feed, FeedItem};
use crate::config::{
    AppendOptions, PersistentOptions, PersistentSubscribeOptions, StreamPosition,
    SubscribeOptions,
};
use crate::error::{Error, Result};

/// Connection scheme accepted by [`MemoryStore::connect`].
const SCHEME: &str = "memory://";

#[derive(Debug, Default)]
struct StreamState {
    records: Vec<StoredRecord>,
    live: Vec<mpsc::UnboundedSender<FeedItem>>,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug)]
struct GroupState {
    /// Index of the next record to hand out to a member.
    next_record: usize,
    /// Round-robin cursor over members.
    cursor: usize,
    members: Vec<mpsc::UnboundedSender<FeedItem>>,
    in_flight: HashSet<RecordId>,
}

impl GroupState {
    fn starting_at(position: StreamPosition, log_len: usize) -> Self {
        let next_record = match position {
            StreamPosition::Start => 0,
            StreamPosition::End => log_len,
            StreamPosition::Revision(n) => (n as usize).min(log_len),
        };
        Self {
            next_record,
            cursor: 0,
            members: Vec::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Hand out pending records to members, one member per record.
    fn drain(&mut self, records: &[StoredRecord]) {
        while self.next_record < records.len() {
            self.members.retain(|m| !m.is_closed());
            if self.members.is_empty() {
                return;
            }

            let record = &records[self.next_record];
            let mut delivered = false;
            for _ in 0..self.members.len() {
                let idx = self.cursor % self.members.len();
                self.cursor = self.cursor.wrapping_add(1);
                if self.members[idx]
                    .send(FeedItem::Record(record.clone()))
                    .is_ok()
                {
                    delivered = true;
                    break;
                }
            }
            if !delivered {
                // Every member went away mid-loop; retry on the next join.
                continue;
            }

            self.in_flight.insert(record.id.clone());
            self.next_record += 1;
        }
    }
}

/// In-memory [`EventStore`] implementation.
///
/// Thread-safe: share it as `Arc<MemoryStore>` between a publisher and any
/// number of subscribers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    streams: Mutex<HashMap<String, StreamState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a store handle from a connection string.
    ///
    /// Only the `memory://` scheme is understood; anything else fails with
    /// a connection error, mirroring how a networked implementation
    /// surfaces an unreachable or malformed target at construction time.
    pub fn connect(connection_string: &str) -> Result<Self> {
        if !connection_string.starts_with(SCHEME) {
            return Err(Error::Connection(format!(
                "unsupported connection string: {connection_string}"
            )));
        }
        Ok(Self::new())
    }

    /// Drop every open feed on a stream, as a store-side disconnect would.
    ///
    /// Each feed receives a [`FeedItem::Dropped`] item and is detached.
    /// Returns the number of feeds dropped.
    pub fn drop_feeds(&self, stream: &str) -> usize {
        let mut streams = self.lock();
        let Some(state) = streams.get_mut(stream) else {
            return 0;
        };

        let mut dropped = 0;
        for tx in state.live.drain(..) {
            let _ = tx.send(FeedItem::Dropped {
                reason: "server-side disconnect".to_string(),
            });
            dropped += 1;
        }
        for group in state.groups.values_mut() {
            for tx in group.members.drain(..) {
                let _ = tx.send(FeedItem::Dropped {
                    reason: "server-side disconnect".to_string(),
                });
                dropped += 1;
            }
        }
        debug!(stream, dropped, "dropped open feeds");
        dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StreamState>> {
        self.streams.lock().expect("stream registry lock poisoned")
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(
        &self,
        stream: &str,
        opts: &AppendOptions,
        draft: RecordDraft,
    ) -> Result<u64> {
        let mut streams = self.lock();
        let state = streams.entry(stream.to_string()).or_default();

        let revision = state.records.len() as u64;
        if let Some(expected) = opts.expected_revision {
            if expected != revision {
                return Err(Error::Store(format!(
                    "expected revision {expected}, stream {stream} is at {revision}"
                )));
            }
        }

        let record = StoredRecord {
            id: RecordId::new(),
            content_type: draft.content_type,
            event_type: draft.event_type,
            payload: draft.payload,
            metadata: draft.metadata,
            revision,
        };
        state.records.push(record.clone());

        // Fan out to live catch-up feeds, pruning detached ones.
        state
            .live
            .retain(|tx| tx.send(FeedItem::Record(record.clone())).is_ok());

        // Each group hands the record to exactly one member.
        let StreamState {
            records, groups, ..
        } = state;
        for group in groups.values_mut() {
            group.drain(records);
        }

        Ok(revision)
    }

    async fn subscribe(&self, stream: &str, opts: &SubscribeOptions) -> Result<Feed> {
        let mut streams = self.lock();
        let state = streams.entry(stream.to_string()).or_default();

        let (tx, rx) = mpsc::unbounded_channel();
        let start = match opts.from {
            StreamPosition::Start => 0,
            StreamPosition::End => state.records.len(),
            StreamPosition::Revision(n) => (n as usize).min(state.records.len()),
        };
        // Replay and registration happen under the same lock, so no record
        // appended concurrently can be missed or duplicated.
        for record in &state.records[start..] {
            let _ = tx.send(FeedItem::Record(record.clone()));
        }
        state.live.push(tx);

        Ok(rx)
    }

    async fn create_persistent(
        &self,
        stream: &str,
        group: &str,
        opts: &PersistentOptions,
    ) -> Result<()> {
        let mut streams = self.lock();
        let state = streams.entry(stream.to_string()).or_default();

        if state.groups.contains_key(group) {
            return Err(Error::GroupExists);
        }
        let log_len = state.records.len();
        state.groups.insert(
            group.to_string(),
            GroupState::starting_at(opts.start_from, log_len),
        );
        debug!(stream, group, "created persistent subscription group");
        Ok(())
    }

    async fn subscribe_persistent(
        &self,
        stream: &str,
        group: &str,
        _opts: &PersistentSubscribeOptions,
    ) -> Result<Feed> {
        let mut streams = self.lock();
        // A missing stream and a missing group are the same failure; don't
        // register a stream on a failed join.
        let state = streams.get_mut(stream).ok_or_else(|| {
            Error::Subscription(format!("unknown subscription group {group} on {stream}"))
        })?;

        let StreamState {
            records, groups, ..
        } = state;
        let group_state = groups.get_mut(group).ok_or_else(|| {
            Error::Subscription(format!("unknown subscription group {group} on {stream}"))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        group_state.members.push(tx);
        group_state.drain(records);

        Ok(rx)
    }

    async fn ack(&self, stream: &str, group: &str, id: &RecordId) -> Result<()> {
        let mut streams = self.lock();
        let group_state = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| Error::Store(format!("unknown group {group} on {stream}")))?;

        if group_state.in_flight.remove(id) {
            Ok(())
        } else {
            Err(Error::Store(format!("record {id} is not in flight")))
        }
    }

    async fn nack(&self, stream: &str, group: &str, id: &RecordId, reason: &str) -> Result<()> {
        let mut streams = self.lock();
        let group_state = streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
            .ok_or_else(|| Error::Store(format!("unknown group {group} on {stream}")))?;

        // Skip semantics: the record leaves the in-flight set and is not
        // redelivered.
        if group_state.in_flight.remove(id) {
            debug!(stream, group, %id, reason, "record nacked, skipping");
            Ok(())
        } else {
            Err(Error::Store(format!("record {id} is not in flight")))
        }
    }
}
