//! Durable state and event log on top of sled
//!
//! Everything lives in the default tree so that one `Batch` covers the state
//! blob and the events of a commit. sled applies a batch atomically. Each blob
//! has a sibling key holding its sha256 digest, checked again on every read.
use std::sync::Arc;

use sled::Batch;
use tracing::error;

use crate::error::{CustodyError, Result};
use crate::events::{CommittedEvent, EventRecord};
use crate::state::CustodyState;
use crate::utils;

const STATE_KEY: &[u8] = b"custody/state";
const STATE_DIGEST_KEY: &[u8] = b"custody/state_digest";
const EVENT_PREFIX: &[u8] = b"custody/event/";
const DIGEST_PREFIX: &[u8] = b"custody/digest/";

pub struct Store {
    instance: Arc<sled::Db>,
}

// big endian keeps sled's lexicographic order equal to sequence order
fn seq_key(prefix: &[u8], seq: &[u8]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(seq);
    key
}

fn key_label(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    fn digest_for(&self, key: &[u8]) -> Result<String> {
        let stored = self
            .instance
            .get(key)?
            .ok_or_else(|| CustodyError::DigestMismatch { key: key_label(key) })?;
        Ok(String::from_utf8_lossy(&stored).into_owned())
    }

    pub fn load_state(&self) -> Result<Option<CustodyState>> {
        let Some(bytes) = self.instance.get(STATE_KEY)? else {
            return Ok(None);
        };
        let digest = self.digest_for(STATE_DIGEST_KEY)?;
        Ok(Some(utils::decode_verified(&bytes, &digest, key_label(STATE_KEY))?))
    }

    /// Write the new state and its events in one batch. Every blob is stored
    /// next to its sha256 digest.
    pub fn commit(&self, state: &CustodyState, events: &[EventRecord]) -> Result<()> {
        let (state_digest, state_cbor) = utils::encode_with_digest(state)?;

        let mut batch = Batch::default();
        batch.insert(STATE_KEY, state_cbor);
        batch.insert(STATE_DIGEST_KEY, state_digest.as_bytes());
        for event in events {
            let (digest, cbor) = event.build()?;
            let seq = event.seq.to_be_bytes();
            batch.insert(seq_key(EVENT_PREFIX, &seq), cbor);
            batch.insert(seq_key(DIGEST_PREFIX, &seq), digest.as_bytes());
        }

        self.instance.apply_batch(batch).inspect_err(|e| {
            error!(error = %e, events = events.len(), "failed to apply custody batch");
        })?;
        Ok(())
    }

    /// The event log in sequence order. Fails on the first record whose bytes
    /// no longer match the digest it was committed under.
    pub fn events(&self) -> Result<Vec<CommittedEvent>> {
        self.instance
            .scan_prefix(EVENT_PREFIX)
            .map(|entry| {
                let (key, value) = entry?;
                let seq = &key[EVENT_PREFIX.len()..];
                let digest = self.digest_for(&seq_key(DIGEST_PREFIX, seq))?;
                let label = <[u8; 8]>::try_from(seq)
                    .map(|seq| format!("event {}", u64::from_be_bytes(seq)))
                    .unwrap_or_else(|_| key_label(&key));
                let record = utils::decode_verified(&value, &digest, label)
                    .inspect_err(|e| error!(error = %e, "event log verification failed"))?;
                Ok(CommittedEvent { digest, record })
            })
            .collect()
    }

    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }
}
