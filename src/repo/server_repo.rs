//! Per-remote-domain interest counters.
//!
//! Follow/Unfollow against remote identifiers maintain these records; the
//! federation poller (outside this crate) reads them to decide how often to
//! pull a domain, and stops wasting cycles on domains nobody here follows.

use std::collections::BTreeMap;

use anyhow::Context;
use fjall::{PartitionCreateOptions, Slice, TxKeyspace, TxPartitionHandle};
use minicbor::{Decode, Encode};
use tracing::debug;

use crate::error::Result;

/// How far out the scheduler is parked once nothing on this domain is
/// followed anymore.
const IDLE_PARK_SECS: i64 = 365 * 24 * 60 * 60;
const IDLE_BACKOFF_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FederatedServer {
    #[n(0)]
    pub domain: String,
    /// Remote actor id -> number of local followers. An entry at zero is
    /// removed, never stored.
    #[n(1)]
    pub actors_ref_count: BTreeMap<String, u64>,
    #[n(2)]
    pub server_followers_count: u64,
    /// Epoch seconds of the next scheduled poll.
    #[n(3)]
    pub next_poll_at: i64,
    #[n(4)]
    pub backoff_ms: u64,
}

impl FederatedServer {
    fn new(domain: impl Into<String>, now: i64) -> FederatedServer {
        FederatedServer {
            domain: domain.into(),
            actors_ref_count: BTreeMap::new(),
            server_followers_count: 0,
            next_poll_at: now,
            backoff_ms: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.server_followers_count == 0 && self.actors_ref_count.is_empty()
    }

    /// New local interest: bump the counter and wake the poll scheduler.
    pub fn add_ref(&mut self, actor_id: Option<&str>, now: i64) {
        match actor_id {
            Some(actor_id) => {
                *self.actors_ref_count.entry(actor_id.to_string()).or_insert(0) += 1;
            }
            None => self.server_followers_count += 1,
        }
        self.next_poll_at = now;
        self.backoff_ms = 0;
    }

    /// Lost local interest: decrement with a floor at zero, drop the map
    /// entry entirely when it reaches zero, and park the scheduler when the
    /// whole record goes idle.
    pub fn remove_ref(&mut self, actor_id: Option<&str>, now: i64) {
        match actor_id {
            Some(actor_id) => {
                if let Some(count) = self.actors_ref_count.get_mut(actor_id) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.actors_ref_count.remove(actor_id);
                    }
                }
            }
            None => {
                self.server_followers_count = self.server_followers_count.saturating_sub(1);
            }
        }
        if self.is_idle() {
            self.next_poll_at = now + IDLE_PARK_SECS;
            self.backoff_ms = IDLE_BACKOFF_MS;
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self).context("unable to encode federated server")?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<FederatedServer> {
        Ok(minicbor::decode(bytes).context("unable to decode federated server")?)
    }
}

#[derive(Clone)]
pub struct ServerRepo {
    servers: TxPartitionHandle,
}

impl ServerRepo {
    pub fn new(keyspace: TxKeyspace) -> Result<ServerRepo> {
        let servers = keyspace.open_partition("servers", PartitionCreateOptions::default())?;
        Ok(ServerRepo { servers })
    }

    pub fn find_one(&self, domain: &str) -> Result<Option<FederatedServer>> {
        if let Some(bytes) = self.servers.get(domain)? {
            return Ok(Some(FederatedServer::from_bytes(&bytes)?));
        }
        Ok(None)
    }

    /// Upsert the domain record and apply `f` to it atomically. Records are
    /// retained even when fully idle so polling history survives.
    pub fn update(
        &self,
        domain: &str,
        now: i64,
        mut f: impl FnMut(&mut FederatedServer),
    ) -> Result<FederatedServer> {
        let mut decode_err = None;
        let mut updated: Option<FederatedServer> = None;
        self.servers.fetch_update(domain, |prev| {
            let mut server = match prev {
                Some(bytes) => match FederatedServer::from_bytes(bytes) {
                    Ok(server) => server,
                    Err(e) => {
                        decode_err = Some(e);
                        return Some(bytes.clone());
                    }
                },
                None => FederatedServer::new(domain, now),
            };
            f(&mut server);
            let bytes = server
                .to_bytes()
                .expect("federated server encoding is infallible");
            updated = Some(server);
            Some(Slice::from(bytes))
        })?;
        if let Some(e) = decode_err {
            return Err(e);
        }
        let server = updated.expect("update closure always runs");
        debug!(
            target: "federation",
            domain,
            refs = server.actors_ref_count.len(),
            server_followers = server.server_followers_count,
            "reference counters updated"
        );
        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::{IDLE_BACKOFF_MS, IDLE_PARK_SECS};
    use crate::repo::testing::temp_store;

    const DOMAIN: &str = "remote.example";
    const ALICE: &str = "@alice@remote.example";

    #[test]
    fn actor_ref_count_lifecycle() {
        let (_dir, store) = temp_store();

        // Two distinct local followers
        let s = store.servers.update(DOMAIN, 100, |s| s.add_ref(Some(ALICE), 100)).unwrap();
        assert_eq!(s.actors_ref_count.get(ALICE), Some(&1));
        assert_eq!(s.next_poll_at, 100);
        assert_eq!(s.backoff_ms, 0);
        let s = store.servers.update(DOMAIN, 120, |s| s.add_ref(Some(ALICE), 120)).unwrap();
        assert_eq!(s.actors_ref_count.get(ALICE), Some(&2));

        // First unfollow lowers, second removes the key entirely
        let s = store.servers.update(DOMAIN, 130, |s| s.remove_ref(Some(ALICE), 130)).unwrap();
        assert_eq!(s.actors_ref_count.get(ALICE), Some(&1));
        let s = store.servers.update(DOMAIN, 140, |s| s.remove_ref(Some(ALICE), 140)).unwrap();
        assert!(!s.actors_ref_count.contains_key(ALICE));

        // Record retained at zero, scheduler parked
        let stored = store.servers.find_one(DOMAIN).unwrap().unwrap();
        assert!(stored.is_idle());
        assert_eq!(stored.next_poll_at, 140 + IDLE_PARK_SECS);
        assert_eq!(stored.backoff_ms, IDLE_BACKOFF_MS);
    }

    #[test]
    fn server_follow_wakes_scheduler() {
        let (_dir, store) = temp_store();
        store.servers.update(DOMAIN, 10, |s| s.remove_ref(None, 10)).unwrap();
        let s = store.servers.find_one(DOMAIN).unwrap().unwrap();
        // floor at zero, never negative
        assert_eq!(s.server_followers_count, 0);

        let s = store.servers.update(DOMAIN, 50, |s| s.add_ref(None, 50)).unwrap();
        assert_eq!(s.server_followers_count, 1);
        assert_eq!(s.next_poll_at, 50);
        assert_eq!(s.backoff_ms, 0);
    }
}
