use anyhow::Context;
use fjall::{PartitionCreateOptions, TxKeyspace, TxPartitionHandle};
use minicbor::{Decode, Encode};

use crate::error::Result;

/// Normalized moderation reason, resolved against the server taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Reason {
    #[n(0)]
    pub code: String,
    #[n(1)]
    pub label: String,
    #[n(2)]
    pub description: String,
    /// Free-text kept when the report fell back to the `other` code.
    #[n(3)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cbor(index_only)]
pub enum FlagStatus {
    #[n(0)]
    Open,
    #[n(1)]
    Resolved,
}

/// A moderation report.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Flag {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub target: String,
    #[n(2)]
    pub target_type: Option<String>,
    #[n(3)]
    pub target_actor_id: Option<String>,
    #[n(4)]
    pub reason: Reason,
    #[n(5)]
    pub notes: Option<String>,
    #[n(6)]
    pub actor_id: String,
    #[n(7)]
    pub status: FlagStatus,
    /// Domain the target lives on.
    #[n(8)]
    pub server: String,
    #[n(9)]
    pub created_at: i64,
}

impl Flag {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self).context("unable to encode flag")?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Flag> {
        Ok(minicbor::decode(bytes).context("unable to decode flag")?)
    }
}

fn open_key(target: &str, actor_id: &str, code: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(target.len() + actor_id.len() + code.len() + 2);
    key.extend_from_slice(target.as_bytes());
    key.push(0);
    key.extend_from_slice(actor_id.as_bytes());
    key.push(0);
    key.extend_from_slice(code.as_bytes());
    key
}

/// Flags plus the open-report dedupe index: at most one open flag per
/// `(target, actor, reason code)` tuple.
#[derive(Clone)]
pub struct FlagRepo {
    keyspace: TxKeyspace,
    flags: TxPartitionHandle,
    open_flags: TxPartitionHandle,
}

impl FlagRepo {
    pub fn new(keyspace: TxKeyspace) -> Result<FlagRepo> {
        let options = PartitionCreateOptions::default();
        let flags = keyspace.open_partition("flags", options.clone())?;
        let open_flags = keyspace.open_partition("open_flags", options)?;
        Ok(FlagRepo {
            keyspace,
            flags,
            open_flags,
        })
    }

    pub fn insert_open(&self, flag: &Flag) -> Result<()> {
        let bytes = flag.to_bytes()?;
        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.flags, flag.id.as_str(), bytes);
        tx.insert(
            &self.open_flags,
            open_key(&flag.target, &flag.actor_id, &flag.reason.code),
            flag.id.as_str(),
        );
        tx.commit()?;
        Ok(())
    }

    pub fn find_one(&self, id: &str) -> Result<Option<Flag>> {
        if let Some(bytes) = self.flags.get(id)? {
            return Ok(Some(Flag::from_bytes(&bytes)?));
        }
        Ok(None)
    }

    pub fn find_open(&self, target: &str, actor_id: &str, code: &str) -> Result<Option<Flag>> {
        if let Some(id) = self.open_flags.get(open_key(target, actor_id, code))? {
            return self.find_one(std::str::from_utf8(&id).unwrap_or_default());
        }
        Ok(None)
    }

    /// Close a report. The moderation workflow itself lives elsewhere; this
    /// only flips the status and releases the dedupe slot so a fresh report
    /// can be opened later.
    pub fn resolve(&self, id: &str) -> Result<bool> {
        let Some(mut flag) = self.find_one(id)? else {
            return Ok(false);
        };
        if flag.status == FlagStatus::Resolved {
            return Ok(false);
        }
        flag.status = FlagStatus::Resolved;
        let bytes = flag.to_bytes()?;
        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.flags, flag.id.as_str(), bytes);
        tx.remove(
            &self.open_flags,
            open_key(&flag.target, &flag.actor_id, &flag.reason.code),
        );
        tx.commit()?;
        Ok(true)
    }
}
