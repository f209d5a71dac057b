use anyhow::Context;
use fjall::{PartitionCreateOptions, TxKeyspace, TxPartitionHandle};

use crate::container::Member;
use crate::error::Result;

/// Snapshots of locally-known actors, used to hydrate Member entries.
#[derive(Clone)]
pub struct ActorRepo {
    actors: TxPartitionHandle,
}

impl ActorRepo {
    pub fn new(keyspace: TxKeyspace) -> Result<ActorRepo> {
        let actors = keyspace.open_partition("actors", PartitionCreateOptions::default())?;
        Ok(ActorRepo { actors })
    }

    pub fn insert(&self, member: &Member) -> Result<()> {
        let bytes = minicbor::to_vec(member).context("unable to encode member")?;
        self.actors.insert(member.id.as_str(), bytes)?;
        Ok(())
    }

    pub fn find_one(&self, id: &str) -> Result<Option<Member>> {
        if let Some(bytes) = self.actors.get(id)? {
            let member = minicbor::decode(&bytes).context("unable to decode member")?;
            return Ok(Some(member));
        }
        Ok(None)
    }
}
