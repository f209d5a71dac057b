use fjall::{PartitionCreateOptions, TxKeyspace, TxPartitionHandle};

use crate::activity::Activity;
use crate::error::Result;

/// Canonical activity records plus the two idempotency-key indexes.
#[derive(Clone)]
pub struct ActivityRepo {
    keyspace: TxKeyspace,
    activities: TxPartitionHandle,
    remote_ids: TxPartitionHandle,
    dedupe_keys: TxPartitionHandle,
}

impl ActivityRepo {
    pub fn new(keyspace: TxKeyspace) -> Result<ActivityRepo> {
        let options = PartitionCreateOptions::default();
        let activities = keyspace.open_partition("activities", options.clone())?;
        let remote_ids = keyspace.open_partition("activity_remote_ids", options.clone())?;
        let dedupe_keys = keyspace.open_partition("activity_dedupe_keys", options)?;
        Ok(ActivityRepo {
            keyspace,
            activities,
            remote_ids,
            dedupe_keys,
        })
    }

    /// Persist the activity and its idempotency index entries in one atomic
    /// transaction.
    pub fn insert(&self, activity: &Activity) -> Result<()> {
        let bytes = activity.to_bytes()?;
        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.activities, activity.id.as_str(), bytes);
        if let Some(remote_id) = &activity.remote_id {
            tx.insert(&self.remote_ids, remote_id.as_str(), activity.id.as_str());
        }
        if let Some(dedupe_key) = &activity.dedupe_key {
            tx.insert(&self.dedupe_keys, dedupe_key.as_str(), activity.id.as_str());
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_one(&self, id: &str) -> Result<Option<Activity>> {
        if let Some(bytes) = self.activities.get(id)? {
            return Ok(Some(Activity::from_bytes(&bytes)?));
        }
        Ok(None)
    }

    /// Look up a prior activity by either idempotency key. Two activities
    /// sharing a `remote_id` or `dedupe_key` must collapse to the first.
    pub fn find_duplicate(
        &self,
        remote_id: Option<&str>,
        dedupe_key: Option<&str>,
    ) -> Result<Option<Activity>> {
        if let Some(remote_id) = remote_id
            && let Some(id) = self.remote_ids.get(remote_id)?
        {
            return self.find_one(std::str::from_utf8(&id).unwrap_or_default());
        }
        if let Some(dedupe_key) = dedupe_key
            && let Some(id) = self.dedupe_keys.get(dedupe_key)?
        {
            return self.find_one(std::str::from_utf8(&id).unwrap_or_default());
        }
        Ok(None)
    }
}
