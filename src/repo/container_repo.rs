use fjall::{PartitionCreateOptions, Slice, TxKeyspace, TxPartitionHandle};
use tracing::debug;

use crate::container::{Circle, CircleKind, Roster};
use crate::error::Result;

/// Circles, rosters and the two lookup indexes over them.
///
/// Every mutation goes through `fetch_update` on the document's own key, so a
/// whole guarded transition (guards, pulls, push) is one atomic
/// read-modify-write. There is no cross-document locking; concurrent
/// duplicates collapse inside the update closure.
#[derive(Clone)]
pub struct ContainerRepo {
    keyspace: TxKeyspace,
    circles: TxPartitionHandle,
    rosters: TxPartitionHandle,
    /// `(owner, circle kind)` -> circle id
    circle_owners: TxPartitionHandle,
    /// roster-embedded circle id -> roster id
    roster_circles: TxPartitionHandle,
}

fn owner_key(owner: &str, kind: CircleKind) -> Vec<u8> {
    let mut key = Vec::with_capacity(owner.len() + 16);
    key.extend_from_slice(owner.as_bytes());
    key.push(0);
    key.extend_from_slice(kind.as_str().as_bytes());
    key
}

impl ContainerRepo {
    pub fn new(keyspace: TxKeyspace) -> Result<ContainerRepo> {
        let options = PartitionCreateOptions::default();
        let circles = keyspace.open_partition("circles", options.clone())?;
        let rosters = keyspace.open_partition("rosters", options.clone())?;
        let circle_owners = keyspace.open_partition("circle_owners", options.clone())?;
        let roster_circles = keyspace.open_partition("roster_circles", options)?;
        Ok(ContainerRepo {
            keyspace,
            circles,
            rosters,
            circle_owners,
            roster_circles,
        })
    }

    pub fn insert_circle(&self, circle: &Circle) -> Result<()> {
        let bytes = circle.to_bytes()?;
        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.circles, circle.id.as_str(), bytes);
        if let Some(kind) = circle.kind {
            tx.insert(
                &self.circle_owners,
                owner_key(&circle.owner, kind),
                circle.id.as_str(),
            );
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_circle(&self, id: &str) -> Result<Option<Circle>> {
        if let Some(bytes) = self.circles.get(id)? {
            return Ok(Some(Circle::from_bytes(&bytes)?));
        }
        Ok(None)
    }

    /// Resolve a well-known circle by its owner, e.g. the caller's Following
    /// circle when an activity omits an explicit target.
    pub fn find_circle_by_owner(&self, owner: &str, kind: CircleKind) -> Result<Option<Circle>> {
        if let Some(id) = self.circle_owners.get(owner_key(owner, kind))? {
            return self.find_circle(std::str::from_utf8(&id).unwrap_or_default());
        }
        Ok(None)
    }

    /// Atomic read-modify-write of one circle. Returns `None` when the circle
    /// does not exist. When the closure reports a business error the stored
    /// document is left untouched.
    pub fn update_circle<T>(
        &self,
        id: &str,
        mut f: impl FnMut(&mut Circle) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut out: Option<Result<T>> = None;
        self.circles.fetch_update(id, |prev| {
            let Some(bytes) = prev else {
                out = None;
                return None;
            };
            let unchanged = Some(bytes.clone());
            let mut circle = match Circle::from_bytes(bytes) {
                Ok(circle) => circle,
                Err(e) => {
                    out = Some(Err(e));
                    return unchanged;
                }
            };
            match f(&mut circle) {
                Ok(value) => match circle.to_bytes() {
                    Ok(new_bytes) => {
                        out = Some(Ok(value));
                        Some(Slice::from(new_bytes))
                    }
                    Err(e) => {
                        out = Some(Err(e));
                        unchanged
                    }
                },
                Err(e) => {
                    out = Some(Err(e));
                    unchanged
                }
            }
        })?;
        out.transpose()
    }

    pub fn insert_roster(&self, roster: &Roster) -> Result<()> {
        let bytes = roster.to_bytes()?;
        let mut tx = self.keyspace.write_tx();
        tx.insert(&self.rosters, roster.id.as_str(), bytes);
        for list in &roster.lists {
            tx.insert(&self.roster_circles, list.circle_id.as_str(), roster.id.as_str());
        }
        tx.commit()?;
        debug!(target: "engine", roster = %roster.id, "roster created");
        Ok(())
    }

    pub fn find_roster(&self, id: &str) -> Result<Option<Roster>> {
        if let Some(bytes) = self.rosters.get(id)? {
            return Ok(Some(Roster::from_bytes(&bytes)?));
        }
        Ok(None)
    }

    /// Atomic read-modify-write of one roster, same contract as
    /// [`ContainerRepo::update_circle`].
    pub fn update_roster<T>(
        &self,
        id: &str,
        mut f: impl FnMut(&mut Roster) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut out: Option<Result<T>> = None;
        self.rosters.fetch_update(id, |prev| {
            let Some(bytes) = prev else {
                out = None;
                return None;
            };
            let unchanged = Some(bytes.clone());
            let mut roster = match Roster::from_bytes(bytes) {
                Ok(roster) => roster,
                Err(e) => {
                    out = Some(Err(e));
                    return unchanged;
                }
            };
            match f(&mut roster) {
                Ok(value) => match roster.to_bytes() {
                    Ok(new_bytes) => {
                        out = Some(Ok(value));
                        Some(Slice::from(new_bytes))
                    }
                    Err(e) => {
                        out = Some(Err(e));
                        unchanged
                    }
                },
                Err(e) => {
                    out = Some(Err(e));
                    unchanged
                }
            }
        })?;
        out.transpose()
    }

    /// Which roster owns this embedded circle id, if any.
    pub fn roster_of_circle(&self, circle_id: &str) -> Result<Option<String>> {
        if let Some(id) = self.roster_circles.get(circle_id)? {
            return Ok(Some(String::from_utf8_lossy(&id).into_owned()));
        }
        Ok(None)
    }

    /// All Following circles, for the batch follower-map build.
    pub fn following_circles(&self) -> Result<Vec<Circle>> {
        let mut result = vec![];
        for bytes in self.keyspace.read_tx().values(&self.circles) {
            let circle = Circle::from_bytes(&bytes?)?;
            if circle.kind == Some(CircleKind::Following) {
                result.push(circle);
            }
        }
        Ok(result)
    }
}
