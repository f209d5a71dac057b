use crate::actor_id::ActorId;
use crate::container::Member;
use crate::error::Result;
use crate::repo::ActorRepo;

/// Resolution seam between the engine and the actor directory.
///
/// `None` means the actor is not locally resolvable; handlers then fall back
/// to a minimal stub snapshot and raise the `federate` flag so the caller
/// notifies the remote origin.
pub trait ActorResolver: Send + Sync {
    fn resolve(&self, id: &ActorId) -> Result<Option<Member>>;
}

/// Store-backed resolver: local actors come from the actor partition, remote
/// actors are never resolved here.
pub struct StoreResolver {
    actors: ActorRepo,
    domain: String,
}

impl StoreResolver {
    pub fn new(actors: ActorRepo, domain: impl Into<String>) -> StoreResolver {
        StoreResolver {
            actors,
            domain: domain.into(),
        }
    }
}

impl ActorResolver for StoreResolver {
    fn resolve(&self, id: &ActorId) -> Result<Option<Member>> {
        if !id.is_local(&self.domain) {
            return Ok(None);
        }
        self.actors.find_one(&id.to_string())
    }
}
