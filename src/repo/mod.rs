mod activity_repo;
mod actor_repo;
mod container_repo;
mod flag_repo;
mod server_repo;

pub use activity_repo::ActivityRepo;
pub use actor_repo::ActorRepo;
pub use container_repo::ContainerRepo;
pub use flag_repo::{Flag, FlagRepo, FlagStatus, Reason};
pub use server_repo::{FederatedServer, ServerRepo};

use fjall::TxKeyspace;

use crate::error::Result;

/// All partitions the engine touches, opened once and cloned freely. The
/// keyspace is transactional so container mutations can use `fetch_update`
/// and index maintenance can commit atomically.
#[derive(Clone)]
pub struct Store {
    pub keyspace: TxKeyspace,
    pub activities: ActivityRepo,
    pub containers: ContainerRepo,
    pub flags: FlagRepo,
    pub servers: ServerRepo,
    pub actors: ActorRepo,
}

impl Store {
    pub fn open(keyspace: TxKeyspace) -> Result<Store> {
        let activities = ActivityRepo::new(keyspace.clone())?;
        let containers = ContainerRepo::new(keyspace.clone())?;
        let flags = FlagRepo::new(keyspace.clone())?;
        let servers = ServerRepo::new(keyspace.clone())?;
        let actors = ActorRepo::new(keyspace.clone())?;
        Ok(Store {
            keyspace,
            activities,
            containers,
            flags,
            servers,
            actors,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tempfile::TempDir;

    use super::Store;

    /// Temporary keyspace for tests; the directory lives as long as the
    /// returned guard.
    pub(crate) fn temp_store() -> (TempDir, Store) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let dir = tempfile::tempdir().unwrap();
        let keyspace = fjall::Config::new(dir.path())
            .temporary(true)
            .open_transactional()
            .unwrap();
        let store = Store::open(keyspace).unwrap();
        (dir, store)
    }
}
