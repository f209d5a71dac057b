//! Activity processing engine for a federated social network.
//!
//! The engine takes validated activity envelopes (Accept, Join, Leave,
//! Invite, Add, Remove, Follow, Unfollow, Flag and friends), runs the
//! matching handler against the membership containers in the local store,
//! and reports back what changed and whether the caller needs to hand the
//! activity off to outbound federation.
//!
//! Entry points:
//! - [`engine::Dispatcher`] for processing activities,
//! - [`policy`] for the pure audience/capability decisions,
//! - [`repo::Store`] for opening the underlying keyspace.

pub mod activity;
pub mod actor_id;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod policy;
pub mod repo;
pub mod resolver;

pub use activity::{Activity, Envelope, Verb};
pub use config::Settings;
pub use engine::{Dispatch, Dispatcher, Registry};
pub use error::{Error, Result};
pub use repo::Store;
pub use resolver::{ActorResolver, StoreResolver};
