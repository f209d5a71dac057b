//! Verb registry and dispatcher.

mod dispatcher;
mod registry;

pub use dispatcher::{Dispatch, Dispatcher};
pub use registry::{Bucket, Registry};

use serde_json::Value;

use crate::activity::{Activity, Envelope};
use crate::config::Settings;
use crate::error::Result;
use crate::repo::Store;
use crate::resolver::ActorResolver;

/// Everything a handler may touch, passed by reference from the dispatcher.
pub struct Context<'a> {
    pub store: &'a Store,
    pub settings: &'a Settings,
    pub resolver: &'a dyn ActorResolver,
}

/// What a handler reports back. `activity.object_id` and
/// `activity.side_effects` are written by the handler itself.
#[derive(Debug, Default)]
pub struct Outcome {
    /// The affected object, when the handler produced or found one.
    pub object: Option<Value>,
    /// Whether any container actually changed. False is the idempotent
    /// "already in that state" success.
    pub changed: bool,
    /// A logically identical action already exists (e.g. an open flag).
    pub duplicated: bool,
    /// The affected actor or target is not locally resolvable; the caller
    /// should hand off to outbound federation.
    pub federate: bool,
    /// The handler persisted the canonical activity itself.
    pub activity_persisted: bool,
}

impl Outcome {
    pub fn applied() -> Outcome {
        Outcome {
            changed: true,
            ..Outcome::default()
        }
    }

    pub fn unchanged() -> Outcome {
        Outcome::default()
    }

    /// Target is remote: no mutation, defer to the federation layer.
    pub fn deferred() -> Outcome {
        Outcome {
            federate: true,
            ..Outcome::default()
        }
    }

    pub fn with_object(mut self, object: Value) -> Outcome {
        self.object = Some(object);
        self
    }

    pub fn with_federate(mut self, federate: bool) -> Outcome {
        self.federate = federate;
        self
    }
}

/// A verb handler: performs the guarded container transition and fills in
/// the activity's `object_id`/`side_effects`.
pub trait Handler: Send + Sync {
    fn call(&self, cx: &Context<'_>, envelope: &Envelope, activity: &mut Activity)
    -> Result<Outcome>;
}

pub type BeforeHook = Box<dyn Fn(&Envelope) -> Result<()> + Send + Sync>;
pub type AfterHook = Box<dyn Fn(&Dispatch) + Send + Sync>;
pub type ErrorHook = Box<dyn Fn(&Envelope, &crate::error::Error) + Send + Sync>;
