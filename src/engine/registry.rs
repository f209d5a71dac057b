use std::collections::HashMap;

use tracing::info;

use crate::activity::{Envelope, Verb};
use crate::actor_id::ObjectType;
use crate::error::Error;
use crate::handlers::{
    AcceptHandler, AddHandler, FlagHandler, FollowHandler, InviteHandler, JoinHandler,
    LeaveHandler, RejectHandler, RemoveHandler,
};

use super::{AfterHook, BeforeHook, ErrorHook, Handler};

/// One verb's handlers: a default, optional per-subtype overrides keyed by
/// the activity's `objectType`, and optional hooks around dispatch.
pub struct Bucket {
    default: Box<dyn Handler>,
    subtypes: HashMap<ObjectType, Box<dyn Handler>>,
    pub(super) before: Option<BeforeHook>,
    pub(super) after: Option<AfterHook>,
    pub(super) on_error: Option<ErrorHook>,
}

impl Bucket {
    pub fn new(handler: impl Handler + 'static) -> Bucket {
        Bucket {
            default: Box::new(handler),
            subtypes: HashMap::new(),
            before: None,
            after: None,
            on_error: None,
        }
    }

    pub fn with_subtype(mut self, ty: ObjectType, handler: impl Handler + 'static) -> Bucket {
        self.subtypes.insert(ty, Box::new(handler));
        self
    }

    pub fn with_before(
        mut self,
        f: impl Fn(&Envelope) -> crate::error::Result<()> + Send + Sync + 'static,
    ) -> Bucket {
        self.before = Some(Box::new(f));
        self
    }

    pub fn with_after(mut self, f: impl Fn(&super::Dispatch) + Send + Sync + 'static) -> Bucket {
        self.after = Some(Box::new(f));
        self
    }

    pub fn with_on_error(
        mut self,
        f: impl Fn(&Envelope, &Error) + Send + Sync + 'static,
    ) -> Bucket {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Subtype handler when one is registered for the activity's
    /// `objectType`, otherwise the bucket default.
    pub(super) fn handler_for(&self, subtype: Option<ObjectType>) -> &dyn Handler {
        subtype
            .and_then(|ty| self.subtypes.get(&ty))
            .map(Box::as_ref)
            .unwrap_or(self.default.as_ref())
    }
}

/// The verb table. Built explicitly at startup and injected into the
/// dispatcher; there is no global registry and no lazy build.
pub struct Registry {
    buckets: HashMap<Verb, Bucket>,
}

impl Registry {
    pub fn empty() -> Registry {
        Registry {
            buckets: HashMap::new(),
        }
    }

    pub fn insert(&mut self, verb: Verb, bucket: Bucket) {
        self.buckets.insert(verb, bucket);
    }

    pub(super) fn bucket(&self, verb: Verb) -> Option<&Bucket> {
        self.buckets.get(&verb)
    }

    /// The full verb table with the standard envelope-contract before hooks.
    /// Hook failures are logged by the dispatcher, never fatal: the upstream
    /// validator is the authoritative gate, handlers re-check what they need.
    pub fn standard() -> Registry {
        let mut registry = Registry::empty();
        registry.insert(
            Verb::Accept,
            Bucket::new(AcceptHandler).with_before(|env| require(env, &["target"])),
        );
        registry.insert(
            Verb::Reject,
            Bucket::new(RejectHandler).with_before(|env| require(env, &["target"])),
        );
        registry.insert(
            Verb::Join,
            Bucket::new(JoinHandler).with_before(|env| require(env, &["target"])),
        );
        registry.insert(
            Verb::Leave,
            Bucket::new(LeaveHandler).with_before(|env| require(env, &["target"])),
        );
        registry.insert(
            Verb::Invite,
            Bucket::new(InviteHandler).with_before(|env| require(env, &["target", "to"])),
        );
        registry.insert(
            Verb::Add,
            Bucket::new(AddHandler).with_before(|env| require(env, &["object"])),
        );
        registry.insert(
            Verb::Remove,
            Bucket::new(RemoveHandler).with_before(|env| require(env, &["object"])),
        );
        registry.insert(
            Verb::Follow,
            Bucket::new(FollowHandler::follow()).with_before(|env| require(env, &["object"])),
        );
        registry.insert(
            Verb::Unfollow,
            Bucket::new(FollowHandler::unfollow()).with_before(|env| require(env, &["object"])),
        );
        registry.insert(
            Verb::Flag,
            Bucket::new(FlagHandler)
                .with_before(|env| require(env, &["target", "object"]))
                .with_after(|dispatch| {
                    if dispatch.changed {
                        info!(target: "engine", activity = %dispatch.activity.id, "new report filed");
                    }
                }),
        );
        registry
    }
}

fn require(envelope: &Envelope, fields: &[&str]) -> crate::error::Result<()> {
    for &field in fields {
        let present = match field {
            "target" => envelope.target.is_some(),
            "to" => envelope.to.is_some(),
            "object" => envelope.object.is_some(),
            _ => true,
        };
        if !present {
            return Err(Error::Validation(format!(
                "{} activity is missing {field}",
                envelope.verb.as_str()
            )));
        }
    }
    Ok(())
}
