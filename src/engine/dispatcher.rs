use jiff::Timestamp;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::activity::{Activity, Envelope};
use crate::actor_id::{ActorId, ObjectType};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::repo::Store;
use crate::resolver::ActorResolver;

use super::{Context, Registry};

/// Result of one dispatch: the canonical activity plus the signals the
/// caller (federation delivery, notification fan-out) branches on.
#[derive(Debug)]
pub struct Dispatch {
    pub activity: Activity,
    pub object: Option<Value>,
    /// Hand off to outbound federation delivery.
    pub federate: bool,
    /// False when the call was an idempotent no-op.
    pub changed: bool,
    /// The action collapsed onto an existing record.
    pub duplicated: bool,
    /// Expected business failure, reported instead of propagated. Nothing
    /// was persisted when this is set.
    pub error: Option<String>,
}

/// The sole entry point of the engine.
pub struct Dispatcher {
    store: Store,
    settings: Settings,
    resolver: Box<dyn ActorResolver>,
    registry: Registry,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        settings: Settings,
        resolver: Box<dyn ActorResolver>,
        registry: Registry,
    ) -> Dispatcher {
        Dispatcher {
            store,
            settings,
            resolver,
            registry,
        }
    }

    /// Dispatch one validated envelope.
    ///
    /// In order: idempotency check, handler resolution (verb, then optional
    /// `objectType` subtype), before hook (logged, never fatal), handler,
    /// persistence of the canonical activity, after hook. Expected business
    /// failures come back in `Dispatch::error` with nothing persisted;
    /// infrastructure failures run the on_error hook and propagate.
    pub fn dispatch(&self, envelope: &Envelope) -> Result<Dispatch> {
        if let Some(prior) = self
            .store
            .activities
            .find_duplicate(envelope.remote_id.as_deref(), envelope.dedupe_key.as_deref())?
        {
            debug!(target: "engine", activity = %prior.id, "duplicate idempotency key, returning prior record");
            return Ok(Dispatch {
                activity: prior,
                object: None,
                federate: false,
                changed: false,
                duplicated: true,
                error: None,
            });
        }

        let bucket = self
            .registry
            .bucket(envelope.verb)
            .ok_or_else(|| Error::UnsupportedVerb(envelope.verb.as_str().to_string()))?;
        let subtype = envelope
            .object_type
            .as_deref()
            .and_then(|ty| ty.parse::<ObjectType>().ok());
        let handler = bucket.handler_for(subtype);

        if let Some(before) = &bucket.before
            && let Err(error) = before(envelope)
        {
            warn!(target: "engine", verb = envelope.verb.as_str(), %error, "before hook failed");
        }

        let mut activity = Activity::from_envelope(
            Uuid::now_v7().simple().to_string(),
            envelope,
            Timestamp::now().as_second(),
        );
        if let Ok(actor_id) = envelope.actor_id.parse::<ActorId>() {
            activity.actor = self.resolver.resolve(&actor_id)?;
        }

        let cx = Context {
            store: &self.store,
            settings: &self.settings,
            resolver: self.resolver.as_ref(),
        };
        match handler.call(&cx, envelope, &mut activity) {
            Ok(outcome) => {
                if !outcome.activity_persisted {
                    self.store.activities.insert(&activity)?;
                }
                let dispatch = Dispatch {
                    activity,
                    object: outcome.object,
                    federate: outcome.federate,
                    changed: outcome.changed,
                    duplicated: outcome.duplicated,
                    error: None,
                };
                if let Some(after) = &bucket.after {
                    after(&dispatch);
                }
                Ok(dispatch)
            }
            Err(error) if error.is_expected() => {
                debug!(target: "engine", verb = envelope.verb.as_str(), %error, "handler rejected activity");
                let dispatch = Dispatch {
                    activity,
                    object: None,
                    federate: false,
                    changed: false,
                    duplicated: false,
                    error: Some(error.to_string()),
                };
                if let Some(after) = &bucket.after {
                    after(&dispatch);
                }
                Ok(dispatch)
            }
            Err(error) => {
                if let Some(on_error) = &bucket.on_error {
                    on_error(envelope, &error);
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Dispatch, Dispatcher};
    use crate::activity::{Activity, Envelope, Verb};
    use crate::actor_id::ObjectType;
    use crate::config::Settings;
    use crate::engine::{Bucket, Context, Handler, Outcome, Registry};
    use crate::error::{Error, Result};
    use crate::repo::testing::temp_store;
    use crate::resolver::StoreResolver;

    fn dispatcher_with(registry: Registry) -> (tempfile::TempDir, Dispatcher) {
        let (dir, store) = temp_store();
        let settings = Settings {
            domain: "local.example".to_string(),
            server_actor: "@local.example".to_string(),
            flag_reasons: vec![],
        };
        let resolver = StoreResolver::new(store.actors.clone(), "local.example");
        let dispatcher = Dispatcher::new(store, settings, Box::new(resolver), registry);
        (dir, dispatcher)
    }

    struct Marker(&'static str);

    impl Handler for Marker {
        fn call(
            &self,
            _cx: &Context<'_>,
            _envelope: &Envelope,
            activity: &mut Activity,
        ) -> Result<Outcome> {
            activity.object_id = Some(self.0.to_string());
            Ok(Outcome::applied())
        }
    }

    struct Failing;

    impl Handler for Failing {
        fn call(
            &self,
            _cx: &Context<'_>,
            _envelope: &Envelope,
            _activity: &mut Activity,
        ) -> Result<Outcome> {
            Err(Error::Conflict("blocked".to_string()))
        }
    }

    #[test]
    fn duplicate_keys_collapse_to_first() {
        let mut registry = Registry::empty();
        registry.insert(Verb::Join, Bucket::new(Marker("first")));
        let (_dir, dispatcher) = dispatcher_with(registry);

        let envelope = Envelope::new(Verb::Join, "@alice@local.example").with_dedupe_key("k1");
        let first = dispatcher.dispatch(&envelope).unwrap();
        assert!(first.changed);
        let second = dispatcher.dispatch(&envelope).unwrap();
        assert!(second.duplicated);
        assert!(!second.changed);
        assert_eq!(second.activity.id, first.activity.id);
    }

    #[test]
    fn unsupported_verb_is_fatal() {
        let (_dir, dispatcher) = dispatcher_with(Registry::empty());
        let envelope = Envelope::new(Verb::Join, "@alice@local.example");
        assert!(matches!(
            dispatcher.dispatch(&envelope),
            Err(Error::UnsupportedVerb(_))
        ));
    }

    #[test]
    fn subtype_overrides_default() {
        let mut registry = Registry::empty();
        registry.insert(
            Verb::Add,
            Bucket::new(Marker("default")).with_subtype(ObjectType::Event, Marker("event")),
        );
        let (_dir, dispatcher) = dispatcher_with(registry);

        let envelope = Envelope::new(Verb::Add, "@alice@local.example");
        let result = dispatcher.dispatch(&envelope).unwrap();
        assert_eq!(result.activity.object_id.as_deref(), Some("default"));

        let envelope = envelope.with_object_type("event");
        let result = dispatcher.dispatch(&envelope).unwrap();
        assert_eq!(result.activity.object_id.as_deref(), Some("event"));

        // unknown subtype strings fall back to the default handler
        let envelope = Envelope::new(Verb::Add, "@alice@local.example").with_object_type("widget");
        let result = dispatcher.dispatch(&envelope).unwrap();
        assert_eq!(result.activity.object_id.as_deref(), Some("default"));
    }

    #[test]
    fn business_error_is_reported_not_persisted() {
        let mut registry = Registry::empty();
        registry.insert(Verb::Join, Bucket::new(Failing));
        let (_dir, dispatcher) = dispatcher_with(registry);

        let envelope = Envelope::new(Verb::Join, "@alice@local.example").with_dedupe_key("k2");
        let result = dispatcher.dispatch(&envelope).unwrap();
        assert_eq!(result.error.as_deref(), Some("conflict: blocked"));

        // nothing persisted: the same dedupe key does not collapse
        let retry = dispatcher.dispatch(&envelope).unwrap();
        assert!(!retry.duplicated);
    }

    #[test]
    fn failing_before_hook_is_not_fatal() {
        let mut registry = Registry::empty();
        registry.insert(
            Verb::Join,
            Bucket::new(Marker("ran"))
                .with_before(|_| Err(Error::Validation("ignored".to_string()))),
        );
        let (_dir, dispatcher) = dispatcher_with(registry);
        let envelope = Envelope::new(Verb::Join, "@alice@local.example");
        let result = dispatcher.dispatch(&envelope).unwrap();
        assert_eq!(result.activity.object_id.as_deref(), Some("ran"));
    }

    #[test]
    fn after_hook_sees_final_result() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let seen = Arc::new(AtomicBool::new(false));
        let seen_in_hook = seen.clone();
        let mut registry = Registry::empty();
        registry.insert(
            Verb::Join,
            Bucket::new(Marker("x")).with_after(move |dispatch: &Dispatch| {
                if dispatch.changed {
                    seen_in_hook.store(true, Ordering::SeqCst);
                }
            }),
        );
        let (_dir, dispatcher) = dispatcher_with(registry);
        dispatcher
            .dispatch(&Envelope::new(Verb::Join, "@alice@local.example"))
            .unwrap();
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn handler_mutations_are_persisted() {
        let mut registry = Registry::empty();
        registry.insert(Verb::Join, Bucket::new(Marker("obj-1")));
        let (_dir, dispatcher) = dispatcher_with(registry);
        let envelope = Envelope::new(Verb::Join, "@alice@local.example")
            .with_object(json!({"id": "thing"}));
        let result = dispatcher.dispatch(&envelope).unwrap();
        let stored = dispatcher
            .store
            .activities
            .find_one(&result.activity.id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.object_id.as_deref(), Some("obj-1"));
    }
}
