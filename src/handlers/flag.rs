use jiff::Timestamp;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::activity::{Activity, Envelope, SideEffects};
use crate::actor_id::{ActorId, domain_of};
use crate::config::{ReasonDef, Settings};
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};
use crate::repo::{Flag, FlagStatus, Reason};

use super::is_remote;

/// File a moderation report. Reasons are normalized against the server
/// taxonomy; repeat reports by the same actor for the same target and reason
/// collapse onto the already-open flag.
pub struct FlagHandler;

impl Handler for FlagHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let target = envelope
            .target
            .as_deref()
            .ok_or_else(|| Error::Validation("Flag requires a target".to_string()))?;
        let payload = envelope.payload();
        let reason_value = payload
            .get_value("reason")
            .ok_or_else(|| Error::Validation("Flag requires a reason".to_string()))?;
        let reason = normalize_reason(cx.settings, reason_value)?;

        if let Some(existing) = cx
            .store
            .flags
            .find_open(target, &envelope.actor_id, &reason.code)?
        {
            activity.object_id = Some(existing.id.clone());
            let object = flag_json(&existing);
            return Ok(Outcome {
                object: Some(object),
                changed: false,
                duplicated: true,
                federate: false,
                activity_persisted: false,
            });
        }

        let server = domain_of(target).unwrap_or(&cx.settings.domain).to_string();
        let target_type = envelope
            .object_type
            .clone()
            .or_else(|| {
                target
                    .parse::<ActorId>()
                    .ok()
                    .and_then(|id| id.object_type())
                    .map(|ty| ty.as_str().to_string())
            });
        let flag = Flag {
            id: format!("flag:{}@{}", Uuid::now_v7().simple(), cx.settings.domain),
            target: target.to_string(),
            target_type,
            target_actor_id: payload.get_node_iri("targetActorId").map(str::to_string),
            reason,
            notes: payload.get_str("notes").map(str::to_string),
            actor_id: envelope.actor_id.clone(),
            status: FlagStatus::Open,
            server,
            created_at: Timestamp::now().as_second(),
        };
        cx.store.flags.insert_open(&flag)?;

        activity.object_id = Some(flag.id.clone());
        activity.side_effects = Some(SideEffects {
            from: vec![],
            to: None,
            from_circle_ids: vec![],
            to_circle_id: None,
            member_id: flag.id.clone(),
        });
        let remote = is_remote(cx, target);
        Ok(Outcome::applied()
            .with_object(flag_json(&flag))
            .with_federate(remote))
    }
}

fn from_def(def: &ReasonDef, details: Option<String>) -> Reason {
    Reason {
        code: def.code.clone(),
        label: def.label.clone(),
        description: def.description.clone(),
        details,
    }
}

/// Resolve a raw reason (a code string, a label string, or an embedded
/// object) against the configured taxonomy. Unknown reasons fall back to the
/// `other` code with the original text kept as details.
fn normalize_reason(settings: &Settings, value: &Value) -> Result<Reason> {
    match value {
        Value::String(text) => {
            if let Some(def) = settings
                .reason(text)
                .or_else(|| settings.reason_by_label(text))
            {
                return Ok(from_def(def, None));
            }
            fallback_other(settings, text)
        }
        Value::Object(map) => {
            let details = map
                .get("details")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(code) = map.get("code").and_then(Value::as_str) {
                if let Some(def) = settings.reason(code) {
                    return Ok(from_def(def, details));
                }
                return fallback_other(settings, code);
            }
            if let Some(label) = map.get("label").and_then(Value::as_str) {
                if let Some(def) = settings.reason_by_label(label) {
                    return Ok(from_def(def, details));
                }
                return fallback_other(settings, label);
            }
            Err(Error::Validation("malformed flag reason".to_string()))
        }
        _ => Err(Error::Validation("malformed flag reason".to_string())),
    }
}

fn fallback_other(settings: &Settings, text: &str) -> Result<Reason> {
    let def = settings
        .reason("other")
        .ok_or_else(|| Error::Validation(format!("unknown flag reason {text:?}")))?;
    Ok(from_def(def, Some(text.to_string())))
}

fn flag_json(flag: &Flag) -> Value {
    json!({
        "id": flag.id,
        "target": flag.target,
        "targetType": flag.target_type,
        "targetActorId": flag.target_actor_id,
        "reason": {
            "code": flag.reason.code,
            "label": flag.reason.label,
            "details": flag.reason.details,
        },
        "notes": flag.notes,
        "actorId": flag.actor_id,
        "status": match flag.status {
            FlagStatus::Open => "open",
            FlagStatus::Resolved => "resolved",
        },
        "server": flag.server,
        "createdAt": flag.created_at,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::activity::{Envelope, Verb};
    use crate::handlers::testing::{actor, engine};

    const POST: &str = "post:99@local.example";

    fn flag(reason: serde_json::Value) -> Envelope {
        Envelope::new(Verb::Flag, actor("alice"))
            .with_target(POST)
            .with_object(json!({"reason": reason}))
    }

    #[test]
    fn flag_creates_an_open_report() {
        let (_dir, store, dispatcher) = engine();
        let result = dispatcher.dispatch(&flag(json!("spam"))).unwrap();
        assert!(result.changed);
        assert!(!result.duplicated);
        assert!(!result.federate);

        let flag_id = result.activity.object_id.unwrap();
        let stored = store.flags.find_one(&flag_id).unwrap().unwrap();
        assert_eq!(stored.reason.code, "spam");
        assert_eq!(stored.reason.label, "Spam");
        assert_eq!(stored.actor_id, actor("alice"));
        assert_eq!(stored.server, "local.example");
        assert_eq!(stored.target_type.as_deref(), Some("post"));

        let object = result.object.unwrap();
        assert_eq!(object["status"], "open");
        assert_eq!(object["reason"]["code"], "spam");
    }

    #[test]
    fn repeat_report_collapses_onto_open_flag() {
        let (_dir, _store, dispatcher) = engine();
        let first = dispatcher.dispatch(&flag(json!("spam"))).unwrap();
        let second = dispatcher.dispatch(&flag(json!("spam"))).unwrap();
        assert!(second.duplicated);
        assert!(!second.changed);
        assert_eq!(second.activity.object_id, first.activity.object_id);
        // no side effects on the duplicate, so an Undo of the second report
        // cannot resolve the first one
        assert!(second.activity.side_effects.is_none());
    }

    #[test]
    fn resolving_reopens_the_dedupe_slot() {
        let (_dir, store, dispatcher) = engine();
        let first = dispatcher.dispatch(&flag(json!("spam"))).unwrap();
        let flag_id = first.activity.object_id.unwrap();
        assert!(store.flags.resolve(&flag_id).unwrap());

        let fresh = dispatcher.dispatch(&flag(json!("spam"))).unwrap();
        assert!(fresh.changed);
        assert!(!fresh.duplicated);
        assert_ne!(fresh.activity.object_id.as_deref(), Some(flag_id.as_str()));
    }

    #[test]
    fn different_reasons_are_distinct_reports() {
        let (_dir, _store, dispatcher) = engine();
        assert!(dispatcher.dispatch(&flag(json!("spam"))).unwrap().changed);
        let other = dispatcher.dispatch(&flag(json!("harassment"))).unwrap();
        // unknown reason normalized to `other`, still its own slot
        assert!(other.changed);
        assert!(!other.duplicated);
    }

    #[test]
    fn unknown_reason_falls_back_to_other_with_details() {
        let (_dir, store, dispatcher) = engine();
        let result = dispatcher.dispatch(&flag(json!("harassment"))).unwrap();
        let stored = store
            .flags
            .find_one(result.activity.object_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.reason.code, "other");
        assert_eq!(stored.reason.details.as_deref(), Some("harassment"));
    }

    #[test]
    fn embedded_reason_object() {
        let (_dir, store, dispatcher) = engine();
        let envelope = Envelope::new(Verb::Flag, actor("bob"))
            .with_target(POST)
            .with_object(json!({
                "reason": {"code": "spam", "details": "bot ring"},
                "notes": "third time this week",
                "targetActorId": "@mallory@local.example"
            }));
        let result = dispatcher.dispatch(&envelope).unwrap();
        let stored = store
            .flags
            .find_one(result.activity.object_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(stored.reason.code, "spam");
        assert_eq!(stored.reason.details.as_deref(), Some("bot ring"));
        assert_eq!(stored.notes.as_deref(), Some("third time this week"));
        assert_eq!(stored.target_actor_id.as_deref(), Some("@mallory@local.example"));
    }

    #[test]
    fn remote_target_sets_federate() {
        let (_dir, _store, dispatcher) = engine();
        let envelope = Envelope::new(Verb::Flag, actor("alice"))
            .with_target("post:4@remote.example")
            .with_object(json!({"reason": "spam"}));
        let result = dispatcher.dispatch(&envelope).unwrap();
        assert!(result.changed);
        assert!(result.federate);
    }

    #[test]
    fn missing_reason_is_a_validation_error() {
        let (_dir, _store, dispatcher) = engine();
        let envelope = Envelope::new(Verb::Flag, actor("alice"))
            .with_target(POST)
            .with_object(json!({}));
        let result = dispatcher.dispatch(&envelope).unwrap();
        assert!(result.error.is_some());
    }
}
