use crate::activity::{Activity, Envelope};
use crate::container::{Role, RosterKind};
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{blocked_guard, deleted_guard, record_side_effects, resolve_member, state_hint};

/// Accept an invitation: `invited` -> `attending`/`interested` (events) or
/// `members` (groups). The destination may be hinted via `object.state` or
/// the activity's `objectType`.
pub struct AcceptHandler;

impl Handler for AcceptHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let target = envelope
            .target
            .as_deref()
            .ok_or_else(|| Error::Validation("Accept requires a target".to_string()))?;
        let actor = resolve_member(cx, &envelope.actor_id)?;
        let hint = state_hint(&envelope.payload(), envelope.object_type.as_deref());

        let actor_id = envelope.actor_id.clone();
        let member = actor.member.clone();
        let result = cx.store.containers.update_roster(target, move |roster| {
            deleted_guard(roster.deleted)?;
            blocked_guard(roster.is_blocked(&actor_id))?;
            let dest = hint.unwrap_or_else(|| roster.kind.default_destination());
            if roster.list(dest).is_none() {
                return Err(Error::Validation(format!(
                    "state {:?} does not exist on this container",
                    dest.as_str()
                )));
            }
            if roster.contains(dest, &actor_id) {
                // idempotent: already accepted
                return Ok(None);
            }
            let sources: &[Role] = if roster.kind == RosterKind::Event && dest == Role::Attending {
                &[Role::Invited, Role::Interested]
            } else {
                &[Role::Invited]
            };
            if !sources.iter().any(|&role| roster.contains(role, &actor_id)) {
                return Err(Error::Conflict("actor has not been invited".to_string()));
            }
            Ok(Some(roster.transition(&actor_id, sources, dest, member.clone())))
        })?;

        // No such roster here: the target lives on another server.
        let Some(result) = result else {
            return Ok(Outcome::deferred());
        };
        activity.object_id = Some(envelope.actor_id.clone());
        match result {
            None => Ok(Outcome::unchanged()),
            Some(moved) => {
                record_side_effects(activity, &envelope.actor_id, &moved);
                Ok(Outcome::applied().with_federate(!actor.local))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::activity::{Envelope, Verb};
    use crate::container::{Member, Role, Roster, RosterKind};
    use crate::handlers::testing::{DOMAIN, actor, engine};

    const EVENT: &str = "event:77@local.example";

    fn invite_only_event(store: &crate::repo::Store) {
        let mut roster = Roster::new(EVENT, RosterKind::Event);
        roster.push(Role::Invited, Member::stub(actor("bob"), DOMAIN));
        roster.push(Role::Blocked, Member::stub(actor("dan"), DOMAIN));
        store.containers.insert_roster(&roster).unwrap();
    }

    #[test]
    fn accept_moves_invited_to_attending() {
        let (_dir, store, dispatcher) = engine();
        invite_only_event(&store);

        let result = dispatcher
            .dispatch(&Envelope::new(Verb::Accept, actor("bob")).with_target(EVENT))
            .unwrap();
        assert!(result.changed);
        assert!(!result.federate);
        assert_eq!(result.activity.object_id.as_deref(), Some(actor("bob").as_str()));
        let effects = result.activity.side_effects.unwrap();
        assert_eq!(effects.from, vec![Role::Invited]);
        assert_eq!(effects.to, Some(Role::Attending));

        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert_eq!(roster.state_of(&actor("bob")), Some(Role::Attending));
    }

    #[test]
    fn second_accept_is_a_noop() {
        let (_dir, store, dispatcher) = engine();
        invite_only_event(&store);

        let envelope = Envelope::new(Verb::Accept, actor("bob")).with_target(EVENT);
        assert!(dispatcher.dispatch(&envelope).unwrap().changed);
        let second = dispatcher.dispatch(&envelope).unwrap();
        assert!(!second.changed);
        assert!(second.error.is_none());

        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        let attending = roster.list(Role::Attending).unwrap();
        assert_eq!(attending.members.len(), 1);
    }

    #[test]
    fn accept_respects_state_hint() {
        let (_dir, store, dispatcher) = engine();
        invite_only_event(&store);

        let envelope = Envelope::new(Verb::Accept, actor("bob"))
            .with_target(EVENT)
            .with_object(json!({"state": "interested"}));
        assert!(dispatcher.dispatch(&envelope).unwrap().changed);
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert_eq!(roster.state_of(&actor("bob")), Some(Role::Interested));

        // interested -> attending is a valid accept
        let upgrade = Envelope::new(Verb::Accept, actor("bob")).with_target(EVENT);
        assert!(dispatcher.dispatch(&upgrade).unwrap().changed);
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert_eq!(roster.state_of(&actor("bob")), Some(Role::Attending));
    }

    #[test]
    fn uninvited_accept_is_rejected() {
        let (_dir, store, dispatcher) = engine();
        invite_only_event(&store);
        let result = dispatcher
            .dispatch(&Envelope::new(Verb::Accept, actor("carol")).with_target(EVENT))
            .unwrap();
        assert!(result.error.is_some());
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert_eq!(roster.state_of(&actor("carol")), None);
    }

    #[test]
    fn blocked_actor_is_rejected_without_mutation() {
        let (_dir, store, dispatcher) = engine();
        invite_only_event(&store);
        let result = dispatcher
            .dispatch(&Envelope::new(Verb::Accept, actor("dan")).with_target(EVENT))
            .unwrap();
        assert!(result.error.is_some());
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert_eq!(roster.state_of(&actor("dan")), None);
    }

    #[test]
    fn unknown_target_defers_to_federation() {
        let (_dir, _store, dispatcher) = engine();
        let result = dispatcher
            .dispatch(
                &Envelope::new(Verb::Accept, actor("bob"))
                    .with_target("event:far@remote.example"),
            )
            .unwrap();
        assert!(result.federate);
        assert!(!result.changed);
        assert!(result.error.is_none());
    }

    #[test]
    fn group_accept_lands_in_members() {
        let (_dir, store, dispatcher) = engine();
        let group = "group:9@local.example";
        let mut roster = Roster::new(group, RosterKind::Group);
        roster.push(Role::Invited, Member::stub(actor("carol"), DOMAIN));
        store.containers.insert_roster(&roster).unwrap();

        let result = dispatcher
            .dispatch(&Envelope::new(Verb::Accept, actor("carol")).with_target(group))
            .unwrap();
        assert!(result.changed);
        let roster = store.containers.find_roster(group).unwrap().unwrap();
        assert!(roster.contains(Role::Members, &actor("carol")));
        assert!(!roster.contains(Role::Invited, &actor("carol")));
    }
}
