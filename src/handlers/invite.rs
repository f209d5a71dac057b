use crate::activity::{Activity, Envelope};
use crate::container::{Role, RosterKind};
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{blocked_guard, deleted_guard, record_side_effects, resolve_member};

/// Invite another actor into a group or event. Admins may always invite;
/// ordinary participants (group members, event attendees) may too.
pub struct InviteHandler;

impl Handler for InviteHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let target = envelope
            .target
            .as_deref()
            .ok_or_else(|| Error::Validation("Invite requires a target".to_string()))?;
        let payload = envelope.payload();
        let invitee_id = payload
            .node_id()
            .or(envelope.to.as_deref())
            .ok_or_else(|| Error::Validation("Invite requires an invitee".to_string()))?
            .to_string();
        let invitee = resolve_member(cx, &invitee_id)?;

        let inviter_id = envelope.actor_id.clone();
        let member = invitee.member.clone();
        let invitee_key = invitee_id.clone();
        let result = cx.store.containers.update_roster(target, move |roster| {
            deleted_guard(roster.deleted)?;
            blocked_guard(roster.is_blocked(&inviter_id))?;
            blocked_guard(roster.is_blocked(&invitee_key))?;
            let allowed = roster.is_admin(&inviter_id)
                || match roster.kind {
                    RosterKind::Group => roster.contains(Role::Members, &inviter_id),
                    RosterKind::Event => roster.contains(Role::Attending, &inviter_id),
                };
            if !allowed {
                return Err(Error::Authorization(
                    "actor may not invite to this container".to_string(),
                ));
            }
            if roster.contains(Role::Invited, &invitee_key) {
                return Ok(None);
            }
            if roster.state_of(&invitee_key).is_some() {
                return Err(Error::Conflict(
                    "invitee is already a participant".to_string(),
                ));
            }
            Ok(Some(roster.transition(
                &invitee_key,
                &[],
                Role::Invited,
                member.clone(),
            )))
        })?;

        let Some(result) = result else {
            return Ok(Outcome::deferred());
        };
        activity.object_id = Some(invitee_id.clone());
        match result {
            None => Ok(Outcome::unchanged()),
            Some(moved) => {
                record_side_effects(activity, &invitee_id, &moved);
                Ok(Outcome::applied().with_federate(!invitee.local))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::activity::{Envelope, Verb};
    use crate::container::{Member, Role, Roster, RosterKind};
    use crate::handlers::testing::{DOMAIN, actor, engine};

    const EVENT: &str = "event:21@local.example";

    fn event_with_attendee(store: &crate::repo::Store) {
        let mut roster = Roster::new(EVENT, RosterKind::Event);
        roster.push(Role::Attending, Member::stub(actor("alice"), DOMAIN));
        store.containers.insert_roster(&roster).unwrap();
    }

    fn invite(from: &str, to: String) -> Envelope {
        Envelope::new(Verb::Invite, actor(from))
            .with_target(EVENT)
            .with_to(to)
    }

    #[test]
    fn attendee_can_invite() {
        let (_dir, store, dispatcher) = engine();
        event_with_attendee(&store);

        let result = dispatcher.dispatch(&invite("alice", actor("bob"))).unwrap();
        assert!(result.changed);
        assert_eq!(result.activity.object_id.as_deref(), Some(actor("bob").as_str()));
        let effects = result.activity.side_effects.unwrap();
        assert_eq!(effects.to, Some(Role::Invited));
        assert_eq!(effects.member_id, actor("bob"));
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert!(roster.contains(Role::Invited, &actor("bob")));
    }

    #[test]
    fn outsider_cannot_invite() {
        let (_dir, store, dispatcher) = engine();
        event_with_attendee(&store);
        let result = dispatcher.dispatch(&invite("carol", actor("bob"))).unwrap();
        assert!(result.error.is_some());
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert!(!roster.contains(Role::Invited, &actor("bob")));
    }

    #[test]
    fn second_invite_does_not_duplicate() {
        let (_dir, store, dispatcher) = engine();
        event_with_attendee(&store);
        assert!(dispatcher.dispatch(&invite("alice", actor("bob"))).unwrap().changed);
        let second = dispatcher.dispatch(&invite("alice", actor("bob"))).unwrap();
        assert!(!second.changed);
        assert!(second.error.is_none());
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        let invited = roster.list(Role::Invited).unwrap();
        assert_eq!(invited.members.len(), 1);
    }

    #[test]
    fn inviting_a_participant_is_a_conflict() {
        let (_dir, store, dispatcher) = engine();
        let mut roster = Roster::new(EVENT, RosterKind::Event);
        roster.push(Role::Attending, Member::stub(actor("alice"), DOMAIN));
        roster.push(Role::Interested, Member::stub(actor("bob"), DOMAIN));
        store.containers.insert_roster(&roster).unwrap();

        let result = dispatcher.dispatch(&invite("alice", actor("bob"))).unwrap();
        assert!(result.error.is_some());
    }

    #[test]
    fn blocked_invitee_is_rejected() {
        let (_dir, store, dispatcher) = engine();
        let mut roster = Roster::new(EVENT, RosterKind::Event);
        roster.push(Role::Attending, Member::stub(actor("alice"), DOMAIN));
        roster.push(Role::Blocked, Member::stub(actor("dan"), DOMAIN));
        store.containers.insert_roster(&roster).unwrap();

        let result = dispatcher.dispatch(&invite("alice", actor("dan"))).unwrap();
        assert!(result.error.is_some());
        let roster = store.containers.find_roster(EVENT).unwrap().unwrap();
        assert!(!roster.contains(Role::Invited, &actor("dan")));
    }

    #[test]
    fn remote_invitee_sets_federate() {
        let (_dir, store, dispatcher) = engine();
        event_with_attendee(&store);
        let result = dispatcher
            .dispatch(&invite("alice", "@eve@remote.example".to_string()))
            .unwrap();
        assert!(result.changed);
        assert!(result.federate);
    }
}
