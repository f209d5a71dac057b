use crate::activity::{Activity, Envelope};
use crate::container::{Role, RosterKind};
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{blocked_guard, deleted_guard, record_side_effects, resolve_member, state_hint};

/// Join a group or event.
///
/// Events are open: an uninvited actor lands in `interested`, an invited one
/// goes straight to the requested state (default `attending`). Groups are
/// invite-only; joining without an invitation is a conflict.
pub struct JoinHandler;

impl Handler for JoinHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let target = envelope
            .target
            .as_deref()
            .ok_or_else(|| Error::Validation("Join requires a target".to_string()))?;
        let actor = resolve_member(cx, &envelope.actor_id)?;
        let hint = state_hint(&envelope.payload(), envelope.object_type.as_deref());

        let actor_id = envelope.actor_id.clone();
        let member = actor.member.clone();
        let result = cx.store.containers.update_roster(target, move |roster| {
            deleted_guard(roster.deleted)?;
            blocked_guard(roster.is_blocked(&actor_id))?;
            match roster.kind {
                RosterKind::Event => {
                    if roster.contains(Role::Invited, &actor_id) {
                        let dest = hint.unwrap_or(Role::Attending);
                        if roster.list(dest).is_none() {
                            return Err(Error::Validation(format!(
                                "state {:?} does not exist on this container",
                                dest.as_str()
                            )));
                        }
                        if roster.contains(dest, &actor_id) {
                            return Ok(None);
                        }
                        let sources: &[Role] = if dest == Role::Attending {
                            &[Role::Invited, Role::Interested]
                        } else {
                            &[Role::Invited]
                        };
                        return Ok(Some(roster.transition(
                            &actor_id,
                            sources,
                            dest,
                            member.clone(),
                        )));
                    }
                    if roster.state_of(&actor_id).is_some() {
                        // already participating in some state
                        return Ok(None);
                    }
                    Ok(Some(roster.transition(
                        &actor_id,
                        &[],
                        Role::Interested,
                        member.clone(),
                    )))
                }
                RosterKind::Group => {
                    if roster.contains(Role::Members, &actor_id) {
                        return Ok(None);
                    }
                    if !roster.contains(Role::Invited, &actor_id) {
                        return Err(Error::Conflict(
                            "joining this group requires an invitation".to_string(),
                        ));
                    }
                    Ok(Some(roster.transition(
                        &actor_id,
                        &[Role::Invited, Role::Pending],
                        Role::Members,
                        member.clone(),
                    )))
                }
            }
        })?;

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
