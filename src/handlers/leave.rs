use crate::activity::{Activity, Envelope};
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{blocked_guard, deleted_guard, record_side_effects, resolve_member};

/// Leave a group or event: pull the actor from every participation list.
/// Leaving something the actor never joined is a no-op. Admin membership is
/// not touched; stepping down as admin is a Remove against the admins circle.
pub struct LeaveHandler;

impl Handler for LeaveHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let target = envelope
            .target
            .as_deref()
            .ok_or_else(|| Error::Validation("Leave requires a target".to_string()))?;
        let actor = resolve_member(cx, &envelope.actor_id)?;

        let actor_id = envelope.actor_id.clone();
        let result = cx.store.containers.update_roster(target, move |roster| {
            deleted_guard(roster.deleted)?;
            blocked_guard(roster.is_blocked(&actor_id))?;
            let sources = roster.kind.leave_roles();
            Ok(roster.pull_all(&actor_id, sources))
        })?;
        let Some(moved) = result else {
            return Ok(Outcome::deferred());
        };
        activity.object_id = Some(envelope.actor_id.clone());
        if moved.from.is_empty() {
            return Ok(Outcome::unchanged());
        }
        record_side_effects(activity, &envelope.actor_id, &moved);
        Ok(Outcome::applied().with_federate(!actor.local))
    }
}
