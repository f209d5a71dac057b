use crate::activity::{Activity, Envelope};
use crate::container::Role;
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{deleted_guard, record_side_effects, resolve_member};

/// Decline an invitation: pull the actor out of `invited`, nothing else.
/// Rejecting without an outstanding invitation is a no-op, not an error.
pub struct RejectHandler;

impl Handler for RejectHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let target = envelope
            .target
            .as_deref()
            .ok_or_else(|| Error::Validation("Reject requires a target".to_string()))?;
        let actor = resolve_member(cx, &envelope.actor_id)?;

        let actor_id = envelope.actor_id.clone();
        let result = cx.store.containers.update_roster(target, move |roster| {
            deleted_guard(roster.deleted)?;
            Ok(roster.pull_all(&actor_id, &[Role::Invited]))
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
