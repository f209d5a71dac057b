use crate::activity::{Activity, Envelope, SideEffects};
use crate::container::{Role, RosterKind};
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{
    CircleTarget, authorize_circle, deleted_guard, is_remote, record_side_effects,
    resolve_circle_target,
};

/// Administratively pull an actor out of a container. Same authorization
/// rules as Add; removing an absent member is a no-op.
pub struct RemoveHandler;

impl Handler for RemoveHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let member_id = envelope
            .payload()
            .node_id()
            .ok_or_else(|| Error::Validation("Remove requires a member".to_string()))?
            .to_string();

        let changed = match resolve_circle_target(cx, envelope)? {
            CircleTarget::Standalone(circle_id) => {
                let circle = cx
                    .store
                    .containers
                    .find_circle(&circle_id)?
                    .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
                authorize_circle(cx, &envelope.actor_id, &circle)?;
                let member_key = member_id.clone();
                let changed = cx
                    .store
                    .containers
                    .update_circle(&circle_id, move |circle| {
                        deleted_guard(circle.deleted)?;
                        Ok(circle.pull_if_present(&member_key).is_some())
                    })?
                    .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
                if changed {
                    activity.side_effects = Some(SideEffects {
                        from: vec![],
                        to: None,
                        from_circle_ids: vec![circle_id],
                        to_circle_id: None,
                        member_id: member_id.clone(),
                    });
                }
                changed
            }
            CircleTarget::Embedded {
                roster_id, role, ..
            } => {
                let caller = envelope.actor_id.clone();
                let member_key = member_id.clone();
                let moved = cx
                    .store
                    .containers
                    .update_roster(&roster_id, move |roster| {
                        deleted_guard(roster.deleted)?;
                        if !roster.is_admin(&caller) {
                            return Err(Error::Authorization(
                                "actor may not modify this container".to_string(),
                            ));
                        }
                        let mut moved = roster.pull_all(&member_key, &[role]);
                        // membership requests of a group park in pending; a
                        // removal aimed at the primary list also clears those
                        if moved.from.is_empty() && roster.kind == RosterKind::Group {
                            moved = roster.pull_all(&member_key, &[Role::Pending]);
                        }
                        Ok(moved)
                    })?
                    .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
                record_side_effects(activity, &member_id, &moved);
                !moved.from.is_empty()
            }
        };

        let remote = is_remote(cx, &member_id);
        activity.object_id = Some(member_id);
        if changed {
            Ok(Outcome::applied().with_federate(remote))
        } else {
            Ok(Outcome::unchanged())
        }
    }
}
