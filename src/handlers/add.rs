use crate::activity::{Activity, Envelope, SideEffects};
use crate::container::Role;
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{
    CircleTarget, authorize_circle, deleted_guard, record_side_effects, resolve_circle_target,
    resolve_member,
};

/// Administratively place an actor into a container, bypassing the
/// invitation flow. Authorization depends on who owns the container.
pub struct AddHandler;

impl Handler for AddHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let member_id = envelope
            .payload()
            .node_id()
            .ok_or_else(|| Error::Validation("Add requires a member".to_string()))?
            .to_string();
        let member = resolve_member(cx, &member_id)?;

        let changed = match resolve_circle_target(cx, envelope)? {
            CircleTarget::Standalone(circle_id) => {
                let circle = cx
                    .store
                    .containers
                    .find_circle(&circle_id)?
                    .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
                authorize_circle(cx, &envelope.actor_id, &circle)?;
                let snapshot = member.member.clone();
                let changed = cx
                    .store
                    .containers
                    .update_circle(&circle_id, move |circle| {
                        deleted_guard(circle.deleted)?;
                        Ok(circle.push_if_absent(snapshot.clone()))
                    })?
                    .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
                if changed {
                    activity.side_effects = Some(SideEffects {
                        from: vec![],
                        to: None,
                        from_circle_ids: vec![],
                        to_circle_id: Some(circle_id),
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
                let snapshot = member.member.clone();
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
                        // placing into an exclusive list also clears the
                        // other exclusive lists
                        let sources: &[Role] = if roster.kind.exclusive_roles().contains(&role) {
                            roster.kind.exclusive_roles()
                        } else {
                            &[]
                        };
                        Ok(roster.transition(&member_key, sources, role, snapshot.clone()))
                    })?
                    .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
                record_side_effects(activity, &member_id, &moved);
                moved.to.is_some() || !moved.from.is_empty()
            }
        };

        activity.object_id = Some(member_id);
        if changed {
            Ok(Outcome::applied().with_federate(!member.local))
        } else {
            Ok(Outcome::unchanged())
        }
    }
}
