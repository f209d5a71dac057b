use jiff::Timestamp;
use uuid::Uuid;

use crate::activity::{Activity, Envelope, SideEffects};
use crate::container::{Circle, CircleKind, OwnerKind};
use crate::engine::{Context, Handler, Outcome};
use crate::error::{Error, Result};

use super::{deleted_guard, resolve_member};

/// Follow and Unfollow share one handler: both edit the caller's Following
/// circle (or an explicit target circle) and keep the per-domain federation
/// reference counters in step.
pub struct FollowHandler {
    unfollow: bool,
}

impl FollowHandler {
    pub fn follow() -> FollowHandler {
        FollowHandler { unfollow: false }
    }

    pub fn unfollow() -> FollowHandler {
        FollowHandler { unfollow: true }
    }
}

impl Handler for FollowHandler {
    fn call(
        &self,
        cx: &Context<'_>,
        envelope: &Envelope,
        activity: &mut Activity,
    ) -> Result<Outcome> {
        let payload = envelope.payload();
        let followee_id = payload
            .node_id()
            .or(envelope.to.as_deref())
            .ok_or_else(|| Error::Validation("Follow requires an object".to_string()))?
            .to_string();
        let followee = resolve_member(cx, &followee_id)?;

        let circle_id = match envelope.target.as_deref() {
            Some(target) => target.to_string(),
            None => {
                match cx
                    .store
                    .containers
                    .find_circle_by_owner(&envelope.actor_id, CircleKind::Following)?
                {
                    Some(circle) => circle.id,
                    None if self.unfollow => {
                        // nothing to unfollow from
                        activity.object_id = Some(followee_id);
                        return Ok(Outcome::unchanged());
                    }
                    None => {
                        let circle = Circle::new(
                            format!(
                                "circle:{}@{}",
                                Uuid::now_v7().simple(),
                                cx.settings.domain
                            ),
                            envelope.actor_id.clone(),
                            OwnerKind::User,
                            Some(CircleKind::Following),
                        );
                        cx.store.containers.insert_circle(&circle)?;
                        circle.id
                    }
                }
            }
        };

        let unfollow = self.unfollow;
        let caller = envelope.actor_id.clone();
        let member_key = followee_id.clone();
        let snapshot = followee.member.clone();
        let changed = cx
            .store
            .containers
            .update_circle(&circle_id, move |circle| {
                deleted_guard(circle.deleted)?;
                // an explicit target must still be the caller's own circle
                if circle.owner != caller {
                    return Err(Error::Authorization(
                        "actor may not modify this container".to_string(),
                    ));
                }
                if unfollow {
                    Ok(circle.pull_if_present(&member_key).is_some())
                } else {
                    Ok(circle.push_if_absent(snapshot.clone()))
                }
            })?
            .ok_or_else(|| Error::NotFound("no such circle".to_string()))?;

        let remote = !followee.local && !followee.id.is_local(&cx.settings.domain);
        if changed && remote {
            // maintain the remote domain's interest counters; server-wide
            // follows (`@domain`) count separately from per-actor follows
            let actor_ref = if followee.id.is_server() {
                None
            } else {
                Some(followee_id.as_str())
            };
            let now = Timestamp::now().as_second();
            cx.store.servers.update(&followee.id.domain, now, |server| {
                if unfollow {
                    server.remove_ref(actor_ref, now);
                } else {
                    server.add_ref(actor_ref, now);
                }
            })?;
        }

        if changed {
            activity.side_effects = Some(if unfollow {
                SideEffects {
                    from: vec![],
                    to: None,
                    from_circle_ids: vec![circle_id],
                    to_circle_id: None,
                    member_id: followee_id.clone(),
                }
            } else {
                SideEffects {
                    from: vec![],
                    to: None,
                    from_circle_ids: vec![],
                    to_circle_id: Some(circle_id),
                    member_id: followee_id.clone(),
                }
            });
        }
        activity.object_id = Some(followee_id);
        if changed {
            Ok(Outcome::applied().with_federate(remote))
        } else {
            Ok(Outcome::unchanged())
        }
    }
}
