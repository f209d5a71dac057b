//! Verb handlers: the container state machine.

mod accept;
mod add;
mod flag;
mod follow;
mod invite;
mod join;
mod leave;
mod reject;
mod remove;

pub use accept::AcceptHandler;
pub use add::AddHandler;
pub use flag::FlagHandler;
pub use follow::FollowHandler;
pub use invite::InviteHandler;
pub use join::JoinHandler;
pub use leave::LeaveHandler;
pub use reject::RejectHandler;
pub use remove::RemoveHandler;

use crate::activity::{Activity, SideEffects};
use crate::actor_id::{ActorId, domain_of};
use crate::container::{Member, Moved, Role};
use crate::engine::Context;
use crate::error::{Error, Result};

/// A resolved participant: parsed id, a Member snapshot (hydrated locally or
/// a minimal remote stub), and whether the actor was locally resolvable.
pub(crate) struct Resolved {
    pub id: ActorId,
    pub member: Member,
    pub local: bool,
}

pub(crate) fn resolve_member(cx: &Context<'_>, id: &str) -> Result<Resolved> {
    let parsed: ActorId = id.parse()?;
    match cx.resolver.resolve(&parsed)? {
        Some(member) => Ok(Resolved {
            id: parsed,
            member,
            local: true,
        }),
        None => {
            let member = Member::stub(id, parsed.domain.clone());
            Ok(Resolved {
                id: parsed,
                member,
                local: false,
            })
        }
    }
}

pub(crate) fn is_remote(cx: &Context<'_>, id: &str) -> bool {
    domain_of(id).is_none_or(|domain| domain != cx.settings.domain)
}

/// Record what a transition touched so Undo can reverse exactly this step.
pub(crate) fn record_side_effects(activity: &mut Activity, member_id: &str, moved: &Moved) {
    if moved.from.is_empty()
        && moved.from_circle_ids.is_empty()
        && moved.to.is_none()
        && moved.to_circle_id.is_none()
    {
        return;
    }
    activity.side_effects = Some(SideEffects {
        from: moved.from.clone(),
        to: moved.to,
        from_circle_ids: moved.from_circle_ids.clone(),
        to_circle_id: moved.to_circle_id.clone(),
        member_id: member_id.to_string(),
    });
}

/// What an Add/Remove is aimed at: a standalone circle, or a list embedded
/// in a group/event roster (addressed either by the list's circle id or by
/// the roster id itself via `to`).
pub(crate) enum CircleTarget {
    Standalone(String),
    Embedded {
        roster_id: String,
        role: Role,
        circle_id: String,
    },
}

pub(crate) fn resolve_circle_target(cx: &Context<'_>, envelope: &crate::activity::Envelope) -> Result<CircleTarget> {
    if let Some(target) = envelope.target.as_deref() {
        if cx.store.containers.find_circle(target)?.is_some() {
            return Ok(CircleTarget::Standalone(target.to_string()));
        }
        if let Some(roster_id) = cx.store.containers.roster_of_circle(target)? {
            let roster = cx
                .store
                .containers
                .find_roster(&roster_id)?
                .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
            let list = roster
                .lists
                .iter()
                .find(|l| l.circle_id == target)
                .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
            return Ok(CircleTarget::Embedded {
                roster_id,
                role: list.role,
                circle_id: target.to_string(),
            });
        }
        return Err(Error::NotFound("no such container".to_string()));
    }
    if let Some(to) = envelope.to.as_deref() {
        let roster = cx
            .store
            .containers
            .find_roster(to)?
            .ok_or_else(|| Error::NotFound("no such container".to_string()))?;
        let role = roster.kind.default_destination();
        let circle_id = roster
            .circle_id(role)
            .ok_or_else(|| Error::NotFound("no such container".to_string()))?
            .to_string();
        return Ok(CircleTarget::Embedded {
            roster_id: to.to_string(),
            role,
            circle_id,
        });
    }
    Err(Error::Validation(format!(
        "{} requires a target container",
        envelope.verb.as_str()
    )))
}

/// Authorization for mutating a standalone circle. Checked against the
/// owner kind recorded on the circle itself.
pub(crate) fn authorize_circle(
    cx: &Context<'_>,
    caller: &str,
    circle: &crate::container::Circle,
) -> Result<()> {
    use crate::container::{CircleKind, OwnerKind};

    let denied = || Error::Authorization("actor may not modify this container".to_string());
    match circle.owner_kind {
        OwnerKind::User => {
            if caller == circle.owner {
                return Ok(());
            }
            Err(denied())
        }
        OwnerKind::Server => {
            if circle.owner != cx.settings.server_actor {
                return Err(denied());
            }
            let admins = cx
                .store
                .containers
                .find_circle_by_owner(&circle.owner, CircleKind::Admins)?;
            if admins.is_some_and(|c| c.contains(caller)) {
                return Ok(());
            }
            // the mods circle also accepts changes from its own members
            if circle.kind == Some(CircleKind::Mods) {
                let mods = cx
                    .store
                    .containers
                    .find_circle_by_owner(&circle.owner, CircleKind::Mods)?;
                if mods.is_some_and(|c| c.contains(caller)) {
                    return Ok(());
                }
            }
            Err(denied())
        }
        OwnerKind::Group | OwnerKind::Event => {
            let roster = cx.store.containers.find_roster(&circle.owner)?;
            if roster.is_some_and(|r| r.is_admin(caller)) {
                return Ok(());
            }
            Err(denied())
        }
    }
}

pub(crate) fn deleted_guard(deleted: bool) -> Result<()> {
    if deleted {
        return Err(Error::Conflict("target no longer exists".to_string()));
    }
    Ok(())
}

pub(crate) fn blocked_guard(blocked: bool) -> Result<()> {
    if blocked {
        return Err(Error::Conflict(
            "actor is blocked from this container".to_string(),
        ));
    }
    Ok(())
}

/// Destination-state hint: `object.state`, falling back to the activity's
/// `objectType`.
pub(crate) fn state_hint(
    payload: &crate::activity::Payload<'_>,
    object_type: Option<&str>,
) -> Option<Role> {
    payload
        .get_str("state")
        .and_then(Role::from_state)
        .or_else(|| object_type.and_then(Role::from_state))
}

#[cfg(test)]
pub(crate) mod testing {
    use tempfile::TempDir;

    use crate::config::{ReasonDef, Settings};
    use crate::container::Member;
    use crate::engine::{Dispatcher, Registry};
    use crate::repo::Store;
    use crate::repo::testing::temp_store;
    use crate::resolver::StoreResolver;

    pub(crate) const DOMAIN: &str = "local.example";

    /// A dispatcher over a temporary store with the standard registry, plus
    /// a handful of known local actors.
    pub(crate) fn engine() -> (TempDir, Store, Dispatcher) {
        let (dir, store) = temp_store();
        for handle in ["alice", "bob", "carol", "dan"] {
            let id = format!("@{handle}@{DOMAIN}");
            let mut member = Member::stub(&id, DOMAIN);
            member.name = Some(handle.to_string());
            store.actors.insert(&member).unwrap();
        }
        let settings = Settings {
            domain: DOMAIN.to_string(),
            server_actor: format!("@{DOMAIN}"),
            flag_reasons: vec![
                ReasonDef {
                    code: "spam".to_string(),
                    label: "Spam".to_string(),
                    description: "Unsolicited advertising".to_string(),
                },
                ReasonDef {
                    code: "other".to_string(),
                    label: "Other".to_string(),
                    description: String::new(),
                },
            ],
        };
        let resolver = StoreResolver::new(store.actors.clone(), DOMAIN);
        let dispatcher = Dispatcher::new(
            store.clone(),
            settings,
            Box::new(resolver),
            Registry::standard(),
        );
        (dir, store, dispatcher)
    }

    pub(crate) fn actor(handle: &str) -> String {
        format!("@{handle}@{DOMAIN}")
    }
}
