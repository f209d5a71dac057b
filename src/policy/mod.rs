//! Audience and capability policy.
//!
//! Pure classification: the same inputs always produce the same booleans,
//! whether evaluated synchronously for one request or in a batch fan-out
//! worker. Nothing in here mutates state.
//!
//! Private membership never leaves the server: a remote viewer is checked
//! against explicit grants, not against the circle composition itself.

use std::collections::{BTreeMap, BTreeSet};

use crate::actor_id::domain_of;
use crate::container::Role;
use crate::error::Result;
use crate::repo::ContainerRepo;

/// The `to` token that makes an object world-readable.
pub const PUBLIC_TOKEN: &str = "@public";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// Coarse visibility class of an addressing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudienceClass<'a> {
    /// Anyone, authenticated or not.
    Public,
    /// Any authenticated viewer of the named domain.
    Server(&'a str),
    /// Members of the named container; the token is never disclosed.
    Audience(&'a str),
}

pub fn classify_audience(token: &str) -> AudienceClass<'_> {
    if token.eq_ignore_ascii_case(PUBLIC_TOKEN) {
        return AudienceClass::Public;
    }
    if let Some(rest) = token.strip_prefix('@')
        && !rest.contains('@')
    {
        return AudienceClass::Server(rest);
    }
    AudienceClass::Audience(token)
}

/// Who may reply/react, per the object's capability token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityClass<'a> {
    Public,
    Followers,
    Audience(&'a str),
    None,
}

pub fn classify_capability(token: &str) -> CapabilityClass<'_> {
    match token {
        "public" => CapabilityClass::Public,
        "followers" => CapabilityClass::Followers,
        "none" | "" => CapabilityClass::None,
        other => CapabilityClass::Audience(other),
    }
}

/// Precomputed lookup data the policy functions evaluate against. Built once
/// per request or per fan-out batch; both call sites see identical answers
/// because the data, not the call site, decides.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    /// author id -> ids of actors following them.
    followers: BTreeMap<String, BTreeSet<String>>,
    /// audience token -> local member ids.
    audiences: BTreeMap<String, BTreeSet<String>>,
    /// (audience token, remote viewer id) pairs with a signed external grant.
    grants: BTreeSet<(String, String)>,
}

impl PolicyContext {
    pub fn add_follower(&mut self, author: impl Into<String>, follower: impl Into<String>) {
        self.followers
            .entry(author.into())
            .or_default()
            .insert(follower.into());
    }

    pub fn add_audience_member(&mut self, token: impl Into<String>, member: impl Into<String>) {
        self.audiences
            .entry(token.into())
            .or_default()
            .insert(member.into());
    }

    pub fn add_grant(&mut self, token: impl Into<String>, viewer: impl Into<String>) {
        self.grants.insert((token.into(), viewer.into()));
    }

    pub fn is_follower(&self, author: &str, viewer: &str) -> bool {
        self.followers
            .get(author)
            .is_some_and(|set| set.contains(viewer))
    }

    pub fn is_audience_member(&self, token: &str, viewer: &str) -> bool {
        self.audiences
            .get(token)
            .is_some_and(|set| set.contains(viewer))
    }

    pub fn has_grant(&self, token: &str, viewer: &str) -> bool {
        self.grants
            .contains(&(token.to_string(), viewer.to_string()))
    }

    /// Batch builder: invert every Following circle into the follower map and
    /// collect local membership for the given audience tokens. Group/event
    /// tokens count admins plus every non-blocked membership list.
    pub fn load(containers: &ContainerRepo, tokens: &[&str]) -> Result<PolicyContext> {
        let mut ctx = PolicyContext::default();
        for circle in containers.following_circles()? {
            for member in &circle.members {
                ctx.add_follower(member.id.clone(), circle.owner.clone());
            }
        }
        for &token in tokens {
            if let Some(circle) = containers.find_circle(token)? {
                for member in &circle.members {
                    ctx.add_audience_member(token, member.id.clone());
                }
                continue;
            }
            if let Some(roster) = containers.find_roster(token)? {
                for list in &roster.lists {
                    if list.role == Role::Blocked || list.role == Role::Invited {
                        continue;
                    }
                    for member in &list.members {
                        ctx.add_audience_member(token, member.id.clone());
                    }
                }
            }
        }
        Ok(ctx)
    }
}

/// Visibility: may `viewer` (None = unauthenticated) see an object addressed
/// with `token`?
pub fn can_view(viewer: Option<&str>, token: &str, origin: Origin, ctx: &PolicyContext) -> bool {
    match classify_audience(token) {
        AudienceClass::Public => true,
        AudienceClass::Server(server_domain) => match viewer {
            Some(viewer) => domain_of(viewer) == Some(server_domain),
            None => false,
        },
        AudienceClass::Audience(audience) => match (viewer, origin) {
            (Some(viewer), Origin::Local) => ctx.is_audience_member(audience, viewer),
            (Some(viewer), Origin::Remote) => ctx.has_grant(audience, viewer),
            (None, _) => false,
        },
    }
}

/// Interaction: may `viewer` exercise the capability (reply, react) the
/// author granted via `token`? Accountability requires authentication:
/// unauthenticated viewers get `false` for every token, including `public`.
pub fn evaluate_capability(
    viewer: Option<&str>,
    author: &str,
    token: &str,
    origin: Origin,
    ctx: &PolicyContext,
) -> bool {
    let Some(viewer) = viewer else {
        return false;
    };
    match classify_capability(token) {
        CapabilityClass::Public => true,
        CapabilityClass::Followers => ctx.is_follower(author, viewer),
        CapabilityClass::Audience(audience) => match origin {
            Origin::Local => ctx.is_audience_member(audience, viewer),
            Origin::Remote => ctx.has_grant(audience, viewer),
        },
        CapabilityClass::None => false,
    }
}
