//! Membership containers: generic circles and the rosters embedded in
//! groups and events.
//!
//! A roster keeps all of its named lists inside one document on purpose: a
//! transition that pulls an actor out of `invited` and pushes them into
//! `attending` is then a single-key atomic update at the storage layer, so
//! concurrent duplicate activities collapse to a no-op instead of
//! double-inserting or leaving an actor in two states.

use anyhow::Context;
use minicbor::{Decode, Encode};
use uuid::Uuid;

use crate::actor_id::domain_of;
use crate::error::Result;

/// Denormalized, possibly-stale copy of an actor stored inside a container,
/// so membership lists render without a join.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Member {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: Option<String>,
    #[n(2)]
    pub icon: Option<String>,
    #[n(3)]
    pub url: Option<String>,
    #[n(4)]
    pub inbox: Option<String>,
    #[n(5)]
    pub outbox: Option<String>,
    #[n(6)]
    pub server: Option<String>,
}

impl Member {
    /// Minimal snapshot for an actor we cannot resolve locally.
    pub fn stub(id: impl Into<String>, server: impl Into<String>) -> Member {
        Member {
            id: id.into(),
            name: None,
            icon: None,
            url: None,
            inbox: None,
            outbox: None,
            server: Some(server.into()),
        }
    }
}

/// Owner kind carried explicitly on every container record, so authorization
/// never has to re-derive it from the shape of the owner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cbor(index_only)]
pub enum OwnerKind {
    #[n(0)]
    User,
    #[n(1)]
    Server,
    #[n(2)]
    Group,
    #[n(3)]
    Event,
}

/// Well-known circle tags, used to resolve a circle by owner + kind when an
/// activity omits an explicit target (Follow) or to gate server circles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cbor(index_only)]
pub enum CircleKind {
    #[n(0)]
    Following,
    #[n(1)]
    Admins,
    #[n(2)]
    Mods,
}

impl CircleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircleKind::Following => "following",
            CircleKind::Admins => "admins",
            CircleKind::Mods => "mods",
        }
    }
}

/// A standalone container: a named list of member snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Circle {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub owner: String,
    #[n(2)]
    pub owner_kind: OwnerKind,
    #[n(3)]
    pub kind: Option<CircleKind>,
    #[n(4)]
    pub members: Vec<Member>,
    #[n(5)]
    pub member_count: u64,
    #[n(6)]
    pub deleted: bool,
}

impl Circle {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        owner_kind: OwnerKind,
        kind: Option<CircleKind>,
    ) -> Circle {
        Circle {
            id: id.into(),
            owner: owner.into(),
            owner_kind,
            kind,
            members: vec![],
            member_count: 0,
            deleted: false,
        }
    }

    pub fn contains(&self, actor_id: &str) -> bool {
        self.members.iter().any(|m| m.id == actor_id)
    }

    /// Push-if-absent. Returns false when the member was already present.
    pub fn push_if_absent(&mut self, member: Member) -> bool {
        if self.contains(&member.id) {
            return false;
        }
        self.members.push(member);
        self.member_count += 1;
        true
    }

    /// Pull-if-present. Returns the removed snapshot, if any.
    pub fn pull_if_present(&mut self, actor_id: &str) -> Option<Member> {
        let pos = self.members.iter().position(|m| m.id == actor_id)?;
        self.member_count = self.member_count.saturating_sub(1);
        Some(self.members.remove(pos))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self).context("unable to encode circle")?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Circle> {
        Ok(minicbor::decode(bytes).context("unable to decode circle")?)
    }
}

/// Named lists a roster can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
#[cbor(index_only)]
pub enum Role {
    #[n(0)]
    Admins,
    #[n(1)]
    Members,
    #[n(2)]
    Attending,
    #[n(3)]
    Interested,
    #[n(4)]
    Invited,
    #[n(5)]
    Blocked,
    #[n(6)]
    Pending,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admins => "admins",
            Role::Members => "members",
            Role::Attending => "attending",
            Role::Interested => "interested",
            Role::Invited => "invited",
            Role::Blocked => "blocked",
            Role::Pending => "pending",
        }
    }

    /// Parse a destination-state hint (`object.state` or the activity's
    /// `objectType`).
    pub fn from_state(s: &str) -> Option<Role> {
        match s.to_ascii_lowercase().as_str() {
            "members" => Some(Role::Members),
            "attending" => Some(Role::Attending),
            "interested" => Some(Role::Interested),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cbor(index_only)]
pub enum RosterKind {
    #[n(0)]
    Group,
    #[n(1)]
    Event,
}

impl RosterKind {
    pub fn roles(&self) -> &'static [Role] {
        match self {
            RosterKind::Group => &[
                Role::Admins,
                Role::Members,
                Role::Invited,
                Role::Blocked,
                Role::Pending,
            ],
            RosterKind::Event => &[
                Role::Admins,
                Role::Attending,
                Role::Interested,
                Role::Invited,
                Role::Blocked,
            ],
        }
    }

    /// The lists an actor occupies at most one of at a time.
    pub fn exclusive_roles(&self) -> &'static [Role] {
        match self {
            RosterKind::Group => &[Role::Members, Role::Invited, Role::Pending],
            RosterKind::Event => &[Role::Attending, Role::Interested, Role::Invited],
        }
    }

    /// The lists Leave pulls from.
    pub fn leave_roles(&self) -> &'static [Role] {
        match self {
            RosterKind::Group => &[Role::Members, Role::Invited],
            RosterKind::Event => &[Role::Attending, Role::Interested, Role::Invited],
        }
    }

    pub fn default_destination(&self) -> Role {
        match self {
            RosterKind::Group => Role::Members,
            RosterKind::Event => Role::Attending,
        }
    }

    pub fn owner_kind(&self) -> OwnerKind {
        match self {
            RosterKind::Group => OwnerKind::Group,
            RosterKind::Event => OwnerKind::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RosterList {
    #[n(0)]
    pub role: Role,
    #[n(1)]
    pub circle_id: String,
    #[n(2)]
    pub members: Vec<Member>,
}

/// The membership document of a group or event: all named lists inline.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Roster {
    /// Owner id, e.g. `event:42@local.example`.
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub kind: RosterKind,
    #[n(2)]
    pub deleted: bool,
    #[n(3)]
    pub lists: Vec<RosterList>,
}

/// Outcome of a guarded roster transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moved {
    pub from: Vec<Role>,
    pub from_circle_ids: Vec<String>,
    pub to: Option<Role>,
    pub to_circle_id: Option<String>,
}

impl Roster {
    pub fn new(id: impl Into<String>, kind: RosterKind) -> Roster {
        let id = id.into();
        let domain = domain_of(&id).unwrap_or("localhost").to_string();
        let lists = kind
            .roles()
            .iter()
            .map(|&role| RosterList {
                role,
                circle_id: format!("circle:{}@{}", Uuid::now_v7().simple(), domain),
                members: vec![],
            })
            .collect();
        Roster {
            id,
            kind,
            deleted: false,
            lists,
        }
    }

    pub fn list(&self, role: Role) -> Option<&RosterList> {
        self.lists.iter().find(|l| l.role == role)
    }

    pub fn list_mut(&mut self, role: Role) -> Option<&mut RosterList> {
        self.lists.iter_mut().find(|l| l.role == role)
    }

    pub fn circle_id(&self, role: Role) -> Option<&str> {
        self.list(role).map(|l| l.circle_id.as_str())
    }

    pub fn contains(&self, role: Role, actor_id: &str) -> bool {
        self.list(role)
            .is_some_and(|l| l.members.iter().any(|m| m.id == actor_id))
    }

    pub fn is_blocked(&self, actor_id: &str) -> bool {
        self.contains(Role::Blocked, actor_id)
    }

    pub fn is_admin(&self, actor_id: &str) -> bool {
        self.contains(Role::Admins, actor_id)
    }

    /// First exclusive-state list the actor occupies, if any.
    pub fn state_of(&self, actor_id: &str) -> Option<Role> {
        self.kind
            .exclusive_roles()
            .iter()
            .copied()
            .find(|&role| self.contains(role, actor_id))
    }

    pub fn push(&mut self, role: Role, member: Member) -> bool {
        let Some(list) = self.list_mut(role) else {
            return false;
        };
        if list.members.iter().any(|m| m.id == member.id) {
            return false;
        }
        list.members.push(member);
        true
    }

    pub fn pull(&mut self, role: Role, actor_id: &str) -> Option<Member> {
        let list = self.list_mut(role)?;
        let pos = list.members.iter().position(|m| m.id == actor_id)?;
        Some(list.members.remove(pos))
    }

    /// Pull the actor from every list in `sources`, then push into `dest`.
    /// The pushed snapshot is the one recovered from a source list when
    /// available, so an invited member's snapshot survives the transition;
    /// otherwise `fallback` is used.
    pub fn transition(
        &mut self,
        actor_id: &str,
        sources: &[Role],
        dest: Role,
        fallback: Member,
    ) -> Moved {
        let mut moved = Moved {
            from: vec![],
            from_circle_ids: vec![],
            to: None,
            to_circle_id: None,
        };
        let mut snapshot = None;
        for &role in sources {
            if role == dest {
                continue;
            }
            if let Some(member) = self.pull(role, actor_id) {
                moved.from.push(role);
                if let Some(circle_id) = self.circle_id(role) {
                    moved.from_circle_ids.push(circle_id.to_string());
                }
                snapshot.get_or_insert(member);
            }
        }
        if self.push(dest, snapshot.unwrap_or(fallback)) {
            moved.to = Some(dest);
            moved.to_circle_id = self.circle_id(dest).map(str::to_string);
        }
        moved
    }

    /// Pull the actor from every list in `sources` without pushing anywhere.
    pub fn pull_all(&mut self, actor_id: &str, sources: &[Role]) -> Moved {
        let mut moved = Moved {
            from: vec![],
            from_circle_ids: vec![],
            to: None,
            to_circle_id: None,
        };
        for &role in sources {
            if self.pull(role, actor_id).is_some() {
                moved.from.push(role);
                if let Some(circle_id) = self.circle_id(role) {
                    moved.from_circle_ids.push(circle_id.to_string());
                }
            }
        }
        moved
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self).context("unable to encode roster")?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Roster> {
        Ok(minicbor::decode(bytes).context("unable to decode roster")?)
    }
}
