//! Actor identifier parsing.
//!
//! Identifiers come in two canonical families: handles (`@alice@example.com`,
//! or `@example.com` for the server itself) and typed ids
//! (`circle:8f2a@example.com`). The domain suffix alone decides locality; no
//! registry lookup is needed to parse one.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Post,
    Circle,
    Group,
    Event,
    Flag,
    File,
    React,
    Reply,
    Page,
    Bookmark,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Post => "post",
            ObjectType::Circle => "circle",
            ObjectType::Group => "group",
            ObjectType::Event => "event",
            ObjectType::Flag => "flag",
            ObjectType::File => "file",
            ObjectType::React => "react",
            ObjectType::Reply => "reply",
            ObjectType::Page => "page",
            ObjectType::Bookmark => "bookmark",
        }
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ObjectType::Post),
            "circle" => Ok(ObjectType::Circle),
            "group" => Ok(ObjectType::Group),
            "event" => Ok(ObjectType::Event),
            "flag" => Ok(ObjectType::Flag),
            "file" => Ok(ObjectType::File),
            "react" => Ok(ObjectType::React),
            "reply" => Ok(ObjectType::Reply),
            "page" => Ok(ObjectType::Page),
            "bookmark" => Ok(ObjectType::Bookmark),
            other => Err(Error::Validation(format!("unknown object type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// `@handle@domain`
    Handle,
    /// `@domain` — the server actor itself
    Server,
    /// `type:localId@domain`
    Typed(ObjectType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorId {
    pub kind: IdKind,
    /// Handle or local id; empty for server ids.
    pub local: String,
    pub domain: String,
}

impl ActorId {
    pub fn is_local(&self, domain: &str) -> bool {
        self.domain == domain
    }

    pub fn is_server(&self) -> bool {
        matches!(self.kind, IdKind::Server)
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        match self.kind {
            IdKind::Typed(ty) => Some(ty),
            _ => None,
        }
    }
}

impl FromStr for ActorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::Validation("empty actor id".to_string()));
        }
        if let Some(rest) = s.strip_prefix('@') {
            return match rest.split_once('@') {
                Some(("", _)) | Some((_, "")) => {
                    Err(Error::Validation(format!("malformed handle {s:?}")))
                }
                Some((handle, domain)) => Ok(ActorId {
                    kind: IdKind::Handle,
                    local: handle.to_string(),
                    domain: domain.to_string(),
                }),
                None if rest.is_empty() => {
                    Err(Error::Validation(format!("malformed handle {s:?}")))
                }
                None => Ok(ActorId {
                    kind: IdKind::Server,
                    local: String::new(),
                    domain: rest.to_string(),
                }),
            };
        }
        let (prefix, rest) = s
            .split_once(':')
            .ok_or_else(|| Error::Validation(format!("malformed actor id {s:?}")))?;
        let ty: ObjectType = prefix.parse()?;
        let (local, domain) = rest
            .split_once('@')
            .ok_or_else(|| Error::Validation(format!("actor id {s:?} has no domain")))?;
        if local.is_empty() || domain.is_empty() {
            return Err(Error::Validation(format!("malformed actor id {s:?}")));
        }
        Ok(ActorId {
            kind: IdKind::Typed(ty),
            local: local.to_string(),
            domain: domain.to_string(),
        })
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            IdKind::Handle => write!(f, "@{}@{}", self.local, self.domain),
            IdKind::Server => write!(f, "@{}", self.domain),
            IdKind::Typed(ty) => write!(f, "{}:{}@{}", ty.as_str(), self.local, self.domain),
        }
    }
}

/// Parse the domain out of an id without caring about the rest.
pub fn domain_of(id: &str) -> Option<&str> {
    let rest = id.strip_prefix('@').unwrap_or(id);
    match rest.rsplit_once('@') {
        Some((_, domain)) if !domain.is_empty() => Some(domain),
        Some(_) => None,
        None if id.starts_with('@') && !rest.is_empty() => Some(rest),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{ActorId, IdKind, ObjectType, domain_of};

    #[test]
    fn parse_handle() {
        let id: ActorId = "@alice@remote.example".parse().unwrap();
        assert_eq!(id.kind, IdKind::Handle);
        assert_eq!(id.local, "alice");
        assert_eq!(id.domain, "remote.example");
        assert_eq!(id.to_string(), "@alice@remote.example");
    }

    #[test]
    fn parse_server_handle() {
        let id: ActorId = "@remote.example".parse().unwrap();
        assert!(id.is_server());
        assert_eq!(id.domain, "remote.example");
        assert_eq!(id.to_string(), "@remote.example");
    }

    #[test]
    fn parse_typed_id() {
        let id: ActorId = "event:42ab@local.example".parse().unwrap();
        assert_eq!(id.object_type(), Some(ObjectType::Event));
        assert_eq!(id.local, "42ab");
        assert!(id.is_local("local.example"));
        assert!(!id.is_local("remote.example"));
    }

    #[test]
    fn reject_malformed() {
        assert!("".parse::<ActorId>().is_err());
        assert!("@".parse::<ActorId>().is_err());
        assert!("@@x".parse::<ActorId>().is_err());
        assert!("alice".parse::<ActorId>().is_err());
        assert!("widget:1@x".parse::<ActorId>().is_err());
        assert!("group:@x".parse::<ActorId>().is_err());
        assert!("group:1@".parse::<ActorId>().is_err());
    }

    #[test]
    fn domain_shortcut() {
        assert_eq!(domain_of("@alice@a.example"), Some("a.example"));
        assert_eq!(domain_of("@a.example"), Some("a.example"));
        assert_eq!(domain_of("post:9@b.example"), Some("b.example"));
        assert_eq!(domain_of("nonsense"), None);
    }
}
