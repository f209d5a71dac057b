//! The activity envelope contract and the canonical Activity record.

mod payload;

use anyhow::Context;
use minicbor::{Decode, Encode};
use serde::Deserialize;
use serde_json::Value;

pub use payload::Payload;

use crate::container::{Member, Role};
use crate::error::Result;

/// Closed verb vocabulary. Anything else is rejected by the dispatcher before
/// a handler is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Encode, Decode)]
#[cbor(index_only)]
pub enum Verb {
    #[n(0)]
    Accept,
    #[n(1)]
    Reject,
    #[n(2)]
    Join,
    #[n(3)]
    Leave,
    #[n(4)]
    Invite,
    #[n(5)]
    Add,
    #[n(6)]
    Remove,
    #[n(7)]
    Follow,
    #[n(8)]
    Unfollow,
    #[n(9)]
    Flag,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Accept => "Accept",
            Verb::Reject => "Reject",
            Verb::Join => "Join",
            Verb::Leave => "Leave",
            Verb::Invite => "Invite",
            Verb::Add => "Add",
            Verb::Remove => "Remove",
            Verb::Follow => "Follow",
            Verb::Unfollow => "Unfollow",
            Verb::Flag => "Flag",
        }
    }
}

/// A validated, normalized activity as produced by the upstream
/// schema/validation layer. The engine trusts this contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub verb: Verb,
    pub actor_id: String,
    #[serde(default)]
    pub object: Option<Value>,
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    /// True when the activity arrived from a remote server.
    #[serde(default)]
    pub federated: bool,
}

impl Envelope {
    pub fn new(verb: Verb, actor_id: impl Into<String>) -> Envelope {
        Envelope {
            verb,
            actor_id: actor_id.into(),
            object: None,
            object_type: None,
            target: None,
            to: None,
            remote_id: None,
            dedupe_key: None,
            federated: false,
        }
    }

    pub fn with_object(mut self, object: Value) -> Envelope {
        self.object = Some(object);
        self
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Envelope {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Envelope {
        self.target = Some(target.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Envelope {
        self.to = Some(to.into());
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Envelope {
        self.dedupe_key = Some(key.into());
        self
    }

    pub fn with_remote_id(mut self, id: impl Into<String>) -> Envelope {
        self.remote_id = Some(id.into());
        self
    }

    pub fn payload(&self) -> Payload<'_> {
        Payload::new(self.object.as_ref())
    }
}

/// Exactly what a handler mutated, recorded so a later Undo can reverse the
/// transition and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SideEffects {
    #[n(0)]
    pub from: Vec<Role>,
    #[n(1)]
    pub to: Option<Role>,
    #[n(2)]
    pub from_circle_ids: Vec<String>,
    #[n(3)]
    pub to_circle_id: Option<String>,
    #[n(4)]
    pub member_id: String,
}

/// The canonical, persisted record of an accepted verb invocation. Immutable
/// once stored, except for `object_id`/`side_effects` which are filled in by
/// the handler during the same dispatch.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Activity {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub verb: Verb,
    #[n(2)]
    pub actor_id: String,
    #[n(3)]
    pub actor: Option<Member>,
    /// Object id, or the embedded payload as canonical JSON text.
    #[n(4)]
    pub object: Option<String>,
    #[n(5)]
    pub object_type: Option<String>,
    #[n(6)]
    pub target: Option<String>,
    #[n(7)]
    pub to: Option<String>,
    /// Canonical id of the object the verb affected.
    #[n(8)]
    pub object_id: Option<String>,
    #[n(9)]
    pub side_effects: Option<SideEffects>,
    #[n(10)]
    pub federated: bool,
    #[n(11)]
    pub remote_id: Option<String>,
    #[n(12)]
    pub dedupe_key: Option<String>,
    /// Epoch seconds.
    #[n(13)]
    pub published: i64,
}

impl Activity {
    pub fn from_envelope(id: String, envelope: &Envelope, published: i64) -> Activity {
        let object = envelope.object.as_ref().map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        Activity {
            id,
            verb: envelope.verb,
            actor_id: envelope.actor_id.clone(),
            actor: None,
            object,
            object_type: envelope.object_type.clone(),
            target: envelope.target.clone(),
            to: envelope.to.clone(),
            object_id: None,
            side_effects: None,
            federated: envelope.federated,
            remote_id: envelope.remote_id.clone(),
            dedupe_key: envelope.dedupe_key.clone(),
            published,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self).context("unable to encode activity")?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Activity> {
        Ok(minicbor::decode(bytes).context("unable to decode activity")?)
    }
}
