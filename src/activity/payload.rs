//! Accessor wrapper over a free-form activity payload.

use serde_json::Value;

/// The `object` of an envelope: either a bare id string or an embedded JSON
/// object. Handlers read it through this wrapper instead of poking at
/// `serde_json::Value` directly.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a>(Option<&'a Value>);

impl<'a> Payload<'a> {
    pub fn new(value: Option<&'a Value>) -> Payload<'a> {
        Payload(value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// The payload itself, when it is a bare id string.
    pub fn as_id(&self) -> Option<&'a str> {
        self.0.and_then(Value::as_str)
    }

    /// The id of the payload: a bare string, or the `id` property of an
    /// embedded object.
    pub fn node_id(&self) -> Option<&'a str> {
        match self.0 {
            Some(Value::String(s)) => Some(s),
            Some(v) if v.is_object() => v.get("id").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn get_str(&self, prop: &str) -> Option<&'a str> {
        self.0.and_then(|v| v.get(prop)).and_then(Value::as_str)
    }

    /// A node reference: a string property or an embedded object's `id`.
    pub fn get_node_iri(&self, prop: &str) -> Option<&'a str> {
        match self.0.and_then(|v| v.get(prop)) {
            Some(Value::String(s)) => Some(s),
            Some(v) if v.is_object() => v.get("id").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn get_node_object(&self, prop: &str) -> Payload<'a> {
        Payload(self.0.and_then(|v| v.get(prop)).filter(|v| v.is_object()))
    }

    pub fn get_value(&self, prop: &str) -> Option<&'a Value> {
        self.0.and_then(|v| v.get(prop))
    }

    pub fn has_props(&self, props: &[&str]) -> bool {
        match self.0.and_then(Value::as_object) {
            Some(map) => props.iter().all(|&key| map.contains_key(key)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Payload;

    #[test]
    fn bare_id() {
        let value = json!("@alice@local.example");
        let payload = Payload::new(Some(&value));
        assert_eq!(payload.as_id(), Some("@alice@local.example"));
        assert_eq!(payload.node_id(), Some("@alice@local.example"));
        assert!(!payload.has_props(&["id"]));
    }

    #[test]
    fn embedded_object() {
        let value = json!({
            "id": "@bob@remote.example",
            "state": "interested",
            "reason": {"code": "spam"}
        });
        let payload = Payload::new(Some(&value));
        assert_eq!(payload.as_id(), None);
        assert_eq!(payload.node_id(), Some("@bob@remote.example"));
        assert_eq!(payload.get_str("state"), Some("interested"));
        assert_eq!(payload.get_node_object("reason").get_str("code"), Some("spam"));
        assert!(payload.has_props(&["id", "state"]));
        assert!(!payload.has_props(&["id", "notes"]));
    }

    #[test]
    fn node_iri_forms() {
        let value = json!({"actor": {"id": "@eve@x.example"}, "target": "group:1@x.example"});
        let payload = Payload::new(Some(&value));
        assert_eq!(payload.get_node_iri("actor"), Some("@eve@x.example"));
        assert_eq!(payload.get_node_iri("target"), Some("group:1@x.example"));
        assert_eq!(payload.get_node_iri("missing"), None);
    }

    #[test]
    fn empty() {
        let payload = Payload::new(None);
        assert!(payload.is_empty());
        assert_eq!(payload.node_id(), None);
    }
}
