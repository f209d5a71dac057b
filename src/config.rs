use anyhow::{Context, Result};
use serde::Deserialize;

/// Server-local settings the engine needs: who we are, and the moderation
/// reason taxonomy Flag reports are normalized against.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Local domain, e.g. `local.example`.
    pub domain: String,
    /// Actor id of the server itself, e.g. `@local.example`.
    pub server_actor: String,
    pub flag_reasons: Vec<ReasonDef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReasonDef {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            domain: "localhost".to_string(),
            server_actor: "@localhost".to_string(),
            flag_reasons: vec![],
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Settings> {
        toml::from_str(text).context("unable to parse settings")
    }

    pub fn reason(&self, code: &str) -> Option<&ReasonDef> {
        self.flag_reasons.iter().find(|r| r.code == code)
    }

    pub fn reason_by_label(&self, label: &str) -> Option<&ReasonDef> {
        self.flag_reasons.iter().find(|r| r.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;

    #[test]
    fn parse_settings() {
        let settings = Settings::from_toml(
            r#"
            domain = "local.example"
            server_actor = "@local.example"

            [[flag_reasons]]
            code = "spam"
            label = "Spam"
            description = "Unsolicited advertising"

            [[flag_reasons]]
            code = "other"
            label = "Other"
            "#,
        )
        .unwrap();
        assert_eq!(settings.domain, "local.example");
        assert_eq!(settings.reason("spam").unwrap().label, "Spam");
        assert_eq!(settings.reason_by_label("Other").unwrap().code, "other");
        assert!(settings.reason("violence").is_none());
    }

    #[test]
    fn defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.domain, "localhost");
        assert!(settings.flag_reasons.is_empty());
    }
}
