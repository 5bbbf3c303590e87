//! Assignee values.
//!
//! The service returns identity fields either as a plain string or as an
//! identity object. Both collapse to one stable string through
//! [`Identity::normalize`], preferring unique identifiers over display names.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Raw(String),
    Structured(StructuredIdentity),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredIdentity {
    pub unique_name: Option<String>,
    pub principal_name: Option<String>,
    pub mail: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Generic rendering of the original object, used as the last resort.
    pub raw: String,
}

impl Identity {
    /// Interpret a field value. `null` means unassigned.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(raw) => Some(Self::Raw(raw.clone())),
            Value::Object(map) => {
                let get = |key: &str| {
                    map.get(key).and_then(|value| match value {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    })
                };
                Some(Self::Structured(StructuredIdentity {
                    unique_name: get("uniqueName"),
                    principal_name: get("principalName"),
                    mail: get("mail"),
                    email: get("email"),
                    display_name: get("displayName"),
                    raw: value.to_string(),
                }))
            }
            other => Some(Self::Raw(other.to_string())),
        }
    }

    /// Collapse to a trimmed, non-empty string.
    ///
    /// Order for identity objects: `uniqueName`, `principalName`, `mail`,
    /// `email`, then `displayName`, then the object's generic rendering.
    #[must_use]
    pub fn normalize(&self) -> Option<String> {
        match self {
            Self::Raw(raw) => non_blank(raw),
            Self::Structured(identity) => [
                &identity.unique_name,
                &identity.principal_name,
                &identity.mail,
                &identity.email,
            ]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
            .and_then(|value| non_blank(value))
            .or_else(|| identity.display_name.as_deref().and_then(non_blank))
            .or_else(|| non_blank(&identity.raw)),
        }
    }
}

fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_strings_are_trimmed() {
        let identity = Identity::from_value(&json!("  alice@example.com ")).expect("identity");
        assert_eq!(identity.normalize().as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn unique_name_wins_over_display_name() {
        let identity = Identity::from_value(&json!({
            "displayName": "Alice",
            "uniqueName": "alice@corp.example",
            "mail": "alice.mail@corp.example"
        }))
        .expect("identity");
        assert_eq!(identity.normalize().as_deref(), Some("alice@corp.example"));
    }

    #[test]
    fn blank_identifiers_fall_through_to_the_next_one() {
        let identity = Identity::from_value(&json!({
            "uniqueName": "  ",
            "principalName": null,
            "mail": "bob@corp.example"
        }))
        .expect("identity");
        assert_eq!(identity.normalize().as_deref(), Some("bob@corp.example"));
    }

    #[test]
    fn display_name_is_the_fallback() {
        let identity =
            Identity::from_value(&json!({ "displayName": "Carol Q" })).expect("identity");
        assert_eq!(identity.normalize().as_deref(), Some("Carol Q"));
    }

    #[test]
    fn objects_without_names_render_generically() {
        let identity = Identity::from_value(&json!({ "id": "abc" })).expect("identity");
        assert_eq!(identity.normalize().as_deref(), Some(r#"{"id":"abc"}"#));
    }

    #[test]
    fn null_is_unassigned_and_blank_is_empty() {
        assert!(Identity::from_value(&Value::Null).is_none());
        let blank = Identity::from_value(&json!("   ")).expect("identity");
        assert_eq!(blank.normalize(), None);
    }
}
