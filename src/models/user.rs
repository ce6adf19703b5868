use chrono::{Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::{ValidationError, Validator, WriteMode};
use super::{trim_field, Model};
use crate::auth::password;
use crate::filter::{Document, FilterExpression};

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub const ALL: [&'static str; 4] = ["user", "guide", "lead-guide", "admin"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "guide" => Some(Role::Guide),
            "lead-guide" => Some(Role::LeadGuide),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

pub struct User;

impl Model for User {
    const COLLECTION: &'static str = "users";
    const HIDDEN: &'static [&'static str] = &["password", "passwordConfirm", "active"];
    const UNIQUE: &'static [&'static str] = &["email"];

    fn default_filter() -> FilterExpression {
        FilterExpression::new().ne("active", false)
    }

    fn apply_defaults(doc: &mut Document) {
        doc.entry("role").or_insert(Value::String(Role::User.as_str().to_string()));
        doc.entry("active").or_insert(Value::Bool(true));
    }

    fn validate(doc: &Document, mode: WriteMode<'_>) -> Result<(), ValidationError> {
        let mut v = Validator::new(doc, mode);
        v.required("name", "Please tell us your name!")
            .string("name")
            .required("email", "Please provide your email")
            .email("email", "Please provide a valid email")
            .one_of("role", &Role::ALL, "Role is either: user, guide, lead-guide, admin");

        // Password rules only run when a new plain-text password is being written
        if mode.touches("password") {
            v.required("password", "Please provide a password")
                .string("password")
                .length("password", MIN_PASSWORD_LENGTH, usize::MAX, "Password must have at least 8 characters")
                .required("passwordConfirm", "Please confirm your password")
                .same_as("passwordConfirm", "password", "Passwords are not the same!");
        }
        v.finish()
    }

    fn prepare(doc: &mut Document, mode: WriteMode<'_>) -> Result<(), ValidationError> {
        trim_field(doc, "name");
        if let Some(Value::String(email)) = doc.get_mut("email") {
            *email = email.trim().to_lowercase();
        }

        if mode.touches("password") {
            if let Some(plain) = doc.get("password").and_then(Value::as_str) {
                let hash = password::hash_password(plain)
                    .map_err(|_| ValidationError::single("password", "Password could not be processed"))?;
                doc.insert("password".to_string(), Value::String(hash));
            }
            if !mode.is_create() {
                // Backdated so a token issued right after the change stays valid
                let changed_at = (Utc::now() - Duration::seconds(1)).to_rfc3339_opts(SecondsFormat::Millis, true);
                doc.insert("passwordChangedAt".to_string(), Value::String(changed_at));
            }
        }
        doc.remove("passwordConfirm");
        Ok(())
    }
}

/// True when the password changed after a token issued at `issued_at` (unix seconds)
pub fn changed_password_after(user: &Document, issued_at: i64) -> bool {
    user.get("passwordChangedAt")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|changed| changed.timestamp() > issued_at)
}

pub fn role_of(user: &Document) -> Role {
    user.get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .unwrap_or(Role::User)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{prepare_create, prepare_update};
    use serde_json::json;

    fn signup() -> Document {
        json!({
            "name": "Laura Wilson",
            "email": " Laura@Example.com ",
            "password": "test1234",
            "passwordConfirm": "test1234"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn create_hashes_password_and_drops_confirmation() {
        let doc = prepare_create::<User>(signup()).unwrap();
        assert_eq!(doc["email"], json!("laura@example.com"));
        assert_eq!(doc["role"], json!("user"));
        assert_eq!(doc["active"], json!(true));
        assert!(doc.get("passwordConfirm").is_none());
        let hash = doc["password"].as_str().unwrap();
        assert_ne!(hash, "test1234");
        assert!(password::verify_password("test1234", hash).unwrap());
        assert!(doc.get("passwordChangedAt").is_none());
    }

    #[test]
    fn mismatched_confirmation_is_rejected() {
        let mut input = signup();
        input.insert("passwordConfirm".into(), json!("test12345"));
        let err = prepare_create::<User>(input).unwrap_err();
        assert_eq!(
            err.field_errors().get("passwordConfirm").map(String::as_str),
            Some("Passwords are not the same!")
        );
    }

    #[test]
    fn short_password_and_bad_role_are_rejected() {
        let mut input = signup();
        input.insert("password".into(), json!("short"));
        input.insert("passwordConfirm".into(), json!("short"));
        input.insert("role".into(), json!("emperor"));
        let err = prepare_create::<User>(input).unwrap_err();
        assert!(err.field_errors().contains_key("password"));
        assert!(err.field_errors().contains_key("role"));
    }

    #[test]
    fn profile_update_keeps_existing_hash() {
        let existing = prepare_create::<User>(signup()).unwrap();
        let patch = json!({"name": "Laura W."}).as_object().unwrap().clone();
        let updated = prepare_update::<User>(&existing, patch, true).unwrap();
        assert_eq!(updated["password"], existing["password"]);
        assert!(updated.get("passwordChangedAt").is_none());
    }

    #[test]
    fn password_update_records_change_time() {
        let existing = prepare_create::<User>(signup()).unwrap();
        let patch = json!({"password": "newpass123", "passwordConfirm": "newpass123"})
            .as_object()
            .unwrap()
            .clone();
        let updated = prepare_update::<User>(&existing, patch, true).unwrap();
        assert!(updated.get("passwordChangedAt").is_some());
        assert!(changed_password_after(&updated, 0));
        assert!(!changed_password_after(&updated, Utc::now().timestamp() + 60));
    }
}
