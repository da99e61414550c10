// models/src/medical/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role claim carried by an identity session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Patient,
    /// Pre-provisioned clinic staff.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Patient => "patient",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An account known to the identity oracle. The password hash lives only in
/// the account store and never appears on this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAccount {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The entity invoking an operation. Business logic receives this value
/// explicitly and never looks up session state on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Caller {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub role: Option<Role>,
    pub display_name: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Caller::default()
    }
}

/// Emails are the join key across accounts, patients and records, so every
/// write and comparison goes through this.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_roles_lowercase() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), serde_json::json!("admin"));
        let role: Role = serde_json::from_str("\"doctor\"").unwrap();
        assert_eq!(role, Role::Doctor);
        assert!(serde_json::from_str::<Role>("\"nurse\"").is_err());
        assert_eq!(Role::Patient.to_string(), "patient");
    }

    #[test]
    fn should_normalize_emails_for_joins() {
        assert_eq!(normalize_email(" A@X.com "), "a@x.com");
        assert_eq!(Caller::anonymous().role, None);
    }
}
