// security/src/roles.rs
use anyhow::{Context, Result};
use models::medical::{Caller, Role};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::AuthError;

/// Operations gated by role. The string forms are what a roles file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Permission {
    #[serde(rename = "patients:read")]
    PatientsRead,
    #[serde(rename = "patients:write")]
    PatientsWrite,
    #[serde(rename = "appointments:create")]
    AppointmentsCreate,
    #[serde(rename = "records:ingest")]
    RecordsIngest,
    #[serde(rename = "dashboard:read")]
    DashboardRead,
    #[serde(rename = "superuser")]
    Superuser,
}

impl Permission {
    fn describe(&self) -> &'static str {
        match self {
            Permission::PatientsRead => "view patients",
            Permission::PatientsWrite => "register patients",
            Permission::AppointmentsCreate => "book appointments for patients",
            Permission::RecordsIngest => "upload medical records",
            Permission::DashboardRead => "view the dashboard",
            Permission::Superuser => "administer the portal",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleConfig {
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RolesConfig {
    pub roles: HashMap<Role, RoleConfig>,
    #[serde(skip)]
    grants: HashMap<Role, HashSet<Permission>>,
}

impl RolesConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: RolesConfig = serde_yaml::from_str(content).context("Failed to parse roles file")?;
        Ok(config.indexed())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read roles file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    fn indexed(mut self) -> Self {
        self.grants = self
            .roles
            .iter()
            .map(|(role, cfg)| (*role, cfg.permissions.iter().copied().collect()))
            .collect();
        self
    }

    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.grants.get(&role).map_or(false, |granted| {
            granted.contains(&permission) || granted.contains(&Permission::Superuser)
        })
    }

    /// Anonymous callers are asked to sign in; signed-in callers without the
    /// permission are refused.
    pub fn require(&self, caller: &Caller, permission: Permission) -> Result<(), AuthError> {
        match caller.role {
            None => Err(AuthError::MissingToken),
            Some(role) if self.has_permission(role, permission) => Ok(()),
            Some(role) => Err(AuthError::Forbidden(format!(
                "Access denied. {} accounts may not {}.",
                role,
                permission.describe()
            ))),
        }
    }
}

impl Default for RolesConfig {
    /// Admins hold everything; doctors run the clinic screens; patients only
    /// see their own data through the access scoper.
    fn default() -> Self {
        let doctor = vec![
            Permission::PatientsRead,
            Permission::PatientsWrite,
            Permission::AppointmentsCreate,
            Permission::RecordsIngest,
            Permission::DashboardRead,
        ];
        let roles = HashMap::from([
            (Role::Admin, RoleConfig { permissions: vec![Permission::Superuser] }),
            (Role::Doctor, RoleConfig { permissions: doctor }),
            (Role::Patient, RoleConfig { permissions: Vec::new() }),
        ]);
        RolesConfig {
            roles,
            grants: HashMap::new(),
        }
        .indexed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roles_gate_staff_operations() {
        let roles = RolesConfig::default();
        assert!(roles.has_permission(Role::Admin, Permission::RecordsIngest));
        assert!(roles.has_permission(Role::Doctor, Permission::DashboardRead));
        assert!(!roles.has_permission(Role::Patient, Permission::PatientsRead));
    }

    #[test]
    fn require_distinguishes_anonymous_from_forbidden() {
        let roles = RolesConfig::default();
        assert!(matches!(
            roles.require(&Caller::anonymous(), Permission::DashboardRead),
            Err(AuthError::MissingToken)
        ));
        let patient = Caller { role: Some(Role::Patient), ..Caller::default() };
        let err = roles.require(&patient, Permission::RecordsIngest).unwrap_err();
        assert_eq!(err.to_string(), "Access denied. patient accounts may not upload medical records.");
    }

    #[test]
    fn roles_file_overrides_defaults() {
        let yaml = r#"
roles:
  doctor:
    permissions: ["patients:read"]
  patient:
    permissions: []
"#;
        let roles = RolesConfig::from_yaml_str(yaml).unwrap();
        assert!(roles.has_permission(Role::Doctor, Permission::PatientsRead));
        assert!(!roles.has_permission(Role::Doctor, Permission::RecordsIngest));
        assert!(!roles.has_permission(Role::Admin, Permission::PatientsRead));
    }
}
