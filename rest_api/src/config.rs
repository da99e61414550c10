// rest_api/src/config.rs

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lib::{BlobStoreConfig, DoctorSeed, NotificationConfig, StorageConfig};
use models::medical::Role;
use models::timestamps::Zone;

pub const DEFAULT_CONFIG_FILE: &str = "clinic_portal.yaml";
pub const DEFAULT_REST_API_PORT: u16 = 8082;
pub const ENV_PREFIX: &str = "CLINIC";
const DEV_JWT_SECRET: &str = "clinic-portal-development-secret-change-me";

/// Represents the configuration for the HTTP server itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_REST_API_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_secs: u64,
    /// YAML file of role permissions; built-in defaults when unset.
    pub roles_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            session_ttl_secs: 8 * 3600,
            roles_file: None,
        }
    }
}

impl AuthConfig {
    pub fn uses_development_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

/// A staff login created at startup when it does not exist yet.
#[derive(Debug, Clone, Deserialize)]
pub struct StaffSeed {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub call_timeout_ms: u64,
    /// Zone used for "today" and for timestamps sent without an offset:
    /// `local`, an IANA name such as `America/New_York`, or `+05:30`.
    pub timezone: String,
    pub blob_store: BlobStoreConfig,
    pub notifications: NotificationConfig,
    pub doctors: Vec<DoctorSeed>,
    pub staff: Vec<StaffSeed>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            call_timeout_ms: lib::util::DEFAULT_CALL_TIMEOUT_SECS * 1000,
            timezone: "local".to_string(),
            blob_store: BlobStoreConfig::default(),
            notifications: NotificationConfig::default(),
            doctors: Vec::new(),
            staff: Vec::new(),
        }
    }
}

impl PortalConfig {
    pub fn server_zone(&self) -> Result<Zone> {
        Zone::parse(&self.timezone).ok_or_else(|| {
            anyhow!(
                "Invalid timezone '{}'; expected local, an IANA name like America/New_York, or an offset like +05:30",
                self.timezone
            )
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.max(1))
    }
}

/// Layers built-in defaults, the YAML file and `CLINIC__*` environment
/// variables, in that order. A missing file is only an error when the path
/// was given explicitly.
pub fn load_portal_config(config_path: Option<&Path>) -> Result<PortalConfig> {
    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let mut config_builder = Config::builder();
    if required || path.exists() {
        config_builder = config_builder.add_source(ConfigFile::from(path.as_path()).required(required));
    }
    config_builder = config_builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let config: PortalConfig = config_builder
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        .try_deserialize()
        .context("Failed to parse portal configuration")?;
    config.server_zone()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib::StorageEngineType;
    use std::io::Write;

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            r#"
server:
  port: 9090
storage:
  engine: memory
timezone: "+05:30"
doctors:
  - name: Dr. Sarah Wilson
    specialty: Cardiology
    email: sarah@clinic.test
staff:
  - email: admin@clinic.test
    password: changeme
    name: Clinic Admin
    role: admin
"#
        )
        .unwrap();

        let config = load_portal_config(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.storage.engine, StorageEngineType::Memory);
        assert_eq!(
            config.server_zone().unwrap(),
            Zone::Fixed(chrono::FixedOffset::east_opt(5 * 3600 + 1800).unwrap())
        );
        assert_eq!(config.doctors.len(), 1);
        assert_eq!(config.staff[0].role, Role::Admin);
        assert!(config.auth.uses_development_secret());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(load_portal_config(Some(Path::new("/nonexistent/clinic.yaml"))).is_err());
    }

    #[test]
    fn named_zone_is_accepted_and_local_is_the_default() {
        assert_eq!(PortalConfig::default().server_zone().unwrap(), Zone::Local);

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "timezone: America/New_York").unwrap();
        let config = load_portal_config(Some(file.path())).unwrap();
        assert_eq!(config.server_zone().unwrap().to_string(), "America/New_York");

        let mut bad = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(bad, "timezone: Mars/Olympus").unwrap();
        assert!(load_portal_config(Some(bad.path())).is_err());
    }
}
