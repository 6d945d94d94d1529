// Configuration management with layered configuration (defaults, files, env)

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub notion: NotionConfig,
    pub make: MakeConfig,
    pub admin: AdminConfig,
    pub auth: AuthConfig,
    pub scheduler: SchedulerConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub secret_key: String,
    pub static_dir: String,
    pub templates_dir: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub sqlite_path: Option<String>,
    pub render: bool,
    pub render_disk_path: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionConfig {
    pub token: Option<String>,
    pub database_id: Option<String>,
    pub api_base: String,
    pub version: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeConfig {
    pub webhook_url: Option<String>,
    pub api_key: Option<String>,
    pub test_email: String,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    pub email: Option<String>,
    pub alerts_feed_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_hours: u64,
    pub lockout_threshold: i64,
    pub lockout_window_minutes: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
}

/// Which backend a resolved database URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
    Sqlite,
}

/// Outcome of database URL resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDatabase {
    pub url: String,
    pub kind: DatabaseKind,
    /// Local file backing the database, when SQLite
    pub sqlite_file: Option<PathBuf>,
}

pub const DEFAULT_SQLITE_FILE: &str = "scholarship_autopilot.db";
pub const DEFAULT_SECRET_KEY: &str = "dev-change-me";

/// Unprefixed variables the deployment platforms set directly
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SECRET_KEY", "server.secret_key"),
    ("PORT", "server.port"),
    ("DATABASE_URL", "database.url"),
    ("SQLITE_DB_PATH", "database.sqlite_path"),
    ("RENDER_DISK_PATH", "database.render_disk_path"),
    ("NOTION_TOKEN", "notion.token"),
    ("NOTION_DATABASE_ID", "notion.database_id"),
    ("MAKE_WEBHOOK_URL", "make.webhook_url"),
    ("MAKE_WEBHOOK_API_KEY", "make.api_key"),
    ("MAKE_TEST_EMAIL", "make.test_email"),
    ("ADMIN_EMAIL", "admin.email"),
    ("ALERTS_FEED_TOKEN", "admin.alerts_feed_token"),
];

impl Settings {
    /// Load configuration with layered precedence: defaults → files → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let mut builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        // Dotenv files only fill what the process environment leaves unset
        let dotenv = read_dotenv_files(&[".env", "notion.env"]);
        for (var, key) in ENV_OVERRIDES {
            let value = std::env::var(var)
                .ok()
                .or_else(|| dotenv.get(*var).cloned())
                .filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        let lookup = |var: &str| std::env::var(var).ok().or_else(|| dotenv.get(var).cloned());
        if let Some(render) = lookup("RENDER") {
            builder = builder.set_override("database.render", render == "true")?;
        }
        if lookup("DISABLE_SCHEDULER").as_deref() == Some("1") {
            builder = builder.set_override("scheduler.enabled", false)?;
        }

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }
        if self.server.secret_key.is_empty() {
            return Err("Secret key cannot be empty".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.auth.lockout_threshold <= 0 {
            return Err("Auth lockout_threshold must be greater than 0".to_string());
        }

        if crate::schedule::parse_cron_expression(&self.scheduler.cron).is_err() {
            return Err(format!(
                "Scheduler cron expression is invalid: {}",
                self.scheduler.cron
            ));
        }
        if self.scheduler.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(format!(
                "Scheduler timezone is invalid: {}",
                self.scheduler.timezone
            ));
        }

        Ok(())
    }

    /// Log the degraded-mode warnings for missing optional integrations
    pub fn log_warnings(&self) {
        if !self.notion.is_configured() {
            tracing::warn!(
                "Missing NOTION_TOKEN or NOTION_DATABASE_ID; Notion integrations will be disabled"
            );
        }
        if self.admin.normalized_email().is_none() {
            tracing::warn!("ADMIN_EMAIL is not set; admin access will be disabled");
        }
        if self.server.secret_key == DEFAULT_SECRET_KEY {
            tracing::warn!("SECRET_KEY is not set; using the development default");
        }
        tracing::info!(
            url_configured = self.make.webhook_url.is_some(),
            api_key_configured = self.make.api_key.is_some(),
            "Make webhook configuration"
        );
    }
}

impl DatabaseConfig {
    /// Resolve the connection URL, falling back to a local SQLite file
    pub fn resolve(&self) -> std::io::Result<ResolvedDatabase> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            if url.starts_with("sqlite:") {
                return Ok(ResolvedDatabase {
                    url: url.to_string(),
                    kind: DatabaseKind::Sqlite,
                    sqlite_file: None,
                });
            }
            let url = match url.strip_prefix("postgres://") {
                Some(rest) => format!("postgresql://{}", rest),
                None => url.to_string(),
            };
            return Ok(ResolvedDatabase {
                url,
                kind: DatabaseKind::Postgres,
                sqlite_file: None,
            });
        }

        let sqlite_path = match self.sqlite_path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => Some(PathBuf::from(path)),
            None if self.render => {
                let path = Path::new(&self.render_disk_path).join(DEFAULT_SQLITE_FILE);
                tracing::info!(path = %path.display(), "Using Render persistent SQLite database");
                Some(path)
            }
            None => None,
        };

        let file = match sqlite_path {
            Some(path) => {
                let absolute = if path.is_absolute() {
                    path
                } else {
                    std::env::current_dir()?.join(path)
                };
                if let Some(parent) = absolute.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                absolute
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL is not set; using local SQLite database (not suitable for production)"
                );
                PathBuf::from(DEFAULT_SQLITE_FILE)
            }
        };

        Ok(ResolvedDatabase {
            url: format!("sqlite://{}?mode=rwc", file.display()),
            kind: DatabaseKind::Sqlite,
            sqlite_file: Some(file),
        })
    }
}

impl NotionConfig {
    pub fn is_configured(&self) -> bool {
        self.token.is_some() && self.database_id.is_some()
    }
}

impl MakeConfig {
    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some() && self.api_key.is_some()
    }
}

impl AdminConfig {
    /// Admin email trimmed and lower-cased, if any
    pub fn normalized_email(&self) -> Option<String> {
        self.email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
    }
}

/// Parse `KEY=value` dotenv files; missing files are ignored
fn read_dotenv_files(files: &[&str]) -> std::collections::HashMap<String, String> {
    let mut values = std::collections::HashMap::new();
    for file in files {
        if !Path::new(file).exists() {
            continue;
        }
        let parsed = Config::builder()
            .add_source(File::new(file, FileFormat::Ini))
            .build()
            .and_then(|c| c.try_deserialize::<std::collections::HashMap<String, String>>());
        match parsed {
            Ok(map) => {
                for (key, value) in map {
                    // config lower-cases keys; env names are upper-case
                    values
                        .entry(key.to_uppercase())
                        .or_insert_with(|| value.trim_matches('"').to_string());
                }
            }
            Err(e) => tracing::warn!(file = %file, error = %e, "Failed to read env file"),
        }
    }
    values
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            static_dir: "api/static".to_string(),
            templates_dir: "api/templates".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: None,
            render: false,
            render_disk_path: "/var/data".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 30,
        }
    }
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: None,
            database_id: None,
            api_base: "https://api.notion.com".to_string(),
            version: "2022-06-28".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for MakeConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            api_key: None,
            test_email: "test@example.com".to_string(),
            timeout_seconds: 7,
            max_attempts: 1,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_hours: 24 * 7,
            lockout_threshold: 8,
            lockout_window_minutes: 5,
            secure_cookies: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 0 16 * * *".to_string(),
            timezone: "Asia/Jerusalem".to_string(),
            run_on_startup: true,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_catches_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_bad_cron() {
        let mut settings = Settings::default();
        settings.scheduler.cron = "every day".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_bad_timezone() {
        let mut settings = Settings::default();
        settings.scheduler.timezone = "Mars/Olympus".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_postgres_scheme_is_rewritten() {
        let config = DatabaseConfig {
            url: Some("postgres://u:p@db:5432/app".to_string()),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.kind, DatabaseKind::Postgres);
        assert_eq!(resolved.url, "postgresql://u:p@db:5432/app");
    }

    #[test]
    fn test_unset_url_falls_back_to_local_sqlite() {
        let resolved = DatabaseConfig::default().resolve().unwrap();
        assert_eq!(resolved.kind, DatabaseKind::Sqlite);
        assert_eq!(resolved.url, "sqlite://scholarship_autopilot.db?mode=rwc");
    }

    #[test]
    fn test_render_disk_is_used_when_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            render: true,
            render_disk_path: dir.path().join("disk").display().to_string(),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();
        let file = resolved.sqlite_file.unwrap();
        assert!(file.ends_with("disk/scholarship_autopilot.db"));
        assert!(file.parent().unwrap().exists());
    }

    #[test]
    fn test_admin_email_is_normalized() {
        let admin = AdminConfig {
            email: Some("  Admin@Example.COM ".to_string()),
            alerts_feed_token: None,
        };
        assert_eq!(admin.normalized_email().as_deref(), Some("admin@example.com"));
    }
}
