// Configuration loading and parsing (tierlist.toml, credentials.toml).

use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    /// Interface the WebSocket server binds to.
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub leaderboard: LeaderboardConfig,
    pub chat: ChatConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// tierlist.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire tierlist.toml file.
#[derive(Debug, Clone, Deserialize)]
struct TierlistFile {
    server: ServerSection,
    database: DatabaseSection,
    leaderboard: LeaderboardConfig,
    chat: ChatConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeaderboardConfig {
    /// Rows returned by the overall and per-gamemode leaderboards.
    pub page_size: usize,
    /// Maximum number of search results.
    pub search_limit: usize,
    /// Players initially shown per tier column, and the step used by
    /// "load more".
    pub tier_page_size: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        LeaderboardConfig {
            page_size: 50,
            search_limit: 20,
            tier_page_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Path to a plain-text knowledge base fed to the support assistant.
    /// Relative paths resolve against the working directory.
    #[serde(default)]
    pub knowledge_base: Option<String>,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub anthropic_api_key: Option<String>,
    /// Seeds the `owner_password` auth record on first start.
    pub owner_password: Option<String>,
    /// Seeds the `general_password` auth record on first start. Logging in
    /// with it leads to the staff onboarding form.
    pub general_password: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/tierlist.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// This does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- tierlist.toml (required) ---
    let main_path = config_dir.join("tierlist.toml");
    let main_text = read_file(&main_path)?;
    let file: TierlistFile = toml::from_str(&main_text).map_err(|e| ConfigError::ParseError {
        path: main_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        host: file.server.host,
        port: file.server.port,
        db_path: file.database.path,
        leaderboard: file.leaderboard,
        chat: file.chat,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Keep the operator's copy.
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.host.parse::<IpAddr>().is_err() {
        return Err(ConfigError::ValidationError {
            field: "server.host".into(),
            message: format!("`{}` is not an IP address", config.host),
        });
    }

    if config.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    let lb = &config.leaderboard;
    let sizes: &[(&str, usize)] = &[
        ("leaderboard.page_size", lb.page_size),
        ("leaderboard.search_limit", lb.search_limit),
        ("leaderboard.tier_page_size", lb.tier_page_size),
    ];
    for (name, val) in sizes {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if config.chat.max_tokens == 0 {
        return Err(ConfigError::ValidationError {
            field: "chat.max_tokens".into(),
            message: "must be > 0".into(),
        });
    }

    // The two passwords select different login paths, so they must differ.
    let creds = &config.credentials;
    if let (Some(owner), Some(general)) = (&creds.owner_password, &creds.general_password) {
        if !owner.is_empty() && owner == general {
            return Err(ConfigError::ValidationError {
                field: "credentials.general_password".into(),
                message: "must differ from owner_password".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Workspace root, where defaults/ lives.
    fn project_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    /// Fresh temp dir with config/ created.
    fn temp_config_dir(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        tmp
    }

    fn default_main_toml() -> String {
        fs::read_to_string(project_root().join("defaults/tierlist.toml")).unwrap()
    }

    #[test]
    fn load_valid_config_from_defaults() {
        let tmp = temp_config_dir("tierlist_config_defaults");
        fs::write(tmp.join("config/tierlist.toml"), default_main_toml()).unwrap();

        let config = load_config_from(&tmp).expect("should load valid config");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.db_path, "tierlist.db");
        assert_eq!(config.leaderboard, LeaderboardConfig::default());
        assert_eq!(config.chat.max_tokens, 500);
        assert_eq!(config.chat.knowledge_base.as_deref(), Some("data/knowledge_base.md"));
        assert!(config.credentials.anthropic_api_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_is_read() {
        let tmp = temp_config_dir("tierlist_config_creds");
        fs::write(tmp.join("config/tierlist.toml"), default_main_toml()).unwrap();
        fs::write(
            tmp.join("config/credentials.toml"),
            "anthropic_api_key = \"sk-ant-test\"\nowner_password = \"owner-pw\"\ngeneral_password = \"staff-pw\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).unwrap();
        assert_eq!(config.credentials.anthropic_api_key.as_deref(), Some("sk-ant-test"));
        assert_eq!(config.credentials.owner_password.as_deref(), Some("owner-pw"));
        assert_eq!(config.credentials.general_password.as_deref(), Some("staff-pw"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_example_parses() {
        let text =
            fs::read_to_string(project_root().join("defaults/credentials.toml.example")).unwrap();
        let creds: CredentialsConfig = toml::from_str(&text).unwrap();
        assert!(creds.owner_password.is_some());
    }

    #[test]
    fn server_host_is_configurable() {
        let tmp = temp_config_dir("tierlist_config_host");
        let public = default_main_toml().replace("host = \"127.0.0.1\"", "host = \"0.0.0.0\"");
        fs::write(tmp.join("config/tierlist.toml"), public).unwrap();
        assert_eq!(load_config_from(&tmp).unwrap().host, "0.0.0.0");

        let missing = default_main_toml().replace("host = \"127.0.0.1\"\n", "");
        fs::write(tmp.join("config/tierlist.toml"), missing).unwrap();
        assert_eq!(load_config_from(&tmp).unwrap().host, "127.0.0.1");

        let bad = default_main_toml().replace("host = \"127.0.0.1\"", "host = \"tierlist.gg\"");
        fs::write(tmp.join("config/tierlist.toml"), bad).unwrap();
        match load_config_from(&tmp).unwrap_err() {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, "server.host"),
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_zero_tier_page_size() {
        let tmp = temp_config_dir("tierlist_config_zero_page");
        let modified = default_main_toml().replace("tier_page_size = 10", "tier_page_size = 0");
        fs::write(tmp.join("config/tierlist.toml"), modified).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "leaderboard.tier_page_size");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_identical_passwords() {
        let tmp = temp_config_dir("tierlist_config_same_pw");
        fs::write(tmp.join("config/tierlist.toml"), default_main_toml()).unwrap();
        fs::write(
            tmp.join("config/credentials.toml"),
            "owner_password = \"same\"\ngeneral_password = \"same\"\n",
        )
        .unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => {
                assert_eq!(field, "credentials.general_password");
            }
            other => panic!("expected ValidationError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_main_toml() {
        let tmp = temp_config_dir("tierlist_config_missing");

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("tierlist.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = temp_config_dir("tierlist_config_invalid");
        fs::write(tmp.join("config/tierlist.toml"), "this is not valid [[[ toml").unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_and_skips_examples() {
        let tmp = std::env::temp_dir().join("tierlist_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::write(defaults_dir.join("tierlist.toml"), default_main_toml()).unwrap();
        fs::write(defaults_dir.join("credentials.toml.example"), "owner_password = \"x\"\n")
            .unwrap();

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(copied.len(), 1);
        assert!(tmp.join("config/tierlist.toml").exists());
        assert!(!tmp.join("config/credentials.toml.example").exists());

        // Second run keeps the existing copy.
        fs::write(tmp.join("config/tierlist.toml"), "# custom\n").unwrap();
        let copied = ensure_config_files(&tmp).unwrap();
        assert!(copied.is_empty());
        let content = fs::read_to_string(tmp.join("config/tierlist.toml")).unwrap();
        assert_eq!(content, "# custom\n");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("tierlist_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither defaults/ nor config/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
