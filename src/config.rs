use crate::error::AppError;
use crate::projection::ProjectionWindows;
use chrono::Duration;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const SERVICE_NAME: &str = "claude-quota";
pub const DEFAULT_USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";

const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
/// Longest projection window accepted from config: one leap year.
const MAX_WINDOW_HOURS: u64 = 24 * 366;

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var("CLAUDE_QUOTA_HOME") {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "claude-quota", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".claude-quota"))
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSourceKind {
    /// OS secret store first where one exists, then the credentials file.
    #[default]
    Auto,
    File,
    Keychain,
}

impl CredentialSourceKind {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "file" => Some(Self::File),
            "keychain" => Some(Self::Keychain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WindowSettings {
    pub five_hour_hours: Option<u64>,
    pub seven_day_hours: Option<u64>,
    pub seven_day_sonnet_hours: Option<u64>,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            five_hour_hours: Some(5),
            seven_day_hours: Some(24 * 7),
            seven_day_sonnet_hours: None,
        }
    }
}

impl WindowSettings {
    pub fn to_projection_windows(&self) -> ProjectionWindows {
        let hours = |h: Option<u64>| {
            h.and_then(|h| i64::try_from(h).ok())
                .and_then(Duration::try_hours)
        };
        ProjectionWindows {
            five_hour: hours(self.five_hour_hours),
            seven_day: hours(self.seven_day_hours),
            seven_day_sonnet: hours(self.seven_day_sonnet_hours),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub poll_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claude_home: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_url: Option<String>,
    pub credential_source: CredentialSourceKind,
    pub windows: WindowSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            claude_home: None,
            usage_url: None,
            credential_source: CredentialSourceKind::Auto,
            windows: WindowSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn usage_url(&self) -> Result<url::Url, AppError> {
        Ok(url::Url::parse(
            self.usage_url.as_deref().unwrap_or(DEFAULT_USAGE_URL),
        )?)
    }
}

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub poll_interval_seconds: Option<u64>,
    pub claude_home: Option<PathBuf>,
    pub credential_source: Option<CredentialSourceKind>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config.toml"))
}

/// `<claude_home>/.claude/.credentials.json`, defaulting to the user home.
pub fn credentials_path(config: &AppConfig) -> PathBuf {
    let home = config.claude_home.clone().unwrap_or_else(|| {
        UserDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    });
    home.join(".claude").join(".credentials.json")
}

fn normalize_config(config: &mut AppConfig) -> bool {
    let mut changed = false;

    if config.poll_interval_seconds == 0 {
        warn!(
            fallback = DEFAULT_POLL_INTERVAL_SECONDS,
            "invalid poll_interval_seconds 0 in config, using default"
        );
        config.poll_interval_seconds = DEFAULT_POLL_INTERVAL_SECONDS;
        changed = true;
    }
    if config.request_timeout_seconds == 0 {
        warn!(
            fallback = DEFAULT_REQUEST_TIMEOUT_SECONDS,
            "invalid request_timeout_seconds 0 in config, using default"
        );
        config.request_timeout_seconds = DEFAULT_REQUEST_TIMEOUT_SECONDS;
        changed = true;
    }

    let defaults = WindowSettings::default();
    let windows = &mut config.windows;
    for (name, value, default) in [
        ("five_hour_hours", &mut windows.five_hour_hours, defaults.five_hour_hours),
        ("seven_day_hours", &mut windows.seven_day_hours, defaults.seven_day_hours),
        (
            "seven_day_sonnet_hours",
            &mut windows.seven_day_sonnet_hours,
            defaults.seven_day_sonnet_hours,
        ),
    ] {
        match *value {
            Some(0) => {
                warn!(field = name, "zero-length projection window in config, using default");
                *value = default;
                changed = true;
            }
            Some(hours) if hours > MAX_WINDOW_HOURS => {
                warn!(
                    field = name,
                    hours,
                    max = MAX_WINDOW_HOURS,
                    "projection window too long in config, using default"
                );
                *value = default;
                changed = true;
            }
            _ => {}
        }
    }

    if let Some(raw) = config.usage_url.as_deref() {
        if url::Url::parse(raw).is_err() {
            warn!(usage_url = raw, "invalid usage_url in config, using default");
            config.usage_url = None;
            changed = true;
        }
    }

    changed
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        let cfg = AppConfig::default();
        save_config_to(path, &cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    let mut parsed: AppConfig = toml::from_str(&raw)?;
    if normalize_config(&mut parsed) {
        save_config_to(path, &parsed)?;
    }
    Ok(parsed)
}

pub fn load_config() -> Result<AppConfig, AppError> {
    load_config_from(&config_path()?)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<PathBuf, AppError> {
    let path = config_path()?;
    if !path.exists() {
        save_config_to(&path, &AppConfig::default())?;
    }
    Ok(path)
}

/// Applies environment variables and then command-line values on top of the
/// file config. Priority: flag > env > file.
pub fn apply_overrides<F>(config: &mut AppConfig, overrides: &Overrides, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env("CLAUDE_QUOTA_POLL_INTERVAL") {
        match v.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => config.poll_interval_seconds = secs,
            _ => warn!(value = %v, "ignoring invalid CLAUDE_QUOTA_POLL_INTERVAL"),
        }
    }
    match overrides.poll_interval_seconds {
        Some(0) => warn!("ignoring invalid --poll-interval 0"),
        Some(secs) => config.poll_interval_seconds = secs,
        None => {}
    }

    if let Some(v) = env("CLAUDE_QUOTA_CLAUDE_HOME").filter(|v| !v.is_empty()) {
        config.claude_home = Some(PathBuf::from(v));
    }
    if let Some(home) = &overrides.claude_home {
        config.claude_home = Some(home.clone());
    }

    if let Some(v) = env("CLAUDE_QUOTA_USAGE_URL").filter(|v| !v.is_empty()) {
        match url::Url::parse(&v) {
            Ok(_) => config.usage_url = Some(v),
            Err(e) => warn!(value = %v, error = %e, "ignoring invalid CLAUDE_QUOTA_USAGE_URL"),
        }
    }

    if let Some(v) = env("CLAUDE_QUOTA_CREDENTIAL_SOURCE") {
        match CredentialSourceKind::parse(&v) {
            Some(kind) => config.credential_source = kind,
            None => warn!(value = %v, "ignoring invalid CLAUDE_QUOTA_CREDENTIAL_SOURCE"),
        }
    }
    if let Some(kind) = overrides.credential_source {
        config.credential_source = kind;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        let cfg = load_config_from(&path).expect("load");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.poll_interval_seconds, 300);
        assert!(path.exists());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_seconds = 60\n").expect("write");
        let cfg = load_config_from(&path).expect("load");
        assert_eq!(cfg.poll_interval_seconds, 60);
        assert_eq!(cfg.request_timeout_seconds, 30);
        assert_eq!(cfg.windows, WindowSettings::default());
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_seconds = [").expect("write");
        assert!(matches!(load_config_from(&path), Err(AppError::TomlDe(_))));
    }

    #[test]
    fn normalized_file_is_rewritten() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_seconds = 0\n").expect("write");
        let cfg = load_config_from(&path).expect("load");
        assert_eq!(cfg.poll_interval_seconds, 300);

        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.contains("poll_interval_seconds = 300"));
    }

    #[test]
    fn normalize_replaces_zero_values() {
        let mut cfg = AppConfig {
            poll_interval_seconds: 0,
            request_timeout_seconds: 0,
            usage_url: Some("not a url".into()),
            windows: WindowSettings {
                five_hour_hours: Some(0),
                seven_day_hours: None,
                seven_day_sonnet_hours: Some(168),
            },
            ..AppConfig::default()
        };
        assert!(normalize_config(&mut cfg));
        assert_eq!(cfg.poll_interval_seconds, 300);
        assert_eq!(cfg.request_timeout_seconds, 30);
        assert!(cfg.usage_url.is_none());
        assert_eq!(cfg.windows.five_hour_hours, Some(5));
        assert_eq!(cfg.windows.seven_day_hours, None);
        assert_eq!(cfg.windows.seven_day_sonnet_hours, Some(168));
    }

    #[test]
    fn oversized_windows_fall_back_to_defaults() {
        let mut cfg = AppConfig {
            windows: WindowSettings {
                five_hour_hours: Some(1 << 60),
                seven_day_hours: Some(MAX_WINDOW_HOURS),
                seven_day_sonnet_hours: Some(u64::MAX),
            },
            ..AppConfig::default()
        };
        assert!(normalize_config(&mut cfg));
        assert_eq!(cfg.windows.five_hour_hours, Some(5));
        assert_eq!(cfg.windows.seven_day_hours, Some(MAX_WINDOW_HOURS));
        assert_eq!(cfg.windows.seven_day_sonnet_hours, None);
    }

    #[test]
    fn oversized_window_in_file_loads() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[windows]\nfive_hour_hours = 1152921504606846976\n").expect("write");
        let cfg = load_config_from(&path).expect("load");
        assert_eq!(cfg.windows.five_hour_hours, Some(5));
        assert_eq!(
            cfg.windows.to_projection_windows().five_hour,
            Some(Duration::hours(5))
        );
    }

    #[test]
    fn unrepresentable_window_disables_projection() {
        let windows = WindowSettings {
            five_hour_hours: Some(1 << 60),
            seven_day_hours: Some(u64::MAX),
            seven_day_sonnet_hours: Some(24),
        }
        .to_projection_windows();
        assert_eq!(windows.five_hour, None);
        assert_eq!(windows.seven_day, None);
        assert_eq!(windows.seven_day_sonnet, Some(Duration::hours(24)));
    }

    #[test]
    fn windows_map_to_projection_durations() {
        let windows = WindowSettings::default().to_projection_windows();
        assert_eq!(windows, ProjectionWindows::default());
    }

    #[test]
    fn overrides_prefer_flag_over_env() {
        let mut cfg = AppConfig::default();
        let env = env_of(&[
            ("CLAUDE_QUOTA_POLL_INTERVAL", "120"),
            ("CLAUDE_QUOTA_CLAUDE_HOME", "/env/home"),
            ("CLAUDE_QUOTA_CREDENTIAL_SOURCE", "keychain"),
        ]);
        let flags = Overrides {
            poll_interval_seconds: Some(45),
            claude_home: Some(PathBuf::from("/flag/home")),
            credential_source: None,
        };
        apply_overrides(&mut cfg, &flags, env);
        assert_eq!(cfg.poll_interval_seconds, 45);
        assert_eq!(cfg.claude_home, Some(PathBuf::from("/flag/home")));
        assert_eq!(cfg.credential_source, CredentialSourceKind::Keychain);
    }

    #[test]
    fn env_overrides_file() {
        let mut cfg = AppConfig::default();
        let env = env_of(&[
            ("CLAUDE_QUOTA_POLL_INTERVAL", "120"),
            ("CLAUDE_QUOTA_USAGE_URL", "http://127.0.0.1:9/usage"),
        ]);
        apply_overrides(&mut cfg, &Overrides::default(), env);
        assert_eq!(cfg.poll_interval_seconds, 120);
        assert_eq!(cfg.usage_url.as_deref(), Some("http://127.0.0.1:9/usage"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut cfg = AppConfig::default();
        let env = env_of(&[
            ("CLAUDE_QUOTA_POLL_INTERVAL", "-5"),
            ("CLAUDE_QUOTA_USAGE_URL", "::bad::"),
            ("CLAUDE_QUOTA_CREDENTIAL_SOURCE", "vault"),
        ]);
        apply_overrides(&mut cfg, &Overrides::default(), env);
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn zero_poll_flag_is_ignored() {
        let mut cfg = AppConfig::default();
        let flags = Overrides {
            poll_interval_seconds: Some(0),
            ..Overrides::default()
        };
        apply_overrides(&mut cfg, &flags, |_| None);
        assert_eq!(cfg.poll_interval_seconds, 300);
    }

    #[test]
    fn credentials_path_follows_claude_home() {
        let cfg = AppConfig {
            claude_home: Some(PathBuf::from("/srv/user")),
            ..AppConfig::default()
        };
        assert_eq!(
            credentials_path(&cfg),
            PathBuf::from("/srv/user/.claude/.credentials.json")
        );
    }

    #[test]
    fn credential_source_parse_is_case_insensitive() {
        assert_eq!(CredentialSourceKind::parse(" File "), Some(CredentialSourceKind::File));
        assert_eq!(CredentialSourceKind::parse("AUTO"), Some(CredentialSourceKind::Auto));
        assert_eq!(CredentialSourceKind::parse("vault"), None);
    }
}
