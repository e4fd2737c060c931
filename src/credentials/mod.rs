use crate::config::CredentialSourceKind;
use crate::error::AppError;
use chrono::Utc;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

pub mod file;
pub mod keychain;

pub use file::FileSource;
pub use keychain::KeychainSource;

/// Tokens are treated as expired this long before their stated expiry.
pub const EXPIRY_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    /// Epoch milliseconds. `None` (or 0 in the source) means unknown expiry.
    pub expires_at: Option<i64>,
}

impl Credential {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expires_at {
            None | Some(0) => false,
            Some(expires_at) => now_ms >= expires_at - EXPIRY_MARGIN_MS,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}

/// On-disk / keychain document written by the Claude login tool.
#[derive(Debug, Deserialize)]
struct CredentialsDocument {
    #[serde(rename = "claudeAiOauth")]
    claude_ai_oauth: Option<OAuthEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuthEntry {
    access_token: Option<String>,
    expires_at: Option<i64>,
}

pub(crate) fn parse_credentials(raw: &str, origin: &str) -> Result<Credential, AppError> {
    let doc: CredentialsDocument = serde_json::from_str(raw).map_err(|e| {
        AppError::Credential(format!("cannot parse credentials from {origin}: {e}"))
    })?;

    let oauth = doc.claude_ai_oauth;
    let expires_at = oauth.as_ref().and_then(|o| o.expires_at);
    match oauth.and_then(|o| o.access_token) {
        Some(access_token) if !access_token.is_empty() => Ok(Credential {
            access_token,
            expires_at,
        }),
        _ => Err(AppError::Credential(format!(
            "missing OAuth access token in {origin}"
        ))),
    }
}

pub trait CredentialSource: Send + Sync {
    fn describe(&self) -> String;

    fn load(&self) -> Result<Credential, AppError>;
}

/// Sources to try, in order, for the configured kind on this platform.
pub fn resolve_sources(
    kind: CredentialSourceKind,
    credentials_path: &Path,
) -> Vec<Box<dyn CredentialSource>> {
    let file: Box<dyn CredentialSource> = Box::new(FileSource::new(credentials_path));
    match kind {
        CredentialSourceKind::File => vec![file],
        CredentialSourceKind::Keychain => vec![Box::new(KeychainSource::for_current_user())],
        CredentialSourceKind::Auto if cfg!(target_os = "macos") => {
            vec![Box::new(KeychainSource::for_current_user()), file]
        }
        CredentialSourceKind::Auto => vec![file],
    }
}

fn load_first(sources: &[Box<dyn CredentialSource>]) -> Result<Credential, AppError> {
    let mut last_err = None;
    for (idx, source) in sources.iter().enumerate() {
        match source.load() {
            Ok(credential) => return Ok(credential),
            Err(e) => {
                if idx + 1 < sources.len() {
                    warn!(source = %source.describe(), error = %e, "credential source failed, falling back");
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err
        .unwrap_or_else(|| AppError::Credential("no credential source configured".into())))
}

/// Holds the current bearer token. An external login tool rotates the token;
/// this store only re-reads its sources when the cached one expires.
pub struct CredentialStore {
    sources: Vec<Box<dyn CredentialSource>>,
    current: Mutex<Credential>,
}

impl CredentialStore {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Result<Self, AppError> {
        let credential = load_first(&sources)?;
        Ok(Self::with_credential(sources, credential))
    }

    pub fn with_credential(sources: Vec<Box<dyn CredentialSource>>, credential: Credential) -> Self {
        Self {
            sources,
            current: Mutex::new(credential),
        }
    }

    /// Returns a token that is valid for at least the expiry margin.
    ///
    /// Blocking: the lock is held across a reload, and a keychain reload may
    /// wait on an OS prompt. Async callers run this on the blocking pool.
    pub fn token(&self) -> Result<String, AppError> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if !current.is_expired() {
            return Ok(current.access_token.clone());
        }

        info!("access token expired, reloading credentials");
        let reloaded = load_first(&self.sources).map_err(|e| AppError::TokenReload(Box::new(e)))?;
        *current = reloaded;
        if current.is_expired() {
            return Err(AppError::TokenExpired);
        }
        Ok(current.access_token.clone())
    }
}
