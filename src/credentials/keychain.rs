use super::{parse_credentials, Credential, CredentialSource};
use crate::error::AppError;

/// Service name the Claude login tool uses for its secret store entry.
pub const KEYCHAIN_SERVICE: &str = "Claude Code-credentials";

/// OS secret store entry holding the same JSON document as the credentials file.
pub struct KeychainSource {
    service: String,
    account: String,
}

impl KeychainSource {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    /// Entry keyed by the current OS user name.
    pub fn for_current_user() -> Self {
        let account = ["USER", "LOGNAME", "USERNAME"]
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
            .unwrap_or_default();
        Self::new(KEYCHAIN_SERVICE, account)
    }
}

impl CredentialSource for KeychainSource {
    fn describe(&self) -> String {
        format!("keychain {}/{}", self.service, self.account)
    }

    fn load(&self) -> Result<Credential, AppError> {
        if self.account.is_empty() {
            return Err(AppError::Credential(
                "cannot determine current user for keychain lookup".into(),
            ));
        }
        let entry = keyring::Entry::new(&self.service, &self.account)?;
        let raw = match entry.get_password() {
            Ok(raw) => raw,
            Err(keyring::Error::NoEntry) => {
                return Err(AppError::Credential(format!(
                    "no credentials in {}",
                    self.describe()
                )))
            }
            Err(e) => return Err(AppError::Keyring(e)),
        };
        parse_credentials(raw.trim(), &self.describe())
    }
}
