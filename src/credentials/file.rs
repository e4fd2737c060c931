use super::{parse_credentials, Credential, CredentialSource};
use crate::error::AppError;
use std::fs;
use std::path::{Path, PathBuf};

/// Credentials JSON file written by the Claude login tool.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CredentialSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn load(&self) -> Result<Credential, AppError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            AppError::Credential(format!(
                "cannot read credentials from {}: {e}",
                self.path.display()
            ))
        })?;
        parse_credentials(&raw, &self.path.display().to_string())
    }
}
