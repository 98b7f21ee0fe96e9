use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::Deserialize;

pub const DEFAULT_CREDENTIALS_FILE: &str = "serviceAccountKey.json";

pub struct Config {
    pub db_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "goalseed").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("goalseed.db");

        Ok(Config { db_path })
    }
}

/// The parts of a Google service-account key file this tool reads.
#[derive(Debug, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
}

impl ServiceAccount {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
        let account: ServiceAccount = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid service account file: {}", path.display()))?;
        if account.project_id.trim().is_empty() {
            bail!("Service account file has an empty project_id: {}", path.display());
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_service_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CREDENTIALS_FILE);
        std::fs::write(
            &path,
            r#"{
                "type": "service_account",
                "project_id": "fitness-app-1234",
                "private_key_id": "abc",
                "client_email": "admin@fitness-app-1234.iam.gserviceaccount.com"
            }"#,
        )
        .unwrap();

        let account = ServiceAccount::load(&path).unwrap();
        assert_eq!(account.project_id, "fitness-app-1234");
        assert_eq!(
            account.client_email.as_deref(),
            Some("admin@fitness-app-1234.iam.gserviceaccount.com")
        );
    }

    #[test]
    fn test_load_service_account_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceAccount::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read credentials file"));
    }

    #[test]
    fn test_load_service_account_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, r#"{ "project_id": "  " }"#).unwrap();
        assert!(ServiceAccount::load(&path).is_err());
    }
}
