// Credentials and the ephemeral gallery-dl config file

use crate::error::{ExtractError, Result};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Username/password pair. The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    pub username: String,
    password: String,
}

impl Login {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Run-scoped authentication context handed to the tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub login: Option<Login>,
    pub cookies: Option<PathBuf>,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_login(mut self, login: Login) -> Self {
        self.login = Some(login);
        self
    }

    pub fn with_cookies(mut self, path: PathBuf) -> Self {
        self.cookies = Some(path);
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.login.is_none() && self.cookies.is_none()
    }

    /// Fails when a cookies file was given but does not exist.
    pub fn check(&self) -> Result<()> {
        match self.cookies {
            Some(ref path) if !path.is_file() => Err(ExtractError::CookiesMissing(path.clone())),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolConfig {
    pub extractor: ExtractorSection,
    pub output: OutputSection,
    pub downloader: DownloaderSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractorSection {
    pub instagram: InstagramOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InstagramOptions {
    pub include: String,
    pub videos: bool,
    pub stories: bool,
    pub highlights: bool,
    pub tagged: bool,
    pub sleep_request: [u64; 2],
    pub sleep_retry: [u64; 2],
    pub timeout: f64,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSection {
    pub log: LogSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSection {
    pub level: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloaderSection {
    pub retries: u32,
    pub timeout: f64,
}

impl ToolConfig {
    /// Posts only, no videos, tool-side request pacing of 2-5 seconds.
    pub fn instagram(verbose: bool) -> Self {
        Self {
            extractor: ExtractorSection {
                instagram: InstagramOptions {
                    include: "posts".to_string(),
                    videos: false,
                    stories: false,
                    highlights: false,
                    tagged: false,
                    sleep_request: [2, 5],
                    sleep_retry: [30, 120],
                    timeout: 30.0,
                    retries: 3,
                    username: None,
                    password: None,
                },
            },
            output: OutputSection {
                log: LogSection {
                    level: if verbose { "info" } else { "warning" }.to_string(),
                },
            },
            downloader: DownloaderSection {
                retries: 3,
                timeout: 30.0,
            },
        }
    }

    pub fn with_login(mut self, login: Option<&Login>) -> Self {
        if let Some(login) = login {
            self.extractor.instagram.username = Some(login.username.clone());
            self.extractor.instagram.password = Some(login.password.clone());
        }
        self
    }

    /// Slower request cadence and a single tool-side retry, for the fallback
    /// listing.
    pub fn conservative(mut self) -> Self {
        self.extractor.instagram.sleep_request = [5, 10];
        self.extractor.instagram.sleep_retry = [60, 300];
        self.extractor.instagram.retries = 1;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the config to a temp file that is deleted when the returned
    /// handle is dropped.
    pub fn write_ephemeral(&self) -> Result<EphemeralConfig> {
        let mut file = tempfile::Builder::new()
            .prefix("instagrab-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(self.to_json()?.as_bytes())?;
        file.flush()?;
        debug!("Wrote gallery-dl config to {}", file.path().display());
        Ok(EphemeralConfig { file })
    }
}

/// Tool config file that lives as long as this value.
#[derive(Debug)]
pub struct EphemeralConfig {
    file: NamedTempFile,
}

impl EphemeralConfig {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_config_json_shape() {
        let json = ToolConfig::instagram(false).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let instagram = &value["extractor"]["instagram"];
        assert_eq!(instagram["include"], "posts");
        assert_eq!(instagram["videos"], false);
        assert_eq!(instagram["sleep-request"], serde_json::json!([2, 5]));
        assert_eq!(instagram["sleep-retry"], serde_json::json!([30, 120]));
        assert_eq!(instagram["timeout"], 30.0);
        assert!(instagram.get("username").is_none());
        assert!(instagram.get("password").is_none());
        assert_eq!(value["output"]["log"]["level"], "warning");
        assert_eq!(value["downloader"]["retries"], 3);
    }

    #[test]
    fn test_config_with_login() {
        let login = Login::new("someone", "hunter2");
        let config = ToolConfig::instagram(true).with_login(Some(&login));
        let value: Value = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(value["extractor"]["instagram"]["username"], "someone");
        assert_eq!(value["extractor"]["instagram"]["password"], "hunter2");
        assert_eq!(value["output"]["log"]["level"], "info");
    }

    #[test]
    fn test_ephemeral_config_removed_on_drop() {
        let config = ToolConfig::instagram(false).write_ephemeral().unwrap();
        let path = config.path().to_path_buf();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"include\": \"posts\""));
        drop(config);
        assert!(!path.exists());
    }

    #[test]
    fn test_login_debug_redacts_password() {
        let login = Login::new("someone", "hunter2");
        let debug = format!("{:?}", login);
        assert!(debug.contains("someone"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_missing_cookies_file_fails_check() {
        let credentials =
            Credentials::anonymous().with_cookies(PathBuf::from("/nonexistent/cookies.txt"));
        assert!(matches!(
            credentials.check(),
            Err(ExtractError::CookiesMissing(_))
        ));
        assert!(Credentials::anonymous().check().is_ok());
    }
}
