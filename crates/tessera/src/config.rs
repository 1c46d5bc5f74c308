use std::{path::PathBuf, time::Duration};

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{create_dir_all, OpenOptions},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::warn;

use crate::{error::Error, torrent::DownloadOpts};

/// Settings read from `config.toml` in the config folder of the user.
///
/// Every field has a default, so a file with only some of them is valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where downloaded files are written when no output is given.
    pub download_dir: PathBuf,
    /// Port announced to the tracker.
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub attempt_timeout_secs: u64,
    pub tracker_timeout_secs: u64,
    /// Fail the download when no piece completes for this long.
    pub stall_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let download_dir = UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            download_dir,
            port: 6881,
            connect_timeout_secs: 3,
            handshake_timeout_secs: 5,
            attempt_timeout_secs: 30,
            tracker_timeout_secs: 15,
            stall_timeout_secs: None,
        }
    }
}

impl Config {
    /// Path of the configuration file, creating its folder if needed.
    ///
    /// # Errors
    ///
    /// Fails if the user has no home folder, or if the config folder
    /// can't be created.
    pub async fn config_path() -> Result<PathBuf, Error> {
        let dotfile =
            ProjectDirs::from("", "", "Tessera").ok_or(Error::HomeInvalid)?;
        let config_dir = dotfile.config_dir().to_path_buf();

        if !config_dir.exists() {
            create_dir_all(&config_dir).await.map_err(|_| {
                Error::FolderNotFound(
                    "config".into(),
                    config_dir.to_string_lossy().into_owned(),
                )
            })?;
        }

        Ok(config_dir.join("config.toml"))
    }

    /// Load the configuration file and transform it into Self.
    /// If the file does not exist or is empty, it is created with the
    /// default configuration. An invalid file is left untouched and the
    /// defaults are used instead.
    pub async fn load() -> Result<Self, Error> {
        let path = Self::config_path().await?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        let mut content = String::new();
        file.read_to_string(&mut content).await?;

        if content.trim().is_empty() {
            let config = Config::default();
            file.write_all(toml::to_string(&config)?.as_bytes()).await?;
            file.flush().await?;
            return Ok(config);
        }

        match Self::parse(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("{e} at {path:?}, using the default configuration");
                Ok(Config::default())
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, Error> {
        toml::from_str(content).map_err(|_| Error::ConfigDeserializeError)
    }

    pub fn download_opts(&self) -> DownloadOpts {
        DownloadOpts::from(self)
    }

    pub fn tracker_timeout(&self) -> Duration {
        Duration::from_secs(self.tracker_timeout_secs)
    }
}

impl From<&Config> for DownloadOpts {
    fn from(value: &Config) -> Self {
        Self {
            connect_timeout: Duration::from_secs(value.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(value.handshake_timeout_secs),
            attempt_timeout: Duration::from_secs(value.attempt_timeout_secs),
            stall_timeout: value.stall_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_download_opts() {
        let config = Config::default();
        assert_eq!(config.download_opts(), DownloadOpts::default());
        assert_eq!(config.tracker_timeout(), Duration::from_secs(15));
        assert_eq!(config.port, 6881);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config = Config::parse(
            r#"
            download_dir = "/tmp/downloads"
            attempt_timeout_secs = 10
            stall_timeout_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.download_dir, PathBuf::from("/tmp/downloads"));
        assert_eq!(config.port, 6881);

        let opts = config.download_opts();
        assert_eq!(opts.attempt_timeout, Duration::from_secs(10));
        assert_eq!(opts.stall_timeout, Some(Duration::from_secs(120)));
        assert_eq!(opts.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn invalid_file_fails() {
        assert!(matches!(
            Config::parse("port = \"not a port\""),
            Err(Error::ConfigDeserializeError)
        ));
    }

    #[test]
    fn serializes_back() {
        let config = Config::default();
        let s = toml::to_string(&config).unwrap();
        assert_eq!(Config::parse(&s).unwrap(), config);
    }
}
