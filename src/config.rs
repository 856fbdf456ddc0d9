use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, OptionExt, Result, eyre};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: u64 = 500;
pub const DEFAULT_PLAYLIST_MAX_LENGTH: i32 = 11000;
pub const DEFAULT_REDISCOVER_INTERVAL_SECS: u64 = 180;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    database: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_playlist_max_length")]
    pub playlist_max_length: i32,
    #[serde(default = "default_rediscover_interval_secs")]
    pub rediscover_interval_secs: u64,
    #[serde(default)]
    spotify: Option<SpotifyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Account that owns the managed playlists.
    pub user_id: String,
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_playlist_max_length() -> i32 {
    DEFAULT_PLAYLIST_MAX_LENGTH
}

fn default_rediscover_interval_secs() -> u64 {
    DEFAULT_REDISCOVER_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "~/.local/share/channel-mirror/channel-mirror.db".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            playlist_max_length: DEFAULT_PLAYLIST_MAX_LENGTH,
            rediscover_interval_secs: DEFAULT_REDISCOVER_INTERVAL_SECS,
            spotify: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context(format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .context(format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size < 1 {
            return Err(eyre!("batch_size must be at least 1"));
        }
        if self.playlist_max_length < 1 {
            return Err(eyre!("playlist_max_length must be at least 1"));
        }
        Ok(())
    }

    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("channel-mirror").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or_eyre("Config directory not found")?;

        Self::from_file(&config_path)
    }

    /// Write a default config file unless one already exists
    pub fn create_default() -> Result<PathBuf> {
        let config_path = Self::config_path().ok_or_eyre("Config directory not found")?;
        Self::default().write_if_missing(&config_path)?;
        Ok(config_path)
    }

    fn write_if_missing(&self, path: &Path) -> Result<()> {
        if path.exists() {
            tracing::info!("Config already exists at: {}", path.display());
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create config directory: {}",
                parent.display()
            ))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents)
            .context(format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.expand_path(&self.database)
    }

    /// Spotify credentials from the config file, falling back to the environment
    pub fn spotify_config(&self) -> Result<SpotifyConfig> {
        if let Some(ref spotify) = self.spotify {
            return Ok(spotify.clone());
        }

        let var = |name: &str| {
            std::env::var(name).wrap_err(format!("{name} is not set and config has no [spotify]"))
        };
        Ok(SpotifyConfig {
            client_id: var("SPOTIFY_CLIENT_ID")?,
            client_secret: var("SPOTIFY_CLIENT_SECRET")?,
            user_id: var("SPOTIFY_USER")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"/tmp/mirror.db\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/mirror.db"));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.playlist_max_length, DEFAULT_PLAYLIST_MAX_LENGTH);
        assert_eq!(
            config.rediscover_interval_secs,
            DEFAULT_REDISCOVER_INTERVAL_SECS
        );
    }

    #[test]
    fn test_from_file_reads_spotify_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database = "/tmp/mirror.db"
batch_size = 10

[spotify]
client_id = "id"
client_secret = "secret"
user_id = "mirror"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        let spotify = config.spotify_config().unwrap();

        assert_eq!(config.batch_size, 10);
        assert_eq!(spotify.client_id, "id");
        assert_eq!(spotify.user_id, "mirror");
    }

    #[test]
    fn test_from_file_rejects_empty_playlists() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"/tmp/mirror.db\"\nplaylist_max_length = 0").unwrap();

        let error = Config::from_file(file.path()).unwrap_err();
        assert!(format!("{error:?}").contains("playlist_max_length must be at least 1"));
    }

    #[test]
    fn test_from_file_rejects_zero_batch_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database = \"/tmp/mirror.db\"\nbatch_size = 0").unwrap();

        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_write_if_missing_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::default().write_if_missing(&path).unwrap();
        let written = Config::from_file(&path).unwrap();
        assert_eq!(written.batch_size, DEFAULT_BATCH_SIZE);

        std::fs::write(&path, "database = \"/elsewhere.db\"\n").unwrap();
        Config::default().write_if_missing(&path).unwrap();
        let kept = Config::from_file(&path).unwrap();
        assert_eq!(kept.database_path(), PathBuf::from("/elsewhere.db"));
    }

    #[test]
    fn test_expand_home() {
        let config = Config::default();
        let expanded = config.expand_path("~/music.db");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("music.db"));
        }
    }
}
