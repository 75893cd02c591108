use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "revsync";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Root of the entity cache tree
  pub cache_location: PathBuf,
  /// Directory the source's downloads land in
  pub download_location: PathBuf,
  pub download: DownloadConfig,
  pub sync: SyncConfig,
}

/// Tuning for the transfer completion detector. Durations are seconds in YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
  #[serde(deserialize_with = "deserialize_seconds")]
  pub poll_interval: Duration,
  /// How long to wait for any sign of a transfer before giving up
  #[serde(deserialize_with = "deserialize_seconds")]
  pub stall_grace: Duration,
  /// Extra wait after a partial file disappears without a finished file
  #[serde(deserialize_with = "deserialize_seconds")]
  pub resume_grace: Duration,
  /// Absolute ceiling per transfer; zero means unbounded. Checked at each
  /// poll, so a transfer fails up to one `poll_interval` past it.
  #[serde(deserialize_with = "deserialize_seconds")]
  pub timeout: Duration,
  /// Glob patterns of in-progress download files
  pub partial_patterns: Vec<String>,
  /// Fall back to the transcoded copy when the original never starts
  pub transcoded_fallback: bool,
  /// Empty the download directory when a sync session starts
  pub clear_on_start: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
  pub max_attempts: u32,
  /// Entities processed between checkpoint refreshes of the listing
  pub checkpoint_interval: usize,
  /// Pause between retry passes
  #[serde(deserialize_with = "deserialize_seconds")]
  pub pass_delay: Duration,
}

impl Default for Config {
  fn default() -> Self {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .unwrap_or_else(|| PathBuf::from("."));
    let app_dir = data_dir.join(APP_NAME);

    // a dedicated directory: it is emptied at session start
    Self {
      cache_location: app_dir.join("cache"),
      download_location: app_dir.join("downloads"),
      download: DownloadConfig::default(),
      sync: SyncConfig::default(),
    }
  }
}

impl Default for DownloadConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(1),
      stall_grace: Duration::from_secs(10),
      resume_grace: Duration::from_secs(1),
      timeout: Duration::ZERO,
      partial_patterns: vec!["*.crdownload".to_string()],
      transcoded_fallback: true,
      clear_on_start: true,
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      checkpoint_interval: 10,
      pass_delay: Duration::from_secs(2),
    }
  }
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
  D: Deserializer<'de>,
{
  let secs = f64::deserialize(deserializer)?;
  Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./revsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/revsync/config.yaml
  ///
  /// Falls back to defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(format!("{}.yaml", APP_NAME));
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let root = path
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or_else(|| Path::new("."));
    Self::from_yaml(&contents, root)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse YAML, resolving path placeholders against `root`.
  pub fn from_yaml(contents: &str, root: &Path) -> Result<Self> {
    let mut config: Config = serde_yaml::from_str(contents)?;
    config.cache_location = qualify_path(&config.cache_location, root);
    config.download_location = qualify_path(&config.download_location, root);

    if config.sync.max_attempts == 0 {
      return Err(eyre!("sync.max_attempts must be at least 1"));
    }
    if config.download.poll_interval.is_zero() {
      return Err(eyre!("download.poll_interval must be positive"));
    }
    for pattern in &config.download.partial_patterns {
      glob::Pattern::new(pattern)
        .map_err(|e| eyre!("download.partial_patterns: invalid glob {:?}: {}", pattern, e))?;
    }

    Ok(config)
  }
}

/// Expand `{ROOT}`, `{PLATFORM}` and a leading `~` in a configured path.
fn qualify_path(path: &Path, root: &Path) -> PathBuf {
  let raw = path.to_string_lossy();
  let expanded = raw
    .replace("{ROOT}", &root.to_string_lossy())
    .replace("{PLATFORM}", std::env::consts::OS);

  match expanded.strip_prefix("~/") {
    Some(rest) => match dirs::home_dir() {
      Some(home) => home.join(rest),
      None => PathBuf::from(expanded),
    },
    None => PathBuf::from(expanded),
  }
}
