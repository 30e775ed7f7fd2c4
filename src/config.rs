use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_directory: String,
    pub directory: DirectoryConfig,
    pub session: SessionConfig,
}

/// Channel-directory tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Channel lifetime from creation or last renewal
    pub ttl_secs: u64,
    /// Period of the in-memory store's expiry sweep
    pub sweep_interval_secs: u64,
    /// Creation attempts before `ExhaustedSlugSpace`
    pub max_slug_attempts: usize,
}

/// Uploader-session tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Period of the directory renewal loop
    pub renewal_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            data_directory: format!("{}/.droplink", home),
            directory: DirectoryConfig {
                ttl_secs: 60 * 60,
                sweep_interval_secs: 60,
                max_slug_attempts: 8,
            },
            session: SessionConfig {
                renewal_interval_secs: 30 * 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from file or fall back to defaults
    pub fn load_or_default(config_path: Option<&str>) -> Self {
        if let Some(config) = config_path
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
        {
            return config;
        }
        Self::default()
    }

    /// Save configuration to file
    pub fn save_to_file(&self, config_path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.data_directory)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.directory.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.directory.sweep_interval_secs)
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.session.renewal_interval_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.directory.ttl_secs == 0 {
            anyhow::bail!("channel TTL must be greater than 0");
        }
        if self.directory.sweep_interval_secs == 0 {
            anyhow::bail!("sweep interval must be greater than 0");
        }
        if self.directory.max_slug_attempts == 0 {
            anyhow::bail!("max slug attempts must be greater than 0");
        }
        if self.session.renewal_interval_secs >= self.directory.ttl_secs {
            anyhow::bail!("renewal interval must be shorter than the channel TTL");
        }
        Ok(())
    }
}
