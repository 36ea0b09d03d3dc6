use healio_crypto::cipher::MessageCipher;
use healio_crypto::error::CryptoError;
use healio_shared::constants::DEFAULT_SNAPSHOT_BUFFER;
use serde::Deserialize;

/// Messaging configuration loaded from config.toml with env var overrides.
#[derive(Clone, Deserialize)]
pub struct MessagingConfig {
    /// Pre-shared secret every client uses to encrypt message bodies.
    /// No default; must be set in the file or via `HEALIO_SHARED_SECRET`.
    #[serde(default)]
    pub shared_secret: String,
    /// Tracing log level. Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Snapshots buffered per conversation before slow subscribers skip ahead. Default: 64
    #[serde(default = "default_snapshot_buffer")]
    pub snapshot_buffer: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_snapshot_buffer() -> usize {
    DEFAULT_SNAPSHOT_BUFFER
}

impl std::fmt::Debug for MessagingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingConfig")
            .field("shared_secret", &"[REDACTED]")
            .field("log_level", &self.log_level)
            .field("snapshot_buffer", &self.snapshot_buffer)
            .finish()
    }
}

impl MessagingConfig {
    /// Load configuration from TOML file with environment variable overrides.
    ///
    /// Reads `config.toml` from CWD (or path in `CONFIG_PATH` env var). A
    /// missing file is not an error as long as the environment supplies the
    /// shared secret.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(format!("failed to read {path}: {e}").into()),
        };
        Self::from_toml_str(&contents)
    }

    /// Load configuration from a TOML string, then apply env var overrides.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config: MessagingConfig = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the config.
    ///
    /// Returns an error if an env var is set but has an invalid format
    /// (e.g., SNAPSHOT_BUFFER=abc).
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(val) = std::env::var("HEALIO_SHARED_SECRET") {
            self.shared_secret = val;
        }
        if let Ok(val) = std::env::var("LOG_LEVEL") {
            self.log_level = val;
        }
        if let Ok(val) = std::env::var("SNAPSHOT_BUFFER") {
            self.snapshot_buffer = val
                .parse()
                .map_err(|_| format!("invalid SNAPSHOT_BUFFER value: {val}"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.shared_secret.is_empty() {
            return Err("shared_secret must be set (config.toml or HEALIO_SHARED_SECRET)".into());
        }
        if self.snapshot_buffer == 0 {
            return Err("snapshot_buffer must be greater than zero".into());
        }
        Ok(())
    }

    /// Build the message cipher from the configured secret.
    pub fn cipher(&self) -> Result<MessageCipher, CryptoError> {
        MessageCipher::from_secret(&self.shared_secret)
    }
}
