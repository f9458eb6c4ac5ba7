use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the optional settings file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hibernation-helper/config.toml";

/// Prefix for environment overrides, e.g. `HIBERNATION_HELPER__PRIVILEGE__TIMEOUT_SECS=60`
pub const ENV_PREFIX: &str = "HIBERNATION_HELPER";

/// Main configuration for Hibernation Helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Managed swap file settings
    pub swap: SwapConfig,

    /// Bootloader argument tool
    pub bootloader: BootloaderConfig,

    /// Privileged execution boundary
    pub privilege: PrivilegeConfig,

    /// Hibernation test trigger
    pub tester: TesterConfig,

    /// Logging configuration
    pub logging: LogConfig,
}

/// Swap file created and removed by this tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Path of the managed swap file (default: /swapfile)
    pub file_path: PathBuf,

    /// Free space to leave on the filesystem after creating the file, in GiB (default: 2)
    pub headroom_gib: u64,

    /// fstab used to persist swap activation (default: /etc/fstab)
    pub fstab_path: PathBuf,
}

/// Kernel argument editing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootloaderConfig {
    /// grubby-compatible tool (default: "grubby")
    pub tool: String,

    /// Extra command run after arguments change, e.g. ["grub2-mkconfig", "-o", "/boot/grub2/grub.cfg"]
    /// (default: empty, grubby persists BLS entries itself)
    pub regenerate_command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
    /// Authentication broker prepended to privileged commands (default: ["pkexec"])
    pub escalation_command: Vec<String>,

    /// Timeout for any external command in seconds (default: 300)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HibernateMethod {
    /// org.freedesktop.login1 over D-Bus
    Logind,
    /// `systemctl hibernate` through the escalation command
    Systemctl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    /// How to trigger hibernation (default: logind)
    pub method: HibernateMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log directory; the user state directory when unset
    pub log_dir: Option<PathBuf>,

    /// Default filter when RUST_LOG is unset (default: "info")
    pub level: String,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("/swapfile"),
            headroom_gib: 2,
            fstab_path: PathBuf::from("/etc/fstab"),
        }
    }
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        Self {
            tool: "grubby".to_string(),
            regenerate_command: Vec::new(),
        }
    }
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            escalation_command: vec!["pkexec".to_string()],
            timeout_secs: 300,
        }
    }
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            method: HibernateMethod::Logind,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file layered with
    /// `HIBERNATION_HELPER__<SECTION>__<KEY>` environment variables.
    ///
    /// A missing file is not an error; defaults fill every absent key.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("privilege.escalation_command")
                    .with_list_parse_key("bootloader.regenerate_command")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, without environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let swap_path = &self.swap.file_path;
        if !swap_path.is_absolute() {
            return Err(Error::Config(format!(
                "Swap file path must be absolute, got: {}",
                swap_path.display()
            )));
        }

        // The path is spliced into fstab lines and a sed address
        let swap_str = swap_path.to_string_lossy();
        if swap_str.contains('|') || swap_str.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "Swap file path must not contain '|' or whitespace, got: {}",
                swap_str
            )));
        }

        if swap_path.parent().is_none() || swap_path == Path::new("/") {
            return Err(Error::Config("Swap file path must name a file".to_string()));
        }

        if !self.swap.fstab_path.is_absolute() {
            return Err(Error::Config(format!(
                "fstab path must be absolute, got: {}",
                self.swap.fstab_path.display()
            )));
        }

        if self.bootloader.tool.trim().is_empty() {
            return Err(Error::Config("Bootloader tool must be set".to_string()));
        }

        if self.privilege.timeout_secs == 0 {
            return Err(Error::Config("Command timeout must be > 0".to_string()));
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.privilege.timeout_secs)
    }

    /// Directory holding the managed swap file
    pub fn swap_dir(&self) -> &Path {
        self.swap
            .file_path
            .parent()
            .unwrap_or_else(|| Path::new("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.swap.file_path, PathBuf::from("/swapfile"));
        assert_eq!(config.swap.headroom_gib, 2);
        assert_eq!(config.bootloader.tool, "grubby");
        assert!(config.bootloader.regenerate_command.is_empty());
        assert_eq!(config.privilege.escalation_command, vec!["pkexec"]);
        assert_eq!(config.privilege.timeout_secs, 300);
        assert_eq!(config.tester.method, HibernateMethod::Logind);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_relative_swap_path() {
        let mut config = Config::default();
        config.swap.file_path = PathBuf::from("swapfile");

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_config_validation_pipe_in_swap_path() {
        let mut config = Config::default();
        config.swap.file_path = PathBuf::from("/swap|file");
        assert!(config.validate().is_err());

        config.swap.file_path = PathBuf::from("/swap file");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.privilege.timeout_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_swap_dir() {
        let mut config = Config::default();
        assert_eq!(config.swap_dir(), Path::new("/"));

        config.swap.file_path = PathBuf::from("/var/swap/hibernate.swap");
        assert_eq!(config.swap_dir(), Path::new("/var/swap"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[swap]"));
        assert!(toml_str.contains("[privilege]"));
        assert!(toml_str.contains("method = \"logind\""));
    }

    #[test]
    fn test_config_partial_deserialization() {
        let toml_str = r#"
            [swap]
            file_path = "/var/swapfile"

            [tester]
            method = "systemctl"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.swap.file_path, PathBuf::from("/var/swapfile"));
        assert_eq!(config.swap.headroom_gib, 2);
        assert_eq!(config.tester.method, HibernateMethod::Systemctl);
        assert_eq!(config.privilege.timeout_secs, 300);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.bootloader.regenerate_command =
            vec!["grub2-mkconfig".into(), "-o".into(), "/boot/grub2/grub.cfg".into()];
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.swap.file_path, PathBuf::from("/swapfile"));
    }

    #[test]
    fn test_load_layered_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[privilege]\ntimeout_secs = 60\n\n[swap]\nheadroom_gib = 4\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.privilege.timeout_secs, 60);
        assert_eq!(config.swap.headroom_gib, 4);
        assert_eq!(config.bootloader.tool, "grubby");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[swap]\nfile_path = \"relative\"\n").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
