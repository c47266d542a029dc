use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::settings::SettingsStore;

/// Which bootloader flavour an [`Env`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Grub,
    Burg,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Grub => write!(f, "grub"),
            Mode::Burg => write!(f, "burg"),
        }
    }
}

/// Immutable snapshot of the paths and commands for one bootloader
/// flavour under one (possibly chrooted) root. Built once by
/// [`Env::probe`] and passed by reference into every operation.
#[derive(Debug, Clone)]
pub struct Env {
    pub mode: Mode,
    /// Chroot-style path prefix, empty when operating on `/`.
    pub cfg_dir_prefix: String,
    pub cfg_dir: PathBuf,
    pub cfg_dir_noprefix: String,
    pub output_config_file: PathBuf,
    pub output_config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Source location of the rule-interpreting proxy binary installed
    /// into `<cfg_dir>/bin` at save time.
    pub proxy_bin_source: PathBuf,
    pub mkconfig_cmd: String,
    pub update_cmd: String,
    pub install_cmd: String,
    /// `chroot '<prefix>' ` when a prefix is set, already folded into
    /// the command strings above.
    pub cmd_prefix: String,
}

impl Env {
    /// Build the environment for `mode` under `dir_prefix`. Pure apart
    /// from reading an optional override file at
    /// `<prefix>/etc/bootcraft/<mode>.cfg`; never mutates anything.
    pub fn probe(mode: Mode, dir_prefix: &str) -> Self {
        let (mut mkconfig_cmd, install_cmd, cfg_dir_noprefix, output_dir, output_file, settings);
        match mode {
            Mode::Grub => {
                mkconfig_cmd = "grub-mkconfig".to_string();
                install_cmd = "grub-install".to_string();
                cfg_dir_noprefix = "/etc/grub.d".to_string();
                output_dir = "/boot/grub".to_string();
                output_file = "/boot/grub/grub.cfg".to_string();
                settings = "/etc/default/grub".to_string();
            }
            Mode::Burg => {
                mkconfig_cmd = "burg-mkconfig".to_string();
                install_cmd = "burg-install".to_string();
                cfg_dir_noprefix = "/etc/burg.d".to_string();
                output_dir = "/boot/burg".to_string();
                output_file = "/boot/burg/burg.cfg".to_string();
                settings = "/etc/default/burg".to_string();
            }
        }

        let mut env = Self {
            mode,
            cfg_dir_prefix: dir_prefix.to_string(),
            cfg_dir: PathBuf::from(format!("{}{}", dir_prefix, cfg_dir_noprefix)),
            cfg_dir_noprefix,
            output_config_file: PathBuf::from(format!("{}{}", dir_prefix, output_file)),
            output_config_dir: PathBuf::from(format!("{}{}", dir_prefix, output_dir)),
            settings_file: PathBuf::from(format!("{}{}", dir_prefix, settings)),
            proxy_bin_source: PathBuf::from(format!(
                "{}/usr/lib/bootcraft/grubcfg-proxy",
                dir_prefix
            )),
            mkconfig_cmd,
            update_cmd: String::new(),
            install_cmd,
            cmd_prefix: String::new(),
        };

        let override_file = format!("{}/etc/bootcraft/{}.cfg", dir_prefix, mode);
        if let Ok(store) = SettingsStore::from_file(override_file.as_ref()) {
            log::info!("using custom {} configuration from {}", mode, override_file);
            env.apply_overrides(&store, dir_prefix);
        }

        mkconfig_cmd = env.mkconfig_cmd.clone();
        let output_noprefix = env
            .output_config_file
            .to_string_lossy()
            .strip_prefix(dir_prefix)
            .map(str::to_string)
            .unwrap_or_else(|| env.output_config_file.to_string_lossy().to_string());
        env.update_cmd = format!("{} -o \"{}\"", mkconfig_cmd, output_noprefix);

        if !dir_prefix.is_empty() {
            env.cmd_prefix = format!("chroot '{}' ", dir_prefix);
            env.mkconfig_cmd = format!("{}{}", env.cmd_prefix, env.mkconfig_cmd);
            env.update_cmd = format!("{}{}", env.cmd_prefix, env.update_cmd);
            env.install_cmd = format!("{}{}", env.cmd_prefix, env.install_cmd);
        }
        log::info!("update command: {}", env.update_cmd);
        env
    }

    fn apply_overrides(&mut self, store: &SettingsStore, dir_prefix: &str) {
        let take = |key: &str| store.get_value(key).map(str::to_string);
        if let Some(cmd) = take("MKCONFIG_CMD") {
            self.mkconfig_cmd = cmd;
        }
        if let Some(cmd) = take("INSTALL_CMD") {
            self.install_cmd = cmd;
        }
        if let Some(dir) = take("CFG_DIR") {
            self.cfg_dir = PathBuf::from(format!("{}{}", dir_prefix, dir));
            self.cfg_dir_noprefix = dir;
        }
        if let Some(dir) = take("OUTPUT_DIR") {
            self.output_config_dir = PathBuf::from(format!("{}{}", dir_prefix, dir));
        }
        if let Some(file) = take("OUTPUT_FILE") {
            self.output_config_file = PathBuf::from(format!("{}{}", dir_prefix, file));
        }
        if let Some(file) = take("SETTINGS_FILE") {
            self.settings_file = PathBuf::from(format!("{}{}", dir_prefix, file));
        }
    }

    /// Whether the described installation actually exists.
    pub fn is_usable(&self) -> bool {
        self.cfg_dir.is_dir()
    }
}

/// All modes with a usable installation under `dir_prefix`.
pub fn available_modes(dir_prefix: &str) -> Vec<Mode> {
    [Mode::Grub, Mode::Burg]
        .into_iter()
        .filter(|&mode| Env::probe(mode, dir_prefix).is_usable())
        .collect()
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub use_burg: bool,
    #[serde(default)]
    pub root_prefix: String,
    #[serde(default)]
    pub verbose_logging: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            use_burg: false,
            root_prefix: String::new(),
            verbose_logging: false,
        }
    }
}

/// Get the configuration directory: `<user config dir>/bootcraft`
pub fn get_config_dir() -> Result<PathBuf, String> {
    let base = dirs::config_dir().ok_or("Failed to resolve user config directory")?;
    let config_dir = base.join("bootcraft");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    Ok(config_dir)
}

impl AppConfig {
    /// Load the saved preferences, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        let path = match get_config_dir() {
            Ok(dir) => dir.join("config.json"),
            Err(e) => {
                log::warn!("config dir unavailable: {}", e);
                return Self::default();
            }
        };
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("invalid config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<(), String> {
        let path = get_config_dir()?.join("config.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_grub_defaults() {
        let env = Env::probe(Mode::Grub, "");
        assert_eq!(env.cfg_dir, PathBuf::from("/etc/grub.d"));
        assert_eq!(env.mkconfig_cmd, "grub-mkconfig");
        assert_eq!(env.update_cmd, "grub-mkconfig -o \"/boot/grub/grub.cfg\"");
        assert!(env.cmd_prefix.is_empty());
    }

    #[test]
    fn test_probe_with_prefix_wraps_commands_in_chroot() {
        let env = Env::probe(Mode::Burg, "/mnt/root");
        assert_eq!(env.cfg_dir, PathBuf::from("/mnt/root/etc/burg.d"));
        assert_eq!(env.cmd_prefix, "chroot '/mnt/root' ");
        assert_eq!(
            env.update_cmd,
            "chroot '/mnt/root' burg-mkconfig -o \"/boot/burg/burg.cfg\""
        );
        assert_eq!(env.settings_file, PathBuf::from("/mnt/root/etc/default/burg"));
    }

    #[test]
    fn test_probe_reads_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().to_string_lossy().to_string();
        let cfg_dir = dir.path().join("etc/bootcraft");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("grub.cfg"),
            "MKCONFIG_CMD=\"grub2-mkconfig\"\nCFG_DIR=\"/etc/grub2.d\"\nOUTPUT_FILE=\"/boot/grub2/grub.cfg\"\n",
        )
        .unwrap();

        let env = Env::probe(Mode::Grub, &prefix);
        assert_eq!(env.cfg_dir_noprefix, "/etc/grub2.d");
        assert!(env.update_cmd.ends_with("grub2-mkconfig -o \"/boot/grub2/grub.cfg\""));
    }

    #[test]
    fn test_available_modes_requires_cfg_dir() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().to_string_lossy().to_string();
        assert!(available_modes(&prefix).is_empty());

        std::fs::create_dir_all(dir.path().join("etc/burg.d")).unwrap();
        assert_eq!(available_modes(&prefix), vec![Mode::Burg]);
    }

    #[test]
    fn test_app_config_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.use_burg);
        assert!(config.root_prefix.is_empty());
    }
}
