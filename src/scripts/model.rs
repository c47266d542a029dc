use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::common::error::ScriptError;

/// Temporary prefix for proxified scripts parked in the config dir
/// between the cleanup and relocation phases of a save.
pub const PARKED_PROXIFIED_PREFIX: &str = "PS_";
/// Same for scripts that were stored directly under a numbered name.
pub const PARKED_DIRECT_PREFIX: &str = "DS_";

/// Name of the subdirectory where scripts shared by several proxies are
/// relocated to.
pub const PROXIFIED_SCRIPTS_DIR: &str = "proxifiedScripts";

/// One parsed boot-menu item from the generator's output. Owned
/// exclusively by its [`Script`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Title captured from the `menuentry` line.
    pub title: String,
    /// Raw generated text block, including the `menuentry` line itself.
    pub content: String,
    /// Label of the content parser which recognized this entry, if any.
    pub parser_label: Option<String>,
    pub is_visible: bool,
}

impl Entry {
    pub fn new(title: String, content: String, parser_label: Option<String>) -> Self {
        Self {
            title,
            content,
            parser_label,
            is_visible: true,
        }
    }
}

/// A physical boot-menu-generating shell script. Identity is the
/// absolute file name.
#[derive(Debug, Clone)]
pub struct Script {
    pub file_name: PathBuf,
    pub name: String,
    /// Permission bits captured before proxying, restored afterwards.
    pub permissions: u32,
    pub entries: Vec<Entry>,
    /// Whether this script was found under the proxified-scripts dir.
    pub is_proxified_data: bool,
}

impl Script {
    pub fn new(file_name: PathBuf, is_proxified_dir: bool) -> Self {
        let name = Self::extract_name(&file_name, is_proxified_dir);
        let permissions = fs::metadata(&file_name)
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(0o755);
        Self {
            file_name,
            name,
            permissions,
            entries: Vec::new(),
            is_proxified_data: is_proxified_dir,
        }
    }

    /// A synthetic script created while re-reading saved generator
    /// output whose source file may no longer exist.
    pub fn synthetic(file_name: PathBuf) -> Self {
        let name = Self::extract_name(&file_name, false);
        Self {
            file_name,
            name,
            permissions: 0o755,
            entries: Vec::new(),
            is_proxified_data: false,
        }
    }

    /// Derive the logical script name from a file name: the basename
    /// with its two-digit `NN_` ordering prefix stripped, or with the
    /// `-N` collision suffix stripped for proxified data scripts.
    pub fn extract_name(file_name: &Path, is_proxified_dir: bool) -> String {
        let base = file_name
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if is_proxified_dir {
            return pscriptname_decode(&base);
        }
        let bytes = base.as_bytes();
        if bytes.len() > 3
            && bytes[0].is_ascii_digit()
            && bytes[1].is_ascii_digit()
            && bytes[2] == b'_'
        {
            base[3..].to_string()
        } else {
            base
        }
    }

    /// Whether this script lives under `<cfg_dir>/proxifiedScripts`.
    pub fn is_in_proxified_dir(&self, cfg_dir: &Path) -> bool {
        self.file_name.starts_with(cfg_dir.join(PROXIFIED_SCRIPTS_DIR))
    }

    /// Rename the script on disk and apply new permission bits.
    pub fn move_file(&mut self, new_path: &Path, permissions: u32) -> Result<(), ScriptError> {
        fs::rename(&self.file_name, new_path)?;
        fs::set_permissions(new_path, fs::Permissions::from_mode(permissions))?;
        self.file_name = new_path.to_path_buf();
        self.permissions = permissions;
        Ok(())
    }

    /// Park the script directly in the config dir under a temporary
    /// prefixed name so a save pass can redistribute it afterwards.
    pub fn move_to_basedir(&mut self, cfg_dir: &Path) -> Result<(), ScriptError> {
        let base = self
            .file_name
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let new_path = if self.is_in_proxified_dir(cfg_dir) {
            cfg_dir.join(format!("{}{}", PARKED_PROXIFIED_PREFIX, base))
        } else {
            cfg_dir.join(format!("{}{}", PARKED_DIRECT_PREFIX, base))
        };
        if fs::rename(&self.file_name, &new_path).is_ok() {
            self.file_name = new_path;
        }
        Ok(())
    }
}

/// Encode a script name for the proxified-scripts dir, disambiguating
/// same-named scripts with a per-name counter.
pub fn pscriptname_encode(name: &str, counter: usize) -> String {
    let safe = name.replace('/', "_");
    if counter == 0 {
        safe
    } else {
        format!("{}-{}", safe, counter)
    }
}

/// Inverse of [`pscriptname_encode`]: strip a trailing `-N` suffix.
pub fn pscriptname_decode(encoded: &str) -> String {
    if let Some(pos) = encoded.rfind('-') {
        if pos > 0 && encoded[pos + 1..].chars().all(|c| c.is_ascii_digit())
            && !encoded[pos + 1..].is_empty()
        {
            return encoded[..pos].to_string();
        }
    }
    encoded.to_string()
}
