use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::proxy::file::{ProxyScriptData, FORWARDER_PREFIX};
use crate::scripts::model::Script;

/// Non-owning handle to a script inside a [`Repository`]. Handles stay
/// valid until the repository is cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub(crate) usize);

/// Non-owning reference to one entry of one script. The referenced
/// entry may disappear on the next load; holders must treat this as a
/// weak link and re-resolve through the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    pub script: ScriptHandle,
    pub entry: usize,
}

/// Ordered collection owning all known scripts.
#[derive(Debug, Default)]
pub struct Repository {
    scripts: Vec<Script>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a directory for boot scripts (flat, subdirectories are
    /// skipped). In the main config dir only numbered `NN_name` files
    /// with a nonzero first digit qualify; `0N_` files belong to the
    /// generator itself and must never be relocated on save. Proxy
    /// indirection files and stale forwarders are not scripts and are
    /// ignored either way.
    pub fn load(&mut self, directory: &Path, is_proxified_dir: bool) {
        for dir_entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = dir_entry.path();
            let base = dir_entry.file_name().to_string_lossy();
            if base.starts_with(FORWARDER_PREFIX) {
                continue;
            }
            if !is_proxified_dir {
                let bytes = base.as_bytes();
                let numbered = bytes.len() > 3
                    && (b'1'..=b'9').contains(&bytes[0])
                    && bytes[1].is_ascii_digit()
                    && bytes[2] == b'_';
                if !numbered {
                    continue;
                }
            }
            if ProxyScriptData::from_file(path).is_some() {
                continue;
            }
            log::debug!("repository: found script {:?}", path);
            self.scripts.push(Script::new(path.to_path_buf(), is_proxified_dir));
        }
    }

    pub fn get_by_filename(&self, file_name: &Path) -> Option<ScriptHandle> {
        self.scripts
            .iter()
            .position(|s| s.file_name == file_name)
            .map(ScriptHandle)
    }

    /// Exact lookup, synthesizing and registering an empty script when
    /// asked to. Used when reconstructing configuration from previously
    /// saved generator output whose source scripts may be gone.
    pub fn get_or_create(&mut self, file_name: &Path) -> ScriptHandle {
        if let Some(handle) = self.get_by_filename(file_name) {
            return handle;
        }
        self.scripts.push(Script::synthetic(PathBuf::from(file_name)));
        ScriptHandle(self.scripts.len() - 1)
    }

    pub fn script(&self, handle: ScriptHandle) -> &Script {
        &self.scripts[handle.0]
    }

    pub fn script_mut(&mut self, handle: ScriptHandle) -> &mut Script {
        &mut self.scripts[handle.0]
    }

    pub fn handles(&self) -> impl Iterator<Item = ScriptHandle> {
        (0..self.scripts.len()).map(ScriptHandle)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Drop all parsed entries but keep the scripts, for a reload that
    /// keeps the current configuration.
    pub fn delete_all_entries(&mut self) {
        for script in &mut self.scripts {
            script.entries.clear();
        }
    }

    pub fn clear(&mut self) {
        self.scripts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_skips_directories_and_forwarders() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("10_linux"), "#!/bin/sh\necho linux\n").unwrap();
        fs::write(temp.path().join("00_header"), "#!/bin/sh\necho header\n").unwrap();
        fs::write(temp.path().join("LS_linux"), "#!/bin/sh\n'/tmp/x'\n").unwrap();
        fs::create_dir(temp.path().join("proxifiedScripts")).unwrap();

        let mut repo = Repository::new();
        repo.load(temp.path(), false);
        assert_eq!(repo.len(), 1);
        let handle = repo.get_by_filename(&temp.path().join("10_linux")).unwrap();
        assert_eq!(repo.script(handle).name, "linux");
    }

    #[test]
    fn test_get_or_create_synthesizes() {
        let mut repo = Repository::new();
        let path = Path::new("/etc/grub.d/40_custom");
        assert!(repo.get_by_filename(path).is_none());
        let handle = repo.get_or_create(path);
        assert_eq!(repo.script(handle).name, "custom");
        // second call resolves to the same script
        assert_eq!(repo.get_or_create(path), handle);
        assert_eq!(repo.len(), 1);
    }
}
