use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::common::error::{ListError, MoveError};
use crate::config::Env;
use crate::list::cancel::CancelToken;
use crate::list::events::ListEvents;
use crate::list::lock::AdvisoryLock;
use crate::list::mover::{self, Direction};
use crate::proxy::file::{
    write_forwarder, ProxyScriptData, DUMMY_PROXY_CODE, FORWARDER_PREFIX, PROXY_BIN_RELATIVE,
};
use crate::proxy::list::ProxyList;
use crate::proxy::model::{Proxy, Rule, RuleKind};
use crate::scripts::model::{pscriptname_encode, PROXIFIED_SCRIPTS_DIR};
use crate::scripts::parsers::ParserRegistry;
use crate::scripts::repository::{Repository, ScriptHandle};

/// Lifecycle of one configuration instance. Loads and saves move the
/// state forward; a failed operation parks it in the matching failure
/// state with `message()` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Idle,
    Loading,
    LoadFailed,
    Loaded,
    Saving,
    SaveFailed,
    Saved,
}

/// The boot-menu configuration model: scripts, their entries, and the
/// proxy customization layer, together with the load/save machinery
/// that drives the external config generator.
pub struct ListConfig {
    pub repository: Repository,
    pub proxies: ProxyList,
    pub registry: ParserRegistry,
    pub(crate) events: Arc<dyn ListEvents>,
    /// Serializes worker mutation against UI-thread reads while a
    /// parse is in flight. Shared, so observers can probe it with
    /// `lock_if_free`.
    pub lock: Arc<AdvisoryLock>,
    pub cancel: CancelToken,
    state: ListState,
    progress: f64,
    message: String,
    /// Sticky: the rule-interpreter binary was missing at save time and
    /// a passthrough dummy was installed instead.
    pub error_proxy_not_found: bool,
    /// The saved output file differed structurally from the freshly
    /// generated one when this configuration was loaded.
    pub config_differs_on_startup: bool,
}

impl ListConfig {
    pub fn new(events: Arc<dyn ListEvents>) -> Self {
        Self {
            repository: Repository::new(),
            proxies: ProxyList::new(),
            registry: ParserRegistry::with_defaults(),
            events,
            lock: Arc::new(AdvisoryLock::new()),
            cancel: CancelToken::new(),
            state: ListState::Idle,
            progress: 0.0,
            message: String::new(),
            error_proxy_not_found: false,
            config_differs_on_startup: false,
        }
    }

    pub fn state(&self) -> ListState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn send_load_progress(&mut self, progress: f64) {
        self.progress = progress;
        self.events.load_progress_changed(progress);
    }

    fn send_save_progress(&mut self, progress: f64) {
        self.progress = progress;
        self.events.save_progress_changed(progress);
    }

    /// Load the configuration: discover scripts and proxies, run the
    /// generator and parse its output. With `keep_config` the existing
    /// script/proxy structure survives and only entries are re-read.
    /// Failures land in `LoadFailed` and fire `thread_died`.
    pub fn load(&mut self, env: &Env, keep_config: bool) {
        self.state = ListState::Loading;
        self.cancel.reset();
        match self.run_load(env, keep_config) {
            Ok(()) => {
                self.state = ListState::Loaded;
            }
            Err(e) => {
                self.message = e.to_string();
                self.state = ListState::LoadFailed;
                log::error!("load failed: {}", self.message);
                let message = self.message.clone();
                self.events.thread_died(&message);
            }
        }
    }

    fn run_load(&mut self, env: &Env, keep_config: bool) -> Result<(), ListError> {
        if !keep_config {
            self.send_load_progress(0.0);
            if !env.cfg_dir.is_dir() {
                return Err(ListError::NotFound(format!(
                    "{} not found. Is {} installed?",
                    env.cfg_dir.display(),
                    env.mode
                )));
            }
            self.repository.load(&env.cfg_dir, false);
            self.repository
                .load(&env.cfg_dir.join(PROXIFIED_SCRIPTS_DIR), true);
            self.send_load_progress(0.05);
            self.load_proxies(env)?;
        } else {
            self.repository.delete_all_entries();
        }

        self.install_forwarders(env);
        self.send_load_progress(0.1);

        log::info!("running {}", env.mkconfig_cmd);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&env.mkconfig_cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;
        if let Some(stdout) = child.stdout.take() {
            self.read_generated_file(BufReader::new(stdout), env, false);
        }
        let status = child.wait()?;
        self.send_load_progress(0.9);

        // restore permissions and forwarders even when the generator
        // failed, so a broken run never leaves the cfg dir proxified
        self.restore_script_states(env);

        if !status.success() && !self.cancel.is_cancelled() {
            return Err(ListError::Generator(format!(
                "{} couldn't be executed successfully. You must run this as root!",
                env.mkconfig_cmd
            )));
        }

        if !keep_config {
            self.compare_with_saved_output(env);
        }
        self.send_load_progress(1.0);
        Ok(())
    }

    /// Scan the cfg dir for numbered scripts (`NN_name`, first digit
    /// nonzero; `0N_` headers are the generator's own) and build one
    /// proxy per file, decoding its rule string when the file is a
    /// proxy indirection and accepting everything otherwise.
    fn load_proxies(&mut self, env: &Env) -> Result<(), ListError> {
        for dir_entry in fs::read_dir(&env.cfg_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.is_dir() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            let bytes = name.as_bytes();
            if bytes.len() < 4
                || bytes[2] != b'_'
                || bytes[0] == b'0'
                || !bytes[0].is_ascii_digit()
                || !bytes[1].is_ascii_digit()
            {
                continue;
            }
            let index = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
            let permissions = fs::metadata(&path)
                .map(|m| m.permissions().mode() & 0o7777)
                .unwrap_or(0o755);
            let mut proxy = Proxy::new(path.clone(), index, permissions);
            match ProxyScriptData::from_file(&path) {
                Some(data) => {
                    let real = PathBuf::from(format!("{}{}", env.cfg_dir_prefix, data.script_cmd));
                    proxy.data_source = self.repository.get_by_filename(&real);
                    proxy.import_rule_string(&data.rule_string)?;
                }
                None => {
                    proxy.data_source = self.repository.get_by_filename(&path);
                    proxy.rules = vec![Rule::wildcard()];
                }
            }
            self.proxies.push(proxy);
        }
        self.proxies.sort();
        Ok(())
    }

    /// Put the cfg dir into generator-interception shape: proxified
    /// scripts get an `LS_` forwarder and their proxy files are made
    /// non-executable, direct scripts are made executable.
    fn install_forwarders(&self, env: &Env) {
        for handle in self.repository.handles().collect::<Vec<_>>() {
            let script = self.repository.script(handle);
            if script.is_in_proxified_dir(&env.cfg_dir) {
                let forwarder = self.forwarder_path(env, &script.file_name);
                let target = strip_prefix_str(&script.file_name, &env.cfg_dir_prefix);
                if let Err(e) = write_forwarder(&forwarder, &target) {
                    log::warn!("cannot create forwarder {}: {}", forwarder.display(), e);
                }
                for pos in self.proxies.positions_for_script(handle) {
                    if let Some(proxy) = self.proxies.get(pos) {
                        let _ = fs::set_permissions(
                            &proxy.file_name,
                            fs::Permissions::from_mode(0o644),
                        );
                    }
                }
            } else {
                let _ =
                    fs::set_permissions(&script.file_name, fs::Permissions::from_mode(0o755));
            }
        }
    }

    /// Undo what [`install_forwarders`] did, under the shared lock so a
    /// concurrent reader never sees a half-restored directory.
    fn restore_script_states(&self, env: &Env) {
        self.lock.lock();
        for handle in self.repository.handles().collect::<Vec<_>>() {
            let script = self.repository.script(handle);
            if script.is_in_proxified_dir(&env.cfg_dir) {
                let forwarder = self.forwarder_path(env, &script.file_name);
                if fs::remove_file(&forwarder).is_err() {
                    log::warn!("forwarder removal failed: {}", forwarder.display());
                }
            }
            for pos in self.proxies.positions_for_script(handle) {
                if let Some(proxy) = self.proxies.get(pos) {
                    let _ = fs::set_permissions(
                        &proxy.file_name,
                        fs::Permissions::from_mode(proxy.permissions),
                    );
                }
            }
        }
        self.lock.unlock();
    }

    fn forwarder_path(&self, env: &Env, script_path: &Path) -> PathBuf {
        let base = script_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        env.cfg_dir.join(format!("{}{}", FORWARDER_PREFIX, base))
    }

    /// Parse the previously saved output file and record whether it
    /// differs from what the generator just produced.
    fn compare_with_saved_output(&mut self, env: &Env) {
        use crate::list::events::NullEvents;
        self.config_differs_on_startup = match fs::File::open(&env.output_config_file) {
            Ok(file) => {
                let mut saved = ListConfig::new(Arc::new(NullEvents));
                saved.read_generated_file(BufReader::new(file), env, true);
                !self.compare(&saved)
            }
            Err(_) => false,
        };
    }

    /// Commit the in-memory model back to disk and re-run the
    /// generator. Failures land in `SaveFailed` and fire `thread_died`.
    pub fn save(&mut self, env: &Env) {
        self.state = ListState::Saving;
        match self.run_save(env) {
            Ok(()) => {
                self.state = ListState::Saved;
                self.events.save_completed();
            }
            Err(e) => {
                self.message = e.to_string();
                self.state = ListState::SaveFailed;
                log::error!("save failed: {}", self.message);
                let message = self.message.clone();
                self.events.thread_died(&message);
            }
        }
    }

    fn run_save(&mut self, env: &Env) -> Result<(), ListError> {
        self.send_save_progress(0.0);
        // start from a clean file system
        self.proxies.delete_proxy_script_files(&self.repository);
        self.proxies.clear_trash();
        let handles: Vec<ScriptHandle> = self.repository.handles().collect();
        for &handle in &handles {
            self.repository
                .script_mut(handle)
                .move_to_basedir(&env.cfg_dir)?;
        }
        self.send_save_progress(0.1);

        let proxified_dir = env.cfg_dir.join(PROXIFIED_SCRIPTS_DIR);
        let _ = fs::create_dir(&proxified_dir);

        let mut samename_counter: HashMap<String, usize> = HashMap::new();
        let proxy_bin_noprefix =
            format!("{}/{}", env.cfg_dir_noprefix, PROXY_BIN_RELATIVE);
        let mut proxy_count = 0;
        for &handle in &handles {
            let related = self.proxies.positions_for_script(handle);
            let name = self.repository.script(handle).name.clone();
            if self.proxies.proxy_required(handle) {
                let counter = samename_counter.entry(name.clone()).or_insert(0);
                let parked = proxified_dir.join(pscriptname_encode(&name, *counter));
                *counter += 1;
                self.repository
                    .script_mut(handle)
                    .move_file(&parked, 0o755)?;
                let script_noprefix = strip_prefix_str(&parked, &env.cfg_dir_prefix);
                for pos in related {
                    if let Some(proxy) = self.proxies.get_mut(pos) {
                        let target =
                            env.cfg_dir.join(format!("{}_{}_proxy", proxy.index, name));
                        proxy.generate_file(&target, &proxy_bin_noprefix, &script_noprefix)?;
                        proxy.file_name = target;
                        proxy_count += 1;
                    }
                }
            } else if related.len() == 1 {
                let pos = related[0];
                let (index, permissions) = match self.proxies.get(pos) {
                    Some(proxy) => (proxy.index, proxy.permissions),
                    None => continue,
                };
                let target = env.cfg_dir.join(format!("{}_{}", index, name));
                self.repository
                    .script_mut(handle)
                    .move_file(&target, permissions)?;
                if let Some(proxy) = self.proxies.get_mut(pos) {
                    proxy.file_name = target;
                }
            } else if !related.is_empty() {
                log::error!("cannot place script {}: exactly one proxy expected", name);
            }
        }
        self.send_save_progress(0.2);

        if let Ok(mut entries) = fs::read_dir(&proxified_dir) {
            if entries.next().is_none() {
                let _ = fs::remove_dir(&proxified_dir);
            }
        }

        self.install_proxy_bin(env, proxy_count);
        self.run_generator(env)?;
        self.config_differs_on_startup = false;
        self.send_save_progress(1.0);
        Ok(())
    }

    /// Install the rule-interpreting binary into `<cfg_dir>/bin` when
    /// proxies exist, writing a passthrough dummy (and setting the
    /// sticky error flag) when the real one is unavailable; remove it
    /// again when the last proxy is gone.
    fn install_proxy_bin(&mut self, env: &Env, proxy_count: usize) {
        let bin_path = env.cfg_dir.join(PROXY_BIN_RELATIVE);
        let (bin_exists, bin_is_dummy) = match fs::File::open(&bin_path) {
            Ok(mut file) => {
                let mut head = vec![0u8; DUMMY_PROXY_CODE.len()];
                let n = file.read(&mut head).unwrap_or(0);
                (true, &head[..n] == DUMMY_PROXY_CODE.as_bytes())
            }
            Err(_) => (false, false),
        };

        if proxy_count != 0 && (!bin_exists || bin_is_dummy) {
            let _ = fs::create_dir(env.cfg_dir.join("bin"));
            let written = match fs::copy(&env.proxy_bin_source, &bin_path) {
                Ok(_) => true,
                Err(_) => {
                    log::error!(
                        "{} not found, installing passthrough dummy",
                        env.proxy_bin_source.display()
                    );
                    self.error_proxy_not_found = true;
                    fs::write(&bin_path, DUMMY_PROXY_CODE).is_ok()
                }
            };
            if written {
                let _ = fs::set_permissions(&bin_path, fs::Permissions::from_mode(0o755));
            } else {
                log::error!("couldn't create {}", bin_path.display());
            }
        } else if proxy_count == 0 && bin_exists {
            // cleanup only, failures are harmless
            let _ = fs::remove_file(&bin_path);
            let _ = fs::remove_dir(env.cfg_dir.join("bin"));
        }
    }

    /// Run the commit command. Its output is streamed for diagnostics
    /// and progress pulses only, never parsed. Matching the generator's
    /// own behavior, a nonzero exit here is logged but not fatal.
    fn run_generator(&mut self, env: &Env) -> Result<(), ListError> {
        let cmd = format!("{} 2>&1", env.update_cmd);
        log::info!("running {}", cmd);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                log::debug!("generator: {}", line);
                let _ = crate::logging::write_domain_log("generator", &line);
                self.send_save_progress(0.5);
            }
        }
        let status = child.wait()?;
        if !status.success() {
            log::warn!("{} exited with {}", env.update_cmd, status);
        }
        Ok(())
    }

    /// Structural comparison against another loaded configuration,
    /// used to detect unsaved drift. Only visible top-level rules of
    /// executable proxies with a live data source count; on the saved
    /// side, scripts must carry a valid two-digit name prefix (this
    /// filters transient bookkeeping rows out of saved snapshots).
    pub fn compare(&self, other: &ListConfig) -> bool {
        let own = self.comparable_entries(false);
        let theirs = other.comparable_entries(true);
        if own.len() != theirs.len() {
            return false;
        }
        own.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }

    fn comparable_entries(&self, require_numbered: bool) -> Vec<(String, Option<String>, String)> {
        let mut result = Vec::new();
        for proxy in self.proxies.iter() {
            let handle = match proxy.data_source {
                Some(handle) if proxy.is_executable() => handle,
                _ => continue,
            };
            let script = self.repository.script(handle);
            if require_numbered && !has_numbered_prefix(&script.file_name) {
                continue;
            }
            for rule in &proxy.rules {
                let entry_ref = match (&rule.kind, rule.is_visible, &rule.data_source) {
                    (RuleKind::Normal, true, Some(entry_ref)) => entry_ref,
                    _ => continue,
                };
                if let Some(entry) = self
                    .repository
                    .script(entry_ref.script)
                    .entries
                    .get(entry_ref.entry)
                {
                    result.push((
                        rule.output_name.clone(),
                        entry.parser_label.clone(),
                        entry.content.clone(),
                    ));
                }
            }
        }
        result
    }

    /// Reorder a rule inside one proxy's tree. Returns the rule's new
    /// path; `MoveError::NoTarget` means "can't move further".
    pub fn move_rule(
        &mut self,
        proxy_pos: usize,
        path: &[usize],
        direction: Direction,
    ) -> Result<Vec<usize>, MoveError> {
        let proxy = self
            .proxies
            .get_mut(proxy_pos)
            .ok_or(MoveError::RuleNotFound)?;
        mover::move_rule(&mut proxy.rules, path, direction)
    }

    pub fn rename_rule(
        &mut self,
        proxy_pos: usize,
        path: &[usize],
        new_name: &str,
    ) -> Result<(), MoveError> {
        let proxy = self
            .proxies
            .get_mut(proxy_pos)
            .ok_or(MoveError::RuleNotFound)?;
        let rule = rule_at_mut(&mut proxy.rules, path).ok_or(MoveError::RuleNotFound)?;
        rule.output_name = new_name.to_string();
        Ok(())
    }

    /// Exchange two rules sharing the same parent list inside one proxy.
    pub fn swap_rules(
        &mut self,
        proxy_pos: usize,
        parent_path: &[usize],
        a: usize,
        b: usize,
    ) -> Result<(), MoveError> {
        let proxy = self
            .proxies
            .get_mut(proxy_pos)
            .ok_or(MoveError::RuleNotFound)?;
        let siblings =
            mover::list_at(&mut proxy.rules, parent_path).ok_or(MoveError::RuleNotFound)?;
        if a >= siblings.len() || b >= siblings.len() {
            return Err(MoveError::RuleNotFound);
        }
        siblings.swap(a, b);
        Ok(())
    }

    /// Exchange the on-disk ordering of two proxies.
    pub fn swap_proxies(&mut self, a: usize, b: usize) {
        self.proxies.swap(a, b);
    }

    pub fn renumerate(&mut self) {
        self.proxies.renumerate();
    }

    pub fn reset(&mut self) {
        self.repository.clear();
        self.proxies.clear();
        self.state = ListState::Idle;
        self.progress = 0.0;
        self.message.clear();
        self.config_differs_on_startup = false;
    }

    /// A cfg dir is clean when no forwarder files were left behind by
    /// an interrupted earlier run.
    pub fn cfg_dir_is_clean(&self, env: &Env) -> bool {
        match fs::read_dir(&env.cfg_dir) {
            Ok(entries) => !entries.flatten().any(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with(FORWARDER_PREFIX)
            }),
            Err(_) => true,
        }
    }

    /// Remove stale forwarders and re-activate numbered scripts after
    /// an interrupted run.
    pub fn cleanup_cfg_dir(&self, env: &Env) {
        log::info!("cleaning up {}", env.cfg_dir.display());
        let entries = match fs::read_dir(&env.cfg_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for dir_entry in entries.flatten() {
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if name.starts_with(FORWARDER_PREFIX) && name.len() >= 4 {
                log::info!("deleting {}", name);
                let _ = fs::remove_file(dir_entry.path());
            } else if has_numbered_prefix(&dir_entry.path()) {
                log::info!("re-activating {}", name);
                let _ =
                    fs::set_permissions(dir_entry.path(), fs::Permissions::from_mode(0o755));
            }
        }
    }
}

fn rule_at_mut<'a>(rules: &'a mut Vec<Rule>, path: &[usize]) -> Option<&'a mut Rule> {
    let (&last, parents) = path.split_last()?;
    let mut current = rules;
    for &idx in parents {
        current = &mut current.get_mut(idx)?.sub_rules;
    }
    current.get_mut(last)
}

/// `NN_name` with a nonzero first digit, the shape of an ordered
/// generator script.
fn has_numbered_prefix(path: &Path) -> bool {
    let base = match path.file_name() {
        Some(base) => base.to_string_lossy().to_string(),
        None => return false,
    };
    let bytes = base.as_bytes();
    bytes.len() >= 4
        && (b'1'..=b'9').contains(&bytes[0])
        && bytes[1].is_ascii_digit()
        && bytes[2] == b'_'
}

fn strip_prefix_str(path: &Path, prefix: &str) -> String {
    let full = path.to_string_lossy();
    full.strip_prefix(prefix).unwrap_or(&full).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::list::events::NullEvents;
    use crate::proxy::file::ProxyScriptData;
    use std::io::Cursor;

    fn test_env(cfg_dir: &Path) -> Env {
        Env {
            mode: Mode::Grub,
            cfg_dir_prefix: String::new(),
            cfg_dir: cfg_dir.to_path_buf(),
            cfg_dir_noprefix: cfg_dir.to_string_lossy().to_string(),
            output_config_file: cfg_dir.join("output/grub.cfg"),
            output_config_dir: cfg_dir.join("output"),
            settings_file: cfg_dir.join("default"),
            proxy_bin_source: cfg_dir.join("no-such-proxy-bin"),
            mkconfig_cmd: "true".to_string(),
            update_cmd: "true".to_string(),
            install_cmd: "true".to_string(),
            cmd_prefix: String::new(),
        }
    }

    fn write_script(path: &Path, body: &str) {
        fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Two proxies on a shared script plus one direct numbered script.
    fn populate_cfg_dir(cfg_dir: &Path) {
        let proxified = cfg_dir.join(PROXIFIED_SCRIPTS_DIR);
        fs::create_dir_all(&proxified).unwrap();
        write_script(&cfg_dir.join("00_header"), "echo header");
        write_script(&cfg_dir.join("15_linux"), "echo linux");
        let custom = proxified.join("custom");
        write_script(&custom, "echo custom");
        for (index, rules) in [(10, "+'A'"), (11, "-'A'")] {
            let body = ProxyScriptData::render(
                &format!("{}/{}", cfg_dir.display(), PROXY_BIN_RELATIVE),
                rules,
                &custom.to_string_lossy(),
            );
            fs::write(cfg_dir.join(format!("{}_custom", index)), body).unwrap();
            fs::set_permissions(
                cfg_dir.join(format!("{}_custom", index)),
                fs::Permissions::from_mode(0o755),
            )
            .unwrap();
        }
    }

    fn loaded_structure(cfg_dir: &Path, env: &Env) -> ListConfig {
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.repository.load(cfg_dir, false);
        cfg.repository
            .load(&cfg_dir.join(PROXIFIED_SCRIPTS_DIR), true);
        cfg.load_proxies(env).unwrap();
        cfg
    }

    #[test]
    fn test_proxy_discovery() {
        let dir = tempfile::tempdir().unwrap();
        populate_cfg_dir(dir.path());
        let env = test_env(dir.path());
        let cfg = loaded_structure(dir.path(), &env);

        // 00_header is the generator's own and never becomes a proxy
        let indices: Vec<u8> = cfg.proxies.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![10, 11, 15]);

        let custom = cfg
            .repository
            .get_by_filename(&dir.path().join("proxifiedScripts/custom"))
            .unwrap();
        let linux = cfg
            .repository
            .get_by_filename(&dir.path().join("15_linux"))
            .unwrap();
        assert!(cfg.proxies.proxy_required(custom));
        assert!(!cfg.proxies.proxy_required(linux));

        // the direct script accepts everything
        let direct = cfg.proxies.get(2).unwrap();
        assert_eq!(direct.rules[0].kind, RuleKind::Wildcard);
        // the indirection files carry their decoded rule strings
        assert_eq!(cfg.proxies.get(0).unwrap().rules[0].name, "A");
        assert!(!cfg.proxies.get(1).unwrap().rules[0].is_visible);
    }

    #[test]
    fn test_full_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join("grub.d");
        fs::create_dir_all(&cfg_dir).unwrap();
        write_script(&cfg_dir.join("15_linux"), "echo linux");

        let generator = dir.path().join("generator.sh");
        fs::write(
            &generator,
            format!(
                "#!/bin/sh\n\
                 echo \"### BEGIN {}/15_linux ###\"\n\
                 echo \"menuentry 'Ubuntu' {{\"\n\
                 echo \"}}\"\n",
                cfg_dir.display()
            ),
        )
        .unwrap();

        let mut env = test_env(&cfg_dir);
        env.mkconfig_cmd = format!("sh '{}'", generator.display());

        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.load(&env, false);

        assert_eq!(cfg.state(), ListState::Loaded);
        assert!((cfg.progress() - 1.0).abs() < f64::EPSILON);
        let handle = cfg.repository.get_by_filename(&cfg_dir.join("15_linux")).unwrap();
        assert_eq!(cfg.repository.script(handle).entries.len(), 1);
        assert_eq!(cfg.repository.script(handle).entries[0].title, "Ubuntu");
        // no saved output file yet, so nothing can differ
        assert!(!cfg.config_differs_on_startup);
        // forwarder cleanup ran
        assert!(cfg.cfg_dir_is_clean(&env));
    }

    #[test]
    fn test_load_fails_without_cfg_dir() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(&dir.path().join("missing"));
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.load(&env, false);
        assert_eq!(cfg.state(), ListState::LoadFailed);
        assert!(cfg.message().contains("not found"));
    }

    #[test]
    fn test_load_fails_on_generator_exit() {
        let dir = tempfile::tempdir().unwrap();
        let env = {
            let mut env = test_env(dir.path());
            env.mkconfig_cmd = "false".to_string();
            env
        };
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.load(&env, false);
        assert_eq!(cfg.state(), ListState::LoadFailed);
        assert!(cfg.message().contains("root"));
    }

    #[test]
    fn test_save_places_proxies_and_direct_scripts() {
        let dir = tempfile::tempdir().unwrap();
        populate_cfg_dir(dir.path());
        let env = test_env(dir.path());
        let mut cfg = loaded_structure(dir.path(), &env);

        cfg.save(&env);
        assert_eq!(cfg.state(), ListState::Saved);

        // shared script relocated under its encoded name, one
        // indirection file per proxy
        assert!(dir.path().join("proxifiedScripts/custom").exists());
        for index in [10, 11] {
            let path = dir.path().join(format!("{}_custom_proxy", index));
            let data = ProxyScriptData::from_file(&path).unwrap();
            assert!(data.script_cmd.ends_with("proxifiedScripts/custom"));
        }
        // the direct script keeps its numbered slot
        assert!(dir.path().join("15_linux").exists());

        // no real interpreter binary available: dummy plus sticky flag
        let bin = dir.path().join(PROXY_BIN_RELATIVE);
        assert_eq!(fs::read_to_string(&bin).unwrap(), DUMMY_PROXY_CODE);
        assert!(cfg.error_proxy_not_found);
    }

    #[test]
    fn test_save_without_proxies_removes_bin() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join(PROXY_BIN_RELATIVE), DUMMY_PROXY_CODE).unwrap();
        write_script(&dir.path().join("15_linux"), "echo linux");
        let env = test_env(dir.path());
        let mut cfg = loaded_structure(dir.path(), &env);

        cfg.save(&env);
        assert_eq!(cfg.state(), ListState::Saved);
        assert!(!dir.path().join(PROXY_BIN_RELATIVE).exists());
        assert!(!dir.path().join("bin").exists());
        // empty proxifiedScripts dir created during save is removed again
        assert!(!dir.path().join(PROXIFIED_SCRIPTS_DIR).exists());
    }

    #[test]
    fn test_compare_is_reflexive() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let output = "\
### BEGIN /etc/grub.d/10_linux ###
menuentry 'Ubuntu' {
\tlinux /vmlinuz
}
### END /etc/grub.d/10_linux ###
";
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.read_generated_file(Cursor::new(output), &env, true);
        assert!(cfg.compare(&cfg));
    }

    #[test]
    fn test_compare_detects_rename() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let output = "\
### BEGIN /etc/grub.d/10_linux ###
menuentry 'Ubuntu' {
\tlinux /vmlinuz
}
### END /etc/grub.d/10_linux ###
";
        let mut a = ListConfig::new(Arc::new(NullEvents));
        a.read_generated_file(Cursor::new(output), &env, true);
        let mut b = ListConfig::new(Arc::new(NullEvents));
        b.read_generated_file(Cursor::new(output), &env, true);
        assert!(a.compare(&b));

        a.rename_rule(0, &[0], "My Linux").unwrap();
        assert!(!a.compare(&b));
        assert!(!b.compare(&a));
    }

    #[test]
    fn test_compare_skips_unnumbered_scripts_on_saved_side() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let own = "### BEGIN /etc/grub.d/10_linux ###\nmenuentry 'Ubuntu' {\n}\n";
        let saved = "\
### BEGIN /etc/grub.d/10_linux ###
menuentry 'Ubuntu' {
}
### BEGIN /etc/grub.d/bookkeeping ###
menuentry 'Transient' {
}
";
        let mut a = ListConfig::new(Arc::new(NullEvents));
        a.read_generated_file(Cursor::new(own), &env, true);
        let mut b = ListConfig::new(Arc::new(NullEvents));
        b.read_generated_file(Cursor::new(saved), &env, true);
        assert!(a.compare(&b));
    }

    #[test]
    fn test_rename_rule_unknown_path() {
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        assert_eq!(
            cfg.rename_rule(0, &[0], "x"),
            Err(MoveError::RuleNotFound)
        );
    }

    #[test]
    fn test_swap_rules_within_parent() {
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        let mut proxy = Proxy::new(PathBuf::from("/boot/cfg/10_linux"), 10, 0o755);
        proxy.rules = vec![
            Rule::normal("first", true),
            Rule::normal("second", true),
        ];
        cfg.proxies.push(proxy);

        cfg.swap_rules(0, &[], 0, 1).unwrap();
        let proxy = cfg.proxies.get(0).unwrap();
        assert_eq!(proxy.rules[0].name, "second");
        assert_eq!(proxy.rules[1].name, "first");

        assert_eq!(
            cfg.swap_rules(0, &[], 0, 2),
            Err(MoveError::RuleNotFound)
        );
    }

    #[test]
    fn test_cleanup_cfg_dir() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        fs::write(dir.path().join("LS_custom"), "#!/bin/sh\n'x'\n").unwrap();
        write_script(&dir.path().join("15_linux"), "echo linux");
        fs::set_permissions(
            dir.path().join("15_linux"),
            fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        let cfg = ListConfig::new(Arc::new(NullEvents));
        assert!(!cfg.cfg_dir_is_clean(&env));
        cfg.cleanup_cfg_dir(&env);
        assert!(cfg.cfg_dir_is_clean(&env));
        assert!(!dir.path().join("LS_custom").exists());
        let mode = fs::metadata(dir.path().join("15_linux"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_renumerate_after_swap() {
        let dir = tempfile::tempdir().unwrap();
        populate_cfg_dir(dir.path());
        let env = test_env(dir.path());
        let mut cfg = loaded_structure(dir.path(), &env);

        cfg.swap_proxies(0, 2);
        cfg.renumerate();
        let indices: Vec<u8> = cfg.proxies.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![10, 11, 12]);
    }
}
