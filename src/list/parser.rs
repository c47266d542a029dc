use std::io::{BufRead, Lines};
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Env;
use crate::list::engine::ListConfig;
use crate::proxy::file::{read_forwarder, FORWARDER_PREFIX};
use crate::proxy::model::Proxy;
use crate::scripts::model::Entry;
use crate::scripts::repository::ScriptHandle;

lazy_static! {
    static ref MENUENTRY_TITLE: Regex =
        Regex::new(r#"^menuentry\s+(?:'([^']*)'|"([^"]*)")"#).unwrap();
}

/// `### BEGIN <name> ###` → `<name>`.
fn parse_begin(line: &str) -> Option<&str> {
    line.strip_prefix("### BEGIN ")?.strip_suffix(" ###")
}

fn entry_title(block: &str) -> Option<String> {
    let caps = MENUENTRY_TITLE.captures(block)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Brace nesting delta of one line, ignoring braces inside quoted
/// spans.
fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut in_single = false;
    let mut in_double = false;
    for c in line.chars() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '{' if !in_single && !in_double => delta += 1,
            '}' if !in_single && !in_double => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Consume the rest of a `menuentry` block from the line stream,
/// starting after its opening line, until the braces balance again.
fn read_entry_block<R: BufRead>(first_line: String, lines: &mut Lines<R>) -> String {
    let mut depth = brace_delta(&first_line);
    let mut content = first_line;
    content.push('\n');
    while depth > 0 {
        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };
        depth += brace_delta(&line);
        content.push_str(&line);
        content.push('\n');
    }
    content
}

impl ListConfig {
    /// Stream the generator's output into the model. A `### BEGIN ###`
    /// line flushes the previous script's rule sync and switches the
    /// current script, resolving forwarder names back to the real
    /// script file; a `menuentry` block becomes an [`Entry`] and
    /// triggers an incremental, non-flushing sync so observers can
    /// render entries as they appear. With `create_missing` (used when
    /// re-reading a saved snapshot) unknown scripts are created
    /// synthetically and wrapped in accept-all proxies. Cancellation is
    /// honored once per row.
    pub fn read_generated_file<R: BufRead>(&mut self, source: R, env: &Env, create_missing: bool) {
        let forwarder_prefix = env
            .cfg_dir
            .join(FORWARDER_PREFIX)
            .to_string_lossy()
            .to_string();
        let total = self.repository.len().max(1) as f64;
        let mut lines = source.lines();
        let mut current: Option<ScriptHandle> = None;
        let mut done = 0usize;

        while let Some(row) = lines.next() {
            if self.cancel.is_cancelled() {
                break;
            }
            let row = match row {
                Ok(row) => row,
                Err(_) => break,
            };
            if let Some(name) = parse_begin(&row) {
                self.lock.lock();
                if let Some(handle) = current {
                    self.proxies
                        .sync_all(handle, self.repository.script(handle), true);
                }
                let mut real = format!("{}{}", env.cfg_dir_prefix, name);
                if real.starts_with(&forwarder_prefix) {
                    if let Some(target) = read_forwarder(real.as_ref()) {
                        real = format!("{}{}", env.cfg_dir_prefix, target);
                    }
                }
                let real = PathBuf::from(real);
                current = if create_missing {
                    let handle = self.repository.get_or_create(&real);
                    let file_name = self.repository.script(handle).file_name.clone();
                    self.proxies.push(Proxy::accept_all(handle, file_name));
                    Some(handle)
                } else {
                    self.repository.get_by_filename(&real)
                };
                self.lock.unlock();
                if current.is_some() {
                    done += 1;
                    self.send_load_progress(0.1 + 0.7 / total * done as f64);
                }
            } else if row.starts_with("menuentry ") {
                if let Some(handle) = current {
                    let content = read_entry_block(row, &mut lines);
                    let title = entry_title(&content).unwrap_or_default();
                    self.lock.lock();
                    let label = self.registry.label_for(&content);
                    self.repository
                        .script_mut(handle)
                        .entries
                        .push(Entry::new(title, content, label));
                    self.proxies
                        .sync_all(handle, self.repository.script(handle), false);
                    self.lock.unlock();
                    self.events.entry_list_updated();
                    self.send_load_progress(0.1 + 0.7 / total * done as f64);
                }
            }
        }

        self.lock.lock();
        if let Some(handle) = current {
            self.proxies
                .sync_all(handle, self.repository.script(handle), true);
        }
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::list::events::NullEvents;
    use crate::proxy::model::RuleKind;
    use std::io::Cursor;
    use std::sync::Arc;

    fn test_env(cfg_dir: &std::path::Path) -> Env {
        Env {
            mode: Mode::Grub,
            cfg_dir_prefix: String::new(),
            cfg_dir: cfg_dir.to_path_buf(),
            cfg_dir_noprefix: cfg_dir.to_string_lossy().to_string(),
            output_config_file: cfg_dir.join("grub.cfg"),
            output_config_dir: cfg_dir.to_path_buf(),
            settings_file: cfg_dir.join("default"),
            proxy_bin_source: cfg_dir.join("grubcfg-proxy"),
            mkconfig_cmd: "true".to_string(),
            update_cmd: "true".to_string(),
            install_cmd: "true".to_string(),
            cmd_prefix: String::new(),
        }
    }

    #[test]
    fn test_parse_begin() {
        assert_eq!(
            parse_begin("### BEGIN /etc/grub.d/10_linux ###"),
            Some("/etc/grub.d/10_linux")
        );
        assert_eq!(parse_begin("### END /etc/grub.d/10_linux ###"), None);
        assert_eq!(parse_begin("menuentry 'x' {"), None);
    }

    #[test]
    fn test_entry_title_quoting() {
        assert_eq!(
            entry_title("menuentry 'Ubuntu, with Linux' --class ubuntu {"),
            Some("Ubuntu, with Linux".to_string())
        );
        assert_eq!(
            entry_title("menuentry \"Windows 10\" {"),
            Some("Windows 10".to_string())
        );
        assert_eq!(entry_title("menuentry {"), None);
    }

    #[test]
    fn test_brace_delta_ignores_quoted_braces() {
        assert_eq!(brace_delta("menuentry 'a {weird} name' {"), 1);
        assert_eq!(brace_delta("}"), -1);
        assert_eq!(brace_delta("echo \"{{\""), 0);
    }

    #[test]
    fn test_read_entry_block_nested() {
        let rest = "\tif [ x = y ] {\n\t}\n}\nmenuentry 'next' {\n";
        let mut lines = Cursor::new(rest).lines();
        let block = read_entry_block("menuentry 'first' {".to_string(), &mut lines);
        assert!(block.ends_with("}\n"));
        assert!(block.contains("if [ x = y ]"));
        // the next menuentry line is still available
        assert_eq!(lines.next().unwrap().unwrap(), "menuentry 'next' {");
    }

    #[test]
    fn test_read_generated_output_into_fresh_model() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let output = "\
### BEGIN /etc/grub.d/10_linux ###
menuentry 'Ubuntu' --class ubuntu {
\tlinux /vmlinuz
}
menuentry 'Ubuntu (recovery mode)' {
\tlinux /vmlinuz recovery
}
### END /etc/grub.d/10_linux ###
";
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.read_generated_file(Cursor::new(output), &env, true);

        assert_eq!(cfg.repository.len(), 1);
        let handle = cfg.repository.handles().next().unwrap();
        let script = cfg.repository.script(handle);
        assert_eq!(script.entries.len(), 2);
        assert_eq!(script.entries[0].title, "Ubuntu");
        assert_eq!(script.entries[0].parser_label.as_deref(), Some("linux"));

        assert_eq!(cfg.proxies.len(), 1);
        let proxy = cfg.proxies.get(0).unwrap();
        assert_eq!(proxy.rules.len(), 3); // two synced rules plus the wildcard
        assert_eq!(proxy.rules[0].kind, RuleKind::Normal);
        assert_eq!(proxy.rules[0].name, "Ubuntu");
        assert_eq!(proxy.rules[2].kind, RuleKind::Wildcard);
    }

    #[test]
    fn test_forwarder_names_resolve_to_real_script() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let real = dir.path().join("proxifiedScripts/custom");
        std::fs::create_dir_all(real.parent().unwrap()).unwrap();
        std::fs::write(&real, "#!/bin/sh\n").unwrap();
        std::fs::write(
            dir.path().join("LS_custom"),
            format!("#!/bin/sh\n'{}'\n", real.display()),
        )
        .unwrap();

        let output = format!(
            "### BEGIN {}/LS_custom ###\nmenuentry 'Custom' {{\n}}\n",
            dir.path().display()
        );
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.read_generated_file(Cursor::new(output), &env, true);

        let handle = cfg.repository.handles().next().unwrap();
        assert_eq!(cfg.repository.script(handle).file_name, real);
    }

    #[test]
    fn test_cancellation_stops_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let output = "### BEGIN /etc/grub.d/10_linux ###\nmenuentry 'Ubuntu' {\n}\n";
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.cancel.cancel();
        cfg.read_generated_file(Cursor::new(output), &env, true);
        assert!(cfg.repository.is_empty());
    }

    #[test]
    fn test_unknown_script_ignored_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let env = test_env(dir.path());
        let output = "### BEGIN /etc/grub.d/10_linux ###\nmenuentry 'Ubuntu' {\n}\n";
        let mut cfg = ListConfig::new(Arc::new(NullEvents));
        cfg.read_generated_file(Cursor::new(output), &env, false);
        assert!(cfg.repository.is_empty());
        assert!(cfg.proxies.is_empty());
    }
}
