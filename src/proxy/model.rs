use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::common::error::ProxyError;
use crate::proxy::file::ProxyScriptData;
use crate::scripts::model::{Entry, Script};
use crate::scripts::repository::{EntryRef, ScriptHandle};

/// Node variants of the user's rule tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Maps to one generated entry, matched by name.
    Normal,
    /// Holds an ordered list of child rules.
    Submenu,
    /// The `+*` accept-all marker; also the insertion anchor for newly
    /// discovered entries.
    Wildcard,
}

/// One node of the ordered tree describing which generated entries to
/// keep, hide, reorder and rename. The pre-order visible traversal of
/// this tree, with `Normal` rules resolved to their data sources, is the
/// final menu order.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub kind: RuleKind,
    /// Matching key: the generated entry title this rule refers to.
    pub name: String,
    /// User-facing name; differs from `name` after a rename.
    pub output_name: String,
    pub is_visible: bool,
    /// Weak link to the matched entry. `None` means orphaned: the entry
    /// vanished from the generated output but the rule is retained so a
    /// reappearing entry re-attaches.
    pub data_source: Option<EntryRef>,
    pub sub_rules: Vec<Rule>,
}

impl Rule {
    pub fn normal(name: &str, is_visible: bool) -> Self {
        Self {
            kind: RuleKind::Normal,
            name: name.to_string(),
            output_name: name.to_string(),
            is_visible,
            data_source: None,
            sub_rules: Vec::new(),
        }
    }

    pub fn submenu(name: &str, sub_rules: Vec<Rule>) -> Self {
        Self {
            kind: RuleKind::Submenu,
            name: name.to_string(),
            output_name: name.to_string(),
            is_visible: true,
            data_source: None,
            sub_rules,
        }
    }

    pub fn wildcard() -> Self {
        Self {
            kind: RuleKind::Wildcard,
            name: String::new(),
            output_name: String::new(),
            is_visible: true,
            data_source: None,
            sub_rules: Vec::new(),
        }
    }
}

fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('\'');
    for c in name.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Serialize a rule sequence to the compact single-line rule string.
/// Tokens: `+'name'` visible, `-'name'` hidden, `>'name'…<` submenu
/// (with a `-` prefix when hidden), `+*` wildcard; a `='output'` suffix
/// carries a rename.
pub fn encode_rules(rules: &[Rule]) -> String {
    let mut out = String::new();
    for rule in rules {
        match rule.kind {
            RuleKind::Wildcard => out.push_str("+*"),
            RuleKind::Normal => {
                out.push(if rule.is_visible { '+' } else { '-' });
                out.push_str(&quote(&rule.name));
                if rule.output_name != rule.name {
                    out.push('=');
                    out.push_str(&quote(&rule.output_name));
                }
            }
            RuleKind::Submenu => {
                if !rule.is_visible {
                    out.push('-');
                }
                out.push('>');
                out.push_str(&quote(&rule.output_name));
                out.push_str(&encode_rules(&rule.sub_rules));
                out.push('<');
            }
        }
    }
    out
}

/// Parse a rule string back into a rule sequence. Inverse of
/// [`encode_rules`] on well-formed input.
pub fn decode_rules(input: &str) -> Result<Vec<Rule>, ProxyError> {
    let mut chars = input.chars().peekable();
    let rules = decode_sequence(&mut chars, false)?;
    if chars.next().is_some() {
        return Err(ProxyError::Parse("unbalanced '<' in rule string".into()));
    }
    Ok(rules)
}

fn decode_sequence(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    nested: bool,
) -> Result<Vec<Rule>, ProxyError> {
    let mut rules = Vec::new();
    loop {
        match chars.peek().copied() {
            None => {
                if nested {
                    return Err(ProxyError::Parse("unterminated submenu".into()));
                }
                return Ok(rules);
            }
            Some('<') => {
                if !nested {
                    return Ok(rules);
                }
                chars.next();
                return Ok(rules);
            }
            Some(sigil @ ('+' | '-' | '>')) => {
                chars.next();
                let (is_visible, is_submenu) = match sigil {
                    '>' => (true, true),
                    '-' if chars.peek() == Some(&'>') => {
                        chars.next();
                        (false, true)
                    }
                    '+' => (true, false),
                    _ => (false, false),
                };
                if !is_submenu && is_visible && chars.peek() == Some(&'*') {
                    chars.next();
                    rules.push(Rule::wildcard());
                    continue;
                }
                let name = decode_quoted(chars)?;
                if is_submenu {
                    let sub_rules = decode_sequence(chars, true)?;
                    rules.push(Rule {
                        is_visible,
                        ..Rule::submenu(&name, sub_rules)
                    });
                } else {
                    let mut rule = Rule::normal(&name, is_visible);
                    if chars.peek() == Some(&'=') {
                        chars.next();
                        rule.output_name = decode_quoted(chars)?;
                    }
                    rules.push(rule);
                }
            }
            Some(other) => {
                return Err(ProxyError::Parse(format!(
                    "unexpected character '{}' in rule string",
                    other
                )));
            }
        }
    }
}

fn decode_quoted(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ProxyError> {
    if chars.next() != Some('\'') {
        return Err(ProxyError::Parse("expected quoted rule name".into()));
    }
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some(c) => out.push(c),
                None => return Err(ProxyError::Parse("dangling escape".into())),
            },
            Some('\'') => return Ok(out),
            Some(c) => out.push(c),
            None => return Err(ProxyError::Parse("unterminated rule name".into())),
        }
    }
}

/// Persistent customization record bound to one on-disk script slot.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub file_name: PathBuf,
    /// Two-digit ordering prefix, unique within the list, in [10, 99].
    pub index: u8,
    pub permissions: u32,
    /// The script this proxy wraps. Shared with other proxies, never
    /// owning; `None` when the script could not be resolved.
    pub data_source: Option<ScriptHandle>,
    pub rules: Vec<Rule>,
}

impl Proxy {
    pub fn new(file_name: PathBuf, index: u8, permissions: u32) -> Self {
        Self {
            file_name,
            index,
            permissions,
            data_source: None,
            rules: Vec::new(),
        }
    }

    /// A synthetic accept-all proxy for a known script, used when
    /// reconstructing state from saved generator output.
    pub fn accept_all(script: ScriptHandle, file_name: PathBuf) -> Self {
        Self {
            file_name,
            index: 10,
            permissions: 0o755,
            data_source: Some(script),
            rules: vec![Rule::wildcard()],
        }
    }

    pub fn import_rule_string(&mut self, rule_string: &str) -> Result<(), ProxyError> {
        self.rules = decode_rules(rule_string)?;
        Ok(())
    }

    pub fn export_rule_string(&self) -> String {
        encode_rules(&self.rules)
    }

    pub fn is_executable(&self) -> bool {
        self.permissions & 0o111 != 0
    }

    /// Reconcile the rule tree against the entries parsed so far for
    /// the wrapped script. Every unmatched entry gets a new visible
    /// `Normal` rule, inserted at the wildcard when one exists and
    /// appended otherwise. With `flush`, rules whose entries did not
    /// appear are orphaned (data source cleared) but kept. Idempotent
    /// for an unchanged entry set.
    pub fn sync(&mut self, script: ScriptHandle, entries: &[Entry], flush: bool) {
        let mut claimed = vec![false; entries.len()];
        sync_rules(&mut self.rules, script, entries, &mut claimed, flush);

        let mut new_rules = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            if !claimed[i] {
                let mut rule = Rule::normal(&entry.title, true);
                rule.data_source = Some(EntryRef { script, entry: i });
                new_rules.push(rule);
            }
        }
        if new_rules.is_empty() {
            return;
        }
        let anchor = self
            .rules
            .iter()
            .position(|r| r.kind == RuleKind::Wildcard)
            .unwrap_or(self.rules.len());
        for (offset, rule) in new_rules.into_iter().enumerate() {
            self.rules.insert(anchor + offset, rule);
        }
    }

    /// Write the proxy indirection file for this proxy.
    pub fn generate_file(
        &self,
        path: &Path,
        proxy_bin: &str,
        script_path: &str,
    ) -> Result<(), ProxyError> {
        let body = ProxyScriptData::render(proxy_bin, &self.export_rule_string(), script_path);
        fs::write(path, body)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }
}

fn sync_rules(
    rules: &mut [Rule],
    script: ScriptHandle,
    entries: &[Entry],
    claimed: &mut [bool],
    flush: bool,
) {
    for rule in rules.iter_mut() {
        match rule.kind {
            RuleKind::Normal => {
                // duplicate titles resolve positionally: first unclaimed wins
                let matched = entries
                    .iter()
                    .enumerate()
                    .position(|(i, e)| !claimed[i] && e.title == rule.name);
                match matched {
                    Some(i) => {
                        claimed[i] = true;
                        rule.data_source = Some(EntryRef { script, entry: i });
                    }
                    None if flush => rule.data_source = None,
                    None => {}
                }
            }
            RuleKind::Submenu => {
                sync_rules(&mut rule.sub_rules, script, entries, claimed, flush);
            }
            RuleKind::Wildcard => {}
        }
    }
}

/// Build an accept-all rule set from a script's current entries.
pub fn rules_from_script(script: ScriptHandle, source: &Script) -> Vec<Rule> {
    let mut rules = Vec::new();
    for (i, entry) in source.entries.iter().enumerate() {
        let mut rule = Rule::normal(&entry.title, true);
        rule.data_source = Some(EntryRef { script, entry: i });
        rules.push(rule);
    }
    rules
}
