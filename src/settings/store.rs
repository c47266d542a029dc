use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::common::error::SettingsError;

/// One line of a settings file. A row is either a real `NAME="VALUE"`
/// setting (possibly commented out and/or `export`-prefixed, possibly
/// with a trailing comment) or an opaque plaintext line that is echoed
/// back unchanged on save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingRow {
    pub name: String,
    pub value: String,
    pub comment: String,
    pub plaintext: String,
    pub is_active: bool,
    pub has_export_prefix: bool,
    pub is_setting: bool,
}

impl SettingRow {
    /// Classify a freshly parsed row. A row counts as a setting only if
    /// both name and value are non-empty and the name is not a comment
    /// body (`# ...`). A leading `#` marks the setting inactive and is
    /// stripped from the stored name; a leading `export ` is stripped
    /// and remembered. Everything else degrades to plaintext.
    pub fn validate(&mut self) {
        self.is_active = false;
        self.has_export_prefix = false;
        self.is_setting = false;

        if !self.name.is_empty() && !self.value.is_empty() && !self.name.starts_with("# ") {
            self.is_setting = true;
            if let Some(stripped) = self.name.strip_prefix('#') {
                self.name = stripped.to_string();
            } else {
                self.is_active = true;
            }
            if let Some(stripped) = self.name.strip_prefix("export ") {
                self.has_export_prefix = true;
                self.name = stripped.to_string();
            }
        } else {
            self.name.clear();
            self.value.clear();
        }
    }

    /// Serialize the row back to its on-disk form.
    pub fn get_output(&self) -> String {
        if self.is_setting {
            if self.name.is_empty() {
                // an unnamed option would corrupt the bootloader config
                return format!("#UNNAMED_OPTION=\"{}\"", self.value);
            }
            let mut out = String::new();
            if !self.is_active {
                out.push('#');
            }
            if self.has_export_prefix {
                out.push_str("export ");
            }
            out.push_str(&self.name);
            out.push_str("=\"");
            out.push_str(&self.value);
            out.push('"');
            if !self.comment.is_empty() {
                out.push_str(" #");
                out.push_str(&self.comment);
            }
            out
        } else {
            self.plaintext.clone()
        }
    }
}

/// Ordered key/value model of a shell-style settings file
/// (`/etc/default/grub` and friends) preserving unknown lines verbatim.
#[derive(Debug, Default)]
pub struct SettingsStore {
    rows: Vec<SettingRow>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        let mut store = Self::new();
        store.load(&content);
        Ok(store)
    }

    /// Parse file content line by line. The `=` separator is only
    /// honored outside single- or double-quoted spans; quote characters
    /// themselves are stripped from the stored value. A ` #` outside
    /// quotes while parsing the value starts the trailing comment.
    pub fn load(&mut self, content: &str) {
        self.rows.clear();
        for line in content.split('\n') {
            let mut row = SettingRow {
                plaintext: line.to_string(),
                ..Default::default()
            };
            let mut in_quotes = false;
            let mut quote_char = '"';
            let mut in_value = false;
            let mut in_comment = false;
            for c in line.chars() {
                if in_comment {
                    row.comment.push(c);
                    continue;
                }
                if (c == '"' || c == '\'') && (!in_quotes || quote_char == c) {
                    in_quotes = !in_quotes;
                    quote_char = c;
                } else if !in_value && c == '=' && !in_quotes {
                    in_value = true;
                } else if in_value && c == '#' && !in_quotes && row.value.ends_with(' ') {
                    row.value.truncate(row.value.trim_end().len());
                    in_comment = true;
                } else if in_value {
                    row.value.push(c);
                } else {
                    row.name.push(c);
                }
            }
            row.validate();
            self.rows.push(row);
        }
        // split('\n') yields one trailing empty row for newline-terminated
        // files; drop it so save() does not grow the file
        if self.rows.last().is_some_and(|r| r.plaintext.is_empty()) {
            self.rows.pop();
        }
    }

    pub fn save(&self, writer: &mut impl Write) -> Result<(), SettingsError> {
        for row in &self.rows {
            writeln!(writer, "{}", row.get_output())?;
        }
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let mut out = Vec::new();
        self.save(&mut out)?;
        fs::write(path, out)?;
        Ok(())
    }

    pub fn rows(&self) -> &[SettingRow] {
        &self.rows
    }

    /// Iterate over setting rows only, skipping plaintext lines.
    pub fn settings(&self) -> impl Iterator<Item = &SettingRow> {
        self.rows.iter().filter(|r| r.is_setting)
    }

    fn settings_mut(&mut self) -> impl Iterator<Item = &mut SettingRow> {
        self.rows.iter_mut().filter(|r| r.is_setting)
    }

    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.settings()
            .find(|r| r.name == name)
            .map(|r| r.value.as_str())
    }

    /// Update the first setting with this name, or append a new active
    /// row. Returns `true` when an existing setting was updated.
    pub fn set_value(&mut self, name: &str, value: &str) -> bool {
        if let Some(row) = self.settings_mut().find(|r| r.name == name) {
            if row.value != value {
                row.value = value.to_string();
            }
            return true;
        }
        let mut row = SettingRow {
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        };
        row.validate();
        self.rows.push(row);
        false
    }

    pub fn is_active(&self, name: &str, check_value_too: bool) -> bool {
        self.settings()
            .find(|r| r.name == name)
            .map(|r| r.is_active && (!check_value_too || r.value != "false"))
            .unwrap_or(false)
    }

    pub fn set_is_active(&mut self, name: &str, active: bool) -> bool {
        if let Some(row) = self.settings_mut().find(|r| r.name == name) {
            row.is_active = active;
            true
        } else {
            false
        }
    }

    pub fn set_is_export(&mut self, name: &str, is_export: bool) -> bool {
        if let Some(row) = self.settings_mut().find(|r| r.name == name) {
            row.has_export_prefix = is_export;
            true
        } else {
            false
        }
    }

    pub fn rename_item(&mut self, old_name: &str, new_name: &str) {
        if let Some(row) = self.settings_mut().find(|r| r.name == old_name) {
            row.name = new_name.to_string();
        }
    }

    pub fn remove_item(&mut self, name: &str) {
        if let Some(pos) = self
            .rows
            .iter()
            .position(|r| r.is_setting && r.name == name)
        {
            self.rows.remove(pos);
        }
    }

    /// Append an empty placeholder setting for interactive editing.
    pub fn add_new_item(&mut self) {
        self.rows.push(SettingRow {
            is_setting: true,
            is_active: true,
            ..Default::default()
        });
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
