use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::common::error::ProxyError;

/// Prefix of script forwarder files placed in the config-script dir.
pub const FORWARDER_PREFIX: &str = "LS_";

/// Location of the runtime interception binary below the config dir.
pub const PROXY_BIN_RELATIVE: &str = "bin/grubcfg_proxy";

/// Passthrough fallback installed when the real interception binary is
/// unavailable.
pub const DUMMY_PROXY_CODE: &str = "#!/bin/sh\ncat\n";

/// Parsed form of a proxy indirection file. The file is two lines:
/// a shebang, then `'<bin>' "<rule string>" < '<script path>'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyScriptData {
    pub script_cmd: String,
    pub rule_string: String,
}

impl ProxyScriptData {
    pub fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines();
        let shebang = lines.next()?;
        if !shebang.starts_with("#!") {
            return None;
        }
        let body = lines.next()?;
        let first_quote = body.find('"')?;
        let last_quote = body.rfind('"')?;
        if last_quote <= first_quote {
            return None;
        }
        let rule_string = body[first_quote + 1..last_quote].to_string();
        let tail = &body[last_quote + 1..];
        let redirect = tail.find('<')?;
        let script_cmd = tail[redirect + 1..]
            .trim()
            .trim_matches('\'')
            .to_string();
        if script_cmd.is_empty() {
            return None;
        }
        Some(Self {
            script_cmd,
            rule_string,
        })
    }

    pub fn from_file(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        Self::parse(&content)
    }

    /// Render the two-line indirection file body.
    pub fn render(bin_path: &str, rule_string: &str, script_path: &str) -> String {
        format!(
            "#!/bin/sh\n'{}' \"{}\" < '{}'\n",
            bin_path, rule_string, script_path
        )
    }
}

/// Write a script forwarder: a tiny redirector the generator executes in
/// place of the relocated script. Refuses to overwrite an existing file.
pub fn write_forwarder(path: &Path, target_script: &str) -> Result<bool, ProxyError> {
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, format!("#!/bin/sh\n'{}'\n", target_script))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(true)
}

/// Read the real script path out of a forwarder file (its second line,
/// single-quoted).
pub fn read_forwarder(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let second = content.lines().nth(1)?;
    let stripped = second.trim().trim_matches('\'');
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_proxy_script_data_round_trip() {
        let body = ProxyScriptData::render(
            "/etc/grub.d/bin/grubcfg_proxy",
            "+'Ubuntu'-'Recovery'",
            "/etc/grub.d/proxifiedScripts/linux",
        );
        let data = ProxyScriptData::parse(&body).unwrap();
        assert_eq!(data.rule_string, "+'Ubuntu'-'Recovery'");
        assert_eq!(data.script_cmd, "/etc/grub.d/proxifiedScripts/linux");
    }

    #[test]
    fn test_plain_script_is_not_proxy_data() {
        assert!(ProxyScriptData::parse("#!/bin/sh\nexec tail -n +3 $0\n").is_none());
        assert!(ProxyScriptData::parse("").is_none());
    }

    #[test]
    fn test_forwarder_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("LS_linux");
        assert!(write_forwarder(&path, "/etc/grub.d/proxifiedScripts/linux").unwrap());
        // second attempt must not clobber
        assert!(!write_forwarder(&path, "/other").unwrap());
        assert_eq!(
            read_forwarder(&path).as_deref(),
            Some("/etc/grub.d/proxifiedScripts/linux")
        );
    }
}
