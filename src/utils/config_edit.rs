// file: src/utils/config_edit.rs
// version: 1.2.0
// guid: e1f2a3b4-c5d6-7890-1234-567890ef0190

//! Idempotent key=value injection into config files
//!
//! The injection rule, in priority order: replace the first active line
//! matching the pattern; else uncomment and replace the first commented
//! match; else append at the end. Running the same injection twice leaves
//! the file unchanged.

use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::{PrepError, Result};

/// Apply an injection to file content; returns the new content and whether
/// anything changed
pub fn inject(content: &str, pattern: &str, line: &str) -> Result<(String, bool)> {
    let active = Regex::new(&format!(r"^[ \t]*{pattern}"))
        .map_err(|e| PrepError::validation(format!("bad config pattern '{pattern}': {e}")))?;
    let commented = Regex::new(&format!(r"^[ \t]*#[ \t]*{pattern}"))
        .map_err(|e| PrepError::validation(format!("bad config pattern '{pattern}': {e}")))?;

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    if let Some(index) = lines
        .iter()
        .position(|l| active.is_match(l) && !commented.is_match(l))
    {
        if lines[index] == line {
            return Ok((content.to_string(), false));
        }
        lines[index] = line.to_string();
        return Ok((join_lines(&lines), true));
    }

    if let Some(index) = lines.iter().position(|l| commented.is_match(l)) {
        lines[index] = line.to_string();
        return Ok((join_lines(&lines), true));
    }

    lines.push(line.to_string());
    Ok((join_lines(&lines), true))
}

fn join_lines(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Inject a setting into a file, creating it if missing
///
/// Returns whether the file was modified.
pub fn config_inject(path: &Path, pattern: &str, line: &str) -> Result<bool> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let (updated, changed) = inject(&content, pattern, line)?;
    if changed {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, updated)?;
    }
    Ok(changed)
}

/// Replace the first match of a regex in file content
///
/// Returns the new content and whether a match was found.
pub fn rewrite_first(content: &str, pattern: &str, replacement: &str) -> Result<(String, bool)> {
    let re = Regex::new(pattern)
        .map_err(|e| PrepError::validation(format!("bad rewrite pattern '{pattern}': {e}")))?;
    if re.is_match(content) {
        Ok((re.replace(content, replacement).into_owned(), true))
    } else {
        Ok((content.to_string(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inject_replaces_active_line() {
        let content = "FOO=1\nAUTO_SETUP_LOCALE=C.UTF-8\nBAR=2\n";
        let (out, changed) =
            inject(content, "AUTO_SETUP_LOCALE=", "AUTO_SETUP_LOCALE=en_GB.UTF-8").unwrap();
        assert!(changed);
        assert_eq!(out, "FOO=1\nAUTO_SETUP_LOCALE=en_GB.UTF-8\nBAR=2\n");
    }

    #[test]
    fn test_inject_uncomments_commented_line() {
        let content = "FOO=1\n#AUTO_SETUP_LOCALE=C.UTF-8\n";
        let (out, changed) =
            inject(content, "AUTO_SETUP_LOCALE=", "AUTO_SETUP_LOCALE=en_GB.UTF-8").unwrap();
        assert!(changed);
        assert_eq!(out, "FOO=1\nAUTO_SETUP_LOCALE=en_GB.UTF-8\n");
    }

    #[test]
    fn test_inject_appends_when_absent() {
        let content = "FOO=1\n";
        let (out, changed) = inject(content, "NEW_KEY=", "NEW_KEY=value").unwrap();
        assert!(changed);
        assert_eq!(out, "FOO=1\nNEW_KEY=value\n");
    }

    #[test]
    fn test_inject_is_idempotent() {
        let content = "FOO=1\n";
        let (out, _) = inject(content, "KEY=", "KEY=value").unwrap();
        let (out2, changed) = inject(&out, "KEY=", "KEY=value").unwrap();
        assert!(!changed);
        assert_eq!(out, out2);
    }

    #[test]
    fn test_inject_prefers_active_over_commented() {
        let content = "#KEY=old\nKEY=current\n";
        let (out, changed) = inject(content, "KEY=", "KEY=new").unwrap();
        assert!(changed);
        assert_eq!(out, "#KEY=old\nKEY=new\n");
    }

    #[test]
    fn test_config_inject_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/conf.txt");
        assert!(config_inject(&path, "KEY=", "KEY=value").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "KEY=value\n");
        // Second run makes no change.
        assert!(!config_inject(&path, "KEY=", "KEY=value").unwrap());
    }

    #[test]
    fn test_rewrite_first_only_touches_first_match() {
        let cmdline = "console=tty1 root=/dev/mmcblk0p2 rootwait root=other";
        let (out, found) =
            rewrite_first(cmdline, r"root=\S+", "root=PARTUUID=1234-ab").unwrap();
        assert!(found);
        assert_eq!(out, "console=tty1 root=PARTUUID=1234-ab rootwait root=other");
    }

    #[test]
    fn test_rewrite_first_no_match() {
        let (out, found) = rewrite_first("console=tty1", r"root=\S+", "root=X").unwrap();
        assert!(!found);
        assert_eq!(out, "console=tty1");
    }
}
