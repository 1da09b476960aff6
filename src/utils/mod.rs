// file: src/utils/mod.rs
// version: 1.2.0
// guid: c7d8e9f0-a1b2-3456-7890-123456cdef56

//! Shared helpers

pub mod config_edit;
pub mod fs;

use regex::Regex;

/// Compile a shell-style glob (`*`, `?`) into an anchored regex
///
/// Returns `None` for patterns that fail to compile, which can only happen
/// if the escaped pattern overflows regex limits.
pub fn glob_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// Whether a name matches a shell-style glob
pub fn glob_match(glob: &str, name: &str) -> bool {
    glob_regex(glob).map(|re| re.is_match(name)).unwrap_or(false)
}

/// Human-readable duration, e.g. "4m 12s"
pub fn format_duration(duration: std::time::Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
