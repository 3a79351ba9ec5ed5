//! Classification of host windows as game clients.

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::trace;

use crate::types::WindowInfo;

/// Title prefix used by game client windows, compared case-insensitively.
pub const CLIENT_TITLE_PREFIX: &str = "eve - ";
/// Substring in the client's command line that identifies its executable.
pub const CLIENT_EXECUTABLE: &str = "exefile.exe";
/// Titles containing any of these belong to our own UI.
pub const SELF_TITLE_MARKERS: [&str; 2] = ["eve-o preview", env!("CARGO_PKG_NAME")];

pub struct WindowMatcher {
    self_pid: u32,
    proc_root: PathBuf,
    executable_tokens: Vec<String>,
}

impl Default for WindowMatcher {
    fn default() -> Self {
        Self::new(std::process::id(), PathBuf::from("/proc"))
    }
}

impl WindowMatcher {
    pub fn new(self_pid: u32, proc_root: PathBuf) -> Self {
        Self {
            self_pid,
            proc_root,
            executable_tokens: vec![CLIENT_EXECUTABLE.to_string()],
        }
    }

    pub fn is_target(&self, window: &WindowInfo) -> bool {
        if window.pid == Some(self.self_pid) {
            return false;
        }
        if let Some(pid) = window.pid {
            if self.cmdline_matches(pid) == Some(true) {
                trace!(window = window.id, pid, "matched by command line");
                return true;
            }
        }
        title_matches(&window.title)
    }

    /// `None` when the lookup is inconclusive (process gone, permission
    /// denied, unreadable).
    fn cmdline_matches(&self, pid: u32) -> Option<bool> {
        let raw = read_cmdline(&self.proc_root, pid)?;
        let lowered = raw.to_lowercase();
        Some(
            self.executable_tokens
                .iter()
                .any(|token| lowered.contains(&token.to_lowercase())),
        )
    }
}

fn read_cmdline(proc_root: &Path, pid: u32) -> Option<String> {
    let bytes = fs::read(proc_root.join(pid.to_string()).join("cmdline")).ok()?;
    let joined = bytes
        .into_iter()
        .map(|b| if b == 0 { b' ' } else { b })
        .collect::<Vec<_>>();
    Some(String::from_utf8_lossy(&joined).into_owned())
}

fn title_matches(title: &str) -> bool {
    if title.is_empty() {
        return false;
    }
    let lowered = title.to_lowercase();
    if SELF_TITLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(&marker.to_lowercase()))
    {
        return false;
    }
    match lowered.strip_prefix(CLIENT_TITLE_PREFIX) {
        Some(rest) => !rest.contains("launcher"),
        None => false,
    }
}

/// Character name shown in the overlay: the text after the first `" - "`,
/// cut at any `[` tag and trimmed. Titles without the delimiter are shown as
/// they are.
pub fn display_name(title: &str) -> String {
    let name = match title.split_once(" - ") {
        Some((_, rest)) => rest,
        None if title.is_empty() => "EVE",
        None => title,
    };
    let name = match name.split_once('[') {
        Some((before, _)) => before,
        None => name,
    };
    name.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Geometry;

    fn window(id: u32, title: &str, pid: Option<u32>) -> WindowInfo {
        WindowInfo {
            id,
            title: title.to_string(),
            pid,
            minimized: false,
            geometry: Geometry::default(),
        }
    }

    fn fake_proc(entries: &[(u32, &[u8])]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (pid, cmdline) in entries {
            let proc_dir = dir.path().join(pid.to_string());
            fs::create_dir_all(&proc_dir).unwrap();
            fs::write(proc_dir.join("cmdline"), cmdline).unwrap();
        }
        dir
    }

    #[test]
    fn accepts_client_by_command_line() {
        let proc_dir = fake_proc(&[(42, b"wine64\0C:\\EVE\\bin\\ExeFile.exe\0/noconsole\0")]);
        let matcher = WindowMatcher::new(1, proc_dir.path().to_path_buf());
        assert!(matcher.is_target(&window(7, "EVE - Jane Doe [Omega]", Some(42))));
        assert!(matcher.is_target(&window(7, "EVE", Some(42))));
        assert!(matcher.is_target(&window(7, "", Some(42))));
    }

    #[test]
    fn rejects_own_process() {
        let proc_dir = fake_proc(&[(1, b"exefile.exe\0")]);
        let matcher = WindowMatcher::new(1, proc_dir.path().to_path_buf());
        assert!(!matcher.is_target(&window(7, "EVE - Jane Doe", Some(1))));
    }

    #[test]
    fn falls_through_to_title_when_cmdline_is_unreadable() {
        let proc_dir = fake_proc(&[]);
        let matcher = WindowMatcher::new(1, proc_dir.path().to_path_buf());
        assert!(matcher.is_target(&window(7, "EVE - Jane Doe", Some(999))));
        assert!(matcher.is_target(&window(7, "eve - lowercase", None)));
    }

    #[test]
    fn title_heuristic_rejections() {
        let proc_dir = fake_proc(&[(5, b"/usr/bin/firefox\0")]);
        let matcher = WindowMatcher::new(1, proc_dir.path().to_path_buf());
        assert!(!matcher.is_target(&window(7, "", Some(5))));
        assert!(!matcher.is_target(&window(7, "EVE - Launcher", Some(5))));
        assert!(!matcher.is_target(&window(7, "EVE - EVE-O Preview settings", None)));
        assert!(!matcher.is_target(&window(7, "Firefox - EVE", Some(5))));
        assert!(!matcher.is_target(&window(7, "EVE Online", None)));
    }

    #[test]
    fn display_name_strips_prefix_and_tag() {
        assert_eq!(display_name("EVE - Jane Doe [Omega]"), "Jane Doe");
        assert_eq!(display_name("EVE - Jane Doe"), "Jane Doe");
        assert_eq!(display_name("EVE -   Spaced Out   [x] [y]"), "Spaced Out");
        assert_eq!(display_name("EVE - A - B"), "A - B");
        assert_eq!(display_name("EVE"), "EVE");
        assert_eq!(display_name(""), "EVE");
    }

    #[test]
    fn display_name_holds_for_generated_titles() {
        let names = ["Jane Doe", "X", "Capsuleer Prime", "a b c"];
        let tags = ["Omega", "", "Alpha Clone", "1"];
        for name in names {
            for tag in tags {
                for pad in ["", " ", "  "] {
                    let title = format!("EVE - {pad}{name}{pad}[{tag}]");
                    assert_eq!(display_name(&title), name.trim(), "title {title:?}");
                }
            }
        }
    }
}
