//! Detection of preferred command-line tool alternatives.
//!
//! Probes `$PATH` for modern replacements of classic commands (`rg` for
//! `grep`, `fd` for `find`, ...) and renders the mappings as a context hint
//! so the model suggests the tools the user actually has installed.

use std::collections::BTreeMap;
use std::path::Path;

/// Generic command → preferred alternative, checked in order.
const ALTERNATIVES: &[(&str, &str)] = &[
    ("find", "fd"),
    ("grep", "rg"),
    ("cat", "bat"),
    ("ls", "eza"),
    ("diff", "delta"),
    ("sed", "sd"),
    ("du", "dust"),
    ("top", "htop"),
    ("man", "tldr"),
    ("cd", "z"),
    ("ps", "procs"),
];

/// Detected generic → preferred mappings for this host.
pub struct CommandPreferences {
    preferred: BTreeMap<&'static str, &'static str>,
}

impl CommandPreferences {
    /// Probe `$PATH` once and record every alternative that resolves.
    pub fn detect() -> Self {
        let preferred = ALTERNATIVES
            .iter()
            .filter(|(_, alt)| on_path(alt))
            .map(|(generic, alt)| (*generic, *alt))
            .collect();
        Self { preferred }
    }

    #[cfg(test)]
    fn with_mappings(mappings: &[(&'static str, &'static str)]) -> Self {
        Self {
            preferred: mappings.iter().copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty()
    }

    pub fn mappings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.preferred.iter().map(|(g, p)| (*g, *p))
    }

    /// Render the mappings as a prompt section, or `None` when nothing was
    /// detected.
    pub fn context_section(&self) -> Option<String> {
        if self.preferred.is_empty() {
            return None;
        }

        let mut lines = vec![
            "## Command Preferences".to_string(),
            "The user has modern alternatives installed; prefer them:".to_string(),
        ];
        for (generic, preferred) in &self.preferred {
            lines.push(format!("- Use `{}` instead of `{}`", preferred, generic));
        }
        Some(lines.join("\n"))
    }
}

/// Whether an executable with this name exists on `$PATH`.
fn on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
