//! Config file discovery and expansion into command-line arguments.
//!
//! A config file holds one long option per line without the leading `--`
//! (`color=1e1e2e`, `daemonize`). Blank lines and `#` comments are skipped.
//! File options are placed before the real command line so the latter wins.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::types::{LockError, Result};

/// Candidate config files in lookup order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.as_ref().map(|h| h.join(".config")));

    let mut paths = Vec::new();
    if let Some(home) = &home {
        paths.push(home.join(".rustlock").join("config"));
    }
    if let Some(dir) = config_home {
        paths.push(dir.join("rustlock").join("config"));
    }
    paths.push(PathBuf::from("/etc/rustlock/config"));
    paths
}

/// The explicit path if given, else the first default that exists.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    default_config_paths().into_iter().find(|path| path.is_file())
}

/// Turn config file lines into `--option[=value]` arguments.
pub fn parse_config_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| format!("--{}", line))
        .collect()
}

pub fn read_config_args(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| LockError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let args = parse_config_lines(&contents);
    log::debug!("Loaded {} options from {}", args.len(), path.display());
    Ok(args)
}

/// `program`, then file options, then the original arguments (without
/// their program name).
pub fn merged_args<I>(program: OsString, file_args: Vec<String>, cli_args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    std::iter::once(program)
        .chain(file_args.into_iter().map(OsString::from))
        .chain(cli_args)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_and_blank_lines_are_skipped() {
        let args = parse_config_lines("# colors\ncolor=ff0000\n\n  daemonize  \n#ignore\n");
        assert_eq!(args, vec!["--color=ff0000", "--daemonize"]);
    }

    #[test]
    fn test_file_args_precede_command_line() {
        let merged = merged_args(
            OsString::from("rustlock"),
            vec!["--color=ff0000".to_string()],
            vec![OsString::from("--color=00ff00")],
        );
        assert_eq!(
            merged,
            vec![
                OsString::from("rustlock"),
                OsString::from("--color=ff0000"),
                OsString::from("--color=00ff00"),
            ]
        );
    }

    #[test]
    fn test_explicit_path_is_returned_even_if_missing() {
        let path = Path::new("/nonexistent/rustlock.conf");
        assert_eq!(find_config_file(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn test_system_config_is_last_resort() {
        let paths = default_config_paths();
        assert_eq!(paths.last(), Some(&PathBuf::from("/etc/rustlock/config")));
    }

    #[test]
    fn test_read_config_args_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "ignore-empty-password\ninside-wrong-color=#123456\n").unwrap();
        let args = read_config_args(&path).unwrap();
        assert_eq!(
            args,
            vec!["--ignore-empty-password", "--inside-wrong-color=#123456"]
        );
    }

    #[test]
    fn test_unreadable_config_is_an_error() {
        let err = read_config_args(Path::new("/nonexistent/rustlock.conf")).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }
}
