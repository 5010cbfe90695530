use crate::config::{CLASS_PATH, ConfigView};
use log::{debug, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Separator between classpath entries on this platform.
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: &str = ";";
/// Separator between classpath entries on this platform.
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: &str = ":";

/// Prefix of the runtime option that carries the classpath.
pub const CLASS_PATH_OPTION: &str = "-Djava.class.path=";

/// Build the single `-Djava.class.path=` runtime argument from `classpath.N` entries.
///
/// Relative entries are resolved against `base`. A `*` or `?` in the last
/// component expands to the matching directory entries in name order. With no
/// entries at all the classpath is the current directory.
pub fn build_class_path(config: &dyn ConfigView, base: &Path) -> String {
    let mut entries: Vec<String> = Vec::new();
    for entry in config.numbered(CLASS_PATH) {
        let path = base.join(entry);
        if is_wildcard(entry) {
            let matched = expand_wildcard(&path);
            if matched.is_empty() {
                warn!("classpath entry matched nothing: {entry}");
            }
            entries.extend(matched.iter().map(|p| p.to_string_lossy().into_owned()));
        } else {
            entries.push(path.to_string_lossy().into_owned());
        }
    }

    if entries.is_empty() {
        entries.push(".".to_string());
    }
    let joined = entries.join(PATH_LIST_SEPARATOR);
    debug!("classpath: {joined}");
    format!("{CLASS_PATH_OPTION}{joined}")
}

fn is_wildcard(entry: &str) -> bool {
    entry.contains('*') || entry.contains('?')
}

fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// List the files in the parent of `pattern` whose names match its last component.
fn expand_wildcard(pattern: &Path) -> Vec<PathBuf> {
    let (Some(dir), Some(name)) = (pattern.parent(), pattern.file_name()) else {
        return Vec::new();
    };
    let Some(re) = wildcard_regex(&name.to_string_lossy()) else {
        return Vec::new();
    };
    let Ok(read_dir) = fs::read_dir(dir) else {
        warn!("cannot list classpath directory {}", dir.display());
        return Vec::new();
    };

    let mut matched: Vec<PathBuf> = read_dir
        .filter_map(Result::ok)
        .filter(|e| re.is_match(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    matched.sort();
    matched
}
