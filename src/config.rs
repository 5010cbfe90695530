//! Configuration store consumed by the launcher.
//!
//! The core only depends on [`ConfigView`]. [`IniConfig`] is the default store,
//! loaded from an INI file that sits next to the executable.

use crate::env::Environment;
use crate::error::LaunchError;
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Working directory to switch to before anything else runs.
pub const WORKING_DIR: &str = "working.directory";
/// Directory of the executable; injected by the loader.
pub const MODULE_DIR: &str = "module.dir";
/// File name of the executable; injected by the loader.
pub const MODULE_NAME: &str = "module.name";
/// Path of the loaded INI file; injected by the loader.
pub const MODULE_INI: &str = "module.ini";
/// Log file path.
pub const LOG_FILE: &str = "log";
/// Log level name.
pub const LOG_LEVEL: &str = "log.level";
/// Numbered runtime (VM) arguments.
pub const VM_ARG: &str = "vm.arg";
/// Numbered program arguments.
pub const PROG_ARG: &str = "prog.arg";
/// Numbered classpath entries.
pub const CLASS_PATH: &str = "classpath";
/// Dotted entry-point class name.
pub const MAIN_CLASS: &str = "main.class";
/// Explicit runtime library location.
pub const VM_LOCATION: &str = "vm.location";
/// Lowest acceptable runtime version.
pub const VM_VERSION_MIN: &str = "vm.version.min";
/// Highest acceptable runtime version.
pub const VM_VERSION_MAX: &str = "vm.version.max";
/// Maximum heap as a percentage of physical memory.
pub const HEAP_MAX_PERCENT: &str = "vm.heapsize.max.percent";
/// Initial heap as a percentage of physical memory.
pub const HEAP_MIN_PERCENT: &str = "vm.heapsize.min.percent";
/// Splash image path.
pub const SPLASH_IMAGE: &str = "splash.image";

/// Read-only, ordered key lookup.
pub trait ConfigView {
    /// Value for `key`, if present.
    fn get(&self, key: &str) -> Option<&str>;

    /// Values of `prefix.0`, `prefix.1`, ... in order.
    ///
    /// Enumeration stops at the first missing index; later entries are never reached.
    fn numbered(&self, prefix: &str) -> Vec<&str> {
        (0..)
            .map(|i| self.get(&format!("{prefix}.{i}")))
            .take_while(Option::is_some)
            .flatten()
            .collect()
    }
}

/// INI-backed configuration.
///
/// Keys are case-insensitive. Keys inside a `[section]` are stored as `section:key`.
#[derive(Debug, Clone, Default)]
pub struct IniConfig {
    entries: HashMap<String, String>,
    order: Vec<String>,
}

impl IniConfig {
    /// Build a configuration from in-memory pairs, keeping their order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = IniConfig::default();
        for (k, v) in pairs {
            config.insert(k.as_ref(), v);
        }
        config
    }

    /// Parse INI text, expanding `%NAME%` references from `env`.
    pub fn parse(text: &str, env: &Environment) -> Self {
        static SECTION: OnceLock<Regex> = OnceLock::new();
        static ENTRY: OnceLock<Regex> = OnceLock::new();
        let section_re = SECTION.get_or_init(|| Regex::new(r"^\[\s*([^\]]*?)\s*\]$").expect("valid regex"));
        let entry_re = ENTRY.get_or_init(|| Regex::new(r"^([^=]+?)\s*=\s*(.*)$").expect("valid regex"));

        let mut config = IniConfig::default();
        let mut section = String::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(caps) = section_re.captures(line) {
                section = caps[1].to_string();
            } else if let Some(caps) = entry_re.captures(line) {
                let key = if section.is_empty() {
                    caps[1].to_string()
                } else {
                    format!("{section}:{}", &caps[1])
                };
                config.insert(&key, env.expand(&caps[2]));
            } else {
                debug!("ignoring ini line: {line}");
            }
        }
        config
    }

    /// Load the INI file that belongs to the executable at `exe`.
    ///
    /// The file is `exe` with its extension replaced by `.ini`. The module keys
    /// ([`MODULE_DIR`], [`MODULE_NAME`], [`MODULE_INI`]) are injected after parsing.
    pub fn load_for_module(exe: &Path, env: &Environment) -> Result<Self, LaunchError> {
        let ini = exe.with_extension("ini");
        let text = fs::read_to_string(&ini).map_err(|e| {
            debug!("cannot read {}: {e}", ini.display());
            LaunchError::ConfigNotFound(ini.clone())
        })?;

        let mut config = IniConfig::parse(&text, env);
        if let Some(dir) = exe.parent() {
            config.insert(MODULE_DIR, dir.to_string_lossy());
        }
        if let Some(name) = exe.file_name() {
            config.insert(MODULE_NAME, name.to_string_lossy());
        }
        config.insert(MODULE_INI, ini.to_string_lossy());
        Ok(config)
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let key = key.to_lowercase();
        if self.entries.insert(key.clone(), value.into()).is_none() {
            self.order.push(key);
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Key/value pairs in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .map(|k| (k.as_str(), self.entries[k].as_str()))
    }
}

impl ConfigView for IniConfig {
    fn get(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(v) => Some(v.as_str()),
            None => self.entries.get(&key.to_lowercase()).map(String::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_numbered_keys_stop_at_first_gap() {
        let config = IniConfig::from_pairs([
            ("arg.0", "a"),
            ("arg.1", "b"),
            ("arg.3", "d"),
        ]);
        assert_eq!(config.numbered("arg"), vec!["a", "b"]);
    }

    #[test]
    fn test_numbered_keys_without_zero_are_empty() {
        let config = IniConfig::from_pairs([("arg.1", "b")]);
        assert!(config.numbered("arg").is_empty());
    }

    #[test]
    fn test_parse_sections_comments_and_case() {
        let mut env = Environment::empty(".");
        env.set_var("HOME_DIR", "/home/me");
        let text = "\
; comment
# another
Main.Class = com.acme.App
vm.arg.0=-Xmx512m
log = %HOME_DIR%/app.log

[ErrorMessages]
java.not.found = Install Java
garbage line
";
        let config = IniConfig::parse(text, &env);
        assert_eq!(config.get("main.class"), Some("com.acme.App"));
        assert_eq!(config.get("MAIN.CLASS"), Some("com.acme.App"));
        assert_eq!(config.get("vm.arg.0"), Some("-Xmx512m"));
        assert_eq!(config.get("log"), Some("/home/me/app.log"));
        assert_eq!(
            config.get("errormessages:java.not.found"),
            Some("Install Java")
        );
        assert_eq!(config.keys().count(), 4);
    }

    #[test]
    fn test_empty_value_is_kept() {
        let config = IniConfig::parse("working.directory=\n", &Environment::empty("."));
        assert_eq!(config.get(WORKING_DIR), Some(""));
    }

    #[test]
    fn test_load_for_module_injects_module_keys() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("app.exe");
        fs::write(dir.path().join("app.ini"), "main.class=a.b.Main\n").unwrap();

        let config = IniConfig::load_for_module(&exe, &Environment::empty(dir.path())).unwrap();
        assert_eq!(config.get(MAIN_CLASS), Some("a.b.Main"));
        assert_eq!(
            config.get(MODULE_DIR).map(PathBuf::from),
            Some(dir.path().to_path_buf())
        );
        assert_eq!(config.get(MODULE_NAME), Some("app.exe"));
    }

    #[test]
    fn test_load_for_module_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IniConfig::load_for_module(&dir.path().join("nope"), &Environment::empty("."))
            .unwrap_err();
        assert!(matches!(err, LaunchError::ConfigNotFound(_)));
    }

    #[test]
    fn test_pairs_keep_insertion_order() {
        let config = IniConfig::from_pairs([("b", "1"), ("a", "2"), ("b", "3")]);
        let pairs: Vec<_> = config.pairs().collect();
        assert_eq!(pairs, vec![("b", "3"), ("a", "2")]);
    }
}
