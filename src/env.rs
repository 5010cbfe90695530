use regex::{Captures, Regex};
use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Snapshot of the process environment the launcher works against.
///
/// The environment contains:
/// - `vars`: variables used for `%NAME%` expansion and runtime discovery (e.g. `JAVA_HOME`, `PATH`).
/// - `current_dir`: the directory relative configuration paths are resolved against.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables.
    pub vars: HashMap<String, String>,
    /// The directory the launcher considers current.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// An environment with no variables, rooted at `dir`.
    pub fn empty(dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            current_dir: dir.into(),
        }
    }

    /// Get the value of an environment variable from the snapshot.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Replace every `%NAME%` with the value of `NAME`.
    ///
    /// Unknown names are left verbatim so a literal `%` survives.
    pub fn expand(&self, value: &str) -> String {
        static VAR: OnceLock<Regex> = OnceLock::new();
        let re = VAR.get_or_init(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%").expect("valid regex"));
        re.replace_all(value, |caps: &Captures| match self.get_var(&caps[1]) {
            Some(v) => v.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
    }

    /// Resolve `path` against `current_dir` unless it is already absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_dir.join(path)
        }
    }

    /// Change the process working directory and record it.
    pub fn change_dir(&mut self, dir: impl AsRef<Path>) -> std::io::Result<()> {
        let target = self.resolve(dir);
        stdenv::set_current_dir(&target)?;
        self.current_dir = stdenv::current_dir().unwrap_or(target);
        Ok(())
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes tests that change the process working directory.
#[cfg(test)]
pub(crate) fn lock_current_dir() -> std::sync::MutexGuard<'static, ()> {
    static MUTEX: OnceLock<std::sync::Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| std::sync::Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
