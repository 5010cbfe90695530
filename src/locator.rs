use crate::config::{ConfigView, MODULE_DIR, VM_LOCATION, VM_VERSION_MAX, VM_VERSION_MIN};
use crate::env::Environment;
use crate::error::LaunchError;
use log::{debug, info};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Finds the dynamic library that implements the runtime invocation interface.
pub trait RuntimeLocator {
    fn locate(&self, config: &dyn ConfigView) -> Result<PathBuf, LaunchError>;
}

/// Library locations relative to a Java home, most specific first.
#[cfg(windows)]
pub(crate) const LIBRARY_CANDIDATES: &[&str] = &[
    "bin/server/jvm.dll",
    "jre/bin/server/jvm.dll",
    "bin/client/jvm.dll",
    "jre/bin/client/jvm.dll",
];
#[cfg(target_os = "macos")]
pub(crate) const LIBRARY_CANDIDATES: &[&str] = &[
    "lib/server/libjvm.dylib",
    "jre/lib/server/libjvm.dylib",
    "Contents/Home/lib/server/libjvm.dylib",
];
#[cfg(all(not(windows), not(target_os = "macos")))]
pub(crate) const LIBRARY_CANDIDATES: &[&str] = &[
    "lib/server/libjvm.so",
    "jre/lib/server/libjvm.so",
    "lib/amd64/server/libjvm.so",
    "jre/lib/amd64/server/libjvm.so",
    "lib/aarch64/server/libjvm.so",
    "jre/lib/aarch64/server/libjvm.so",
    "lib/client/libjvm.so",
];

#[cfg(windows)]
const JAVA_EXECUTABLE: &str = "java.exe";
#[cfg(not(windows))]
const JAVA_EXECUTABLE: &str = "java";

/// Searches, in order: the configured `vm.location`, `JAVA_HOME`, then the
/// Java home owning the first `java` executable on `PATH`.
pub struct JvmLocator {
    env: Environment,
}

impl JvmLocator {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    fn java_homes(&self) -> Vec<PathBuf> {
        let mut homes = Vec::new();
        if let Some(home) = self.env.get_var("JAVA_HOME").filter(|h| !h.is_empty()) {
            homes.push(PathBuf::from(home));
        }
        if let Some(java) = self
            .env
            .get_var("PATH")
            .and_then(|paths| find_in_path(OsStr::new(paths), OsStr::new(JAVA_EXECUTABLE)))
        {
            // <home>/bin/java, possibly behind symlinks such as /usr/bin/java.
            let java = fs::canonicalize(&java).unwrap_or(java);
            if let Some(home) = java.parent().and_then(Path::parent) {
                homes.push(home.to_path_buf());
            }
        }
        homes
    }
}

impl RuntimeLocator for JvmLocator {
    fn locate(&self, config: &dyn ConfigView) -> Result<PathBuf, LaunchError> {
        let constraints = VersionConstraints::from_config(config);

        if let Some(location) = config.get(VM_LOCATION).filter(|l| !l.is_empty()) {
            let base = config.get(MODULE_DIR).map(PathBuf::from).unwrap_or_else(|| self.env.current_dir.clone());
            let path = base.join(location);
            return match find_by_path(&path) {
                Some(p) => {
                    info!("using configured VM library {}", p.display());
                    Ok(p.to_path_buf())
                }
                None => Err(LaunchError::RuntimeNotFound(format!(
                    "{VM_LOCATION} {} does not exist",
                    path.display()
                ))),
            };
        }

        let mut rejected = Vec::new();
        for home in self.java_homes() {
            let Some(library) = find_library_in_home(&home) else {
                debug!("no VM library under {}", home.display());
                continue;
            };
            match java_version(&home) {
                Some(version) if !constraints.accepts(&version) => {
                    info!("skipping {} (version {version})", home.display());
                    rejected.push(format!("{} ({version})", home.display()));
                }
                _ => {
                    info!("found VM library {}", library.display());
                    return Ok(library);
                }
            }
        }

        let reason = if rejected.is_empty() {
            "no Java installation found via JAVA_HOME or PATH".to_string()
        } else {
            format!("no installation matches the version constraints: {}", rejected.join(", "))
        };
        Err(LaunchError::RuntimeNotFound(reason))
    }
}

/// First existing library candidate under `home`.
pub fn find_library_in_home(home: &Path) -> Option<PathBuf> {
    LIBRARY_CANDIDATES
        .iter()
        .map(|candidate| home.join(candidate))
        .find(|path| find_by_path(path).is_some())
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

/// `JAVA_VERSION` from `<home>/release`, if present.
fn java_version(home: &Path) -> Option<String> {
    let text = fs::read_to_string(home.join("release")).ok()?;
    text.lines()
        .filter_map(|line| line.strip_prefix("JAVA_VERSION="))
        .map(|v| v.trim().trim_matches('"').to_string())
        .next()
}

/// Parse a Java version into comparable numbers; `1.8.0_292` becomes `[8, 0, 292]`.
fn version_key(version: &str) -> Vec<u32> {
    let mut parts: Vec<u32> = version
        .split(['.', '_', '-', '+'])
        .map_while(|p| p.parse().ok())
        .collect();
    if parts.first() == Some(&1) && parts.len() > 1 {
        parts.remove(0);
    }
    parts
}

#[derive(Debug, Default)]
struct VersionConstraints {
    min: Option<Vec<u32>>,
    max: Option<Vec<u32>>,
}

impl VersionConstraints {
    fn from_config(config: &dyn ConfigView) -> Self {
        Self {
            min: config.get(VM_VERSION_MIN).map(version_key),
            max: config.get(VM_VERSION_MAX).map(version_key),
        }
    }

    fn accepts(&self, version: &str) -> bool {
        let v = version_key(version);
        let above_min = self.min.as_ref().is_none_or(|min| &v >= min);
        // A max of "11" admits every 11.x release.
        let below_max = self
            .max
            .as_ref()
            .is_none_or(|max| v.iter().take(max.len()).cmp(max.iter()).is_le());
        above_min && below_max
    }
}
