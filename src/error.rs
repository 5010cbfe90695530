use std::fmt;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Exit status reported for every fatal launcher condition.
pub const FATAL_EXIT: ExitCode = 1;

/// Fatal conditions detected by the launcher core.
///
/// Every variant aborts the launch at the point of detection. There is no retry
/// and no degraded mode; the process exits with [`FATAL_EXIT`].
#[derive(Debug)]
pub enum LaunchError {
    /// The configuration file next to the executable is missing or unreadable.
    ConfigNotFound(PathBuf),
    /// No runtime library satisfied the configured constraints.
    RuntimeNotFound(String),
    /// `main.class` is not set.
    MissingEntryPoint,
    /// An argument vector would exceed its fixed capacity.
    TooManyArguments {
        /// Which vector overflowed (`"vm"` or `"program"`).
        vector: &'static str,
        /// Maximum number of entries, sentinel excluded.
        limit: usize,
    },
    /// An argument contains an interior NUL and cannot cross the C boundary.
    InvalidArgument(String),
    /// The runtime library could not be loaded or refused to create a runtime.
    RuntimeStart(anyhow::Error),
    /// A native callback surface could not be registered.
    NativeRegistration {
        /// Name of the failing surface.
        surface: String,
        /// Underlying failure.
        source: anyhow::Error,
    },
    /// The entry point could not be resolved or called.
    Dispatch(String),
    /// A lifecycle step was requested from the wrong state.
    OutOfOrder {
        /// State the step requires.
        expected: &'static str,
        /// State the controller was actually in.
        actual: &'static str,
    },
}

impl LaunchError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> ExitCode {
        FATAL_EXIT
    }

    /// Whether the user gets a blocking notification in addition to the log.
    pub fn needs_notification(&self) -> bool {
        matches!(
            self,
            LaunchError::ConfigNotFound(_) | LaunchError::RuntimeNotFound(_)
        )
    }

    /// Short text shown in the startup notification.
    pub fn notification_text(&self) -> &'static str {
        match self {
            LaunchError::ConfigNotFound(_) => "Failed to find or load ini file.",
            LaunchError::RuntimeNotFound(_) => "Failed to find Java VM.",
            _ => "Failed to start application.",
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::ConfigNotFound(path) => {
                write!(f, "failed to find or load ini file: {}", path.display())
            }
            LaunchError::RuntimeNotFound(reason) => write!(f, "failed to find Java VM: {reason}"),
            LaunchError::MissingEntryPoint => write!(f, "no main class specified"),
            LaunchError::TooManyArguments { vector, limit } => {
                write!(f, "too many {vector} arguments (limit is {limit})")
            }
            LaunchError::InvalidArgument(arg) => {
                write!(f, "argument contains a NUL character: {arg:?}")
            }
            LaunchError::RuntimeStart(e) => write!(f, "error starting java VM: {e:#}"),
            LaunchError::NativeRegistration { surface, source } => {
                write!(f, "failed to register {surface} natives: {source:#}")
            }
            LaunchError::Dispatch(reason) => write!(f, "could not run main class: {reason}"),
            LaunchError::OutOfOrder { expected, actual } => {
                write!(f, "lifecycle step requires state {expected}, but state is {actual}")
            }
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::RuntimeStart(e) => Some(e.as_ref()),
            LaunchError::NativeRegistration { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_error_exits_with_one() {
        let errors = [
            LaunchError::ConfigNotFound(PathBuf::from("app.ini")),
            LaunchError::RuntimeNotFound("nothing".into()),
            LaunchError::MissingEntryPoint,
            LaunchError::Dispatch("no class".into()),
            LaunchError::RuntimeStart(anyhow::anyhow!("JNI_CreateJavaVM returned -1")),
        ];
        for e in errors {
            assert_eq!(e.exit_code(), 1, "{e}");
        }
    }

    #[test]
    fn test_only_config_and_resolution_errors_notify() {
        assert!(LaunchError::ConfigNotFound(PathBuf::from("x.ini")).needs_notification());
        assert!(LaunchError::RuntimeNotFound("none".into()).needs_notification());
        assert!(!LaunchError::MissingEntryPoint.needs_notification());
        assert_eq!(
            LaunchError::RuntimeNotFound("none".into()).notification_text(),
            "Failed to find Java VM."
        );
    }

    #[test]
    fn test_registration_error_keeps_source() {
        use std::error::Error;
        let e = LaunchError::NativeRegistration {
            surface: "splash".into(),
            source: anyhow::anyhow!("RegisterNatives returned -1"),
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("splash"));
    }
}
