//! Seams between the lifecycle controller and an embeddable runtime.
//!
//! The traits mirror the runtime invocation interface: a loader maps the
//! library, the library creates a runtime instance, and the instance exposes an
//! environment for native registration, runs the entry point and is finally
//! destroyed. [`crate::jni`] provides the real implementation.

use crate::assembler::{ArgumentVector, EntryPoint};
use crate::error::{ExitCode, LaunchError};
use std::ffi::{CStr, CString, c_char, c_void};
use std::path::Path;
use std::ptr;

/// A sealed [`ArgumentVector`] converted for a C interface.
///
/// Owns one `CString` per argument plus a pointer array whose last element is
/// the null sentinel. No pointer before the sentinel is null.
#[derive(Debug)]
pub struct NativeArgv {
    strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl NativeArgv {
    /// Convert a sealed vector. Arguments with an interior NUL are rejected.
    pub fn from_vector(args: &ArgumentVector) -> Result<Self, LaunchError> {
        if !args.is_sealed() {
            return Err(LaunchError::OutOfOrder {
                expected: "sealed argument vector",
                actual: "open argument vector",
            });
        }
        let strings = args
            .as_slice()
            .iter()
            .map(|arg| CString::new(arg.as_str()).map_err(|_| LaunchError::InvalidArgument(arg.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let pointers = strings
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(Self { strings, pointers })
    }

    /// Null-terminated pointer array, valid while `self` lives.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    /// All pointers, sentinel included.
    pub fn pointers(&self) -> &[*const c_char] {
        &self.pointers
    }

    /// Number of arguments, sentinel excluded.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.strings.iter().map(CString::as_c_str)
    }

    /// Lossy UTF-8 copies of the arguments.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|s| s.to_string_lossy().into_owned()).collect()
    }
}

/// One native method bound to a class in the running environment.
#[derive(Debug, Clone, Copy)]
pub struct NativeMethod {
    pub name: &'static CStr,
    pub signature: &'static CStr,
    pub fn_ptr: *mut c_void,
}

/// Result of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The methods are bound.
    Registered,
    /// The target class is not on the classpath; nothing was bound.
    ClassNotFound,
}

/// Maps a runtime library from disk.
pub trait RuntimeLoader {
    /// Load the library at `path` and resolve its creation entry point.
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn RuntimeLibrary>>;
}

/// A loaded runtime library.
pub trait RuntimeLibrary {
    /// Create a runtime configured with `options`.
    fn create_runtime(&self, options: &NativeArgv) -> anyhow::Result<Box<dyn RuntimeInstance>>;
}

/// The environment of a running runtime, as seen from native code.
pub trait RuntimeEnv {
    /// Bind `methods` to `class` (slash-separated name).
    fn register_natives(&mut self, class: &str, methods: &[NativeMethod]) -> anyhow::Result<Registration>;
}

/// A created runtime instance.
pub trait RuntimeInstance {
    /// Environment attached to the launching thread.
    fn env(&mut self) -> &mut dyn RuntimeEnv;

    /// Call the static `main(String[])` of `class` with `args`.
    ///
    /// Only failure to dispatch is an error; whatever the entry point itself
    /// throws is left to the runtime.
    fn invoke_main(&mut self, class: &EntryPoint, args: &NativeArgv) -> anyhow::Result<()>;

    /// Shut the runtime down, blocking until its non-daemon threads finish.
    fn destroy(self: Box<Self>) -> ExitCode;
}
