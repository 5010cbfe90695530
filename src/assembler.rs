//! Construction of the runtime and program argument vectors.

use crate::classpath::build_class_path;
use crate::config::{ConfigView, MAIN_CLASS, PROG_ARG, VM_ARG};
use crate::error::LaunchError;
use crate::tokenizer::append_command_line;
use crate::vm_options::apply_heap_rules;
use log::info;
use std::fmt;
use std::path::PathBuf;

/// Slots in an argument vector, the terminating sentinel included.
pub const MAX_ARGS: usize = 260;

/// Ordered, capacity-capped list of owned argument strings.
///
/// Once [`seal`](ArgumentVector::seal)ed the size is final and the vector can be
/// handed across the C boundary with its null sentinel (see
/// [`NativeArgv`](crate::runtime::NativeArgv)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentVector {
    name: &'static str,
    items: Vec<String>,
    sealed: bool,
}

impl ArgumentVector {
    /// Entries allowed before the sentinel.
    pub const CAPACITY: usize = MAX_ARGS - 1;

    /// Create an empty vector; `name` identifies it in errors and logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: Vec::with_capacity(Self::CAPACITY),
            sealed: false,
        }
    }

    /// Append one argument.
    ///
    /// Fails once the vector is full. Pushing after [`seal`](Self::seal) is a
    /// programming error and is rejected the same way.
    pub fn push(&mut self, arg: String) -> Result<(), LaunchError> {
        if self.sealed || self.items.len() >= Self::CAPACITY {
            return Err(LaunchError::TooManyArguments {
                vector: self.name,
                limit: Self::CAPACITY,
            });
        }
        self.items.push(arg);
        Ok(())
    }

    /// Mark the size as final; the sentinel follows the last entry.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The class to invoke, in the runtime's slash-separated form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint(String);

impl EntryPoint {
    /// Convert a dotted class name (`a.b.Main`) into `a/b/Main`.
    ///
    /// This is one-way: every dot becomes a slash.
    pub fn from_dotted(name: &str) -> Self {
        EntryPoint(name.replace('.', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the lifecycle controller needs to start and drive the runtime.
#[derive(Debug)]
pub struct LaunchPlan {
    pub vm_args: ArgumentVector,
    pub program_args: ArgumentVector,
    pub entry_point: EntryPoint,
}

/// Builds a [`LaunchPlan`] from configuration and the live command line.
pub struct ArgumentAssembler<'a> {
    config: &'a dyn ConfigView,
    base_dir: PathBuf,
    total_memory_mb: Option<u64>,
}

impl<'a> ArgumentAssembler<'a> {
    /// `base_dir` anchors relative classpath entries; `total_memory_mb` feeds the heap rules.
    pub fn new(config: &'a dyn ConfigView, base_dir: PathBuf, total_memory_mb: Option<u64>) -> Self {
        Self {
            config,
            base_dir,
            total_memory_mb,
        }
    }

    /// Assemble both vectors in their fixed order and resolve the entry point.
    ///
    /// `command_line` is the raw process command line; it is tokenized and
    /// appended after the configured program arguments.
    pub fn assemble(&self, command_line: &str) -> Result<LaunchPlan, LaunchError> {
        self.build(|program_args| append_command_line(command_line, program_args))
    }

    /// Like [`assemble`](Self::assemble), for arguments the OS already split.
    ///
    /// Each argument is appended verbatim, quotes included.
    pub fn assemble_args<S: AsRef<str>>(&self, args: &[S]) -> Result<LaunchPlan, LaunchError> {
        self.build(|program_args| {
            for arg in args {
                program_args.push(arg.as_ref().to_string())?;
            }
            Ok(())
        })
    }

    fn build(
        &self,
        append_live_args: impl FnOnce(&mut ArgumentVector) -> Result<(), LaunchError>,
    ) -> Result<LaunchPlan, LaunchError> {
        let mut vm_args = ArgumentVector::new("vm");
        for arg in self.config.numbered(VM_ARG) {
            vm_args.push(arg.to_string())?;
        }
        vm_args.push(build_class_path(self.config, &self.base_dir))?;
        apply_heap_rules(self.config, &mut vm_args, self.total_memory_mb)?;
        for (i, arg) in vm_args.as_slice().iter().enumerate() {
            info!("vmarg.{i}={arg}");
        }

        let mut program_args = ArgumentVector::new("program");
        for arg in self.config.numbered(PROG_ARG) {
            program_args.push(arg.to_string())?;
        }
        append_live_args(&mut program_args)?;
        for (i, arg) in program_args.as_slice().iter().enumerate() {
            info!("arg.{i}={arg}");
        }

        vm_args.seal();
        program_args.seal();

        let main_class = self
            .config
            .get(MAIN_CLASS)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(LaunchError::MissingEntryPoint)?;
        let entry_point = EntryPoint::from_dotted(main_class);
        info!("Main Class: {entry_point}");

        Ok(LaunchPlan {
            vm_args,
            program_args,
            entry_point,
        })
    }
}
