//! A native bootstrapper that hosts a Java virtual machine in-process.
//!
//! The launcher reads an INI file that sits next to its executable, builds the
//! runtime option vector and the program argument vector, locates and loads
//! the JVM library, registers native callbacks and calls the configured main
//! class. The process exits with the runtime's shutdown status.
//!
//! The main entry point is [`Launcher`]. The public modules expose the pieces
//! it is built from, so each stage can be driven and tested on its own:
//! [`tokenizer`] splits raw command lines, [`assembler`] builds the
//! [`LaunchPlan`](assembler::LaunchPlan) and [`lifecycle`] drives the runtime
//! through its ordered states.

pub mod assembler;
pub mod classpath;
pub mod config;
pub mod env;
pub mod error;
pub mod icon;
pub mod jni;
mod launcher;
pub mod lifecycle;
pub mod locator;
pub mod logging;
pub mod natives;
pub mod runtime;
pub mod splash;
pub mod tokenizer;
pub mod vm_options;

/// Re-export of the process entry flow.
///
/// See [`Launcher`] for the high-level API.
pub use launcher::{Launcher, Notifier, StderrNotifier};
