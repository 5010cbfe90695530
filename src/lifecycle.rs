//! The ordered, fail-fast lifecycle of the hosted runtime.
//!
//! ```text
//! Init -> LibraryResolved -> RuntimeStarted -> NativesRegistered
//!      -> MainInvoked -> RuntimeShutdown -> Closed
//! ```
//!
//! Every step checks the current state and refuses to run out of order. A
//! failing step leaves the state untouched; the caller aborts the launch.

use crate::assembler::{EntryPoint, LaunchPlan};
use crate::config::ConfigView;
use crate::error::{ExitCode, LaunchError};
use crate::locator::RuntimeLocator;
use crate::natives::NativeRegistrar;
use crate::runtime::{NativeArgv, RuntimeInstance, RuntimeLibrary, RuntimeLoader};
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    LibraryResolved,
    RuntimeStarted,
    NativesRegistered,
    MainInvoked,
    RuntimeShutdown,
    Closed,
}

impl LifecycleState {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleState::Init => "Init",
            LifecycleState::LibraryResolved => "LibraryResolved",
            LifecycleState::RuntimeStarted => "RuntimeStarted",
            LifecycleState::NativesRegistered => "NativesRegistered",
            LifecycleState::MainInvoked => "MainInvoked",
            LifecycleState::RuntimeShutdown => "RuntimeShutdown",
            LifecycleState::Closed => "Closed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The live runtime: its library and the instance created from it.
///
/// Owned by the controller alone and destroyed exactly once by
/// [`shutdown`](RuntimeHandle::shutdown), which consumes it.
pub struct RuntimeHandle {
    // Kept mapped until the instance is gone.
    _library: Box<dyn RuntimeLibrary>,
    instance: Box<dyn RuntimeInstance>,
}

impl RuntimeHandle {
    fn instance(&mut self) -> &mut dyn RuntimeInstance {
        self.instance.as_mut()
    }

    /// Blocks until every non-daemon runtime thread has finished.
    fn shutdown(self) -> ExitCode {
        let RuntimeHandle { _library, instance } = self;
        instance.destroy()
    }
}

/// Drives the runtime from library resolution to shutdown.
pub struct LifecycleController {
    state: LifecycleState,
    loader: Box<dyn RuntimeLoader>,
    registrars: Vec<Box<dyn NativeRegistrar>>,
    library_path: Option<PathBuf>,
    runtime: Option<RuntimeHandle>,
    plan: Option<LaunchPlan>,
}

impl LifecycleController {
    /// `registrars` are registered in the given order.
    pub fn new(loader: Box<dyn RuntimeLoader>, registrars: Vec<Box<dyn NativeRegistrar>>) -> Self {
        Self {
            state: LifecycleState::Init,
            loader,
            registrars,
            library_path: None,
            runtime: None,
            plan: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn library_path(&self) -> Option<&Path> {
        self.library_path.as_deref()
    }

    fn expect_state(&self, expected: LifecycleState) -> Result<(), LaunchError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LaunchError::OutOfOrder {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        debug!("lifecycle: {} -> {next}", self.state);
        self.state = next;
    }

    fn runtime(&mut self) -> Result<&mut RuntimeHandle, LaunchError> {
        let actual = self.state.name();
        self.runtime.as_mut().ok_or(LaunchError::OutOfOrder {
            expected: LifecycleState::RuntimeStarted.name(),
            actual,
        })
    }

    /// `Init -> LibraryResolved`: ask `locator` for the runtime library.
    pub fn resolve(&mut self, locator: &dyn RuntimeLocator, config: &dyn ConfigView) -> Result<(), LaunchError> {
        self.expect_state(LifecycleState::Init)?;
        let path = locator.locate(config)?;
        info!("VM library: {}", path.display());
        self.library_path = Some(path);
        self.advance(LifecycleState::LibraryResolved);
        Ok(())
    }

    /// `LibraryResolved -> RuntimeStarted`: load the library and create the
    /// runtime with the sealed runtime vector of `plan`.
    ///
    /// The plan is kept until [`release_arguments`](Self::release_arguments).
    pub fn start(&mut self, plan: LaunchPlan) -> Result<(), LaunchError> {
        self.expect_state(LifecycleState::LibraryResolved)?;
        let path = self.library_path.clone().ok_or(LaunchError::OutOfOrder {
            expected: LifecycleState::LibraryResolved.name(),
            actual: self.state.name(),
        })?;

        let options = NativeArgv::from_vector(&plan.vm_args)?;
        let library = self.loader.load(&path).map_err(LaunchError::RuntimeStart)?;
        let instance = library
            .create_runtime(&options)
            .map_err(LaunchError::RuntimeStart)?;

        self.runtime = Some(RuntimeHandle {
            _library: library,
            instance,
        });
        self.plan = Some(plan);
        self.advance(LifecycleState::RuntimeStarted);
        Ok(())
    }

    /// `RuntimeStarted -> NativesRegistered`: register every surface in order;
    /// the first failure aborts.
    pub fn register_natives(&mut self) -> Result<(), LaunchError> {
        self.expect_state(LifecycleState::RuntimeStarted)?;
        let registrars = std::mem::take(&mut self.registrars);
        let runtime = self.runtime()?;
        for registrar in &registrars {
            registrar
                .register(runtime.instance().env())
                .map_err(|source| LaunchError::NativeRegistration {
                    surface: registrar.name().to_string(),
                    source,
                })?;
        }
        self.advance(LifecycleState::NativesRegistered);
        Ok(())
    }

    /// `NativesRegistered -> MainInvoked`: call the entry point with the program vector.
    pub fn invoke_main(&mut self) -> Result<(), LaunchError> {
        self.expect_state(LifecycleState::NativesRegistered)?;
        let plan = self.plan.take().ok_or(LaunchError::MissingEntryPoint)?;
        let result = self.dispatch(&plan.entry_point, &plan);
        self.plan = Some(plan);
        result?;
        self.advance(LifecycleState::MainInvoked);
        Ok(())
    }

    fn dispatch(&mut self, entry_point: &EntryPoint, plan: &LaunchPlan) -> Result<(), LaunchError> {
        let args = NativeArgv::from_vector(&plan.program_args)?;
        self.runtime()?
            .instance()
            .invoke_main(entry_point, &args)
            .map_err(|e| LaunchError::Dispatch(format!("{e:#}")))
    }

    /// `MainInvoked -> RuntimeShutdown`: drop both argument vectors now that the
    /// runtime has accepted them.
    pub fn release_arguments(&mut self) -> Result<(), LaunchError> {
        self.expect_state(LifecycleState::MainInvoked)?;
        if let Some(plan) = self.plan.take() {
            debug!(
                "releasing {} vm and {} program arguments",
                plan.vm_args.len(),
                plan.program_args.len()
            );
        }
        self.advance(LifecycleState::RuntimeShutdown);
        Ok(())
    }

    /// `RuntimeShutdown -> Closed`: destroy the runtime.
    ///
    /// Blocks, with no timeout, until every non-daemon runtime thread has
    /// finished. The returned code is the process exit status.
    pub fn shutdown(&mut self) -> Result<ExitCode, LaunchError> {
        self.expect_state(LifecycleState::RuntimeShutdown)?;
        let runtime = self.runtime.take().ok_or(LaunchError::OutOfOrder {
            expected: LifecycleState::RuntimeStarted.name(),
            actual: self.state.name(),
        })?;
        let code = runtime.shutdown();
        info!("VM shut down with status {code}");
        self.advance(LifecycleState::Closed);
        Ok(code)
    }

    /// Run every step after resolution, in order.
    pub fn run(&mut self, plan: LaunchPlan) -> Result<ExitCode, LaunchError> {
        self.start(plan)?;
        self.register_natives()?;
        self.invoke_main()?;
        self.release_arguments()?;
        self.shutdown()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::assembler::ArgumentAssembler;
    use crate::config::IniConfig;
    use crate::runtime::{NativeMethod, Registration, RuntimeEnv};
    use anyhow::{anyhow, bail};
    use std::cell::RefCell;
    use std::rc::Rc;

    pub(crate) type Log = Rc<RefCell<Vec<String>>>;

    /// Which fake step should fail.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub(crate) enum Fail {
        #[default]
        Nothing,
        Load,
        Create,
        Register,
        Dispatch,
    }

    pub(crate) struct FakeLoader {
        pub log: Log,
        pub fail: Fail,
        pub exit_code: ExitCode,
    }

    struct FakeLibrary {
        log: Log,
        fail: Fail,
        exit_code: ExitCode,
    }

    struct FakeInstance {
        log: Log,
        fail: Fail,
        exit_code: ExitCode,
    }

    impl RuntimeLoader for FakeLoader {
        fn load(&self, path: &Path) -> anyhow::Result<Box<dyn RuntimeLibrary>> {
            self.log.borrow_mut().push(format!("load {}", path.display()));
            if self.fail == Fail::Load {
                bail!("cannot map library");
            }
            Ok(Box::new(FakeLibrary {
                log: self.log.clone(),
                fail: self.fail,
                exit_code: self.exit_code,
            }))
        }
    }

    impl RuntimeLibrary for FakeLibrary {
        fn create_runtime(&self, options: &NativeArgv) -> anyhow::Result<Box<dyn RuntimeInstance>> {
            self.log
                .borrow_mut()
                .push(format!("create {}", options.to_strings().join(" ")));
            if self.fail == Fail::Create {
                bail!("JNI_CreateJavaVM returned -1");
            }
            Ok(Box::new(FakeInstance {
                log: self.log.clone(),
                fail: self.fail,
                exit_code: self.exit_code,
            }))
        }
    }

    impl RuntimeEnv for FakeInstance {
        fn register_natives(&mut self, class: &str, _methods: &[NativeMethod]) -> anyhow::Result<Registration> {
            self.log.borrow_mut().push(format!("register {class}"));
            if self.fail == Fail::Register {
                bail!("RegisterNatives returned -1");
            }
            Ok(Registration::Registered)
        }
    }

    impl RuntimeInstance for FakeInstance {
        fn env(&mut self) -> &mut dyn RuntimeEnv {
            self
        }

        fn invoke_main(&mut self, class: &EntryPoint, args: &NativeArgv) -> anyhow::Result<()> {
            assert!(args.pointers().last().unwrap().is_null());
            self.log
                .borrow_mut()
                .push(format!("main {class} {}", args.to_strings().join("|")));
            if self.fail == Fail::Dispatch {
                return Err(anyhow!("could not find main class {class}"));
            }
            Ok(())
        }

        fn destroy(self: Box<Self>) -> ExitCode {
            self.log.borrow_mut().push("destroy".to_string());
            self.exit_code
        }
    }

    pub(crate) struct FixedLocator(pub Option<PathBuf>);

    impl RuntimeLocator for FixedLocator {
        fn locate(&self, _config: &dyn ConfigView) -> Result<PathBuf, LaunchError> {
            self.0
                .clone()
                .ok_or_else(|| LaunchError::RuntimeNotFound("none".to_string()))
        }
    }

    fn controller(log: &Log, fail: Fail) -> LifecycleController {
        let config = IniConfig::default();
        LifecycleController::new(
            Box::new(FakeLoader {
                log: log.clone(),
                fail,
                exit_code: 0,
            }),
            crate::natives::default_registrars(&config),
        )
    }

    fn plan() -> LaunchPlan {
        let config = IniConfig::from_pairs([
            ("main.class", "com.acme.App"),
            ("vm.arg.0", "-Xmx512m"),
            ("prog.arg.0", "--verbose"),
        ]);
        ArgumentAssembler::new(&config, PathBuf::from("/app"), None)
            .assemble(r#"--file "my file.txt""#)
            .unwrap()
    }

    #[test]
    fn test_full_lifecycle_in_order() {
        let log = Log::default();
        let mut ctl = controller(&log, Fail::Nothing);
        ctl.resolve(&FixedLocator(Some(PathBuf::from("/jvm/libjvm.so"))), &IniConfig::default())
            .unwrap();
        assert_eq!(ctl.state(), LifecycleState::LibraryResolved);

        let code = ctl.run(plan()).unwrap();
        assert_eq!(code, 0);
        assert_eq!(ctl.state(), LifecycleState::Closed);

        let log = log.borrow();
        assert_eq!(log[0], "load /jvm/libjvm.so");
        assert!(log[1].starts_with("create -Xmx512m -Djava.class.path="));
        assert_eq!(
            log[2..6],
            [
                "register org/boris/winrun4j/INI",
                "register org/boris/winrun4j/SplashScreen",
                "register org/boris/winrun4j/RegistryKey",
                "register org/boris/winrun4j/Environment",
            ]
        );
        assert_eq!(log[6], "main com/acme/App --verbose|--file|my file.txt");
        assert_eq!(log[7], "destroy");
    }

    #[test]
    fn test_shutdown_status_is_forwarded() {
        let log = Log::default();
        let mut ctl = LifecycleController::new(
            Box::new(FakeLoader {
                log: log.clone(),
                fail: Fail::Nothing,
                exit_code: 3,
            }),
            Vec::new(),
        );
        ctl.resolve(&FixedLocator(Some(PathBuf::from("jvm"))), &IniConfig::default())
            .unwrap();
        assert_eq!(ctl.run(plan()).unwrap(), 3);
    }

    #[test]
    fn test_resolution_failure_stops_everything() {
        let log = Log::default();
        let mut ctl = controller(&log, Fail::Nothing);
        let err = ctl.resolve(&FixedLocator(None), &IniConfig::default()).unwrap_err();
        assert!(matches!(err, LaunchError::RuntimeNotFound(_)));
        assert_eq!(ctl.state(), LifecycleState::Init);
        assert!(matches!(ctl.run(plan()), Err(LaunchError::OutOfOrder { .. })));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_start_failures_are_runtime_start_errors() {
        for fail in [Fail::Load, Fail::Create] {
            let log = Log::default();
            let mut ctl = controller(&log, fail);
            ctl.resolve(&FixedLocator(Some(PathBuf::from("jvm"))), &IniConfig::default())
                .unwrap();
            let err = ctl.run(plan()).unwrap_err();
            assert!(matches!(err, LaunchError::RuntimeStart(_)));
            assert_eq!(ctl.state(), LifecycleState::LibraryResolved);
            assert!(!log.borrow().iter().any(|l| l.starts_with("register")));
        }
    }

    #[test]
    fn test_first_registration_failure_aborts() {
        let log = Log::default();
        let mut ctl = controller(&log, Fail::Register);
        ctl.resolve(&FixedLocator(Some(PathBuf::from("jvm"))), &IniConfig::default())
            .unwrap();
        let err = ctl.run(plan()).unwrap_err();
        assert!(matches!(err, LaunchError::NativeRegistration { ref surface, .. } if surface == "config"));
        let registers = log.borrow().iter().filter(|l| l.starts_with("register")).count();
        assert_eq!(registers, 1);
        assert_eq!(ctl.state(), LifecycleState::RuntimeStarted);
    }

    #[test]
    fn test_dispatch_failure() {
        let log = Log::default();
        let mut ctl = controller(&log, Fail::Dispatch);
        ctl.resolve(&FixedLocator(Some(PathBuf::from("jvm"))), &IniConfig::default())
            .unwrap();
        let err = ctl.run(plan()).unwrap_err();
        assert!(matches!(err, LaunchError::Dispatch(_)));
        assert_eq!(ctl.state(), LifecycleState::NativesRegistered);
        assert!(!log.borrow().iter().any(|l| l == "destroy"));
    }

    #[test]
    fn test_steps_cannot_be_skipped() {
        let log = Log::default();
        let mut ctl = controller(&log, Fail::Nothing);
        assert!(matches!(ctl.start(plan()), Err(LaunchError::OutOfOrder { expected: "LibraryResolved", .. })));
        assert!(ctl.register_natives().is_err());
        assert!(ctl.invoke_main().is_err());
        assert!(ctl.release_arguments().is_err());
        assert!(ctl.shutdown().is_err());
        assert_eq!(ctl.state(), LifecycleState::Init);
    }

    #[test]
    fn test_arguments_released_only_after_invocation() {
        let log = Log::default();
        let mut ctl = controller(&log, Fail::Nothing);
        ctl.resolve(&FixedLocator(Some(PathBuf::from("jvm"))), &IniConfig::default())
            .unwrap();
        ctl.start(plan()).unwrap();
        assert!(ctl.release_arguments().is_err());
        ctl.register_natives().unwrap();
        ctl.invoke_main().unwrap();
        assert!(ctl.plan.is_some());
        ctl.release_arguments().unwrap();
        assert!(ctl.plan.is_none());
        assert_eq!(ctl.state(), LifecycleState::RuntimeShutdown);
        assert_eq!(ctl.shutdown().unwrap(), 0);
        assert!(ctl.shutdown().is_err());
    }
}
