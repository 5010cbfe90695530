use crate::assembler::{ArgumentAssembler, LaunchPlan};
use crate::config::{ConfigView, IniConfig, LOG_FILE, LOG_LEVEL, MODULE_DIR, WORKING_DIR};
use crate::env::Environment;
use crate::error::{ExitCode, LaunchError};
use crate::icon::{self, CheckedIconPatcher, IconPatcher};
use crate::jni::JvmLoader;
use crate::lifecycle::LifecycleController;
use crate::locator::{JvmLocator, RuntimeLocator};
use crate::logging;
use crate::natives::default_registrars;
use crate::runtime::RuntimeLoader;
use crate::splash::{self, LoggingSplash, SplashScreen};
use crate::vm_options::physical_memory_mb;
use log::{error, warn};
use std::io::Write;
use std::path::Path;

/// Blocking, user-visible report of a fatal startup problem.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

/// Writes the notification to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, title: &str, message: &str) {
        let _ = writeln!(std::io::stderr(), "{title}: {message}");
    }
}

/// The process's own arguments, either as one raw line or already split.
#[derive(Clone, Copy)]
enum LiveArgs<'a> {
    Raw(&'a str),
    Split(&'a [String]),
}

impl LiveArgs<'_> {
    fn is_icon_request(self) -> bool {
        match self {
            LiveArgs::Raw(line) => icon::is_icon_request(line),
            LiveArgs::Split(args) => icon::is_icon_request_args(args),
        }
    }

    fn run_icon(self, patcher: &dyn IconPatcher) -> ExitCode {
        match self {
            LiveArgs::Raw(line) => icon::run(line, patcher),
            LiveArgs::Split(args) => icon::run_args(args, patcher),
        }
    }

    fn assemble(self, assembler: &ArgumentAssembler<'_>) -> Result<LaunchPlan, LaunchError> {
        match self {
            LiveArgs::Raw(line) => assembler.assemble(line),
            LiveArgs::Split(args) => assembler.assemble_args(args),
        }
    }
}

/// Process entry flow: from the process arguments to the runtime's exit status.
///
/// All collaborators are pluggable; [`Default`] wires the real ones.
///
/// Example
/// ```no_run
/// use jvm_launcher::Launcher;
/// let exe = std::env::current_exe().unwrap();
/// let args: Vec<String> = std::env::args().skip(1).collect();
/// let status = Launcher::default().launch_args(&exe, &args);
/// std::process::exit(status);
/// ```
pub struct Launcher {
    env: Environment,
    notifier: Box<dyn Notifier>,
    splash: Box<dyn SplashScreen>,
    icon_patcher: Box<dyn IconPatcher>,
    // `None` locates through a `JvmLocator` over `env` at launch time.
    locator: Option<Box<dyn RuntimeLocator>>,
    loader: Box<dyn RuntimeLoader>,
    total_memory_mb: Option<u64>,
}

impl Launcher {
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_splash(mut self, splash: Box<dyn SplashScreen>) -> Self {
        self.splash = splash;
        self
    }

    pub fn with_icon_patcher(mut self, patcher: Box<dyn IconPatcher>) -> Self {
        self.icon_patcher = patcher;
        self
    }

    pub fn with_locator(mut self, locator: Box<dyn RuntimeLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_loader(mut self, loader: Box<dyn RuntimeLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_total_memory_mb(mut self, total: Option<u64>) -> Self {
        self.total_memory_mb = total;
        self
    }

    /// Run the launcher for the executable at `exe` with a raw command line.
    ///
    /// The line is split by the quote-aware tokenizer, which cannot express a
    /// literal `"` inside an argument. Returns 0 for utility mode, the
    /// runtime's shutdown status after a normal run, and 1 for any fatal
    /// condition.
    pub fn launch(self, exe: &Path, command_line: &str) -> ExitCode {
        self.run_entry(exe, LiveArgs::Raw(command_line))
    }

    /// Like [`launch`](Self::launch), for arguments the OS already split.
    ///
    /// Every argument reaches the program vector unchanged.
    pub fn launch_args(self, exe: &Path, args: &[String]) -> ExitCode {
        self.run_entry(exe, LiveArgs::Split(args))
    }

    fn run_entry(mut self, exe: &Path, args: LiveArgs<'_>) -> ExitCode {
        logging::init(None, None);

        if args.is_icon_request() {
            let code = args.run_icon(self.icon_patcher.as_ref());
            logging::close();
            return code;
        }

        let code = match self.launch_runtime(exe, args) {
            Ok(code) => code,
            Err(e) => self.report(&e),
        };
        logging::close();
        code
    }

    fn launch_runtime(&mut self, exe: &Path, args: LiveArgs<'_>) -> Result<ExitCode, LaunchError> {
        let config = IniConfig::load_for_module(exe, &self.env)?;

        self.set_working_directory(&config);

        let log_file = config.get(LOG_FILE).filter(|f| !f.is_empty()).map(|f| self.env.resolve(f));
        logging::init(log_file.as_deref(), config.get(LOG_LEVEL));

        splash::show_configured(self.splash.as_mut(), &config, &self.env);

        let loader = std::mem::replace(&mut self.loader, Box::new(JvmLoader));
        let mut controller = LifecycleController::new(loader, default_registrars(&config));
        let default_locator;
        let locator: &dyn RuntimeLocator = match &self.locator {
            Some(locator) => locator.as_ref(),
            None => {
                default_locator = JvmLocator::new(self.env.clone());
                &default_locator
            }
        };
        controller.resolve(locator, &config)?;

        let assembler = ArgumentAssembler::new(&config, self.env.current_dir.clone(), self.total_memory_mb);
        let plan = args.assemble(&assembler)?;

        controller.run(plan)
    }

    /// Switch to the configured working directory, relative to the module directory.
    fn set_working_directory(&mut self, config: &dyn ConfigView) {
        let Some(dir) = config.get(WORKING_DIR).filter(|d| !d.is_empty()) else {
            return;
        };
        if let Some(module_dir) = config.get(MODULE_DIR) {
            if let Err(e) = self.env.change_dir(module_dir) {
                warn!("cannot change to module directory {module_dir}: {e}");
            }
        }
        if let Err(e) = self.env.change_dir(dir) {
            warn!("cannot change to working directory {dir}: {e}");
        }
    }

    fn report(&self, e: &LaunchError) -> ExitCode {
        error!("{e}");
        if e.needs_notification() {
            self.notifier.notify("Startup Error", e.notification_text());
        }
        e.exit_code()
    }
}

impl Default for Launcher {
    /// The real collaborators: process environment, stderr notifications,
    /// logged splash, checked icon patcher, JVM locator and JNI loader.
    fn default() -> Self {
        Self {
            env: Environment::new(),
            locator: None,
            notifier: Box::new(StderrNotifier),
            splash: Box::new(LoggingSplash::default()),
            icon_patcher: Box::new(CheckedIconPatcher),
            loader: Box::new(JvmLoader),
            total_memory_mb: physical_memory_mb(),
        }
    }
}
