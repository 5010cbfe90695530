use crate::config::{ConfigView, SPLASH_IMAGE};
use crate::env::Environment;
use anyhow::{Result, bail};
use log::{info, warn};
use std::path::Path;

/// Shows a splash image while the runtime starts.
pub trait SplashScreen {
    fn show(&mut self, image: &Path) -> Result<()>;
}

/// Records the splash request in the log instead of drawing a window.
#[derive(Debug, Default)]
pub struct LoggingSplash {
    shown: Option<std::path::PathBuf>,
}

impl LoggingSplash {
    pub fn shown(&self) -> Option<&Path> {
        self.shown.as_deref()
    }
}

impl SplashScreen for LoggingSplash {
    fn show(&mut self, image: &Path) -> Result<()> {
        if !image.is_file() {
            bail!("splash image {} not found", image.display());
        }
        info!("splash image: {}", image.display());
        self.shown = Some(image.to_path_buf());
        Ok(())
    }
}

/// Show the configured splash image, if any. Failures are only logged.
pub fn show_configured(splash: &mut dyn SplashScreen, config: &dyn ConfigView, env: &Environment) {
    let Some(image) = config.get(SPLASH_IMAGE).filter(|s| !s.is_empty()) else {
        return;
    };
    if let Err(e) = splash.show(&env.resolve(image)) {
        warn!("{e:#}");
    }
}
