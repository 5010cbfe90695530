//! `--seticon` utility mode: patch an executable's icon and exit.
//!
//! This path runs before configuration is loaded and never starts a runtime.

use crate::error::ExitCode;
use crate::tokenizer::split_command_line;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Command-line prefix that selects utility mode.
pub const SET_ICON_FLAG: &str = "--seticon";

#[derive(FromArgs, Debug, PartialEq)]
/// Replace the icon resource of an executable.
pub struct SetIcon {
    #[argh(positional)]
    /// executable to patch.
    pub exe: PathBuf,
    #[argh(positional)]
    /// icon file (.ico) to embed.
    pub icon: PathBuf,
}

/// Whether `command_line` asks for utility mode.
pub fn is_icon_request(command_line: &str) -> bool {
    command_line.starts_with(SET_ICON_FLAG)
}

/// Whether already split process arguments ask for utility mode.
pub fn is_icon_request_args<S: AsRef<str>>(args: &[S]) -> bool {
    args.first().is_some_and(|first| is_icon_request(first.as_ref()))
}

/// Writes an icon into an executable's resources.
pub trait IconPatcher {
    fn set_exe_icon(&self, exe: &Path, icon: &Path) -> Result<()>;
}

/// Checks both files and the ICO header, then reports that patching is
/// unsupported.
///
/// Executable resources can only be rewritten by a platform resource updater,
/// which this build does not carry, so a valid request still ends in an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckedIconPatcher;

/// Number of images in an ICO file, from its 6-byte header.
pub fn ico_image_count(bytes: &[u8]) -> Option<u16> {
    match bytes {
        [0, 0, 1, 0, lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])).filter(|n| *n > 0),
        _ => None,
    }
}

impl IconPatcher for CheckedIconPatcher {
    fn set_exe_icon(&self, exe: &Path, icon: &Path) -> Result<()> {
        if !exe.is_file() {
            bail!("executable {} does not exist", exe.display());
        }
        let bytes = fs::read(icon).with_context(|| format!("cannot read icon {}", icon.display()))?;
        let Some(images) = ico_image_count(&bytes) else {
            bail!("{} is not an icon file", icon.display());
        };
        info!("icon {} holds {images} image(s)", icon.display());
        bail!(
            "setting the icon of {} is unsupported on this platform",
            exe.display()
        )
    }
}

fn parse_request(command_line: &str) -> Result<SetIcon, EarlyExit> {
    parse_request_args(&split_command_line(command_line))
}

fn parse_request_args<S: AsRef<str>>(tokens: &[S]) -> Result<SetIcon, EarlyExit> {
    let args: Vec<&str> = tokens.iter().skip(1).map(|t| t.as_ref()).collect();
    SetIcon::from_args(&[SET_ICON_FLAG], &args)
}

/// Run utility mode. Always exits with 0; problems are only logged.
pub fn run(command_line: &str, patcher: &dyn IconPatcher) -> ExitCode {
    execute(parse_request(command_line), patcher)
}

/// [`run`] for already split process arguments, the flag included.
pub fn run_args<S: AsRef<str>>(args: &[S], patcher: &dyn IconPatcher) -> ExitCode {
    execute(parse_request_args(args), patcher)
}

fn execute(request: Result<SetIcon, EarlyExit>, patcher: &dyn IconPatcher) -> ExitCode {
    match request {
        Ok(request) => match patcher.set_exe_icon(&request.exe, &request.icon) {
            Ok(()) => info!("set icon of {} to {}", request.exe.display(), request.icon.display()),
            Err(e) => error!("could not set icon: {e:#}"),
        },
        Err(EarlyExit { output, .. }) => error!("{}", output.trim_end()),
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recording(RefCell<Vec<(PathBuf, PathBuf)>>);

    impl IconPatcher for Recording {
        fn set_exe_icon(&self, exe: &Path, icon: &Path) -> Result<()> {
            self.0.borrow_mut().push((exe.to_path_buf(), icon.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn test_flag_detection() {
        assert!(is_icon_request("--seticon app.exe app.ico"));
        assert!(!is_icon_request("app --seticon"));
        assert!(!is_icon_request(""));
    }

    #[test]
    fn test_request_parsing_with_quoted_paths() {
        let request = parse_request(r#"--seticon "my app.exe" icon.ico"#).unwrap();
        assert_eq!(
            request,
            SetIcon {
                exe: PathBuf::from("my app.exe"),
                icon: PathBuf::from("icon.ico"),
            }
        );
    }

    #[test]
    fn test_run_calls_patcher_and_exits_zero() {
        let patcher = Recording(RefCell::new(Vec::new()));
        assert_eq!(run("--seticon a.exe b.ico", &patcher), 0);
        assert_eq!(
            *patcher.0.borrow(),
            [(PathBuf::from("a.exe"), PathBuf::from("b.ico"))]
        );
    }

    #[test]
    fn test_bad_arguments_still_exit_zero() {
        let patcher = Recording(RefCell::new(Vec::new()));
        assert_eq!(run("--seticon", &patcher), 0);
        assert!(patcher.0.borrow().is_empty());
    }

    #[test]
    fn test_split_arguments_keep_spaces_in_paths() {
        let patcher = Recording(RefCell::new(Vec::new()));
        assert!(is_icon_request_args(&["--seticon", "my app.exe", "a.ico"]));
        assert!(!is_icon_request_args::<&str>(&[]));
        assert_eq!(run_args(&["--seticon", "my app.exe", "a.ico"], &patcher), 0);
        assert_eq!(
            *patcher.0.borrow(),
            [(PathBuf::from("my app.exe"), PathBuf::from("a.ico"))]
        );
    }

    #[test]
    fn test_valid_request_reports_unsupported_platform() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("app.exe");
        let icon = dir.path().join("app.ico");
        fs::write(&exe, b"MZ").unwrap();
        fs::write(&icon, [0, 0, 1, 0, 1, 0]).unwrap();
        let err = CheckedIconPatcher.set_exe_icon(&exe, &icon).unwrap_err();
        assert!(err.to_string().contains("unsupported on this platform"), "{err}");
    }

    #[test]
    fn test_ico_header() {
        assert_eq!(ico_image_count(&[0, 0, 1, 0, 2, 0, 0xff]), Some(2));
        assert_eq!(ico_image_count(&[0, 0, 1, 0, 0, 0]), None);
        assert_eq!(ico_image_count(b"MZ\x90\0"), None);
    }

    #[test]
    fn test_checked_patcher_rejects_non_icons() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("app.exe");
        let icon = dir.path().join("app.ico");
        fs::write(&exe, b"MZ").unwrap();
        fs::write(&icon, b"not an icon").unwrap();
        let err = CheckedIconPatcher.set_exe_icon(&exe, &icon).unwrap_err();
        assert!(err.to_string().contains("not an icon"));

        let err = CheckedIconPatcher
            .set_exe_icon(&dir.path().join("missing.exe"), &icon)
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
