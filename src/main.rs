use jvm_launcher::Launcher;
use std::path::PathBuf;

fn main() {
    // The OS already split the arguments; pass them through untouched.
    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    let exe = std::env::current_exe()
        .or_else(|_| std::env::args_os().next().map(PathBuf::from).ok_or(()))
        .unwrap_or_else(|_| PathBuf::from("jvm_launcher"));

    let code = Launcher::default().launch_args(&exe, &args);
    std::process::exit(code);
}
