fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Render the effective configuration (defaults + TOML file + environment) and exit.
    if args.iter().any(|a| a == "--print-config") {
        std::process::exit(wirepod_installer::print_config());
    }

    // Stop the tracked wire-pod instance, or clear auto-start when none is tracked.
    if args.iter().any(|a| a == "--stop") {
        std::process::exit(wirepod_installer::run_stop());
    }

    // Usage: --uninstall [--keep-files]
    if args.iter().any(|a| a == "--uninstall") {
        let keep_files = args.iter().any(|a| a == "--keep-files");
        std::process::exit(wirepod_installer::run_uninstall(keep_files));
    }

    // Non-interactive install with indicatif progress on stdout.
    // Usage: --unattended [--install-dir DIR] [--port PORT] [--no-launch-on-login] [--auto-update] [--start]
    if args.iter().any(|a| a == "--unattended") {
        std::process::exit(wirepod_installer::run_unattended(&args));
    }

    std::process::exit(wirepod_installer::run_tui());
}
