//! `tankos-cli` – TankOS command line entry point
//!
//! This binary is the ignition switch for the tank.  It:
//!
//! 1. Initialises structured logging (see [`tankos_runtime::telemetry`]).
//! 2. Loads `~/.tankos/config.toml` (or `$TANKOS_CONFIG`), applies
//!    `TANKOS_*` overrides and validates the result.
//! 3. Probes the hardware once and starts every component through the
//!    [`Orchestrator`].
//! 4. Intercepts **Ctrl-C** to stop the motors and shut everything down
//!    with bounded joins.
//!
//! `tankos --print-config` prints the effective configuration instead of
//! starting; `tankos --init-config` writes it to the config path.

mod config;

use std::process::ExitCode;
use std::time::Duration;

use colored::Colorize;
use tankos_hal::HardwareRig;
use tankos_runtime::{Orchestrator, init_tracing};
use tankos_types::TankError;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Run,
    PrintConfig,
    InitConfig,
    Help,
}

fn parse_args(args: &[String]) -> Result<Mode, String> {
    match args {
        [] => Ok(Mode::Run),
        [flag] => match flag.as_str() {
            "--print-config" => Ok(Mode::PrintConfig),
            "--init-config" => Ok(Mode::InitConfig),
            "-h" | "--help" => Ok(Mode::Help),
            other => Err(format!("unknown argument `{other}`")),
        },
        _ => Err("expected at most one argument".to_string()),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = match parse_args(&args) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            print_usage();
            return ExitCode::from(2);
        }
    };
    if mode == Mode::Help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let _guard = init_tracing("tankos");

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red().bold());
            eprintln!("  (from {})", config::config_path().display());
            return ExitCode::FAILURE;
        }
    };

    let result = match mode {
        Mode::PrintConfig => config::to_toml(&cfg).map(|text| print!("{text}")),
        Mode::InitConfig => config::save(&cfg).map(|path| {
            println!("  {} Config written to {}", "✓".green().bold(), path.display().to_string().bold());
        }),
        Mode::Run => {
            print_banner();
            run(cfg)
        }
        Mode::Help => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "tankos exited with an error");
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: config::Config) -> Result<(), TankError> {
    println!("  Config: {}", config::config_path().display().to_string().dimmed());

    let rig = HardwareRig::probe(&cfg.camera, &cfg.motor);
    let summary = rig.summary();
    println!(
        "  Backends: sensors {}  motor {}  camera {}",
        summary.sensors.to_string().bold(),
        summary.motor.to_string().bold(),
        summary.camera.to_string().bold()
    );

    let orchestrator = Orchestrator::start(cfg, rig)?;
    if let Some(addr) = orchestrator.gateway_addr() {
        println!("  Cockpit on {}", format!("http://{addr}/").bold().cyan());
    }
    println!("  Press {} to stop.\n", "Ctrl-C".bold());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = orchestrator.stop_signal();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping motors and shutting down …".yellow().bold());
        handler_stop.request_stop();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process with SIGKILL");
    }

    while !stop.wait(Duration::from_secs(1)) {}

    let report = orchestrator.shutdown();
    for name in &report.stopped {
        println!("  {} {name}", "✓".green());
    }
    for name in &report.timed_out {
        println!("  {} {name} did not stop in time", "✗".red());
    }
    println!("  {}", "Exiting TankOS.".green());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  _____           _    ___  ____  "#.bold().cyan());
    println!("{}", r#" |_   _|_ _ _ __ | | _/ _ \/ ___| "#.bold().cyan());
    println!("{}", r#"   | |/ _` | '_ \| |/ / | | \___ \ "#.bold().cyan());
    println!("{}", r#"   | | (_| | | | |   <| |_| |___) |"#.bold().cyan());
    println!("{}", r#"   |_|\__,_|_| |_|_|\_\\___/|____/ "#.bold().cyan());
    println!();
    println!("  {} {}", "TankOS".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Teleoperated tank controller");
    println!();
}

fn print_usage() {
    println!("Usage: tankos [--print-config | --init-config | --help]");
    println!();
    println!("  --print-config   print the effective configuration as TOML and exit");
    println!("  --init-config    write the effective configuration to the config path");
    println!();
    println!("Config file: $TANKOS_CONFIG or ~/.tankos/config.toml");
}
