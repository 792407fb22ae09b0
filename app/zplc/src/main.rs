//! Command-line front end for the ZPLC execution core.
//!
//! `compile` and `upload` are toolchain concerns that live outside this
//! core and are stubbed here with a distinct exit code each, so a caller
//! scripting against this binary can tell "not built yet" apart from a
//! genuine runtime failure.

use anyhow::Result;
use clap::Parser;

mod compile;
mod config;
mod debug;
mod devices;
mod run;

#[derive(Debug, Parser)]
#[clap(name = "zplc", about = "ZPLC execution core command-line front end", version)]
struct Cli {
    /// Emit structured JSON instead of human-readable text where supported.
    #[clap(long, global = true)]
    json: bool,

    /// Raise log verbosity (-v, -vv, -vvv).
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Compiles IEC source into a ZPLC program file. Not implemented by
    /// this core; it is an external collaborator's job.
    Compile {
        /// Path to the source file to compile.
        source: std::path::PathBuf,
        #[clap(short, long)]
        output: Option<std::path::PathBuf>,
    },
    /// Uploads a program file to a running target. Not implemented by this
    /// core; it is an external collaborator's job.
    Upload {
        /// Path to the program file to upload.
        program: std::path::PathBuf,
        /// Target device identifier.
        #[clap(long)]
        target: Option<String>,
    },
    /// Loads a program file and runs it until interrupted.
    Run {
        /// Path to the program file to load.
        program: std::path::PathBuf,
        /// Run for this many milliseconds, then stop automatically. Runs
        /// until Ctrl-C if omitted.
        #[clap(long)]
        for_ms: Option<u64>,
        /// Start the debug channel in this mode.
        #[clap(long, default_value = "off")]
        debug_mode: String,
        /// TOML scenario file: HAL channel bindings and task overrides.
        #[clap(long)]
        config: Option<std::path::PathBuf>,
    },
    /// Lists the HAL channel bindings a running configuration would use.
    Devices {
        /// TOML scenario file to read HAL channel bindings from. Reports
        /// the null HAL's empty binding set if omitted.
        #[clap(long)]
        config: Option<std::path::PathBuf>,
    },
    /// Loads a program file, then reads debug commands from stdin and
    /// applies them to the running scheduler until stdin closes.
    Debug {
        /// Path to the program file to load.
        program: std::path::PathBuf,
        #[clap(long, default_value = "summary")]
        debug_mode: String,
    },
    /// Runs a program against the null HAL for a fixed duration, the way a
    /// continuous-integration job would exercise it without real hardware.
    Hil {
        /// Path to the program file to load.
        program: std::path::PathBuf,
        #[clap(long, default_value_t = 1000)]
        for_ms: u64,
        /// TOML scenario file: HAL channel bindings and task overrides.
        #[clap(long)]
        config: Option<std::path::PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Compile { source, output } => compile::compile(&source, output.as_deref()),
        Command::Upload { program, target } => compile::upload(&program, target.as_deref()),
        Command::Run { program, for_ms, debug_mode, config } => {
            run::run(&program, for_ms, &debug_mode, cli.json, config.as_deref())
        }
        Command::Devices { config } => devices::devices(cli.json, config.as_deref()),
        Command::Debug { program, debug_mode } => debug::interactive(&program, &debug_mode),
        Command::Hil { program, for_ms, config } => {
            run::hil(&program, for_ms, cli.json, config.as_deref())
        }
    }
}
