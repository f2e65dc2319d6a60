use clap::{ArgAction, Args, Parser, Subcommand};
use log::{Level, LevelFilter, Metadata, Record};
use std::{path::PathBuf, time::Duration};

mod commands;

#[derive(Parser)]
#[command(
    name = "ir-keytable",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Infrared remote scancode to keycode tables",
    subcommand_required = true
)]
struct App {
    /// Increase message verbosity
    #[arg(long, short, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    /// Silence all warnings
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a keymap and print the resulting scancode table
    Show(Show),
    /// Replay received scancodes and keymap requests against a keymap
    Replay(Replay),
}

#[derive(Args)]
struct Device {
    /// Keymap to load, toml or text format
    #[arg(long = "keymap", short = 'k', name = "KEYMAP")]
    keymap: Option<PathBuf>,

    /// Only these bits of the scancode are reported by the hardware
    #[arg(long = "scanmask", name = "MASK", value_parser = parse_scancode)]
    scan_mask: Option<u32>,
}

#[derive(Args)]
struct Show {
    #[clap(flatten)]
    device: Device,
}

#[derive(Args)]
struct Replay {
    #[clap(flatten)]
    device: Device,

    /// Release key when no scancode received for this long
    #[arg(long = "timeout", short = 't', value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Do not add unknown scancodes to the table
    #[arg(long = "no-learn")]
    no_learn: bool,

    /// Script to replay, standard input if not given
    #[arg(name = "SCRIPT")]
    script: Option<PathBuf>,
}

fn main() {
    let args = App::parse();

    log::set_logger(&CLI_LOGGER).unwrap();

    let level = if args.quiet {
        LevelFilter::Error
    } else {
        match args.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    log::set_max_level(level);

    match &args.command {
        Commands::Show(show) => commands::show::show(show),
        Commands::Replay(replay) => commands::replay::replay(replay),
    }
}

/// Scancodes are hex with 0x prefix, or decimal
fn parse_scancode(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
    .map_err(|_| format!("‘{s}’ is not a valid scancode"))
}

static CLI_LOGGER: CliLogger = CliLogger;

struct CliLogger;

impl log::Log for CliLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!(
                "{}: {}",
                match record.level() {
                    Level::Trace => "trace",
                    Level::Debug => "debug",
                    Level::Info => "info",
                    Level::Warn => "warn",
                    Level::Error => "error",
                },
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
