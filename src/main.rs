//! `layout-keeper`: keeps window layouts across monitor changes.
//!
//! Starts the keeper on the native platform and reads console commands until
//! `quit` or end of input.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;
use window_layout_keeper::KeeperConfig;
use window_layout_keeper::default_config_path;
use window_layout_keeper::load_config;
use window_layout_keeper::save_config;

const DEBUG_FILTER: &str = "window_layout_keeper=trace,layout_keeper=trace,info";

#[derive(Debug, Parser)]
#[command(name = "layout-keeper", version, about)]
struct Cli {
    /// Log everything the keeper does.
    #[arg(long)]
    debug: bool,

    /// Config file (defaults to the user config directory).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the effective config to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(debug)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let Some(path) = cli.config.or_else(default_config_path) else {
        error!("[main] cannot determine a config directory, pass --config");
        return ExitCode::FAILURE;
    };

    let config = match load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            error!("[main] {}", err);
            return ExitCode::FAILURE;
        },
    };

    if cli.write_config {
        return match save_config(&path, &config) {
            Ok(()) => {
                info!("[main] wrote {}", path.display());
                ExitCode::SUCCESS
            },
            Err(err) => {
                error!("[main] {}", err);
                ExitCode::FAILURE
            },
        };
    }

    run(config)
}

#[cfg(windows)]
fn run(config: KeeperConfig) -> ExitCode {
    use window_layout_keeper::LayoutKeeper;
    use window_layout_keeper::platform::win32::Win32Desktop;

    let mut keeper = LayoutKeeper::new(Win32Desktop::new(), config);
    if let Err(err) = keeper.start() {
        error!("[run] failed to start: {}", err);
        return ExitCode::FAILURE;
    }

    console::run(&keeper);
    keeper.stop();
    ExitCode::SUCCESS
}

#[cfg(not(windows))]
fn run(_config: KeeperConfig) -> ExitCode {
    error!(
        "[run] no production platform for {}; only Windows is supported",
        std::env::consts::OS
    );
    ExitCode::FAILURE
}

#[cfg(windows)]
mod console {
    use std::io;
    use std::io::BufRead;

    use tracing::error;
    use tracing::info;
    use tracing::warn;
    use window_layout_keeper::LayoutKeeper;
    use window_layout_keeper::platform::Platform;

    const HELP: &str = "commands: capture | recapture | dump | quit";

    /// Read commands from stdin until `quit` or end of input.
    pub fn run<P: Platform>(keeper: &LayoutKeeper<P>) {
        info!("[console] {}", HELP);
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    error!("[console] cannot read stdin: {}", err);
                    break;
                },
            };

            match line.trim() {
                "" => {},
                "capture" => report(keeper.capture_layout_now()),
                "recapture" => report(keeper.force_capture_layout()),
                "dump" => match keeper.dump() {
                    Ok(dump) => println!("{dump}"),
                    Err(err) => error!("[console] dump failed: {}", err),
                },
                "quit" | "exit" => return,
                other => warn!("[console] unknown command '{}'; {}", other, HELP),
            }
        }
        info!("[console] end of input");
    }

    fn report(result: Result<(), window_layout_keeper::KeeperError>) {
        if let Err(err) = result {
            error!("[console] {}", err);
        }
    }
}
