use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nix::sys::signal::Signal;

use crate::auth::verifier::locate_hash_file;
use crate::auth::{Argon2Verifier, AuthChannel, AuthState};
use crate::config::loader::{find_config_file, merged_args, read_config_args};
use crate::config::types::{
    Color, LockConfig, LockError, PhaseColors, DEFAULT_INITIAL_CREDENTIAL_LEN,
    DEFAULT_MAX_CREDENTIAL_LEN, EXIT_STARTUP,
};
use crate::core::context::{ExitReason, LockCore};
use crate::exec::{run_lock_loop, LockRuntime};
use crate::kernel::credentials::drop_elevated_privileges;
use crate::kernel::memlock::SecureBuffer;
use crate::kernel::signal::CancellationPipe;
use crate::wayland::Display;

fn parse_color(input: &str) -> std::result::Result<Color, String> {
    Ok(Color::parse_lenient(input))
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_override_self = true)]
struct Cli {
    /// Path to the config file
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,
    /// Enable debugging output
    #[arg(short, long)]
    debug: bool,
    /// Don't validate empty passwords
    #[arg(short = 'e', long)]
    ignore_empty_password: bool,
    /// Detach from the controlling terminal after locking
    #[arg(short = 'f', long)]
    daemonize: bool,
    /// File descriptor to send readiness notifications to
    #[arg(short = 'R', long, value_name = "FD")]
    ready_fd: Option<i32>,
    /// Background color, rrggbb[aa]
    #[arg(short = 'c', long, value_parser = parse_color)]
    color: Option<Color>,
    /// Fill color while the password is being verified
    #[arg(long, value_parser = parse_color)]
    inside_ver_color: Option<Color>,
    /// Fill color after a wrong password
    #[arg(long, value_parser = parse_color)]
    inside_wrong_color: Option<Color>,
    /// Fill color after the input was cleared
    #[arg(long, value_parser = parse_color)]
    inside_clear_color: Option<Color>,
    /// Argon2 PHC hash to verify passwords against
    #[arg(long, value_name = "PATH")]
    password_hash_file: Option<PathBuf>,
}

impl Cli {
    fn to_config(&self) -> LockConfig {
        let defaults = PhaseColors::default();
        LockConfig {
            debug: self.debug,
            ignore_empty_password: self.ignore_empty_password,
            daemonize: self.daemonize,
            ready_fd: self.ready_fd,
            password_hash_file: self.password_hash_file.clone(),
            colors: PhaseColors {
                background: self.color.unwrap_or(defaults.background),
                verifying: self.inside_ver_color.unwrap_or(defaults.verifying),
                wrong: self.inside_wrong_color.unwrap_or(defaults.wrong),
                cleared: self.inside_clear_color.unwrap_or(defaults.cleared),
            },
            max_credential_len: DEFAULT_MAX_CREDENTIAL_LEN,
        }
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Error
    };
    // RUST_LOG still overrides the level picked from --debug.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Re-parse with config file options in front of `cli_args`.
///
/// The hash path and debug flag always come from the command line: they
/// were consumed before privileges were dropped.
fn load_config(
    cli: &Cli,
    program: OsString,
    cli_args: Vec<OsString>,
) -> crate::config::Result<LockConfig> {
    let file_args = match find_config_file(cli.config.as_deref()) {
        Some(path) => match read_config_args(&path) {
            Ok(args) => args,
            Err(e) => {
                log::error!("{}", e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    if file_args.is_empty() {
        return Ok(cli.to_config());
    }

    let merged = Cli::try_parse_from(merged_args(program, file_args, cli_args))
        .map_err(|e| LockError::Config(format!("Invalid config file option: {}", e)))?;
    let mut config = merged.to_config();
    config.password_hash_file = cli.password_hash_file.clone();
    config.debug = cli.debug;
    Ok(config)
}

fn run_locker(cli: &Cli) -> crate::config::Result<ExitReason> {
    // Everything the verifier needs is loaded while still privileged.
    let hash_path = locate_hash_file(cli.password_hash_file.as_deref())?;
    let verifier = Argon2Verifier::from_file(&hash_path)?;
    log::debug!("Verifying against {}", hash_path.display());
    let channel = AuthChannel::spawn(verifier, DEFAULT_MAX_CREDENTIAL_LEN)?;

    drop_elevated_privileges()?;

    let mut args = std::env::args_os();
    let program = args.next().unwrap_or_else(|| OsString::from("rustlock"));
    let config = load_config(cli, program, args.collect())?;
    match serde_json::to_string(&config) {
        Ok(json) => log::debug!("Configuration: {}", json),
        Err(e) => log::debug!("Configuration not serializable: {}", e),
    }

    let buffer =
        SecureBuffer::with_capacity(DEFAULT_INITIAL_CREDENTIAL_LEN, config.max_credential_len)?;
    let cancel = CancellationPipe::install(&[Signal::SIGUSR1])?;

    let (mut display, backend) = Display::connect()?;
    let auth = AuthState::new(buffer, config.ignore_empty_password);
    let mut core = LockCore::new(backend, channel, auth, config.colors);
    display.discover(&mut core)?;
    core.start()?;

    let mut runtime = LockRuntime {
        display,
        core,
        cancel,
    };
    run_lock_loop(&mut runtime, &config)
}

pub fn run() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(EXIT_STARTUP);
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    init_logging(cli.debug);

    let code = match run_locker(&cli) {
        Ok(reason) => {
            log::debug!("Exiting: {:?}", reason);
            return Ok(());
        }
        Err(e) if e.exit_code() == EXIT_STARTUP => {
            return Err(e).context("rustlock failed to start");
        }
        Err(e) => {
            log::error!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}
