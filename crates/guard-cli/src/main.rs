mod prompt;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use guard_core::config::GuardConfig;
use guard_core::guard::{PermissionChange, StatusReport};
use guard_core::passphrase::{KeyringPassphrase, PassphraseSource};
use guard_core::{Guard, GuardError};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::prompt::PromptPassphrase;

#[derive(Parser, Debug)]
#[command(name = "guard", author, version, about = "Passphrase-bound integrity guard for a single file", long_about = None)]
struct Cli {
    /// JSON config file (defaults to the per-user config if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Protected file path
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Directory holding the content copy and signature record
    #[arg(long, global = true)]
    install_dir: Option<PathBuf>,

    /// PBKDF2 iteration count
    #[arg(long, global = true)]
    kdf_iterations: Option<u32>,

    /// Program used by `run` to launch the protected file
    #[arg(long, global = true)]
    interpreter: Option<String>,

    /// Where the passphrase comes from
    #[arg(long, global = true, value_enum, default_value_t = SourceKind::Prompt)]
    passphrase_from: SourceKind,

    /// Account name of the OS keyring entry when reading from the keyring
    #[arg(long, global = true, default_value = "default")]
    keyring_account: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Hidden terminal prompt (GUARD_PASSPHRASE overrides)
    Prompt,
    /// OS secret store entry
    Keyring,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy the file, bind its digest to a passphrase and set it read-only
    Install,
    /// Check the file against the stored signature
    Verify,
    /// Set the protected file read-only
    Lock,
    /// Restore write permission on the protected file
    Unlock,
    /// Execute the protected file (no integrity check is performed)
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Show lock state and whether the file still matches its record
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // If stderr is gone there is nowhere left to report to; the exit
            // code still carries the outcome.
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };
    init_tracing();
    match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<GuardError>()
        .map(GuardError::exit_code)
        .unwrap_or(1)
}

fn load_config(cli: &Cli) -> Result<GuardConfig> {
    let mut config = GuardConfig::resolve(cli.config.as_deref())?;
    if let Some(file) = &cli.file {
        config.protected_file = file.clone();
    }
    if let Some(dir) = &cli.install_dir {
        config.install_dir = dir.clone();
    }
    if let Some(iterations) = cli.kdf_iterations {
        config.kdf_iterations = iterations;
    }
    if let Some(interpreter) = &cli.interpreter {
        config.interpreter = Some(interpreter.clone());
    }
    debug!(?config, "resolved configuration");
    Ok(config)
}

fn passphrase_source(cli: &Cli) -> Box<dyn PassphraseSource> {
    match cli.passphrase_from {
        SourceKind::Prompt => Box::new(PromptPassphrase),
        SourceKind::Keyring => Box::new(KeyringPassphrase::new(cli.keyring_account.clone())),
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };
    let config = load_config(&cli)?;
    let guard = Guard::new(config)?;

    match command {
        Commands::Install => {
            let mut source = passphrase_source(&cli);
            let report = guard.install(source.as_mut())?;
            println!(
                "installation complete: digest {} recorded in {}",
                report.digest,
                report.install_dir.display()
            );
            if report.permission == PermissionChange::Skipped {
                println!("note: protected file could not be set read-only");
            }
        }
        Commands::Verify => {
            let mut source = passphrase_source(&cli);
            guard.verify(source.as_mut())?.into_result()?;
            println!("integrity verified");
        }
        Commands::Lock => {
            let outcome = guard.lock()?;
            print_permission(outcome, "protected file set to read-only; run `unlock` to edit");
        }
        Commands::Unlock => {
            let outcome = guard.unlock()?;
            print_permission(outcome, "protected file set to writable; remember to lock it again");
        }
        Commands::Run { args } => {
            let status = guard
                .run(args)
                .with_context(|| format!("run {}", guard.config().protected_file.display()))?;
            let code = status.code().and_then(|c| u8::try_from(c).ok()).unwrap_or(1);
            return Ok(ExitCode::from(code));
        }
        Commands::Status { json } => {
            let report = guard.status()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_permission(outcome: PermissionChange, applied: &str) {
    match outcome {
        PermissionChange::Applied => println!("{applied}"),
        PermissionChange::Skipped => println!("permission unchanged (see warning above)"),
    }
}

fn print_status(report: &StatusReport) {
    let access = match report.access {
        Some(state) => format!("{state:?}"),
        None => "missing".to_string(),
    };
    println!(
        "file: {} ({access}) | install dir: {} | record: {} | content: {:?}",
        report.protected_file.display(),
        report.install_dir.display(),
        if report.record_present { "present" } else { "absent" },
        report.content,
    );
}
