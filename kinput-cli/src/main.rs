//! Command line front end: load libraries into a process and call their exports.

#[cfg(windows)]
mod commands;
mod config;
mod payload;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use config::Config;

#[derive(Parser)]
#[command(name = "kinput-cli")]
#[command(about = "Load libraries into a running process and call their exports", long_about = None)]
struct Args {
    /// Config file [default: %APPDATA%\KInputCtrl\config.json]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the modules loaded in a process
    Modules {
        /// Target process name or PID
        #[arg(value_name = "PROCESS")]
        process: String,
    },

    /// Resolve an exported function inside a process
    Resolve {
        #[arg(value_name = "PROCESS")]
        process: String,
        #[arg(value_name = "MODULE")]
        module: String,
        #[arg(value_name = "FUNCTION")]
        function: String,
    },

    /// Load a library into a process
    Inject {
        #[arg(value_name = "PROCESS")]
        process: String,

        /// Path to the DLL file to load
        #[arg(value_name = "DLL_PATH")]
        dll_path: PathBuf,

        /// Payload export to call once the library is loaded
        #[arg(long, value_name = "FUNCTION", requires = "data")]
        call: Option<String>,

        /// Payload data for --call, as hex
        #[arg(long, value_name = "HEX", requires = "call")]
        data: Option<String>,

        /// Unload the library before exiting
        #[arg(long)]
        free: bool,
    },

    /// Call a payload export on behalf of a library already in the process
    Call {
        #[arg(value_name = "PROCESS")]
        process: String,

        /// Library the call belongs to (must already be loaded)
        #[arg(value_name = "SESSION_DLL")]
        session_dll: PathBuf,

        #[arg(value_name = "FUNCTION")]
        function: String,

        /// Payload data, as hex
        #[arg(long, value_name = "HEX")]
        data: String,
    },

    /// Print the active configuration
    Config,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(args) {
        eprintln!("\n❌ {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path);

    match args.command {
        Command::Config => {
            println!("📋 {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        command => execute(command, &mut config, &config_path),
    }
}

#[cfg(windows)]
fn execute(command: Command, config: &mut Config, config_path: &Path) -> anyhow::Result<()> {
    match command {
        Command::Modules { process } => commands::list_modules(&process),
        Command::Resolve {
            process,
            module,
            function,
        } => commands::resolve(&process, &module, &function, config),
        Command::Inject {
            process,
            dll_path,
            call,
            data,
            free,
        } => {
            let data = match data {
                Some(data) => payload::parse_hex(&data)?,
                None => Vec::new(),
            };
            let options = commands::InjectOptions {
                call: call.as_deref(),
                data: &data,
                free,
            };
            commands::inject(&process, &dll_path, options, config, config_path)
        }
        Command::Call {
            process,
            session_dll,
            function,
            data,
        } => {
            let data = payload::parse_hex(&data)?;
            commands::call(&process, &session_dll, &function, &data, config)
        }
        Command::Config => Ok(()),
    }
}

#[cfg(not(windows))]
fn execute(command: Command, _config: &mut Config, _config_path: &Path) -> anyhow::Result<()> {
    match &command {
        Command::Inject { data: Some(data), .. } | Command::Call { data, .. } => {
            payload::parse_hex(data)?;
        }
        _ => {}
    }
    anyhow::bail!("kinput-cli can only target Windows processes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_call_requires_data() {
        let args = ["kinput-cli", "inject", "notepad.exe", "KInput.dll", "--call", "KInput_Ping"];
        assert!(Args::try_parse_from(args).is_err());

        let args = ["kinput-cli", "inject", "notepad.exe", "KInput.dll", "--data", "01"];
        assert!(Args::try_parse_from(args).is_err());
    }

    #[test]
    fn test_inject_with_call_and_data() {
        let args = Args::try_parse_from([
            "kinput-cli",
            "inject",
            "notepad.exe",
            "KInput.dll",
            "--call",
            "KInput_Ping",
            "--data",
            "01000000",
        ])
        .unwrap();

        match args.command {
            Command::Inject { call, data, free, .. } => {
                assert_eq!(call.as_deref(), Some("KInput_Ping"));
                assert_eq!(data.as_deref(), Some("01000000"));
                assert!(!free);
            }
            _ => panic!("expected inject"),
        }
    }

    #[test]
    fn test_call_requires_data() {
        let args = ["kinput-cli", "call", "notepad.exe", "KInput.dll", "KInput_Ping"];
        assert!(Args::try_parse_from(args).is_err());
    }
}
