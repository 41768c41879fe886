//! Stagehand binary.
//!
//! Launches the configured service stack in order, then waits for Ctrl-C and
//! brings every service down together.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use supervisor::{
    LoaderRegistry, OsSpawner, SignalListener, StackConfig, Supervisor, DEFAULT_INTERPRETER,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Stagehand - launch a local service stack and shut it down cleanly
#[derive(Parser, Debug)]
#[command(name = "stagehand", author, version, about, long_about = None)]
struct Cli {
    /// Stack file (TOML or JSON). The built-in stack is used if omitted
    #[arg(short, long, env = "STAGEHAND_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Interpreter used by the built-in stack
    #[arg(
        long,
        env = "STAGEHAND_INTERPRETER",
        default_value = DEFAULT_INTERPRETER,
        global = true
    )]
    interpreter: String,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start every enabled service and wait for Ctrl-C (default)
    Run(RunArgs),

    /// Show the resolved service table
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the built-in stack to a file for editing
    Init {
        /// Output file path
        #[arg(short, long, default_value = "stagehand.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Seconds each service gets to exit before it is killed
    #[arg(long, value_name = "SECS")]
    grace: Option<u64>,

    /// Enable a service that is disabled in the stack
    #[arg(long, value_name = "NAME")]
    enable: Vec<String>,

    /// Leave a service out of this run
    #[arg(long, value_name = "NAME")]
    disable: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        None => run_stack(&cli, &RunArgs::default()).await?,
        Some(Commands::Run(args)) => run_stack(&cli, args).await?,

        Some(Commands::List { json }) => {
            let stack = load_stack(&cli)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&stack)?);
            } else {
                print_stack(&stack);
            }
        }

        Some(Commands::Init { output, force }) => {
            write_default_stack(output, &cli.interpreter, *force)?;
            println!("Created stack file: {}", output.display());
        }

        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "stagehand",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Run the stack until interrupted. A spawn failure or runtime error comes
/// back as `Err`, which exits non-zero.
async fn run_stack(cli: &Cli, args: &RunArgs) -> Result<()> {
    let mut stack = load_stack(cli)?;
    apply_run_args(&mut stack, args)?;

    // Handlers go in before the first spawn so an early Ctrl-C still runs
    // the shutdown.
    let mut triggers = SignalListener::install()?;
    let supervisor = Supervisor::new(&stack.supervisor, OsSpawner::new());
    let report = supervisor.run(&stack.services, &mut triggers).await;

    debug!(outcome = ?report.outcome, exit_code = report.exit_code(), "Run finished");
    report.into_result()?;
    Ok(())
}

fn load_stack(cli: &Cli) -> Result<StackConfig> {
    match cli.config {
        Some(ref path) => LoaderRegistry::default()
            .load(path)
            .with_context(|| format!("Failed to load stack file {}", path.display())),
        None => Ok(StackConfig::builtin(&cli.interpreter)),
    }
}

fn apply_run_args(stack: &mut StackConfig, args: &RunArgs) -> supervisor::Result<()> {
    for name in &args.enable {
        stack.set_enabled(name, true)?;
    }
    for name in &args.disable {
        stack.set_enabled(name, false)?;
    }
    if let Some(secs) = args.grace {
        stack.supervisor.grace_period = Duration::from_secs(secs);
    }
    stack.validate()
}

fn write_default_stack(path: &Path, interpreter: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = StackConfig::builtin(interpreter).to_toml()?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn print_stack(stack: &StackConfig) {
    println!(
        "Grace period: {}s, kill wait: {}s",
        stack.supervisor.grace_period.as_secs(),
        stack.supervisor.kill_wait.as_secs()
    );
    if stack.services.is_empty() {
        println!("No services defined");
        return;
    }
    println!("Services:");
    for def in &stack.services {
        let mark = if def.enabled { "x" } else { " " };
        println!("  [{}] {}", mark, def.name);
        println!("      command: {}", def.command_line());
        if !def.startup_delay.is_zero() {
            println!("      delay:   {}s", def.startup_delay.as_secs());
        }
        if let Some(ref listen) = def.listen {
            println!("      listen:  {}", listen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::try_parse_from(["stagehand"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "stagehand",
            "run",
            "--grace",
            "9",
            "--enable",
            "embedding-proxy",
            "--disable",
            "app",
            "--disable",
            "index-app",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.grace, Some(9));
                assert_eq!(args.enable, vec!["embedding-proxy"]);
                assert_eq!(args.disable, vec!["app", "index-app"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_apply_run_args_toggles_and_grace() {
        let mut stack = StackConfig::builtin("python3");
        let args = RunArgs {
            grace: Some(10),
            enable: vec!["embedding-proxy".to_string()],
            disable: vec!["app".to_string()],
        };
        apply_run_args(&mut stack, &args).unwrap();

        let active: Vec<_> = stack.active().into_iter().map(|d| d.name).collect();
        assert_eq!(active, vec!["api", "index-app", "embedding-proxy"]);
        assert_eq!(stack.supervisor.grace_period, Duration::from_secs(10));
    }

    #[test]
    fn test_apply_run_args_unknown_service() {
        let mut stack = StackConfig::builtin("python3");
        let args = RunArgs {
            enable: vec!["nope".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            apply_run_args(&mut stack, &args),
            Err(supervisor::Error::UnknownService(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_init_writes_loadable_stack() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.toml");

        write_default_stack(&path, "/opt/py/bin/python", false).unwrap();
        let stack = LoaderRegistry::default().load(&path).unwrap();
        assert_eq!(stack, StackConfig::builtin("/opt/py/bin/python"));

        assert!(write_default_stack(&path, "python3", false).is_err());
        write_default_stack(&path, "python3", true).unwrap();
    }
}
