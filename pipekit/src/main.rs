mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::Level;

use commands::ProjectOptions;

#[derive(Parser)]
#[command(name = "pipekit")]
#[command(about = "Declarative task pipelines with watch mode and live reload")]
#[command(version)]
struct Cli {
    /// Task to run
    #[arg(default_value = "default")]
    task: String,

    /// Project configuration file
    #[arg(short, long, default_value = pipekit_core::CONFIG_FILE_NAME)]
    file: PathBuf,

    /// Directory to run in
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// List tasks and plugins
    #[arg(long, action)]
    list: bool,

    /// Print the expanded sub-task queue without running it
    #[arg(long, action)]
    plan: bool,

    /// Machine-readable output for --list and --plan
    #[arg(long, action)]
    json: bool,

    /// Settle window for file changes in watch mode
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Never start the live-reload server
    #[arg(long, action)]
    no_livereload: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, action)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    let options = ProjectOptions {
        file: cli.file,
        cwd: cli.cwd,
        debounce_ms: cli.debounce_ms,
        livereload: !cli.no_livereload,
    };

    if cli.list {
        commands::cmd_list(&options, cli.json)?;
    } else if cli.plan {
        commands::cmd_plan(&options, &cli.task, cli.json)?;
    } else {
        commands::cmd_run(&options, &cli.task)?;
    }

    Ok(())
}
