// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::Session;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise -v raises the default level
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "cellar", &mut std::io::stdout());
        return Ok(());
    }

    let session = Session::load(cli.recipes, cli.config.as_deref())?;

    match cli.command {
        Commands::Plan { plan } => commands::cmd_plan(&session, &plan),
        Commands::Build {
            plan,
            jobs,
            no_test,
            keep_builddir,
        } => commands::cmd_build(&session, &plan, jobs, no_test, keep_builddir),
        Commands::Fetch { plan } => commands::cmd_fetch(&session, &plan),
        Commands::Test { name, head } => commands::cmd_test(&session, &name, head),
        Commands::Deps { name, os } => commands::cmd_deps(&session, &name, os),
        Commands::Uses { name, os } => commands::cmd_uses(&session, &name, os),
        Commands::Lint { files } => commands::cmd_lint(&session, &files),
        Commands::Info { name } => commands::cmd_info(&session, &name),
        Commands::Completions { .. } => Ok(()),
    }
}
