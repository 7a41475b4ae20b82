//! Point d'entrée CLI pour vadata-check

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Contrôler les levés de réseaux eau et assainissement (GMI, SOSI, KOF)
#[derive(Parser)]
#[command(name = "vadata-check")]
#[command(author, version)]
#[command(about = "Contrôler les levés de réseaux eau et assainissement (GMI, SOSI, KOF)")]
#[command(long_about = "Lit les exports de levés GMI, SOSI et KOF et contrôle la pente des conduites, la complétude des altitudes, les positions aberrantes et le recouvrement.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Parse { path, json } => {
            info!(path = %path.display(), "Parse");
            cli::cmd_parse(&path, json)?;
        }
        Commands::Check {
            path,
            config,
            incline,
            report,
        } => {
            info!(path = %path.display(), config = %config, "Check");
            cli::cmd_check(&path, &config, incline, report.as_deref())?;
        }
        Commands::Terrain {
            path,
            line,
            min_cover,
            epsg,
            config,
        } => {
            info!(path = %path.display(), line, "Terrain");
            cli::cmd_terrain(&path, line, min_cover, epsg, &config).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
