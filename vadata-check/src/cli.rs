//! Définition et implémentation des commandes CLI
//!
//! - `parse` : lecture d'un fichier et résumé (ou dump JSON)
//! - `check` : pente, altitudes et positions aberrantes, avec rapport
//! - `terrain` : recouvrement d'une conduite à partir du service d'altitudes

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::{info, warn};
use vadata::ParseResult;

use vadata_check::analysis::incline::{line_profile, InclineMode};
use vadata_check::analysis::run_all;
use vadata_check::config::{CheckConfig, TerrainConfig};
use vadata_check::report::CheckReport;
use vadata_check::terrain::{analyze_overcover, terrain_profile, HttpHeightProvider, TerrainService};

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a GMI, SOSI or KOF file and print a summary
    Parse {
        /// Path to the survey file
        #[arg(short, long)]
        path: PathBuf,

        /// Dump the full parse result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run incline, elevation and outlier checks
    Check {
        /// Path to the survey file
        #[arg(short, long)]
        path: PathBuf,

        /// Config preset name (default/strict) or path to a JSON config
        #[arg(long, default_value = "default")]
        config: String,

        /// Minimum incline rule override: fixed10 or variable
        #[arg(long)]
        incline: Option<InclineMode>,

        /// Write the report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Fetch terrain heights under one line and check overcover
    Terrain {
        /// Path to the survey file
        #[arg(short, long)]
        path: PathBuf,

        /// Line index (0-based, in file order)
        #[arg(short, long)]
        line: usize,

        /// Required cover in metres (default: value from the config)
        #[arg(long)]
        min_cover: Option<f64>,

        /// EPSG override when the file does not declare one
        #[arg(long)]
        epsg: Option<u32>,

        /// Config preset name (default/strict) or path to a JSON config
        #[arg(long, default_value = "default")]
        config: String,
    },
}

fn read_survey(path: &Path) -> Result<ParseResult> {
    vadata::parse_file(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Exécute la commande parse
pub fn cmd_parse(path: &Path, json: bool) -> Result<()> {
    let result = read_survey(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("=== {} ===", file_label(path));
    println!("Format: {}", result.format);
    match result.epsg() {
        Some(epsg) => println!("EPSG: {}", epsg),
        None => println!("EPSG: unknown"),
    }
    println!("Points: {}", result.points.len());
    println!("Lines: {}", result.lines.len());

    if !result.warnings.is_empty() {
        println!("\nWarnings ({}):", result.warnings.len());
        for w in result.warnings.iter().take(20) {
            println!("  {}", w);
        }
        if result.warnings.len() > 20 {
            println!("  ... and {} more", result.warnings.len() - 20);
        }
    }
    if !result.errors.is_empty() {
        println!("\nErrors ({}):", result.errors.len());
        for e in &result.errors {
            println!("  [{:?}] {}", e.kind, e.message);
        }
    }

    Ok(())
}

/// Exécute la commande check
pub fn cmd_check(
    path: &Path,
    config_spec: &str,
    incline: Option<InclineMode>,
    report_path: Option<&Path>,
) -> Result<()> {
    let started_at = Instant::now();

    let mut config = CheckConfig::resolve(config_spec)?;
    if let Some(mode) = incline {
        config.min_incline_mode = mode;
    }

    let result = read_survey(path)?;
    info!(
        format = %result.format,
        points = result.points.len(),
        lines = result.lines.len(),
        "Survey parsed"
    );

    let mut report = CheckReport::new(&file_label(path), &result);
    if result.feature_count() > 0 {
        let analyses = run_all(&result, &config);
        report.record_analyses(&analyses);
    } else {
        warn!(path = %path.display(), "No features to check");
    }

    report.set_duration(started_at.elapsed());
    report.finalize();
    report.display();

    if let Some(out) = report_path {
        report
            .save_to_file(out)
            .with_context(|| format!("Failed to write report to {}", out.display()))?;
        println!("Report saved to {}", out.display());
    }

    info!("{}", report.summary());
    Ok(())
}

/// Exécute la commande terrain
pub async fn cmd_terrain(
    path: &Path,
    line_index: usize,
    min_cover: Option<f64>,
    epsg: Option<u32>,
    config_spec: &str,
) -> Result<()> {
    let config = CheckConfig::resolve(config_spec)?;
    let min_cover = min_cover.unwrap_or(config.min_overcover);

    let result = read_survey(path)?;
    let line = result.lines.get(line_index).with_context(|| {
        format!(
            "Line {} not found ({} lines in {})",
            line_index,
            result.lines.len(),
            path.display()
        )
    })?;

    let epsg = epsg
        .or_else(|| result.epsg())
        .context("No EPSG code in file, use --epsg")?;

    let profile = line_profile(line)
        .with_context(|| format!("Line {} has incomplete elevations", line_index))?;

    let terrain_config = TerrainConfig::from_env();
    println!("Terrain API: {}", terrain_config.api_url);
    println!("Line {}: {} vertices, EPSG:{}", line_index, profile.len(), epsg);

    let provider = HttpHeightProvider::new(&terrain_config)?;
    let service = TerrainService::new(provider, &terrain_config);
    let terrain = terrain_profile(&service, &profile, epsg).await;
    let overcover = analyze_overcover(&profile, &terrain, min_cover);

    println!("\n{:>10} {:>10} {:>10} {:>8}", "dist", "pipe z", "terrain z", "cover");
    for s in &overcover.samples {
        let terrain_z = s.terrain_z.map_or_else(|| "-".to_string(), |z| format!("{:.2}", z));
        let cover = s.cover.map_or_else(|| "-".to_string(), |c| format!("{:.2}", c));
        println!(
            "{:>10.1} {:>10.2} {:>10} {:>8}{}",
            s.dist,
            s.pipe_z,
            terrain_z,
            cover,
            if s.warning { "  !" } else { "" }
        );
    }

    let mut report = CheckReport::new(&file_label(path), &result);
    report.record_overcover(line_index, &overcover);
    report.finalize();
    report.display();

    Ok(())
}
