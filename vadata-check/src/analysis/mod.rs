//! Analyses d'ingénierie sur un `ParseResult`
//!
//! Les trois passes sont des fonctions pures, sans ordre imposé entre elles :
//! - `incline` : pente des conduites gravitaires
//! - `zvalidate` : complétude des altitudes
//! - `outliers` : positions aberrantes par rapport au centroïde

pub mod incline;
pub mod outliers;
pub mod zvalidate;

use serde::Serialize;
use vadata::ParseResult;

use crate::config::CheckConfig;

pub use incline::{InclineMode, InclineOptions, InclineResult, InclineSummary, PipeType};
pub use outliers::OutlierReport;
pub use zvalidate::ZReport;

/// Statut d'un résultat d'analyse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Ok,
    Warning,
    Error,
}

/// Résultats des trois analyses
#[derive(Debug, Clone, Serialize)]
pub struct Analyses {
    pub incline: Vec<InclineResult>,
    pub incline_summary: InclineSummary,
    pub z: ZReport,
    pub outliers: OutlierReport,
}

/// Lance les trois analyses en parallèle
pub fn run_all(result: &ParseResult, config: &CheckConfig) -> Analyses {
    let options = config.incline_options();

    let (incline, (z, outliers)) = rayon::join(
        || incline::analyze(result, &options),
        || {
            rayon::join(
                || zvalidate::analyze(result),
                || outliers::detect(result, config.outlier_z_threshold),
            )
        },
    );

    let incline_summary = incline::summarize(&incline);
    Analyses {
        incline,
        incline_summary,
        z,
        outliers,
    }
}
