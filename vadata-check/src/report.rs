//! Rapport de contrôle
//!
//! Agrège le résultat du parsing et des analyses d'un fichier, avec la liste
//! des constats par feature.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use vadata::{FeatureKind, FormatKind, ParseResult};

use crate::analysis::incline::InclineSummary;
use crate::analysis::outliers::OutlierSummary;
use crate::analysis::zvalidate::ZSummary;
use crate::analysis::{Analyses, AnalysisStatus};
use crate::terrain::{OvercoverResult, OvercoverSummary};

/// Statut global du contrôle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    /// Aucun constat
    Success,
    /// Fichier lu, constats à examiner
    Warnings,
    /// Fichier illisible ou partiellement lu
    Failed,
}

/// Niveau de sévérité d'un constat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Origine d'un constat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Check {
    Parse,
    Incline,
    Elevation,
    Outlier,
    Overcover,
}

/// Constat sur le fichier ou sur une feature
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub check: Check,
    /// `line 3`, `point 12`... (optionnel)
    pub feature: Option<String>,
    pub message: String,
}

/// Rapport complet
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub file: String,
    pub format: FormatKind,
    pub epsg: Option<u32>,
    pub duration_secs: f64,
    pub status: CheckStatus,

    pub points: usize,
    pub lines: usize,
    pub parse_warnings: usize,
    pub parse_errors: usize,

    pub incline: InclineSummary,
    pub elevation: ZSummary,
    pub outliers: OutlierSummary,
    pub overcover: Option<OvercoverSummary>,

    pub findings: Vec<Finding>,
}

fn feature_label(kind: FeatureKind, index: usize) -> String {
    match kind {
        FeatureKind::Point => format!("point {}", index),
        FeatureKind::Line => format!("line {}", index),
    }
}

impl CheckReport {
    /// Crée un rapport à partir du résultat de parsing
    pub fn new(file: &str, result: &ParseResult) -> Self {
        let mut report = Self {
            file: file.to_string(),
            format: result.format,
            epsg: result.epsg(),
            duration_secs: 0.0,
            status: CheckStatus::Success,
            points: result.points.len(),
            lines: result.lines.len(),
            parse_warnings: result.warnings.len(),
            parse_errors: result.errors.len(),
            incline: InclineSummary::default(),
            elevation: ZSummary::default(),
            outliers: OutlierSummary::default(),
            overcover: None,
            findings: Vec::new(),
        };

        for issue in &result.errors {
            report.record(Severity::Error, Check::Parse, None, issue.message.clone());
        }
        for warning in &result.warnings {
            report.record(Severity::Warning, Check::Parse, None, warning.clone());
        }
        report
    }

    /// Enregistre un constat
    pub fn record(&mut self, severity: Severity, check: Check, feature: Option<String>, message: String) {
        self.findings.push(Finding {
            severity,
            check,
            feature,
            message,
        });
    }

    /// Enregistre les résultats des analyses
    pub fn record_analyses(&mut self, analyses: &Analyses) {
        self.incline = analyses.incline_summary;
        self.elevation = analyses.z.summary;
        self.outliers = analyses.outliers.summary;

        for r in &analyses.incline {
            let severity = match r.status {
                AnalysisStatus::Ok => continue,
                AnalysisStatus::Warning => Severity::Warning,
                AnalysisStatus::Error => Severity::Error,
            };
            self.record(
                severity,
                Check::Incline,
                Some(feature_label(FeatureKind::Line, r.line_index)),
                r.message.clone(),
            );
        }

        let missing = analyses
            .z
            .missing_points
            .iter()
            .map(|m| (FeatureKind::Point, m))
            .chain(analyses.z.missing_lines.iter().map(|m| (FeatureKind::Line, m)));
        for (kind, m) in missing {
            self.record(
                Severity::Warning,
                Check::Elevation,
                Some(feature_label(kind, m.index)),
                format!("missing Z at vertex {:?}", m.coordinate_indices),
            );
        }

        for o in &analyses.outliers.outliers {
            self.record(
                Severity::Warning,
                Check::Outlier,
                Some(feature_label(o.kind, o.index)),
                format!(
                    "{:.0} m from centroid (z-score {:.1})",
                    o.distance, o.z_score
                ),
            );
        }
    }

    /// Enregistre le recouvrement d'une ligne
    pub fn record_overcover(&mut self, line_index: usize, result: &OvercoverResult) {
        self.overcover = Some(result.summary);
        for s in result.samples.iter().filter(|s| s.warning) {
            self.record(
                Severity::Warning,
                Check::Overcover,
                Some(feature_label(FeatureKind::Line, line_index)),
                format!(
                    "cover {:.2} m at {:.1} m (required {:.2} m)",
                    s.cover.unwrap_or_default(),
                    s.dist,
                    result.summary.min_overcover
                ),
            );
        }
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let parse_failed = self
            .findings
            .iter()
            .any(|f| f.check == Check::Parse && f.severity == Severity::Error);

        self.status = if parse_failed {
            CheckStatus::Failed
        } else if !self.findings.is_empty() {
            CheckStatus::Warnings
        } else {
            CheckStatus::Success
        };
    }

    pub fn count(&self, check: Check) -> usize {
        self.findings.iter().filter(|f| f.check == check).count()
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("CHECK REPORT - {}", self.file);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Format: {}", self.format);
        match self.epsg {
            Some(epsg) => println!("EPSG: {}", epsg),
            None => println!("EPSG: unknown"),
        }
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Features: {} points, {} lines ({} parse warnings, {} parse errors)",
            self.points, self.lines, self.parse_warnings, self.parse_errors
        );
        println!(
            "Incline: {} lines checked ({} gravity, {} pressure): {} ok, {} warnings, {} errors",
            self.incline.total,
            self.incline.gravity,
            self.incline.pressure,
            self.incline.ok,
            self.incline.warning,
            self.incline.error
        );
        println!(
            "Elevation: {}/{} coordinates missing Z ({} points, {} lines)",
            self.elevation.coordinates_missing_z,
            self.elevation.coordinates_checked,
            self.elevation.points_missing_z,
            self.elevation.lines_missing_z
        );
        println!(
            "Outliers: {} of {} positions (threshold {:.1})",
            self.outliers.outliers, self.outliers.positions, self.outliers.threshold
        );
        if let Some(cover) = &self.overcover {
            println!(
                "Overcover: {} samples, {} below {:.2} m, {} above terrain, min cover {}",
                cover.samples,
                cover.warnings,
                cover.min_overcover,
                cover.above_terrain,
                cover
                    .min_cover
                    .map_or_else(|| "n/a".to_string(), |c| format!("{:.2} m", c))
            );
        }

        if !self.findings.is_empty() {
            println!("\n--- FINDINGS ({}) ---", self.findings.len());
            for f in self.findings.iter().take(30) {
                let location = f
                    .feature
                    .as_deref()
                    .map(|l| format!("[{}]", l))
                    .unwrap_or_default();
                println!("  {:?} {:?} {} {}", f.severity, f.check, location, f.message);
            }
            if self.findings.len() > 30 {
                println!("  ... and {} more", self.findings.len() - 30);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {:?}, {} points, {} lines, {} incline warnings, {} missing Z, {} outliers",
            self.file,
            self.status,
            self.points,
            self.lines,
            self.incline.warning + self.incline.error,
            self.elevation.coordinates_missing_z,
            self.outliers.outliers
        )
    }
}
