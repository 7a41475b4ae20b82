//! Analyse de pente des conduites
//!
//! Une conduite gravitaire doit descendre dans le sens de l'écoulement avec une
//! pente minimale (en ‰). Le sens de numérisation n'est pas fiable : si le
//! premier sommet est plus bas que le dernier, la ligne est considérée comme
//! numérisée à l'envers et le profil est calculé dans le sens inverse.

use std::str::FromStr;

use geo::{Coord, EuclideanLength, Line};
use serde::{Deserialize, Serialize};
use vadata::{Coordinate, Feature, ParseResult};

use super::AnalysisStatus;

/// Mode de calcul de la pente minimale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InclineMode {
    /// 10 ‰ quel que soit le diamètre
    #[default]
    Fixed10,
    /// Selon le diamètre : < 200 mm → 10 ‰, 200-315 mm → 4 ‰, > 315 mm → 2 ‰
    Variable,
}

impl FromStr for InclineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed10" | "fixed" => Ok(InclineMode::Fixed10),
            "variable" => Ok(InclineMode::Variable),
            _ => Err(format!("Invalid incline mode: {}. Use: fixed10, variable", s)),
        }
    }
}

/// Type d'écoulement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeType {
    Gravity,
    Pressure,
}

/// Options de l'analyse
#[derive(Debug, Clone)]
pub struct InclineOptions {
    pub mode: InclineMode,
    /// Attributs portant le code fonction, par ordre de priorité
    pub function_code_fields: Vec<String>,
    /// Attributs portant le diamètre (mm)
    pub diameter_fields: Vec<String>,
}

impl Default for InclineOptions {
    fn default() -> Self {
        Self {
            mode: InclineMode::Fixed10,
            function_code_fields: vec!["FCODE".into(), "FUNCTION".into()],
            diameter_fields: vec!["DIM".into(), "DIAMETER".into(), "DIMENSJON".into()],
        }
    }
}

/// Point du profil en long, dans le sens de l'écoulement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfilePoint {
    /// Indice du sommet dans la géométrie d'origine
    pub index: usize,
    /// Distance horizontale cumulée depuis le début de l'écoulement
    pub dist: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Tronçon entre deux sommets consécutifs
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub from: usize,
    pub to: usize,
    pub length: f64,
    /// Chute dans le sens de l'écoulement (positive si descendante)
    pub delta_z: f64,
    pub incline_permille: f64,
    pub below_requirement: bool,
    pub backfall: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InclineDetails {
    pub start_z: f64,
    pub end_z: f64,
    pub length: f64,
    pub incline_permille: f64,
    pub delta_z: f64,
    pub profile_points: Vec<ProfilePoint>,
    pub segments: Vec<Segment>,
    pub is_digitized_backwards: bool,
    /// Pente minimale exigée (‰), absente pour une conduite en pression
    pub min_incline_rule: Option<f64>,
    pub flow_from: usize,
    pub flow_to: usize,
    pub diameter: Option<f64>,
}

/// Résultat pour une ligne
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InclineResult {
    pub line_index: usize,
    pub status: AnalysisStatus,
    pub message: String,
    pub pipe_type: PipeType,
    pub details: Option<InclineDetails>,
}

/// Compteurs agrégés
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InclineSummary {
    pub total: usize,
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
    pub gravity: usize,
    pub pressure: usize,
}

const GRAVITY_CODES: &[&str] = &["SP", "OV", "AF"];
const PRESSURE_MARKERS: &[&str] = &["TRYKK", "PUMP", "SPP"];
const WATER_CODES: &[&str] = &["VL", "VANN"];

/// Classe un code fonction. `None` si la conduite n'est pas concernée.
pub fn classify(code: &str) -> Option<PipeType> {
    let code = code.to_uppercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| code.contains(n));

    if contains_any(GRAVITY_CODES) {
        if contains_any(PRESSURE_MARKERS) {
            Some(PipeType::Pressure)
        } else {
            Some(PipeType::Gravity)
        }
    } else if contains_any(WATER_CODES) {
        Some(PipeType::Pressure)
    } else {
        None
    }
}

/// Pente minimale exigée (‰)
pub fn min_incline(mode: InclineMode, diameter: Option<f64>) -> f64 {
    match (mode, diameter) {
        (InclineMode::Fixed10, _) => 10.0,
        (InclineMode::Variable, Some(d)) if d > 315.0 => 2.0,
        (InclineMode::Variable, Some(d)) if d >= 200.0 => 4.0,
        // Diamètre absent ou < 200 mm : règle la plus stricte
        (InclineMode::Variable, _) => 10.0,
    }
}

/// Analyse toutes les lignes classées gravitaires ou en pression
pub fn analyze(result: &ParseResult, options: &InclineOptions) -> Vec<InclineResult> {
    let code_fields: Vec<&str> = options.function_code_fields.iter().map(String::as_str).collect();
    let diameter_fields: Vec<&str> = options.diameter_fields.iter().map(String::as_str).collect();

    result
        .lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let code = line.first_attribute(&code_fields)?.to_string();
            let pipe_type = classify(&code)?;
            Some(analyze_line(idx, line, pipe_type, options.mode, &diameter_fields))
        })
        .collect()
}

fn analyze_line(
    line_index: usize,
    line: &Feature,
    pipe_type: PipeType,
    mode: InclineMode,
    diameter_fields: &[&str],
) -> InclineResult {
    let Some(zs) = line
        .coordinates
        .iter()
        .map(Coordinate::finite_z)
        .collect::<Option<Vec<f64>>>()
    else {
        return InclineResult {
            line_index,
            status: AnalysisStatus::Error,
            message: "missing Z".to_string(),
            pipe_type,
            details: None,
        };
    };

    if zs.len() < 2 {
        return InclineResult {
            line_index,
            status: AnalysisStatus::Error,
            message: format!("{} coordinate(s), at least 2 required", zs.len()),
            pipe_type,
            details: None,
        };
    }

    let diameter = line.first_attribute(diameter_fields).and_then(|v| v.as_f64());
    let rule = match pipe_type {
        PipeType::Gravity => Some(min_incline(mode, diameter)),
        PipeType::Pressure => None,
    };
    let details = build_details(&line.coordinates, &zs, rule, diameter);

    let (status, message) = match rule {
        None => (AnalysisStatus::Ok, "no gradient requirement".to_string()),
        Some(min) => gravity_status(&details, min),
    };

    InclineResult {
        line_index,
        status,
        message,
        pipe_type,
        details: Some(details),
    }
}

fn gravity_status(details: &InclineDetails, min: f64) -> (AnalysisStatus, String) {
    if details.segments.iter().any(|s| s.backfall) {
        (AnalysisStatus::Warning, "backfall detected".to_string())
    } else if details.segments.iter().any(|s| s.below_requirement) {
        (AnalysisStatus::Warning, "below requirement".to_string())
    } else if details.incline_permille < min {
        (
            AnalysisStatus::Warning,
            format!(
                "average incline {:.1}‰ below requirement {:.0}‰",
                details.incline_permille, min
            ),
        )
    } else {
        (AnalysisStatus::Ok, "ok".to_string())
    }
}

fn build_details(
    coordinates: &[Coordinate],
    zs: &[f64],
    rule: Option<f64>,
    diameter: Option<f64>,
) -> InclineDetails {
    let last = zs.len() - 1;
    let is_digitized_backwards = zs[0] < zs[last];

    let order: Vec<usize> = if is_digitized_backwards {
        (0..=last).rev().collect()
    } else {
        (0..=last).collect()
    };

    let mut profile_points = Vec::with_capacity(order.len());
    let mut segments = Vec::with_capacity(order.len().saturating_sub(1));
    let mut dist = 0.0;

    for (step, &idx) in order.iter().enumerate() {
        if step > 0 {
            let prev = order[step - 1];
            let length = horizontal_length(&coordinates[prev], &coordinates[idx]);
            dist += length;

            // Tronçon de longueur nulle : pas de pente définie
            if length > 0.0 {
                let delta_z = zs[prev] - zs[idx];
                let incline_permille = delta_z / length * 1000.0;
                segments.push(Segment {
                    from: prev,
                    to: idx,
                    length,
                    delta_z,
                    incline_permille,
                    below_requirement: rule.is_some_and(|min| incline_permille < min),
                    backfall: rule.is_some() && delta_z < 0.0,
                });
            }
        }

        profile_points.push(ProfilePoint {
            index: idx,
            dist,
            x: coordinates[idx].x,
            y: coordinates[idx].y,
            z: zs[idx],
        });
    }

    let flow_from = order[0];
    let flow_to = order[last];
    let start_z = zs[flow_from];
    let end_z = zs[flow_to];
    let delta_z = start_z - end_z;
    let incline_permille = if dist > 0.0 { delta_z / dist * 1000.0 } else { 0.0 };

    InclineDetails {
        start_z,
        end_z,
        length: dist,
        incline_permille,
        delta_z,
        profile_points,
        segments,
        is_digitized_backwards,
        min_incline_rule: rule,
        flow_from,
        flow_to,
        diameter,
    }
}

/// Profil en long d'une ligne, dans le sens d'écoulement supposé, sans règle
/// de pente. `None` si une altitude manque.
pub fn line_profile(line: &Feature) -> Option<Vec<ProfilePoint>> {
    let zs = line
        .coordinates
        .iter()
        .map(Coordinate::finite_z)
        .collect::<Option<Vec<f64>>>()?;
    if zs.len() < 2 {
        return None;
    }
    Some(build_details(&line.coordinates, &zs, None, None).profile_points)
}

fn horizontal_length(a: &Coordinate, b: &Coordinate) -> f64 {
    Line::new(Coord { x: a.x, y: a.y }, Coord { x: b.x, y: b.y }).euclidean_length()
}

/// Agrège les résultats
pub fn summarize(results: &[InclineResult]) -> InclineSummary {
    results.iter().fold(
        InclineSummary {
            total: results.len(),
            ..Default::default()
        },
        |mut acc, r| {
            match r.status {
                AnalysisStatus::Ok => acc.ok += 1,
                AnalysisStatus::Warning => acc.warning += 1,
                AnalysisStatus::Error => acc.error += 1,
            }
            match r.pipe_type {
                PipeType::Gravity => acc.gravity += 1,
                PipeType::Pressure => acc.pressure += 1,
            }
            acc
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vadata::{FeatureId, FeatureKind, FormatKind, Value};

    fn line(code: &str, dim: Option<i64>, coords: &[(f64, f64, Option<f64>)]) -> Feature {
        let mut attributes = HashMap::new();
        attributes.insert("FCODE".to_string(), Value::Str(code.to_string()));
        if let Some(d) = dim {
            attributes.insert("DIM".to_string(), Value::Int(d));
        }
        Feature {
            id: FeatureId::Int(1),
            kind: FeatureKind::Line,
            coordinates: coords.iter().map(|&(x, y, z)| Coordinate::new(x, y, z)).collect(),
            attributes,
            guid: None,
            extent: None,
        }
    }

    fn result_with(lines: Vec<Feature>) -> ParseResult {
        let mut result = ParseResult::new(FormatKind::Gmi);
        result.lines = lines;
        result
    }

    fn single(feature: Feature, mode: InclineMode) -> InclineResult {
        let options = InclineOptions {
            mode,
            ..Default::default()
        };
        let mut results = analyze(&result_with(vec![feature]), &options);
        assert_eq!(results.len(), 1);
        results.remove(0)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("SP"), Some(PipeType::Gravity));
        assert_eq!(classify("ov"), Some(PipeType::Gravity));
        assert_eq!(classify("AF"), Some(PipeType::Gravity));
        assert_eq!(classify("SPP"), Some(PipeType::Pressure));
        assert_eq!(classify("SP-TRYKK"), Some(PipeType::Pressure));
        assert_eq!(classify("VL"), Some(PipeType::Pressure));
        assert_eq!(classify("KUM"), None);
        assert_eq!(classify("DR"), None);
    }

    #[test]
    fn test_min_incline_rules() {
        assert_eq!(min_incline(InclineMode::Fixed10, Some(500.0)), 10.0);
        assert_eq!(min_incline(InclineMode::Variable, Some(160.0)), 10.0);
        assert_eq!(min_incline(InclineMode::Variable, Some(200.0)), 4.0);
        assert_eq!(min_incline(InclineMode::Variable, Some(315.0)), 4.0);
        assert_eq!(min_incline(InclineMode::Variable, Some(400.0)), 2.0);
        assert_eq!(min_incline(InclineMode::Variable, None), 10.0);
    }

    #[test]
    fn test_well_sloped_line_is_ok() {
        let r = single(
            line("SP", Some(160), &[(0.0, 0.0, Some(101.0)), (100.0, 0.0, Some(99.0))]),
            InclineMode::Fixed10,
        );
        assert_eq!(r.status, AnalysisStatus::Ok);
        let details = r.details.unwrap();
        assert!((details.incline_permille - 20.0).abs() < 1e-9);
        assert_eq!(details.length, 100.0);
        assert!(!details.is_digitized_backwards);
    }

    #[test]
    fn test_flat_line_is_never_ok() {
        let r = single(
            line("SP", None, &[(0.0, 0.0, Some(100.0)), (50.0, 0.0, Some(100.0))]),
            InclineMode::Variable,
        );
        assert_ne!(r.status, AnalysisStatus::Ok);
    }

    #[test]
    fn test_backwards_digitized_line_is_not_backfall() {
        // Numérisée vers l'amont, altitudes décroissantes dans le sens réel
        let r = single(
            line(
                "OV",
                Some(250),
                &[(0.0, 0.0, Some(98.0)), (50.0, 0.0, Some(99.0)), (100.0, 0.0, Some(100.0))],
            ),
            InclineMode::Variable,
        );
        assert_eq!(r.status, AnalysisStatus::Ok, "{}", r.message);

        let details = r.details.unwrap();
        assert!(details.is_digitized_backwards);
        assert_eq!(details.flow_from, 2);
        assert_eq!(details.flow_to, 0);
        assert_eq!(details.profile_points[0].dist, 0.0);
        assert_eq!(details.profile_points[0].index, 2);
        assert!(details.segments.iter().all(|s| s.delta_z > 0.0));
    }

    #[test]
    fn test_backfall_has_priority() {
        let r = single(
            line(
                "SP",
                None,
                &[(0.0, 0.0, Some(102.0)), (10.0, 0.0, Some(102.1)), (100.0, 0.0, Some(101.0))],
            ),
            InclineMode::Fixed10,
        );
        assert_eq!(r.status, AnalysisStatus::Warning);
        assert_eq!(r.message, "backfall detected");
    }

    #[test]
    fn test_segment_below_requirement() {
        let r = single(
            line(
                "SP",
                None,
                &[(0.0, 0.0, Some(102.0)), (50.0, 0.0, Some(100.0)), (100.0, 0.0, Some(99.9))],
            ),
            InclineMode::Fixed10,
        );
        assert_eq!(r.message, "below requirement");
    }

    #[test]
    fn test_missing_z_short_circuits_even_for_pressure() {
        let r = single(
            line("VL", None, &[(0.0, 0.0, Some(100.0)), (10.0, 0.0, None)]),
            InclineMode::Fixed10,
        );
        assert_eq!(r.status, AnalysisStatus::Error);
        assert_eq!(r.message, "missing Z");
        assert_eq!(r.pipe_type, PipeType::Pressure);
        assert!(r.details.is_none());
    }

    #[test]
    fn test_pressure_line_ignores_geometry() {
        let r = single(
            line("VL", None, &[(0.0, 0.0, Some(90.0)), (10.0, 0.0, Some(95.0)), (20.0, 0.0, Some(80.0))]),
            InclineMode::Fixed10,
        );
        assert_eq!(r.status, AnalysisStatus::Ok);
        assert_eq!(r.message, "no gradient requirement");
        assert!(r.details.unwrap().segments.iter().all(|s| !s.backfall && !s.below_requirement));
    }

    #[test]
    fn test_profile_distances_are_monotonic() {
        let r = single(
            line(
                "AF",
                None,
                &[(0.0, 0.0, Some(105.0)), (0.0, 0.0, Some(104.0)), (3.0, 4.0, Some(103.0)), (6.0, 8.0, Some(102.0))],
            ),
            InclineMode::Fixed10,
        );
        let details = r.details.unwrap();
        let dists: Vec<f64> = details.profile_points.iter().map(|p| p.dist).collect();
        assert_eq!(dists, vec![0.0, 0.0, 5.0, 10.0]);
        // Le tronçon de longueur nulle est ignoré
        assert_eq!(details.segments.len(), 2);
    }

    #[test]
    fn test_unclassified_lines_are_skipped() {
        let results = analyze(
            &result_with(vec![
                line("KUM", None, &[(0.0, 0.0, Some(1.0)), (1.0, 0.0, Some(0.5))]),
                line("SP", None, &[(0.0, 0.0, Some(1.0)), (1.0, 0.0, Some(0.5))]),
            ]),
            &InclineOptions::default(),
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].line_index, 1);
    }

    #[test]
    fn test_summary() {
        let results = vec![
            single(line("SP", None, &[(0.0, 0.0, Some(2.0)), (10.0, 0.0, Some(1.0))]), InclineMode::Fixed10),
            single(line("SP", None, &[(0.0, 0.0, Some(1.0)), (10.0, 0.0, None)]), InclineMode::Fixed10),
            single(line("VL", None, &[(0.0, 0.0, Some(1.0)), (10.0, 0.0, Some(1.0))]), InclineMode::Fixed10),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.gravity, 2);
        assert_eq!(summary.pressure, 1);
    }

    #[test]
    fn test_line_profile() {
        let feature = line("KUM", None, &[(0.0, 0.0, Some(1.0)), (3.0, 4.0, Some(2.0))]);
        let profile = line_profile(&feature).unwrap();
        // Numérisée vers l'amont : le profil part du dernier sommet
        assert_eq!(profile[0].index, 1);
        assert_eq!(profile[1].dist, 5.0);

        let feature = line("SP", None, &[(0.0, 0.0, Some(1.0)), (3.0, 4.0, None)]);
        assert!(line_profile(&feature).is_none());
    }

    #[test]
    fn test_incline_mode_from_str() {
        assert_eq!("variable".parse::<InclineMode>(), Ok(InclineMode::Variable));
        assert_eq!("FIXED10".parse::<InclineMode>(), Ok(InclineMode::Fixed10));
        assert!("steep".parse::<InclineMode>().is_err());
    }
}
