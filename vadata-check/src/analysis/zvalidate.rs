//! Contrôle de complétude des altitudes
//!
//! Une altitude est invalide si elle est absente, non finie ou égale à zéro.

use serde::Serialize;
use vadata::{Coordinate, Feature, FeatureId, ParseResult};

/// Feature dont au moins une coordonnée n'a pas d'altitude valide
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingZ {
    /// Indice dans `points` ou `lines`
    pub index: usize,
    pub id: FeatureId,
    pub coordinate_indices: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZSummary {
    pub total_points: usize,
    pub total_lines: usize,
    pub points_missing_z: usize,
    pub lines_missing_z: usize,
    pub coordinates_checked: usize,
    pub coordinates_missing_z: usize,
}

impl ZSummary {
    pub fn is_complete(&self) -> bool {
        self.coordinates_missing_z == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZReport {
    pub summary: ZSummary,
    pub missing_points: Vec<MissingZ>,
    pub missing_lines: Vec<MissingZ>,
}

pub fn is_valid_z(coordinate: &Coordinate) -> bool {
    coordinate.finite_z().is_some_and(|z| z != 0.0)
}

pub fn analyze(result: &ParseResult) -> ZReport {
    let missing_points = collect_missing(&result.points);
    let missing_lines = collect_missing(&result.lines);

    let coordinates_checked = result
        .points
        .iter()
        .chain(&result.lines)
        .map(|f| f.coordinates.len())
        .sum();
    let coordinates_missing_z = missing_points
        .iter()
        .chain(&missing_lines)
        .map(|m| m.coordinate_indices.len())
        .sum();

    ZReport {
        summary: ZSummary {
            total_points: result.points.len(),
            total_lines: result.lines.len(),
            points_missing_z: missing_points.len(),
            lines_missing_z: missing_lines.len(),
            coordinates_checked,
            coordinates_missing_z,
        },
        missing_points,
        missing_lines,
    }
}

fn collect_missing(features: &[Feature]) -> Vec<MissingZ> {
    features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let coordinate_indices: Vec<usize> = feature
                .coordinates
                .iter()
                .enumerate()
                .filter(|(_, c)| !is_valid_z(c))
                .map(|(i, _)| i)
                .collect();

            (!coordinate_indices.is_empty()).then(|| MissingZ {
                index,
                id: feature.id.clone(),
                coordinate_indices,
            })
        })
        .collect()
}
