//! Détection des positions aberrantes
//!
//! On prend la première coordonnée de chaque point et de chaque ligne, on
//! calcule le centroïde puis le z-score de la distance de chaque position au
//! centroïde. Les positions au-delà du seuil sont signalées (typiquement une
//! coordonnée saisie dans le mauvais système ou avec un chiffre en trop).

use geo::{Centroid, EuclideanDistance, MultiPoint, Point};
use serde::Serialize;
use vadata::{Feature, FeatureId, FeatureKind, ParseResult};

pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// En dessous, les statistiques n'ont pas de sens
const MIN_POSITIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlier {
    pub kind: FeatureKind,
    /// Indice dans `points` ou `lines`
    pub index: usize,
    pub id: FeatureId,
    pub position: Position,
    pub distance: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierSummary {
    pub positions: usize,
    pub mean_distance: f64,
    pub std_dev: f64,
    pub threshold: f64,
    pub outliers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutlierReport {
    pub outliers: Vec<Outlier>,
    pub centroid: Option<Position>,
    pub summary: OutlierSummary,
}

struct Candidate<'a> {
    kind: FeatureKind,
    index: usize,
    feature: &'a Feature,
    point: Point<f64>,
}

fn candidate(kind: FeatureKind, index: usize, feature: &Feature) -> Option<Candidate<'_>> {
    feature.coordinates.first().map(|c| Candidate {
        kind,
        index,
        feature,
        point: Point::new(c.x, c.y),
    })
}

fn candidates(result: &ParseResult) -> Vec<Candidate<'_>> {
    let points = result
        .points
        .iter()
        .enumerate()
        .filter_map(|(i, f)| candidate(FeatureKind::Point, i, f));
    let lines = result
        .lines
        .iter()
        .enumerate()
        .filter_map(|(i, f)| candidate(FeatureKind::Line, i, f));

    points.chain(lines).collect()
}

pub fn detect(result: &ParseResult, threshold: f64) -> OutlierReport {
    let candidates = candidates(result);
    let mut report = OutlierReport {
        summary: OutlierSummary {
            positions: candidates.len(),
            threshold,
            ..Default::default()
        },
        ..Default::default()
    };

    if candidates.len() < MIN_POSITIONS {
        return report;
    }

    let multi: MultiPoint<f64> = candidates.iter().map(|c| c.point).collect();
    let Some(centroid) = multi.centroid() else {
        return report;
    };

    let distances: Vec<f64> = candidates
        .iter()
        .map(|c| c.point.euclidean_distance(&centroid))
        .collect();
    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    report.centroid = Some(Position {
        x: centroid.x(),
        y: centroid.y(),
    });
    report.summary.mean_distance = mean;
    report.summary.std_dev = std_dev;

    // Toutes les positions à égale distance : aucune n'est aberrante
    if std_dev > 0.0 {
        report.outliers = candidates
            .iter()
            .zip(&distances)
            .filter_map(|(c, &distance)| {
                let z_score = (distance - mean) / std_dev;
                (z_score > threshold).then(|| Outlier {
                    kind: c.kind,
                    index: c.index,
                    id: c.feature.id.clone(),
                    position: Position {
                        x: c.point.x(),
                        y: c.point.y(),
                    },
                    distance,
                    z_score,
                })
            })
            .collect();
    }
    report.summary.outliers = report.outliers.len();

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vadata::{Coordinate, FormatKind};

    fn point(x: f64, y: f64) -> Feature {
        Feature {
            id: FeatureId::Int(x as i64),
            kind: FeatureKind::Point,
            coordinates: vec![Coordinate::new(x, y, Some(1.0))],
            attributes: HashMap::new(),
            guid: None,
            extent: None,
        }
    }

    fn cluster_with_outlier() -> ParseResult {
        let mut result = ParseResult::new(FormatKind::Gmi);
        for i in 0..20 {
            let offset = f64::from(i);
            result.points.push(point(598000.0 + offset, 6640000.0 + (offset % 5.0)));
        }
        // Un chiffre de trop sur l'est
        result.points.push(point(5980000.0, 6640000.0));
        result
    }

    #[test]
    fn test_detects_far_position() {
        let report = detect(&cluster_with_outlier(), DEFAULT_THRESHOLD);
        assert_eq!(report.outliers.len(), 1);
        assert_eq!(report.outliers[0].index, 20);
        assert_eq!(report.outliers[0].kind, FeatureKind::Point);
        assert!(report.outliers[0].z_score > DEFAULT_THRESHOLD);
        assert_eq!(report.summary.positions, 21);
        assert!(report.centroid.is_some());
    }

    #[test]
    fn test_two_positions_are_never_outliers() {
        let mut result = ParseResult::new(FormatKind::Gmi);
        result.points.push(point(0.0, 0.0));
        result.points.push(point(1.0e9, 1.0e9));

        let report = detect(&result, DEFAULT_THRESHOLD);
        assert!(report.outliers.is_empty());
        assert!(report.centroid.is_none());
        assert_eq!(report.summary.positions, 2);
    }

    #[test]
    fn test_equidistant_positions_have_no_outliers() {
        let mut result = ParseResult::new(FormatKind::Gmi);
        result.points.push(point(1.0, 0.0));
        result.points.push(point(-1.0, 0.0));
        result.points.push(point(0.0, 1.0));
        result.points.push(point(0.0, -1.0));

        let report = detect(&result, 0.0);
        assert!(report.outliers.is_empty());
        assert_eq!(report.summary.std_dev, 0.0);
    }

    #[test]
    fn test_lines_contribute_their_first_coordinate() {
        let mut result = cluster_with_outlier();
        let mut line = point(598001.0, 6640001.0);
        line.kind = FeatureKind::Line;
        line.coordinates.push(Coordinate::new(9.0e7, 9.0e7, None));
        result.lines.push(line);

        let report = detect(&result, DEFAULT_THRESHOLD);
        assert_eq!(report.summary.positions, 22);
        assert!(report.outliers.iter().all(|o| o.kind == FeatureKind::Point));
    }
}
