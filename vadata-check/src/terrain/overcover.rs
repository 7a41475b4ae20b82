//! Recouvrement : hauteur de terrain au-dessus de la conduite

use serde::Serialize;

use super::TerrainProfilePoint;
use crate::analysis::incline::ProfilePoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverSample {
    pub dist: f64,
    pub pipe_z: f64,
    pub terrain_dist: Option<f64>,
    pub terrain_z: Option<f64>,
    /// `terrain_z - pipe_z`
    pub cover: Option<f64>,
    pub warning: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OvercoverSummary {
    pub samples: usize,
    pub min_overcover: f64,
    pub min_cover: Option<f64>,
    pub warnings: usize,
    /// Conduite au-dessus du terrain (recouvrement négatif)
    pub above_terrain: usize,
    pub missing_terrain: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OvercoverResult {
    pub samples: Vec<CoverSample>,
    pub summary: OvercoverSummary,
}

/// Apparie chaque point du profil de conduite au point de terrain le plus
/// proche en abscisse, et signale un recouvrement positif mais insuffisant
pub fn analyze_overcover(
    pipe: &[ProfilePoint],
    terrain: &[TerrainProfilePoint],
    min_overcover: f64,
) -> OvercoverResult {
    let known: Vec<(f64, f64)> = terrain
        .iter()
        .filter_map(|t| t.z.map(|z| (t.dist, z)))
        .collect();

    let samples: Vec<CoverSample> = pipe
        .iter()
        .map(|p| {
            let nearest = known
                .iter()
                .min_by(|a, b| (a.0 - p.dist).abs().total_cmp(&(b.0 - p.dist).abs()));
            let cover = nearest.map(|&(_, z)| z - p.z);

            CoverSample {
                dist: p.dist,
                pipe_z: p.z,
                terrain_dist: nearest.map(|&(d, _)| d),
                terrain_z: nearest.map(|&(_, z)| z),
                cover,
                warning: cover.is_some_and(|c| c >= 0.0 && c < min_overcover),
            }
        })
        .collect();

    let summary = OvercoverSummary {
        samples: samples.len(),
        min_overcover,
        min_cover: samples
            .iter()
            .filter_map(|s| s.cover)
            .min_by(f64::total_cmp),
        warnings: samples.iter().filter(|s| s.warning).count(),
        above_terrain: samples.iter().filter(|s| s.cover.is_some_and(|c| c < 0.0)).count(),
        missing_terrain: samples.iter().filter(|s| s.cover.is_none()).count(),
    };

    OvercoverResult { samples, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe(points: &[(f64, f64)]) -> Vec<ProfilePoint> {
        points
            .iter()
            .enumerate()
            .map(|(index, &(dist, z))| ProfilePoint {
                index,
                dist,
                x: dist,
                y: 0.0,
                z,
            })
            .collect()
    }

    fn terrain(points: &[(f64, Option<f64>)]) -> Vec<TerrainProfilePoint> {
        points.iter().map(|&(dist, z)| TerrainProfilePoint { dist, z }).collect()
    }

    #[test]
    fn test_cover_classification() {
        let result = analyze_overcover(
            &pipe(&[(0.0, 100.0), (10.0, 99.5), (20.0, 99.0)]),
            &terrain(&[(0.0, Some(102.0)), (10.0, Some(100.0)), (20.0, Some(98.0))]),
            1.0,
        );

        assert_eq!(result.samples[0].cover, Some(2.0));
        assert!(!result.samples[0].warning);
        assert_eq!(result.samples[1].cover, Some(0.5));
        assert!(result.samples[1].warning);
        // Conduite hors sol : pas un défaut de recouvrement
        assert_eq!(result.samples[2].cover, Some(-1.0));
        assert!(!result.samples[2].warning);

        assert_eq!(result.summary.warnings, 1);
        assert_eq!(result.summary.above_terrain, 1);
        assert_eq!(result.summary.min_cover, Some(-1.0));
    }

    #[test]
    fn test_nearest_terrain_sample() {
        let result = analyze_overcover(
            &pipe(&[(4.0, 100.0), (8.0, 100.0)]),
            &terrain(&[(0.0, Some(103.0)), (5.0, None), (10.0, Some(100.5))]),
            1.0,
        );
        // Le point sans altitude est ignoré
        assert_eq!(result.samples[0].terrain_dist, Some(0.0));
        assert_eq!(result.samples[1].terrain_dist, Some(10.0));
        assert!(result.samples[1].warning);
    }

    #[test]
    fn test_no_terrain() {
        let result = analyze_overcover(&pipe(&[(0.0, 100.0)]), &terrain(&[(0.0, None)]), 1.0);
        assert_eq!(result.summary.missing_terrain, 1);
        assert_eq!(result.summary.min_cover, None);
        assert_eq!(result.summary.warnings, 0);
    }
}
