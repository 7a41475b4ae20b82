//! Altitudes du terrain naturel et recouvrement des conduites
//!
//! - `provider` : interrogation du service d'altitudes (HTTP, lots de 50 points)
//! - `service` : cache partagé et file de requêtes bornée
//! - `overcover` : comparaison du profil de conduite au profil de terrain

pub mod overcover;
pub mod provider;
pub mod service;

use serde::Serialize;
use thiserror::Error;

use crate::analysis::incline::ProfilePoint;

pub use overcover::{analyze_overcover, CoverSample, OvercoverResult, OvercoverSummary};
pub use provider::{HeightProvider, HttpHeightProvider};
pub use service::TerrainService;

/// Erreurs du service d'altitudes. Jamais remontées aux appelants de
/// `fetch_heights` : un lot en échec devient des points sentinelles.
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Terrain API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid terrain response: {0}")]
    Decode(String),

    #[error("Terrain API returned {got} heights for {expected} points")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Terrain request queue closed")]
    QueueClosed,
}

/// Altitude du terrain en un point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainPoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub terrain_type: Option<String>,
    pub data_source: Option<String>,
    /// Le lot contenant ce point a échoué
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl TerrainPoint {
    /// Sentinelle pour un point dont le lot a échoué
    pub fn failed(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            terrain_type: None,
            data_source: None,
            error: true,
        }
    }
}

/// Point du profil de terrain, à la même abscisse que le profil de conduite
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TerrainProfilePoint {
    pub dist: f64,
    pub z: Option<f64>,
}

/// Récupère le terrain sous un profil de conduite, en priorité sur les
/// requêtes déjà en attente
pub async fn terrain_profile<P: HeightProvider>(
    service: &TerrainService<P>,
    profile: &[ProfilePoint],
    epsg: u32,
) -> Vec<TerrainProfilePoint> {
    let points: Vec<(f64, f64)> = profile.iter().map(|p| (p.x, p.y)).collect();
    let heights = service.fetch_heights_priority(&points, epsg).await;

    profile
        .iter()
        .zip(heights)
        .map(|(p, t)| TerrainProfilePoint { dist: p.dist, z: t.z })
        .collect()
}
