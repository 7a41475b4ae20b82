//! Client du service d'altitudes
//!
//! Le service accepte au plus 50 couples `(x, y)` par appel, avec le code du
//! système de coordonnées, et renvoie une altitude et un type de terrain par
//! point, dans le même ordre.

use std::future::Future;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{TerrainError, TerrainPoint};
use crate::config::TerrainConfig;

/// Nombre maximal de points par appel accepté par le service
pub const MAX_BATCH_SIZE: usize = 50;

/// Source d'altitudes pour un lot de points
pub trait HeightProvider: Send + Sync + 'static {
    fn fetch_batch(
        &self,
        points: &[(f64, f64)],
        epsg: u32,
    ) -> impl Future<Output = Result<Vec<TerrainPoint>, TerrainError>> + Send;
}

impl<P: HeightProvider> HeightProvider for Arc<P> {
    fn fetch_batch(
        &self,
        points: &[(f64, f64)],
        epsg: u32,
    ) -> impl Future<Output = Result<Vec<TerrainPoint>, TerrainError>> + Send {
        (**self).fetch_batch(points, epsg)
    }
}

/// Fournisseur HTTP (API publique d'altitudes)
#[derive(Debug, Clone)]
pub struct HttpHeightProvider {
    client: Client,
    url: String,
}

impl HttpHeightProvider {
    pub fn new(config: &TerrainConfig) -> Result<Self, TerrainError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: config.api_url.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    punkter: Vec<ApiPoint>,
}

#[derive(Debug, Deserialize)]
struct ApiPoint {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    terreng: Option<String>,
    datakilde: Option<String>,
}

/// Sérialise les points au format attendu : `[[x,y],[x,y]]`
fn encode_points(points: &[(f64, f64)]) -> String {
    let pairs: Vec<[f64; 2]> = points.iter().map(|&(x, y)| [x, y]).collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

fn decode_response(points: &[(f64, f64)], body: &str) -> Result<Vec<TerrainPoint>, TerrainError> {
    let response: PointsResponse =
        serde_json::from_str(body).map_err(|e| TerrainError::Decode(e.to_string()))?;

    if response.punkter.len() != points.len() {
        return Err(TerrainError::LengthMismatch {
            expected: points.len(),
            got: response.punkter.len(),
        });
    }

    Ok(points
        .iter()
        .zip(response.punkter)
        .map(|(&(x, y), p)| TerrainPoint {
            x: p.x.unwrap_or(x),
            y: p.y.unwrap_or(y),
            z: p.z.filter(|z| z.is_finite()),
            terrain_type: p.terreng,
            data_source: p.datakilde,
            error: false,
        })
        .collect())
}

impl HeightProvider for HttpHeightProvider {
    async fn fetch_batch(
        &self,
        points: &[(f64, f64)],
        epsg: u32,
    ) -> Result<Vec<TerrainPoint>, TerrainError> {
        debug!(points = points.len(), epsg, "Terrain batch request");

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("koordsys", epsg.to_string()),
                ("punkter", encode_points(points)),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TerrainError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode_response(points, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_points() {
        assert_eq!(
            encode_points(&[(598000.5, 6640000.0), (1.0, 2.0)]),
            "[[598000.5,6640000.0],[1.0,2.0]]"
        );
    }

    #[test]
    fn test_decode_response() {
        let body = r#"{"koordsys":25833,"punkter":[
            {"x":598000.5,"y":6640000.0,"z":102.3,"terreng":"Veg","datakilde":"dtm1"},
            {"x":1.0,"y":2.0,"z":null,"terreng":null,"datakilde":null}
        ]}"#;
        let points = decode_response(&[(598000.5, 6640000.0), (1.0, 2.0)], body).unwrap();
        assert_eq!(points[0].z, Some(102.3));
        assert_eq!(points[0].terrain_type.as_deref(), Some("Veg"));
        assert_eq!(points[1].z, None);
        assert!(!points[1].error);
    }

    #[test]
    fn test_decode_length_mismatch() {
        let body = r#"{"punkter":[{"x":1.0,"y":2.0,"z":3.0}]}"#;
        let err = decode_response(&[(1.0, 2.0), (3.0, 4.0)], body).unwrap_err();
        assert!(matches!(err, TerrainError::LengthMismatch { expected: 2, got: 1 }));
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_response(&[(1.0, 2.0)], "<html>").unwrap_err();
        assert!(matches!(err, TerrainError::Decode(_)));
    }
}
