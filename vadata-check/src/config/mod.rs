//! Configuration des contrôles et du service d'altitudes

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::analysis::incline::{InclineMode, InclineOptions};
use crate::terrain::provider::MAX_BATCH_SIZE;

/// Paramètres des contrôles
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckConfig {
    /// Règle de pente minimale (fixed10, variable)
    #[serde(default)]
    pub min_incline_mode: InclineMode,

    /// Seuil de z-score pour les positions aberrantes
    #[serde(default = "default_outlier_threshold")]
    pub outlier_z_threshold: f64,

    /// Recouvrement minimal exigé (mètres)
    #[serde(default = "default_min_overcover")]
    pub min_overcover: f64,

    /// Attributs portant le code fonction, par ordre de priorité
    #[serde(default = "default_function_code_fields")]
    pub function_code_fields: Vec<String>,

    /// Attributs portant le diamètre (mm)
    #[serde(default = "default_diameter_fields")]
    pub diameter_fields: Vec<String>,
}

fn default_outlier_threshold() -> f64 {
    3.0
}

fn default_min_overcover() -> f64 {
    1.0
}

fn default_function_code_fields() -> Vec<String> {
    InclineOptions::default().function_code_fields
}

fn default_diameter_fields() -> Vec<String> {
    InclineOptions::default().diameter_fields
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            min_incline_mode: InclineMode::default(),
            outlier_z_threshold: default_outlier_threshold(),
            min_overcover: default_min_overcover(),
            function_code_fields: default_function_code_fields(),
            diameter_fields: default_diameter_fields(),
        }
    }
}

impl CheckConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            "strict" => Self::load_embedded(include_str!("presets/strict.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default, strict", preset),
        }
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(name_or_path: &str) -> Result<Self> {
        let path = Path::new(name_or_path);
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) || path.exists() {
            Self::load(path)
        } else {
            Self::from_preset(name_or_path)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    pub fn incline_options(&self) -> InclineOptions {
        InclineOptions {
            mode: self.min_incline_mode,
            function_code_fields: self.function_code_fields.clone(),
            diameter_fields: self.diameter_fields.clone(),
        }
    }
}

/// Point d'accès public par défaut du service d'altitudes
pub const DEFAULT_TERRAIN_API_URL: &str = "https://ws.geonorge.no/hoydedata/v1/punkt";

/// Configuration du service d'altitudes
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    pub api_url: String,
    /// Points par requête (50 au plus)
    pub batch_size: usize,
    /// Requêtes simultanées
    pub max_concurrent: usize,
    /// Délai après chaque requête
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_TERRAIN_API_URL.into(),
            batch_size: MAX_BATCH_SIZE,
            max_concurrent: 3,
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }
}

impl TerrainConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("TERRAIN_API_URL").unwrap_or(defaults.api_url),
            batch_size: env_parse("TERRAIN_BATCH_SIZE")
                .unwrap_or(defaults.batch_size)
                .min(MAX_BATCH_SIZE),
            max_concurrent: env_parse("TERRAIN_MAX_CONCURRENT").unwrap_or(defaults.max_concurrent),
            delay: env_parse("TERRAIN_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            timeout: env_parse("TERRAIN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_parse() {
        let default = CheckConfig::from_preset("default").unwrap();
        assert_eq!(default.min_incline_mode, InclineMode::Fixed10);
        assert_eq!(default.outlier_z_threshold, 3.0);
        assert_eq!(default.min_overcover, 1.0);
        assert!(default.function_code_fields.iter().any(|f| f == "FCODE"));

        let strict = CheckConfig::from_preset("strict").unwrap();
        assert_eq!(strict.min_incline_mode, InclineMode::Variable);
        assert!(strict.outlier_z_threshold < default.outlier_z_threshold);
        assert!(strict.min_overcover > default.min_overcover);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(CheckConfig::from_preset("lenient").is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CheckConfig = serde_json::from_str(r#"{"min_incline_mode":"variable"}"#).unwrap();
        assert_eq!(config.min_incline_mode, InclineMode::Variable);
        assert_eq!(config.outlier_z_threshold, 3.0);
        assert_eq!(config.diameter_fields, default_diameter_fields());
    }

    #[test]
    fn test_resolve_file() {
        let path = std::env::temp_dir().join("vadata_check_config_test.json");
        std::fs::write(&path, r#"{"min_overcover": 2.5}"#).unwrap();

        let config = CheckConfig::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(config.min_overcover, 2.5);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_terrain_defaults() {
        let config = TerrainConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.delay, Duration::from_millis(200));
    }
}
