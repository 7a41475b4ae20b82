//! # vadata-check
//!
//! Contrôles d'ingénierie sur des levés de réseaux eau et assainissement lus
//! par `vadata`.
//!
//! ## Features
//!
//! - Pente des conduites gravitaires (règle fixe ou selon le diamètre)
//! - Complétude des altitudes
//! - Positions aberrantes
//! - Altitudes du terrain (cache, file bornée, requêtes prioritaires) et recouvrement
//! - Rapport console et JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Résumé du parsing
//! vadata-check parse --path ./ledninger.gmi
//!
//! # Contrôles complets avec rapport JSON
//! vadata-check check --path ./ledninger.sos --config strict --report ./rapport.json
//!
//! # Recouvrement d'une conduite
//! vadata-check terrain --path ./ledninger.gmi --line 3 --min-cover 1.2
//! ```

pub mod analysis;
pub mod config;
pub mod report;
pub mod terrain;

pub use analysis::{run_all, Analyses, AnalysisStatus};
pub use config::{CheckConfig, TerrainConfig};
pub use report::{CheckReport, CheckStatus};
pub use terrain::{TerrainError, TerrainPoint, TerrainService};
