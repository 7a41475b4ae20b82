//! # vadata
//!
//! Parsers pour les exports de levés de réseaux (eau, assainissement) dans trois
//! formats d'échange historiques, normalisés vers un modèle de features unique.
//!
//! ## Formats
//!
//! - GMI : format ASCII propriétaire à sections (`GMIFILE_ASCII`)
//! - SOSI : format vectoriel national, décodé puis adapté
//! - KOF : liste de coordonnées de levé, analyse heuristique
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vadata::parse_file;
//! use std::path::Path;
//!
//! let result = parse_file(Path::new("ledninger.gmi"))?;
//! println!("EPSG: {:?}", result.epsg());
//! println!("{} points, {} lignes", result.points.len(), result.lines.len());
//! for warning in &result.warnings {
//!     println!("warning: {}", warning);
//! }
//! ```
//!
//! Les parsers ne paniquent pas et ne renvoient pas d'erreur : les problèmes
//! sont collectés dans `ParseResult::warnings` et `ParseResult::errors`.

pub mod detect;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod types;

pub use detect::{detect_format, parse_bytes, parse_file};
pub use error::{IssueKind, ParseIssue, VaError};
pub use normalize::{normalize, RawCoordinate};
pub use types::{Coordinate, Feature, FeatureId, FeatureKind, FormatKind, ParseResult, Value};
