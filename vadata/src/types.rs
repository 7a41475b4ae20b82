//! Types de données pour le crate vadata

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::ParseIssue;
use crate::VaError;

/// Coordonnée canonique. `x` et `y` sont toujours finis, `z` peut être absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coordinate {
    pub fn new(x: f64, y: f64, z: Option<f64>) -> Self {
        Self { x, y, z }
    }

    /// Altitude exploitable (présente et finie)
    pub fn finite_z(&self) -> Option<f64> {
        self.z.filter(|z| z.is_finite())
    }
}

/// Identifiant local à la source (non garanti unique)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum FeatureId {
    Int(i64),
    Str(String),
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for FeatureId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for FeatureId {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Type géométrique d'une feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Point,
    Line,
}

/// Valeur scalaire typée d'un attribut
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
}

impl Value {
    /// Valeur numérique si l'attribut en porte une (chaînes numériques incluses)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
            Self::Bool(_) | Self::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Str(v) => f.write_str(v),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Un objet point ou ligne normalisé
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    /// Identifiant local à la source
    pub id: FeatureId,

    /// Point (une coordonnée) ou ligne (deux ou plus)
    pub kind: FeatureKind,

    /// Coordonnées ordonnées
    pub coordinates: Vec<Coordinate>,

    /// Attributs (nom de champ -> valeur typée)
    pub attributes: HashMap<String, Value>,

    /// Identifiant externe stable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,

    /// Emprise fournie par la source, opaque
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,
}

impl Feature {
    /// Recherche un attribut sans tenir compte de la casse du nom de champ
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Première valeur non nulle parmi une liste de champs candidats
    pub fn first_attribute(&self, names: &[&str]) -> Option<&Value> {
        names
            .iter()
            .filter_map(|name| self.attribute(name))
            .find(|v| !v.is_null())
    }
}

/// Format d'échange source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// Format ASCII propriétaire (GMI)
    Gmi,
    /// Format vectoriel national (SOSI)
    Sosi,
    /// Liste de coordonnées de levé (KOF)
    Kof,
    /// Format non reconnu
    Unknown,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gmi => "GMI",
            Self::Sosi => "SOSI",
            Self::Kof => "KOF",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Résultat du parsing d'un export
///
/// Si `errors` n'est pas vide, le résultat peut être incomplet, mais chaque
/// feature présente est entièrement normalisée.
#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    pub format: FormatKind,

    /// Métadonnées d'en-tête
    pub header: HashMap<String, Value>,

    pub points: Vec<Feature>,

    pub lines: Vec<Feature>,

    /// Anomalies récupérables
    pub warnings: Vec<String>,

    /// Erreurs (fatales ou de parsing partiel)
    pub errors: Vec<ParseIssue>,
}

impl ParseResult {
    pub fn new(format: FormatKind) -> Self {
        Self {
            format,
            header: HashMap::new(),
            points: Vec::new(),
            lines: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Résultat vide portant une seule erreur
    pub fn failed(format: FormatKind, err: VaError) -> Self {
        let mut result = Self::new(format);
        result.push_error(err);
        result
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn push_error(&mut self, err: VaError) {
        self.errors.push(err.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.points.len() + self.lines.len()
    }

    /// Range une feature dans la liste correspondant à son type
    pub fn push_feature(&mut self, feature: Feature) {
        match feature.kind {
            FeatureKind::Point => self.points.push(feature),
            FeatureKind::Line => self.lines.push(feature),
        }
    }

    /// Code EPSG déclaré dans l'en-tête : clé `EPSG` exacte, sinon toute clé
    /// contenant `EPSG` (`EPSG_CODE`, `SourceEPSG`...)
    pub fn epsg(&self) -> Option<u32> {
        let code = |v: &Value| v.as_i64().and_then(|v| u32::try_from(v).ok());

        self.header
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("EPSG"))
            .and_then(|(_, v)| code(v))
            .or_else(|| {
                self.header
                    .iter()
                    .filter(|(k, _)| k.to_ascii_uppercase().contains("EPSG"))
                    .find_map(|(_, v)| code(v))
            })
    }
}
