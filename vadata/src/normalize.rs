//! Normalisation des coordonnées et construction des features canoniques

use std::collections::HashMap;

use crate::types::{Coordinate, Feature, FeatureId, FeatureKind, Value};

/// Coordonnée brute telle que fournie par un adaptateur
#[derive(Debug, Clone, PartialEq)]
pub enum RawCoordinate {
    /// Forme objet `{x, y, z?}`
    Object {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
    },
    /// Forme tableau `[x, y, z?]`
    Array(Vec<f64>),
}

impl RawCoordinate {
    pub fn xyz(x: f64, y: f64, z: Option<f64>) -> Self {
        Self::Object {
            x: Some(x),
            y: Some(y),
            z,
        }
    }

    /// Lit une coordonnée depuis une valeur JSON lâche (objet ou tableau)
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Array(items) => Some(Self::Array(
                items.iter().map_while(serde_json::Value::as_f64).collect(),
            )),
            serde_json::Value::Object(map) => {
                let get = |key: &str| {
                    map.get(key)
                        .or_else(|| map.get(&key.to_uppercase()))
                        .and_then(serde_json::Value::as_f64)
                };
                Some(Self::Object {
                    x: get("x"),
                    y: get("y"),
                    z: get("z"),
                })
            }
            _ => None,
        }
    }

    fn into_coordinate(self) -> Option<Coordinate> {
        let (x, y, z) = match self {
            Self::Object { x, y, z } => (x?, y?, z),
            Self::Array(values) => (
                *values.first()?,
                *values.get(1)?,
                values.get(2).copied(),
            ),
        };

        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        // Altitude absente => 0, la validité de z est vérifiée en aval
        Some(Coordinate::new(x, y, Some(z.unwrap_or(0.0))))
    }
}

impl From<[f64; 2]> for RawCoordinate {
    fn from(v: [f64; 2]) -> Self {
        Self::Array(v.to_vec())
    }
}

impl From<[f64; 3]> for RawCoordinate {
    fn from(v: [f64; 3]) -> Self {
        Self::Array(v.to_vec())
    }
}

/// Construit une feature canonique.
///
/// Les coordonnées sans `x` ou `y` fini sont ignorées. Un `z` manquant vaut `0`,
/// contrairement au parser GMI qui conserve l'absence.
pub fn normalize(
    kind: FeatureKind,
    raw_coordinates: impl IntoIterator<Item = RawCoordinate>,
    attributes: HashMap<String, Value>,
    id: FeatureId,
    guid: Option<String>,
    extent: Option<String>,
) -> Feature {
    let coordinates = raw_coordinates
        .into_iter()
        .filter_map(RawCoordinate::into_coordinate)
        .collect();

    Feature {
        id,
        kind,
        coordinates,
        attributes,
        guid,
        extent,
    }
}

/// Nombre minimal de coordonnées pour un type de feature
pub fn min_coordinates(kind: FeatureKind) -> usize {
    match kind {
        FeatureKind::Point => 1,
        FeatureKind::Line => 2,
    }
}

/// Conversion de type: entier, flottant, booléen, chaîne ou null
pub fn coerce_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Null;
    }

    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if all_digits(digits) {
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Int(v);
        }
    }

    if let Some((int_part, frac_part)) = digits.split_once('.') {
        if all_digits(int_part) && all_digits(frac_part) {
            if let Ok(v) = raw.parse::<f64>() {
                return Value::Float(v);
            }
        }
    }

    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    Value::Str(raw.to_string())
}
