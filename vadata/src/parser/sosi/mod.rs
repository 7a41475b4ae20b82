//! Adaptateur pour le format vectoriel national SOSI
//!
//! Le décodage structurel est délégué à un [`SosiDecoder`]. L'adaptateur
//! reprend sa sortie GeoJSON vers le modèle canonique. Toute erreur, du
//! décodeur ou de l'adaptateur, invalide le fichier entier : aucun résultat
//! partiel n'est produit pour ce format, à la différence de GMI et KOF.

pub mod decoder;

pub use decoder::{DotDecoder, SosiDecoder, SosiDump};

use std::collections::HashMap;
use std::sync::OnceLock;

use geojson::{feature::Id, FeatureCollection, Value as GeoValue};
use regex::Regex;
use tracing::{debug, warn};

use crate::normalize::{coerce_value, min_coordinates, normalize, RawCoordinate};
use crate::types::{FeatureId, FeatureKind, FormatKind, ParseResult, Value};
use crate::VaError;

/// Attribut portant le nom de type verbeux
pub const TYPE_NAME_FIELD: &str = "OBJTYPE";

/// Attribut recevant le code fonction déduit
pub const FUNCTION_CODE_FIELD: &str = "FCODE";

/// Règles ordonnées nom de type -> code fonction.
/// Toutes les sous-chaînes d'une règle doivent être présentes.
const FUNCTION_CODE_RULES: &[(&[&str], &str)] = &[
    (&["SPILLVANN", "TRYKK"], "SPP"),
    (&["SPILLVANN", "PUMPE"], "SPP"),
    (&["SPILLVANN"], "SP"),
    (&["OVERVANN"], "OV"),
    (&["FELLES"], "AF"),
    (&["AVLOEP"], "AF"),
    (&["DREN"], "DR"),
    (&["VANN"], "VL"),
    (&["KUM"], "KUM"),
    (&["SLUK"], "SLU"),
];

/// Parse un fichier SOSI (octets bruts ou texte) avec le décodeur par défaut
pub fn parse(input: impl AsRef<[u8]>) -> ParseResult {
    parse_with(&DotDecoder, input.as_ref())
}

/// Parse avec un décodeur fourni
pub fn parse_with<D: SosiDecoder + ?Sized>(decoder: &D, bytes: &[u8]) -> ParseResult {
    match adapt(decoder, bytes) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "SOSI adapter failed, discarding all features");
            ParseResult::failed(FormatKind::Sosi, e)
        }
    }
}

fn adapt<D: SosiDecoder + ?Sized>(decoder: &D, bytes: &[u8]) -> Result<ParseResult, VaError> {
    let SosiDump { header, collection } = decoder.decode(bytes)?;
    let mut result = ParseResult::new(FormatKind::Sosi);

    for (key, value) in &header {
        result.header.insert(key.clone(), coerce_value(value));
    }

    match crs_name(&collection).and_then(|name| epsg_from_crs_name(&name)) {
        Some(epsg) => {
            result.header.insert("EPSG".to_string(), Value::Int(i64::from(epsg)));
        }
        None => result.warn("no coordinate reference system found in SOSI header"),
    }

    for (index, feature) in collection.features.into_iter().enumerate() {
        let id = match feature.id {
            Some(Id::Number(n)) => n
                .as_i64()
                .map(FeatureId::Int)
                .unwrap_or_else(|| FeatureId::Str(n.to_string())),
            Some(Id::String(s)) => FeatureId::Str(s),
            None => FeatureId::Int(index as i64),
        };

        let geometry = feature
            .geometry
            .ok_or_else(|| VaError::Decode(format!("feature {} has no geometry", id)))?;

        let mut attributes: HashMap<String, Value> = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, json_to_value(v)))
            .collect();

        if !attributes.contains_key(FUNCTION_CODE_FIELD) {
            let code = attributes
                .get(TYPE_NAME_FIELD)
                .and_then(Value::as_str)
                .and_then(infer_function_code);
            if let Some(code) = code {
                attributes.insert(FUNCTION_CODE_FIELD.to_string(), Value::Str(code.to_string()));
            }
        }

        let (kind, positions) = match geometry.value {
            GeoValue::Point(p) => (FeatureKind::Point, vec![p]),
            GeoValue::LineString(ls) => (FeatureKind::Line, ls),
            // Simplification : seul l'anneau extérieur est gardé, comme une ligne
            GeoValue::Polygon(rings) => (
                FeatureKind::Line,
                rings.into_iter().next().unwrap_or_default(),
            ),
            other => {
                return Err(VaError::Decode(format!(
                    "feature {}: unsupported geometry type {}",
                    id,
                    geometry_name(&other)
                )))
            }
        };

        let feature = normalize(
            kind,
            positions.into_iter().map(RawCoordinate::Array),
            attributes,
            id,
            None,
            None,
        );

        if feature.coordinates.len() < min_coordinates(kind) {
            return Err(VaError::Decode(format!(
                "feature {}: {} usable coordinate(s)",
                feature.id,
                feature.coordinates.len()
            )));
        }

        result.push_feature(feature);
    }

    debug!(
        points = result.points.len(),
        lines = result.lines.len(),
        epsg = ?result.epsg(),
        "SOSI adapted"
    );

    Ok(result)
}

/// Nom du CRS déclaré dans le membre étranger `crs`
fn crs_name(collection: &FeatureCollection) -> Option<String> {
    collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Extrait un code EPSG d'un nom de CRS (`urn:ogc:def:crs:EPSG::25832`,
/// `EPSG:25833`, `EUREF89 UTM sone 32`)
pub fn epsg_from_crs_name(name: &str) -> Option<u32> {
    static EPSG_RE: OnceLock<Regex> = OnceLock::new();
    static UTM_RE: OnceLock<Regex> = OnceLock::new();

    let epsg_re = EPSG_RE.get_or_init(|| Regex::new(r"(?i)EPSG:{1,2}(\d{4,5})").expect("valid regex"));
    if let Some(caps) = epsg_re.captures(name) {
        return caps[1].parse().ok();
    }

    let utm_re = UTM_RE.get_or_init(|| {
        Regex::new(r"(?i)UTM[\s_-]*(?:sone|zone)?[\s_-]*(3[1-6])").expect("valid regex")
    });
    utm_re
        .captures(name)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .map(|zone| 25800 + zone)
}

/// Majuscules et remplacement des lettres norvégiennes par leurs digrammes ASCII
pub fn normalize_type_name(name: &str) -> String {
    name.to_uppercase()
        .replace('Æ', "AE")
        .replace('Ø', "OE")
        .replace('Å', "AA")
}

/// Déduit le code fonction court d'un nom de type verbeux
pub fn infer_function_code(type_name: &str) -> Option<&'static str> {
    let normalized = normalize_type_name(type_name);
    FUNCTION_CODE_RULES
        .iter()
        .find(|(needles, _)| needles.iter().all(|n| normalized.contains(n)))
        .map(|(_, code)| *code)
}

fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Str(s),
        other => Value::Str(other.to_string()),
    }
}

fn geometry_name(value: &GeoValue) -> &'static str {
    match value {
        GeoValue::Point(_) => "Point",
        GeoValue::MultiPoint(_) => "MultiPoint",
        GeoValue::LineString(_) => "LineString",
        GeoValue::MultiLineString(_) => "MultiLineString",
        GeoValue::Polygon(_) => "Polygon",
        GeoValue::MultiPolygon(_) => "MultiPolygon",
        GeoValue::GeometryCollection(_) => "GeometryCollection",
    }
}
