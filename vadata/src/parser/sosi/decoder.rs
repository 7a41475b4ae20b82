//! Décodeur structurel SOSI (grammaire à points)
//!
//! Produit un `geojson::FeatureCollection` à partir des groupes `.PUNKT`,
//! `.KURVE`, `.BUEP` et `.FLATE`. Les coordonnées `..NØ` / `..NØH` sont des
//! entiers mis à l'échelle par `...ENHET` et décalés par `...ORIGO-NØ`.

use std::collections::HashMap;

use encoding_rs::Encoding;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use memchr::memmem;
use serde_json::json;
use tracing::debug;

use crate::VaError;

/// Sortie du décodeur
#[derive(Debug, Clone)]
pub struct SosiDump {
    /// Champs de `.HODE` (clé sans points -> valeur brute)
    pub header: HashMap<String, String>,

    /// Features, avec le nom du CRS dans le membre étranger `crs`
    pub collection: FeatureCollection,
}

/// Décodeur SOSI externe, remplaçable
pub trait SosiDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<SosiDump, VaError>;
}

/// Implémentation par défaut de la grammaire à points
#[derive(Debug, Default, Clone, Copy)]
pub struct DotDecoder;

impl SosiDecoder for DotDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<SosiDump, VaError> {
        let encoding = detect_charset(bytes);
        let (text, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            debug!(encoding = encoding.name(), "SOSI decoded with replacement characters");
        }
        decode_text(&text)
    }
}

/// Mapping KOORDSYS SOSI -> EPSG
const KOORDSYS: &[(u32, u32)] = &[
    (21, 25831),
    (22, 25832),
    (23, 25833),
    (24, 25834),
    (25, 25835),
    (26, 25836),
    (84, 4326),
];

pub fn koordsys_to_epsg(code: u32) -> Option<u32> {
    KOORDSYS.iter().find(|(k, _)| *k == code).map(|(_, e)| *e)
}

/// Lit la directive `..TEGNSETT` pour choisir l'encodage
fn detect_charset(data: &[u8]) -> &'static Encoding {
    let finder = memmem::Finder::new(b"..TEGNSETT");

    if let Some(pos) = finder.find(data) {
        let start = pos + b"..TEGNSETT".len();
        let end = data[start..]
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .map(|p| start + p)
            .unwrap_or(data.len());

        let cset = std::str::from_utf8(&data[start..end]).unwrap_or("").trim();
        return charset_to_encoding(cset);
    }

    if simdutf8::basic::from_utf8(data).is_ok() {
        encoding_rs::UTF_8
    } else {
        encoding_rs::WINDOWS_1252
    }
}

fn charset_to_encoding(cset: &str) -> &'static Encoding {
    match cset.to_uppercase().replace(['-', ' '], "").as_str() {
        "UTF8" => encoding_rs::UTF_8,
        "ISO885910" => encoding_rs::ISO_8859_10,
        "ISO88591" | "ANSI" => encoding_rs::WINDOWS_1252,
        _ => encoding_rs::WINDOWS_1252,
    }
}

/// Type de groupe SOSI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Head,
    Point,
    Curve,
    Surface,
    Other,
}

fn group_kind(name: &str) -> GroupKind {
    match name {
        "HODE" => GroupKind::Head,
        "PUNKT" | "SYMBOL" | "TEKST" => GroupKind::Point,
        "KURVE" | "LINJE" | "BUEP" | "BUE" => GroupKind::Curve,
        "FLATE" => GroupKind::Surface,
        _ => GroupKind::Other,
    }
}

/// Mode de lecture des lignes sans point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Coords,
    Refs,
}

#[derive(Debug)]
struct Group {
    kind: GroupKind,
    id: i64,
    attributes: JsonObject,
    raw: Vec<f64>,
    with_h: bool,
    refs: Vec<i64>,
}

/// Paramètres de transformation des coordonnées entières
#[derive(Debug, Clone, Copy)]
struct Transform {
    unit: f64,
    unit_h: Option<f64>,
    origin_n: f64,
    origin_e: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            unit: 1.0,
            unit_h: None,
            origin_n: 0.0,
            origin_e: 0.0,
        }
    }
}

/// Décode un texte SOSI déjà converti en UTF-8
pub fn decode_text(text: &str) -> Result<SosiDump, VaError> {
    let mut header = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    let mut current: Option<Group> = None;
    let mut mode = Mode::None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        let dots = line.bytes().take_while(|&b| b == b'.').count();

        if dots == 0 {
            if let Some(group) = current.as_mut() {
                push_tokens(group, mode, line, line_no)?;
            }
            continue;
        }

        let (keyword, rest) = split_keyword(&line[dots..]);

        if dots == 1 {
            if let Some(group) = current.take() {
                groups.push(group);
            }
            mode = Mode::None;
            if keyword == "SLUTT" {
                break;
            }
            let id = rest.trim_end_matches(':').trim().parse::<i64>().unwrap_or(0);
            current = Some(Group {
                kind: group_kind(keyword),
                id,
                attributes: JsonObject::new(),
                raw: Vec::new(),
                with_h: false,
                refs: Vec::new(),
            });
            continue;
        }

        let Some(group) = current.as_mut() else {
            continue;
        };

        if group.kind == GroupKind::Head {
            header.insert(keyword.to_string(), unquote(rest).to_string());
            continue;
        }

        match keyword {
            "NØ" | "NØH" => {
                let with_h = keyword == "NØH";
                if !group.raw.is_empty() && group.with_h != with_h {
                    return Err(VaError::Decode(format!(
                        "line {}: mixed NØ/NØH coordinates in group {}",
                        line_no, group.id
                    )));
                }
                group.with_h = with_h;
                mode = Mode::Coords;
                push_tokens(group, mode, rest, line_no)?;
            }
            "REF" => {
                mode = Mode::Refs;
                push_tokens(group, mode, rest, line_no)?;
            }
            _ => {
                mode = Mode::None;
                group
                    .attributes
                    .insert(keyword.to_string(), parse_scalar(rest));
            }
        }
    }

    if let Some(group) = current.take() {
        groups.push(group);
    }

    let transform = read_transform(&header);
    let crs_name = header
        .get("KOORDSYS")
        .and_then(|k| k.parse::<u32>().ok())
        .and_then(koordsys_to_epsg)
        .map(|epsg| format!("urn:ogc:def:crs:EPSG::{}", epsg));

    let curves: HashMap<i64, Vec<Vec<f64>>> = groups
        .iter()
        .filter(|g| g.kind == GroupKind::Curve)
        .map(|g| Ok((g.id, positions(g, &transform)?)))
        .collect::<Result<_, VaError>>()?;

    let mut features = Vec::new();
    for group in &groups {
        if matches!(group.kind, GroupKind::Head | GroupKind::Other) {
            continue;
        }
        let geometry = build_geometry(group, &transform, &curves)?;
        features.push(Feature {
            bbox: None,
            geometry: geometry.map(Geometry::new),
            id: Some(Id::Number(group.id.into())),
            properties: Some(group.attributes.clone()),
            foreign_members: None,
        });
    }

    let foreign_members = crs_name.map(|name| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            json!({"type": "name", "properties": {"name": name}}),
        );
        members
    });

    debug!(features = features.len(), "SOSI decoded");

    Ok(SosiDump {
        header,
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        },
    })
}

fn strip_comment(line: &str) -> &str {
    if line.contains('"') {
        return line;
    }
    line.split_once('!').map_or(line, |(before, _)| before)
}

fn split_keyword(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((k, rest)) => (k, rest.trim()),
        None => (s, ""),
    }
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

fn parse_scalar(raw: &str) -> serde_json::Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return serde_json::Value::Null;
    }
    if raw.starts_with('"') {
        return serde_json::Value::String(unquote(raw).to_string());
    }
    if let Ok(v) = raw.parse::<i64>() {
        return json!(v);
    }
    if let Ok(v) = raw.parse::<f64>() {
        if v.is_finite() {
            return json!(v);
        }
    }
    serde_json::Value::String(raw.to_string())
}

fn push_tokens(group: &mut Group, mode: Mode, line: &str, line_no: usize) -> Result<(), VaError> {
    match mode {
        Mode::None => Ok(()),
        Mode::Coords => {
            for token in line.split_whitespace() {
                // "...KP 1" et autres suffixes terminent la liste
                if token.starts_with('.') {
                    break;
                }
                let value = fast_float::parse::<f64, _>(token).map_err(|_| {
                    VaError::Decode(format!("line {}: invalid coordinate token '{}'", line_no, token))
                })?;
                group.raw.push(value);
            }
            Ok(())
        }
        Mode::Refs => {
            for token in line.split_whitespace() {
                // Les anneaux intérieurs sont entre parenthèses, seul l'extérieur est gardé
                if token.starts_with('(') {
                    break;
                }
                if let Ok(id) = token.trim_start_matches(':').parse::<i64>() {
                    group.refs.push(id);
                } else if let Some(id) = token.strip_prefix("-:").and_then(|t| t.parse::<i64>().ok()) {
                    group.refs.push(-id);
                }
            }
            Ok(())
        }
    }
}

fn read_transform(header: &HashMap<String, String>) -> Transform {
    let mut transform = Transform::default();
    if let Some(unit) = header.get("ENHET").and_then(|v| v.parse::<f64>().ok()) {
        transform.unit = unit;
    }
    transform.unit_h = header.get("ENHET-H").and_then(|v| v.parse::<f64>().ok());
    if let Some(origin) = header.get("ORIGO-NØ") {
        let mut parts = origin.split_whitespace().filter_map(|p| p.parse::<f64>().ok());
        transform.origin_n = parts.next().unwrap_or(0.0);
        transform.origin_e = parts.next().unwrap_or(0.0);
    }
    transform
}

/// Positions GeoJSON `[E, N, H?]` d'un groupe
fn positions(group: &Group, transform: &Transform) -> Result<Vec<Vec<f64>>, VaError> {
    let stride = if group.with_h { 3 } else { 2 };
    if group.raw.len() % stride != 0 {
        return Err(VaError::Decode(format!(
            "group {}: {} coordinate values is not a multiple of {}",
            group.id,
            group.raw.len(),
            stride
        )));
    }

    let constant_h = group.attributes.get("HØYDE").and_then(serde_json::Value::as_f64);
    let unit_h = transform.unit_h.unwrap_or(transform.unit);

    Ok(group
        .raw
        .chunks(stride)
        .map(|c| {
            let n = transform.origin_n + c[0] * transform.unit;
            let e = transform.origin_e + c[1] * transform.unit;
            match (c.get(2), constant_h) {
                (Some(h), _) => vec![e, n, h * unit_h],
                (None, Some(h)) => vec![e, n, h],
                (None, None) => vec![e, n],
            }
        })
        .collect())
}

fn build_geometry(
    group: &Group,
    transform: &Transform,
    curves: &HashMap<i64, Vec<Vec<f64>>>,
) -> Result<Option<GeoValue>, VaError> {
    let coords = positions(group, transform)?;

    let geometry = match group.kind {
        GroupKind::Point => coords.into_iter().next().map(GeoValue::Point),
        GroupKind::Curve => (!coords.is_empty()).then_some(GeoValue::LineString(coords)),
        GroupKind::Surface => {
            // ..NØ d'une FLATE référencée est son point de représentation
            let mut ring = if group.refs.is_empty() {
                coords
            } else {
                resolve_refs(&group.refs, curves)
            };
            if ring.len() < 3 {
                None
            } else {
                if ring.first() != ring.last() {
                    let first = ring[0].clone();
                    ring.push(first);
                }
                Some(GeoValue::Polygon(vec![ring]))
            }
        }
        GroupKind::Head | GroupKind::Other => None,
    };

    Ok(geometry)
}

/// Concatène les courbes référencées (id négatif = sens inverse)
fn resolve_refs(refs: &[i64], curves: &HashMap<i64, Vec<Vec<f64>>>) -> Vec<Vec<f64>> {
    let mut ring: Vec<Vec<f64>> = Vec::new();
    for &r in refs {
        let Some(curve) = curves.get(&r.abs()) else {
            continue;
        };
        let mut part = curve.clone();
        if r < 0 {
            part.reverse();
        }
        // Évite de dupliquer le nœud partagé
        if ring.last().is_some() && ring.last() == part.first() {
            part.remove(0);
        }
        ring.extend(part);
    }
    ring
}
