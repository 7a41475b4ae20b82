//! Parser pour le format ASCII propriétaire GMI
//!
//! Le fichier est lu une seule fois, de gauche à droite, par un curseur unique
//! sur une suite de lignes classifiées. Chaque section dispose de son propre
//! sous-scanner qui s'arrête au marqueur de section suivant.
//!
//! ```text
//! GMIFILE_ASCII
//! [HEADER]
//! EPSG=25832
//! [LINE_FIELDS]
//! FieldNames=Id;FCODE;DIM
//! [LINES]
//! #OBJ 2
//! Values=2;SP;160
//! Coords
//! 598000.10 6640000.20 101.50
//! 598010.10 6640000.20 101.40
//! ```

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::normalize::coerce_value;
use crate::types::{Coordinate, Feature, FeatureId, FeatureKind, FormatKind, ParseResult, Value};
use crate::VaError;

/// Signature obligatoire (première ligne non vide)
pub const SIGNATURE: &str = "GMIFILE_ASCII";

const OBJECT_MARKER: &str = "#OBJ";
const FIELD_NAMES_DIRECTIVE: &str = "FieldNames";
const COORDS_DIRECTIVE: &str = "Coords";

/// Parser GMI avec mémorisation du premier résultat
#[derive(Debug)]
pub struct GmiParser {
    text: String,
    result: Option<ParseResult>,
}

impl GmiParser {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            result: None,
        }
    }

    /// Parse le texte. Les appels suivants renvoient le résultat mémorisé.
    pub fn parse(&mut self) -> &ParseResult {
        let text = &self.text;
        self.result.get_or_insert_with(|| run(text))
    }

    pub fn is_parsed(&self) -> bool {
        self.result.is_some()
    }

    /// Consomme le parser et renvoie le résultat
    pub fn into_result(mut self) -> ParseResult {
        self.parse();
        self.result.unwrap_or_else(|| ParseResult::new(FormatKind::Gmi))
    }
}

/// Parse un texte GMI. Ne panique jamais : toutes les erreurs sont dans le résultat.
pub fn parse(text: &str) -> ParseResult {
    run(text)
}

/// Ligne classifiée
#[derive(Debug, Clone, Copy, PartialEq)]
enum Line<'a> {
    Blank,
    Section(&'a str),
    Object(&'a str),
    Directive { key: &'a str, value: &'a str },
    Coords,
    Raw(&'a str),
}

fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line.starts_with('[') && line.ends_with(']') {
        return Line::Section(line[1..line.len() - 1].trim());
    }
    if let Some(rest) = line.strip_prefix(OBJECT_MARKER) {
        return Line::Object(rest.trim());
    }
    if line.eq_ignore_ascii_case(COORDS_DIRECTIVE) {
        return Line::Coords;
    }
    if let Some((key, value)) = line.split_once('=') {
        return Line::Directive {
            key: key.trim(),
            value: value.trim(),
        };
    }
    Line::Raw(line)
}

/// Curseur unique sur les lignes du fichier
struct Cursor<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().map(classify).collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Line<'a>> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    /// Numéro (1-based) de la dernière ligne consommée
    fn line_no(&self) -> usize {
        self.pos
    }

    fn at_section_end(&self) -> bool {
        matches!(self.peek(), None | Some(Line::Section(_)))
    }

    fn skip_section(&mut self) {
        while !self.at_section_end() {
            self.pos += 1;
        }
    }
}

/// Section connue du format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Fields(FeatureKind),
    Data(FeatureKind),
}

fn section_from_name(name: &str) -> Option<Section> {
    match name.to_ascii_uppercase().as_str() {
        "HEADER" => Some(Section::Header),
        "POINT_FIELDS" => Some(Section::Fields(FeatureKind::Point)),
        "LINE_FIELDS" => Some(Section::Fields(FeatureKind::Line)),
        "POINTS" => Some(Section::Data(FeatureKind::Point)),
        "LINES" => Some(Section::Data(FeatureKind::Line)),
        _ => None,
    }
}

/// Vérifie la signature et la présence d'au moins une section géométrique
fn validate(text: &str) -> Result<(), VaError> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty());
    if first != Some(SIGNATURE) {
        return Err(VaError::Validation(format!(
            "missing {} signature on first line",
            SIGNATURE
        )));
    }

    let has_geometry = text.lines().any(|l| {
        matches!(
            classify(l),
            Line::Section(name) if matches!(section_from_name(name), Some(Section::Data(_)))
        )
    });
    if !has_geometry {
        return Err(VaError::Validation(
            "no geometry sections ([POINTS] or [LINES]) found".to_string(),
        ));
    }

    Ok(())
}

fn run(text: &str) -> ParseResult {
    if let Err(e) = validate(text) {
        warn!(error = %e, "GMI validation failed");
        return ParseResult::failed(FormatKind::Gmi, e);
    }

    let mut state = ScanState::default();
    let mut result = ParseResult::new(FormatKind::Gmi);

    if let Err(e) = scan(&mut Cursor::new(text), &mut state, &mut result) {
        warn!(error = %e, "GMI parsing stopped, keeping partial result");
        result.push_error(e);
    }

    if result.feature_count() == 0 && !result.has_errors() {
        result.warn("geometry sections contain no valid point or line objects");
    }

    debug!(
        points = result.points.len(),
        lines = result.lines.len(),
        warnings = result.warnings.len(),
        "GMI parsed"
    );

    result
}

/// Dictionnaires de champs par type de géométrie
#[derive(Debug, Default)]
struct ScanState {
    point_fields: Option<Vec<String>>,
    line_fields: Option<Vec<String>>,
}

impl ScanState {
    fn fields(&self, kind: FeatureKind) -> Option<&[String]> {
        match kind {
            FeatureKind::Point => self.point_fields.as_deref(),
            FeatureKind::Line => self.line_fields.as_deref(),
        }
    }

    fn set_fields(&mut self, kind: FeatureKind, fields: Vec<String>) {
        match kind {
            FeatureKind::Point => self.point_fields = Some(fields),
            FeatureKind::Line => self.line_fields = Some(fields),
        }
    }
}

fn scan(cursor: &mut Cursor<'_>, state: &mut ScanState, result: &mut ParseResult) -> Result<(), VaError> {
    while let Some(line) = cursor.advance() {
        let Line::Section(name) = line else {
            // Signature et lignes hors section
            continue;
        };

        match section_from_name(name) {
            Some(Section::Header) => scan_header(cursor, result),
            Some(Section::Fields(kind)) => scan_fields(cursor, kind, name, state, result),
            Some(Section::Data(kind)) => scan_data(cursor, kind, state, result)?,
            None => {
                result.warn(format!("unknown section [{}] skipped", name));
                cursor.skip_section();
            }
        }
    }
    Ok(())
}

fn scan_header(cursor: &mut Cursor<'_>, result: &mut ParseResult) {
    while !cursor.at_section_end() {
        let Some(Line::Directive { key, value }) = cursor.advance() else {
            continue;
        };

        let value = if key.to_ascii_uppercase().contains("EPSG") {
            match value.parse::<i64>() {
                Ok(code) => Value::Int(code),
                Err(_) => {
                    result.warn(format!("header key {} is not an integer: {}", key, value));
                    Value::Str(value.to_string())
                }
            }
        } else {
            Value::Str(value.to_string())
        };

        result.header.insert(key.to_string(), value);
    }
}

fn scan_fields(
    cursor: &mut Cursor<'_>,
    kind: FeatureKind,
    section: &str,
    state: &mut ScanState,
    result: &mut ParseResult,
) {
    let mut found = false;
    while !cursor.at_section_end() {
        if let Some(Line::Directive { key, value }) = cursor.advance() {
            if key.eq_ignore_ascii_case(FIELD_NAMES_DIRECTIVE) {
                let names = value.split(';').map(|s| s.trim().to_string()).collect();
                state.set_fields(kind, names);
                found = true;
            }
        }
    }
    if !found {
        result.warn(format!("no {} directive in [{}]", FIELD_NAMES_DIRECTIVE, section));
    }
}

fn scan_data(
    cursor: &mut Cursor<'_>,
    kind: FeatureKind,
    state: &ScanState,
    result: &mut ParseResult,
) -> Result<(), VaError> {
    while !cursor.at_section_end() {
        match cursor.advance() {
            Some(Line::Blank) | None => {}
            Some(Line::Object(raw_id)) => {
                let id = raw_id.parse::<i64>().map_err(|_| {
                    VaError::parse_error(cursor.line_no(), format!("invalid object id '{}'", raw_id))
                })?;
                let object = scan_object(cursor, kind, id, state, result)?;
                if let Some(feature) = object.into_feature(kind, result) {
                    result.push_feature(feature);
                }
            }
            Some(_) => {
                result.warn(format!(
                    "line {}: unexpected content outside an object block",
                    cursor.line_no()
                ));
            }
        }
    }
    Ok(())
}

/// Objet en cours de construction
#[derive(Debug)]
struct ObjectBlock {
    id: i64,
    guid: Option<String>,
    extent: Option<String>,
    attributes: HashMap<String, Value>,
    coordinates: Vec<Coordinate>,
}

impl ObjectBlock {
    fn into_feature(self, kind: FeatureKind, result: &mut ParseResult) -> Option<Feature> {
        let mut coordinates = self.coordinates;
        match kind {
            FeatureKind::Point if coordinates.is_empty() => {
                result.warn(format!("point object {} has no coordinates, dropped", self.id));
                return None;
            }
            FeatureKind::Point if coordinates.len() > 1 => {
                result.warn(format!(
                    "point object {} has {} coordinates, keeping the first",
                    self.id,
                    coordinates.len()
                ));
                coordinates.truncate(1);
            }
            FeatureKind::Line if coordinates.len() < 2 => {
                result.warn(format!(
                    "line object {} has {} coordinate(s), dropped",
                    self.id,
                    coordinates.len()
                ));
                return None;
            }
            _ => {}
        }

        Some(Feature {
            id: FeatureId::Int(self.id),
            kind,
            coordinates,
            attributes: self.attributes,
            guid: self.guid,
            extent: self.extent,
        })
    }
}

fn scan_object(
    cursor: &mut Cursor<'_>,
    kind: FeatureKind,
    id: i64,
    state: &ScanState,
    result: &mut ParseResult,
) -> Result<ObjectBlock, VaError> {
    let mut object = ObjectBlock {
        id,
        guid: None,
        extent: None,
        attributes: HashMap::new(),
        coordinates: Vec::new(),
    };

    // Propriétés jusqu'à la directive Coords
    loop {
        match cursor.peek() {
            None | Some(Line::Section(_)) | Some(Line::Object(_)) => return Ok(object),
            Some(Line::Coords) => {
                cursor.advance();
                break;
            }
            Some(Line::Directive { key, value }) => {
                cursor.advance();
                match key.to_ascii_lowercase().as_str() {
                    "extent" => object.extent = Some(value.to_string()),
                    "guid" => object.guid = Some(value.to_string()),
                    "values" => {
                        let fields = state.fields(kind).ok_or_else(|| {
                            VaError::parse_error(
                                cursor.line_no(),
                                format!("attribute values for object {} before field definitions", id),
                            )
                        })?;
                        object.attributes = map_values(fields, value, id, result);
                    }
                    _ => debug!(object_id = id, key, "ignored object property"),
                }
            }
            Some(_) => {
                cursor.advance();
            }
        }
    }

    // Coordonnées jusqu'à une ligne vide ou un marqueur
    while let Some(Line::Raw(raw)) = cursor.peek() {
        cursor.advance();
        match parse_coordinate_line(raw) {
            Some(coord) => object.coordinates.push(coord),
            None => result.warn(format!(
                "line {}: unparseable coordinate line '{}' in object {}",
                cursor.line_no(),
                raw,
                id
            )),
        }
    }

    Ok(object)
}

/// Associe les valeurs brutes au dictionnaire de champs par position
fn map_values(
    fields: &[String],
    raw: &str,
    object_id: i64,
    result: &mut ParseResult,
) -> HashMap<String, Value> {
    let values: Vec<&str> = raw.split(';').collect();
    if values.len() != fields.len() {
        result.warn(format!(
            "object {}: {} values for {} fields",
            object_id,
            values.len(),
            fields.len()
        ));
    }

    fields
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let value = values.get(i).map_or(Value::Null, |v| coerce_value(v));
            (name.clone(), value)
        })
        .collect()
}

/// Ligne `x y [z]` séparée par des espaces. `z` absent reste absent.
fn parse_coordinate_line(raw: &str) -> Option<Coordinate> {
    let values = raw
        .split_whitespace()
        .map(|t| fast_float::parse::<f64, _>(t).ok())
        .collect::<Option<Vec<f64>>>()?;

    let (&x, &y) = (values.first()?, values.get(1)?);
    if !x.is_finite() || !y.is_finite() {
        return None;
    }

    Some(Coordinate::new(x, y, values.get(2).copied()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IssueKind;

    const SAMPLE: &str = "GMIFILE_ASCII
[HEADER]
Version=1.2
EPSG=25832
Project=Storgata
[POINT_FIELDS]
FieldNames=Id;FCODE;DIM
[LINE_FIELDS]
FieldNames=Id;FCODE;DIM;MATERIAL
[POINTS]
#OBJ 1
Guid={0A1B}
Values=1;KUM;600
Coords
598000.10 6640000.20 101.50

[LINES]
#OBJ 2
Extent=598000 6640000 598020 6640000
Values=2;SP;160;PVC
Coords
598000.10 6640000.20 101.50
598010.10 6640000.20 101.40
598020.10 6640000.20

#OBJ 3
Values=3;VL;110;PE
Coords
598000.00 6640010.00 102.00
598030.00 6640010.00 101.00
";

    #[test]
    fn test_parse_sample() {
        let result = parse(SAMPLE);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.epsg(), Some(25832));
        assert_eq!(result.header.get("Project"), Some(&Value::Str("Storgata".into())));

        let point = &result.points[0];
        assert_eq!(point.id, FeatureId::Int(1));
        assert_eq!(point.guid.as_deref(), Some("{0A1B}"));
        assert_eq!(point.attributes.get("DIM"), Some(&Value::Int(600)));

        let line = &result.lines[0];
        assert_eq!(line.coordinates.len(), 3);
        assert_eq!(line.coordinates[2].z, None);
        assert_eq!(line.attributes.get("MATERIAL"), Some(&Value::Str("PVC".into())));
        assert!(line.extent.is_some());
    }

    #[test]
    fn test_missing_signature_is_fatal() {
        let text = SAMPLE.replacen("GMIFILE_ASCII", "SOMETHING_ELSE", 1);
        let result = parse(&text);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, IssueKind::Validation);
        assert!(result.points.is_empty());
        assert!(result.lines.is_empty());
    }

    #[test]
    fn test_no_geometry_sections_is_fatal() {
        let result = parse("GMIFILE_ASCII\n[HEADER]\nEPSG=25833\n");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, IssueKind::Validation);
    }

    #[test]
    fn test_field_count_mismatch_warns() {
        let text = "GMIFILE_ASCII
[LINE_FIELDS]
FieldNames=Id;FCODE;DIM
[LINES]
#OBJ 7
Values=7;SP
Coords
0.0 0.0 1.0
1.0 0.0 0.5
#OBJ 8
Values=8;OV;250;extra
Coords
0.0 1.0 1.0
1.0 1.0 0.5
";
        let result = parse(text);
        assert!(result.errors.is_empty());
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.lines[0].attributes.get("DIM"), Some(&Value::Null));
        assert_eq!(result.lines[1].attributes.len(), 3);
    }

    #[test]
    fn test_partial_result_kept_on_parse_error() {
        let text = "GMIFILE_ASCII
[LINE_FIELDS]
FieldNames=Id
[LINES]
#OBJ 1
Values=1
Coords
0.0 0.0 1.0
1.0 0.0 0.5

#OBJ abc
Values=2
";
        let result = parse(text);
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, IssueKind::Parse);
    }

    #[test]
    fn test_values_before_field_definitions_stop_parsing() {
        let text = "GMIFILE_ASCII
[POINTS]
#OBJ 1
Values=1;KUM
Coords
1.0 2.0 3.0
";
        let result = parse(text);
        assert!(result.points.is_empty());
        assert_eq!(result.errors[0].kind, IssueKind::Parse);
    }

    #[test]
    fn test_unparseable_coordinate_line_is_warning() {
        let text = "GMIFILE_ASCII
[LINES]
#OBJ 1
Coords
0.0 0.0 1.0
abc def
2.0 0.0 0.5
";
        let result = parse(text);
        assert!(result.errors.is_empty());
        assert_eq!(result.lines[0].coordinates.len(), 2);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_empty_geometry_sections_explain_absence() {
        let result = parse("GMIFILE_ASCII\n[POINTS]\n[LINES]\n");
        assert_eq!(result.feature_count(), 0);
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_parser_caches_first_result() {
        let mut parser = GmiParser::new(SAMPLE);
        assert!(!parser.is_parsed());
        let first = parser.parse() as *const ParseResult;
        assert!(parser.is_parsed());
        let second = parser.parse() as *const ParseResult;
        assert_eq!(first, second);
        assert_eq!(parser.into_result().lines.len(), 2);
    }

    #[test]
    fn test_epsg_from_prefixed_header_key() {
        let text = SAMPLE.replacen("EPSG=25832", "EPSG_CODE=25832", 1);
        let result = parse(&text);
        assert_eq!(result.header.get("EPSG_CODE"), Some(&Value::Int(25832)));
        assert_eq!(result.epsg(), Some(25832));
    }

    #[test]
    fn test_unknown_section_is_skipped_with_warning() {
        let text = SAMPLE.replacen(
            "[POINT_FIELDS]",
            "[SYMBOLS]\nStyle=KUM;circle\n598000.0 6640000.0 1.0\n[POINT_FIELDS]",
            1,
        );
        let result = parse(&text);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("SYMBOLS"));
        assert_eq!(result.points.len(), 1);
        assert_eq!(result.lines.len(), 2);
    }

    #[test]
    fn test_point_with_extra_coordinates_keeps_first() {
        let text = "GMIFILE_ASCII
[POINT_FIELDS]
FieldNames=Id;FCODE
[POINTS]
#OBJ 4
Values=4;KUM
Coords
10.0 20.0 3.0
11.0 21.0 4.0
";
        let result = parse(text);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.points.len(), 1);
        assert_eq!(
            result.points[0].coordinates,
            vec![Coordinate::new(10.0, 20.0, Some(3.0))]
        );
    }

    #[test]
    fn test_parse_coordinate_line() {
        assert_eq!(
            parse_coordinate_line("1.5 2.5 3.5"),
            Some(Coordinate::new(1.5, 2.5, Some(3.5)))
        );
        assert_eq!(
            parse_coordinate_line("1.5\t2.5"),
            Some(Coordinate::new(1.5, 2.5, None))
        );
        assert_eq!(parse_coordinate_line("1.5"), None);
        assert_eq!(parse_coordinate_line("x 2.5"), None);
    }
}
