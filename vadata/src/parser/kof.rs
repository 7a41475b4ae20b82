//! Parser pour les listes de coordonnées KOF
//!
//! Une feature point par ligne exploitable. Pas de validation préalable :
//! une ligne sans deux valeurs ressemblant à des coordonnées est ignorée.

use std::collections::HashMap;

use tracing::debug;

use crate::normalize::{coerce_value, normalize, RawCoordinate};
use crate::types::{Feature, FeatureId, FeatureKind, FormatKind, ParseResult, Value};

/// Code d'opération de l'en-tête
const HEADER_OPCODE: &str = "00";

/// Seuil au-delà duquel une valeur est considérée comme un nord
const NORTHING_THRESHOLD: f64 = 5_000_000.0;

/// Codes de système de coordonnées KOF -> EPSG
const COORDINATE_SYSTEMS: &[(&str, u32)] = &[
    ("21", 25831),
    ("22", 25832),
    ("23", 25833),
    ("24", 25834),
    ("25", 25835),
    ("26", 25836),
];

/// EPSG supposé pour des coordonnées projetées sans en-tête
const DEFAULT_PROJECTED_EPSG: u32 = 25833;

pub fn coordinate_system_to_epsg(code: &str) -> Option<u32> {
    COORDINATE_SYSTEMS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, epsg)| *epsg)
}

/// Parse un texte KOF
pub fn parse(text: &str) -> ParseResult {
    let mut result = ParseResult::new(FormatKind::Kof);
    let mut system_code: Option<String> = None;
    let mut skipped = 0usize;

    for (idx, raw) in text.lines().enumerate() {
        let mut tokens = raw.split_whitespace();
        let Some(opcode) = tokens.next() else {
            continue;
        };

        if opcode == HEADER_OPCODE {
            let rest: Vec<&str> = tokens.collect();
            if let Some(code) = rest.iter().find(|t| coordinate_system_to_epsg(t).is_some()) {
                system_code = Some((*code).to_string());
            }
            result
                .header
                .insert("KOF_HEADER".to_string(), Value::Str(rest.join(" ")));
            continue;
        }

        match parse_point_line(opcode, tokens, idx + 1) {
            Some(feature) => result.points.push(feature),
            None => skipped += 1,
        }
    }

    resolve_epsg(&mut result, system_code.as_deref());

    debug!(points = result.points.len(), skipped, "KOF parsed");
    result
}

/// Un jeton ressemble à une coordonnée s'il contient un point décimal ou
/// dépasse 1000 en valeur absolue
fn coordinate_like(token: &str) -> Option<f64> {
    let value = fast_float::parse::<f64, _>(token).ok()?;
    (value.is_finite() && (token.contains('.') || value.abs() > 1000.0)).then_some(value)
}

/// Ordonne deux valeurs en (est, nord)
fn east_north(first: f64, second: f64) -> (f64, f64) {
    if first > NORTHING_THRESHOLD {
        (second, first)
    } else if second > NORTHING_THRESHOLD {
        (first, second)
    } else {
        // Ordre KOF usuel : nord puis est
        (second, first)
    }
}

fn parse_point_line<'a>(
    opcode: &str,
    tokens: impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Option<Feature> {
    let mut coords = Vec::new();
    let mut labels = Vec::new();

    for token in tokens {
        match coordinate_like(token) {
            Some(v) => coords.push(v),
            None => labels.push(token),
        }
    }

    if coords.len() < 2 {
        return None;
    }

    let (x, y) = east_north(coords[0], coords[1]);
    let z = coords.get(2).copied();

    let mut attributes = HashMap::new();
    attributes.insert("OPCODE".to_string(), Value::Str(opcode.to_string()));

    let id = match labels.first() {
        Some(label) => {
            attributes.insert("POINT_ID".to_string(), Value::Str((*label).to_string()));
            match label.parse::<i64>() {
                Ok(n) => FeatureId::Int(n),
                Err(_) => FeatureId::Str((*label).to_string()),
            }
        }
        None => FeatureId::Int(line_no as i64),
    };
    if let Some(code) = labels.get(1) {
        attributes.insert("CODE".to_string(), coerce_value(code));
    }

    let feature = normalize(
        FeatureKind::Point,
        [RawCoordinate::xyz(x, y, z)],
        attributes,
        id,
        None,
        None,
    );
    (!feature.coordinates.is_empty()).then_some(feature)
}

fn resolve_epsg(result: &mut ParseResult, system_code: Option<&str>) {
    if let Some(code) = system_code {
        result
            .header
            .insert("KOORDSYS".to_string(), Value::Str(code.to_string()));
        if let Some(epsg) = coordinate_system_to_epsg(code) {
            result.header.insert("EPSG".to_string(), Value::Int(i64::from(epsg)));
            return;
        }
    }

    let Some(first) = result.points.first().map(|p| p.coordinates[0]) else {
        return;
    };

    let guess = if first.x.abs() <= 180.0 && first.y.abs() <= 180.0 {
        4326
    } else {
        DEFAULT_PROJECTED_EPSG
    };
    result
        .header
        .insert("EPSG".to_string(), Value::Int(i64::from(guess)));
    result.warn(format!(
        "no coordinate system code in KOF header, guessed EPSG:{} from coordinate magnitude",
        guess
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;

    const SAMPLE: &str = " 00 Oppdrag 01012024 1 0301 22
 05 101 KUM 6640000.12 598000.34 101.50
 05 102 SLU 6640010.00 598005.00
 09_91
 05 103 6640020.00
";

    #[test]
    fn test_parse_sample() {
        let result = parse(SAMPLE);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.epsg(), Some(25832));
        assert_eq!(result.points.len(), 2);
        assert!(result.lines.is_empty());

        let first = &result.points[0];
        assert_eq!(first.id, FeatureId::Int(101));
        assert_eq!(first.coordinates[0], Coordinate::new(598000.34, 6640000.12, Some(101.5)));
        assert_eq!(first.attribute("CODE"), Some(&Value::Str("KUM".into())));

        // z absent => 0 (normalisation)
        assert_eq!(result.points[1].coordinates[0].z, Some(0.0));
    }

    #[test]
    fn test_axis_disambiguation() {
        // est avant nord
        assert_eq!(east_north(598000.0, 6640000.0), (598000.0, 6640000.0));
        // nord avant est
        assert_eq!(east_north(6640000.0, 598000.0), (598000.0, 6640000.0));
        // petites valeurs : ordre KOF (nord, est)
        assert_eq!(east_north(60.5, 10.7), (10.7, 60.5));
    }

    #[test]
    fn test_coordinate_like() {
        assert_eq!(coordinate_like("12.5"), Some(12.5));
        assert_eq!(coordinate_like("1500"), Some(1500.0));
        assert_eq!(coordinate_like("101"), None);
        assert_eq!(coordinate_like("KUM"), None);
    }

    #[test]
    fn test_epsg_guess_without_header() {
        let result = parse(" 05 1 6640000.0 598000.0 12.0\n");
        assert_eq!(result.epsg(), Some(25833));
        assert_eq!(result.warnings.len(), 1);

        let result = parse(" 05 1 59.91 10.75 12.0\n");
        assert_eq!(result.epsg(), Some(4326));
        assert_eq!(result.points[0].coordinates[0].x, 10.75);
    }

    #[test]
    fn test_coordinate_system_codes() {
        for (code, epsg) in [("21", 25831), ("24", 25834), ("25", 25835), ("26", 25836)] {
            let text = format!(
                " 00 Oppdrag 01012024 1 0301 {}\n 05 1 6640000.0 598000.0 12.0\n",
                code
            );
            let result = parse(&text);
            assert_eq!(result.epsg(), Some(epsg), "code {}", code);
            assert!(result.warnings.is_empty());
        }
        assert_eq!(coordinate_system_to_epsg("27"), None);
    }

    #[test]
    fn test_garbage_is_silently_skipped() {
        let result = parse("hello world\n\n 05 1 2 3\n");
        assert_eq!(result.feature_count(), 0);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }
}
