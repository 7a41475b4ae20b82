//! Détection du format et décodage des octets bruts

use std::borrow::Cow;
use std::path::Path;

use memchr::memmem;

use crate::parser::{gmi, kof, sosi};
use crate::types::{FormatKind, ParseResult};
use crate::VaError;

/// Taille de la fenêtre inspectée pour le sniffing
const SNIFF_WINDOW: usize = 4096;

/// Détecte le format par extension, puis par contenu
pub fn detect_format(file_name: &str, bytes: &[u8]) -> FormatKind {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "gmi" => return FormatKind::Gmi,
        "sos" | "sosi" => return FormatKind::Sosi,
        "kof" => return FormatKind::Kof,
        _ => {}
    }

    sniff(bytes)
}

/// Détection par contenu : signature GMI, mot-clé `.HODE`, code d'opération KOF
pub fn sniff(bytes: &[u8]) -> FormatKind {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];

    if memmem::find(window, gmi::SIGNATURE.as_bytes()).is_some() {
        return FormatKind::Gmi;
    }
    if memmem::find(window, b".HODE").is_some() {
        return FormatKind::Sosi;
    }

    let first_token = window
        .split(|&b| b == b'\n')
        .map(|line| line.trim_ascii())
        .find(|line| !line.is_empty())
        .and_then(|line| line.split(|b| b.is_ascii_whitespace()).next());

    match first_token {
        Some(t) if t.len() == 2 && t.iter().all(u8::is_ascii_digit) => FormatKind::Kof,
        _ => FormatKind::Unknown,
    }
}

/// Décode un texte 8 bits : UTF-8 s'il est valide, Latin sinon
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let text = match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0,
    };
    match text {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim_start_matches('\u{feff}')),
        Cow::Owned(s) => Cow::Owned(s.trim_start_matches('\u{feff}').to_string()),
    }
}

/// Détecte le format et parse le contenu
pub fn parse_bytes(file_name: &str, bytes: &[u8]) -> ParseResult {
    match detect_format(file_name, bytes) {
        FormatKind::Gmi => gmi::parse(&decode_text(bytes)),
        FormatKind::Kof => kof::parse(&decode_text(bytes)),
        // SOSI : octets bruts, le décodeur honore ..TEGNSETT
        FormatKind::Sosi => sosi::parse(bytes),
        FormatKind::Unknown => ParseResult::failed(
            FormatKind::Unknown,
            VaError::UnsupportedFormat(file_name.to_string()),
        ),
    }
}

/// Lit un fichier et le parse
pub fn parse_file(path: &Path) -> Result<ParseResult, VaError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    Ok(parse_bytes(name, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect_format("ledninger.GMI", b""), FormatKind::Gmi);
        assert_eq!(detect_format("data.sos", b""), FormatKind::Sosi);
        assert_eq!(detect_format("data.sosi", b""), FormatKind::Sosi);
        assert_eq!(detect_format("survey.kof", b""), FormatKind::Kof);
    }

    #[test]
    fn test_detect_by_content() {
        assert_eq!(detect_format("export.txt", b"GMIFILE_ASCII\n[HEADER]\n"), FormatKind::Gmi);
        assert_eq!(detect_format("export.txt", b".HODE\n..TEGNSETT UTF-8\n"), FormatKind::Sosi);
        assert_eq!(detect_format("export.txt", b"\n 05 1 6640000.0 598000.0\n"), FormatKind::Kof);
        assert_eq!(detect_format("export.txt", b"hello"), FormatKind::Unknown);
    }

    #[test]
    fn test_decode_latin_fallback() {
        assert_eq!(decode_text(b"S\xf8rli"), "Sørli");
        assert_eq!(decode_text("Sørli".as_bytes()), "Sørli");
        assert_eq!(decode_text(b"\xef\xbb\xbfGMI"), "GMI");
    }

    #[test]
    fn test_unknown_format_is_validation_error() {
        let result = parse_bytes("notes.txt", b"nothing here");
        assert_eq!(result.format, FormatKind::Unknown);
        assert_eq!(result.errors.len(), 1);
    }
}
