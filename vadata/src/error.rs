//! Types d'erreurs pour le crate vadata

use serde::Serialize;
use thiserror::Error;

/// Erreurs pouvant survenir lors du parsing d'un export
#[derive(Debug, Error)]
pub enum VaError {
    /// Erreur d'I/O lors de la lecture du fichier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fichier structurellement irrécupérable (signature, sections manquantes)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Erreur de parsing à une ligne donnée
    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Erreur du décodeur structurel (SOSI)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Format non reconnu
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl VaError {
    /// Crée une erreur de parsing avec contexte
    pub fn parse_error(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Catégorie exposée dans `ParseResult.errors`
    pub fn kind(&self) -> IssueKind {
        match self {
            Self::Validation(_) | Self::UnsupportedFormat(_) => IssueKind::Validation,
            Self::Parse { .. } => IssueKind::Parse,
            Self::Io(_) | Self::Decode(_) => IssueKind::Decode,
        }
    }
}

/// Catégorie d'une erreur enregistrée dans un résultat de parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    /// Erreur fatale, aucune extraction
    Validation,
    /// Erreur en cours de parsing, résultat partiel conservé
    Parse,
    /// Échec du décodeur
    Decode,
}

/// Erreur sérialisable attachée à un `ParseResult`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl From<VaError> for ParseIssue {
    fn from(err: VaError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_from_error() {
        let issue = ParseIssue::from(VaError::parse_error(12, "bad object id"));
        assert_eq!(issue.kind, IssueKind::Parse);
        assert!(issue.message.contains("line 12"));
        assert!(issue.message.contains("bad object id"));
    }

    #[test]
    fn test_unsupported_is_validation() {
        let err = VaError::UnsupportedFormat("foo.txt".into());
        assert_eq!(err.kind(), IssueKind::Validation);
    }
}
