use serde_json::Value;
use sha2::{Digest, Sha512};

use super::path::{resolve_str, PATH_SEPARATOR};
use super::{value_as_string, Document, ID_FIELD};
use crate::error::MappingError;

/// Trennzeichen für zusammengesetzte Source-Key Spezifikationen
pub const COMPOSITE_SEPARATOR: char = ',';

/// Diskriminator-Feld für synthetische Keys
pub const DISCRIMINATOR_FIELD: &str = "key";

/// Diskriminator-Suffixe in fester Reihenfolge (first match wins)
const DISCRIMINATOR_PREFIXES: [(&str, &str); 3] =
    [("tenants", "tn-"), ("subprojects", "sp-"), ("apps", "ap-")];

/// Partition-Key Strategie eines Jobs, einmal berechnet und pro Batch wiederverwendet
#[derive(Debug, Clone, PartialEq)]
pub enum KeyMapping {
    /// Source oder Destination nicht gesetzt: Dokument bleibt unverändert
    Passthrough,
    /// Feld direkt per Name kopieren
    Field { source: String, destination: String },
    /// Wert über verschachtelten Pfad auflösen
    Nested { path: String, destination: String },
    /// Synthetischen Key aus mehreren Feldern ableiten
    Composite { destination: String },
}

impl KeyMapping {
    /// Bestimme die Strategie aus den Job-Spezifikationen
    pub fn from_specs(source: Option<&str>, destination: Option<&str>) -> Self {
        let source = source.map(str::trim).filter(|s| !s.is_empty());
        let destination = destination.map(str::trim).filter(|s| !s.is_empty());

        let (Some(source), Some(destination)) = (source, destination) else {
            return KeyMapping::Passthrough;
        };
        let destination = destination.to_string();

        if source.contains(COMPOSITE_SEPARATOR) {
            KeyMapping::Composite { destination }
        } else if source.contains(PATH_SEPARATOR) {
            KeyMapping::Nested {
                path: source.to_string(),
                destination,
            }
        } else {
            KeyMapping::Field {
                source: source.to_string(),
                destination,
            }
        }
    }

    /// Setze das Destination-Feld im selben Dokument (keine neue Identität)
    pub fn apply(&self, doc: &mut Document) -> Result<(), MappingError> {
        match self {
            KeyMapping::Passthrough => Ok(()),
            KeyMapping::Field {
                source,
                destination,
            } => {
                let value = doc
                    .get(source)
                    .cloned()
                    .ok_or_else(|| MappingError::PathNotFound {
                        path: source.clone(),
                    })?;
                doc.set(destination.clone(), value);
                Ok(())
            }
            KeyMapping::Nested { path, destination } => {
                let value = resolve_str(doc, path)?;
                doc.set(destination.clone(), Value::String(value));
                Ok(())
            }
            KeyMapping::Composite { destination } => {
                let value = synthetic_key(doc)?;
                doc.set(destination.clone(), Value::String(value));
                Ok(())
            }
        }
    }
}

/// Leite den synthetischen Partition-Key aus dem Diskriminator ab
pub fn synthetic_key(doc: &Document) -> Result<String, MappingError> {
    let discriminator = doc
        .get(DISCRIMINATOR_FIELD)
        .map(value_as_string)
        .ok_or_else(|| missing(DISCRIMINATOR_FIELD))?;

    for (suffix, prefix) in DISCRIMINATOR_PREFIXES {
        if discriminator.ends_with(suffix) {
            let id = doc.id().ok_or_else(|| missing(ID_FIELD))?;
            return Ok(format!("{prefix}{id}"));
        }
    }

    // Generisches Daten-Dokument
    let tenant = required(doc, "data/tenant")?;
    let subproject = required(doc, "data/subproject")?;
    let path = required(doc, "data/path")?;
    let name = required(doc, "data/name")?;

    Ok(format!(
        "ds-{tenant}-{subproject}-{}",
        digest_hex(&format!("{path}{name}"))
    ))
}

/// SHA-512 über UTF-8 Bytes, lowercase hex ohne Trennzeichen
pub fn digest_hex(input: &str) -> String {
    hex::encode(Sha512::digest(input.as_bytes()))
}

fn required(doc: &Document, path: &str) -> Result<String, MappingError> {
    resolve_str(doc, path).map_err(|err| match err {
        MappingError::PathNotFound { .. } => missing(path),
        other => other,
    })
}

fn missing(field: &str) -> MappingError {
    MappingError::MissingRequiredField {
        field: field.to_string(),
    }
}
