use std::fs;
use std::path::Path;

use pg_rules::RuleDocument;

/// Read a rule document file, pairing it with its identifier.
pub fn read_document(path: &Path, id: Option<String>) -> Result<(String, RuleDocument), String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let document = RuleDocument::from_json(&text)
        .map_err(|e| format!("Failed to parse '{}': {}", path.display(), e))?;

    let identifier = match id {
        Some(id) => id,
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| format!("Cannot derive an identifier from '{}'", path.display()))?,
    };

    Ok((identifier, document))
}
