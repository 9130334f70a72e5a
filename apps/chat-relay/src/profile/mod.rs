//! Profile loader: reads the structured resume document once at startup.
//!
//! A missing file is not fatal and yields an empty profile. A file that is
//! present but unreadable or not a JSON object aborts startup.

use std::io::ErrorKind;
use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

pub mod prompts;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("profile document {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile document {path} must be a JSON object at the top level")]
    NotAnObject { path: String },
}

/// Immutable resume document: top-level sections mapped to fields and lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDocument {
    sections: Map<String, Value>,
}

impl ProfileDocument {
    pub fn from_json_str(raw: &str, path: &str) -> Result<Self, ProfileError> {
        let value: Value = serde_json::from_str(raw).map_err(|source| ProfileError::Parse {
            path: path.to_string(),
            source,
        })?;

        match value {
            Value::Object(sections) => Ok(Self { sections }),
            _ => Err(ProfileError::NotAnObject {
                path: path.to_string(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Top-level `name` / `Name` string, if the document carries one.
    pub fn display_name(&self) -> Option<&str> {
        ["name", "Name"]
            .iter()
            .find_map(|key| self.sections.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Pretty-printed JSON, embedded verbatim in the system prompt.
    pub fn to_prompt_text(&self) -> String {
        // A Map<String, Value> always serializes.
        serde_json::to_string_pretty(&self.sections).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Loads the profile document at `path`.
pub fn load(path: &Path) -> Result<ProfileDocument, ProfileError> {
    let path_str = path.display().to_string();

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Profile document {path_str} not found, using an empty profile");
            return Ok(ProfileDocument::default());
        }
        Err(source) => {
            return Err(ProfileError::Io {
                path: path_str,
                source,
            })
        }
    };

    let profile = ProfileDocument::from_json_str(&raw, &path_str)?;
    info!(
        "Profile document loaded from {path_str} (sections: {})",
        profile.section_names().collect::<Vec<_>>().join(", ")
    );
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RESUME: &str = r#"{
        "Name": "Jordan Reyes",
        "OBJECTIVE": "Fullstack engineer focused on cloud and AI integration.",
        "SKILLS": {
            "Web & Programming": ["TypeScript", "Python", "Rust"],
            "Infrastructure": ["AWS", "Docker"]
        },
        "EXPERIENCE": [
            {"Title": "Software Engineer", "Company": "Acme", "Responsibilities": ["Built APIs"]}
        ]
    }"#;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let profile = load(&dir.path().join("resume.json")).unwrap();
        assert!(profile.is_empty());
        assert_eq!(profile.to_prompt_text(), "{}");
    }

    #[test]
    fn test_load_valid_document() {
        let file = write_temp(RESUME);
        let profile = load(file.path()).unwrap();
        assert!(!profile.is_empty());
        let sections: Vec<&str> = profile.section_names().collect();
        assert!(sections.contains(&"SKILLS"));
        assert!(sections.contains(&"EXPERIENCE"));
        assert_eq!(profile.display_name(), Some("Jordan Reyes"));
    }

    #[test]
    fn test_load_error_names_the_path() {
        let file = write_temp("not json");
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_load_malformed_document_fails() {
        let file = write_temp("{ \"SKILLS\": [ ");
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, ProfileError::Parse { .. }));
    }

    #[test]
    fn test_load_non_object_document_fails() {
        let file = write_temp("[\"Rust\", \"Python\"]");
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, ProfileError::NotAnObject { .. }));
    }

    #[test]
    fn test_directory_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, ProfileError::Io { .. }));
    }

    #[test]
    fn test_prompt_text_contains_sections() {
        let profile = ProfileDocument::from_json_str(RESUME, "inline").unwrap();
        let text = profile.to_prompt_text();
        assert!(text.contains("\"Web & Programming\""));
        assert!(text.contains("Built APIs"));
    }

    #[test]
    fn test_display_name_ignores_blank_and_non_string() {
        let blank = ProfileDocument::from_json_str(r#"{"name": "  "}"#, "inline").unwrap();
        assert_eq!(blank.display_name(), None);
        let numeric = ProfileDocument::from_json_str(r#"{"name": 7}"#, "inline").unwrap();
        assert_eq!(numeric.display_name(), None);
    }
}
