use crate::execution::{errors::PropertiesError, properties::parse_properties};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// Declared configuration of one named resource, before it is validated into
/// a backend-specific profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub name: String,
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

impl ResourceProfile {
    pub fn new(name: &str) -> Self {
        ResourceProfile {
            name: name.to_string(),
            configuration: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.configuration.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).map(String::as_str)
    }

    pub fn from_properties(name: &str, content: &str) -> Result<Self, PropertiesError> {
        Ok(ResourceProfile {
            name: name.to_string(),
            configuration: parse_properties(content)?,
        })
    }

    pub fn load<P: AsRef<Path>>(name: &str, path: P) -> Result<Self, PropertiesError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PropertiesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_properties(name, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "driver=mysql\nurl=mysql://localhost/db\nbatchPutUnit=100").unwrap();

        let profile = ResourceProfile::load("testing", file.path()).unwrap();
        assert_eq!(profile.name, "testing");
        assert_eq!(profile.get("driver"), Some("mysql"));
        assert_eq!(profile.get("batchPutUnit"), Some("100"));
        assert_eq!(profile.get("user"), None);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ResourceProfile::load("testing", "/nonexistent/profile.properties").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/profile.properties"));
    }

    #[test]
    fn deserializes_from_json() {
        let profile: ResourceProfile = serde_json::from_str(
            r#"{"name":"jdbc","configuration":{"driver":"postgres","url":"postgres://h/db"}}"#,
        )
        .unwrap();
        assert_eq!(profile, ResourceProfile::new("jdbc").with("driver", "postgres").with("url", "postgres://h/db"));
    }
}
