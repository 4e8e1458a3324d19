use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// One installed package as reported by discovery.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    /// Concrete version, possibly not semver
    pub version: String,
    /// Absolute package directory
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_path: Option<PathBuf>,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, version: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            path: path.into(),
            entry_path: None,
        }
    }

    /// Identity of a record independent of its position in a tree: `name@version:path`.
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.name, self.version, self.path.display())
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_and_display() {
        let record = PackageRecord::new("@scope/pkg", "1.2.0", "/app/node_modules/@scope/pkg");
        assert_eq!(record.key(), "@scope/pkg@1.2.0:/app/node_modules/@scope/pkg");
        assert_eq!(record.to_string(), "@scope/pkg@1.2.0");
    }

    #[test]
    fn test_record_serialization_skips_missing_entry() {
        let mut record = PackageRecord::new("a", "1.0.0", "/app/node_modules/a");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("entry_path").is_none());

        record.entry_path = Some(PathBuf::from("/app/node_modules/a/index.js"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["entry_path"], "/app/node_modules/a/index.js");
    }
}
