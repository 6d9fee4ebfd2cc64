//! Image tags.

use staves_common::{StavesError, StavesResult};

/// An image tag of the form `name:version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTag {
    /// Repository name, possibly with a registry prefix.
    pub name: String,
    /// Version tag.
    pub version: String,
}

impl ImageTag {
    /// Create a tag from a name and version.
    ///
    /// Both parts must be non-empty and free of whitespace.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> StavesResult<Self> {
        let name = name.into();
        let version = version.into();

        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(StavesError::config(format!("Invalid image name '{name}'")));
        }
        if version.is_empty() || version.contains(['/', ':']) || version.chars().any(char::is_whitespace)
        {
            return Err(StavesError::config(format!(
                "Invalid image version '{version}'"
            )));
        }

        Ok(Self { name, version })
    }
}

impl std::fmt::Display for ImageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}
