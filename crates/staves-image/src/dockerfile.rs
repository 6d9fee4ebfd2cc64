//! Build-instruction document for single-layer images.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Directory name of the staging root inside the build context.
pub const ROOTFS_DIR: &str = "rootfs";

/// A minimal `FROM scratch` build recipe.
///
/// The staging root is copied to `/` and the command becomes the
/// entrypoint. Annotations are emitted as one `LABEL` instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInstructions {
    /// Image labels.
    pub annotations: BTreeMap<String, String>,
    /// Entrypoint in exec form.
    pub command: Vec<String>,
}

impl BuildInstructions {
    /// Create instructions for the given entrypoint and labels.
    #[must_use]
    pub const fn new(command: Vec<String>, annotations: BTreeMap<String, String>) -> Self {
        Self {
            annotations,
            command,
        }
    }

    /// Render the document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut doc = String::from("FROM scratch\n");

        if !self.annotations.is_empty() {
            let labels = self
                .annotations
                .iter()
                .map(|(key, value)| format!("{}={}", quote(key), quote(value)))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(doc, "LABEL {labels}");
        }

        let _ = writeln!(doc, "COPY {ROOTFS_DIR} /");

        let command = self
            .command
            .iter()
            .map(|arg| quote(arg))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(doc, "ENTRYPOINT [{command}]");

        doc
    }
}

/// Quote a string the way exec-form arrays expect (JSON string syntax).
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_owned()).to_string()
}
