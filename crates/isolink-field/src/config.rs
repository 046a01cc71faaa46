use serde::{Deserialize, Serialize};

use crate::codec::{FieldCodec, FieldEncoding};
use crate::error::Result;

/// Declarative packager layout, usually loaded from JSON.
///
/// ```json
/// { "fields": [
///     { "field": 0,  "encoding": "fixed-hex",  "length": 2,   "description": "MTI" },
///     { "field": 52, "encoding": "fixed-hex",  "length": 8,   "description": "PIN block" },
///     { "field": 55, "encoding": "lll-binary", "length": 255, "description": "ICC data" }
/// ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackagerConfig {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// One field entry of a [`PackagerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldSpec {
    pub field: u16,
    pub encoding: FieldEncoding,
    /// Exact length for fixed-hex, maximum length for lll-binary.
    pub length: usize,
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    pub fn new(field: u16, encoding: FieldEncoding, length: usize) -> Self {
        Self {
            field,
            encoding,
            length,
            description: String::new(),
        }
    }

    /// Build the codec this entry describes.
    pub fn codec(&self) -> Result<FieldCodec> {
        FieldCodec::new(self.encoding, self.length, self.description.clone())
    }
}
