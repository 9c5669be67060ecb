//! Ambient configuration for the engine, following the options-struct-with-
//! builder idiom the teacher uses for `PdfToSvgOptions`/`PdfParseOptions`.

use serde_derive::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Reject dictionary keys with no matching field descriptor (§4.F).
    /// `false` is the PDF-viewer-tolerant default; `true` is useful for
    /// conformance testing.
    pub reject_unknown_fields: bool,
    /// Hard cap on the number of xref subsections parsed from one table,
    /// guarding against a pathological or truncated file looping forever.
    pub max_xref_subsections: usize,
    /// Hard cap on indirect-reference resolution depth (catalog -> pages ->
    /// page -> resources -> ...), guarding against cyclic `/Parent` chains.
    pub max_object_recursion: u32,
    /// Treat an SFNT table checksum mismatch as fatal instead of a logged
    /// warning (§4.L).
    pub strict_font_checksums: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            reject_unknown_fields: false,
            max_xref_subsections: 4096,
            max_object_recursion: 64,
            strict_font_checksums: false,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    inner: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn reject_unknown_fields(mut self, value: bool) -> Self {
        self.inner.reject_unknown_fields = value;
        self
    }

    pub fn max_xref_subsections(mut self, value: usize) -> Self {
        self.inner.max_xref_subsections = value;
        self
    }

    pub fn max_object_recursion(mut self, value: u32) -> Self {
        self.inner.max_object_recursion = value;
        self
    }

    pub fn strict_font_checksums(mut self, value: bool) -> Self {
        self.inner.strict_font_checksums = value;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_lenient() {
        let cfg = EngineConfig::default();
        assert!(!cfg.reject_unknown_fields);
        assert!(!cfg.strict_font_checksums);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = EngineConfig::builder()
            .reject_unknown_fields(true)
            .max_object_recursion(8)
            .build();
        assert!(cfg.reject_unknown_fields);
        assert_eq!(cfg.max_object_recursion, 8);
    }

    #[test]
    fn roundtrips_through_json() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
