use crate::media::{infer_content_type, MediaBlob};

/// The currently selected origin of media for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Media the user uploaded.
    File {
        blob: MediaBlob,
        display_name: String,
    },
    /// A preconfigured sample asset, fetched lazily by locator.
    Sample {
        locator: String,
        /// Bytes once the locator has been fetched for preview or submission.
        materialized: Option<MediaBlob>,
    },
}

impl InputSource {
    /// Build a file source; an empty or missing declared type falls back to
    /// the file extension.
    pub fn file(bytes: Vec<u8>, display_name: impl Into<String>, declared_type: Option<&str>) -> Self {
        let display_name = display_name.into();
        let content_type = declared_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| infer_content_type(&display_name).to_string());
        InputSource::File {
            blob: MediaBlob::new(bytes, content_type),
            display_name,
        }
    }

    pub fn sample(locator: impl Into<String>) -> Self {
        InputSource::Sample {
            locator: locator.into(),
            materialized: None,
        }
    }

    /// Bytes ready to send, if any.
    pub fn resolved(&self) -> Option<&MediaBlob> {
        match self {
            InputSource::File { blob, .. } => Some(blob),
            InputSource::Sample { materialized, .. } => materialized.as_ref(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            InputSource::File { display_name, .. } => display_name,
            InputSource::Sample { locator, .. } => locator
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or(locator),
        }
    }

    pub fn is_sample(&self) -> bool {
        matches!(self, InputSource::Sample { .. })
    }
}
