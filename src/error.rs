use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors produced while ingesting, processing or analysing spectra.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or inconsistent instrument text. `line` is 1-based within `stream`.
    #[error("{stream} line {line}: {message}")]
    Format {
        stream: &'static str,
        line: usize,
        message: String,
    },

    /// A stage needed data the record does not carry (e.g. laser power).
    #[error("missing data: {0}")]
    MissingData(String),

    /// A metadata value could not be interpreted as a number.
    #[error("record '{record}': concentration {value:?} is not a number")]
    Type { record: String, value: String },

    /// The calibration regression has no usable slope.
    #[error("degenerate fit: {0}")]
    DegenerateFit(String),

    /// A caller-supplied parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Vectors that must share a length do not.
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("unsupported record schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    /// An instrument file could not be read from disk.
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn format(stream: &'static str, line: usize, message: impl Into<String>) -> Self {
        Error::Format {
            stream,
            line,
            message: message.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_names_stream_and_line() {
        let err = Error::format("spectrometer", 7, "expected 4 values, found 3");
        assert_eq!(
            err.to_string(),
            "spectrometer line 7: expected 4 values, found 3"
        );
    }

    #[test]
    fn type_error_names_record() {
        let err = Error::Type {
            record: "blank".into(),
            value: "n/a".into(),
        };
        assert!(err.to_string().contains("'blank'"));
        assert!(err.to_string().contains("n/a"));
    }
}
