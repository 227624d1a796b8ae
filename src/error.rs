use std::fmt::{self, Debug, Display};
use std::path::PathBuf;

/// Crate-wide error type covering the engine's four named failure kinds plus
/// I/O and YAML config errors that simply propagate from their source.
pub enum Error {
    /// An `input` string did not conform to `format` during [`crate::format::extract`].
    FormatMismatch { format: String, input: String },
    /// Clash resolution produced conflicting winners across priority keys for `key`,
    /// or a `default: error` rule was hit.
    UnresolvedClash { key: String, old: String, new: String },
    /// A [`crate::dataset::ClashRule`] named an unknown `default` value.
    InvalidRule { key: String, default: String },
    /// The requested catalog key was absent from the loaded YAML document.
    ConfigKeyMissing { key: String, yaml_path: PathBuf },
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormatMismatch { format, input } => {
                write!(f, "input '{input}' does not match format '{format}'")
            }
            Self::UnresolvedClash { key, old, new } => {
                write!(f, "unresolved clash on key '{key}' between '{old}' and '{new}'")
            }
            Self::InvalidRule { key, default } => {
                write!(f, "invalid clash rule default '{default}' for key '{key}'")
            }
            Self::ConfigKeyMissing { key, yaml_path } => {
                write!(f, "key '{key}' not found in catalog '{}'", yaml_path.display())
            }
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Yaml(err) => write!(f, "YAML error: {err}"),
        }
    }
}

impl Debug for Error {
    /// Reuse the `Display` impl for `Debug` to keep a single source of error output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Error::Yaml(value)
    }
}

impl From<std::num::ParseIntError> for Error {
    /// A `!start`/`!end` range value wasn't integer-convertible. Per spec this is an
    /// exception that propagates to the caller, folded into `FormatMismatch` since it
    /// always surfaces at a format-extraction call site.
    fn from(value: std::num::ParseIntError) -> Self {
        Error::FormatMismatch {
            format: "<year range>".to_string(),
            input: value.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
