use std::path::PathBuf;
use std::time::Duration;

use crate::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A runset, report, log, captured stream, or netlist could not be read or written.
    #[error("I/O error on verification artifact `{path:?}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error rendering template: {0}")]
    Tera(#[from] tera::Error),
    #[error("error parsing configuration: {0}")]
    Config(#[from] toml::de::Error),
    #[error("DRC summary `{path:?}` has {lines} lines; expected at least 3")]
    TruncatedSummary { path: PathBuf, lines: usize },
    #[error("malformed DRC summary `{path:?}`: no integer at token {index} of line {line:?}")]
    MalformedSummary {
        path: PathBuf,
        line: String,
        index: usize,
    },
    /// The extraction did not run at all.
    #[error("PEX did not produce an output netlist at `{0:?}`")]
    MissingPexNetlist(PathBuf),
    #[error("no `.subckt {name}` header found in `{path:?}`")]
    HeaderNotFound { path: PathBuf, name: String },
    #[error("no `* ` delimiter line follows the `.subckt` header in `{0:?}`")]
    DelimiterNotFound(PathBuf),
    #[error("no `.SUBCKT {name}` header found in reference netlist `{path:?}`")]
    ReferenceHeaderNotFound { path: PathBuf, name: String },
    #[error("{0} requires a source netlist")]
    MissingSourceNetlist(Stage),
    #[error("calibre {stage} did not exit within {timeout:?}")]
    Timeout { stage: Stage, timeout: Duration },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// Returns `true` if this error came from accessing a file on disk.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
