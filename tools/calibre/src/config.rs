//! Calibre run configuration.
//!
//! A [`CalibreConfig`] is passed explicitly into every verification run.
//! Nothing about the technology, rule decks, or executable location is
//! looked up from global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CALIBRE_EXE: &str = "calibre";
pub const DEFAULT_SVRF_COMMANDS: &str = "{VIRTUAL CONNECT NAME VDD? GND? ?}";

/// Rule decks and the layer map handed to Calibre for each stage.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RuleFiles {
    pub drc: PathBuf,
    pub lvs: PathBuf,
    pub pex: PathBuf,
    pub layer_map: PathBuf,
}

/// Opt-in polling for tool outputs that may still be being flushed
/// when the Calibre process exits.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactWait {
    pub poll_interval_ms: u64,
    /// Number of consecutive polls with an unchanged file size required
    /// before an artifact is considered complete.
    pub stable_polls: u32,
    pub timeout_secs: u64,
}

impl Default for ArtifactWait {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            stable_polls: 2,
            timeout_secs: 30,
        }
    }
}

impl ArtifactWait {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CalibreConfig {
    #[serde(default = "default_calibre_exe")]
    pub calibre_exe: PathBuf,
    /// Directory in which runsets are written and Calibre is executed.
    pub work_dir: PathBuf,
    pub rules: RuleFiles,
    #[serde(default = "default_power_names")]
    pub power_names: Vec<String>,
    #[serde(default = "default_ground_names")]
    pub ground_names: Vec<String>,
    /// Extra SVRF statements included in the LVS runset.
    #[serde(default = "default_svrf_commands")]
    pub svrf_commands: Option<String>,
    /// Kill the tool and fail with [`Error::Timeout`] after this many seconds.
    ///
    /// Without a timeout, a hung tool blocks the caller indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub artifact_wait: Option<ArtifactWait>,
}

fn default_calibre_exe() -> PathBuf {
    PathBuf::from(DEFAULT_CALIBRE_EXE)
}

fn default_power_names() -> Vec<String> {
    vec!["vdd".to_string()]
}

fn default_ground_names() -> Vec<String> {
    vec!["gnd".to_string()]
}

fn default_svrf_commands() -> Option<String> {
    Some(DEFAULT_SVRF_COMMANDS.to_string())
}

impl CalibreConfig {
    pub fn new(work_dir: impl Into<PathBuf>, rules: RuleFiles) -> Self {
        Self {
            calibre_exe: default_calibre_exe(),
            work_dir: work_dir.into(),
            rules,
            power_names: default_power_names(),
            ground_names: default_ground_names(),
            svrf_commands: default_svrf_commands(),
            timeout_secs: None,
            artifact_wait: None,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(Error::io(path))?;
        Self::from_toml_str(&contents)
    }

    pub fn with_calibre_exe(mut self, calibre_exe: impl Into<PathBuf>) -> Self {
        self.calibre_exe = calibre_exe.into();
        self
    }

    pub fn with_power_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.power_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ground_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ground_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_svrf_commands(mut self, commands: Option<String>) -> Self {
        self.svrf_commands = commands;
        self
    }

    /// Sets the tool timeout, rounded up to whole seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = Some(secs.max(1));
        self
    }

    pub fn with_artifact_wait(mut self, wait: ArtifactWait) -> Self {
        self.artifact_wait = Some(wait);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// The work directory as an absolute path.
    ///
    /// Calibre runs from inside the work directory, so every path written
    /// into a runset must be absolute.
    pub fn abs_work_dir(&self) -> Result<PathBuf> {
        crate::utils::absolute(&self.work_dir)
    }
}
