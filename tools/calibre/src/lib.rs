//! Calibre DRC, LVS, and PEX runner.
//!
//! Each stage writes a runset, runs Calibre in batch mode from the work
//! directory, and reads the tool's text reports back into a [`RunResult`].
//! A non-zero error count is a normal result; [`Error`] is reserved for
//! runs whose artifacts are missing or unreadable.
//!
//! Calibre may exit before its reports are fully flushed. Reads happen
//! immediately after the process exits unless
//! [`ArtifactWait`](config::ArtifactWait) polling is configured.

use std::fmt;
use std::path::{Path, PathBuf};

use diagnostics::{DiagnosticSink, TracingSink};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tera::Tera;

pub mod config;
pub mod drc;
pub mod error;
pub mod invoke;
pub mod lvs;
pub mod netlist;
pub mod pex;
pub mod runset;
pub mod utils;

use crate::config::CalibreConfig;
use crate::drc::DrcParams;
pub use crate::error::{Error, Result};
use crate::invoke::{CalibreInvoker, Invoker};
use crate::lvs::LvsParams;
use crate::pex::PexParams;

pub const TEMPLATES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        match Tera::new(&format!("{TEMPLATES_PATH}/*")) {
            Ok(t) => t,
            Err(e) => {
                panic!("Encountered errors while parsing Tera templates: {e}");
            }
        }
    };
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Drc,
    Lvs,
    Pex,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drc => "drc",
            Self::Lvs => "lvs",
            Self::Pex => "pex",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies the cell to verify.
///
/// `name` must match the top-level cell name in both the layout and the
/// source netlist.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct VerificationRequest {
    pub name: String,
    pub layout_path: PathBuf,
    pub source_netlist_path: Option<PathBuf>,
}

impl VerificationRequest {
    pub fn new(name: impl Into<String>, layout_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            layout_path: layout_path.into(),
            source_netlist_path: None,
        }
    }

    pub fn with_source_netlist(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_netlist_path = Some(path.into());
        self
    }

    fn source_netlist(&self, stage: Stage) -> Result<&Path> {
        self.source_netlist_path
            .as_deref()
            .ok_or(Error::MissingSourceNetlist(stage))
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Counts {
    pub geometries: Option<u64>,
    pub rule_checks: Option<u64>,
    pub errors: u64,
}

/// The outcome of one verification stage.
///
/// Only `counts.errors` decides pass or fail.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub stage: Stage,
    pub counts: Counts,
    /// Matched report lines, in the order they were found.
    pub diagnostics: Vec<String>,
}

impl RunResult {
    pub fn errors(&self) -> u64 {
        self.counts.errors
    }

    pub fn passed(&self) -> bool {
        self.counts.errors == 0
    }
}

/// Runs DRC, LVS, and PEX for one work directory.
///
/// Calls share the work directory on disk and must not overlap.
/// Give concurrent callers distinct work directories.
pub struct Verifier<I = CalibreInvoker, S = TracingSink> {
    config: CalibreConfig,
    invoker: I,
    sink: S,
}

impl Verifier {
    pub fn new(config: CalibreConfig) -> Self {
        Self {
            invoker: CalibreInvoker::from_config(&config),
            sink: TracingSink,
            config,
        }
    }
}

impl<I, S> Verifier<I, S> {
    pub fn with_invoker<J>(self, invoker: J) -> Verifier<J, S> {
        Verifier {
            config: self.config,
            invoker,
            sink: self.sink,
        }
    }

    pub fn with_sink<T>(self, sink: T) -> Verifier<I, T> {
        Verifier {
            config: self.config,
            invoker: self.invoker,
            sink,
        }
    }

    pub fn config(&self) -> &CalibreConfig {
        &self.config
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<I: Invoker, S: DiagnosticSink> Verifier<I, S> {
    pub fn run_drc(&self, request: &VerificationRequest) -> Result<RunResult> {
        let work_dir = self.config.abs_work_dir()?;
        let layout_path = utils::absolute(&request.layout_path)?;
        drc::run_drc(
            &DrcParams {
                cell_name: &request.name,
                work_dir: &work_dir,
                layout_path: &layout_path,
                rules_path: &self.config.rules.drc,
                layer_map_path: &self.config.rules.layer_map,
            },
            &self.invoker,
            &self.sink,
            self.config.artifact_wait.as_ref(),
        )
    }

    pub fn run_lvs(&self, request: &VerificationRequest) -> Result<RunResult> {
        let work_dir = self.config.abs_work_dir()?;
        let layout_path = utils::absolute(&request.layout_path)?;
        let source_path = utils::absolute(request.source_netlist(Stage::Lvs)?)?;
        lvs::run_lvs(
            &LvsParams {
                cell_name: &request.name,
                work_dir: &work_dir,
                layout_path: &layout_path,
                source_path: &source_path,
                rules_path: &self.config.rules.lvs,
                layer_map_path: &self.config.rules.layer_map,
                power_names: &self.config.power_names,
                ground_names: &self.config.ground_names,
                svrf_commands: self.config.svrf_commands.as_deref(),
            },
            &self.invoker,
            &self.sink,
            self.config.artifact_wait.as_ref(),
        )
    }

    /// Runs parasitic extraction, returning the result and the path of the
    /// patched output netlist.
    ///
    /// DRC and LVS run first only if no LVS report for `request.name` exists
    /// in the work directory. The check looks at file presence alone: a stale
    /// report left over from an earlier layout, or from a failed LVS run, is
    /// reused. Delete it to force DRC and LVS to run again.
    pub fn run_pex(
        &self,
        request: &VerificationRequest,
        output: Option<&Path>,
    ) -> Result<(RunResult, PathBuf)> {
        let work_dir = self.config.abs_work_dir()?;
        let source_path = utils::absolute(request.source_netlist(Stage::Pex)?)?;

        let lvs_report_path = lvs::lvs_report_path(&work_dir, &request.name);
        if !lvs_report_path.exists() {
            tracing::debug!(
                "no LVS report at {:?}; running DRC and LVS first",
                lvs_report_path
            );
            self.run_drc(request)?;
            self.run_lvs(request)?;
        }

        let layout_path = utils::absolute(&request.layout_path)?;
        let netlist_path = match output {
            Some(path) => utils::absolute(path)?,
            None => pex::default_pex_netlist_path(&work_dir, &request.name),
        };
        let result = pex::run_pex(
            &PexParams {
                cell_name: &request.name,
                work_dir: &work_dir,
                layout_path: &layout_path,
                source_path: &source_path,
                rules_path: &self.config.rules.pex,
                lvs_report_path: &lvs_report_path,
                netlist_path: &netlist_path,
            },
            &self.invoker,
            &self.sink,
            self.config.artifact_wait.as_ref(),
        )?;
        Ok((result, netlist_path))
    }
}
