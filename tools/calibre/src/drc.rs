//! Design rule checking (DRC).

use std::fs;
use std::path::{Path, PathBuf};

use diagnostics::{DiagnosticSink, Severity};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ArtifactWait;
use crate::error::{Error, Result};
use crate::invoke::{Invocation, Invoker};
use crate::runset::RunsetConfig;
use crate::utils::read_artifact;
use crate::{Counts, RunResult, Stage};

/// Token holding the original layer geometry count, within the third-to-last summary line.
pub const GEOMETRIES_TOKEN: usize = 5;
/// Token holding the executed rule check count, within the second-to-last summary line.
pub const RULE_CHECKS_TOKEN: usize = 4;
/// Token holding the generated result count, within the last summary line.
pub const ERRORS_TOKEN: usize = 5;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"\W+").unwrap();
}

pub struct DrcParams<'a> {
    pub cell_name: &'a str,
    pub work_dir: &'a Path,
    pub layout_path: &'a Path,
    pub rules_path: &'a Path,
    pub layer_map_path: &'a Path,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrcGeneratedPaths {
    pub runset_path: PathBuf,
    pub results_path: PathBuf,
    pub summary_path: PathBuf,
}

impl DrcGeneratedPaths {
    pub fn new(work_dir: &Path, cell_name: &str) -> Self {
        Self {
            runset_path: work_dir.join("drc_runset"),
            results_path: work_dir.join(format!("{cell_name}.drc.results")),
            summary_path: work_dir.join(format!("{cell_name}.drc.summary")),
        }
    }
}

/// Totals from the end of a DRC summary report.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DrcSummary {
    pub geometries: u64,
    pub rule_checks: u64,
    pub errors: u64,
}

pub fn drc_runset(params: &DrcParams, paths: &DrcGeneratedPaths) -> RunsetConfig {
    let mut runset = RunsetConfig::new();
    runset
        .set("drcRulesFile", params.rules_path)
        .set("drcRunDir", params.work_dir)
        .set("drcLayoutPaths", params.layout_path)
        .set("drcLayoutPrimary", params.cell_name)
        .set("drcLayoutSystem", "GDSII")
        .set("drcResultsformat", "ASCII")
        .set("drcResultsFile", paths.results_path.as_path())
        .set("drcSummaryFile", paths.summary_path.as_path())
        .set("cmnFDILayerMapFile", params.layer_map_path)
        .set("cmnFDIUseLayerMap", 1i64);
    runset
}

pub fn write_drc_files(params: &DrcParams) -> Result<DrcGeneratedPaths> {
    fs::create_dir_all(params.work_dir).map_err(Error::io(params.work_dir))?;

    let paths = DrcGeneratedPaths::new(params.work_dir, params.cell_name);
    drc_runset(params, &paths).write(&paths.runset_path)?;

    Ok(paths)
}

/// Reads the totals from the last three lines of a DRC summary.
///
/// The summary ends with:
///
/// ```text
/// TOTAL Original Layer Geometries: 106 (157)
/// TOTAL DRC RuleChecks Executed:   156
/// TOTAL DRC Results Generated:     0 (0)
/// ```
///
/// Each line is split on runs of non-word characters and a fixed token is
/// taken from it (see [`GEOMETRIES_TOKEN`], [`RULE_CHECKS_TOKEN`],
/// [`ERRORS_TOKEN`]). No keywords are checked, so a change to Calibre's
/// summary layout will silently shift these counts.
pub fn parse_drc_summary(contents: &str, path: &Path) -> Result<DrcSummary> {
    let lines: Vec<&str> = contents.lines().collect();
    let [geometries, rule_checks, errors] = match lines.as_slice() {
        [.., a, b, c] => [*a, *b, *c],
        _ => {
            return Err(Error::TruncatedSummary {
                path: path.to_path_buf(),
                lines: lines.len(),
            });
        }
    };

    Ok(DrcSummary {
        geometries: summary_token(geometries, GEOMETRIES_TOKEN, path)?,
        rule_checks: summary_token(rule_checks, RULE_CHECKS_TOKEN, path)?,
        errors: summary_token(errors, ERRORS_TOKEN, path)?,
    })
}

fn summary_token(line: &str, index: usize, path: &Path) -> Result<u64> {
    NON_WORD
        .split(line)
        .nth(index)
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| Error::MalformedSummary {
            path: path.to_path_buf(),
            line: line.to_string(),
            index,
        })
}

pub fn parse_drc_results(
    summary_path: impl AsRef<Path>,
    wait: Option<&ArtifactWait>,
) -> Result<DrcSummary> {
    let summary_path = summary_path.as_ref();
    let contents = read_artifact(summary_path, wait)?;
    parse_drc_summary(&contents, summary_path)
}

pub fn run_drc(
    params: &DrcParams,
    invoker: &impl Invoker,
    sink: &impl DiagnosticSink,
    wait: Option<&ArtifactWait>,
) -> Result<RunResult> {
    let paths = write_drc_files(params)?;
    invoker.invoke(&Invocation::new(
        Stage::Drc,
        params.cell_name,
        params.work_dir,
    ))?;

    let summary = parse_drc_results(&paths.summary_path, wait)?;
    sink.emit(
        Severity::for_count(summary.errors),
        &format!(
            "{:<25}\tGeometries: {}\tChecks: {}\tErrors: {}",
            params.cell_name, summary.geometries, summary.rule_checks, summary.errors
        ),
    );

    Ok(RunResult {
        stage: Stage::Drc,
        counts: Counts {
            geometries: Some(summary.geometries),
            rule_checks: Some(summary.rule_checks),
            errors: summary.errors,
        },
        diagnostics: Vec::new(),
    })
}
