//! Layout versus schematic (LVS).

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use diagnostics::{DiagnosticSink, Severity};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ArtifactWait;
use crate::error::{Error, Result};
use crate::invoke::{Invocation, Invoker};
use crate::runset::RunsetConfig;
use crate::utils::{matching_lines, read_artifact};
use crate::{Counts, RunResult, Stage};

lazy_static! {
    static ref CORRECT: Regex = Regex::new(r"#     CORRECT     #").unwrap();
    static ref NOT_COMPARED: Regex = Regex::new(r"NOT COMPARED").unwrap();
    static ref INCORRECT: Regex = Regex::new(r"#     INCORRECT     #").unwrap();
    static ref REPORT_ERROR: Regex = Regex::new(r"\s+Error:").unwrap();
    static ref TOOL_ERROR: Regex = Regex::new(r"ERROR:").unwrap();
    static ref TOOL_WARNING: Regex = Regex::new(r"WARNING:").unwrap();
}

pub struct LvsParams<'a> {
    pub cell_name: &'a str,
    pub work_dir: &'a Path,
    pub layout_path: &'a Path,
    pub source_path: &'a Path,
    pub rules_path: &'a Path,
    pub layer_map_path: &'a Path,
    pub power_names: &'a [String],
    pub ground_names: &'a [String],
    pub svrf_commands: Option<&'a str>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LvsGeneratedPaths {
    pub runset_path: PathBuf,
    pub report_path: PathBuf,
    pub ext_path: PathBuf,
    pub spice_path: PathBuf,
    pub erc_db_path: PathBuf,
    pub erc_summary_path: PathBuf,
    pub mask_db_path: PathBuf,
}

impl LvsGeneratedPaths {
    pub fn new(work_dir: &Path, cell_name: &str) -> Self {
        let report_path = lvs_report_path(work_dir, cell_name);
        Self {
            runset_path: work_dir.join("lvs_runset"),
            ext_path: lvs_ext_path(&report_path),
            report_path,
            spice_path: work_dir.join("extracted.sp"),
            erc_db_path: work_dir.join(format!("{cell_name}.erc.results")),
            erc_summary_path: work_dir.join(format!("{cell_name}.erc.summary")),
            mask_db_path: mask_db_path(work_dir, cell_name),
        }
    }
}

/// The LVS report for `cell_name`. PEX reuses an existing one instead of rerunning LVS.
pub fn lvs_report_path(work_dir: &Path, cell_name: &str) -> PathBuf {
    work_dir.join(format!("{cell_name}.lvs.report"))
}

/// The extraction log written next to an LVS report.
pub fn lvs_ext_path(report_path: &Path) -> PathBuf {
    let mut path = OsString::from(report_path.as_os_str());
    path.push(".ext");
    PathBuf::from(path)
}

pub(crate) fn mask_db_path(work_dir: &Path, cell_name: &str) -> PathBuf {
    work_dir.join(format!("{cell_name}.maskdb"))
}

/// Per-category counts of matched lines. A line matching several
/// categories is counted in each of them.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct LvsCounts {
    /// Informational only.
    pub correct: u64,
    pub not_compared: u64,
    pub incorrect: u64,
    pub report_errors: u64,
    pub ext_errors: u64,
    pub ext_warnings: u64,
    pub stdout_errors: u64,
}

impl LvsCounts {
    pub fn total(&self) -> u64 {
        self.not_compared
            + self.incorrect
            + self.report_errors
            + self.ext_errors
            + self.ext_warnings
            + self.stdout_errors
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LvsData {
    pub counts: LvsCounts,
    pub diagnostics: Vec<String>,
}

pub fn lvs_runset(params: &LvsParams, paths: &LvsGeneratedPaths) -> RunsetConfig {
    let mut runset = RunsetConfig::new();
    runset
        .set("lvsRulesFile", params.rules_path)
        .set("lvsRunDir", params.work_dir)
        .set("lvsLayoutPaths", params.layout_path)
        .set("lvsLayoutPrimary", params.cell_name)
        .set("lvsSourcePath", params.source_path)
        .set("lvsSourcePrimary", params.cell_name)
        .set("lvsSourceSystem", "SPICE")
        .set("lvsSpiceFile", paths.spice_path.as_path())
        .set("lvsPowerNames", params.power_names.join(" "))
        .set("lvsGroundNames", params.ground_names.join(" "))
        .set("lvsIgnorePorts", 1i64)
        .set("lvsERCDatabase", paths.erc_db_path.as_path())
        .set("lvsERCSummaryFile", paths.erc_summary_path.as_path())
        .set("lvsReportFile", paths.report_path.as_path())
        .set("lvsMaskDBFile", paths.mask_db_path.as_path())
        .set("cmnFDILayerMapFile", params.layer_map_path)
        .set("cmnFDIUseLayerMap", 1i64)
        .set(
            "cmnVConnectNames",
            params
                .power_names
                .iter()
                .chain(params.ground_names)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        )
        .set_opt("lvsIncludeSVRFCmds", params.svrf_commands.map(|_| 1i64))
        .set_opt("lvsSVRFCmds", params.svrf_commands);
    runset
}

pub fn write_lvs_files(params: &LvsParams) -> Result<LvsGeneratedPaths> {
    fs::create_dir_all(params.work_dir).map_err(Error::io(params.work_dir))?;

    let paths = LvsGeneratedPaths::new(params.work_dir, params.cell_name);
    lvs_runset(params, &paths).write(&paths.runset_path)?;

    Ok(paths)
}

/// Counts failure markers across the LVS report, the extraction log, and
/// the captured standard output of the run.
///
/// Every counted line is returned as a diagnostic, grouped by category in
/// the order: not compared, incorrect, report errors, extraction errors,
/// extraction warnings, stdout errors.
pub fn scan_lvs_results(report: &str, ext: &str, stdout: &str) -> LvsData {
    let not_compared = matching_lines(report, &NOT_COMPARED);
    let incorrect = matching_lines(report, &INCORRECT);
    let report_errors = matching_lines(report, &REPORT_ERROR);
    let ext_errors = matching_lines(ext, &TOOL_ERROR);
    let ext_warnings = matching_lines(ext, &TOOL_WARNING);
    let stdout_errors = matching_lines(stdout, &TOOL_ERROR);

    let counts = LvsCounts {
        correct: matching_lines(report, &CORRECT).len() as u64,
        not_compared: not_compared.len() as u64,
        incorrect: incorrect.len() as u64,
        report_errors: report_errors.len() as u64,
        ext_errors: ext_errors.len() as u64,
        ext_warnings: ext_warnings.len() as u64,
        stdout_errors: stdout_errors.len() as u64,
    };
    let diagnostics = [
        not_compared,
        incorrect,
        report_errors,
        ext_errors,
        ext_warnings,
        stdout_errors,
    ]
    .into_iter()
    .flatten()
    .map(str::to_string)
    .collect();

    LvsData {
        counts,
        diagnostics,
    }
}

pub fn parse_lvs_results(
    report_path: impl AsRef<Path>,
    stdout_path: impl AsRef<Path>,
    wait: Option<&ArtifactWait>,
) -> Result<LvsData> {
    let report_path = report_path.as_ref();
    let report = read_artifact(report_path, wait)?;
    let ext = read_artifact(lvs_ext_path(report_path), wait)?;
    let stdout = read_artifact(stdout_path, wait)?;
    Ok(scan_lvs_results(&report, &ext, &stdout))
}

pub fn run_lvs(
    params: &LvsParams,
    invoker: &impl Invoker,
    sink: &impl DiagnosticSink,
    wait: Option<&ArtifactWait>,
) -> Result<RunResult> {
    let paths = write_lvs_files(params)?;
    let invocation = Invocation::new(Stage::Lvs, params.cell_name, params.work_dir);
    invoker.invoke(&invocation)?;

    let data = parse_lvs_results(&paths.report_path, &invocation.stdout_path, wait)?;
    sink.emit_all(Severity::Error, data.diagnostics.iter().map(String::as_str));
    let counts = data.counts;
    sink.emit(
        Severity::for_count(counts.total()),
        &format!(
            "{:<25}\tCorrect: {}\tNot compared: {}\tIncorrect: {}\tErrors: {}",
            params.cell_name,
            counts.correct,
            counts.not_compared,
            counts.incorrect,
            counts.total()
        ),
    );

    Ok(RunResult {
        stage: Stage::Lvs,
        counts: Counts {
            geometries: None,
            rule_checks: None,
            errors: counts.total(),
        },
        diagnostics: data.diagnostics,
    })
}
