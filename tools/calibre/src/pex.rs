//! Parasitic extraction (PEX).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use diagnostics::{DiagnosticSink, Severity};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ArtifactWait;
use crate::error::{Error, Result};
use crate::invoke::{Invocation, Invoker};
use crate::lvs::mask_db_path;
use crate::netlist::patch_netlist_header;
use crate::runset::RunsetConfig;
use crate::utils::{matching_lines, read_artifact, wait_for_artifact};
use crate::{Counts, RunResult, Stage};

lazy_static! {
    static ref TOOL_ERROR: Regex = Regex::new(r"ERROR:").unwrap();
}

pub struct PexParams<'a> {
    pub cell_name: &'a str,
    pub work_dir: &'a Path,
    pub layout_path: &'a Path,
    pub source_path: &'a Path,
    pub rules_path: &'a Path,
    /// Report of a previous LVS run of the same cell.
    pub lvs_report_path: &'a Path,
    pub netlist_path: &'a Path,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PexGeneratedPaths {
    pub runset_path: PathBuf,
    pub report_path: PathBuf,
    pub mask_db_path: PathBuf,
    pub def_path: PathBuf,
}

impl PexGeneratedPaths {
    pub fn new(work_dir: &Path, cell_name: &str) -> Self {
        Self {
            runset_path: work_dir.join("pex_runset"),
            report_path: work_dir.join(format!("{cell_name}.pex.report")),
            mask_db_path: mask_db_path(work_dir, cell_name),
            def_path: work_dir.join(format!("{cell_name}.def")),
        }
    }
}

/// Where the extracted netlist goes when the caller does not choose a path.
pub fn default_pex_netlist_path(work_dir: &Path, cell_name: &str) -> PathBuf {
    work_dir.join(format!("{cell_name}.pex.netlist"))
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PexData {
    pub errors: u64,
    pub diagnostics: Vec<String>,
}

pub fn pex_runset(params: &PexParams, paths: &PexGeneratedPaths) -> RunsetConfig {
    let mut runset = RunsetConfig::new();
    runset
        .set("pexRulesFile", params.rules_path)
        .set("pexRunDir", params.work_dir)
        .set("pexLayoutPaths", params.layout_path)
        .set("pexLayoutPrimary", params.cell_name)
        .set("pexSourcePath", params.source_path)
        .set("pexSourcePrimary", params.cell_name)
        .set("pexReportFile", params.lvs_report_path)
        .set("pexPexNetlistFile", params.netlist_path)
        .set("pexPexReportFile", paths.report_path.as_path())
        .set("pexMaskDBFile", paths.mask_db_path.as_path())
        .set("cmnFDIDEFLayoutPath", paths.def_path.as_path());
    runset
}

pub fn write_pex_files(params: &PexParams) -> Result<PexGeneratedPaths> {
    fs::create_dir_all(params.work_dir).map_err(Error::io(params.work_dir))?;

    let paths = PexGeneratedPaths::new(params.work_dir, params.cell_name);
    pex_runset(params, &paths).write(&paths.runset_path)?;

    Ok(paths)
}

pub fn scan_pex_output(stdout: &str) -> PexData {
    let errors = matching_lines(stdout, &TOOL_ERROR);
    PexData {
        errors: errors.len() as u64,
        diagnostics: errors.into_iter().map(str::to_string).collect(),
    }
}

pub fn parse_pex_output(
    stdout_path: impl AsRef<Path>,
    wait: Option<&ArtifactWait>,
) -> Result<PexData> {
    Ok(scan_pex_output(&read_artifact(stdout_path, wait)?))
}

/// Runs extraction and restores the source netlist's header in the output.
///
/// A missing output netlist means extraction never ran, which is an error
/// rather than a result with a high error count.
pub fn run_pex(
    params: &PexParams,
    invoker: &impl Invoker,
    sink: &impl DiagnosticSink,
    wait: Option<&ArtifactWait>,
) -> Result<RunResult> {
    match fs::remove_file(params.netlist_path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            return Err(Error::io(params.netlist_path)(e));
        }
        _ => {}
    }
    write_pex_files(params)?;
    let invocation = Invocation::new(Stage::Pex, params.cell_name, params.work_dir);
    invoker.invoke(&invocation)?;

    let data = parse_pex_output(&invocation.stdout_path, wait)?;
    sink.emit_all(Severity::Error, data.diagnostics.iter().map(String::as_str));
    sink.emit(
        Severity::for_count(data.errors),
        &format!("{:<25}\tPEX errors: {}", params.cell_name, data.errors),
    );

    if let Some(wait) = wait {
        wait_for_artifact(params.netlist_path, wait);
    }
    if !params.netlist_path.exists() {
        return Err(Error::MissingPexNetlist(params.netlist_path.to_path_buf()));
    }
    patch_netlist_header(params.netlist_path, params.cell_name, params.source_path)?;

    Ok(RunResult {
        stage: Stage::Pex,
        counts: Counts {
            geometries: None,
            rule_checks: None,
            errors: data.errors,
        },
        diagnostics: data.diagnostics,
    })
}
