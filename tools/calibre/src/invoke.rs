//! Running Calibre in batch mode.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tera::Context;

use crate::config::CalibreConfig;
use crate::error::{Error, Result};
use crate::{Stage, TEMPLATES};

/// A single batch run of the external tool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    pub stage: Stage,
    /// Name of the top-level cell being verified.
    pub cell_name: String,
    pub runset_path: PathBuf,
    /// Directory the tool runs from; relative paths in the runset resolve against it.
    pub work_dir: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

impl Invocation {
    /// Builds an invocation using the conventional file names:
    /// `<stage>_runset`, `<cell>.<stage>.out`, and `<cell>.<stage>.err`.
    pub fn new(stage: Stage, cell_name: &str, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        Self {
            stage,
            cell_name: cell_name.to_string(),
            runset_path: work_dir.join(format!("{stage}_runset")),
            stdout_path: work_dir.join(format!("{cell_name}.{stage}.out")),
            stderr_path: work_dir.join(format!("{cell_name}.{stage}.err")),
            work_dir,
        }
    }
}

/// Runs the external verification tool.
///
/// Implementations block until the tool has exited. The exit status is not
/// a verdict: success or failure is read from the output artifacts.
pub trait Invoker {
    fn invoke(&self, invocation: &Invocation) -> Result<()>;
}

impl<T: Invoker + ?Sized> Invoker for &T {
    fn invoke(&self, invocation: &Invocation) -> Result<()> {
        (**self).invoke(invocation)
    }
}

/// Invokes `calibre -gui -<stage> <runset> -batch` through a generated run script.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CalibreInvoker {
    calibre_exe: PathBuf,
    timeout: Option<Duration>,
}

#[derive(Serialize)]
struct RunScriptContext<'a> {
    calibre_exe: &'a Path,
    stage: Stage,
    runset_path: &'a Path,
}

impl CalibreInvoker {
    pub fn new(calibre_exe: impl Into<PathBuf>) -> Self {
        Self {
            calibre_exe: calibre_exe.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &CalibreConfig) -> Self {
        Self {
            calibre_exe: config.calibre_exe.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn calibre_exe(&self) -> &Path {
        &self.calibre_exe
    }
}

impl Invoker for CalibreInvoker {
    fn invoke(&self, invocation: &Invocation) -> Result<()> {
        let run_script_path = write_run_script(&self.calibre_exe, invocation)?;
        let status = execute_run_script(&run_script_path, invocation, self.timeout)?;
        tracing::debug!(
            "calibre {} of {} exited with {}",
            invocation.stage,
            invocation.cell_name,
            status
        );
        Ok(())
    }
}

pub fn write_run_script(calibre_exe: &Path, invocation: &Invocation) -> Result<PathBuf> {
    fs::create_dir_all(&invocation.work_dir).map_err(Error::io(&invocation.work_dir))?;

    let run_script_path = invocation
        .work_dir
        .join(format!("run_{}.sh", invocation.stage));

    let context = RunScriptContext {
        calibre_exe,
        stage: invocation.stage,
        runset_path: &invocation.runset_path,
    };
    let contents = TEMPLATES.render("run_calibre.sh", &Context::from_serialize(context)?)?;

    fs::write(&run_script_path, contents).map_err(Error::io(&run_script_path))?;
    let mut perms = fs::metadata(&run_script_path)
        .map_err(Error::io(&run_script_path))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&run_script_path, perms).map_err(Error::io(&run_script_path))?;

    Ok(run_script_path)
}

/// Executes a run script from the invocation's work directory, capturing
/// stdout and stderr into the invocation's output files.
///
/// The run script `exec`s the tool, so on timeout the killed child is the
/// tool itself rather than the shell that launched it.
pub fn execute_run_script(
    path: impl AsRef<Path>,
    invocation: &Invocation,
    timeout: Option<Duration>,
) -> Result<ExitStatus> {
    let path = path.as_ref();

    let out_file =
        fs::File::create(&invocation.stdout_path).map_err(Error::io(&invocation.stdout_path))?;
    let err_file =
        fs::File::create(&invocation.stderr_path).map_err(Error::io(&invocation.stderr_path))?;

    let mut cmd = Command::new("bash");
    cmd.arg(path)
        .current_dir(&invocation.work_dir)
        .stdin(Stdio::null())
        .stdout(out_file)
        .stderr(err_file);
    tracing::debug!("running {:?} in {:?}", cmd, invocation.work_dir);

    match timeout {
        None => cmd.status().map_err(Error::io(path)),
        Some(timeout) => {
            let child = cmd.spawn().map_err(Error::io(path))?;
            wait_with_timeout(child, timeout, invocation.stage, path)
        }
    }
}

fn wait_with_timeout(
    mut child: Child,
    timeout: Duration,
    stage: Stage,
    path: &Path,
) -> Result<ExitStatus> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::Timeout { stage, timeout });
                }
                thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(Error::io(path)(e)),
        }
    }
}
