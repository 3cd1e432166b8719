use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use regex::Regex;

use crate::config::ArtifactWait;
use crate::error::{Error, Result};

/// Resolves `path` against the current directory without touching the filesystem.
///
/// Calibre runs from inside the work directory, so paths written into a
/// runset must not be relative to the caller's directory.
pub fn absolute(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    std::path::absolute(path).map_err(Error::io(path))
}

/// Reads a text artifact produced by Calibre.
///
/// Calibre can exit before its outputs are flushed. Unless `wait` is given,
/// the read happens immediately and may observe a partially written file.
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
pub fn read_artifact(path: impl AsRef<Path>, wait: Option<&ArtifactWait>) -> Result<String> {
    let path = path.as_ref();
    if let Some(wait) = wait {
        if !wait_for_artifact(path, wait) {
            tracing::warn!(
                "artifact {:?} did not settle within {:?}; reading anyway",
                path,
                wait.timeout()
            );
        }
    }
    let bytes = fs::read(path).map_err(Error::io(path))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Polls until `path` exists and its size has not changed for
/// `wait.stable_polls` consecutive polls.
///
/// Returns `false` if the timeout elapsed first.
pub fn wait_for_artifact(path: impl AsRef<Path>, wait: &ArtifactWait) -> bool {
    let path = path.as_ref();
    let start = Instant::now();
    let mut last_len = None;
    let mut stable = 0;

    loop {
        match fs::metadata(path) {
            Ok(meta) => {
                let len = meta.len();
                if last_len == Some(len) {
                    stable += 1;
                } else {
                    stable = 0;
                    last_len = Some(len);
                }
                if stable >= wait.stable_polls {
                    return true;
                }
            }
            Err(_) => {
                last_len = None;
                stable = 0;
            }
        }
        if start.elapsed() >= wait.timeout() {
            return false;
        }
        thread::sleep(wait.poll_interval());
    }
}

/// Returns every line of `contents` matching `re`, without line terminators.
pub fn matching_lines<'a>(contents: &'a str, re: &Regex) -> Vec<&'a str> {
    contents.lines().filter(|line| re.is_match(line)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TEST_BUILD_PATH;

    #[test]
    fn absolute_keeps_absolute_paths() -> anyhow::Result<()> {
        assert_eq!(absolute("/a/b/../c")?, PathBuf::from("/a/b/../c"));
        let rel = absolute("layout.gds")?;
        assert!(rel.is_absolute());
        assert!(rel.ends_with("layout.gds"));
        Ok(())
    }

    #[test]
    fn matching_lines_strip_newlines() {
        let re = Regex::new("ERROR:").unwrap();
        let contents = "ok\nERROR: one\nfine\n  ERROR: two\r\n";
        assert_eq!(
            matching_lines(contents, &re),
            vec!["ERROR: one", "  ERROR: two"]
        );
    }

    #[test]
    fn read_artifact_reports_missing_path() {
        let path = PathBuf::from(TEST_BUILD_PATH).join("read_artifact_missing/none.txt");
        let err = read_artifact(&path, None).unwrap_err();
        assert!(matches!(err, Error::Io { path: ref p, .. } if *p == path));
    }

    #[test]
    fn wait_for_existing_artifact() -> anyhow::Result<()> {
        let work_dir = PathBuf::from(TEST_BUILD_PATH).join("wait_for_existing_artifact");
        fs::create_dir_all(&work_dir)?;
        let path = work_dir.join("done.txt");
        fs::write(&path, "contents\n")?;

        let wait = ArtifactWait {
            poll_interval_ms: 1,
            stable_polls: 2,
            timeout_secs: 5,
        };
        assert!(wait_for_artifact(&path, &wait));
        assert_eq!(read_artifact(&path, Some(&wait))?, "contents\n");
        Ok(())
    }

    #[test]
    fn wait_for_missing_artifact_times_out() {
        let path = PathBuf::from(TEST_BUILD_PATH).join("wait_for_missing_artifact/none.txt");
        let wait = ArtifactWait {
            poll_interval_ms: 1,
            stable_polls: 1,
            timeout_secs: 0,
        };
        assert!(!wait_for_artifact(&path, &wait));
    }
}
