//! Restoring the circuit header of extracted netlists.
//!
//! The extractor rewrites the `.subckt` line of the top cell, and the port
//! list it emits can differ from the source netlist's. Patching swaps the
//! extracted header block for the source's `.SUBCKT` line and leaves every
//! other byte untouched.

use std::fs;
use std::ops::Range;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref HEADER_DELIMITER: Regex = Regex::new(r"(?m)^\* \n").unwrap();
}

/// An extracted netlist split around its top-level circuit header.
///
/// `preamble() + header() + trailer()` reproduces the original text exactly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetlistDocument {
    contents: String,
    header: Range<usize>,
    header_line_end: usize,
}

impl NetlistDocument {
    /// Locates the header of `cell_name` in an extracted netlist.
    ///
    /// The header starts at the first line beginning with `.subckt <cell_name>`
    /// and runs through the next line consisting of `* `.
    pub fn parse(contents: String, cell_name: &str, path: &Path) -> Result<Self> {
        let header_re = Regex::new(&format!(
            r"(?m)^\.subckt {}(?:[ \t][^\n]*)?$",
            regex::escape(cell_name)
        ))
        .map_err(anyhow::Error::from)?;

        let header_line = header_re
            .find(&contents)
            .ok_or_else(|| Error::HeaderNotFound {
                path: path.to_path_buf(),
                name: cell_name.to_string(),
            })?;
        let start = header_line.start();
        // Skip the line break ending the header line itself.
        let header_line_end = (header_line.end() + 1).min(contents.len());

        let delimiter = HEADER_DELIMITER
            .find(&contents[header_line_end..])
            .ok_or_else(|| Error::DelimiterNotFound(path.to_path_buf()))?;
        let end = header_line_end + delimiter.end();

        Ok(Self {
            contents,
            header: start..end,
            header_line_end,
        })
    }

    /// Everything before the header line.
    pub fn preamble(&self) -> &str {
        &self.contents[..self.header.start]
    }

    /// The `.subckt` declaration line, including its line break.
    pub fn header_line(&self) -> &str {
        &self.contents[self.header.start..self.header_line_end]
    }

    /// The full header block, from the `.subckt` line through the `* ` delimiter.
    pub fn header(&self) -> &str {
        &self.contents[self.header.clone()]
    }

    /// Everything after the `* ` delimiter line.
    pub fn trailer(&self) -> &str {
        &self.contents[self.header.end..]
    }

    /// Returns the netlist text with the header block replaced by `header`.
    pub fn with_header(&self, header: &str) -> String {
        let mut out =
            String::with_capacity(self.preamble().len() + header.len() + self.trailer().len());
        out.push_str(self.preamble());
        out.push_str(header);
        out.push_str(self.trailer());
        out
    }

    pub fn into_inner(self) -> String {
        self.contents
    }
}

/// Finds the first `.SUBCKT <cell_name>` line of a source netlist,
/// including its line break.
pub fn reference_header<'a>(contents: &'a str, cell_name: &str) -> Option<&'a str> {
    let re = Regex::new(&format!(
        r"(?m)^\.SUBCKT {}(?:[ \t][^\n]*)?(?:\n|\z)",
        regex::escape(cell_name)
    ))
    .ok()?;
    re.find(contents).map(|m| m.as_str())
}

/// Rewrites the header of `cell_name` in the netlist at `netlist_path`
/// with the header found in `reference_path`.
pub fn patch_netlist_header(
    netlist_path: impl AsRef<Path>,
    cell_name: &str,
    reference_path: impl AsRef<Path>,
) -> Result<()> {
    let netlist_path = netlist_path.as_ref();
    let reference_path = reference_path.as_ref();

    let contents = fs::read_to_string(netlist_path).map_err(Error::io(netlist_path))?;
    let doc = NetlistDocument::parse(contents, cell_name, netlist_path)?;

    let reference = fs::read_to_string(reference_path).map_err(Error::io(reference_path))?;
    let header = reference_header(&reference, cell_name).ok_or_else(|| {
        Error::ReferenceHeaderNotFound {
            path: reference_path.to_path_buf(),
            name: cell_name.to_string(),
        }
    })?;

    let mut patched = doc.with_header(header);
    if !header.ends_with('\n') {
        patched.insert(doc.preamble().len() + header.len(), '\n');
    }
    fs::write(netlist_path, patched).map_err(Error::io(netlist_path))?;
    tracing::debug!(
        "replaced header of {} in {:?} with {:?}",
        cell_name,
        netlist_path,
        header.trim_end()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{TEST_BUILD_PATH, fixture};
    use std::path::PathBuf;

    const EXTRACTED: &str = "* SPICE NETLIST\n\
                             * generated by the extractor\n\
                             \n\
                             .subckt sram_cell BL BR WL VDD GND\n\
                             + Q QB\n\
                             * \n\
                             * Net: BL\n\
                             MM1 Q WL BL GND nmos w=0.14u l=0.15u\n\
                             .ends\n";

    #[test]
    fn splits_around_header() -> anyhow::Result<()> {
        let doc = NetlistDocument::parse(EXTRACTED.to_string(), "sram_cell", Path::new("x"))?;
        assert_eq!(doc.preamble(), "* SPICE NETLIST\n* generated by the extractor\n\n");
        assert_eq!(doc.header_line(), ".subckt sram_cell BL BR WL VDD GND\n");
        assert_eq!(
            doc.header(),
            ".subckt sram_cell BL BR WL VDD GND\n+ Q QB\n* \n"
        );
        assert_eq!(
            doc.trailer(),
            "* Net: BL\nMM1 Q WL BL GND nmos w=0.14u l=0.15u\n.ends\n"
        );
        let rebuilt = format!("{}{}{}", doc.preamble(), doc.header(), doc.trailer());
        assert_eq!(rebuilt, EXTRACTED);
        Ok(())
    }

    #[test]
    fn replaces_only_header_span() -> anyhow::Result<()> {
        let doc = NetlistDocument::parse(EXTRACTED.to_string(), "sram_cell", Path::new("x"))?;
        let header = ".SUBCKT sram_cell bl br wl vdd gnd\n";
        let patched = doc.with_header(header);

        assert_eq!(
            patched,
            format!("{}{}{}", doc.preamble(), header, doc.trailer())
        );
        assert!(patched.starts_with(doc.preamble()));
        assert!(patched.ends_with(doc.trailer()));
        Ok(())
    }

    #[test]
    fn header_match_requires_whole_name() {
        let contents = ".subckt sram_cell_array A B\n* \n.ends\n".to_string();
        let err = NetlistDocument::parse(contents, "sram_cell", Path::new("x")).unwrap_err();
        assert!(matches!(err, Error::HeaderNotFound { .. }));
    }

    #[test]
    fn missing_delimiter_is_an_error() {
        let contents = ".subckt sram_cell A B\n+ C\n.ends\n".to_string();
        let err = NetlistDocument::parse(contents, "sram_cell", Path::new("x")).unwrap_err();
        assert!(matches!(err, Error::DelimiterNotFound(_)));
    }

    #[test]
    fn delimiter_before_header_is_ignored() {
        let contents = "* \n.subckt sram_cell A\n* \nbody\n".to_string();
        let doc = NetlistDocument::parse(contents, "sram_cell", Path::new("x")).unwrap();
        assert_eq!(doc.preamble(), "* \n");
        assert_eq!(doc.trailer(), "body\n");
    }

    #[test]
    fn reference_header_is_first_match() {
        let reference = "* source\n\
                         .SUBCKT sram_cell_array a b\n\
                         .ENDS\n\
                         .SUBCKT sram_cell bl br wl vdd gnd\n\
                         .ENDS\n\
                         .SUBCKT sram_cell other\n";
        assert_eq!(
            reference_header(reference, "sram_cell"),
            Some(".SUBCKT sram_cell bl br wl vdd gnd\n")
        );
        assert_eq!(reference_header(reference, "inv"), None);
    }

    #[test]
    fn patch_pex_netlist_in_place() -> anyhow::Result<()> {
        let work_dir = PathBuf::from(TEST_BUILD_PATH).join("patch_pex_netlist_in_place");
        fs::create_dir_all(&work_dir)?;
        let netlist_path = work_dir.join("sram_cell.pex.netlist");
        fs::copy(fixture("pex/sram_cell.pex.netlist"), &netlist_path)?;
        let original = fs::read_to_string(&netlist_path)?;

        patch_netlist_header(&netlist_path, "sram_cell", fixture("pex/sram_cell.sp"))?;

        let doc = NetlistDocument::parse(original, "sram_cell", &netlist_path)?;
        let patched = fs::read_to_string(&netlist_path)?;
        assert_eq!(
            patched,
            format!(
                "{}.SUBCKT sram_cell bl br wl vdd gnd\n{}",
                doc.preamble(),
                doc.trailer()
            )
        );
        Ok(())
    }

    #[test]
    fn patch_fails_without_reference_header() -> anyhow::Result<()> {
        let work_dir = PathBuf::from(TEST_BUILD_PATH).join("patch_fails_without_reference_header");
        fs::create_dir_all(&work_dir)?;
        let netlist_path = work_dir.join("sram_cell.pex.netlist");
        fs::copy(fixture("pex/sram_cell.pex.netlist"), &netlist_path)?;
        let original = fs::read_to_string(&netlist_path)?;

        let err = patch_netlist_header(&netlist_path, "sram_cell", fixture("pex/unrelated.sp"))
            .unwrap_err();
        assert!(matches!(err, Error::ReferenceHeaderNotFound { .. }), "{err}");
        assert_eq!(fs::read_to_string(&netlist_path)?, original);
        Ok(())
    }
}
