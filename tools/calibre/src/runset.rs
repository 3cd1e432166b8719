//! Calibre runset files.
//!
//! A runset is a flat list of `*<key>: <value>` lines. Keys are written in
//! ascending lexicographic order regardless of the order they were set in,
//! so the same parameters always serialize to the same bytes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(untagged)]
pub enum RunsetValue {
    Str(String),
    Int(i64),
}

impl fmt::Display for RunsetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for RunsetValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RunsetValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&Path> for RunsetValue {
    fn from(value: &Path) -> Self {
        Self::Str(value.display().to_string())
    }
}

impl From<i64> for RunsetValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// The parameters of a single Calibre run.
///
/// Values are written verbatim. A value containing a line break produces
/// a corrupt runset; avoiding that is up to the caller.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RunsetConfig {
    params: BTreeMap<String, RunsetValue>,
}

impl RunsetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<RunsetValue>) -> &mut Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Sets `key` only if a value is present.
    ///
    /// Parameters a stage does not use are left out of the runset
    /// rather than written with an empty value.
    pub fn set_opt(
        &mut self,
        key: impl Into<String>,
        value: Option<impl Into<RunsetValue>>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&RunsetValue> {
        self.params.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterates over parameters in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RunsetValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string()).map_err(Error::io(path))?;
        tracing::debug!("wrote runset {:?}", path);
        Ok(())
    }
}

impl fmt::Display for RunsetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.params.iter() {
            writeln!(f, "*{key}: {value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<RunsetValue>> FromIterator<(K, V)> for RunsetConfig {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut runset = Self::new();
        for (key, value) in iter {
            runset.set(key, value);
        }
        runset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_key_order() {
        let mut runset = RunsetConfig::new();
        runset
            .set("drcSummaryFile", "cell.drc.summary")
            .set("cmnFDIUseLayerMap", 1i64)
            .set("drcLayoutPrimary", "cell")
            .set("cmnFDILayerMapFile", "./layer.map");

        assert_eq!(
            runset.to_string(),
            "*cmnFDILayerMapFile: ./layer.map\n\
             *cmnFDIUseLayerMap: 1\n\
             *drcLayoutPrimary: cell\n\
             *drcSummaryFile: cell.drc.summary\n"
        );
    }

    #[test]
    fn serialization_ignores_construction_order() {
        let params = [
            ("lvsReportFile", RunsetValue::from("a.lvs.report")),
            ("lvsIgnorePorts", RunsetValue::from(1i64)),
            ("cmnVConnectNames", RunsetValue::from("vdd, gnd")),
            ("lvsRulesFile", RunsetValue::from("/rules/lvs.rul")),
        ];
        let forward: RunsetConfig = params.clone().into_iter().collect();
        let backward: RunsetConfig = params.into_iter().rev().collect();

        assert_eq!(forward.to_string(), backward.to_string());
        assert_eq!(forward.to_string(), forward.to_string());

        let keys: Vec<&str> = forward.iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn duplicate_keys_keep_last_value() {
        let mut runset = RunsetConfig::new();
        runset.set("drcRunDir", "/old").set("drcRunDir", "/new");
        assert_eq!(runset.len(), 1);
        assert_eq!(runset.to_string(), "*drcRunDir: /new\n");
    }

    #[test]
    fn absent_values_are_omitted() {
        let mut runset = RunsetConfig::new();
        runset
            .set_opt("lvsSVRFCmds", None::<&str>)
            .set_opt("lvsPowerNames", Some("vdd"));
        assert!(!runset.contains_key("lvsSVRFCmds"));
        assert_eq!(runset.to_string(), "*lvsPowerNames: vdd\n");
    }

    #[test]
    fn empty_runset_serializes_to_nothing() {
        assert!(RunsetConfig::new().is_empty());
        assert_eq!(RunsetConfig::new().to_string(), "");
    }
}
