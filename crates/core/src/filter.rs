use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{KvSeriesError, Result};
use crate::model::report::Report;

/// `key=glob` match against one metadata label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelFilter {
    pub key: String,
    pub value_glob: String,
}

impl LabelFilter {
    pub fn parse(input: &str) -> Result<Self> {
        let (key, value_glob) = input
            .split_once('=')
            .ok_or_else(|| KvSeriesError::Parse(format!("invalid label filter: {input}")))?;

        if key.trim().is_empty() || value_glob.trim().is_empty() {
            return Err(KvSeriesError::Parse(format!("invalid label filter: {input}")));
        }
        Pattern::new(value_glob.trim())
            .map_err(|e| KvSeriesError::Parse(format!("invalid label glob {input}: {e}")))?;

        Ok(Self {
            key: key.trim().to_string(),
            value_glob: value_glob.trim().to_string(),
        })
    }

    /// Parses a comma separated list, e.g. `host=web-*,room=kitchen`.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn matches(&self, report: &Report) -> bool {
        report
            .metadata
            .get(&self.key)
            .is_some_and(|value| glob_matches(&self.value_glob, value))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportFilter {
    pub series: Option<String>,
    pub labels: Vec<LabelFilter>,
}

impl ReportFilter {
    pub fn is_empty(&self) -> bool {
        self.series.is_none() && self.labels.is_empty()
    }

    pub fn matches(&self, report: &Report) -> bool {
        if let Some(series) = &self.series
            && !glob_matches(series, &report.series)
        {
            return false;
        }
        self.labels.iter().all(|f| f.matches(report))
    }
}

fn glob_matches(pattern: &str, value: &str) -> bool {
    Pattern::new(pattern)
        .map(|p| p.matches(value))
        .unwrap_or(false)
}
