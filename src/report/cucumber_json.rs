//! Reader for cucumber JSON reports (features → elements → steps)

use std::path::Path;

use serde::Deserialize;

use crate::common::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// A scenario (or background) inside a feature
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Element {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub result: Option<StepResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepResult {
    #[serde(default)]
    pub status: String,
    /// Nanoseconds
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Step {
    /// Keyword and text, e.g. `Given an email JWT token is generated`
    pub fn text(&self) -> String {
        let keyword = self.keyword.trim();
        if keyword.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", keyword, self.name)
        }
    }

    pub fn status(&self) -> &str {
        self.result
            .as_ref()
            .map(|r| r.status.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
    }

    pub fn error_message(&self) -> Option<&str> {
        self.result.as_ref().and_then(|r| r.error_message.as_deref())
    }

    /// Duration in milliseconds, when reported
    pub fn duration_ms(&self) -> Option<f64> {
        self.result
            .as_ref()
            .and_then(|r| r.duration)
            .map(|ns| ns as f64 / 1_000_000.0)
    }
}

pub fn parse_report(content: &str) -> Result<Vec<Feature>> {
    Ok(serde_json::from_str(content)?)
}

pub fn read_report(path: &Path) -> Result<Vec<Feature>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
    parse_report(&content)
}

/// Steps of the scenario named `scenario`, else of the first scenario
pub fn scenario_steps<'a>(features: &'a [Feature], scenario: Option<&str>) -> &'a [Step] {
    let scenarios = || {
        features
            .iter()
            .flat_map(|f| f.elements.iter())
            .filter(|e| e.kind != "background")
    };

    scenario
        .and_then(|name| scenarios().find(|e| e.name == name))
        .or_else(|| features.first().and_then(|f| f.elements.first()))
        .map(|e| e.steps.as_slice())
        .unwrap_or(&[])
}

/// Step counts; anything not passed or failed counts as skipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StepStats {
    pub fn from_steps(steps: &[Step]) -> Self {
        steps.iter().fold(Self::default(), |mut stats, step| {
            stats.total += 1;
            match step.status() {
                "passed" => stats.passed += 1,
                "failed" => stats.failed += 1,
                _ => stats.skipped += 1,
            }
            stats
        })
    }
}
