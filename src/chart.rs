/// Chart rendering handoff.
///
/// The core produces a day-bucketed series and hands it over as a
/// [`ChartSpec`]; turning the artifact into an actual image is the plotting
/// collaborator's job, the core only consumes the returned file path.
use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;

use crate::metrics::SeriesPoint;

/// Everything the plotting collaborator needs for one chart.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Subjects to plot; the series is pre-filtered to these.
    pub users: Vec<String>,
    pub series: Vec<SeriesPoint>,
}

impl ChartSpec {
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
        users: Vec<String>,
        series: Vec<SeriesPoint>,
    ) -> Self {
        let series = series
            .into_iter()
            .filter(|point| users.iter().any(|user| *user == point.username))
            .collect();
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            users,
            series,
        }
    }
}

/// Boundary to the external chart-image collaborator.
pub trait ChartRenderer {
    /// Render a chart for the spec and return the artifact path.
    fn render(&self, spec: &ChartSpec) -> Result<PathBuf>;
}

/// Renderer that writes the series as a JSON artifact for the out-of-process
/// plotting job.
pub struct SeriesArtifactRenderer {
    out_dir: PathBuf,
}

impl SeriesArtifactRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl ChartRenderer for SeriesArtifactRenderer {
    fn render(&self, spec: &ChartSpec) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.out_dir).with_context(|| {
            format!("Failed to create chart directory: {}", self.out_dir.display())
        })?;

        let path = self.out_dir.join(random_filename("json"));
        let contents =
            serde_json::to_string_pretty(spec).context("Failed to serialize chart series")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write chart artifact: {}", path.display()))?;
        Ok(path)
    }
}

/// Random artifact file name, collision-safe enough for a temp directory.
pub fn random_filename(extension: &str) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{}.{}", token, extension)
}
