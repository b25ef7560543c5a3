use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::ComputedEntry;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("phase engine request failed: {0}")]
    Request(String),

    #[error("phase engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("phase engine response could not be parsed: {0}")]
    InvalidResponse(String),
}

// A phase on the hull, possibly expressed in terminal-composition space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableEntry {
    pub entry: ComputedEntry,
    // entry as fetched from the database, before any transformation
    #[serde(default)]
    pub original_entry: Option<ComputedEntry>,
    #[serde(default)]
    pub formation_energy_per_atom: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDiagram {
    pub stable_entries: Vec<StableEntry>,
    // renderable figure, passed through untouched
    pub plot: serde_json::Value,
}

/// Convex-hull phase diagram construction and plotting.
#[async_trait]
pub trait PhaseDiagramEngine: Send + Sync {
    /// Builds the diagram over `entries` spanned by the `terminals`
    /// compositions; unstable phases within `energy_cutoff` eV/atom of the
    /// hull are included in the plot.
    async fn compute_stable_phases(
        &self,
        entries: &[ComputedEntry],
        terminals: &[String],
        energy_cutoff: f64,
    ) -> Result<PhaseDiagram, EngineError>;

    /// Formation energy per atom of a stable phase, `None` when unavailable.
    fn formation_energy_per_atom(&self, stable: &StableEntry) -> Option<f64> {
        stable.formation_energy_per_atom.filter(|e| e.is_finite())
    }
}

// Body of POST {backend}/phase-diagram
#[derive(Debug, Serialize)]
struct PhaseDiagramQuery<'a> {
    entries: &'a [ComputedEntry],
    terminals: &'a [String],
    normalize_terminal_compositions: bool,
    show_unstable: f64,
}

pub struct HttpPhaseEngine {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPhaseEngine {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl PhaseDiagramEngine for HttpPhaseEngine {
    async fn compute_stable_phases(
        &self,
        entries: &[ComputedEntry],
        terminals: &[String],
        energy_cutoff: f64,
    ) -> Result<PhaseDiagram, EngineError> {
        let query = PhaseDiagramQuery {
            entries,
            terminals,
            normalize_terminal_compositions: true,
            show_unstable: energy_cutoff,
        };

        let res = self
            .client
            .post(format!("{}/phase-diagram", self.base_url))
            .timeout(self.timeout)
            .json(&query)
            .send()
            .await
            .map_err(|e| EngineError::Request(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let diagram = res
            .json::<PhaseDiagram>()
            .await
            .map_err(|e| EngineError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            "Phase engine returned {} stable phases for terminals {:?}",
            diagram.stable_entries.len(),
            terminals
        );
        Ok(diagram)
    }
}
