use std::cmp::Ordering;
use std::sync::Arc;

use crate::composition::{Composition, CompositionError, elements_from_formulas};
use crate::engine::{EngineError, PhaseDiagram, PhaseDiagramEngine, StableEntry};
use crate::materials::{MaterialsClient, MaterialsError};
use crate::models::{ComputedEntry, DiagramMetadata, DiagramRequest, DiagramResponse, PhaseInfo};

// entries whose energies differ by less than this are the same calculation
const ENERGY_MATCH_TOLERANCE: f64 = 1e-4;
const ID_DATA_KEYS: [&str; 4] = ["material_id", "entry_id", "mp_id", "task_id"];

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid chemical formula: {formula}")]
    Formula {
        formula: String,
        source: CompositionError,
    },

    #[error(transparent)]
    Materials(#[from] MaterialsError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// Orchestrates the materials database and the phase engine
pub struct PhaseAnalyzer {
    materials: Arc<dyn MaterialsClient>,
    engine: Arc<dyn PhaseDiagramEngine>,
}

impl PhaseAnalyzer {
    pub fn new(materials: Arc<dyn MaterialsClient>, engine: Arc<dyn PhaseDiagramEngine>) -> Self {
        Self { materials, engine }
    }

    pub async fn generate(
        &self,
        request: &DiagramRequest,
        api_key: &str,
    ) -> Result<DiagramResponse, AnalysisError> {
        tracing::info!(
            "Generating phase diagram for {:?} at {}K",
            request.formulas,
            request.temperature
        );

        let elements = elements_from_formulas(request.formulas.as_slice()).map_err(|source| {
            let formula = request
                .formulas
                .iter()
                .find(|f| Composition::parse(f).is_err())
                .cloned()
                .unwrap_or_default();
            AnalysisError::Formula { formula, source }
        })?;

        let entries = self
            .materials
            .fetch_entries(api_key, &elements, request.temperature, request.functional)
            .await?;

        let diagram = self
            .engine
            .compute_stable_phases(&entries, &request.formulas, request.energy_cutoff)
            .await?;

        let phase_info = self.extract_phase_info(&diagram, &entries, request.temperature);

        let metadata = DiagramMetadata {
            temperature: request.temperature,
            elements,
            e_cut: request.energy_cutoff,
            functional: request.functional,
            num_phases: phase_info.len(),
        };

        tracing::info!(
            "Phase diagram generated successfully with {} phases",
            phase_info.len()
        );

        Ok(DiagramResponse {
            plot: diagram.plot,
            phase_info,
            metadata,
        })
    }

    /// Stable phases, most negative formation energy first. Phases without a
    /// formation energy go last.
    pub fn extract_phase_info(
        &self,
        diagram: &PhaseDiagram,
        fetched: &[ComputedEntry],
        temperature: u32,
    ) -> Vec<PhaseInfo> {
        tracing::info!(
            "Extracting phase info for {} stable phases",
            diagram.stable_entries.len()
        );

        let mut phases: Vec<PhaseInfo> = diagram
            .stable_entries
            .iter()
            .map(|stable| {
                let original = original_entry(stable, fetched);
                self.phase_data(stable, original, temperature)
            })
            .collect();

        phases.sort_by(|a, b| match (a.formation_energy_per_atom, b.formation_energy_per_atom) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        phases
    }

    fn phase_data(&self, stable: &StableEntry, original: &ComputedEntry, temperature: u32) -> PhaseInfo {
        let composition = &original.composition;
        let formula = composition.reduced_formula();

        let formation_energy = self.engine.formation_energy_per_atom(stable);
        if formation_energy.is_none() {
            tracing::warn!("Could not calculate formation energy for {}", formula);
        }

        let entry_id = entry_id(original);
        tracing::debug!("Phase: {}, MP ID: {}", formula, entry_id);

        PhaseInfo {
            composition: composition.formula(),
            energy_per_atom: round4(stable.entry.energy_per_atom()),
            total_energy: round4(stable.entry.energy),
            formation_energy_per_atom: formation_energy.map(round4),
            correction: round4(stable.entry.correction),
            entry_id,
            temperature,
            num_atoms: composition.num_atoms(),
            formula,
        }
    }
}

// Entry as fetched from the database for a (possibly transformed) stable entry
fn original_entry<'a>(stable: &'a StableEntry, fetched: &'a [ComputedEntry]) -> &'a ComputedEntry {
    if let Some(original) = &stable.original_entry {
        return original;
    }
    if let Some(original) = fetched
        .iter()
        .find(|e| (e.energy - stable.entry.energy).abs() < ENERGY_MATCH_TOLERANCE)
    {
        return original;
    }
    tracing::warn!("No original entry found for {}", stable.entry.composition);
    &stable.entry
}

fn entry_id(entry: &ComputedEntry) -> String {
    if let Some(id) = entry.entry_id.as_deref().filter(|id| !id.is_empty() && *id != "None") {
        return id.to_string();
    }
    ID_DATA_KEYS
        .iter()
        .filter_map(|key| entry.data.get(*key))
        .find_map(|value| match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "Unknown".to_string())
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
