use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::composition::Composition;

// DFT functional whose computed energies are queried from the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Functional {
    #[serde(rename = "GGA_GGA_U_R2SCAN")]
    GgaGgaUR2scan,
    #[serde(rename = "R2SCAN")]
    R2scan,
    #[serde(rename = "GGA_GGA_U")]
    GgaGgaU,
}

impl Functional {
    pub const ALL: [Functional; 3] = [Functional::GgaGgaUR2scan, Functional::R2scan, Functional::GgaGgaU];

    pub fn as_str(&self) -> &'static str {
        match self {
            Functional::GgaGgaUR2scan => "GGA_GGA_U_R2SCAN",
            Functional::R2scan => "R2SCAN",
            Functional::GgaGgaU => "GGA_GGA_U",
        }
    }

    /// Thermo types the materials database filters on for this functional.
    pub fn thermo_types(&self) -> &'static [&'static str] {
        match self {
            Functional::GgaGgaUR2scan => &["GGA_GGA+U", "R2SCAN"],
            Functional::R2scan => &["R2SCAN"],
            Functional::GgaGgaU => &["GGA_GGA+U"],
        }
    }

    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Functional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported functional: {0}. Supported: {list}", list = Functional::supported_list())]
pub struct UnknownFunctional(pub String);

impl FromStr for Functional {
    type Err = UnknownFunctional;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| UnknownFunctional(s.to_string()))
    }
}

// Temperature as it arrives: JSON number or a form/JSON string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TemperatureInput {
    Kelvin(i64),
    Text(String),
}

// JSON API request format
#[derive(Debug, Clone, Deserialize)]
pub struct DiagramPayload {
    pub f: Vec<String>,
    #[serde(default)]
    pub temp: Option<TemperatureInput>,
    #[serde(default)]
    pub e_cut: Option<f64>,
    #[serde(default)]
    pub functional: Option<String>,
}

// HTML form request format, formulas are comma-separated
#[derive(Debug, Clone, Deserialize)]
pub struct DiagramForm {
    pub formulas: String,
    #[serde(default)]
    pub temp: Option<String>,
    #[serde(default)]
    pub e_cut: Option<f64>,
    #[serde(default)]
    pub functional: Option<String>,
}

/// Canonical, validated diagram request.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramRequest {
    pub formulas: Vec<String>,
    pub temperature: u32,
    pub energy_cutoff: f64,
    pub functional: Functional,
}

// Entry as returned by the materials database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedEntry {
    #[serde(default)]
    pub entry_id: Option<String>,
    pub composition: Composition,
    pub energy: f64,
    #[serde(default)]
    pub correction: f64,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl ComputedEntry {
    pub fn energy_per_atom(&self) -> f64 {
        let atoms = self.composition.num_atoms();
        if atoms > 0.0 { self.energy / atoms } else { 0.0 }
    }
}

// One stable phase in the response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub formula: String,
    pub composition: String,
    pub energy_per_atom: f64,
    pub total_energy: f64,
    pub formation_energy_per_atom: Option<f64>,
    pub correction: f64,
    pub entry_id: String,
    pub temperature: u32,
    pub num_atoms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramMetadata {
    pub temperature: u32,
    pub elements: Vec<String>,
    pub e_cut: f64,
    pub functional: Functional,
    pub num_phases: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramResponse {
    pub plot: serde_json::Value,
    pub phase_info: Vec<PhaseInfo>,
    pub metadata: DiagramMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub error_code: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub app_name: String,
    pub version: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_round_trips_through_its_name() {
        for functional in Functional::ALL {
            assert_eq!(functional.as_str().parse::<Functional>(), Ok(functional));
        }
        assert_eq!(Functional::GgaGgaUR2scan.thermo_types(), &["GGA_GGA+U", "R2SCAN"]);
    }

    #[test]
    fn unknown_functional_lists_supported_values() {
        let err = "UNKNOWN".parse::<Functional>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported functional: UNKNOWN. Supported: GGA_GGA_U_R2SCAN, R2SCAN, GGA_GGA_U"
        );
    }

    #[test]
    fn payload_accepts_numeric_or_text_temperature() {
        let payload: DiagramPayload =
            serde_json::from_str(r#"{"f": ["Fe2O3", "Al2O3"], "temp": 300}"#).unwrap();
        assert_eq!(payload.temp, Some(TemperatureInput::Kelvin(300)));

        let payload: DiagramPayload =
            serde_json::from_str(r#"{"f": ["Fe2O3", "Al2O3"], "temp": "1200"}"#).unwrap();
        assert_eq!(payload.temp, Some(TemperatureInput::Text("1200".to_string())));
        assert!(payload.functional.is_none());
    }
}
