//! Turns JSON or form input into a canonical [`DiagramRequest`].
//!
//! Checks run in a fixed order (formulas, temperature, energy cutoff,
//! functional) and the first violation is reported.

use std::collections::HashSet;

use crate::composition::{Composition, CompositionError};
use crate::models::{DiagramForm, DiagramPayload, DiagramRequest, Functional, TemperatureInput};

pub const MAX_FORMULA_LENGTH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationLimits {
    pub min_formulas: usize,
    pub max_formulas: usize,
    pub min_temperature: u32,
    pub max_temperature: u32,
    pub max_energy_cutoff: f64,
    pub default_energy_cutoff: f64,
    pub default_functional: Functional,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            min_formulas: 2,
            max_formulas: 4,
            min_temperature: 300,
            max_temperature: 2000,
            max_energy_cutoff: 2.0,
            default_energy_cutoff: 0.2,
            default_functional: Functional::GgaGgaUR2scan,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("At least {min} chemical formulas are required")]
    TooFewFormulas { min: usize },

    #[error("Maximum {max} formulas allowed")]
    TooManyFormulas { max: usize },

    #[error("Chemical formula longer than {max} characters")]
    FormulaTooLong { max: usize },

    #[error("Duplicate chemical formula: {0}")]
    DuplicateFormula(String),

    #[error("Invalid chemical formula: {formula} ({source})")]
    InvalidFormula {
        formula: String,
        source: CompositionError,
    },

    #[error("Temperature must be 0 K or between {min}-{max} K")]
    TemperatureOutOfRange { min: u32, max: u32 },

    #[error("Energy cutoff must be between 0 and {max} eV/atom")]
    CutoffOutOfRange { max: f64 },

    #[error("Unsupported functional: {given}. Supported: {supported}")]
    UnsupportedFunctional { given: String, supported: String },
}

pub fn validate_payload(
    payload: DiagramPayload,
    limits: &ValidationLimits,
) -> Result<DiagramRequest, ValidationError> {
    validate(
        payload.f.iter().map(String::as_str),
        payload.temp.as_ref(),
        payload.e_cut,
        payload.functional.as_deref(),
        limits,
    )
}

pub fn validate_form(
    form: DiagramForm,
    limits: &ValidationLimits,
) -> Result<DiagramRequest, ValidationError> {
    let temp = form.temp.map(TemperatureInput::Text);
    validate(
        form.formulas.split(','),
        temp.as_ref(),
        form.e_cut,
        form.functional.as_deref(),
        limits,
    )
}

fn validate<'a>(
    formulas: impl Iterator<Item = &'a str>,
    temp: Option<&TemperatureInput>,
    e_cut: Option<f64>,
    functional: Option<&str>,
    limits: &ValidationLimits,
) -> Result<DiagramRequest, ValidationError> {
    let formulas = validate_formulas(formulas, limits)?;
    let temperature = validate_temperature(temp.map(parse_temperature).unwrap_or(0), limits)?;
    let energy_cutoff = validate_cutoff(e_cut.unwrap_or(limits.default_energy_cutoff), limits)?;
    let functional = match functional {
        Some(name) => validate_functional(name)?,
        None => limits.default_functional,
    };

    Ok(DiagramRequest {
        formulas,
        temperature,
        energy_cutoff,
        functional,
    })
}

pub fn validate_formulas<'a>(
    formulas: impl Iterator<Item = &'a str>,
    limits: &ValidationLimits,
) -> Result<Vec<String>, ValidationError> {
    let cleaned: Vec<String> = formulas
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    if cleaned.len() < limits.min_formulas {
        return Err(ValidationError::TooFewFormulas {
            min: limits.min_formulas,
        });
    }
    if cleaned.len() > limits.max_formulas {
        return Err(ValidationError::TooManyFormulas {
            max: limits.max_formulas,
        });
    }

    let mut seen = HashSet::new();
    for formula in &cleaned {
        if formula.chars().count() > MAX_FORMULA_LENGTH {
            return Err(ValidationError::FormulaTooLong {
                max: MAX_FORMULA_LENGTH,
            });
        }
        if !seen.insert(formula.as_str()) {
            return Err(ValidationError::DuplicateFormula(formula.clone()));
        }
        Composition::parse(formula).map_err(|source| ValidationError::InvalidFormula {
            formula: formula.clone(),
            source,
        })?;
    }

    Ok(cleaned)
}

/// Blank or unparseable text becomes 0 K. Form clients have always relied on
/// this, so it is kept rather than reported.
pub fn parse_temperature(input: &TemperatureInput) -> i64 {
    match input {
        TemperatureInput::Kelvin(k) => *k,
        TemperatureInput::Text(text) => text.trim().parse::<i64>().unwrap_or(0),
    }
}

pub fn validate_temperature(kelvin: i64, limits: &ValidationLimits) -> Result<u32, ValidationError> {
    let in_range = kelvin >= i64::from(limits.min_temperature)
        && kelvin <= i64::from(limits.max_temperature);
    if kelvin == 0 || in_range {
        Ok(kelvin as u32)
    } else {
        Err(ValidationError::TemperatureOutOfRange {
            min: limits.min_temperature,
            max: limits.max_temperature,
        })
    }
}

pub fn validate_cutoff(e_cut: f64, limits: &ValidationLimits) -> Result<f64, ValidationError> {
    // NaN fails both comparisons
    if e_cut >= 0.0 && e_cut <= limits.max_energy_cutoff {
        Ok(e_cut)
    } else {
        Err(ValidationError::CutoffOutOfRange {
            max: limits.max_energy_cutoff,
        })
    }
}

pub fn validate_functional(name: &str) -> Result<Functional, ValidationError> {
    name.parse::<Functional>()
        .map_err(|_| ValidationError::UnsupportedFunctional {
            given: name.to_string(),
            supported: Functional::supported_list(),
        })
}
