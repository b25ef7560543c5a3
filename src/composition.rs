//! Chemical formula parsing.
//!
//! Accepts formulas such as `Fe2O3`, `Ca(OH)2`, `[Co(NH3)6]Cl3` or `Li0.5CoO2`
//! and turns them into element amounts. Element symbols are matched greedily
//! (`Co` is cobalt, `CO` is carbon and oxygen) and must exist in the periodic
//! table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const AMOUNT_TOLERANCE: f64 = 1e-8;

// deepest bracket nesting accepted, e.g. `[Co(NH3)6]` is depth 2
pub const MAX_NESTING: usize = 8;

// (symbol, Pauling electronegativity)
const ELEMENTS: &[(&str, Option<f64>)] = &[
    ("H", Some(2.20)), ("He", None), ("Li", Some(0.98)), ("Be", Some(1.57)),
    ("B", Some(2.04)), ("C", Some(2.55)), ("N", Some(3.04)), ("O", Some(3.44)),
    ("F", Some(3.98)), ("Ne", None), ("Na", Some(0.93)), ("Mg", Some(1.31)),
    ("Al", Some(1.61)), ("Si", Some(1.90)), ("P", Some(2.19)), ("S", Some(2.58)),
    ("Cl", Some(3.16)), ("Ar", None), ("K", Some(0.82)), ("Ca", Some(1.00)),
    ("Sc", Some(1.36)), ("Ti", Some(1.54)), ("V", Some(1.63)), ("Cr", Some(1.66)),
    ("Mn", Some(1.55)), ("Fe", Some(1.83)), ("Co", Some(1.88)), ("Ni", Some(1.91)),
    ("Cu", Some(1.90)), ("Zn", Some(1.65)), ("Ga", Some(1.81)), ("Ge", Some(2.01)),
    ("As", Some(2.18)), ("Se", Some(2.55)), ("Br", Some(2.96)), ("Kr", Some(3.00)),
    ("Rb", Some(0.82)), ("Sr", Some(0.95)), ("Y", Some(1.22)), ("Zr", Some(1.33)),
    ("Nb", Some(1.60)), ("Mo", Some(2.16)), ("Tc", Some(1.90)), ("Ru", Some(2.20)),
    ("Rh", Some(2.28)), ("Pd", Some(2.20)), ("Ag", Some(1.93)), ("Cd", Some(1.69)),
    ("In", Some(1.78)), ("Sn", Some(1.96)), ("Sb", Some(2.05)), ("Te", Some(2.10)),
    ("I", Some(2.66)), ("Xe", Some(2.60)), ("Cs", Some(0.79)), ("Ba", Some(0.89)),
    ("La", Some(1.10)), ("Ce", Some(1.12)), ("Pr", Some(1.13)), ("Nd", Some(1.14)),
    ("Pm", Some(1.13)), ("Sm", Some(1.17)), ("Eu", Some(1.20)), ("Gd", Some(1.20)),
    ("Tb", Some(1.10)), ("Dy", Some(1.22)), ("Ho", Some(1.23)), ("Er", Some(1.24)),
    ("Tm", Some(1.25)), ("Yb", Some(1.10)), ("Lu", Some(1.27)), ("Hf", Some(1.30)),
    ("Ta", Some(1.50)), ("W", Some(2.36)), ("Re", Some(1.90)), ("Os", Some(2.20)),
    ("Ir", Some(2.20)), ("Pt", Some(2.28)), ("Au", Some(2.54)), ("Hg", Some(2.00)),
    ("Tl", Some(1.62)), ("Pb", Some(2.33)), ("Bi", Some(2.02)), ("Po", Some(2.00)),
    ("At", Some(2.20)), ("Rn", Some(2.20)), ("Fr", Some(0.70)), ("Ra", Some(0.90)),
    ("Ac", Some(1.10)), ("Th", Some(1.30)), ("Pa", Some(1.50)), ("U", Some(1.38)),
    ("Np", Some(1.36)), ("Pu", Some(1.28)), ("Am", Some(1.30)), ("Cm", Some(1.30)),
    ("Bk", Some(1.30)), ("Cf", Some(1.30)), ("Es", Some(1.30)), ("Fm", Some(1.30)),
    ("Md", Some(1.30)), ("No", Some(1.30)), ("Lr", Some(1.30)), ("Rf", None),
    ("Db", None), ("Sg", None), ("Bh", None), ("Hs", None),
    ("Mt", None), ("Ds", None), ("Rg", None), ("Cn", None),
    ("Nh", None), ("Fl", None), ("Mc", None), ("Lv", None),
    ("Ts", None), ("Og", None),
];

fn lookup(symbol: &str) -> Option<(&'static str, Option<f64>)> {
    ELEMENTS.iter().find(|(s, _)| *s == symbol).copied()
}

pub fn is_element(symbol: &str) -> bool {
    lookup(symbol).is_some()
}

fn electronegativity(symbol: &str) -> Option<f64> {
    lookup(symbol).and_then(|(_, x)| x)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositionError {
    #[error("formula is empty")]
    Empty,

    #[error("unknown element '{0}'")]
    UnknownElement(String),

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unbalanced brackets")]
    UnbalancedBracket,

    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("brackets nested deeper than {max} levels")]
    TooDeep { max: usize },
}

/// Element symbol to amount.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Composition(BTreeMap<String, f64>);

impl Composition {
    pub fn parse(formula: &str) -> Result<Self, CompositionError> {
        let mut parser = Parser {
            chars: formula.chars().collect(),
            pos: 0,
            depth: 0,
        };
        let amounts = parser.group(None)?;
        if amounts.is_empty() {
            return Err(CompositionError::Empty);
        }
        Ok(Self(amounts))
    }

    pub fn amount(&self, symbol: &str) -> f64 {
        self.0.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn num_atoms(&self) -> f64 {
        self.0.values().map(|a| a.abs()).sum()
    }

    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    // elements ordered by electronegativity, unknown values last
    fn ordered(&self) -> Vec<(&str, f64)> {
        let mut items: Vec<(&str, f64)> = self.0.iter().map(|(s, a)| (s.as_str(), *a)).collect();
        items.sort_by(|(a, _), (b, _)| {
            let xa = electronegativity(a).unwrap_or(f64::INFINITY);
            let xb = electronegativity(b).unwrap_or(f64::INFINITY);
            xa.total_cmp(&xb).then_with(|| a.cmp(b))
        });
        items
    }

    /// Space separated formula keeping every amount, e.g. `Fe2 O3`, `Fe1 O1`.
    pub fn formula(&self) -> String {
        self.ordered()
            .into_iter()
            .map(|(symbol, amount)| format!("{}{}", symbol, format_amount(amount, false)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Compact formula with integral amounts divided by their common divisor.
    pub fn reduced_formula(&self) -> String {
        let factor = self.reduction_factor();
        self.ordered()
            .into_iter()
            .map(|(symbol, amount)| format!("{}{}", symbol, format_amount(amount / factor, true)))
            .collect()
    }

    fn reduction_factor(&self) -> f64 {
        let mut divisor = 0u64;
        for amount in self.0.values() {
            if (amount - amount.round()).abs() > AMOUNT_TOLERANCE || *amount < 1.0 {
                return 1.0;
            }
            divisor = gcd(divisor, amount.round() as u64);
        }
        if divisor == 0 { 1.0 } else { divisor as f64 }
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formula())
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn format_amount(amount: f64, ignore_ones: bool) -> String {
    if (amount - 1.0).abs() < AMOUNT_TOLERANCE && ignore_ones {
        return String::new();
    }
    if (amount - amount.round()).abs() < AMOUNT_TOLERANCE {
        return format!("{}", amount.round() as i64);
    }
    let text = format!("{:.4}", amount);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Sorted unique element symbols across a set of formulas.
pub fn elements_from_formulas<S: AsRef<str>>(formulas: &[S]) -> Result<Vec<String>, CompositionError> {
    let mut elements = BTreeSet::new();
    for formula in formulas {
        let composition = Composition::parse(formula.as_ref())?;
        elements.extend(composition.elements().map(str::to_string));
    }
    Ok(elements.into_iter().collect())
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn group(&mut self, closing: Option<char>) -> Result<BTreeMap<String, f64>, CompositionError> {
        let mut amounts: BTreeMap<String, f64> = BTreeMap::new();

        loop {
            self.skip_whitespace();
            let Some(ch) = self.peek() else {
                if closing.is_some() {
                    return Err(CompositionError::UnbalancedBracket);
                }
                break;
            };

            if Some(ch) == closing {
                self.pos += 1;
                break;
            }

            match ch {
                '(' | '[' => {
                    self.pos += 1;
                    let close = if ch == '(' { ')' } else { ']' };
                    if self.depth >= MAX_NESTING {
                        return Err(CompositionError::TooDeep { max: MAX_NESTING });
                    }
                    self.depth += 1;
                    let inner = self.group(Some(close))?;
                    self.depth -= 1;
                    if inner.is_empty() {
                        return Err(CompositionError::Empty);
                    }
                    let factor = self.amount()?.unwrap_or(1.0);
                    for (symbol, amount) in inner {
                        *amounts.entry(symbol).or_insert(0.0) += amount * factor;
                    }
                }
                ')' | ']' => return Err(CompositionError::UnbalancedBracket),
                c if c.is_ascii_uppercase() => {
                    let symbol = self.symbol();
                    if !is_element(&symbol) {
                        return Err(CompositionError::UnknownElement(symbol));
                    }
                    let amount = self.amount()?.unwrap_or(1.0);
                    *amounts.entry(symbol).or_insert(0.0) += amount;
                }
                other => {
                    return Err(CompositionError::UnexpectedChar {
                        ch: other,
                        pos: self.pos,
                    });
                }
            }
        }

        Ok(amounts)
    }

    fn symbol(&mut self) -> String {
        let start = self.pos;
        self.pos += 1;
        while self.peek().is_some_and(|c| c.is_ascii_lowercase()) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn amount(&mut self) -> Result<Option<f64>, CompositionError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        match text.parse::<f64>() {
            Ok(value) if value > 0.0 && value.is_finite() => Ok(Some(value)),
            _ => Err(CompositionError::InvalidAmount(text)),
        }
    }
}
