//! Named numeric constants consumed by function constructors
//!
//! Parsing parameter strings happens outside this crate. Constructors only see
//! the resulting name -> value lookup and reject names they do not declare.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Name -> value lookup for function constants
///
/// ```
/// use nnmatrix::function::FunctionParams;
///
/// let params = FunctionParams::new().with("threshold", 0.5).with("alpha", 0.01);
/// assert_eq!(params.get("alpha"), Some(0.01));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunctionParams {
    values: BTreeMap<String, f64>,
}

impl FunctionParams {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Look up a value by name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value for `name`, or `default` when absent
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    /// Iterate names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// True when no values are set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reject any name not in `accepted`
    pub(crate) fn validate(&self, function: &str, accepted: &[&str]) -> Result<()> {
        for name in self.names() {
            if !accepted.contains(&name) {
                tracing::debug!(function, name, "rejecting undeclared function parameter");
                return Err(Error::invalid_parameter(function, name));
            }
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for FunctionParams {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Declaration string for a set of DOUBLE parameters, e.g. `(threshold:DOUBLE), (alpha:DOUBLE)`
pub(crate) fn declaration(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("({name}:DOUBLE)"))
        .collect::<Vec<_>>()
        .join(", ")
}
