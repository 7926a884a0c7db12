//! Variable assignments: the values the script engine sees each cycle

use crate::variable::Variable;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A variable bound to a value
#[derive(Debug, Clone, PartialEq)]
pub struct VarAssignment {
    pub var: Variable,
    pub value: f64,
}

impl VarAssignment {
    pub fn new(var: Variable, value: f64) -> Self {
        Self { var, value }
    }
}

impl fmt::Display for VarAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.var.describe(), self.value)
    }
}

/// A name bound to a value, as exchanged with devices and remotes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarStrAssignment {
    pub name: String,
    pub value: f64,
}

impl VarStrAssignment {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl fmt::Display for VarStrAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// The assignment vector, keyed by variable identity
///
/// Iteration order is insertion order, which the looper keeps equal to the
/// layout order `[inputs][states][pulses][timers][stopwatches][clocks]
/// [randoms][syscalls][change][on][off]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vas {
    values: IndexMap<Variable, f64>,
}

impl Vas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of assigned variables
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a variable, or overwrite its value if already present
    pub fn insert(&mut self, var: Variable, value: f64) {
        self.values.insert(var, value);
    }

    /// Overwrite the value of a present variable; returns false if absent
    pub fn set(&mut self, var: &Variable, value: f64) -> bool {
        match self.values.get_mut(var) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Overwrite the value at a layout position
    pub fn set_index(&mut self, index: usize, value: f64) -> bool {
        match self.values.get_index_mut(index) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Current value of a variable
    pub fn get(&self, var: &Variable) -> Option<f64> {
        self.values.get(var).copied()
    }

    /// Variable and value at a layout position
    pub fn get_index(&self, index: usize) -> Option<(&Variable, f64)> {
        self.values.get_index(index).map(|(var, value)| (var, *value))
    }

    /// Layout position of a variable
    pub fn index_of(&self, var: &Variable) -> Option<usize> {
        self.values.get_index_of(var)
    }

    pub fn contains(&self, var: &Variable) -> bool {
        self.values.contains_key(var)
    }

    /// Look up a value by its raw token name (`state_x`, `on_door`, ...)
    pub fn get_by_raw_name(&self, raw_name: &str) -> Option<f64> {
        Variable::parse(raw_name).ok().and_then(|var| self.get(&var))
    }

    /// Iterate in layout order
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, f64)> {
        self.values.iter().map(|(var, value)| (var, *value))
    }

    /// Owned copies of every assignment, in layout order
    pub fn assignments(&self) -> Vec<VarAssignment> {
        self.iter()
            .map(|(var, value)| VarAssignment::new(var.clone(), value))
            .collect()
    }

    /// Name/value pairs keyed by raw token name, in layout order
    pub fn to_str_assignments(&self) -> Vec<VarStrAssignment> {
        self.iter()
            .map(|(var, value)| VarStrAssignment::new(var.raw_name(), value))
            .collect()
    }
}

impl FromIterator<(Variable, f64)> for Vas {
    fn from_iter<I: IntoIterator<Item = (Variable, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Vas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Variable assignments:")?;
        for assignment in self.assignments() {
            writeln!(f, " {}", assignment)?;
        }
        Ok(())
    }
}
