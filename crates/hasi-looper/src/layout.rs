//! Layout of the assignment vector
//!
//! ```text
//! [inputs][states][pulses][timers][stopwatches][clocks][randoms][4 syscalls][change][on][off]
//! ```
//!
//! Inputs are ordered like the connections, every other group by variable
//! order. Each derived slot records the position of the basic slot it
//! watches.

use hasi_core::{syscalls, ParseError, ParseResult, Special, Variable, VariableType, Vas};
use hasi_stores::{ClockManager, RandomManager};
use std::collections::BTreeSet;

/// A `change_`/`on_`/`off_` slot and the basic slot it watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedSlot {
    pub var: Variable,
    pub watched: usize,
}

/// Positions of every variable of the current script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    connections: Vec<String>,
    basics: Vec<Variable>,
    derived: Vec<DerivedSlot>,
}

impl Layout {
    /// Lay out the variables a script references
    ///
    /// Every derived variable pulls in its basic variable. System, clock and
    /// random names are validated here so that a bad script fails at parse
    /// time rather than mid-cycle.
    pub fn compute(variables: &BTreeSet<Variable>) -> ParseResult<Self> {
        let mut vars = variables.clone();
        vars.extend(variables.iter().filter(|v| v.is_derived()).map(Variable::basic));

        let mut connections: Vec<String> = Vec::new();
        let mut stored: Vec<Variable> = Vec::new();
        let mut changes = Vec::new();
        let mut ons = Vec::new();
        let mut offs = Vec::new();

        for var in &vars {
            match var.special() {
                Special::Change => changes.push(var.clone()),
                Special::On => ons.push(var.clone()),
                Special::Off => offs.push(var.clone()),
                Special::Basic => match var.var_type() {
                    VariableType::Input => {}
                    VariableType::System => {
                        if !syscalls::is_valid(var.name()) {
                            return Err(ParseError::InvalidSystemVariable {
                                name: var.name().to_string(),
                            });
                        }
                    }
                    VariableType::Clock => {
                        ClockManager::validate(var.name())?;
                        stored.push(var.clone());
                    }
                    VariableType::Random => {
                        RandomManager::validate(var.name())?;
                        stored.push(var.clone());
                    }
                    VariableType::State
                    | VariableType::Pulse
                    | VariableType::Timer
                    | VariableType::StopWatch => stored.push(var.clone()),
                },
            }

            if var.var_type() == VariableType::Input
                && !connections.iter().any(|c| c == var.name())
            {
                connections.push(var.name().to_string());
            }
        }

        // BTreeSet order already groups the stored variables by type
        let mut basics: Vec<Variable> = connections.iter().map(Variable::input).collect();
        basics.extend(stored);
        basics.extend(
            syscalls::ALL
                .iter()
                .map(|name| Variable::basic_of(VariableType::System, *name)),
        );

        let mut derived = Vec::with_capacity(changes.len() + ons.len() + offs.len());
        for var in changes.into_iter().chain(ons).chain(offs) {
            let basic = var.basic();
            let Some(watched) = basics.iter().position(|b| *b == basic) else {
                return Err(ParseError::MissingBasic {
                    basic: basic.basic_name(),
                    derived: var.raw_name(),
                });
            };
            derived.push(DerivedSlot { var, watched });
        }

        Ok(Self {
            connections,
            basics,
            derived,
        })
    }

    /// Input connection ids, in input order
    pub fn connections(&self) -> &[String] {
        &self.connections
    }

    /// Basic slots, inputs first, syscalls last
    pub fn basics(&self) -> &[Variable] {
        &self.basics
    }

    /// Derived slots in `[change][on][off]` order
    pub fn derived(&self) -> &[DerivedSlot] {
        &self.derived
    }

    /// Position of the first derived slot
    pub fn derived_offset(&self) -> usize {
        self.basics.len()
    }

    /// A fresh assignment vector with every slot at 0
    pub fn initial_vas(&self) -> Vas {
        self.basics
            .iter()
            .chain(self.derived.iter().map(|d| &d.var))
            .map(|var| (var.clone(), 0.0))
            .collect()
    }
}
