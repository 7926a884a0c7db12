//! Script variables: `[prefix_name]` tokens with a type and an edge modifier

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the value of a variable comes from
///
/// The declaration order is also the layout order of basic variables in the
/// assignment vector (after inputs come states, pulses, timers, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    /// Raw value read from a device channel
    Input,
    /// Persistent scalar
    State,
    /// Read-once value
    Pulse,
    /// Countdown timer
    Timer,
    /// Accumulating stopwatch
    StopWatch,
    /// Wall-clock component (hour, minute, ...)
    Clock,
    /// Uniform random integer
    Random,
    /// Supervisor-provided value (init, load, overload, delay)
    System,
}

/// Prefixes in the order they are tried; inputs carry no prefix.
const TYPE_PREFIXES: [(&str, VariableType); 7] = [
    ("sys_", VariableType::System),
    ("state_", VariableType::State),
    ("pulse_", VariableType::Pulse),
    ("timer_", VariableType::Timer),
    ("stopWatch_", VariableType::StopWatch),
    ("clock_", VariableType::Clock),
    ("random_", VariableType::Random),
];

impl VariableType {
    /// Token prefix for this type (empty for inputs)
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Input => "",
            Self::State => "state_",
            Self::Pulse => "pulse_",
            Self::Timer => "timer_",
            Self::StopWatch => "stopWatch_",
            Self::Clock => "clock_",
            Self::Random => "random_",
            Self::System => "sys_",
        }
    }

    /// Human readable type name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::State => "state",
            Self::Pulse => "pulse",
            Self::Timer => "timer",
            Self::StopWatch => "stopWatch",
            Self::Clock => "clock",
            Self::Random => "random",
            Self::System => "system",
        }
    }
}

/// Edge modifier of a variable
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Special {
    /// The plain value
    #[default]
    Basic,
    /// Difference to the previous cycle (0 when unchanged)
    Change,
    /// 1 on the cycle the watched value changed to non-zero
    On,
    /// 1 on the cycle the watched value changed to zero
    Off,
}

impl Special {
    /// Token prefix for this modifier (empty for basic variables)
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Basic => "",
            Self::Change => "change_",
            Self::On => "on_",
            Self::Off => "off_",
        }
    }

    /// Whether this is one of the derived (edge) modifiers
    pub fn is_derived(self) -> bool {
        self != Self::Basic
    }
}

/// A script variable such as `[on_state_alarm]`
///
/// Identity, equality and ordering are defined on `(type, special, name)`.
/// The raw token is always reconstructible from those three parts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Variable {
    var_type: VariableType,
    special: Special,
    name: String,
}

impl Variable {
    /// Create a variable from its parts
    pub fn new(var_type: VariableType, special: Special, name: impl Into<String>) -> Self {
        Self {
            var_type,
            special,
            name: name.into(),
        }
    }

    /// Shorthand for a basic variable of the given type
    pub fn basic_of(var_type: VariableType, name: impl Into<String>) -> Self {
        Self::new(var_type, Special::Basic, name)
    }

    /// Shorthand for an input variable (a device connection id)
    pub fn input(name: impl Into<String>) -> Self {
        Self::basic_of(VariableType::Input, name)
    }

    /// Parse a token, with or without the surrounding brackets
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        let invalid = |reason: &str| ParseError::InvalidVariable {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = token.trim();
        let raw = match (trimmed.strip_prefix('['), trimmed.strip_suffix(']')) {
            (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(invalid("unbalanced brackets")),
        };

        if raw.is_empty() {
            return Err(invalid("empty name"));
        }
        if raw
            .chars()
            .any(|c| c.is_whitespace() || c == '[' || c == ']')
        {
            return Err(invalid("name contains whitespace or brackets"));
        }

        let (special, rest) = [Special::Change, Special::On, Special::Off]
            .into_iter()
            .find_map(|s| raw.strip_prefix(s.prefix()).map(|rest| (s, rest)))
            .unwrap_or((Special::Basic, raw));

        let (var_type, name) = TYPE_PREFIXES
            .iter()
            .find_map(|(prefix, t)| rest.strip_prefix(prefix).map(|name| (*t, name)))
            .unwrap_or((VariableType::Input, rest));

        if name.is_empty() {
            return Err(invalid("missing name after prefix"));
        }

        Ok(Self::new(var_type, special, name))
    }

    /// Where the value comes from
    pub fn var_type(&self) -> VariableType {
        self.var_type
    }

    /// Edge modifier
    pub fn special(&self) -> Special {
        self.special
    }

    /// Name without any prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type prefix plus name, without the edge modifier (`state_alarm`)
    pub fn basic_name(&self) -> String {
        format!("{}{}", self.var_type.prefix(), self.name)
    }

    /// Full token text without brackets (`on_state_alarm`)
    pub fn raw_name(&self) -> String {
        format!(
            "{}{}{}",
            self.special.prefix(),
            self.var_type.prefix(),
            self.name
        )
    }

    /// The same variable without its edge modifier
    pub fn basic(&self) -> Self {
        Self::new(self.var_type, Special::Basic, self.name.clone())
    }

    /// Whether this is an on/off/change variable
    pub fn is_derived(&self) -> bool {
        self.special.is_derived()
    }

    /// Long form used in event logs: `[alarm (on_state)]`
    pub fn describe(&self) -> String {
        format!(
            "[{} ({}{})]",
            self.name,
            self.special.prefix(),
            self.var_type.as_str()
        )
    }
}

impl FromStr for Variable {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Variable {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Variable> for String {
    fn from(var: Variable) -> String {
        var.raw_name()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.raw_name())
    }
}
