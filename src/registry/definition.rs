//! Test and profile definition documents.
//!
//! A test definition names its cases by numeric order slot; a profile names
//! tests the same way. Order keys are TOML table keys, so they arrive as
//! strings and are validated into numbers here. A case is addressed by the
//! pair (name, order) since the same case may appear at several slots.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{PtoError, Result};

/// How a case tolerates simultaneous copies of itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseMode {
    Normal,
    Concurrency,
}

impl CaseMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Concurrency => "concurrency",
        }
    }
}

impl fmt::Display for CaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audience a run serves. Only automation runs are wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserMode {
    Automation,
    Interactive,
    Gui,
}

impl UserMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automation => "automation",
            Self::Interactive => "interactive",
            Self::Gui => "gui",
        }
    }
}

impl fmt::Display for UserMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserMode {
    type Err = PtoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "automation" => Ok(Self::Automation),
            "interactive" | "shell" => Ok(Self::Interactive),
            "gui" => Ok(Self::Gui),
            _ => Err(PtoError::Runtime {
                details: format!("ERROR: User Mode [ {s} ] - Not supported yet"),
            }),
        }
    }
}

/// Which user modes a test is allowed to run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserModes {
    pub automation: bool,
    pub interactive: bool,
    pub gui: bool,
}

impl Default for UserModes {
    fn default() -> Self {
        Self {
            automation: true,
            interactive: false,
            gui: false,
        }
    }
}

impl UserModes {
    #[must_use]
    pub const fn enabled(&self, mode: UserMode) -> bool {
        match mode {
            UserMode::Automation => self.automation,
            UserMode::Interactive => self.interactive,
            UserMode::Gui => self.gui,
        }
    }
}

/// One case slot inside a test definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseSpec {
    /// Case name; must match a registered case body.
    pub name: String,
    #[serde(default)]
    pub descp: String,
    pub mode: CaseMode,
    /// How many worker instances to launch, and (with the process table) the
    /// most that may be alive at once.
    #[serde(default = "default_instances")]
    pub concurrency_inst: u32,
    /// Protected workers are asked to finish on interruption instead of being
    /// killed.
    #[serde(default)]
    pub protected: bool,
    /// Comma-separated `key=value` pairs forwarded to the case body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

const fn default_instances() -> u32 {
    1
}

impl CaseSpec {
    /// User arguments split out of the comma-separated form.
    #[must_use]
    pub fn user_args(&self) -> Vec<String> {
        match self.args.as_deref() {
            Some(raw) if !raw.is_empty() => raw.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

/// A test: named, gated by user modes, carrying ordered case slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestDefinition {
    pub name: String,
    #[serde(default)]
    pub descp: String,
    #[serde(default)]
    pub usermodes: UserModes,
    pub test_cases: BTreeMap<String, CaseSpec>,
}

impl TestDefinition {
    /// Case slots sorted by numeric order.
    pub fn ordered_cases(&self) -> Result<Vec<(u32, &CaseSpec)>> {
        let mut cases = Vec::with_capacity(self.test_cases.len());
        for (key, spec) in &self.test_cases {
            let order = parse_order(&self.name, key)?;
            cases.push((order, spec));
        }
        cases.sort_by_key(|(order, _)| *order);
        for pair in cases.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(PtoError::InvalidDefinition {
                    name: self.name.clone(),
                    details: format!("duplicate case order [ {} ]", pair[0].0),
                });
            }
        }
        Ok(cases)
    }

    /// The case occupying `order`, if its name matches.
    #[must_use]
    pub fn case_by(&self, case: &str, order: u32) -> Option<&CaseSpec> {
        self.test_cases.iter().find_map(|(key, spec)| {
            (key.parse() == Ok(order) && spec.name == case).then_some(spec)
        })
    }

    /// Whether the test may run under `mode`.
    #[must_use]
    pub const fn runs_under(&self, mode: UserMode) -> bool {
        self.usermodes.enabled(mode)
    }

    /// Structural checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PtoError::InvalidDefinition {
                name: "<unnamed>".to_string(),
                details: "test name is empty".to_string(),
            });
        }
        let cases = self.ordered_cases()?;
        for (order, spec) in cases {
            if spec.name.is_empty() {
                return Err(PtoError::InvalidDefinition {
                    name: self.name.clone(),
                    details: format!("case at order [ {order} ] has no name"),
                });
            }
            if spec.concurrency_inst == 0 {
                return Err(PtoError::InvalidDefinition {
                    name: self.name.clone(),
                    details: format!(
                        "case [ {} ] at order [ {order} ] has concurrency_inst 0",
                        spec.name
                    ),
                });
            }
        }
        Ok(())
    }
}

/// One test slot inside a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileSlot {
    pub name: String,
    #[serde(default)]
    pub descp: String,
}

/// A profile: named, ordered list of tests to run back to back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileDefinition {
    pub name: String,
    #[serde(default)]
    pub descp: String,
    pub tests: BTreeMap<String, ProfileSlot>,
}

impl ProfileDefinition {
    /// Test slots sorted by numeric order.
    pub fn ordered_tests(&self) -> Result<Vec<(u32, &ProfileSlot)>> {
        let mut slots = Vec::with_capacity(self.tests.len());
        for (key, slot) in &self.tests {
            let order = parse_order(&self.name, key)?;
            slots.push((order, slot));
        }
        slots.sort_by_key(|(order, _)| *order);
        for pair in slots.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(PtoError::InvalidDefinition {
                    name: self.name.clone(),
                    details: format!("duplicate test order [ {} ]", pair[0].0),
                });
            }
        }
        Ok(slots)
    }

    /// Structural checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PtoError::InvalidDefinition {
                name: "<unnamed>".to_string(),
                details: "profile name is empty".to_string(),
            });
        }
        self.ordered_tests().map(|_| ())
    }
}

/// Either kind of definition document, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Definition {
    Test(TestDefinition),
    Profile(ProfileDefinition),
}

impl Definition {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Test(t) => &t.name,
            Self::Profile(p) => &p.name,
        }
    }

    #[must_use]
    pub fn descp(&self) -> &str {
        match self {
            Self::Test(t) => &t.descp,
            Self::Profile(p) => &p.descp,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Test(_) => "test",
            Self::Profile(_) => "profile",
        }
    }
}

fn parse_order(owner: &str, key: &str) -> Result<u32> {
    key.parse().map_err(|_| PtoError::InvalidDefinition {
        name: owner.to_string(),
        details: format!("order key [ {key} ] is not a number"),
    })
}
