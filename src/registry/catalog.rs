//! Lookup of definition documents on disk.
//!
//! Definitions live as `<name>.toml` under the configured definitions
//! directory. The catalog resolves names to parsed documents and expands
//! profile slots into full test definitions before any run starts, so a
//! broken reference aborts with nothing written to disk.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::errors::{PtoError, Result};
use crate::registry::definition::{Definition, ProfileDefinition, TestDefinition};

/// One row of `list()` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionSummary {
    pub name: String,
    pub kind: &'static str,
    pub descp: String,
}

/// Resolves definition names against a directory of TOML documents.
#[derive(Debug, Clone)]
pub struct DefinitionCatalog {
    definitions_dir: PathBuf,
}

impl DefinitionCatalog {
    #[must_use]
    pub fn new(definitions_dir: impl Into<PathBuf>) -> Self {
        Self {
            definitions_dir: definitions_dir.into(),
        }
    }

    #[must_use]
    pub fn definition_path(&self, name: &str) -> PathBuf {
        self.definitions_dir.join(format!("{name}.toml"))
    }

    /// Load a definition of either kind by name.
    pub fn load(&self, name: &str) -> Result<Definition> {
        let path = self.definition_path(name);
        Self::parse(&path, "definition", name)
    }

    /// Load a definition from an explicit file path, for run requests that
    /// carry their own document instead of a catalog name.
    pub fn load_from_path(path: &Path) -> Result<Definition> {
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Self::parse(path, "definition", &name)
    }

    /// Load a test by name, rejecting profile documents.
    pub fn load_test(&self, name: &str) -> Result<TestDefinition> {
        let path = self.definition_path(name);
        match Self::parse(&path, "test", name)? {
            Definition::Test(test) => Ok(test),
            Definition::Profile(_) => Err(PtoError::DefinitionInvalidType {
                details: format!("[ {name} ] is a profile, expected a test"),
            }),
        }
    }

    /// Load a profile by name, rejecting test documents.
    pub fn load_profile(&self, name: &str) -> Result<ProfileDefinition> {
        let path = self.definition_path(name);
        match Self::parse(&path, "profile", name)? {
            Definition::Profile(profile) => Ok(profile),
            Definition::Test(_) => Err(PtoError::DefinitionInvalidType {
                details: format!("[ {name} ] is a test, expected a profile"),
            }),
        }
    }

    /// Expand a profile's slots into full test definitions, order preserved.
    ///
    /// Every slot must resolve. A single missing test fails the whole
    /// expansion up front, so profile execution never starts half-resolved.
    pub fn resolve_profile(&self, profile: &ProfileDefinition) -> Result<Vec<(u32, TestDefinition)>> {
        let mut tests = Vec::new();
        for (order, slot) in profile.ordered_tests()? {
            let test = self.load_test(&slot.name).map_err(|e| match e {
                PtoError::DefinitionNotFound { .. } => PtoError::InvalidDefinition {
                    name: profile.name.clone(),
                    details: format!(
                        "profile execution can't continue due missing test [ {} ]",
                        slot.name
                    ),
                },
                other => other,
            })?;
            tests.push((order, test));
        }
        Ok(tests)
    }

    /// Every parseable definition in the directory, sorted by name.
    ///
    /// Files that fail to parse are reported on stderr and skipped so one
    /// broken document does not hide the rest.
    pub fn list(&self) -> Result<Vec<DefinitionSummary>> {
        let entries = match fs::read_dir(&self.definitions_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PtoError::io(&self.definitions_dir, e)),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PtoError::io(&self.definitions_dir, e))?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "toml") {
                continue;
            }
            match Self::parse_file(&path) {
                Ok(def) => summaries.push(DefinitionSummary {
                    name: def.name().to_string(),
                    kind: def.kind(),
                    descp: def.descp().to_string(),
                }),
                Err(e) => {
                    eprintln!("[PTO-CONFIG] skipping {}: {e}", path.display());
                }
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    fn parse(path: &Path, kind: &'static str, name: &str) -> Result<Definition> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PtoError::DefinitionNotFound {
                    kind,
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(PtoError::io(path, e)),
        };
        let def: Definition = toml::from_str(&raw).map_err(|e| PtoError::InvalidDefinition {
            name: name.to_string(),
            details: e.to_string(),
        })?;
        match &def {
            Definition::Test(test) => test.validate()?,
            Definition::Profile(profile) => profile.validate()?,
        }
        Ok(def)
    }

    fn parse_file(path: &Path) -> Result<Definition> {
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Self::parse(path, "definition", &name)
    }
}
