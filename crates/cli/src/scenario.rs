//! Scenario files
//!
//! ```toml
//! capabilities = ["MutationObserver"]
//! loading = false
//!
//! [watcher]
//! targets = [".watched"]
//! debounce_ms = 150
//!
//! [[element]]
//! name = "feed"
//! tag = "section"
//! attributes = { class = "watched" }
//!
//! [[step]]
//! action = "start"
//!
//! [[step]]
//! action = "set-attribute"
//! element = "feed"
//! attribute = "data-x"
//! value = "1"
//!
//! [[step]]
//! action = "wait"
//! ms = 200
//! ```

use anyhow::{bail, Context, Result};
use domwatch_core::{WatcherConfig, CAPABILITY_NAMES};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Element names that always exist
pub const BUILTIN_ELEMENTS: [&str; 2] = ["html", "body"];

/// A replayable scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Global constructor names the document exposes
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Start with the document still loading
    #[serde(default)]
    pub loading: bool,

    /// Watcher configuration
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Initial elements, created in order
    #[serde(default, rename = "element")]
    pub elements: Vec<ElementSpec>,

    /// Steps, replayed in order
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_capabilities() -> Vec<String> {
    vec![CAPABILITY_NAMES[0].to_string()]
}

/// An element created before replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementSpec {
    /// Scenario-local name that steps refer to
    pub name: String,
    pub tag: String,
    /// Parent element name (default: body)
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// One replay step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Start,
    Stop,
    SetAttribute {
        element: String,
        attribute: String,
        #[serde(default)]
        value: String,
    },
    RemoveAttribute {
        element: String,
        attribute: String,
    },
    /// Append a new child; `name` makes it addressable by later steps
    Append {
        parent: String,
        tag: String,
        #[serde(default)]
        name: Option<String>,
    },
    Remove {
        element: String,
    },
    /// Put the document back into its loading phase
    Loading,
    /// Finish loading and fire ready listeners
    Ready,
    Wait {
        ms: u64,
    },
}

impl Scenario {
    /// Parse and validate a scenario document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(text).context("Failed to parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    /// Check the watcher config and that every element reference resolves
    pub fn validate(&self) -> Result<()> {
        self.watcher.validate()?;

        let mut known: BTreeSet<&str> = BUILTIN_ELEMENTS.into_iter().collect();

        for (i, element) in self.elements.iter().enumerate() {
            if element.tag.trim().is_empty() {
                bail!("element[{}] '{}' has an empty tag", i, element.name);
            }
            if let Some(parent) = &element.parent {
                if !known.contains(parent.as_str()) {
                    bail!(
                        "element[{}] '{}' refers to unknown parent '{}'",
                        i,
                        element.name,
                        parent
                    );
                }
            }
            if !known.insert(element.name.as_str()) {
                bail!("element[{}] reuses the name '{}'", i, element.name);
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::SetAttribute { element, .. }
                | Step::RemoveAttribute { element, .. } => require(&known, i, element)?,
                Step::Remove { element } => {
                    require(&known, i, element)?;
                    if BUILTIN_ELEMENTS.contains(&element.as_str()) {
                        bail!("step[{}] cannot remove '{}'", i, element);
                    }
                }
                Step::Append { parent, tag, name } => {
                    require(&known, i, parent)?;
                    if tag.trim().is_empty() {
                        bail!("step[{}] appends an element with an empty tag", i);
                    }
                    if let Some(name) = name {
                        if !known.insert(name.as_str()) {
                            bail!("step[{}] reuses the name '{}'", i, name);
                        }
                    }
                }
                Step::Start | Step::Stop | Step::Loading | Step::Ready | Step::Wait { .. } => {}
            }
        }

        Ok(())
    }

    /// Total time spent in `wait` steps, in milliseconds
    pub fn scripted_ms(&self) -> u64 {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Wait { ms } => *ms,
                _ => 0,
            })
            .sum()
    }
}

fn require(known: &BTreeSet<&str>, step: usize, name: &str) -> Result<()> {
    if !known.contains(name) {
        bail!("step[{}] refers to unknown element '{}'", step, name);
    }
    Ok(())
}
