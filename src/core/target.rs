//! Target declarations and the resolved target graph.
//!
//! Targets are declared with [`TargetDef`], which records edges by name so a
//! target may reference one declared later. [`TargetGraph::build`] resolves
//! every reference in one pass and freezes the graph.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::params::Parameters;

pub type Action = Arc<dyn Fn(&Parameters) -> Result<()> + Send + Sync>;
pub type Predicate = Arc<dyn Fn(&Parameters) -> bool + Send + Sync>;

/// Index of a target inside its [`TargetGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) usize);

#[derive(Clone)]
pub struct Condition {
    pub label: String,
    pub check: Predicate,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition").field("label", &self.label).finish()
    }
}

/// Declarative description of a target. Nothing runs at declaration time.
pub struct TargetDef {
    name: String,
    description: String,
    hidden: bool,
    dependencies: Vec<String>,
    after: Vec<String>,
    triggers: Vec<String>,
    conditions: Vec<Condition>,
    requires: Vec<String>,
    action: Option<Action>,
}

impl TargetDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            hidden: false,
            dependencies: Vec::new(),
            after: Vec::new(),
            triggers: Vec::new(),
            conditions: Vec::new(),
            requires: Vec::new(),
            action: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Hide from `list`; the target stays executable.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn depends_on<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Order after `targets` when they are part of the same run, without pulling them in.
    pub fn after<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Schedule `targets` once this one succeeds.
    pub fn triggers<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers.extend(targets.into_iter().map(Into::into));
        self
    }

    /// The target only runs when every condition holds.
    pub fn only_when<F>(mut self, label: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Parameters) -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Condition {
            label: label.into(),
            check: Arc::new(check),
        });
        self
    }

    pub fn requires(mut self, param: impl Into<String>) -> Self {
        self.requires.push(param.into());
        self
    }

    pub fn requires_all<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(params.into_iter().map(Into::into));
        self
    }

    pub fn executes<F>(mut self, action: F) -> Self
    where
        F: Fn(&Parameters) -> Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub description: String,
    pub hidden: bool,
    pub dependencies: Vec<TargetId>,
    pub after: Vec<TargetId>,
    pub triggers: Vec<TargetId>,
    pub conditions: Vec<Condition>,
    pub requires: Vec<String>,
    action: Option<Action>,
}

impl Target {
    /// Run the declared action; aggregate targets without one succeed trivially.
    pub fn invoke(&self, params: &Parameters) -> Result<()> {
        match &self.action {
            Some(action) => action(params),
            None => Ok(()),
        }
    }

    /// First condition that does not hold, if any.
    pub fn failing_condition(&self, params: &Parameters) -> Option<&Condition> {
        self.conditions.iter().find(|c| !(c.check)(params))
    }

    /// Required parameters that are unset.
    pub fn missing_parameters(&self, params: &Parameters) -> Vec<String> {
        self.requires
            .iter()
            .filter(|name| !params.is_set(name))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("after", &self.after)
            .field("triggers", &self.triggers)
            .field("requires", &self.requires)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
}

/// Immutable registry of targets with all edges resolved to ids.
#[derive(Debug)]
pub struct TargetGraph {
    targets: Vec<Target>,
    index: HashMap<String, TargetId>,
}

impl TargetGraph {
    pub fn build(defs: Vec<TargetDef>) -> Result<Self> {
        let mut index = HashMap::with_capacity(defs.len());
        for (idx, def) in defs.iter().enumerate() {
            if index.insert(def.name.clone(), TargetId(idx)).is_some() {
                return Err(Error::target_duplicate(&def.name));
            }
        }

        let lookup = |source: &str, names: &[String]| -> Result<Vec<TargetId>> {
            names
                .iter()
                .map(|name| {
                    index
                        .get(name)
                        .copied()
                        .ok_or_else(|| Error::target_not_found(name, Some(source.to_string())))
                })
                .collect()
        };

        let mut targets = Vec::with_capacity(defs.len());
        for (idx, def) in defs.into_iter().enumerate() {
            let dependencies = lookup(&def.name, &def.dependencies)?;
            let after = lookup(&def.name, &def.after)?;
            let triggers = lookup(&def.name, &def.triggers)?;
            targets.push(Target {
                id: TargetId(idx),
                name: def.name,
                description: def.description,
                hidden: def.hidden,
                dependencies,
                after,
                triggers,
                conditions: def.conditions,
                requires: def.requires,
                action: def.action,
            });
        }

        Ok(Self { targets, index })
    }

    pub fn get(&self, id: TargetId) -> &Target {
        &self.targets[id.0]
    }

    pub fn find(&self, name: &str) -> Result<TargetId> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::target_not_found(name, None))
    }

    pub fn name(&self, id: TargetId) -> &str {
        &self.targets[id.0].name
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Visible targets in declaration order.
    pub fn list(&self) -> Vec<TargetSummary> {
        let names = |ids: &[TargetId]| ids.iter().map(|id| self.name(*id).to_string()).collect();
        self.targets
            .iter()
            .filter(|t| !t.hidden)
            .map(|t| TargetSummary {
                name: t.name.clone(),
                description: t.description.clone(),
                depends_on: names(&t.dependencies),
                triggers: names(&t.triggers),
                requires: t.requires.clone(),
            })
            .collect()
    }
}
