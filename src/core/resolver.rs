//! Execution-order resolution.
//!
//! Depth-first, post-order: dependencies are visited first, then after-edges
//! that point at targets already required by the run. Trigger edges are left
//! to the engine, which resolves them with [`resolve_appended`] once the
//! triggering target succeeds.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::target::{TargetGraph, TargetId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub requested: Vec<TargetId>,
    pub order: Vec<TargetId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutput {
    pub requested: Vec<String>,
    pub order: Vec<String>,
}

impl ExecutionPlan {
    pub fn names(&self, graph: &TargetGraph) -> Vec<String> {
        self.order
            .iter()
            .map(|id| graph.name(*id).to_string())
            .collect()
    }

    pub fn to_output(&self, graph: &TargetGraph) -> PlanOutput {
        PlanOutput {
            requested: self
                .requested
                .iter()
                .map(|id| graph.name(*id).to_string())
                .collect(),
            order: self.names(graph),
        }
    }
}

/// Resolve the requested targets (by name) into an ordered plan.
pub fn resolve(graph: &TargetGraph, requested: &[&str]) -> Result<ExecutionPlan> {
    if requested.is_empty() {
        return Err(Error::validation_invalid_argument(
            "targets",
            "At least one target must be requested",
            None,
        ));
    }
    let roots = requested
        .iter()
        .map(|name| graph.find(name))
        .collect::<Result<Vec<_>>>()?;
    let order = resolve_ids(graph, &roots, &HashSet::new())?;
    Ok(ExecutionPlan {
        requested: roots,
        order,
    })
}

/// Resolve `roots` for appending to a running plan; targets in `planned` are
/// treated as already satisfied and are neither revisited nor re-emitted.
pub fn resolve_appended(
    graph: &TargetGraph,
    roots: &[TargetId],
    planned: &HashSet<TargetId>,
) -> Result<Vec<TargetId>> {
    resolve_ids(graph, roots, planned)
}

fn resolve_ids(
    graph: &TargetGraph,
    roots: &[TargetId],
    planned: &HashSet<TargetId>,
) -> Result<Vec<TargetId>> {
    let required = required_closure(graph, roots, planned);
    let mut walker = Walker {
        graph,
        planned,
        required: &required,
        stack: Vec::new(),
        emitted: HashSet::new(),
        order: Vec::new(),
    };
    for root in roots {
        walker.visit(*root)?;
    }
    Ok(walker.order)
}

/// Everything reachable from `roots` over dependency edges, minus `planned`.
fn required_closure(
    graph: &TargetGraph,
    roots: &[TargetId],
    planned: &HashSet<TargetId>,
) -> HashSet<TargetId> {
    let mut required = HashSet::new();
    let mut pending: Vec<TargetId> = roots.to_vec();
    while let Some(id) = pending.pop() {
        if planned.contains(&id) || !required.insert(id) {
            continue;
        }
        pending.extend(graph.get(id).dependencies.iter().copied());
    }
    required
}

struct Walker<'a> {
    graph: &'a TargetGraph,
    planned: &'a HashSet<TargetId>,
    required: &'a HashSet<TargetId>,
    stack: Vec<TargetId>,
    emitted: HashSet<TargetId>,
    order: Vec<TargetId>,
}

impl Walker<'_> {
    fn visit(&mut self, id: TargetId) -> Result<()> {
        if self.emitted.contains(&id) || self.planned.contains(&id) {
            return Ok(());
        }
        if let Some(pos) = self.stack.iter().position(|s| *s == id) {
            let mut members: Vec<String> = self.stack[pos..]
                .iter()
                .map(|s| self.graph.name(*s).to_string())
                .collect();
            members.push(self.graph.name(id).to_string());
            return Err(Error::cycle_detected(members));
        }

        self.stack.push(id);
        let target = self.graph.get(id);
        for dep in &target.dependencies {
            self.visit(*dep)?;
        }
        for soft in &target.after {
            if self.required.contains(soft) {
                self.visit(*soft)?;
            }
        }
        self.stack.pop();

        self.emitted.insert(id);
        self.order.push(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::target::TargetDef;

    fn names(graph: &TargetGraph, requested: &[&str]) -> Vec<String> {
        resolve(graph, requested).unwrap().names(graph)
    }

    #[test]
    fn chain_resolves_leaves_first() {
        let graph = TargetGraph::build(vec![
            TargetDef::new("A").depends_on(["B"]),
            TargetDef::new("B").depends_on(["C"]),
            TargetDef::new("C"),
        ])
        .unwrap();
        assert_eq!(names(&graph, &["A"]), vec!["C", "B", "A"]);
    }

    #[test]
    fn diamond_emits_shared_dependency_once() {
        let graph = TargetGraph::build(vec![
            TargetDef::new("top").depends_on(["left", "right"]),
            TargetDef::new("left").depends_on(["base"]),
            TargetDef::new("right").depends_on(["base"]),
            TargetDef::new("base"),
        ])
        .unwrap();
        assert_eq!(names(&graph, &["top"]), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn after_edge_orders_only_when_present() {
        let graph = TargetGraph::build(vec![
            TargetDef::new("clean"),
            TargetDef::new("publish").after(["clean"]),
            TargetDef::new("all").depends_on(["publish", "clean"]),
        ])
        .unwrap();

        assert_eq!(names(&graph, &["publish"]), vec!["publish"]);
        assert_eq!(names(&graph, &["all"]), vec!["clean", "publish", "all"]);
        assert_eq!(names(&graph, &["publish", "clean"]), vec!["clean", "publish"]);
    }

    #[test]
    fn triggers_are_not_expanded() {
        let graph = TargetGraph::build(vec![
            TargetDef::new("pack").triggers(["checksum"]),
            TargetDef::new("checksum"),
        ])
        .unwrap();
        assert_eq!(names(&graph, &["pack"]), vec!["pack"]);
    }

    #[test]
    fn cycle_is_reported_with_members() {
        let graph = TargetGraph::build(vec![
            TargetDef::new("a").depends_on(["b"]),
            TargetDef::new("b").depends_on(["c"]),
            TargetDef::new("c").depends_on(["a"]),
        ])
        .unwrap();
        let err = resolve(&graph, &["a"]).unwrap_err();
        assert_eq!(err.code, ErrorCode::TargetCycleDetected);
        assert_eq!(err.details["members"], serde_json::json!(["a", "b", "c", "a"]));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = TargetGraph::build(vec![TargetDef::new("loop").depends_on(["loop"])]).unwrap();
        assert!(resolve(&graph, &["loop"]).is_err());
    }

    #[test]
    fn unreachable_cycle_does_not_fail() {
        let graph = TargetGraph::build(vec![
            TargetDef::new("ok"),
            TargetDef::new("x").depends_on(["y"]),
            TargetDef::new("y").depends_on(["x"]),
        ])
        .unwrap();
        assert_eq!(names(&graph, &["ok"]), vec!["ok"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let build = || {
            TargetGraph::build(vec![
                TargetDef::new("d").depends_on(["b", "c", "a"]),
                TargetDef::new("a"),
                TargetDef::new("b").depends_on(["a"]),
                TargetDef::new("c"),
            ])
            .unwrap()
        };
        let first = names(&build(), &["d"]);
        for _ in 0..10 {
            assert_eq!(names(&build(), &["d"]), first);
        }
        assert_eq!(first, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn appended_resolution_skips_planned_targets() {
        let graph = TargetGraph::build(vec![
            TargetDef::new("base"),
            TargetDef::new("extra").depends_on(["base", "helper"]),
            TargetDef::new("helper"),
        ])
        .unwrap();
        let planned: HashSet<TargetId> = [graph.find("base").unwrap()].into_iter().collect();
        let appended =
            resolve_appended(&graph, &[graph.find("extra").unwrap()], &planned).unwrap();
        let appended: Vec<&str> = appended.iter().map(|id| graph.name(*id)).collect();
        assert_eq!(appended, vec!["helper", "extra"]);
    }

    #[test]
    fn unknown_requested_target_fails() {
        let graph = TargetGraph::build(vec![TargetDef::new("a")]).unwrap();
        let err = resolve(&graph, &["nope"]).unwrap_err();
        assert_eq!(err.code, ErrorCode::TargetNotFound);
        assert!(resolve(&graph, &[]).is_err());
    }
}
