//! Text renderings of a recipe step graph for diagnostics.

use std::collections::HashSet;
use std::fmt::Write;

use mise_db::models::{Recipe, RecipeStep};
use uuid::Uuid;

use super::RecipeGraph;

fn step_label(step: &RecipeStep) -> String {
    format!("{}. {}", step.step_index + 1, step.preparation_name)
}

/// `flowchart TD` with one node per step; steps that can be prepped ahead
/// get the `advancePrep` class.
pub(super) fn mermaid(recipe: &Recipe, graph: &RecipeGraph, eligible: &HashSet<Uuid>) -> String {
    let node = |id: Uuid| format!("step{}", graph.index[&id]);
    let escape = |s: &str| s.replace('"', "#quot;");

    let mut out = String::from("flowchart TD\n");
    for step in &recipe.steps {
        let _ = writeln!(out, "    {}[\"{}\"]", node(step.id), escape(&step_label(step)));
    }
    for edge in &graph.edges {
        let _ = writeln!(
            out,
            "    {} -->|\"{}\"| {}",
            node(edge.from),
            escape(&edge.product),
            node(edge.to)
        );
    }

    let ahead: Vec<String> = recipe
        .steps
        .iter()
        .filter(|s| eligible.contains(&s.id))
        .map(|s| node(s.id))
        .collect();
    if !ahead.is_empty() {
        out.push_str("    classDef advancePrep stroke-dasharray: 5 5\n");
        let _ = writeln!(out, "    class {} advancePrep", ahead.join(","));
    }
    out
}

/// Graphviz `digraph` named after the recipe.
pub(super) fn dot(recipe: &Recipe, graph: &RecipeGraph) -> String {
    let node = |id: Uuid| format!("step{}", graph.index[&id]);
    let escape = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");

    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(&recipe.name));
    out.push_str("    rankdir=TB;\n");
    for step in &recipe.steps {
        let _ = writeln!(
            out,
            "    {} [label=\"{}\"];",
            node(step.id),
            escape(&step_label(step))
        );
    }
    for edge in &graph.edges {
        let _ = writeln!(
            out,
            "    {} -> {} [label=\"{}\"];",
            node(edge.from),
            node(edge.to),
            escape(&edge.product)
        );
    }
    out.push_str("}\n");
    out
}
