use anyhow::{Context, Result};
use clap::ValueEnum;
use sqlx::PgPool;
use uuid::Uuid;

use mise_core::analyzer::RecipeAnalyzer;
use mise_core::store::{DataStore, PgDataStore};
use mise_db::models::Recipe;

/// Output of `mise analyze-recipe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    /// Mermaid flowchart.
    Mermaid,
    /// Graphviz digraph.
    Dot,
    /// Steps that can be prepared ahead, in order.
    Eligible,
}

pub async fn run_analyze(pool: &PgPool, recipe_id: &str, format: GraphFormat) -> Result<()> {
    let id = Uuid::parse_str(recipe_id)
        .with_context(|| format!("invalid recipe ID: {recipe_id}"))?;
    let recipe = PgDataStore::new(pool.clone())
        .get_recipe(id)
        .await
        .with_context(|| format!("failed to load recipe {id}"))?;

    let analyzer = RecipeAnalyzer::new();
    let output = match format {
        GraphFormat::Mermaid => analyzer.render_mermaid(&recipe)?,
        GraphFormat::Dot => analyzer.render_dot(&recipe)?,
        GraphFormat::Eligible => {
            let eligible = analyzer.steps_eligible_for_advance_prep(&recipe)?;
            format_eligible(&recipe, &eligible)
        }
    };
    println!("{output}");
    Ok(())
}

fn format_eligible(recipe: &Recipe, eligible: &[Uuid]) -> String {
    if eligible.is_empty() {
        return format!("No steps of {} can be prepared ahead.", recipe.name);
    }

    let mut lines = vec![format!("Steps of {} that can be prepared ahead:", recipe.name)];
    for step in eligible
        .iter()
        .filter_map(|id| recipe.steps.iter().find(|s| s.id == *id))
    {
        lines.push(format!(
            "  #{} {} ({})",
            step.step_index + 1,
            step.preparation_name,
            step.id
        ));
    }
    lines.join("\n")
}
