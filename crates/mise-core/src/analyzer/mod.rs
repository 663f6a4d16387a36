//! Recipe step graphs and advance-prep planning.
//!
//! Steps are nodes. When a step consumes a product of another step, an edge
//! runs from the producer to the consumer. The graph must be acyclic; a
//! topological order is computed with Kahn's algorithm on construction.

mod render;

use std::collections::{HashMap, HashSet, VecDeque};

use mise_db::models::{MealPlanTaskStatus, NewMealPlanTask, Recipe, RecipePrepTask};
use tracing::debug;
use uuid::Uuid;

use crate::error::InvalidRecipe;

/// A product flowing from one step into a later one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: Uuid,
    pub to: Uuid,
    pub product: String,
}

/// Validated step graph of one recipe.
#[derive(Debug, Clone)]
pub struct RecipeGraph {
    /// Step IDs in recipe order.
    steps: Vec<Uuid>,
    index: HashMap<Uuid, usize>,
    edges: Vec<GraphEdge>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    topo_order: Vec<usize>,
}

impl RecipeGraph {
    /// Step IDs in recipe order.
    pub fn steps(&self) -> &[Uuid] {
        &self.steps
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Steps whose products `step_id` consumes directly.
    pub fn predecessors(&self, step_id: Uuid) -> Vec<Uuid> {
        self.neighbours(step_id, &self.predecessors)
    }

    /// Steps that consume a product of `step_id` directly.
    pub fn successors(&self, step_id: Uuid) -> Vec<Uuid> {
        self.neighbours(step_id, &self.successors)
    }

    fn neighbours(&self, step_id: Uuid, lists: &[Vec<usize>]) -> Vec<Uuid> {
        self.index
            .get(&step_id)
            .map(|&i| lists[i].iter().map(|&j| self.steps[j]).collect())
            .unwrap_or_default()
    }

    /// Step IDs such that every producer comes before its consumers. Ties
    /// keep recipe order.
    pub fn topological_order(&self) -> Vec<Uuid> {
        self.topo_order.iter().map(|&i| self.steps[i]).collect()
    }
}

/// Builds step graphs and derives advance-prep tasks from them.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeAnalyzer;

impl RecipeAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Build and validate the step graph of `recipe`.
    ///
    /// Fails when an ingredient names a product no step of this recipe
    /// makes, when a step consumes its own product, or when the product
    /// chain loops.
    pub fn build_graph(&self, recipe: &Recipe) -> Result<RecipeGraph, InvalidRecipe> {
        let steps: Vec<Uuid> = recipe.steps.iter().map(|s| s.id).collect();
        let index: HashMap<Uuid, usize> = steps.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let producers: HashMap<Uuid, (usize, &str)> = recipe
            .steps
            .iter()
            .enumerate()
            .flat_map(|(i, step)| step.products.iter().map(move |p| (p.id, (i, p.name.as_str()))))
            .collect();

        let n = steps.len();
        let mut successors: Vec<Vec<usize>> = vec![vec![]; n];
        let mut predecessors: Vec<Vec<usize>> = vec![vec![]; n];
        let mut edges = Vec::new();

        for (consumer, step) in recipe.steps.iter().enumerate() {
            for product_id in step.ingredients.iter().filter_map(|i| i.recipe_step_product_id) {
                let Some(&(producer, name)) = producers.get(&product_id) else {
                    return Err(InvalidRecipe::DanglingProductReference {
                        recipe_id: recipe.id,
                        step_id: step.id,
                        product_id,
                    });
                };
                if producer == consumer {
                    return Err(InvalidRecipe::SelfReference {
                        recipe_id: recipe.id,
                        step_id: step.id,
                    });
                }
                edges.push(GraphEdge {
                    from: steps[producer],
                    to: step.id,
                    product: name.to_owned(),
                });
                if !successors[producer].contains(&consumer) {
                    successors[producer].push(consumer);
                    predecessors[consumer].push(producer);
                }
            }
        }

        // Kahn's algorithm.
        let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut topo_order = Vec::with_capacity(n);
        while let Some(node) = queue.pop_front() {
            topo_order.push(node);
            for &next in &successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if topo_order.len() != n {
            let step_ids = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(i, _)| steps[i])
                .collect();
            return Err(InvalidRecipe::Cycle {
                recipe_id: recipe.id,
                step_ids,
            });
        }

        Ok(RecipeGraph {
            steps,
            index,
            edges,
            successors,
            predecessors,
            topo_order,
        })
    }

    /// Steps that can be done ahead of time, in topological order.
    ///
    /// A step qualifies when some prep task covers it and every step it
    /// transitively depends on qualifies as well.
    pub fn steps_eligible_for_advance_prep(&self, recipe: &Recipe) -> Result<Vec<Uuid>, InvalidRecipe> {
        let graph = self.build_graph(recipe)?;
        let eligible = eligible_steps(recipe, &graph)?;
        Ok(graph
            .topological_order()
            .into_iter()
            .filter(|id| eligible.contains(id))
            .collect())
    }

    /// Task inputs for making `recipe` as part of option `meal_plan_option_id`.
    ///
    /// One input is produced per prep task whose steps are all eligible for
    /// advance prep; other prep tasks are left out.
    pub fn generate_tasks_for_option(
        &self,
        meal_plan_option_id: Uuid,
        recipe: &Recipe,
    ) -> Result<Vec<NewMealPlanTask>, InvalidRecipe> {
        let graph = self.build_graph(recipe)?;
        let eligible = eligible_steps(recipe, &graph)?;

        let mut inputs = Vec::new();
        for task in &recipe.prep_tasks {
            if task.task_steps.is_empty() {
                continue;
            }
            if let Some(blocked) = task
                .task_steps
                .iter()
                .find(|ts| !eligible.contains(&ts.belongs_to_recipe_step))
            {
                debug!(
                    recipe_id = %recipe.id,
                    recipe_prep_task_id = %task.id,
                    recipe_step_id = %blocked.belongs_to_recipe_step,
                    "prep task depends on a step that cannot be done ahead"
                );
                continue;
            }

            inputs.push(NewMealPlanTask {
                belongs_to_meal_plan_option: meal_plan_option_id,
                belongs_to_recipe_prep_task: task.id,
                status: MealPlanTaskStatus::Unfinished,
                creation_explanation: explain(recipe, task),
                assigned_to_user: None,
            });
        }
        Ok(inputs)
    }

    /// Render the step graph as a mermaid flowchart.
    pub fn render_mermaid(&self, recipe: &Recipe) -> Result<String, InvalidRecipe> {
        let graph = self.build_graph(recipe)?;
        let eligible = eligible_steps(recipe, &graph)?;
        Ok(render::mermaid(recipe, &graph, &eligible))
    }

    /// Render the step graph as a graphviz digraph.
    pub fn render_dot(&self, recipe: &Recipe) -> Result<String, InvalidRecipe> {
        let graph = self.build_graph(recipe)?;
        Ok(render::dot(recipe, &graph))
    }
}

/// Walk the graph in topological order marking steps that a prep task
/// covers and whose predecessors are all marked.
fn eligible_steps(recipe: &Recipe, graph: &RecipeGraph) -> Result<HashSet<Uuid>, InvalidRecipe> {
    let mut covered = HashSet::new();
    for task in &recipe.prep_tasks {
        for task_step in &task.task_steps {
            if !graph.index.contains_key(&task_step.belongs_to_recipe_step) {
                return Err(InvalidRecipe::UnknownPrepTaskStep {
                    recipe_id: recipe.id,
                    prep_task_id: task.id,
                    step_id: task_step.belongs_to_recipe_step,
                });
            }
            covered.insert(task_step.belongs_to_recipe_step);
        }
    }

    let mut eligible = vec![false; graph.steps.len()];
    for &node in &graph.topo_order {
        eligible[node] = covered.contains(&graph.steps[node])
            && graph.predecessors[node].iter().all(|&p| eligible[p]);
    }

    Ok(graph
        .steps
        .iter()
        .zip(eligible)
        .filter_map(|(id, ok)| ok.then_some(*id))
        .collect())
}

fn explain(recipe: &Recipe, task: &RecipePrepTask) -> String {
    let steps: Vec<String> = task
        .task_steps
        .iter()
        .filter_map(|ts| recipe.steps.iter().find(|s| s.id == ts.belongs_to_recipe_step))
        .map(|s| format!("#{} {}", s.step_index + 1, s.preparation_name))
        .collect();
    let what = if task.description.is_empty() {
        &task.name
    } else {
        &task.description
    };
    format!("{what} for {} (steps {})", recipe.name, steps.join(", "))
}
