//! Monotonic counters shared by the workers.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// A named, lock-free monotonic counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add(&self, delta: u64) {
        if delta == 0 {
            return;
        }
        let total = self.value.fetch_add(delta, Ordering::Relaxed) + delta;
        debug!(counter = self.name, delta, total, "counter incremented");
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Every counter the workers report. Only successful transitions are
/// counted, except `publish_failures`.
#[derive(Debug)]
pub struct Metrics {
    pub finalized_meal_plans: Counter,
    pub grocery_list_items_created: Counter,
    pub meal_plan_tasks_created: Counter,
    pub search_index_requests_published: Counter,
    pub publish_failures: Counter,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            finalized_meal_plans: Counter::new("finalized_meal_plans"),
            grocery_list_items_created: Counter::new("grocery_list_items_created"),
            meal_plan_tasks_created: Counter::new("meal_plan_tasks_created"),
            search_index_requests_published: Counter::new("search_index_requests_published"),
            publish_failures: Counter::new("publish_failures"),
        }
    }

    /// `(name, value)` for every counter, in declaration order.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        [
            &self.finalized_meal_plans,
            &self.grocery_list_items_created,
            &self.meal_plan_tasks_created,
            &self.search_index_requests_published,
            &self.publish_failures,
        ]
        .into_iter()
        .map(|c| (c.name(), c.get()))
        .collect()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.finalized_meal_plans.add(2);
        metrics.finalized_meal_plans.add(0);
        metrics.finalized_meal_plans.add(1);
        assert_eq!(metrics.finalized_meal_plans.get(), 3);
        assert_eq!(metrics.publish_failures.get(), 0);
    }

    #[test]
    fn snapshot_names_every_counter() {
        let metrics = Metrics::default();
        metrics.publish_failures.add(4);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0], ("finalized_meal_plans", 0));
        assert_eq!(snapshot[4], ("publish_failures", 4));
    }
}
