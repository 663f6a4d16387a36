//! End-to-end sweeps over PostgreSQL with the outbox publisher.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use mise_db::models::{ElectionMethod, IndexableType, MealPlanStatus};
use mise_db::queries::{grocery_list_items, meal_plan_tasks, meal_plans, outbox};
use mise_test_utils::{create_test_db, drop_test_db, seed};

use mise_core::error::StoreError;
use mise_core::publish::{DataChangeMessage, OutboxPublisher, ServiceEventType};
use mise_core::store::{DataStore, PgDataStore};
use mise_core::worker::{
    FinalizerWorker, GroceryInitWorker, IndexScheduler, IndexerRegistry, TaskCreatorWorker,
    WorkContext, WorkerDeps,
};

struct Seeded {
    plan_id: Uuid,
    household_id: Uuid,
    winning_option: Uuid,
    onion: Uuid,
    grams: Uuid,
}

/// An expired ranked-choice plan with one dinner event in two days and
/// options A, B, C voted so that B wins the runoff. B's meal is an onion
/// base (dice, then sweat) served at double scale, with a prep task
/// covering both steps.
async fn seed_plan(pool: &PgPool) -> Seeded {
    let household_id = seed::household(pool).await;
    let onion = seed::valid_ingredient(pool, "onion").await;
    let grams = seed::measurement_unit(pool, "gram").await;
    let dice = seed::preparation(pool, "dice").await;
    let sweat = seed::preparation(pool, "sweat").await;

    let base = seed::recipe(pool, "onion base").await;
    let step_dice = seed::recipe_step(pool, base, 0, dice).await;
    seed::step_ingredient(pool, step_dice, onion, grams, 100.0, None).await;
    let diced = seed::step_product(pool, step_dice, "diced onion").await;
    let step_sweat = seed::recipe_step(pool, base, 1, sweat).await;
    seed::step_product_input(pool, step_sweat, diced, grams).await;
    seed::prep_task(pool, base, "prep onions", &[step_dice, step_sweat]).await;

    let plain = seed::recipe(pool, "toast").await;
    seed::recipe_step(pool, plain, 0, dice).await;

    let meal_a = seed::meal(pool, "toast", &[(plain, 1.0)]).await;
    let meal_b = seed::meal(pool, "onion soup", &[(base, 1.0)]).await;
    let meal_c = seed::meal(pool, "more toast", &[(plain, 1.0)]).await;

    let plan_id = seed::meal_plan(
        pool,
        household_id,
        Utc::now() - Duration::hours(1),
        ElectionMethod::RankedChoice,
    )
    .await;
    let event = seed::event(pool, plan_id, "dinner", Utc::now() + Duration::days(2)).await;
    let options = [
        seed::option(pool, event, meal_a, 1.0).await,
        seed::option(pool, event, meal_b, 2.0).await,
        seed::option(pool, event, meal_c, 1.0).await,
    ];
    for ranking in [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 1, 0]] {
        let voter = Uuid::new_v4();
        for (rank, &position) in ranking.iter().enumerate() {
            seed::vote(pool, options[position], voter, rank as i32 + 1, false).await;
        }
    }

    Seeded {
        plan_id,
        household_id,
        winning_option: options[1],
        onion,
        grams,
    }
}

fn pg_deps(pool: &PgPool) -> WorkerDeps {
    WorkerDeps::new(
        Arc::new(PgDataStore::new(pool.clone())),
        Arc::new(OutboxPublisher::new(pool.clone())),
    )
}

async fn data_change_events(pool: &PgPool) -> Vec<DataChangeMessage> {
    outbox::list_messages(pool, "data_changes")
        .await
        .unwrap()
        .into_iter()
        .map(|m| serde_json::from_value(m.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn full_pipeline_over_postgres() {
    let (pool, db_name) = create_test_db().await;
    let seeded = seed_plan(&pool).await;
    let deps = pg_deps(&pool);
    let ctx = WorkContext::default();

    // Finalize.
    let finalizer = FinalizerWorker::new(deps.clone());
    assert_eq!(finalizer.finalize_expired_meal_plans(&ctx).await.unwrap(), 1);
    assert_eq!(finalizer.finalize_expired_meal_plans(&ctx).await.unwrap(), 0);

    let plan = meal_plans::get_meal_plan(&pool, seeded.plan_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plan.status, MealPlanStatus::Finalized);
    let chosen: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM meal_plan_options WHERE chosen")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(chosen, vec![(seeded.winning_option,)]);

    // Grocery list: 100 g onion at meal scale 2.
    let grocery = GroceryInitWorker::new(deps.clone());
    assert_eq!(grocery.initialize_grocery_lists(&ctx).await.unwrap(), 1);
    let items = grocery_list_items::list_for_meal_plan(&pool, seeded.plan_id)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].valid_ingredient_id, seeded.onion);
    assert_eq!(items[0].valid_measurement_unit_id, seeded.grams);
    assert_eq!(items[0].minimum_quantity_needed, 200.0);
    assert_eq!(items[0].maximum_quantity_needed, Some(200.0));
    assert_eq!(grocery.initialize_grocery_lists(&ctx).await.unwrap(), 0);

    // Tasks for the onion prep.
    let tasks_worker = TaskCreatorWorker::new(deps.clone());
    assert_eq!(tasks_worker.create_meal_plan_tasks(&ctx).await.unwrap(), 1);
    let tasks = meal_plan_tasks::list_for_meal_plan(&pool, seeded.plan_id)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].belongs_to_meal_plan_option, seeded.winning_option);
    assert_eq!(tasks_worker.create_meal_plan_tasks(&ctx).await.unwrap(), 0);

    let plan = meal_plans::get_meal_plan(&pool, seeded.plan_id)
        .await
        .unwrap()
        .unwrap();
    assert!(plan.grocery_list_initialized);
    assert!(plan.tasks_created);

    // One outbox row per transition, in order.
    let events: Vec<ServiceEventType> = data_change_events(&pool)
        .await
        .into_iter()
        .map(|m| m.event_type)
        .collect();
    assert_eq!(
        events,
        vec![
            ServiceEventType::MealPlanFinalized,
            ServiceEventType::MealPlanGroceryListItemCreated,
            ServiceEventType::MealPlanTaskCreated,
        ]
    );
    let finalized = &data_change_events(&pool).await[0];
    assert_eq!(finalized.household_id, Some(seeded.household_id));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn index_scheduler_requests_every_stale_entity() {
    let (pool, db_name) = create_test_db().await;
    seed_plan(&pool).await;

    let scheduler = IndexScheduler::new(pg_deps(&pool), IndexerRegistry::default());
    let published = scheduler
        .index_types(&WorkContext::default())
        .await
        .unwrap();

    // 1 ingredient, 1 unit, 2 preparations, 2 recipes, 3 meals.
    assert_eq!(published, 9);
    let messages = outbox::list_messages(&pool, "search_index_requests")
        .await
        .unwrap();
    assert_eq!(messages.len(), 9);
    let meals = messages
        .iter()
        .filter(|m| m.payload["entity_type"] == IndexableType::Meals.table_name())
        .count();
    assert_eq!(meals, 3);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn finalization_rechecks_household_and_status() {
    let (pool, db_name) = create_test_db().await;
    let seeded = seed_plan(&pool).await;
    let store = PgDataStore::new(pool.clone());

    assert!(
        !store
            .attempt_to_finalize_meal_plan(seeded.plan_id, Uuid::new_v4())
            .await
            .unwrap()
    );
    assert!(
        store
            .attempt_to_finalize_meal_plan(seeded.plan_id, seeded.household_id)
            .await
            .unwrap()
    );
    assert!(
        !store
            .attempt_to_finalize_meal_plan(seeded.plan_id, seeded.household_id)
            .await
            .unwrap()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

/// Chosen-option count per event of `plan_id`.
async fn chosen_per_event(pool: &PgPool, plan_id: Uuid) -> Vec<(Uuid, i64)> {
    sqlx::query_as(
        "SELECT mpe.id, COUNT(mpo.id) FILTER (WHERE mpo.chosen) \
         FROM meal_plan_events mpe \
         LEFT JOIN meal_plan_options mpo ON mpo.belongs_to_meal_plan_event = mpe.id \
         WHERE mpe.belongs_to_meal_plan = $1 \
         GROUP BY mpe.id",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_finalization_attempts_finalize_once() {
    let (pool, db_name) = create_test_db().await;
    let seeded = seed_plan(&pool).await;
    let first = PgDataStore::new(pool.clone());
    let second = PgDataStore::new(pool.clone());

    let (a, b) = tokio::join!(
        first.attempt_to_finalize_meal_plan(seeded.plan_id, seeded.household_id),
        second.attempt_to_finalize_meal_plan(seeded.plan_id, seeded.household_id),
    );
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|won| **won).count(), 1);

    let chosen = chosen_per_event(&pool, seeded.plan_id).await;
    assert_eq!(chosen.len(), 1);
    assert!(chosen.iter().all(|(_, count)| *count == 1));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_finalizer_sweeps_publish_once() {
    let (pool, db_name) = create_test_db().await;
    let seeded = seed_plan(&pool).await;
    let first = FinalizerWorker::new(pg_deps(&pool));
    let second = FinalizerWorker::new(pg_deps(&pool));
    let ctx = WorkContext::default();

    let (a, b) = tokio::join!(
        first.finalize_expired_meal_plans(&ctx),
        second.finalize_expired_meal_plans(&ctx),
    );
    assert_eq!(a.unwrap() + b.unwrap(), 1);

    let finalized: Vec<DataChangeMessage> = data_change_events(&pool)
        .await
        .into_iter()
        .filter(|m| m.event_type == ServiceEventType::MealPlanFinalized)
        .collect();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].entity_id, seeded.plan_id);
    assert!(
        chosen_per_event(&pool, seeded.plan_id)
            .await
            .iter()
            .all(|(_, count)| *count == 1)
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn missing_recipe_is_not_found() {
    let (pool, db_name) = create_test_db().await;
    let store = PgDataStore::new(pool.clone());

    let missing = Uuid::new_v4();
    match store.get_recipe(missing).await {
        Err(StoreError::NotFound { entity, id }) => {
            assert_eq!(entity, "recipe");
            assert_eq!(id, missing);
        }
        other => panic!("expected not found, got {other:?}"),
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}
