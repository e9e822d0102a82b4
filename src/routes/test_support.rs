// src/routes/test_support.rs
//
// Shared fixtures for handler tests that run against a migrated test database.

use std::future::Future;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde_json::json;
use sqlx::PgPool;
use tracing::{instrument::WithSubscriber, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use crate::config::Config;
use crate::models::CaseFields;
use crate::session::{hash_password, hash_token, new_token, CurrentUser};
use crate::{db, AppState};

pub(crate) async fn seeded_state(pool: PgPool) -> AppState {
    db::seed_defaults(&pool).await.unwrap();
    let config = Config::from_lookup(|key| (key == "DATABASE_URL").then(|| "postgres://test".to_string())).unwrap();
    AppState { pool, config }
}

/// Inserts a user in `role` (or none), opens a session for them and loads it
/// through the same path the request extractor uses.
pub(crate) async fn staff(pool: &PgPool, username: &str, role: Option<&str>, is_superuser: bool) -> CurrentUser {
    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO public.users (username, password_hash, is_superuser) VALUES ($1,$2,$3) RETURNING user_id",
    )
    .bind(username)
    .bind(hash_password("salt", "pw"))
    .bind(is_superuser)
    .fetch_one(pool)
    .await
    .unwrap();

    if let Some(role) = role {
        sqlx::query(
            r#"INSERT INTO public.user_groups (user_id, group_id)
               SELECT $1, group_id FROM public.groups WHERE name = $2"#,
        )
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    }

    let token = new_token();
    sqlx::query(
        "INSERT INTO public.sessions (token_hash, user_id, expires_at) VALUES ($1,$2, now() + interval '1 hour')",
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap();

    CurrentUser::load(pool, &token).await.unwrap().unwrap()
}

pub(crate) async fn department_id(pool: &PgPool, name: &str) -> i64 {
    sqlx::query_scalar("SELECT department_id FROM public.department_configs WHERE name = $1")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub(crate) fn case_body(uhid: &str, category_id: i64, extra: serde_json::Value) -> CaseFields {
    let mut body = json!({
        "uhid": uhid, "first_name": "Lakshmi", "last_name": "R",
        "phone_number": "9876543210", "category_id": category_id, "age": 29
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    serde_json::from_value(body).unwrap()
}

/// Counts statements sqlx reports under its `sqlx::query` target.
#[derive(Clone, Default)]
struct QueryCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for QueryCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() == "sqlx::query" {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Runs `future` and returns its output with the number of database round-trips it made.
pub(crate) async fn count_queries<F: Future>(future: F) -> (F::Output, usize) {
    let counter = QueryCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let output = future.with_subscriber(subscriber).await;
    (output, counter.0.load(Ordering::SeqCst))
}
