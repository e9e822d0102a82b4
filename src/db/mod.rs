// src/db/mod.rs

use serde_json::json;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::Config;
use crate::domain::access::default_role_settings;

pub async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    info!(max_connections = config.db_max_connections, "connected to PostgreSQL");
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

struct DefaultDepartment {
    name: &'static str,
    actions: &'static [&'static str],
    template: serde_json::Value,
}

fn default_departments() -> Vec<DefaultDepartment> {
    vec![
        DefaultDepartment {
            name: "ANC",
            actions: &["ANC Visit", "USG Review", "BP & Labs"],
            template: json!({ "lmp": "Date", "edd": "Date" }),
        },
        DefaultDepartment {
            name: "Surgery",
            actions: &["LAB TEST", "Xray", "ECG", "Inform Anesthetist"],
            template: json!({ "surgical_pathway": "String", "surgery_date": "Date" }),
        },
        DefaultDepartment {
            name: "Non Surgical",
            actions: &["Consultant Review", "Opinion for other consultant"],
            template: json!({ "review_date": "Date", "review_frequency": "String" }),
        },
    ]
}

/// Inserts the three standard departments when missing; existing rows are left untouched.
pub async fn ensure_default_departments(pool: &PgPool) -> sqlx::Result<()> {
    for dept in default_departments() {
        sqlx::query(
            r#"INSERT INTO public.department_configs (name, predefined_actions, metadata_template)
               VALUES ($1, $2, $3)
               ON CONFLICT (name) DO NOTHING"#,
        )
        .bind(dept.name)
        .bind(json!(dept.actions))
        .bind(dept.template)
        .execute(pool)
        .await?;
    }
    Ok(())
}

/// Inserts the default roles and a same-named group for each; existing rows are left untouched.
pub async fn ensure_default_role_settings(pool: &PgPool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    for role in default_role_settings() {
        sqlx::query(
            r#"INSERT INTO public.role_settings
                 (role_name, can_case_create, can_case_edit, can_task_create,
                  can_task_edit, can_note_add, can_manage_settings)
               VALUES ($1,$2,$3,$4,$5,$6,$7)
               ON CONFLICT (role_name) DO NOTHING"#,
        )
        .bind(&role.role_name)
        .bind(role.can_case_create)
        .bind(role.can_case_edit)
        .bind(role.can_task_create)
        .bind(role.can_task_edit)
        .bind(role.can_note_add)
        .bind(role.can_manage_settings)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO public.groups (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(&role.role_name)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

pub async fn seed_defaults(pool: &PgPool) -> sqlx::Result<()> {
    ensure_default_departments(pool).await?;
    ensure_default_role_settings(pool).await?;
    info!("default departments and roles ensured");
    Ok(())
}
