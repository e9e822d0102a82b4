// src/routes/search.rs

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::category::CategoryKind;
use crate::domain::search::{
    like_contains, like_prefix, normalize, prefetch_patterns, rank, suggest, AutocompleteField, SearchCandidate,
    SearchResult, Suggestions, MIN_QUERY_CHARS, SEARCH_PREFETCH,
};
use crate::error::{AppError, AppResult};
use crate::session::CurrentUser;
use crate::AppState;

#[derive(Deserialize)]
pub struct AutocompleteQ {
    pub field: Option<String>,
    pub q: Option<String>,
}

pub async fn autocomplete(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(params): Query<AutocompleteQ>,
) -> AppResult<Json<Suggestions>> {
    let field = params
        .field
        .as_deref()
        .and_then(AutocompleteField::parse)
        .ok_or_else(|| AppError::BadRequest("field must be one of: place, diagnosis, referred_by".into()))?;

    let raw = params.q.unwrap_or_default();
    let query = normalize(&raw);
    if !query.is_empty() && query.chars().count() < MIN_QUERY_CHARS {
        return Ok(Json(Suggestions::Matches(Vec::new())));
    }

    let column = field.column();
    let values = if query.is_empty() {
        sqlx::query_as::<_, (String, i64)>(&format!(
            "SELECT {column}, COUNT(*) FROM public.cases WHERE btrim({column}) <> '' GROUP BY {column}"
        ))
        .fetch_all(&state.pool)
        .await?
    } else {
        sqlx::query_as::<_, (String, i64)>(&format!(
            r#"SELECT {column}, COUNT(*) FROM public.cases
               WHERE regexp_replace(lower(btrim({column})), '\s+', ' ', 'g') LIKE $1
               GROUP BY {column}"#
        ))
        .bind(like_prefix(&query))
        .fetch_all(&state.pool)
        .await?
    };

    Ok(Json(suggest(&values, &raw)))
}

#[derive(Serialize)]
pub struct SearchResp {
    pub results: Vec<SearchResult>,
}

/// Pulls `q` and every `category` value out of a query string that may repeat keys.
/// `None` means no category filter was requested; unrecognised values are skipped but
/// still count as a filter.
fn search_params(pairs: Vec<(String, String)>) -> (String, Option<Vec<CategoryKind>>) {
    let mut q = String::new();
    let mut kinds: Option<Vec<CategoryKind>> = None;
    for (key, value) in pairs {
        match key.as_str() {
            "q" => q = value,
            "category" => {
                let kinds = kinds.get_or_insert_with(Vec::new);
                if let Some(kind) = CategoryKind::from_filter(&value) {
                    if !kinds.contains(&kind) {
                        kinds.push(kind);
                    }
                }
            }
            _ => {}
        }
    }
    (q, kinds)
}

pub async fn universal_search(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(pairs): Query<Vec<(String, String)>>,
) -> AppResult<Json<SearchResp>> {
    let (q, kinds) = search_params(pairs);
    let query = normalize(&q);
    if query.chars().count() < MIN_QUERY_CHARS || kinds.as_ref().is_some_and(Vec::is_empty) {
        return Ok(Json(SearchResp { results: Vec::new() }));
    }

    let department_ids: Option<Vec<i64>> = match kinds {
        None => None,
        Some(kinds) => {
            let departments =
                sqlx::query_as::<_, (i64, String)>("SELECT department_id, name FROM public.department_configs")
                    .fetch_all(&state.pool)
                    .await?;
            Some(
                departments
                    .into_iter()
                    .filter(|(_, name)| CategoryKind::from_department_name(name).is_some_and(|k| kinds.contains(&k)))
                    .map(|(id, _)| id)
                    .collect(),
            )
        }
    };

    // Full-query hits are ordered ahead of stem-only hits so the cap never drops them.
    let candidates = sqlx::query_as::<_, SearchCandidate>(
        r#"SELECT c.case_id, c.uhid, c.patient_name, c.phone_number, c.diagnosis, c.age, c.place, c.status,
                  d.name AS category_name, c.high_risk, c.referred_by, c.ncd_flags, c.updated_at
           FROM public.cases c
           JOIN public.department_configs d ON d.department_id = c.category_id
           WHERE (lower(c.uhid) LIKE ANY($1)
                  OR lower(c.patient_name) LIKE ANY($1)
                  OR c.phone_number LIKE ANY($1)
                  OR lower(c.diagnosis) LIKE ANY($1))
             AND ($2::BIGINT[] IS NULL OR c.category_id = ANY($2))
           ORDER BY CASE
                      WHEN lower(btrim(c.uhid)) = $4 OR lower(btrim(c.patient_name)) = $4
                        OR btrim(c.phone_number) = $4 OR lower(btrim(c.diagnosis)) = $4 THEN 0
                      WHEN lower(btrim(c.uhid)) LIKE $5 OR lower(btrim(c.patient_name)) LIKE $5
                        OR btrim(c.phone_number) LIKE $5 OR lower(btrim(c.diagnosis)) LIKE $5 THEN 1
                      WHEN lower(c.uhid) LIKE $6 OR lower(c.patient_name) LIKE $6
                        OR c.phone_number LIKE $6 OR lower(c.diagnosis) LIKE $6 THEN 2
                      ELSE 3
                    END,
                    c.updated_at DESC
           LIMIT $3"#,
    )
    .bind(prefetch_patterns(&q))
    .bind(department_ids)
    .bind(SEARCH_PREFETCH)
    .bind(&query)
    .bind(like_prefix(&query))
    .bind(like_contains(&query))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(SearchResp { results: rank(&q, candidates) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn repeated_categories_are_collected() {
        let (q, kinds) = search_params(pairs(&[
            ("q", "kidney"),
            ("category", "surgical"),
            ("category", "Non-Surgical"),
            ("category", "surgery"),
            ("category", "dermatology"),
        ]));
        assert_eq!(q, "kidney");
        assert_eq!(kinds, Some(vec![CategoryKind::Surgery, CategoryKind::NonSurgical]));
    }

    #[test]
    fn missing_query_is_empty() {
        let (q, kinds) = search_params(pairs(&[("category", "anc")]));
        assert!(q.is_empty());
        assert_eq!(kinds, Some(vec![CategoryKind::Anc]));
    }

    #[test]
    fn unrecognised_categories_still_filter() {
        let (_, kinds) = search_params(pairs(&[("q", "kidney"), ("category", "dermatology")]));
        assert_eq!(kinds, Some(Vec::new()));
        let (_, kinds) = search_params(pairs(&[("q", "kidney")]));
        assert_eq!(kinds, None);
    }

    mod handlers {
        use sqlx::PgPool;

        use super::super::*;
        use crate::routes::test_support::{department_id, seeded_state, staff};

        /// 200 cases `UH-0000`..`UH-0199`; lower numbers were updated longer ago.
        async fn crowded_uhids(pool: &PgPool) {
            let dept = department_id(pool, "Surgery").await;
            sqlx::query(
                r#"INSERT INTO public.cases (uhid, first_name, patient_name, phone_number, category_id, age, updated_at)
                   SELECT 'UH-' || lpad(i::text, 4, '0'), 'Patient', 'Patient ' || i, '9876500000', $1, 30,
                          now() - make_interval(mins => 200 - i)
                   FROM generate_series(0, 199) AS i"#,
            )
            .bind(dept)
            .execute(pool)
            .await
            .unwrap();
        }

        fn query(raw: &[(&str, &str)]) -> Query<Vec<(String, String)>> {
            Query(raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        }

        #[sqlx::test]
        async fn exact_uhid_survives_a_crowded_prefetch(pool: PgPool) {
            let state = seeded_state(pool.clone()).await;
            let caller = staff(&pool, "caller", Some("Caller"), false).await;
            crowded_uhids(&pool).await;

            let Json(resp) = universal_search(State(state), caller, query(&[("q", "UH-0003")])).await.unwrap();
            assert_eq!(resp.results[0].uhid, "UH-0003");
            assert!(resp.results[0].score >= 130);
        }

        #[sqlx::test]
        async fn unknown_category_filter_matches_nothing(pool: PgPool) {
            let state = seeded_state(pool.clone()).await;
            let caller = staff(&pool, "caller", Some("Caller"), false).await;
            crowded_uhids(&pool).await;

            let Json(filtered) = universal_search(
                State(state.clone()),
                caller.clone(),
                query(&[("q", "UH-0199"), ("category", "dermatology")]),
            )
            .await
            .unwrap();
            assert!(filtered.results.is_empty());

            let Json(surgical) =
                universal_search(State(state), caller, query(&[("q", "UH-0199"), ("category", "surgical")]))
                    .await
                    .unwrap();
            assert_eq!(surgical.results[0].uhid, "UH-0199");
        }
    }
}
