use rocket::{
    fairing::AdHoc,
    get,
    http::ContentType,
    response::content::RawHtml,
    routes,
    serde::json::Json,
    State,
};
use serde::Serialize;
use shared::{HallOfFameEntry, StreakRecord};
use tracing::error;

use crate::events::Context;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

fn limit_or_default(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub records: Vec<T>,
    pub page: u32,
    pub total_pages: u64,
    pub limit: u32,
    pub total_records: u64,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(records: Vec<T>, page: u32, limit: u32, total_records: u64) -> Self {
        Self {
            records,
            page,
            total_pages: total_records.div_ceil(limit as u64),
            limit,
            total_records,
        }
    }
}

#[get("/metrics")]
async fn metrics(context: &State<Context>) -> Option<(ContentType, RawHtml<String>)> {
    let metrics = match context.prometheus.encode() {
        Ok(metrics) => metrics,
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            return None;
        }
    };
    Some((
        ContentType::new("application/openmetrics-text", " version=1.0.0; charset=utf-8"),
        RawHtml(metrics),
    ))
}

/// `page` starts at 1.
#[get("/leaderboard?<page>&<limit>")]
async fn leaderboard(
    context: &State<Context>,
    page: Option<u32>,
    limit: Option<u32>,
) -> Option<Json<PaginatedResponse<StreakRecord>>> {
    let page = page.unwrap_or(1).max(1);
    let limit = limit_or_default(limit);
    match context.query.leaderboard_page(page, limit).await {
        Ok((records, total)) => Some(Json(PaginatedResponse::new(records, page, limit, total))),
        Err(e) => {
            error!("Failed to get leaderboard: {e}");
            None
        }
    }
}

#[get("/hall_of_fame?<limit>")]
async fn hall_of_fame(
    context: &State<Context>,
    limit: Option<u32>,
) -> Option<Json<Vec<HallOfFameEntry>>> {
    match context.query.hall_of_fame(limit_or_default(limit)).await {
        Ok(entries) => Some(Json(entries)),
        Err(e) => {
            error!("Failed to get hall of fame: {e}");
            None
        }
    }
}

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket.mount("/", routes![metrics, leaderboard, hall_of_fame])
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::{http::Status, local::asynchronous::Client};

    use super::{limit_or_default, stage};
    use crate::events::commands::tests::test_context;

    #[test]
    fn limits() {
        assert_eq!(limit_or_default(None), 50);
        assert_eq!(limit_or_default(Some(0)), 1);
        assert_eq!(limit_or_default(Some(5000)), 500);
    }

    #[tokio::test]
    async fn serves_board_and_metrics() {
        let context = test_context().await;
        context
            .engine
            .store()
            .force_set(5, "alice", 12, Utc::now())
            .await
            .unwrap();

        let rocket = rocket::build().manage(context).attach(stage());
        let client = Client::tracked(rocket).await.unwrap();

        let response = client.get("/leaderboard?limit=5").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body = response.into_string().await.unwrap();
        assert!(body.contains("\"username\":\"alice\""));
        assert!(body.contains("\"current_day\":12"));
        assert!(body.contains("\"total_records\":1"));
        assert!(body.contains("\"total_pages\":1"));

        let response = client.get("/leaderboard?page=2&limit=5").dispatch().await;
        let body = response.into_string().await.unwrap();
        assert!(body.contains("\"records\":[]"));
        assert!(body.contains("\"page\":2"));

        let response = client.get("/hall_of_fame").dispatch().await;
        assert_eq!(response.into_string().await.unwrap(), "[]");

        let response = client.get("/metrics").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }
}
