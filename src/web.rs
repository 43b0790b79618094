// Local preview: the generated site plus the daily records as read-only JSON.

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::store::DailyStore;

#[derive(Debug, Serialize)]
struct StatusMessage {
    status: String,
    message: String,
}

fn status_reply(code: StatusCode, message: impl Into<String>) -> warp::reply::Response {
    let body = StatusMessage {
        status: "error".to_string(),
        message: message.into(),
    };
    warp::reply::with_status(warp::reply::json(&body), code).into_response()
}

pub fn api_routes(
    store: DailyStore,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let store_filter = warp::any().map(move || store.clone());

    let days = warp::get()
        .and(warp::path!("api" / "days"))
        .and(store_filter.clone())
        .and_then(list_days);

    let day = warp::get()
        .and(warp::path!("api" / "days" / String))
        .and(store_filter)
        .and_then(get_day);

    days.or(day)
}

async fn list_days(store: DailyStore) -> Result<warp::reply::Response, Rejection> {
    match store.dates().await {
        Ok(dates) => {
            let dates: Vec<String> = dates.iter().map(|d| d.to_string()).collect();
            Ok(warp::reply::json(&dates).into_response())
        }
        Err(e) => {
            warn!(error = %e, "cannot list daily records");
            Ok(status_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn get_day(date: String, store: DailyStore) -> Result<warp::reply::Response, Rejection> {
    let date = date.trim_end_matches(".json");
    let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
        return Ok(status_reply(StatusCode::BAD_REQUEST, "expected a YYYY-MM-DD date"));
    };

    match store.load(date).await {
        Ok(Some(record)) => Ok(warp::reply::json(&record).into_response()),
        Ok(None) => Ok(status_reply(
            StatusCode::NOT_FOUND,
            format!("no record for {}", date),
        )),
        Err(e) => {
            warn!(%date, error = %e, "cannot read daily record");
            Ok(status_reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

pub async fn start_server(port: u16, output_dir: PathBuf, store: DailyStore) -> Result<()> {
    if !output_dir.is_dir() {
        bail!(
            "output directory {} does not exist, generate the site first",
            output_dir.display()
        );
    }

    let routes = api_routes(store).or(warp::get().and(warp::fs::dir(output_dir.clone())));

    println!("{}", "=".repeat(60));
    println!("Serving {} at http://localhost:{}", output_dir.display(), port);
    println!("Daily records under http://localhost:{}/api/days", port);
    println!("Press Ctrl+C to stop");
    println!("{}", "=".repeat(60));

    warp::serve(routes).run(([127, 0, 0, 1], port)).await;
    Ok(())
}
