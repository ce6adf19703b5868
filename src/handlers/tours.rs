use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};

use crate::error::ApiError;
use crate::filter::FilterExpression;
use crate::handlers::factory::{raw_params, CrudHandlers};
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::services::tour_analytics::{self, DistanceUnit, GeoPoint};

/// Query parameters forced by the top-5-cheap alias
pub const TOP_FIVE_CHEAP: [(&str, &str); 3] = [
    ("limit", "5"),
    ("sort", "-ratingsAverage,price"),
    ("fields", "name,price,ratingsAverage,summary,difficulty"),
];

const LAT_LNG_FORMAT: &str = "Please provide latitude and longitude in the format lat,lng.";

pub async fn top_five_cheap(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    RawQuery(query): RawQuery,
) -> ApiResult {
    let mut params = raw_params(query);
    for (key, value) in TOP_FIVE_CHEAP {
        params.insert(key, value);
    }
    h.list(&ctx, &params, FilterExpression::new()).await
}

pub async fn tour_stats(State(h): State<Arc<CrudHandlers>>, ctx: RequestContext) -> ApiResult {
    let tours = h.store().find_all(&FilterExpression::new()).await?;
    tracing::debug!(request_id = %ctx.request_id, tours = tours.len(), "Computing tour stats");
    Ok(ApiResponse::success("stats", tour_analytics::tour_stats(&tours)))
}

pub async fn monthly_plan(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    Path(year): Path<String>,
) -> ApiResult {
    let year: i32 = year
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid year: {}.", year)))?;

    let tours = h.store().find_all(&FilterExpression::new()).await?;
    tracing::debug!(request_id = %ctx.request_id, year, "Computing monthly plan");
    Ok(ApiResponse::list("plan", tour_analytics::monthly_plan(&tours, year)))
}

/// `/tours-within/:distance/center/:latlng/unit/:unit`
pub async fn tours_within(
    State(h): State<Arc<CrudHandlers>>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> ApiResult {
    let center = GeoPoint::parse(&latlng).ok_or_else(|| ApiError::bad_request(LAT_LNG_FORMAT))?;
    let distance: f64 = distance
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid distance: {}.", distance)))?;

    let tours = h.store().find_all(&FilterExpression::new()).await?;
    let within = tour_analytics::tours_within(tours, center, distance, DistanceUnit::from_param(&unit));
    let within: Vec<_> = within.into_iter().map(|t| h.render(t)).collect();
    Ok(ApiResponse::list("data", within))
}

/// `/distances/:latlng/unit/:unit`
pub async fn distances(
    State(h): State<Arc<CrudHandlers>>,
    Path((latlng, unit)): Path<(String, String)>,
) -> ApiResult {
    let from = GeoPoint::parse(&latlng).ok_or_else(|| ApiError::bad_request(LAT_LNG_FORMAT))?;

    let tours = h.store().find_all(&FilterExpression::new()).await?;
    Ok(ApiResponse::success(
        "data",
        tour_analytics::distances(&tours, from, DistanceUnit::from_param(&unit)),
    ))
}
