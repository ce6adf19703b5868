//! Aggregations over tour documents: difficulty stats, monthly start plan and
//! spherical distance queries. All functions work on already-fetched documents,
//! so they behave the same on every record store.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

use crate::filter::filter_where::FilterWhere;
use crate::filter::{Document, ID_FIELD};

/// Minimum `ratingsAverage` for a tour to count towards stats
pub const STATS_MIN_RATING: f64 = 4.5;

const EARTH_RADIUS_MI: f64 = 3963.2;
const EARTH_RADIUS_KM: f64 = 6378.1;
const EARTH_RADIUS_M: f64 = 6_378_100.0;

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// `mi` selects miles, anything else kilometers
    pub fn from_param(unit: &str) -> Self {
        if unit == "mi" { DistanceUnit::Miles } else { DistanceUnit::Kilometers }
    }

    fn earth_radius(&self) -> f64 {
        match self {
            DistanceUnit::Miles => EARTH_RADIUS_MI,
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
        }
    }

    /// Meters -> this unit
    fn multiplier(&self) -> f64 {
        match self {
            DistanceUnit::Miles => 0.000621371,
            DistanceUnit::Kilometers => 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Parse `"lat,lng"`
    pub fn parse(latlng: &str) -> Option<GeoPoint> {
        let (lat, lng) = latlng.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(GeoPoint { lat, lng })
    }

    /// GeoJSON `{type: "Point", coordinates: [lng, lat]}`
    fn from_geojson(value: &Value) -> Option<GeoPoint> {
        let coords = value.get("coordinates")?.as_array()?;
        match coords.as_slice() {
            [lng, lat, ..] => Some(GeoPoint { lat: lat.as_f64()?, lng: lng.as_f64()? }),
            _ => None,
        }
    }

    /// Haversine central angle in radians
    fn angle_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }
}

fn number(doc: &Document, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

#[derive(Default)]
struct DifficultyGroup {
    num_tours: u64,
    num_ratings: f64,
    rating_sum: f64,
    price_sum: f64,
    min_price: Option<f64>,
    max_price: Option<f64>,
}

/// Per-difficulty figures for well-rated tours, cheapest average first
pub fn tour_stats(tours: &[Document]) -> Vec<Value> {
    let mut groups: BTreeMap<String, DifficultyGroup> = BTreeMap::new();

    for tour in tours {
        let Some(rating) = number(tour, "ratingsAverage").filter(|r| *r >= STATS_MIN_RATING) else {
            continue;
        };
        let difficulty = tour
            .get("difficulty")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_uppercase();
        let group = groups.entry(difficulty).or_default();

        group.num_tours += 1;
        group.num_ratings += number(tour, "ratingsQuantity").unwrap_or(0.0);
        group.rating_sum += rating;
        if let Some(price) = number(tour, "price") {
            group.price_sum += price;
            group.min_price = Some(group.min_price.map_or(price, |m| m.min(price)));
            group.max_price = Some(group.max_price.map_or(price, |m| m.max(price)));
        }
    }

    let mut stats: Vec<(f64, Value)> = groups
        .into_iter()
        .map(|(difficulty, g)| {
            let n = g.num_tours as f64;
            let avg_price = g.price_sum / n;
            let entry = json!({
                "difficulty": difficulty,
                "numTours": g.num_tours,
                "numRatings": g.num_ratings,
                "avgRating": g.rating_sum / n,
                "avgPrice": avg_price,
                "minPrice": g.min_price,
                "maxPrice": g.max_price,
            });
            (avg_price, entry)
        })
        .collect();

    stats.sort_by(|a, b| a.0.total_cmp(&b.0));
    stats.into_iter().map(|(_, v)| v).collect()
}

/// Start dates are stored as RFC 3339 or as the seed format `2021-06-19,10:00`
fn parse_start_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d,%H:%M", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Tour starts per month of `year`, busiest month first, at most twelve entries
pub fn monthly_plan(tours: &[Document], year: i32) -> Vec<Value> {
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();

    for tour in tours {
        let name = tour.get("name").and_then(Value::as_str).unwrap_or_default();
        let Some(dates) = tour.get("startDates").and_then(Value::as_array) else {
            continue;
        };
        for date in dates.iter().filter_map(Value::as_str).filter_map(parse_start_date) {
            if date.year() == year {
                months.entry(date.month()).or_default().push(name.to_string());
            }
        }
    }

    let mut plan: Vec<(u32, Vec<String>)> = months.into_iter().collect();
    // month order breaks ties
    plan.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));
    plan.truncate(12);

    plan.into_iter()
        .map(|(month, names)| {
            json!({
                "numTourStarts": names.len(),
                "tours": names,
                "month": MONTHS[(month - 1) as usize],
                "year": year,
            })
        })
        .collect()
}

/// Tours whose start location lies within `distance` of `center`
pub fn tours_within(tours: Vec<Document>, center: GeoPoint, distance: f64, unit: DistanceUnit) -> Vec<Document> {
    let radius = distance / unit.earth_radius();
    tours
        .into_iter()
        .filter(|tour| {
            FilterWhere::lookup(tour, "startLocation")
                .and_then(GeoPoint::from_geojson)
                .is_some_and(|p| center.angle_to(&p) <= radius)
        })
        .collect()
}

/// `{id, name, distance}` for every tour with a start location, nearest first
pub fn distances(tours: &[Document], from: GeoPoint, unit: DistanceUnit) -> Vec<Value> {
    let mut out: Vec<(f64, Value)> = tours
        .iter()
        .filter_map(|tour| {
            let point = tour.get("startLocation").and_then(GeoPoint::from_geojson)?;
            let distance = from.angle_to(&point) * EARTH_RADIUS_M * unit.multiplier();
            Some((
                distance,
                json!({
                    "id": tour.get(ID_FIELD).cloned().unwrap_or(Value::Null),
                    "name": tour.get("name").cloned().unwrap_or(Value::Null),
                    "distance": distance,
                }),
            ))
        })
        .collect();

    out.sort_by(|a, b| a.0.total_cmp(&b.0));
    out.into_iter().map(|(_, v)| v).collect()
}
