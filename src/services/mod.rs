pub mod tour_analytics;
