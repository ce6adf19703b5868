use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, MethodRouter},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::handlers::{self, auth, factory, reviews, tours, users};
use crate::middleware::{protect, request_context, restrict_to, AuthState};
use crate::models::Role;

pub use crate::state::{AppState, Stores};

pub const API_PREFIX: &str = "/api/v1";

const TOUR_EDITORS: &[Role] = &[Role::Admin, Role::LeadGuide];
const TOUR_PLANNERS: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
const REVIEW_AUTHORS: &[Role] = &[Role::User];
const REVIEW_EDITORS: &[Role] = &[Role::User, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

/// Require a valid token and, when given, one of `roles`
fn guarded<S>(route: MethodRouter<S>, auth: &AuthState, roles: Option<&'static [Role]>) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    // route_layer wraps outside-in, so the role check is added first and runs second
    let route = match roles {
        Some(roles) => route.route_layer(from_fn_with_state(roles, restrict_to)),
        None => route,
    };
    route.route_layer(from_fn_with_state(auth.clone(), protect))
}

fn path(suffix: &str) -> String {
    format!("{}{}", API_PREFIX, suffix)
}

fn tour_routes(state: &AppState) -> Router {
    let auth = &state.auth;

    Router::new()
        .route(
            &path("/tours"),
            get(factory::list).merge(guarded(post(factory::create), auth, Some(TOUR_EDITORS))),
        )
        .route(&path("/tours/top-5-cheap"), get(tours::top_five_cheap))
        .route(&path("/tours/tour-stats"), get(tours::tour_stats))
        .route(
            &path("/tours/monthly-plan/:year"),
            guarded(get(tours::monthly_plan), auth, Some(TOUR_PLANNERS)),
        )
        .route(
            &path("/tours/tours-within/:distance/center/:latlng/unit/:unit"),
            get(tours::tours_within),
        )
        .route(&path("/tours/distances/:latlng/unit/:unit"), get(tours::distances))
        .route(
            &path("/tours/:id"),
            get(factory::read).merge(guarded(
                patch(factory::update).delete(factory::delete),
                auth,
                Some(TOUR_EDITORS),
            )),
        )
        .with_state(state.tours.clone())
}

fn review_routes(state: &AppState) -> Router {
    let auth = &state.auth;

    Router::new()
        .route(
            &path("/tours/:id/reviews"),
            get(reviews::list_for_tour).merge(guarded(post(reviews::create_for_tour), auth, Some(REVIEW_AUTHORS))),
        )
        .route(
            &path("/reviews"),
            guarded(get(factory::list), auth, None).merge(guarded(post(reviews::create), auth, Some(REVIEW_AUTHORS))),
        )
        .route(
            &path("/reviews/:id"),
            guarded(get(factory::read), auth, None).merge(guarded(
                patch(factory::update).delete(factory::delete),
                auth,
                Some(REVIEW_EDITORS),
            )),
        )
        .with_state(state.reviews.clone())
}

fn auth_routes(state: &AppState) -> Router {
    let session = &state.auth;
    let update_password = || guarded(patch(auth::update_my_password), session, None);

    Router::new()
        .route(&path("/users/signup"), post(auth::signup))
        .route(&path("/users/login"), post(auth::login))
        .route(&path("/users/updateMyPassword"), update_password())
        .route(&path("/users/updatemypassword"), update_password())
        .with_state(session.clone())
}

fn user_routes(state: &AppState) -> Router {
    let auth = &state.auth;

    let mut router = Router::new();
    // camelCase paths and their lowercase forms
    for (suffix, route) in [
        ("/users/me", guarded(get(users::get_me), auth, None)),
        ("/users/updateMe", guarded(patch(users::update_me), auth, None)),
        ("/users/updateme", guarded(patch(users::update_me), auth, None)),
        ("/users/deleteMe", guarded(axum::routing::delete(users::delete_me), auth, None)),
        ("/users/deleteme", guarded(axum::routing::delete(users::delete_me), auth, None)),
    ] {
        router = router.route(&path(suffix), route);
    }

    router
        .route(
            &path("/users"),
            guarded(get(factory::list).post(factory::create), auth, Some(ADMINS)),
        )
        .route(
            &path("/users/:id"),
            guarded(
                get(factory::read).patch(factory::update).delete(factory::delete),
                auth,
                Some(ADMINS),
            ),
        )
        .with_state(state.users.clone())
}

/// The full API router, without transport layers
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(tour_routes(&state))
        .merge(review_routes(&state))
        .merge(auth_routes(&state))
        .merge(user_routes(&state))
        .merge(Router::new().route("/health", get(handlers::health)).with_state(state))
        .fallback(handlers::not_found)
        .layer(from_fn(request_context))
}

/// Request logging, CORS and body size limits from configuration
pub fn with_http_layers(router: Router, config: &AppConfig) -> Router {
    let mut router = router.layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));

    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    if !config.security.enable_cors {
        return router;
    }

    let origins = &config.security.cors_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()))
    };

    router.layer(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
