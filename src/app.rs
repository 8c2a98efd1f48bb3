//! HTTP router assembly.
//!
//! Routes are grouped by who may call them. Each group carries its own rate
//! limiter; the limiter runs before authentication so rejected callers never
//! reach the auth service.
//!
//! | Group    | Limiter       | Guards                     |
//! |----------|---------------|----------------------------|
//! | public   | public        | none                       |
//! | tmdb     | tmdb          | none                       |
//! | customer | authenticated | bearer token               |
//! | ordering | order         | bearer token               |
//! | admin    | admin         | bearer token + allow-list  |
//! | cron     | public        | `CRON_SECRET` (in handler) |

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{
        catalog, checkout, commissioners, cron, health, inventory, leads, orders, stats, tickets,
        tmdb, trial,
    },
    middleware::{
        auth::{admin_middleware, auth_middleware},
        rate_limit::rate_limit_middleware,
    },
    state::AppState,
};

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/categories", get(catalog::list_categories))
        .route("/api/products", get(catalog::list_products))
        .route("/api/products/{id}", get(catalog::get_product))
        .route("/api/promo/validate", post(commissioners::validate_promo))
        .route("/api/leads", post(leads::create_lead))
        .route("/api/cron/expire", post(cron::expire))
        .route_layer(axum_middleware::from_fn_with_state(
            state.limiters.public.clone(),
            rate_limit_middleware,
        ));

    let tmdb_routes = Router::new()
        .route("/api/tmdb/search", get(tmdb::search))
        .route("/api/tmdb/discover", get(tmdb::discover))
        .route("/api/tmdb/trending", get(tmdb::trending))
        .route("/api/tmdb/{kind}/{id}", get(tmdb::details))
        .route("/api/tmdb/{kind}/{id}/credits", get(tmdb::credits))
        .route("/api/tmdb/{kind}/{id}/providers", get(tmdb::providers))
        .route_layer(axum_middleware::from_fn_with_state(
            state.limiters.tmdb.clone(),
            rate_limit_middleware,
        ));

    let customer_routes = Router::new()
        .route("/api/orders", get(orders::list_my_orders))
        .route("/api/orders/{id}", get(orders::get_my_order))
        .route("/api/subscriptions", get(orders::list_my_subscriptions))
        .route(
            "/api/tickets",
            get(tickets::list_my_tickets).post(tickets::create_ticket),
        )
        .route("/api/tickets/{id}", get(tickets::get_my_ticket))
        .route("/api/tickets/{id}/messages", post(tickets::customer_reply))
        .route("/api/trial/redeem", post(trial::redeem))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.limiters.authenticated.clone(),
            rate_limit_middleware,
        ));

    // Same path as the customer GET; merged method routers combine
    let ordering_routes = Router::new()
        .route("/api/orders", post(orders::create_order))
        .route("/api/checkout/paypal/create", post(checkout::create_checkout))
        .route("/api/checkout/paypal/capture", post(checkout::capture_checkout))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.limiters.order.clone(),
            rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .route("/categories", post(catalog::create_category))
        .route(
            "/categories/{id}",
            put(catalog::update_category).delete(catalog::delete_category),
        )
        .route("/products", post(catalog::create_product))
        .route(
            "/products/{id}",
            put(catalog::update_product).delete(catalog::delete_product),
        )
        .route(
            "/inventory",
            get(inventory::list_inventory).post(inventory::add_inventory),
        )
        .route("/orders", get(orders::admin_list_orders))
        .route("/orders/{id}/approve", post(orders::approve_order))
        .route("/orders/{id}/reject", post(orders::reject_order))
        .route("/orders/{id}/assign", post(orders::assign_order))
        .route(
            "/subscriptions/{id}/refresh",
            post(orders::refresh_subscription),
        )
        .route(
            "/commissioners",
            get(commissioners::list_commissioners).post(commissioners::create_commissioner),
        )
        .route("/commissioners/{id}", put(commissioners::update_commissioner))
        .route("/commissioners/{id}/earnings", get(commissioners::get_earnings))
        .route("/commissioners/{id}/payout", post(commissioners::payout))
        .route("/leads", get(leads::list_leads))
        .route("/leads/{id}", patch(leads::update_lead))
        .route("/tickets", get(tickets::admin_list_tickets))
        .route("/tickets/{id}", patch(tickets::admin_update_ticket))
        .route("/tickets/{id}/messages", post(tickets::admin_reply))
        .route(
            "/trial-codes",
            get(trial::list_codes).post(trial::generate_codes),
        )
        .route("/stats", get(stats::dashboard))
        // route_layer order: last added runs first
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.limiters.admin.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(tmdb_routes)
        .merge(customer_routes)
        .merge(ordering_routes)
        .nest("/api/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
