use std::net::SocketAddr;

use axum::{routing, Router};
use profast::api::{parcel, payment, rider, tracking, user, withdrawal};
use profast::app::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().unwrap();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "profast=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_state = AppState::new_from_env().await.unwrap();

    let app = Router::new()
        .route("/", routing::get(root))
        .route("/users", routing::post(user::create))
        .route("/users/search", routing::get(user::search))
        .route(
            "/users/:id/role",
            routing::get(user::role).patch(user::update_role),
        )
        .route(
            "/parcels",
            routing::post(parcel::create).get(parcel::index),
        )
        .route(
            "/parcels/:id",
            routing::get(parcel::show).delete(parcel::delete),
        )
        .route("/parcels/:id/status", routing::patch(parcel::update_status))
        .route("/parcel/assignable", routing::get(parcel::assignable))
        .route("/parcel/:id/assigned", routing::patch(parcel::assign_rider))
        .route(
            "/create-payment-intent",
            routing::post(payment::create_intent),
        )
        .route(
            "/payments",
            routing::post(payment::confirm).get(payment::index),
        )
        .route("/tracking", routing::post(tracking::create))
        .route("/riders", routing::post(rider::apply))
        .route("/riders/pending", routing::get(rider::index_pending))
        .route("/riders/active", routing::get(rider::index_active))
        .route("/riders/deactivated", routing::get(rider::index_deactivated))
        .route("/riders/available", routing::get(rider::index_available))
        .route(
            "/riders/:id",
            routing::delete(rider::delete),
        )
        .route("/riders/:id/status", routing::patch(rider::update_status))
        .route("/rider/parcel", routing::get(rider::index_parcels))
        .route(
            "/rider/completed-parcel",
            routing::get(rider::index_completed_parcels),
        )
        .route("/rider/withdraw", routing::post(withdrawal::withdraw))
        .route(
            "/rider/withdrawals",
            routing::get(withdrawal::index_for_rider),
        )
        .route("/admin/withdrawals", routing::get(withdrawal::index_all))
        .route(
            "/admin/withdrawals/:id/status",
            routing::patch(withdrawal::update_status),
        )
        .with_state(app_state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::debug!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}

async fn root() -> &'static str {
    "Welcome To Pro Fast Server"
}
