#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod migrations;
pub mod request_logger;
pub mod routes;
pub mod test_support;

use std::sync::{Arc, Once};

use crate::auth::{
    AuthConfig, AuthState, InMemoryOtpStore, JwtService, LogOtpDelivery, OtpRegistry,
    PasswordService, RefreshTokenStore,
};
use crate::db::PlacementDb;
use crate::request_logger::RequestLogger;
use chrono::Utc;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::time::Duration as StdDuration;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    log::info!("starting placement portal API");

    // Business dashboards are served from a separate origin.
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(PlacementDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            match PlacementDb::fetch(&rocket) {
                Some(db) => {
                    let pool = (**db).clone();
                    match migrations::run_migrations(&pool).await {
                        Ok(_) => {
                            log::info!("database migrations successful");
                            Ok(rocket)
                        }
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    }
                }
                None => {
                    log::error!("database pool not available for migrations");
                    Err(rocket)
                }
            }
        }))
        // Manage a plain pool handle for handlers and build the auth state.
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let pool = match PlacementDb::fetch(&rocket) {
                Some(db) => (**db).clone(),
                None => {
                    log::error!("database pool not available for auth state");
                    return Err(rocket);
                }
            };

            let config = match AuthConfig::from_env() {
                Ok(config) => config,
                Err(err) => {
                    log::error!("auth configuration invalid: {}", err);
                    return Err(rocket);
                }
            };

            if config.expose_otp_in_response {
                log::warn!(
                    "PLACEMENT_EXPOSE_OTP_IN_RESPONSE is enabled; signup responses will \
                     contain the OTP. Never run production this way."
                );
            }
            // The in-memory registry is not shared between instances; signup
            // and verify must land on the same process.
            log::info!("OTP registry is process-local and lost on restart");

            let password_service = match PasswordService::new() {
                Ok(service) => Arc::new(service),
                Err(err) => {
                    log::error!("argon2 initialization failed: {}", err);
                    return Err(rocket);
                }
            };
            let jwt_service = match JwtService::from_config(&config) {
                Ok(service) => service,
                Err(err) => {
                    log::error!("jwt initialization failed: {}", err);
                    return Err(rocket);
                }
            };
            let refresh_store = RefreshTokenStore::new(pool.clone(), password_service.clone());
            let otp_registry =
                OtpRegistry::new(Box::new(InMemoryOtpStore::new()), config.otp_ttl_secs);

            let auth_state = AuthState::new(
                config,
                password_service,
                jwt_service,
                refresh_store,
                otp_registry,
                Arc::new(LogOtpDelivery),
            );

            Ok(rocket.manage(pool).manage(auth_state))
        }))
        // Optional expired-credential sweep, owned by the scheduler role
        // rather than the request path.
        .attach(AdHoc::on_liftoff("Spawn Token Sweep", |rocket| {
            Box::pin(async move {
                let Some(state) = rocket.state::<AuthState>() else {
                    return;
                };
                let Some(interval_secs) = state.config.token_sweep_interval_secs else {
                    log::info!("token sweep disabled; expired refresh rows are only filtered");
                    return;
                };

                let state = state.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(StdDuration::from_secs(interval_secs));
                    loop {
                        interval.tick().await;
                        let now = Utc::now();
                        state.otp_registry.purge_expired(now);
                        match state.refresh_store.purge_expired(now).await {
                            Ok(0) => {}
                            Ok(purged) => {
                                log::info!("purged {} expired refresh tokens", purged);
                            }
                            Err(err) => log::error!("refresh token sweep failed: {}", err),
                        }
                    }
                });
            })
        }))
        // Guard rejections render through these; without them Rocket would
        // answer 401/403 with its HTML error page instead of the JSON
        // contract body.
        .register(
            "/",
            catchers![auth::catchers::unauthorized, auth::catchers::forbidden],
        )
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Health routes
                routes::health::health_check,
                // Auth routes
                auth::routes::signup,
                auth::routes::verify_otp,
                auth::routes::login,
                auth::routes::refresh,
                auth::routes::me,
                auth::routes::signing_keys,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("General", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}
