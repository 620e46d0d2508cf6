use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use proprust::controllers::routes;
use proprust::notify::LogMailer;
use proprust::payments::StripeGateway;
use proprust::premium::PlanCatalog;
use proprust::settings::{Backend, Settings};
use proprust::state::AppState;
use proprust::store::{ListingStore, MemoryStore, MongoStore};

fn startup_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let env = env_logger::Env::default().default_filter_or("info,actix_web=debug");
    env_logger::Builder::from_env(env).init();

    let settings = Settings::load().map_err(startup_error)?;

    let store: Arc<dyn ListingStore> = match settings.database.backend {
        Backend::Mongo => Arc::new(
            MongoStore::connect(&settings.database.uri, &settings.database.name)
                .await
                .map_err(startup_error)?,
        ),
        Backend::Memory => {
            log::warn!("using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let payments = StripeGateway::new(
        &settings.payments.api_base,
        &settings.payments.secret_key,
        &settings.payments.currency,
        settings.external_timeout(),
    )
    .map_err(startup_error)?;

    let plans = PlanCatalog::default();
    log::info!("premium plans: {}", plans.keys().collect::<Vec<_>>().join(", "));

    let state = web::Data::new(AppState {
        store,
        mailer: Arc::new(LogMailer),
        payments: Arc::new(payments),
        plans,
        jwt_secret: settings.auth.jwt_secret.clone(),
        webhook_secret: settings.payments.webhook_secret.clone(),
        external_timeout: settings.external_timeout(),
    });

    let bind = (settings.server.host.clone(), settings.server.port);
    log::info!("listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method();
        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes)
    })
    .bind(bind)?
    .run()
    .await
}
