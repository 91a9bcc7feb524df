use actix_cors::Cors;
use actix_web::{
    web::{self, Data},
    App, HttpServer,
};
use tracing::level_filters::LevelFilter;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};

use auth::middleware::Authentication;
use config::Config;
use service::Service;
use sqs::service::SqsApi;

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod message;
pub mod queue;
pub mod service;
pub mod sqs;
pub mod tenant;

/// Returns a builder for the main application.
///
/// Binds two listeners: the SQS-compatible wire API (every `POST` goes
/// through SigV4 authentication and target dispatch) and the admin JSON API
/// the management UI consumes.
#[bon::builder(finish_fn = start)]
pub async fn run(config: Option<Config>) -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("BURROW_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("BURROW_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let config = match config {
        Some(config) => config,
        None => Config::load()?,
    };

    let service = Service::connect_with(config).await?;
    let config = service.config().clone();

    let data = Data::new(service);

    let api_data = data.clone();
    let api = HttpServer::new(move || {
        App::new()
            .app_data(api_data.clone())
            .wrap(SqsApi)
            .wrap(Authentication)
            .wrap(TracingLogger::default())
            .default_service(web::post().to(sqs::dispatch))
    })
    .bind((config.host(), config.api_port()))?
    .run();

    let ui_data = data.clone();
    let ui = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method();

        App::new()
            .app_data(ui_data.clone())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(api::service())
    })
    .bind((config.host(), config.ui_port()))?
    .run();

    tracing::info!(
        api = %format!("http://{}:{}", config.host(), config.api_port()),
        ui = %format!("http://{}:{}", config.host(), config.ui_port()),
        "Listening"
    );

    tokio::try_join!(api, ui)?;

    Ok(())
}
