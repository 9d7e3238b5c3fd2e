use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use log::{debug, error, info};

use churn_backend::routes;
use churn_backend::{AppState, ChurnModel, FeatureSchema, OnnxChurnModel, ServerConfig};

#[actix_web::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting churn prediction service");
    let config = ServerConfig::from_env();

    let schema = match &config.schema_path {
        Some(path) => FeatureSchema::from_path(path)
            .with_context(|| format!("loading feature schema from {}", path.display()))?,
        None => FeatureSchema::telecom(),
    };
    info!(
        "Feature schema {} with {} fields",
        schema.version,
        schema.width()
    );

    let model = OnnxChurnModel::load(
        &config.model_path,
        schema.width(),
        config.model_output,
        &config.model_version,
    )
    .context("loading churn model")?;
    info!(
        "Model {} loaded from {} (output: {:?}, threshold: {})",
        model.version(),
        config.model_path.display(),
        config.model_output,
        config.threshold
    );

    let mut state = AppState::new(Arc::new(model), schema, config.threshold);
    state.static_dir = config.static_dir.clone();
    state.api_keys = Arc::new(config.api_keys.clone());
    state.rate_limit = config.rate_limit;
    state.batch_rate_limit = config.batch_rate_limit();
    if state.api_keys.is_empty() {
        info!("No API keys configured, JSON prediction endpoints are open");
    }

    let limiter = state.limiter.clone();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = limiter.purge_expired();
            if purged > 0 {
                debug!("Purged {} expired rate-limit entries", purged);
            }
        }
    });

    let bind_address = config.bind_address();
    info!("Listening on http://{} with {} workers", bind_address, config.workers);
    info!("   GET  /                   - home page");
    info!("   GET  /assesment          - customer form");
    info!("   POST /predict            - form prediction");
    info!("   GET  /api/health         - health check");
    info!("   GET  /api/model-info     - model information");
    info!("   GET  /api/stats          - prediction statistics");
    info!("   POST /api/encode         - feature vector only");
    info!("   POST /api/predict        - single prediction");
    info!("   POST /api/batch-predict  - batch prediction");

    let state = web::Data::new(state);
    let origins = config.allowed_origins.clone();
    let static_dir = config.static_dir.clone();

    HttpServer::new(move || {
        let cors = origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static("x-api-key"),
            ])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(DefaultHeaders::new().add(("X-Content-Type-Options", "nosniff")))
            .wrap(cors)
            .app_data(state.clone())
            .configure(|cfg| routes::configure(cfg, static_dir.clone()))
    })
    .workers(config.workers)
    .bind(&bind_address)
    .with_context(|| format!("binding {}", bind_address))?
    .run()
    .await
    .context("running HTTP server")?;

    Ok(())
}
