use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use actix_files::{Files, NamedFile};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::ContentType;
use actix_web::middleware::{from_fn, Next};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info, warn};

use crate::error::{AppError, InvalidRecord};
use crate::features::{self, FeatureVector, RawRecord};
use crate::inference::ChurnModel;
use crate::models::{ApiResponse, ChurnPrediction, ModelInfo};
use crate::pages;
use crate::ratelimit::RateLimiter;
use crate::schema::FeatureSchema;
use crate::stats::{PredictionStats, StatsSnapshot};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const MAX_BATCH: usize = 1000;

/// Shared, read-only state plus the counters and rate-limit table.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn ChurnModel>,
    pub schema: Arc<FeatureSchema>,
    pub threshold: f32,
    pub static_dir: PathBuf,
    pub api_keys: Arc<Vec<String>>,
    pub rate_limit: u32,
    pub batch_rate_limit: u32,
    pub stats: Arc<PredictionStats>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(model: Arc<dyn ChurnModel>, schema: FeatureSchema, threshold: f32) -> Self {
        Self {
            model,
            schema: Arc::new(schema),
            threshold,
            static_dir: PathBuf::from("./static"),
            api_keys: Arc::new(Vec::new()),
            rate_limit: 0,
            batch_rate_limit: 0,
            stats: Arc::new(PredictionStats::new()),
            limiter: Arc::new(RateLimiter::new()),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            version: self.model.version().to_string(),
            schema_version: self.schema.version.clone(),
            input_width: self.model.input_width(),
            threshold: self.threshold,
            features: self.schema.field_names(),
        }
    }

    fn encode(&self, record: &RawRecord) -> Result<FeatureVector, InvalidRecord> {
        features::encode(&self.schema, record).map_err(|invalid| {
            self.stats.record_rejected();
            invalid
        })
    }

    fn throttle(&self, request: &HttpRequest, limit: u32) -> Result<(), AppError> {
        match request.peer_addr() {
            Some(addr) => self.limiter.check(&addr.ip().to_string(), limit),
            None => Ok(()),
        }
    }

    /// Runs the model on the blocking pool and wraps the result.
    async fn predict(&self, input: FeatureVector) -> Result<ChurnPrediction, AppError> {
        let start = Instant::now();
        let model = self.model.clone();
        let vector = input.clone();

        let probability = web::block(move || model.predict(&vector))
            .await
            .map_err(|e| {
                self.stats.record_model_error();
                AppError::Blocking(e.to_string())
            })?
            .map_err(|e| {
                self.stats.record_model_error();
                AppError::Model(e)
            })?;

        let prediction = ChurnPrediction::new(
            probability,
            features::describe(&self.schema, &input),
            self.threshold,
            self.model.version(),
        );
        self.stats.record_prediction(prediction.churn, start.elapsed());
        Ok(prediction)
    }

    async fn predict_batch(
        &self,
        batch: Vec<FeatureVector>,
    ) -> Result<Vec<ChurnPrediction>, AppError> {
        let start = Instant::now();
        let model = self.model.clone();
        let vectors = batch.clone();

        let probabilities = web::block(move || {
            vectors
                .iter()
                .map(|vector| model.predict(vector))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| {
            self.stats.record_model_error();
            AppError::Blocking(e.to_string())
        })?
        .map_err(|e| {
            self.stats.record_model_error();
            AppError::Model(e)
        })?;

        let per_record = start.elapsed() / probabilities.len().max(1) as u32;
        Ok(batch
            .iter()
            .zip(probabilities)
            .map(|(vector, probability)| {
                let prediction = ChurnPrediction::new(
                    probability,
                    features::describe(&self.schema, vector),
                    self.threshold,
                    self.model.version(),
                );
                self.stats.record_prediction(prediction.churn, per_record);
                prediction
            })
            .collect())
    }

    fn authorized(&self, key: Option<&str>) -> Result<(), AppError> {
        if self.api_keys.is_empty() {
            return Ok(());
        }
        match key {
            Some(key) if self.api_keys.iter().any(|valid| valid == key) => Ok(()),
            Some(_) => Err(AppError::Unauthorized("invalid API key")),
            None => Err(AppError::Unauthorized("missing API key")),
        }
    }
}

async fn home(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    serve_page(&state, "home.html", &req).await
}

async fn assessment(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    serve_page(&state, "assessment.html", &req).await
}

async fn serve_page(state: &AppState, file: &str, req: &HttpRequest) -> HttpResponse {
    let path = state.static_dir.join(file);
    match NamedFile::open_async(&path).await {
        Ok(file) => file.into_response(req),
        Err(e) => {
            error!("Cannot open page {}: {}", path.display(), e);
            HttpResponse::InternalServerError()
                .content_type(ContentType::html())
                .body(pages::render_failure("Page unavailable"))
        }
    }
}

/// Form submission from the assessment page; always answers with HTML.
async fn predict_form(
    state: web::Data<AppState>,
    form: web::Form<HashMap<String, String>>,
    request: HttpRequest,
) -> HttpResponse {
    if state.throttle(&request, state.rate_limit).is_err() {
        return HttpResponse::TooManyRequests()
            .content_type(ContentType::html())
            .body(pages::render_failure("Too many requests, try again in a minute."));
    }

    let record = RawRecord::from_form(form.into_inner());
    let features = match state.encode(&record) {
        Ok(features) => features,
        Err(invalid) => {
            warn!("Rejected form submission: {}", invalid);
            return HttpResponse::BadRequest()
                .content_type(ContentType::html())
                .body(pages::render_errors(invalid.problems()));
        }
    };

    match state.predict(features).await {
        Ok(prediction) => {
            info!(
                "Form prediction: probability={:.3} churn={}",
                prediction.probability, prediction.churn
            );
            HttpResponse::Ok()
                .content_type(ContentType::html())
                .body(pages::render_result(&prediction))
        }
        Err(e) => {
            error!("Form prediction failed: {}", e);
            HttpResponse::InternalServerError()
                .content_type(ContentType::html())
                .body(pages::render_failure("The model could not score this customer."))
        }
    }
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success("churn prediction service is up"))
}

async fn model_info(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ApiResponse::success(state.model_info()))
}

async fn stats(state: web::Data<AppState>) -> impl Responder {
    let snapshot: StatsSnapshot = state.stats.snapshot();
    HttpResponse::Ok().json(ApiResponse::success(snapshot))
}

async fn encode_record(
    state: web::Data<AppState>,
    record: web::Json<RawRecord>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    state.throttle(&request, state.rate_limit)?;
    let features = state.encode(&record)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(features)))
}

async fn predict_record(
    state: web::Data<AppState>,
    record: web::Json<RawRecord>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let start = Instant::now();
    state.throttle(&request, state.rate_limit)?;

    let features = state.encode(&record)?;
    let prediction = state.predict(features).await?;
    info!(
        "API prediction: probability={:.3} churn={}",
        prediction.probability, prediction.churn
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(prediction).timed(start)))
}

async fn batch_predict(
    state: web::Data<AppState>,
    records: web::Json<Vec<RawRecord>>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let start = Instant::now();
    state.throttle(&request, state.batch_rate_limit)?;

    let records = records.into_inner();
    info!("Batch prediction request: {} records", records.len());
    if records.is_empty() {
        return Err(AppError::EmptyBatch);
    }
    if records.len() > MAX_BATCH {
        return Err(AppError::BatchTooLarge {
            size: records.len(),
            limit: MAX_BATCH,
        });
    }

    let batch = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            state
                .encode(record)
                .map_err(|source| AppError::BatchRecord { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let predictions = state.predict_batch(batch).await?;
    info!("Batch prediction done: {} results", predictions.len());
    Ok(HttpResponse::Ok().json(ApiResponse::success(predictions).timed(start)))
}

async fn require_api_key(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    if let Some(state) = req.app_data::<web::Data<AppState>>() {
        let key = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        state.authorized(key)?;
    }
    next.call(req).await
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::error("endpoint not found"))
}

/// JSON bodies that fail to deserialize get the same envelope as other errors.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(10 * 1024 * 1024)
        .error_handler(|err, _req| {
            let message = err.to_string();
            actix_web::error::InternalError::from_response(
                err,
                HttpResponse::BadRequest().json(ApiResponse::<()>::error(&message)),
            )
            .into()
        })
}

fn form_config() -> web::FormConfig {
    web::FormConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            let message = err.to_string();
            actix_web::error::InternalError::from_response(
                err,
                HttpResponse::BadRequest()
                    .content_type(ContentType::html())
                    .body(pages::render_failure(&message)),
            )
            .into()
        })
}

/// Registers every route. `AppState` must already be in app data.
pub fn configure(cfg: &mut web::ServiceConfig, static_dir: PathBuf) {
    cfg.app_data(json_config())
        .app_data(form_config())
        .route("/", web::get().to(home))
        .route("/assesment", web::get().to(assessment))
        .route("/assessment", web::get().to(assessment))
        .route("/predict", web::post().to(predict_form))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health_check))
                .route("/model-info", web::get().to(model_info))
                .route("/stats", web::get().to(stats))
                .service(
                    web::resource("/encode")
                        .wrap(from_fn(require_api_key))
                        .route(web::post().to(encode_record)),
                )
                .service(
                    web::resource("/predict")
                        .wrap(from_fn(require_api_key))
                        .route(web::post().to(predict_record)),
                )
                .service(
                    web::resource("/batch-predict")
                        .wrap(from_fn(require_api_key))
                        .route(web::post().to(batch_predict)),
                )
                .default_service(web::route().to(not_found)),
        )
        .service(Files::new("/static", static_dir).prefer_utf8(true))
        .default_service(web::route().to(not_found));
}
