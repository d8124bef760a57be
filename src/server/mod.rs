//! The user-facing JSON web server. Accepts strip images, decodes them and
//! answers with an `AnalysisResponse`.

use crate::acquire::AcquireError;
use crate::config::Settings;
use actix_cors::Cors;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use protocol::ErrorResponse;
use tracing::*;

pub mod protocol;
pub mod routes;

/// Failure of a single request. Rendered as `{"detail": "<message>"}`
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(anyhow::Error),
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(ErrorResponse {
                detail: self.to_string(),
            })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            WebError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AcquireError> for WebError {
    fn from(err: AcquireError) -> Self {
        if err.is_client_error() {
            warn!("rejecting request: {err}");
            WebError::BadRequest(err.to_string())
        } else {
            error!("{err}");
            WebError::Internal(err.into())
        }
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> WebError {
        WebError::Internal(err)
    }
}

/// Cross-origin policy: any origin may call GET/POST/OPTIONS with any header,
/// without credentials
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
}

/// Register the routes and the JSON body policy. The caller supplies
/// `web::Data<Settings>` and `web::Data<Acquirer>` as app data
pub fn configure(settings: &Settings) -> impl Fn(&mut web::ServiceConfig) + Clone + Send {
    let limit = settings.max_body_bytes;
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(
            web::JsonConfig::default()
                .limit(limit)
                .error_handler(|err, _req| WebError::BadRequest(err.to_string()).into()),
        )
        .service(routes::health)
        .service(routes::analyze_strip);
    }
}
