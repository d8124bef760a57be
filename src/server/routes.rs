use super::protocol::{AnalysisRequest, AnalysisResponse, HealthResponse, API_KEY_HEADER};
use super::WebError;
use crate::acquire::Acquirer;
use crate::analysis;
use crate::config::Settings;
use actix_web::dev::Payload;
use actix_web::{get, post, web, FromRequest, HttpRequest, Responder};
use anyhow::anyhow;
use std::future::{ready, Ready};
use tracing::*;

type Result<T> = std::result::Result<T, WebError>;

/// Proof that the request carried the shared secret, or that auth is off.
/// Extracted before the JSON body, so a rejected caller never gets its image
/// downloaded or decoded
pub struct Authorized;

impl FromRequest for Authorized {
    type Error = WebError;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(settings) = req.app_data::<web::Data<Settings>>() else {
            return ready(Err(anyhow!("settings are not registered as app data").into()));
        };

        let presented = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if settings.authorize(presented) {
            ready(Ok(Authorized))
        } else {
            warn!("rejecting request with a bad {API_KEY_HEADER} header");
            ready(Err(WebError::Unauthorized))
        }
    }
}

#[get("/health")]
pub async fn health() -> impl Responder {
    web::Json(HealthResponse { ok: true })
}

/// Decode the posted strip image and report on it
#[post("/analyze-strip")]
pub async fn analyze_strip(
    _auth: Authorized,
    req: web::Json<AnalysisRequest>,
    acquirer: web::Data<Acquirer>,
) -> Result<web::Json<AnalysisResponse>> {
    let span = info_span!(
        "analyze_strip",
        client_id = ?req.client_id,
        scan_id = ?req.scan_id,
        debug = req.debug
    );

    let image = acquirer.acquire(&req).instrument(span.clone()).await?;

    let outcome = span.in_scope(|| {
        let outcome = analysis::run_pipeline(&image);
        info!("finished serving analysis request");
        outcome
    });

    Ok(web::Json(outcome.into()))
}
