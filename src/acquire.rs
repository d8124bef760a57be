//! Image acquisition: turn an `AnalysisRequest` into a decoded pixel grid,
//! either from inline base 64 data or by downloading `image_url`.

use crate::config::Settings;
use anyhow::Context;
use base64::{
    alphabet,
    engine::{GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use image::RgbImage;
use serde::Deserialize;
use std::fmt::{self, Debug};
use tracing::*;

/// A decoded three-channel, 8-bit image in RGB order
pub type DecodedImage = RgbImage;

type Result<T> = std::result::Result<T, AcquireError>;

/// Standard alphabet with required padding. Non-zero trailing bits in the last
/// symbol are tolerated (`QR==` decodes like `QQ==`)
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// An analysis request as posted to `/analyze-strip`
#[derive(Deserialize, Default, Clone)]
pub struct AnalysisRequest {
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
    #[serde(default)]
    pub debug: bool,
    pub client_id: Option<String>,
    pub scan_id: Option<String>,
}

impl Debug for AnalysisRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AnalysisRequest {{ image_url: {:?}, image_base64: {}, debug: {}, client_id: {:?}, scan_id: {:?} }}",
            self.image_url,
            match &self.image_base64 {
                Some(_) => "<data>",
                None => "None",
            },
            self.debug,
            self.client_id,
            self.scan_id
        )
    }
}

impl AnalysisRequest {
    /// Pick the image source. Inline data wins when both are supplied, and an
    /// empty string counts as not supplied
    pub fn source(&self) -> Option<ImageSource<'_>> {
        fn present(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|s| !s.is_empty())
        }

        present(&self.image_base64)
            .map(ImageSource::Base64)
            .or_else(|| present(&self.image_url).map(ImageSource::Url))
    }
}

/// Where the image bytes come from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageSource<'a> {
    Base64(&'a str),
    Url(&'a str),
}

impl ImageSource<'_> {
    /// The request field this source was read from
    pub fn field(&self) -> &'static str {
        match self {
            ImageSource::Base64(_) => "image_base64",
            ImageSource::Url(_) => "image_url",
        }
    }
}

/// Why an image could not be acquired
#[derive(thiserror::Error, Debug)]
pub enum AcquireError {
    #[error("Invalid base64: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Cannot download image_url: {0}")]
    FetchError(#[from] reqwest::Error),

    #[error("Invalid {0} content (cannot decode)")]
    DecodeError(&'static str),

    #[error("Provide image_url or image_base64")]
    MissingInput,

    /// The decode task died before returning
    #[error("image decode task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl AcquireError {
    /// Whether the caller sent something unusable, as opposed to a server fault
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AcquireError::Worker(_))
    }
}

/// Downloads and decodes request images. Holds a pooled HTTP client, so one
/// instance is built at start-up and cloned into every worker
#[derive(Debug, Clone)]
pub struct Acquirer {
    client: reqwest::Client,
}

impl Acquirer {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(settings.fetch_timeout())
            .use_rustls_tls();

        if let Some(path) = &settings.ca_bundle {
            let pem = std::fs::read(path)
                .with_context(|| format!("reading CA bundle {}", path.display()))?;
            for cert in reqwest::Certificate::from_pem_bundle(&pem)? {
                builder = builder.add_root_certificate(cert);
            }
            info!("trusting extra certificates from {}", path.display());
        }

        Ok(Acquirer {
            client: builder.build()?,
        })
    }

    /// Produce a decoded image from the request, or say why not
    pub async fn acquire(&self, req: &AnalysisRequest) -> Result<DecodedImage> {
        let source = req.source().ok_or(AcquireError::MissingInput)?;

        let bytes = match source {
            ImageSource::Base64(data) => decode_base64(data)?,
            ImageSource::Url(url) => self.fetch(url).await?,
        };

        let field = source.field();
        let image = tokio::task::spawn_blocking(move || decode_image(&bytes, field)).await??;

        debug!(
            "decoded {}x{} image from {field}",
            image.width(),
            image.height()
        );
        Ok(image)
    }

    /// Download the raw bytes behind `url`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("downloading {url}");
        let res = self.client.get(url).send().await?.error_for_status()?;
        let bytes = res.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Decode standard, padded base 64. Line breaks and other ASCII whitespace are
/// skipped, as are stray bits after the final byte
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: String = data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(BASE64.decode(compact)?)
}

/// Decode any supported image format into an RGB pixel grid
pub fn decode_image(bytes: &[u8], field: &'static str) -> Result<DecodedImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| {
            debug!("{field} is not a decodable image: {e}");
            AcquireError::DecodeError(field)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test::{png_base64, png_bytes};
    use actix_web::dev::ServerHandle;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use crate::server::WebError;
    use base64::engine::general_purpose;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;
    use std::net::SocketAddr;
    use std::time::Duration;

    fn acquirer() -> Acquirer {
        Acquirer::new(&Settings::default()).unwrap()
    }

    fn inline(data: &str) -> AnalysisRequest {
        AnalysisRequest {
            image_base64: Some(data.into()),
            ..Default::default()
        }
    }

    fn remote(url: String) -> AnalysisRequest {
        AnalysisRequest {
            image_url: Some(url),
            ..Default::default()
        }
    }

    /// Serve a 12x8 PNG at `/strip.png`, the same after a 3 second stall at
    /// `/slow.png`, and 404 everywhere else
    fn image_host() -> (SocketAddr, ServerHandle) {
        let server = HttpServer::new(|| {
            App::new()
                .route(
                    "/strip.png",
                    web::get().to(|| async {
                        HttpResponse::Ok()
                            .content_type("image/png")
                            .body(png_bytes(12, 8))
                    }),
                )
                .route(
                    "/slow.png",
                    web::get().to(|| async {
                        tokio::time::sleep(Duration::from_secs(3)).await;
                        HttpResponse::Ok()
                            .content_type("image/png")
                            .body(png_bytes(12, 8))
                    }),
                )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);
        (addr, handle)
    }

    #[actix_web::test]
    async fn test_inline_png() {
        let img = acquirer().acquire(&inline(&png_base64(10, 20))).await.unwrap();
        assert_eq!(img.dimensions(), (10, 20));
    }

    #[actix_web::test]
    async fn test_line_wrapped_base64() {
        let wrapped = png_base64(3, 4)
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let img = acquirer().acquire(&inline(&wrapped)).await.unwrap();
        assert_eq!(img.dimensions(), (3, 4));
    }

    #[actix_web::test]
    async fn test_malformed_base64() {
        let err = acquirer().acquire(&inline("not*base64!")).await.unwrap_err();
        assert!(matches!(err, AcquireError::InvalidEncoding(_)), "{err:?}");
        assert!(err.to_string().starts_with("Invalid base64: "));
        assert!(err.is_client_error());
    }

    #[actix_web::test]
    async fn test_base64_of_non_image() {
        let data = general_purpose::STANDARD.encode(b"definitely not a png");
        let err = acquirer().acquire(&inline(&data)).await.unwrap_err();
        assert!(matches!(err, AcquireError::DecodeError("image_base64")));
        assert_eq!(
            err.to_string(),
            "Invalid image_base64 content (cannot decode)"
        );
    }

    #[actix_web::test]
    async fn test_missing_input() {
        let err = acquirer()
            .acquire(&AnalysisRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::MissingInput));
        assert_eq!(err.to_string(), "Provide image_url or image_base64");

        let empty = AnalysisRequest {
            image_url: Some(String::new()),
            image_base64: Some(String::new()),
            ..Default::default()
        };
        let err = acquirer().acquire(&empty).await.unwrap_err();
        assert!(matches!(err, AcquireError::MissingInput));
    }

    #[actix_web::test]
    async fn test_url_image() {
        let (addr, handle) = image_host();
        let img = acquirer()
            .acquire(&remote(format!("http://{addr}/strip.png")))
            .await
            .unwrap();
        assert_eq!(img.dimensions(), (12, 8));
        handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_url_not_found() {
        let (addr, handle) = image_host();
        let err = acquirer()
            .acquire(&remote(format!("http://{addr}/missing.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::FetchError(_)), "{err:?}");
        assert!(err.to_string().starts_with("Cannot download image_url: "));
        handle.stop(false).await;
    }

    #[actix_web::test]
    async fn test_url_timeout() {
        let (addr, handle) = image_host();
        let settings = Settings {
            fetch_timeout_secs: 1,
            ..Settings::default()
        };
        let err = Acquirer::new(&settings)
            .unwrap()
            .acquire(&remote(format!("http://{addr}/slow.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::FetchError(ref e) if e.is_timeout()), "{err:?}");

        let web_err = WebError::from(err);
        assert_eq!(web_err.status_code(), StatusCode::BAD_REQUEST);
        assert!(web_err.to_string().starts_with("Cannot download image_url: "));
        handle.stop(false).await;
    }

    #[test]
    fn test_base64_trailing_bits() {
        assert_eq!(decode_base64("QR==").unwrap(), b"A");
        assert_eq!(decode_base64("QQ==").unwrap(), b"A");
        assert!(matches!(
            decode_base64("QQ"),
            Err(AcquireError::InvalidEncoding(_))
        ));
    }

    #[actix_web::test]
    async fn test_url_malformed() {
        let err = acquirer()
            .acquire(&remote("not a url".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::FetchError(_)), "{err:?}");
    }

    #[test]
    fn test_source_precedence() {
        let both = AnalysisRequest {
            image_url: Some("https://example.com/a.png".into()),
            image_base64: Some("AAAA".into()),
            ..Default::default()
        };
        assert_eq!(both.source(), Some(ImageSource::Base64("AAAA")));

        let empty_inline = AnalysisRequest {
            image_base64: Some(String::new()),
            ..both.clone()
        };
        assert_eq!(
            empty_inline.source(),
            Some(ImageSource::Url("https://example.com/a.png"))
        );
    }

    #[test]
    fn test_debug_hides_image_data() {
        let req = inline(&png_base64(2, 2));
        let printed = format!("{req:?}");
        assert!(printed.contains("image_base64: <data>"));
        assert!(!printed.contains("iVBOR"));
    }
}
