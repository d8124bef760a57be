//! The strip-analysis response contract. The calibration pipeline itself is
//! not implemented yet: `run_pipeline` reports `PipelineNotImplemented`, which
//! renders as a stub response asking the client to retake later.

use crate::acquire::DecodedImage;
use serde::Serialize;

const STUB_WARNING: &str = "Pipeline not implemented yet";
const STUB_RETAKE_REASON: &str = "Backend analysis pipeline not implemented yet";
const STUB_RETAKE_TIPS: [&str; 2] = [
    "Integrate the endpoint with fetch() first; real analysis will be enabled later",
    "Make sure image_url is public or signed; otherwise send image_base64",
];

/// `[width, height]` in pixels
pub type ImageSize = [u32; 2];

/// One measured pad on the strip
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PadReading {
    pub pad: String,
    pub rgb: [u8; 3],
    pub delta_e: Option<f64>,
}

/// Output of a completed analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub image_size: ImageSize,
    pub orientation: String,
    pub pads: Vec<PadReading>,
    pub found_bars: bool,
    pub calibration_error: Option<f64>,
    pub blur_score: Option<f64>,
    pub warnings: Vec<String>,
}

/// What the pipeline produced for one image
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Only the image was decoded; no analysis ran
    PipelineNotImplemented { image_size: ImageSize },

    Analyzed(AnalysisResult),
}

/// Run the analysis pipeline on a decoded image
pub fn run_pipeline(image: &DecodedImage) -> AnalysisOutcome {
    AnalysisOutcome::PipelineNotImplemented {
        image_size: [image.width(), image.height()],
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub image_size: ImageSize,
    pub found_bars: bool,
    pub calibration_error: Option<f64>,
    pub found_pads: usize,
    pub blur_score: Option<f64>,
    pub warnings: Vec<String>,
}

/// The JSON body returned by `/analyze-strip`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisResponse {
    pub ok: bool,
    pub orientation: String,
    pub results: Vec<PadReading>,
    pub diagnostics: Diagnostics,
    pub retake_reason: Option<String>,
    pub retake_tips: Vec<String>,
}

impl From<AnalysisOutcome> for AnalysisResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        match outcome {
            AnalysisOutcome::PipelineNotImplemented { image_size } => AnalysisResponse {
                ok: false,
                orientation: String::new(),
                results: vec![],
                diagnostics: Diagnostics {
                    image_size,
                    found_bars: false,
                    calibration_error: None,
                    found_pads: 0,
                    blur_score: None,
                    warnings: vec![STUB_WARNING.into()],
                },
                retake_reason: Some(STUB_RETAKE_REASON.into()),
                retake_tips: STUB_RETAKE_TIPS.iter().map(|t| t.to_string()).collect(),
            },
            AnalysisOutcome::Analyzed(result) => AnalysisResponse {
                ok: true,
                orientation: result.orientation,
                diagnostics: Diagnostics {
                    image_size: result.image_size,
                    found_bars: result.found_bars,
                    calibration_error: result.calibration_error,
                    found_pads: result.pads.len(),
                    blur_score: result.blur_score,
                    warnings: result.warnings,
                },
                results: result.pads,
                retake_reason: None,
                retake_tips: vec![],
            },
        }
    }
}
