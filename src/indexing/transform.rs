//! Adaptive resize/recompress to fit the face service payload ceiling.

use image::{DynamicImage, ImageResult, codecs::jpeg::JpegEncoder, imageops::FilterType};

const MB: usize = 1024 * 1024;

/// Output settings chosen from the input size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodePlan {
    /// Optional coarse resize applied before the main pass.
    pub pre_resize: Option<u32>,
    /// Longest side of the output, in pixels.
    pub target_px: u32,
    pub quality: u8,
}

/// Last-resort settings when the tiered pass is still too large.
pub const EXTREME: EncodePlan = EncodePlan {
    pre_resize: None,
    target_px: 400,
    quality: 40,
};

/// Pick the tier for an input of `len` bytes.
pub fn plan_for(len: usize) -> EncodePlan {
    if len > 10 * MB {
        EncodePlan {
            pre_resize: Some(1200),
            target_px: 600,
            quality: 60,
        }
    } else if len > 5 * MB {
        EncodePlan {
            pre_resize: None,
            target_px: 700,
            quality: 70,
        }
    } else {
        EncodePlan {
            pre_resize: None,
            target_px: 800,
            quality: 85,
        }
    }
}

/// Shrinks photos before they are sent to the face service.
#[derive(Clone, Debug)]
pub struct ImageTransformer {
    max_payload_bytes: usize,
}

impl ImageTransformer {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// True when the buffer can be sent as-is.
    pub fn fits(&self, bytes: &[u8]) -> bool {
        bytes.len() <= self.max_payload_bytes
    }

    /// Transform on a blocking thread. Never fails: errors yield the input.
    pub async fn transform(&self, bytes: Vec<u8>) -> Vec<u8> {
        let this = self.clone();
        let fallback = bytes.clone();
        match tokio::task::spawn_blocking(move || this.transform_blocking(bytes)).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!("transform task failed, sending original: {e}");
                fallback
            }
        }
    }

    /// Synchronous body of [`transform`](Self::transform).
    pub fn transform_blocking(&self, bytes: Vec<u8>) -> Vec<u8> {
        let input_len = bytes.len();
        let img = match image::load_from_memory(&bytes) {
            Ok(i) => i,
            Err(e) => {
                tracing::warn!(input_len, "cannot decode photo, sending original: {e}");
                return bytes;
            }
        };

        let plan = plan_for(input_len);
        let out = match encode_with_plan(&img, plan) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(input_len, "re-encode failed, sending original: {e}");
                return bytes;
            }
        };
        tracing::debug!(input_len, output_len = out.len(), ?plan, "tiered pass done");
        if self.fits(&out) {
            return out;
        }

        // Still over the ceiling after the tiered pass.
        match encode_with_plan(&img, EXTREME) {
            Ok(extreme) => {
                tracing::info!(input_len, output_len = extreme.len(), "extreme compression applied");
                extreme
            }
            Err(e) => {
                tracing::warn!(input_len, "extreme compression failed: {e}");
                out
            }
        }
    }
}

/// Downscale to fit inside `px × px`. Never enlarges.
fn fit_inside(img: DynamicImage, px: u32) -> DynamicImage {
    if img.width() > px || img.height() > px {
        img.resize(px, px, FilterType::Lanczos3)
    } else {
        img
    }
}

fn encode_with_plan(img: &DynamicImage, plan: EncodePlan) -> ImageResult<Vec<u8>> {
    let mut work = img.clone();
    if let Some(px) = plan.pre_resize {
        work = fit_inside(work, px);
    }
    let work = fit_inside(work, plan.target_px);

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(work.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, plan.quality))?;
    Ok(buf)
}
