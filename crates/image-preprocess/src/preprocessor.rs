//! Decode, normalize and resize uploaded images

use crate::tensor::{ImageTensor, INPUT_SIZE};
use crate::PreprocessError;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// How to treat images that are not 8-bit RGB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPolicy {
    /// Replicate grayscale into RGB, drop alpha, narrow 16-bit/float to 8-bit
    #[default]
    Convert,
    /// Reject anything but 8-bit RGB with a shape error
    Strict,
}

/// Resampling filter used for the stretch resize
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Preprocessing configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Channel normalization policy
    pub channel_policy: ChannelPolicy,
    /// Resize filter
    pub resize_filter: ResizeFilter,
}

/// Image preprocessor shared by all three tasks.
///
/// The resize always stretches to 224x224 (no crop, no padding), the
/// policy all three models were trained with.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Turn raw image bytes into a `(1, 224, 224, 3)` tensor in `[0, 1]`
    pub fn preprocess(&self, raw_bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
        let image = decode(raw_bytes)?;
        debug!(
            "Decoded {}x{} image ({:?})",
            image.width(),
            image.height(),
            image.color()
        );

        let rgb = self.to_rgb(image)?;
        let resized = imageops::resize(
            &rgb,
            INPUT_SIZE,
            INPUT_SIZE,
            self.config.resize_filter.into(),
        );

        ImageTensor::from_rgb(&resized)
    }

    fn to_rgb(&self, image: DynamicImage) -> Result<RgbImage, PreprocessError> {
        let color = image.color();
        let rgb = match (color, self.config.channel_policy) {
            (ColorType::Rgb8, _) => image.into_rgb8(),
            (_, ChannelPolicy::Convert) => image.to_rgb8(),
            (_, ChannelPolicy::Strict) => {
                return Err(PreprocessError::Shape(format!(
                    "expected 8-bit RGB input, got {:?} with {} channels",
                    color,
                    color.channel_count()
                )));
            }
        };

        let (width, height) = rgb.dimensions();
        let expected = width as usize * height as usize * 3;
        if rgb.as_raw().len() != expected {
            return Err(PreprocessError::Shape(format!(
                "expected 3 channels per pixel, buffer holds {} values for {}x{}",
                rgb.as_raw().len(),
                width,
                height
            )));
        }

        Ok(rgb)
    }
}

fn decode(raw_bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    if raw_bytes.is_empty() {
        return Err(PreprocessError::Decode("input is empty".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(raw_bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(PreprocessError::Decode(
            "unrecognized image format".to_string(),
        ));
    }

    let image = reader
        .decode()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessError::Decode(format!(
            "image has zero size ({}x{})",
            image.width(),
            image.height()
        )));
    }

    Ok(image)
}
