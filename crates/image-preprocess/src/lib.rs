//! Image Preprocessing
//!
//! Turns arbitrary uploaded image bytes into the fixed-shape tensor every
//! paddy model expects: decode, normalize to RGB, stretch to 224x224,
//! scale to [0, 1] and add a leading batch dimension.

mod preprocessor;
mod tensor;

pub use preprocessor::{ChannelPolicy, PreprocessConfig, Preprocessor, ResizeFilter};
pub use tensor::{ImageTensor, CHANNELS, INPUT_SHAPE, INPUT_SIZE};

use thiserror::Error;

/// Errors while turning image bytes into a model input tensor
#[derive(Debug, Clone, Error)]
pub enum PreprocessError {
    /// Bytes are not a recognizable image
    #[error("Image decode failed: {0}")]
    Decode(String),

    /// Decoded image cannot be normalized to the expected tensor shape
    #[error("Invalid image shape: {0}")]
    Shape(String),
}
