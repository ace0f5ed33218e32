//! Normalized model input tensor

use crate::PreprocessError;
use image::RgbImage;
use ndarray::{Array4, ArrayView4};

/// Side length of the square model input
pub const INPUT_SIZE: u32 = 224;

/// Color channels per pixel
pub const CHANNELS: usize = 3;

/// Input shape (batch, height, width, channel)
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE as usize, INPUT_SIZE as usize, CHANNELS];

/// A `(1, 224, 224, 3)` tensor with every value in `[0.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    /// Build from an already resized 224x224 RGB image, scaling by 1/255
    pub fn from_rgb(image: &RgbImage) -> Result<Self, PreprocessError> {
        let (width, height) = image.dimensions();
        if width != INPUT_SIZE || height != INPUT_SIZE {
            return Err(PreprocessError::Shape(format!(
                "expected {}x{} image, got {}x{}",
                INPUT_SIZE, INPUT_SIZE, width, height
            )));
        }

        let raw = image.as_raw();
        let expected = INPUT_SHAPE.iter().product::<usize>();
        if raw.len() != expected {
            return Err(PreprocessError::Shape(format!(
                "expected {} channel values, got {}",
                expected,
                raw.len()
            )));
        }

        let scaled: Vec<f32> = raw.iter().map(|&v| f32::from(v) / 255.0).collect();
        let data = Array4::from_shape_vec(
            (INPUT_SHAPE[0], INPUT_SHAPE[1], INPUT_SHAPE[2], INPUT_SHAPE[3]),
            scaled,
        )
        .map_err(|e| PreprocessError::Shape(e.to_string()))?;

        Ok(Self { data })
    }

    /// Wrap an existing array, validating shape and value range
    pub fn from_array(data: Array4<f32>) -> Result<Self, PreprocessError> {
        if data.shape() != INPUT_SHAPE {
            return Err(PreprocessError::Shape(format!(
                "expected tensor shape {:?}, got {:?}",
                INPUT_SHAPE,
                data.shape()
            )));
        }
        if let Some(v) = data.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(PreprocessError::Shape(format!(
                "tensor value {} outside [0, 1]",
                v
            )));
        }

        Ok(Self {
            data: data.as_standard_layout().into_owned(),
        })
    }

    /// All-zero (black) input, used to warm up models
    pub fn zeros() -> Self {
        Self {
            data: Array4::zeros((INPUT_SHAPE[0], INPUT_SHAPE[1], INPUT_SHAPE[2], INPUT_SHAPE[3])),
        }
    }

    /// Tensor shape, always [`INPUT_SHAPE`]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Values in row-major (NHWC) order
    pub fn as_slice(&self) -> &[f32] {
        // Every constructor produces a standard-layout array
        self.data
            .as_slice()
            .unwrap_or_default()
    }

    /// Mean of all values
    pub fn mean(&self) -> f32 {
        self.data.mean().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_from_rgb_scales_to_unit_range() {
        let img = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([255, 0, 51]));
        let tensor = ImageTensor::from_rgb(&img).unwrap();

        assert_eq!(tensor.shape(), &INPUT_SHAPE);
        let view = tensor.view();
        assert_eq!(view[[0, 10, 20, 0]], 1.0);
        assert_eq!(view[[0, 10, 20, 1]], 0.0);
        assert!((view[[0, 10, 20, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_from_rgb_rejects_wrong_size() {
        let img = RgbImage::new(100, 224);
        assert!(matches!(
            ImageTensor::from_rgb(&img),
            Err(PreprocessError::Shape(_))
        ));
    }

    #[test]
    fn test_from_array_validation() {
        let wrong_shape = Array4::<f32>::zeros((1, 3, 224, 224));
        assert!(ImageTensor::from_array(wrong_shape).is_err());

        let mut out_of_range = Array4::<f32>::zeros((1, 224, 224, 3));
        out_of_range[[0, 0, 0, 0]] = 1.5;
        assert!(ImageTensor::from_array(out_of_range).is_err());

        let ok = Array4::<f32>::from_elem((1, 224, 224, 3), 0.5);
        let tensor = ImageTensor::from_array(ok).unwrap();
        assert_eq!(tensor.as_slice().len(), 224 * 224 * 3);
        assert!((tensor.mean() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zeros() {
        let tensor = ImageTensor::zeros();
        assert_eq!(tensor.shape(), &INPUT_SHAPE);
        assert_eq!(tensor.mean(), 0.0);
    }
}
