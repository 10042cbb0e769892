//! Image decoding and tensor preparation
//!
//! Uploaded bytes are decoded with the `image` crate, converted to RGB,
//! resized to a square of the model input size and scaled to [0, 1].
//! The result is laid out NHWC with a batch dimension of one.

use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, ImageReader};

use crate::utils::error::{Error, Result};

/// Default model input size (PlantVillage images are 256x256)
pub const IMAGE_SIZE: u32 = 256;

/// Number of color channels fed to the model
pub const CHANNELS: usize = 3;

/// Bicubic resampling, the same kernel Pillow uses for `Image.resize`
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// An image ready for the classifier: shape [1, height, width, 3], values in [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl NormalizedImage {
    /// Wrap raw NHWC data, checking that it fills `shape`
    pub fn new(data: Vec<f32>, shape: [usize; 4]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::Preprocess(format!(
                "tensor of shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Decode uploaded bytes into an image, guessing the format from content
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(Error::Decode("uploaded file is empty".into()));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(Error::Decode("unrecognized image format".into()));
    }

    Ok(reader.decode()?)
}

/// Resize an image to the target dimensions, ignoring aspect ratio
fn resize_image(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    image.resize_exact(width, height, RESIZE_FILTER)
}

/// Scale RGB pixels into [0, 1], HWC order
fn normalize_image(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    rgb.as_raw().iter().map(|&v| v as f32 / 255.0).collect()
}

/// Turn a decoded image into the model input tensor
pub fn prepare_image(image: &DynamicImage, size: u32) -> Result<NormalizedImage> {
    if size == 0 {
        return Err(Error::Preprocess("target size must be positive".into()));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::Preprocess(format!(
            "image has no pixels ({}x{})",
            image.width(),
            image.height()
        )));
    }

    let resized = resize_image(image, size, size);
    let data = normalize_image(&resized);
    NormalizedImage::new(data, [1, size as usize, size as usize, CHANNELS])
}

/// Decode and prepare in one step
pub fn preprocess_bytes(bytes: &[u8], size: u32) -> Result<NormalizedImage> {
    let image = decode_image(bytes)?;
    prepare_image(&image, size)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, RgbaImage};

    /// Encode an image as PNG bytes
    pub(crate) fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    pub(crate) fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb(color),
        )))
    }

    #[test]
    fn test_empty_bytes_is_decode_error() {
        assert!(matches!(decode_image(&[]), Err(Error::Decode(_))));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = decode_image(b"this is plainly not an image");
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_truncated_png_is_decode_error() {
        let bytes = solid_png(40, 40, [10, 200, 30]);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(decode_image(truncated), Err(Error::Decode(_))));
    }

    #[test]
    fn test_prepared_shape_and_range() {
        let bytes = solid_png(300, 120, [0, 128, 255]);
        let tensor = preprocess_bytes(&bytes, IMAGE_SIZE).unwrap();

        assert_eq!(tensor.shape(), [1, 256, 256, 3]);
        assert_eq!(tensor.data().len(), 256 * 256 * 3);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));

        // HWC: first pixel holds R, G, B in order
        assert_eq!(tensor.data()[0], 0.0);
        assert!((tensor.data()[1] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(tensor.data()[2], 1.0);
    }

    #[test]
    fn test_resolution_does_not_change_uniform_tensor() {
        let small = preprocess_bytes(&solid_png(64, 64, [90, 160, 40]), IMAGE_SIZE).unwrap();
        let large = preprocess_bytes(&solid_png(1024, 512, [90, 160, 40]), IMAGE_SIZE).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_grayscale_and_alpha_become_rgb() {
        let gray = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            10,
            10,
            Luma([200]),
        )));
        let tensor = preprocess_bytes(&gray, 16).unwrap();
        assert_eq!(tensor.shape(), [1, 16, 16, 3]);
        assert_eq!(tensor.data()[0], tensor.data()[1]);

        let rgba = png_bytes(DynamicImage::ImageRgba8(RgbaImage::new(8, 8)));
        assert_eq!(preprocess_bytes(&rgba, 16).unwrap().shape(), [1, 16, 16, 3]);
    }

    #[test]
    fn test_zero_sized_image_is_preprocess_error() {
        let image = DynamicImage::new_rgb8(0, 0);
        assert!(matches!(
            prepare_image(&image, IMAGE_SIZE),
            Err(Error::Preprocess(_))
        ));
    }

    #[test]
    fn test_normalized_image_checks_length() {
        assert!(NormalizedImage::new(vec![0.0; 12], [1, 2, 2, 3]).is_ok());
        assert!(NormalizedImage::new(vec![0.0; 11], [1, 2, 2, 3]).is_err());
    }
}
