//! Image decoding and tensor preparation shared by the detector and classifiers.

use crate::error::PredictError;
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// Decode uploaded bytes into an 8-bit RGB raster.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PredictError> {
    if bytes.is_empty() {
        return Err(PredictError::InvalidImage("empty payload".into()));
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PredictError::InvalidImage(e.to_string()))?
        .to_rgb8();

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(PredictError::InvalidImage(format!(
            "invalid dimensions {}x{}",
            decoded.width(),
            decoded.height()
        )));
    }

    Ok(decoded)
}

/// Resize to `size`×`size` and pack into a 1×3×H×W tensor.
///
/// Channels are written in B, G, R order and `mean_bgr` is subtracted per
/// channel with no further scaling, which is what Caffe-trained networks expect.
pub fn blob_from_image(image: &RgbImage, size: u32, mean_bgr: [f32; 3]) -> Array4<f32> {
    let resized;
    let src = if image.dimensions() == (size, size) {
        image
    } else {
        resized = imageops::resize(image, size, size, FilterType::Triangle);
        &resized
    };

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

    for (x, y, pixel) in src.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y, x]] = b as f32 - mean_bgr[0];
        tensor[[0, 1, y, x]] = g as f32 - mean_bgr[1];
        tensor[[0, 2, y, x]] = r as f32 - mean_bgr[2];
    }

    tensor
}

/// Copy the region under `bbox` out of `image`.
pub fn crop(image: &RgbImage, bbox: &BoundingBox) -> RgbImage {
    imageops::crop_imm(image, bbox.left, bbox.top, bbox.width(), bbox.height()).to_image()
}
