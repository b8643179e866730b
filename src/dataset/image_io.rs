use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::error::OcrError;
use crate::types::ImageTensor;

/// Decodes an image, converts it to grayscale and bilinearly resizes it to
/// `height x width` with pixel values scaled into `[0, 1]`.
pub fn read_image_tensor(path: &Path, height: usize, width: usize) -> Result<ImageTensor, OcrError> {
    let image = image::open(path)
        .map_err(|e| OcrError::image(format!("decode '{}'", path.display()), e))?;
    Ok(gray_to_tensor(&image.to_luma8(), height, width))
}

pub fn gray_to_tensor(image: &GrayImage, height: usize, width: usize) -> ImageTensor {
    let resized = if image.width() as usize == width && image.height() as usize == height {
        image.clone()
    } else {
        imageops::resize(image, width as u32, height as u32, FilterType::Triangle)
    };
    let pixels = resized
        .as_raw()
        .iter()
        .map(|&value| value as f32 / 255.0)
        .collect();
    ImageTensor {
        height,
        width,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn scales_pixels_into_unit_range() {
        let image = GrayImage::from_fn(4, 2, |x, _| Luma([if x % 2 == 0 { 0 } else { 255 }]));
        let tensor = gray_to_tensor(&image, 2, 4);
        assert_eq!(tensor.pixels.len(), 8);
        assert_eq!(tensor.pixels[0], 0.0);
        assert_eq!(tensor.pixels[1], 1.0);
    }

    #[test]
    fn resizes_to_requested_shape() {
        let image = GrayImage::from_pixel(50, 10, Luma([128]));
        let tensor = gray_to_tensor(&image, 32, 100);
        assert_eq!((tensor.height, tensor.width), (32, 100));
        assert_eq!(tensor.pixels.len(), 3200);
        assert!(tensor.pixels.iter().all(|&p| (p - 128.0 / 255.0).abs() <= 1.0 / 255.0));
    }

    #[test]
    fn reads_png_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("img.png");
        GrayImage::from_pixel(20, 8, Luma([255]))
            .save(&path)
            .expect("save png");
        let tensor = read_image_tensor(&path, 8, 20).expect("readable png");
        assert!(tensor.pixels.iter().all(|&p| p == 1.0));
    }

    #[test]
    fn undecodable_file_is_image_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").expect("write file");
        let err = read_image_tensor(&path, 8, 8).expect_err("broken png");
        assert!(matches!(err, OcrError::Image { .. }));
    }
}
