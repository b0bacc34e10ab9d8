//! Bitmap preprocessing ahead of line OCR.

use image::{DynamicImage, GrayImage};

/// Grayscale the page and stretch its contrast to the full 0–255 range.
pub fn prepare_for_ocr(image: &DynamicImage) -> GrayImage {
    let mut gray = image.to_luma8();
    autocontrast(&mut gray);
    gray
}

/// Map the darkest pixel to 0 and the brightest to 255, linearly.
/// Uniform images are left untouched.
pub fn autocontrast(image: &mut GrayImage) {
    let (lo, hi) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if hi <= lo {
        return;
    }
    let range = (hi - lo) as u32;
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate().skip(lo as usize).take(range as usize + 1) {
        *slot = ((v as u32 - lo as u32) * 255 / range) as u8;
    }
    for p in image.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
}
