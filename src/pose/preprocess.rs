use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::{
    core::{self, AlgorithmHint, Mat, Rect, Scalar, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

use super::crop::Letterbox;

/// Cut `letterbox.rect` out of a BGR frame and pack it as the landmark models
/// expect it:
///
/// - BGR -> RGB
/// - aspect-preserving resize, black padding to a square
/// - [1, size, size, 3] f32 tensor in 0.0-1.0
pub fn letterbox_tensor(frame: &Mat, letterbox: &Letterbox) -> Result<Array4<f32>> {
    let r = letterbox.rect;
    let roi = Mat::roi(frame, Rect::new(r.x, r.y, r.width, r.height)).context("crop outside frame")?;

    let mut rgb = Mat::default();
    imgproc::cvt_color(&roi, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(letterbox.scaled_w, letterbox.scaled_h),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let size = letterbox.input_size;
    let mut padded = Mat::default();
    core::copy_make_border(
        &resized,
        &mut padded,
        letterbox.pad_y,
        size - letterbox.scaled_h - letterbox.pad_y,
        letterbox.pad_x,
        size - letterbox.scaled_w - letterbox.pad_x,
        core::BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;

    let mut float_mat = Mat::default();
    padded.convert_to(&mut float_mat, CV_32FC3, 1.0 / 255.0, 0.0)?;

    let mut tensor = Array4::<f32>::zeros((1, size as usize, size as usize, 3));
    for y in 0..size {
        for x in 0..size {
            let pixel = float_mat.at_2d::<Vec3f>(y, x)?;
            tensor[[0, y as usize, x as usize, 0]] = pixel[0];
            tensor[[0, y as usize, x as usize, 1]] = pixel[1];
            tensor[[0, y as usize, x as usize, 2]] = pixel[2];
        }
    }

    Ok(tensor)
}
