use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::Array4;
#[allow(unused_imports)]
use ort::ep::{self, ExecutionProvider};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};

pub fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Load an ONNX model from disk. Called once per capability; the session is
/// reused for every image of every pass.
pub fn load_session(path: &Path) -> Result<Session> {
    if !path.exists() {
        anyhow::bail!("model file not found: {}", path.display());
    }
    log::debug!("Loading model {}", path.display());
    session_builder()?
        .commit_from_file(path)
        .with_context(|| format!("load model {}", path.display()))
}

/// Channel order of a planar input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Pack an RGB buffer into a `[1, 3, H, W]` tensor, multiplying each value
/// by `scale`.
pub fn planar_tensor(img: &RgbImage, order: ChannelOrder, scale: f32) -> Result<Array4<f32>> {
    let (width, height) = img.dimensions();
    let pixel_count = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];

    let (first, rest) = data.split_at_mut(pixel_count);
    let (second, third) = rest.split_at_mut(pixel_count);
    let (r_channel, g_channel, b_channel) = match order {
        ChannelOrder::Rgb => (first, second, third),
        ChannelOrder::Bgr => (third, second, first),
    };

    for (i, px) in img.as_raw().chunks_exact(3).enumerate() {
        r_channel[i] = px[0] as f32 * scale;
        g_channel[i] = px[1] as f32 * scale;
        b_channel[i] = px[2] as f32 * scale;
    }

    Ok(Array4::from_shape_vec(
        (1, 3, height as usize, width as usize),
        data,
    )?)
}
