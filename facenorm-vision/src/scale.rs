//! Batch-wide scale matching.
//!
//! Every surviving image is resized so its face box matches the smallest box
//! of the batch along one axis, chosen per image by comparing its aspect
//! ratio with the ratio of the batch minimums.

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FaceError, Outcome};
use crate::geometry::{BoundingRect, PointSet};

/// Resizes images by independent horizontal and vertical factors.
pub trait Resizer {
    fn resize(&self, image: &DynamicImage, scale_x: f64, scale_y: f64) -> Result<DynamicImage>;
}

/// Resizer backed by `image::imageops`.
#[derive(Debug, Clone, Copy)]
pub struct ImageResizer {
    pub filter: FilterType,
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }
}

/// Target length of `len` scaled by `factor`, never below one pixel.
pub fn scaled_len(len: u32, factor: f64) -> u32 {
    (len as f64 * factor).round().max(1.0) as u32
}

impl Resizer for ImageResizer {
    fn resize(&self, image: &DynamicImage, scale_x: f64, scale_y: f64) -> Result<DynamicImage> {
        if !(scale_x.is_finite() && scale_x > 0.0 && scale_y.is_finite() && scale_y > 0.0) {
            anyhow::bail!("Invalid scale factors ({}, {})", scale_x, scale_y);
        }
        let (w, h) = image.dimensions();
        let (new_w, new_h) = (scaled_len(w, scale_x), scaled_len(h, scale_y));
        if (new_w, new_h) == (w, h) {
            return Ok(image.clone());
        }
        Ok(image.resize_exact(new_w, new_h, self.filter))
    }
}

/// Parse a filter name as written in the config file.
pub fn parse_filter(name: &str) -> Result<FilterType> {
    Ok(match name.to_ascii_lowercase().as_str() {
        "nearest" => FilterType::Nearest,
        "triangle" | "linear" => FilterType::Triangle,
        "catmullrom" | "cubic" => FilterType::CatmullRom,
        "gaussian" => FilterType::Gaussian,
        "lanczos3" | "lanczos" => FilterType::Lanczos3,
        other => anyhow::bail!("unknown resize filter: {}", other),
    })
}

/// Per-image scale factors, index-aligned with `rects`.
///
/// Failed entries keep their error; zero-sized rectangles become
/// `DegenerateRectangle`. Neither takes part in the min/max reduction.
pub fn scale_factors(rects: &[Outcome<BoundingRect>]) -> Vec<Outcome<f64>> {
    let checked: Vec<Outcome<BoundingRect>> = rects
        .iter()
        .map(|r| match r {
            Ok(rect) if rect.is_degenerate() => Err(FaceError::DegenerateRectangle {
                width: rect.width,
                height: rect.height,
            }),
            other => other.clone(),
        })
        .collect();

    let survivors = checked.iter().filter_map(|r| r.as_ref().ok());
    let Some((min_w, min_h)) = survivors.fold(None, |acc: Option<(i32, i32)>, r| match acc {
        Some((w, h)) => Some((w.min(r.width), h.min(r.height))),
        None => Some((r.width, r.height)),
    }) else {
        return checked.into_iter().map(|r| r.map(|_| 1.0)).collect();
    };

    let (min_w, min_h) = (min_w as f64, min_h as f64);
    let target_ratio = min_w / min_h;
    debug!(
        "Smallest face box {}x{}, target ratio {:.4}",
        min_w, min_h, target_ratio
    );

    checked
        .into_iter()
        .map(|r| {
            r.map(|rect| {
                let (w, h) = (rect.width as f64, rect.height as f64);
                if w / h > target_ratio {
                    min_w / w
                } else {
                    min_h / h
                }
            })
        })
        .collect()
}

/// One image after scale normalization.
#[derive(Debug, Clone)]
pub struct ScaledFace {
    pub image: DynamicImage,
    pub points: PointSet,
    pub rect: BoundingRect,
    pub scale: f64,
}

/// Summary of a rescaled face without the pixel data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleSummary {
    pub scale: f64,
    pub width: u32,
    pub height: u32,
    pub rect: BoundingRect,
}

impl ScaledFace {
    pub fn summary(&self) -> ScaleSummary {
        ScaleSummary {
            scale: self.scale,
            width: self.image.width(),
            height: self.image.height(),
            rect: self.rect,
        }
    }
}

/// Resize every surviving image by its factor, then re-extract on the
/// resized batch with `reextract`.
///
/// `reextract` receives the batch positions and resized images of the
/// survivors only and must return one outcome per image, in order.
pub fn normalize_scale<R, F>(
    resizer: &R,
    rects: &[Outcome<BoundingRect>],
    images: &[DynamicImage],
    mut reextract: F,
) -> Result<Vec<Outcome<ScaledFace>>>
where
    R: Resizer + ?Sized,
    F: FnMut(&[usize], &[DynamicImage]) -> Result<Vec<Outcome<(PointSet, BoundingRect)>>>,
{
    if rects.len() != images.len() {
        anyhow::bail!(
            "Batch misaligned: {} rectangles for {} images",
            rects.len(),
            images.len()
        );
    }

    let factors = scale_factors(rects);

    let mut positions = Vec::new();
    let mut resized = Vec::new();
    for (i, (factor, image)) in factors.iter().zip(images).enumerate() {
        match factor {
            Ok(s) => {
                debug!("Image {}: scale factor {:.4}", i, s);
                let out = resizer
                    .resize(image, *s, *s)
                    .with_context(|| format!("resizing image {}", i))?;
                positions.push(i);
                resized.push(out);
            }
            Err(e) => warn!("Image {} excluded from scaling: {}", i, e),
        }
    }
    info!("Rescaled {} of {} image(s)", resized.len(), images.len());

    let extracted = reextract(&positions, &resized)?;
    if extracted.len() != resized.len() {
        anyhow::bail!(
            "Re-extraction returned {} results for {} images",
            extracted.len(),
            resized.len()
        );
    }

    let mut rescaled = resized.into_iter().zip(extracted);
    factors
        .into_iter()
        .enumerate()
        .map(|(i, factor)| -> Result<Outcome<ScaledFace>> {
            let scale = match factor {
                Ok(s) => s,
                Err(e) => return Ok(Err(e)),
            };
            let (image, result) = rescaled
                .next()
                .context("re-extraction ran out of results")?;
            if let Err(e) = &result {
                warn!("Image {} lost its face after rescaling: {}", i, e);
            }
            Ok(result.map(|(points, rect)| ScaledFace {
                image,
                points,
                rect,
                scale,
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_scale_factors_match_narrower_axis() {
        let rects = vec![
            Ok(BoundingRect::new(0, 0, 100, 200)),
            Ok(BoundingRect::new(0, 0, 150, 200)),
        ];
        let factors = scale_factors(&rects);

        // ratio 0.5 == target: scale by height
        assert!(approx(factors[0].clone().unwrap(), 1.0));
        // ratio 0.75 > target: scale by width
        assert!(approx(factors[1].clone().unwrap(), 100.0 / 150.0));
    }

    #[test]
    fn test_scale_factors_taller_box_matches_height() {
        let rects = vec![
            Ok(BoundingRect::new(0, 0, 120, 120)),
            Ok(BoundingRect::new(0, 0, 80, 240)),
        ];
        // min_w 80, min_h 120, target 2/3
        let factors = scale_factors(&rects);
        assert!(approx(factors[0].clone().unwrap(), 80.0 / 120.0));
        assert!(approx(factors[1].clone().unwrap(), 120.0 / 240.0));
    }

    #[test]
    fn test_scale_factors_exclude_failures() {
        let rects = vec![
            Err(FaceError::NoFaceFound),
            Ok(BoundingRect::new(5, 5, 0, 0)),
            Ok(BoundingRect::new(0, 0, 50, 60)),
            Ok(BoundingRect::new(0, 0, 100, 120)),
        ];
        let factors = scale_factors(&rects);

        assert_eq!(factors[0], Err(FaceError::NoFaceFound));
        assert_eq!(
            factors[1],
            Err(FaceError::DegenerateRectangle {
                width: 0,
                height: 0
            })
        );
        assert!(approx(factors[2].clone().unwrap(), 1.0));
        assert!(approx(factors[3].clone().unwrap(), 0.5));
    }

    #[test]
    fn test_scale_factors_without_survivors() {
        let rects = vec![Err(FaceError::NoFaceFound), Ok(BoundingRect::default())];
        let factors = scale_factors(&rects);
        assert!(factors.iter().all(|f| f.is_err()));
        assert!(scale_factors(&[]).is_empty());
    }

    #[test]
    fn test_identical_boxes_are_untouched() {
        let rect = Ok(BoundingRect::new(3, 4, 64, 80));
        let factors = scale_factors(&[rect.clone(), rect.clone(), rect]);
        assert!(factors.iter().all(|f| approx(f.clone().unwrap(), 1.0)));
    }

    #[test]
    fn test_resizer_floors_at_one_pixel() -> Result<()> {
        let image = DynamicImage::new_rgb8(40, 10);
        let resizer = ImageResizer::default();

        let half = resizer.resize(&image, 0.5, 0.5)?;
        assert_eq!(half.dimensions(), (20, 5));

        let tiny = resizer.resize(&image, 0.01, 0.01)?;
        assert_eq!(tiny.dimensions(), (1, 1));

        assert!(resizer.resize(&image, 0.0, 1.0).is_err());
        assert!(resizer.resize(&image, f64::NAN, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_filter() {
        assert!(matches!(parse_filter("Nearest"), Ok(FilterType::Nearest)));
        assert!(matches!(parse_filter("lanczos"), Ok(FilterType::Lanczos3)));
        assert!(parse_filter("bicubic-ish").is_err());
    }

    #[test]
    fn test_normalize_scale_keeps_alignment() -> Result<()> {
        let images = vec![
            DynamicImage::new_rgb8(200, 200),
            DynamicImage::new_rgb8(300, 300),
            DynamicImage::new_rgb8(100, 100),
        ];
        let rects = vec![
            Ok(BoundingRect::new(0, 0, 100, 100)),
            Ok(BoundingRect::new(0, 0, 200, 200)),
            Err(FaceError::NoFaceFound),
        ];

        let mut seen = 0;
        let out = normalize_scale(&ImageResizer::default(), &rects, &images, |_, batch| {
            seen = batch.len();
            Ok(batch
                .iter()
                .map(|img| {
                    let rect = BoundingRect::new(0, 0, img.width() as i32, img.height() as i32);
                    Ok((PointSet::default(), rect))
                })
                .collect())
        })?;

        assert_eq!(seen, 2);
        assert_eq!(out.len(), 3);

        let first = out[0].as_ref().unwrap();
        assert!(approx(first.scale, 1.0));
        assert_eq!(first.image.dimensions(), (200, 200));

        let second = out[1].as_ref().unwrap();
        assert!(approx(second.scale, 0.5));
        assert_eq!(second.image.dimensions(), (150, 150));
        assert_eq!(second.summary().width, 150);

        assert_eq!(out[2].as_ref().err(), Some(&FaceError::NoFaceFound));
        Ok(())
    }

    #[test]
    fn test_normalize_scale_rejects_misaligned_batch() {
        let images = vec![DynamicImage::new_rgb8(4, 4)];
        let result = normalize_scale(&ImageResizer::default(), &[], &images, |_, _| Ok(vec![]));
        assert!(result.is_err());
    }

    #[test]
    fn test_lost_face_after_rescale_stays_in_place() -> Result<()> {
        let images = vec![
            DynamicImage::new_rgb8(100, 100),
            DynamicImage::new_rgb8(60, 60),
            DynamicImage::new_rgb8(200, 200),
            DynamicImage::new_rgb8(80, 80),
        ];
        let rects = vec![
            Ok(BoundingRect::new(0, 0, 50, 50)),
            Err(FaceError::NoFaceFound),
            Ok(BoundingRect::new(0, 0, 100, 100)),
            Ok(BoundingRect::new(0, 0, 50, 50)),
        ];

        let mut seen = Vec::new();
        let out = normalize_scale(&ImageResizer::default(), &rects, &images, |positions, batch| {
            seen = positions.to_vec();
            Ok(positions
                .iter()
                .zip(batch)
                .map(|(&i, img)| {
                    if i == 2 {
                        return Err(FaceError::NoFaceFound);
                    }
                    let rect = BoundingRect::new(0, 0, img.width() as i32, img.height() as i32);
                    Ok((PointSet::default(), rect))
                })
                .collect())
        })?;

        assert_eq!(seen, vec![0, 2, 3]);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].as_ref().map(|f| f.image.dimensions()), Ok((100, 100)));
        assert_eq!(out[1].as_ref().err(), Some(&FaceError::NoFaceFound));
        assert_eq!(out[2].as_ref().err(), Some(&FaceError::NoFaceFound));
        assert_eq!(out[3].as_ref().map(|f| f.image.dimensions()), Ok((80, 80)));
        Ok(())
    }
}
