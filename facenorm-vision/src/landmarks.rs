use anyhow::{Context, Result};
use image::DynamicImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FaceError, Outcome};
use crate::geometry::{Point, PointSet};

/// Landmarks returned per face by the predictor (iBUG 300-W layout).
pub const LANDMARK_COUNT: usize = 68;

/// Axis-aligned face box reported by a detector, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl FaceRegion {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersect with a `width` x `height` image. `None` when nothing is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        let x0 = self.x.max(0.0);
        let y0 = self.y.max(0.0);
        let x1 = (self.x + self.width).min(width as f32);
        let y1 = (self.y + self.height).min(height as f32);
        if !(x1 - x0 >= 1.0 && y1 - y0 >= 1.0) {
            return None;
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
            score: self.score,
        })
    }
}

/// Finds faces in an image.
pub trait FaceDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceRegion>>;
}

/// Places the 68 landmarks of one face.
pub trait LandmarkPredictor {
    fn predict(&mut self, image: &DynamicImage, region: &FaceRegion) -> Result<Vec<Point>>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceRegion>> {
        (**self).detect(image)
    }
}

impl<T: LandmarkPredictor + ?Sized> LandmarkPredictor for Box<T> {
    fn predict(&mut self, image: &DynamicImage, region: &FaceRegion) -> Result<Vec<Point>> {
        (**self).predict(image, region)
    }
}

/// What to do when a detector reports more than one face in an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiFacePolicy {
    /// Keep the region with the largest area.
    #[default]
    Largest,
    /// Keep the first region in detector order.
    First,
    /// Concatenate the landmarks of every region.
    Merge,
    /// Fail the image with `MultipleFacesAmbiguous`.
    Reject,
}

impl MultiFacePolicy {
    fn select(self, regions: Vec<FaceRegion>) -> Outcome<Vec<FaceRegion>> {
        match self {
            _ if regions.len() <= 1 => Ok(regions),
            MultiFacePolicy::Merge => Ok(regions),
            MultiFacePolicy::First => Ok(regions.into_iter().take(1).collect()),
            // ties go to the earliest region
            MultiFacePolicy::Largest => Ok(regions
                .into_iter()
                .rev()
                .max_by(|a, b| a.area().total_cmp(&b.area()))
                .into_iter()
                .collect()),
            MultiFacePolicy::Reject => Err(FaceError::MultipleFacesAmbiguous {
                count: regions.len(),
            }),
        }
    }
}

impl std::str::FromStr for MultiFacePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "largest" => Ok(Self::Largest),
            "first" => Ok(Self::First),
            "merge" => Ok(Self::Merge),
            "reject" => Ok(Self::Reject),
            other => anyhow::bail!("unknown multi-face policy: {}", other),
        }
    }
}

/// Landmarks for a single image.
///
/// The outer `Result` carries fatal detector/predictor failures; the inner
/// `Outcome` carries the per-image verdict.
pub fn extract_one<D, P>(
    detector: &mut D,
    predictor: &mut P,
    image: &DynamicImage,
    policy: MultiFacePolicy,
) -> Result<Outcome<PointSet>>
where
    D: FaceDetector + ?Sized,
    P: LandmarkPredictor + ?Sized,
{
    let detected = detector.detect(image).context("detecting faces")?;
    let regions: Vec<FaceRegion> = detected
        .iter()
        .filter_map(|r| r.clip(image.width(), image.height()))
        .collect();
    debug!(
        "detector returned {} region(s), {} inside the image",
        detected.len(),
        regions.len()
    );

    if regions.is_empty() {
        return Ok(Err(FaceError::NoFaceFound));
    }
    if regions.len() > 1 {
        warn!(
            "{} faces found in one image, applying {:?} policy",
            regions.len(),
            policy
        );
    }

    let regions = match policy.select(regions) {
        Ok(r) => r,
        Err(e) => return Ok(Err(e)),
    };

    let mut points = PointSet::with_capacity(regions.len() * LANDMARK_COUNT);
    for region in &regions {
        let landmarks = predictor
            .predict(image, region)
            .context("predicting landmarks")?;
        if landmarks.len() != LANDMARK_COUNT {
            anyhow::bail!(
                "Expected {} landmarks from predictor, got {}",
                LANDMARK_COUNT,
                landmarks.len()
            );
        }
        points.extend_facial(landmarks);
    }

    Ok(Ok(points))
}

/// Landmarks for every image of a batch, index-aligned with `images`.
///
/// Images without a usable face are reported and yield an error entry;
/// the rest of the batch is still processed.
pub fn extract_landmarks<D, P>(
    detector: &mut D,
    predictor: &mut P,
    images: &[DynamicImage],
    policy: MultiFacePolicy,
) -> Result<Vec<Outcome<PointSet>>>
where
    D: FaceDetector + ?Sized,
    P: LandmarkPredictor + ?Sized,
{
    extract_indexed(detector, predictor, images.iter().enumerate(), policy)
}

/// Like [`extract_landmarks`], for a subset of a batch. Each image comes with
/// its position in the full batch, which is what logs and errors report.
pub fn extract_indexed<'a, D, P, I>(
    detector: &mut D,
    predictor: &mut P,
    images: I,
    policy: MultiFacePolicy,
) -> Result<Vec<Outcome<PointSet>>>
where
    D: FaceDetector + ?Sized,
    P: LandmarkPredictor + ?Sized,
    I: IntoIterator<Item = (usize, &'a DynamicImage)>,
{
    images
        .into_iter()
        .map(|(i, image)| -> Result<Outcome<PointSet>> {
            let outcome = extract_one(&mut *detector, &mut *predictor, image, policy)
                .with_context(|| format!("image {}", i))?;
            if let Err(e) = &outcome {
                warn!("Image {}: {}", i, e);
            }
            Ok(outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a fixed list of regions regardless of the image.
    struct FixedDetector(Vec<FaceRegion>);

    impl FaceDetector for FixedDetector {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<FaceRegion>> {
            Ok(self.0.clone())
        }
    }

    /// Puts every landmark on the region's top-left corner.
    struct CornerPredictor {
        count: usize,
        calls: usize,
    }

    impl LandmarkPredictor for CornerPredictor {
        fn predict(&mut self, _image: &DynamicImage, region: &FaceRegion) -> Result<Vec<Point>> {
            self.calls += 1;
            Ok(vec![Point::new(region.x as i32, region.y as i32); self.count])
        }
    }

    fn region(x: f32, y: f32, w: f32, h: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            score: 0.9,
        }
    }

    fn predictor() -> CornerPredictor {
        CornerPredictor {
            count: LANDMARK_COUNT,
            calls: 0,
        }
    }

    #[test]
    fn test_no_face_is_reported_not_fatal() -> Result<()> {
        let images = vec![DynamicImage::new_rgb8(8, 8); 2];
        let mut detector = FixedDetector(vec![]);
        let mut predictor = predictor();

        let out = extract_landmarks(
            &mut detector,
            &mut predictor,
            &images,
            MultiFacePolicy::Largest,
        )?;
        assert_eq!(
            out,
            vec![Err(FaceError::NoFaceFound), Err(FaceError::NoFaceFound)]
        );
        assert_eq!(predictor.calls, 0);
        Ok(())
    }

    #[test]
    fn test_single_face_yields_68_points() -> Result<()> {
        let image = DynamicImage::new_rgb8(8, 8);
        let mut detector = FixedDetector(vec![region(3.0, 4.0, 2.0, 2.0)]);
        let mut predictor = predictor();

        let set = extract_one(&mut detector, &mut predictor, &image, MultiFacePolicy::Reject)?
            .expect("face");
        assert_eq!(set.len(), LANDMARK_COUNT);
        assert_eq!(set[0], Point::new(3, 4));
        Ok(())
    }

    #[test]
    fn test_multi_face_policies() -> Result<()> {
        let image = DynamicImage::new_rgb8(8, 8);
        let regions = vec![region(1.0, 1.0, 2.0, 2.0), region(5.0, 5.0, 10.0, 10.0)];

        let run = |policy| -> Result<Outcome<PointSet>> {
            let mut detector = FixedDetector(regions.clone());
            extract_one(&mut detector, &mut predictor(), &image, policy)
        };

        let merged = run(MultiFacePolicy::Merge)?.expect("merge");
        assert_eq!(merged.len(), 2 * LANDMARK_COUNT);
        assert_eq!(merged[LANDMARK_COUNT], Point::new(5, 5));

        let first = run(MultiFacePolicy::First)?.expect("first");
        assert_eq!(first.len(), LANDMARK_COUNT);
        assert_eq!(first[0], Point::new(1, 1));

        let largest = run(MultiFacePolicy::Largest)?.expect("largest");
        assert_eq!(largest[0], Point::new(5, 5));

        assert_eq!(
            run(MultiFacePolicy::Reject)?,
            Err(FaceError::MultipleFacesAmbiguous { count: 2 })
        );
        Ok(())
    }

    #[test]
    fn test_largest_tie_keeps_first_region() -> Result<()> {
        let image = DynamicImage::new_rgb8(16, 16);
        let mut detector = FixedDetector(vec![
            region(1.0, 1.0, 4.0, 4.0),
            region(8.0, 8.0, 4.0, 4.0),
            region(2.0, 9.0, 2.0, 2.0),
        ]);

        let set = extract_one(
            &mut detector,
            &mut predictor(),
            &image,
            MultiFacePolicy::Largest,
        )?
        .expect("face");
        assert_eq!(set[0], Point::new(1, 1));
        Ok(())
    }

    #[test]
    fn test_region_outside_image_is_no_face() -> Result<()> {
        let images = vec![DynamicImage::new_rgb8(100, 100); 2];
        let mut detector = FixedDetector(vec![
            region(-50.0, -50.0, 20.0, 20.0),
            region(120.0, 10.0, 30.0, 30.0),
        ]);
        let mut predictor = predictor();

        let out = extract_landmarks(
            &mut detector,
            &mut predictor,
            &images,
            MultiFacePolicy::Merge,
        )?;
        assert_eq!(
            out,
            vec![Err(FaceError::NoFaceFound), Err(FaceError::NoFaceFound)]
        );
        assert_eq!(predictor.calls, 0);
        Ok(())
    }

    #[test]
    fn test_region_clipped_to_image() {
        let clipped = region(-10.0, 90.0, 30.0, 30.0).clip(100, 100);
        assert_eq!(clipped, Some(region(0.0, 90.0, 20.0, 10.0)));
        assert_eq!(region(10.0, 10.0, 0.5, 40.0).clip(100, 100), None);
    }

    #[test]
    fn test_indexed_extraction_reports_batch_positions() {
        let images = vec![DynamicImage::new_rgb8(8, 8)];
        let mut detector = FixedDetector(vec![region(0.0, 0.0, 4.0, 4.0)]);
        let mut predictor = CornerPredictor { count: 5, calls: 0 };

        let err = match extract_indexed(
            &mut detector,
            &mut predictor,
            [(7, &images[0])],
            MultiFacePolicy::Largest,
        ) {
            Ok(_) => panic!("wrong landmark count must fail"),
            Err(e) => e,
        };
        assert_eq!(err.to_string(), "image 7");
    }

    #[test]
    fn test_wrong_landmark_count_is_fatal() {
        let image = DynamicImage::new_rgb8(8, 8);
        let mut detector = FixedDetector(vec![region(0.0, 0.0, 4.0, 4.0)]);
        let mut predictor = CornerPredictor { count: 5, calls: 0 };

        let result = extract_landmarks(
            &mut detector,
            &mut predictor,
            &[image],
            MultiFacePolicy::Largest,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "Largest".parse::<MultiFacePolicy>().unwrap(),
            MultiFacePolicy::Largest
        );
        assert_eq!(
            "merge".parse::<MultiFacePolicy>().unwrap(),
            MultiFacePolicy::Merge
        );
        assert!("biggest".parse::<MultiFacePolicy>().is_err());
    }
}
