use serde::{Deserialize, Serialize};

use crate::error::Outcome;

/// A pixel coordinate in image space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// Ordered points of one image: facial landmarks first, then an optional
/// trailing block of background points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPointSet")]
pub struct PointSet {
    points: Vec<Point>,
    background: usize,
}

#[derive(Deserialize)]
struct RawPointSet {
    points: Vec<Point>,
    background: usize,
}

impl TryFrom<RawPointSet> for PointSet {
    type Error = String;

    fn try_from(raw: RawPointSet) -> Result<Self, Self::Error> {
        if raw.background > raw.points.len() {
            return Err(format!(
                "{} background points in a set of {}",
                raw.background,
                raw.points.len()
            ));
        }
        Ok(Self {
            points: raw.points,
            background: raw.background,
        })
    }
}

impl PointSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            background: 0,
        }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self::new(Vec::with_capacity(n))
    }

    pub fn push(&mut self, point: Point) {
        // keep background points trailing
        let at = self.points.len() - self.background;
        self.points.insert(at, point);
    }

    pub fn extend_facial<I: IntoIterator<Item = Point>>(&mut self, points: I) {
        for p in points {
            self.push(p);
        }
    }

    /// Append the eight frame anchors for an image of the given size.
    /// Calling it again replaces the previous anchors.
    pub fn with_background(mut self, height: u32, width: u32) -> Self {
        let facial = self.points.len() - self.background;
        self.points.truncate(facial);
        let anchors = crate::background::background_points(height, width);
        self.points.extend_from_slice(&anchors);
        self.background = anchors.len();
        self
    }

    /// Every point, background included.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Landmark points only.
    pub fn facial(&self) -> &[Point] {
        &self.points[..self.points.len() - self.background]
    }

    pub fn background(&self) -> &[Point] {
        &self.points[self.points.len() - self.background..]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl std::ops::Index<usize> for PointSet {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

/// Axis-aligned rectangle with a top-left origin.
///
/// Pixel-inclusive: a rectangle around integer points covers columns
/// `x..x + width` and rows `y..y + height`, so a single point has size 1x1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    pub fn centroid(&self) -> Centroid {
        centroid(self)
    }
}

/// Floating-point centre of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

/// Minimal rectangle enclosing `points`. An empty slice gives `(0, 0, 0, 0)`.
pub fn bounding_rect(points: &[Point]) -> BoundingRect {
    let Some(first) = points.first() else {
        return BoundingRect::default();
    };

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    BoundingRect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}

/// Rectangles around the facial points of every image, index-aligned with
/// the input. Background points never contribute.
pub fn bounding_rects(point_sets: &[Outcome<PointSet>]) -> Vec<Outcome<BoundingRect>> {
    point_sets
        .iter()
        .map(|set| set.as_ref().map(|s| bounding_rect(s.facial())).map_err(|e| e.clone()))
        .collect()
}

pub fn centroid(rect: &BoundingRect) -> Centroid {
    Centroid {
        x: rect.x as f64 + rect.width as f64 / 2.0,
        y: rect.y as f64 + rect.height as f64 / 2.0,
    }
}
