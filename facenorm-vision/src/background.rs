//! Fixed frame anchors appended after the facial landmarks so later
//! triangulation or warping keeps the background in place.

use crate::geometry::Point;

pub const BACKGROUND_POINT_COUNT: usize = 8;

/// Corners and edge midpoints of a `width` x `height` frame, in the order
/// top-left, top-mid, top-right, left-mid, right-mid, bottom-left,
/// bottom-mid, bottom-right.
pub fn background_points(height: u32, width: u32) -> [Point; BACKGROUND_POINT_COUNT] {
    let w = width as i32;
    let h = height as i32;
    let mid_x = w / 2;
    let mid_y = h / 2 - 1;

    [
        Point::new(0, 0),
        Point::new(mid_x, 0),
        Point::new(w - 1, 0),
        Point::new(0, mid_y),
        Point::new(w - 1, mid_y),
        Point::new(0, h - 1),
        Point::new(mid_x, h - 1),
        Point::new(w - 1, h - 1),
    ]
}
