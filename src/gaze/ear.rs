//! Eye-geometry extraction from face-mesh landmarks.
//!
//! Each eye uses six contour points in canonical order: outer corner, two upper
//! lid points, inner corner, two lower lid points. With that order
//! `EAR = (|p1-p5| + |p2-p4|) / (2 * |p0-p3|)`.

use crate::gaze::types::{EyeFeatures, FrameFeatures, LandmarkSet, Point};
use crate::gaze::GazeError;

/// Horizontal eye width (pixels) below which the geometry is treated as degenerate.
const MIN_EYE_WIDTH_PX: f64 = 1e-6;

/// Face-mesh indices for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeLayout {
    pub contour: [usize; 6],
    pub iris_center: usize,
    pub iris_boundary: [usize; 4],
}

/// Index layout of the refined 478-point face mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkLayout {
    pub left: EyeLayout,
    pub right: EyeLayout,
}

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self {
            left: EyeLayout {
                contour: [362, 385, 387, 263, 373, 380],
                iris_center: 468,
                iris_boundary: [469, 470, 471, 472],
            },
            right: EyeLayout {
                contour: [33, 160, 158, 133, 153, 144],
                iris_center: 473,
                iris_boundary: [474, 475, 476, 477],
            },
        }
    }
}

impl LandmarkLayout {
    /// Smallest landmark count that covers every index in the layout.
    pub fn required_len(&self) -> usize {
        [self.left, self.right]
            .iter()
            .flat_map(|eye| {
                eye.contour
                    .iter()
                    .chain(eye.iris_boundary.iter())
                    .chain(std::iter::once(&eye.iris_center))
                    .copied()
            })
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// EAR for six contour points in canonical order. Degenerate geometry
/// (zero eye width) yields `0.0`, which downstream treats as "eye not usable".
pub fn eye_aspect_ratio(points: &[Point; 6]) -> f64 {
    let horizontal = points[0].distance(&points[3]);
    if horizontal < MIN_EYE_WIDTH_PX {
        return 0.0;
    }
    let vertical1 = points[1].distance(&points[5]);
    let vertical2 = points[2].distance(&points[4]);
    (vertical1 + vertical2) / (2.0 * horizontal)
}

/// Stateless converter from one frame's landmarks to per-eye measurements.
#[derive(Debug, Clone, Default)]
pub struct LandmarkFeatureExtractor {
    layout: LandmarkLayout,
}

impl LandmarkFeatureExtractor {
    pub fn new(layout: LandmarkLayout) -> Self {
        Self { layout }
    }

    pub fn extract(
        &self,
        landmarks: &LandmarkSet,
        width: f64,
        height: f64,
    ) -> Result<FrameFeatures, GazeError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(GazeError::InvalidFrame(format!(
                "frame dimensions must be positive, got {width}x{height}"
            )));
        }
        let required = self.layout.required_len();
        if landmarks.len() < required {
            return Err(GazeError::InvalidFrame(format!(
                "expected at least {required} landmarks, got {}",
                landmarks.len()
            )));
        }

        Ok(FrameFeatures {
            left: self.eye(landmarks, &self.layout.left, width, height)?,
            right: self.eye(landmarks, &self.layout.right, width, height)?,
            frame_width: width,
            frame_height: height,
        })
    }

    fn eye(
        &self,
        landmarks: &LandmarkSet,
        layout: &EyeLayout,
        width: f64,
        height: f64,
    ) -> Result<EyeFeatures, GazeError> {
        let pixel = |index: usize| -> Result<Point, GazeError> {
            let point = landmarks
                .get(index)
                .ok_or_else(|| GazeError::InvalidFrame(format!("landmark {index} missing")))?;
            if !point.is_finite() {
                return Err(GazeError::InvalidFrame(format!(
                    "landmark {index} is not finite"
                )));
            }
            Ok(point.scaled(width, height))
        };

        let mut contour = [Point::default(); 6];
        for (slot, &index) in contour.iter_mut().zip(layout.contour.iter()) {
            *slot = pixel(index)?;
        }

        let iris_center = pixel(layout.iris_center)?;
        let mut radius_sum = 0.0;
        for &index in &layout.iris_boundary {
            radius_sum += pixel(index)?.distance(&iris_center);
        }

        Ok(EyeFeatures {
            ear: eye_aspect_ratio(&contour),
            iris_center,
            iris_radius: radius_sum / layout.iris_boundary.len() as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ellipse_eye(openness: f64) -> [Point; 6] {
        let v = openness * (60.0_f64).to_radians().sin();
        [
            Point::new(-1.0, 0.0),
            Point::new(-0.5, v),
            Point::new(0.5, v),
            Point::new(1.0, 0.0),
            Point::new(0.5, -v),
            Point::new(-0.5, -v),
        ]
    }

    #[test]
    fn closed_eye_has_zero_ear() {
        let mut eye = ellipse_eye(0.35);
        eye[5] = eye[1];
        eye[4] = eye[2];
        assert!(eye_aspect_ratio(&eye).abs() < 1e-12);
    }

    #[test]
    fn open_eye_ear_is_in_plausible_band() {
        let ear = eye_aspect_ratio(&ellipse_eye(0.35));
        assert!((0.2..=0.4).contains(&ear), "ear = {ear}");
    }

    #[test]
    fn degenerate_width_yields_zero() {
        let p = Point::new(3.0, 3.0);
        assert_eq!(eye_aspect_ratio(&[p; 6]), 0.0);
    }

    #[test]
    fn default_layout_needs_refined_mesh() {
        assert_eq!(LandmarkLayout::default().required_len(), 478);
    }

    #[test]
    fn short_landmark_set_is_rejected() {
        let extractor = LandmarkFeatureExtractor::default();
        let set = LandmarkSet::new(vec![Point::new(0.5, 0.5); 10]);
        let err = extractor.extract(&set, 640.0, 480.0).unwrap_err();
        assert!(matches!(err, GazeError::InvalidFrame(_)));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let extractor = LandmarkFeatureExtractor::default();
        let set = LandmarkSet::new(vec![Point::new(0.5, 0.5); 478]);
        assert!(extractor.extract(&set, 0.0, 480.0).is_err());
    }

    #[test]
    fn iris_geometry_is_scaled_to_pixels() {
        let layout = LandmarkLayout::default();
        let mut points = vec![Point::new(0.5, 0.5); 478];
        points[layout.left.iris_center] = Point::new(0.25, 0.5);
        points[469] = Point::new(0.26, 0.5);
        points[470] = Point::new(0.24, 0.5);
        points[471] = Point::new(0.25, 0.51);
        points[472] = Point::new(0.25, 0.49);

        let features = LandmarkFeatureExtractor::new(layout)
            .extract(&LandmarkSet::new(points), 100.0, 100.0)
            .unwrap();
        assert_eq!(features.left.iris_center, Point::new(25.0, 50.0));
        assert!((features.left.iris_radius - 1.0).abs() < 1e-9);
        // every contour point coincides, so the width is degenerate
        assert_eq!(features.left.ear, 0.0);
    }
}
