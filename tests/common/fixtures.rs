use serde_json::{json, Value};

use gaze_backend::gaze::types::{FrameInput, LandmarkSet, Point};

pub const FRAME_WIDTH: f64 = 640.0;
pub const FRAME_HEIGHT: f64 = 480.0;

const MESH_LEN: usize = 478;
const LEFT_CONTOUR: [usize; 6] = [362, 385, 387, 263, 373, 380];
const RIGHT_CONTOUR: [usize; 6] = [33, 160, 158, 133, 153, 144];
const LEFT_IRIS: usize = 468;
const RIGHT_IRIS: usize = 473;
const LEFT_IRIS_RING: [usize; 4] = [469, 470, 471, 472];
const RIGHT_IRIS_RING: [usize; 4] = [474, 475, 476, 477];

/// Synthetic face mesh with both irises centered on `(gx, gy)`.
///
/// At 640x480 each eye's aspect ratio is `0.75 * openness`, so 0.6 is a
/// comfortably open eye and 0.2 falls under the default blink threshold.
pub fn landmarks(gx: f64, gy: f64, openness: f64) -> LandmarkSet {
    let mut points = vec![Point::new(0.5, 0.5); MESH_LEN];
    let eyes = [
        (LEFT_CONTOUR, LEFT_IRIS, LEFT_IRIS_RING, gx + 0.02),
        (RIGHT_CONTOUR, RIGHT_IRIS, RIGHT_IRIS_RING, gx - 0.02),
    ];
    for (contour, iris, ring, cx) in eyes {
        let half_w = 0.01;
        let lid = openness * half_w;
        points[contour[0]] = Point::new(cx - half_w, gy);
        points[contour[1]] = Point::new(cx - half_w / 2.0, gy - lid);
        points[contour[2]] = Point::new(cx + half_w / 2.0, gy - lid);
        points[contour[3]] = Point::new(cx + half_w, gy);
        points[contour[4]] = Point::new(cx + half_w / 2.0, gy + lid);
        points[contour[5]] = Point::new(cx - half_w / 2.0, gy + lid);
        points[iris] = Point::new(cx, gy);
        for (i, &b) in ring.iter().enumerate() {
            let angle = i as f64 * std::f64::consts::FRAC_PI_2;
            points[b] = Point::new(cx + 0.003 * angle.cos(), gy + 0.003 * angle.sin());
        }
    }
    LandmarkSet::new(points)
}

pub fn frame_input(gx: f64, gy: f64, openness: f64) -> FrameInput {
    FrameInput {
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        landmarks: Some(landmarks(gx, gy, openness).into()),
        captured_at_ms: None,
    }
}

pub fn no_face_input() -> FrameInput {
    FrameInput {
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
        landmarks: None,
        captured_at_ms: None,
    }
}

pub fn frame_body(gx: f64, gy: f64) -> Value {
    serde_json::to_value(frame_input(gx, gy, 0.6)).expect("serialize frame input")
}

pub fn no_face_body() -> Value {
    json!({ "width": FRAME_WIDTH, "height": FRAME_HEIGHT, "landmarks": null })
}

/// Stored-record shaped JSON for explicit report requests.
pub fn record_json(gaze: Option<(f64, f64)>, eye_count: u8) -> Value {
    json!({
        "timestamp": "2024-01-01T10:00:00Z",
        "gazeX": gaze.map(|g| g.0),
        "gazeY": gaze.map(|g| g.1),
        "earValue": if eye_count > 0 { Some(0.3) } else { None },
        "eyeCount": eye_count,
    })
}
