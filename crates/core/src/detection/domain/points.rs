/// A 2-D image coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Points describing one face. By convention the first two points are the
/// top-left and bottom-right corners of its bounding box; any further
/// points are landmarks.
pub type FacePoints = Vec<Point2>;

/// One entry per detected face.
pub type PointsList = Vec<FacePoints>;

/// Axis-aligned box spanned by two corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point2,
    pub max: Point2,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            min: Point2::new(x1.min(x2), y1.min(y2)),
            max: Point2::new(x1.max(x2), y1.max(y2)),
        }
    }

    /// The box carried in the first two points of a face, if present.
    pub fn of_face(points: &[Point2]) -> Option<Self> {
        match points {
            [a, b, ..] => Some(Self::new(a.x, a.y, b.x, b.y)),
            _ => None,
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.max.x.min(other.max.x) - self.min.x.max(other.min.x)).max(0.0);
        let iy = (self.max.y.min(other.max.y) - self.min.y.max(other.min.y)).max(0.0);
        let inter = ix * iy;
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    pub fn corners(&self) -> [Point2; 2] {
        [self.min, self.max]
    }

    /// Face points for this box followed by `landmarks`.
    pub fn with_landmarks(&self, landmarks: impl IntoIterator<Item = Point2>) -> FacePoints {
        self.corners().into_iter().chain(landmarks).collect()
    }
}

/// Bounding boxes of every face that carries one.
pub fn face_boxes(faces: &PointsList) -> Vec<BoundingBox> {
    faces.iter().filter_map(|f| BoundingBox::of_face(f)).collect()
}
