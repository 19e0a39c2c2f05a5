use serde::{Deserialize, Serialize};

/// Integer pixel rectangle in original-image coordinates.
///
/// The box is half-open: `right` and `bottom` are exclusive, so a box produced
/// for a `width`×`height` image always satisfies `left < right <= width` and
/// `top < bottom <= height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    /// Build a box from fractional corners, truncating to whole pixels and
    /// clamping to the image bounds. Returns `None` if nothing is left.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> Option<Self> {
        let clamp = |v: f32, max: u32| -> u32 {
            // `as` saturates and maps NaN to 0.
            (v as i64).clamp(0, max as i64) as u32
        };

        let left = clamp(x1, width);
        let top = clamp(y1, height);
        let right = clamp(x2, width);
        let bottom = clamp(y2, height);

        (left < right && top < bottom).then_some(Self { left, top, right, bottom })
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Grow the box by `dx` horizontally and `dy` vertically on each side,
    /// staying inside a `width`×`height` image.
    pub fn expand(&self, dx: u32, dy: u32, width: u32, height: u32) -> Self {
        Self {
            left: self.left.saturating_sub(dx),
            top: self.top.saturating_sub(dy),
            right: self.right.saturating_add(dx).min(width),
            bottom: self.bottom.saturating_add(dy).min(height),
        }
    }

    /// Whether the box lies fully inside a `width`×`height` image.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.left < self.right && self.top < self.bottom && self.right <= width && self.bottom <= height
    }
}

/// A candidate face produced by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector score in [0, 1].
    pub confidence: f32,
}

/// Age range predicted by the age network, in network output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "(0-2)")]
    Age0To2,
    #[serde(rename = "(4-6)")]
    Age4To6,
    #[serde(rename = "(8-12)")]
    Age8To12,
    #[serde(rename = "(15-20)")]
    Age15To20,
    #[serde(rename = "(25-32)")]
    Age25To32,
    #[serde(rename = "(38-43)")]
    Age38To43,
    #[serde(rename = "(48-53)")]
    Age48To53,
    #[serde(rename = "(60-100)")]
    Age60To100,
}

impl AgeBucket {
    pub const ALL: [AgeBucket; 8] = [
        AgeBucket::Age0To2,
        AgeBucket::Age4To6,
        AgeBucket::Age8To12,
        AgeBucket::Age15To20,
        AgeBucket::Age25To32,
        AgeBucket::Age38To43,
        AgeBucket::Age48To53,
        AgeBucket::Age60To100,
    ];

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBucket::Age0To2 => "(0-2)",
            AgeBucket::Age4To6 => "(4-6)",
            AgeBucket::Age8To12 => "(8-12)",
            AgeBucket::Age15To20 => "(15-20)",
            AgeBucket::Age25To32 => "(25-32)",
            AgeBucket::Age38To43 => "(38-43)",
            AgeBucket::Age48To53 => "(48-53)",
            AgeBucket::Age60To100 => "(60-100)",
        }
    }

    /// Inclusive (min, max) age in years.
    pub fn range(&self) -> (u8, u8) {
        match self {
            AgeBucket::Age0To2 => (0, 2),
            AgeBucket::Age4To6 => (4, 6),
            AgeBucket::Age8To12 => (8, 12),
            AgeBucket::Age15To20 => (15, 20),
            AgeBucket::Age25To32 => (25, 32),
            AgeBucket::Age38To43 => (38, 43),
            AgeBucket::Age48To53 => (48, 53),
            AgeBucket::Age60To100 => (60, 100),
        }
    }

    pub fn group(&self) -> AgeGroup {
        AgeGroup::from_min_age(self.range().0)
    }
}

impl std::fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse age category exposed to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    YoungAdult,
    Adult,
    Senior,
}

impl AgeGroup {
    pub fn from_min_age(min_age: u8) -> Self {
        match min_age {
            0..=12 => AgeGroup::Child,
            13..=19 => AgeGroup::Teen,
            20..=34 => AgeGroup::YoungAdult,
            35..=49 => AgeGroup::Adult,
            _ => AgeGroup::Senior,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Child => "child",
            AgeGroup::Teen => "teen",
            AgeGroup::YoungAdult => "young_adult",
            AgeGroup::Adult => "adult",
            AgeGroup::Senior => "senior",
        }
    }
}

/// Gender label, in gender network output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A label together with the probability the classifier assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributePrediction<L> {
    pub label: L,
    pub confidence: f32,
}

/// Age and gender attributes of a single face crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: AttributePrediction<AgeBucket>,
    pub gender: AttributePrediction<Gender>,
}

/// Result of one successful `predict` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub age: AttributePrediction<AgeBucket>,
    pub gender: AttributePrediction<Gender>,
    /// The face the attributes were computed from (after padding).
    pub face: Detection,
}

/// Client-facing JSON shape of a [`Prediction`], shared by the REST API and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionReport {
    pub age: AgeBucket,
    pub age_group: AgeGroup,
    pub gender: Gender,
    pub age_confidence: f32,
    pub gender_confidence: f32,
    pub face: FaceReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceReport {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl From<&Prediction> for PredictionReport {
    fn from(p: &Prediction) -> Self {
        Self {
            age: p.age.label,
            age_group: p.age.label.group(),
            gender: p.gender.label,
            age_confidence: p.age.confidence,
            gender_confidence: p.gender.confidence,
            face: FaceReport {
                bbox: p.face.bbox,
                confidence: p.face.confidence,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_clamps_to_image() {
        let b = BoundingBox::from_corners(-12.7, -3.0, 700.2, 500.9, 640, 480).unwrap();
        assert_eq!(b, BoundingBox { left: 0, top: 0, right: 640, bottom: 480 });
        assert!(b.fits(640, 480));
    }

    #[test]
    fn test_from_corners_truncates() {
        let b = BoundingBox::from_corners(10.9, 20.2, 110.7, 220.99, 640, 480).unwrap();
        assert_eq!(b, BoundingBox { left: 10, top: 20, right: 110, bottom: 220 });
        assert_eq!(b.width(), 100);
        assert_eq!(b.height(), 200);
        assert_eq!(b.area(), 20_000);
    }

    #[test]
    fn test_from_corners_rejects_degenerate() {
        // inverted
        assert!(BoundingBox::from_corners(50.0, 50.0, 40.0, 60.0, 100, 100).is_none());
        // entirely outside
        assert!(BoundingBox::from_corners(120.0, 10.0, 150.0, 40.0, 100, 100).is_none());
        // zero width after truncation
        assert!(BoundingBox::from_corners(10.2, 10.0, 10.8, 40.0, 100, 100).is_none());
        assert!(BoundingBox::from_corners(f32::NAN, 0.0, f32::NAN, 10.0, 100, 100).is_none());
    }

    #[test]
    fn test_expand_stays_in_bounds() {
        let b = BoundingBox { left: 5, top: 30, right: 95, bottom: 70 };
        let e = b.expand(20, 20, 100, 80);
        assert_eq!(e, BoundingBox { left: 0, top: 10, right: 100, bottom: 80 });
        assert!(e.fits(100, 80));
    }

    #[test]
    fn test_age_bucket_order_and_labels() {
        let labels: Vec<_> = AgeBucket::ALL.iter().map(|b| b.label()).collect();
        assert_eq!(
            labels,
            ["(0-2)", "(4-6)", "(8-12)", "(15-20)", "(25-32)", "(38-43)", "(48-53)", "(60-100)"]
        );
        assert_eq!(AgeBucket::from_index(4), Some(AgeBucket::Age25To32));
        assert_eq!(AgeBucket::from_index(8), None);
    }

    #[test]
    fn test_age_group_mapping() {
        assert_eq!(AgeBucket::Age0To2.group(), AgeGroup::Child);
        assert_eq!(AgeBucket::Age8To12.group(), AgeGroup::Child);
        assert_eq!(AgeBucket::Age15To20.group(), AgeGroup::Teen);
        assert_eq!(AgeBucket::Age25To32.group(), AgeGroup::YoungAdult);
        assert_eq!(AgeBucket::Age38To43.group(), AgeGroup::Adult);
        assert_eq!(AgeBucket::Age48To53.group(), AgeGroup::Adult);
        assert_eq!(AgeBucket::Age60To100.group(), AgeGroup::Senior);
    }

    #[test]
    fn test_gender_labels() {
        assert_eq!(Gender::from_index(0), Some(Gender::Male));
        assert_eq!(Gender::from_index(1), Some(Gender::Female));
        assert_eq!(Gender::Female.label(), "Female");
        assert_eq!(Gender::Female.as_str(), "female");
    }

    #[test]
    fn test_prediction_report_json() {
        let prediction = Prediction {
            age: AttributePrediction { label: AgeBucket::Age25To32, confidence: 0.5 },
            gender: AttributePrediction { label: Gender::Female, confidence: 0.75 },
            face: Detection {
                bbox: BoundingBox { left: 10, top: 20, right: 110, bottom: 140 },
                confidence: 0.875,
            },
        };
        let json = serde_json::to_value(PredictionReport::from(&prediction)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "age": "(25-32)",
                "age_group": "young_adult",
                "gender": "Female",
                "age_confidence": 0.5,
                "gender_confidence": 0.75,
                "face": {"left": 10, "top": 20, "right": 110, "bottom": 140, "confidence": 0.875},
            })
        );
    }
}
