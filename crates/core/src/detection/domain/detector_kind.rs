use std::fmt;

/// The closed set of detectors a stage can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    Haar,
    Hog,
    ResnetCaffe,
    YoloResnet18,
    YoloEffnetB0,
    MediaPipe,
    Dlib68,
    Empty,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 8] = [
        DetectorKind::Haar,
        DetectorKind::Hog,
        DetectorKind::ResnetCaffe,
        DetectorKind::YoloResnet18,
        DetectorKind::YoloEffnetB0,
        DetectorKind::MediaPipe,
        DetectorKind::Dlib68,
        DetectorKind::Empty,
    ];

    /// Configuration key, as accepted on the command line.
    pub fn key(self) -> &'static str {
        match self {
            DetectorKind::Haar => "haar",
            DetectorKind::Hog => "hog",
            DetectorKind::ResnetCaffe => "resnetCaffe",
            DetectorKind::YoloResnet18 => "yoloResnet18",
            DetectorKind::YoloEffnetB0 => "yoloEffnetb0",
            DetectorKind::MediaPipe => "mediapipe",
            DetectorKind::Dlib68 => "dlib_68",
            DetectorKind::Empty => "empty",
        }
    }

    /// Resolves a configuration key; unknown keys fall back to `Empty`.
    pub fn from_key(key: &str) -> Self {
        match Self::ALL.into_iter().find(|k| k.key() == key) {
            Some(kind) => kind,
            None => {
                log::warn!("Unknown detector '{key}', using the empty detector");
                DetectorKind::Empty
            }
        }
    }

    /// Whether this detector refines face boxes into landmarks.
    pub fn is_landmark_detector(self) -> bool {
        matches!(self, DetectorKind::Dlib68)
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::haar("haar", DetectorKind::Haar)]
    #[case::hog("hog", DetectorKind::Hog)]
    #[case::resnet("resnetCaffe", DetectorKind::ResnetCaffe)]
    #[case::yolo_resnet("yoloResnet18", DetectorKind::YoloResnet18)]
    #[case::yolo_effnet("yoloEffnetb0", DetectorKind::YoloEffnetB0)]
    #[case::mediapipe("mediapipe", DetectorKind::MediaPipe)]
    #[case::dlib("dlib_68", DetectorKind::Dlib68)]
    #[case::empty("empty", DetectorKind::Empty)]
    fn test_from_key(#[case] key: &str, #[case] expected: DetectorKind) {
        assert_eq!(DetectorKind::from_key(key), expected);
        assert_eq!(expected.to_string(), key);
    }

    #[rstest]
    #[case::unknown("retinaface")]
    #[case::wrong_case("MediaPipe")]
    #[case::blank("")]
    fn test_unknown_key_falls_back_to_empty(#[case] key: &str) {
        assert_eq!(DetectorKind::from_key(key), DetectorKind::Empty);
    }

    #[test]
    fn test_only_dlib_is_landmark_detector() {
        let landmark: Vec<_> = DetectorKind::ALL
            .into_iter()
            .filter(|k| k.is_landmark_detector())
            .collect();
        assert_eq!(landmark, vec![DetectorKind::Dlib68]);
    }
}
