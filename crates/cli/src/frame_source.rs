use std::path::{Path, PathBuf};

use image::RgbImage;

use facetrack_core::shared::constants::IMAGE_EXTENSIONS;
use facetrack_core::shared::frame::Frame;

/// Endless stream of RGB frames standing in for a live camera.
///
/// An image file repeats forever; a directory cycles through its images in
/// name order. Without a path, blank frames of a fixed size are produced.
/// Images are decoded on first use and kept in memory afterwards.
pub struct FrameSource {
    kind: SourceKind,
    next_index: usize,
}

enum SourceKind {
    Images {
        paths: Vec<PathBuf>,
        decoded: Vec<Option<RgbImage>>,
    },
    Blank {
        width: u32,
        height: u32,
    },
}

impl FrameSource {
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let paths = if path.is_dir() {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            paths.sort();
            paths
        } else if is_image(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(format!("{} is not a supported image", path.display()).into());
        };

        if paths.is_empty() {
            return Err(format!("no images found in {}", path.display()).into());
        }
        log::info!("Frame source: {} image(s) from {}", paths.len(), path.display());

        let decoded = vec![None; paths.len()];
        Ok(Self {
            kind: SourceKind::Images { paths, decoded },
            next_index: 0,
        })
    }

    pub fn blank(width: u32, height: u32) -> Self {
        log::info!("Frame source: blank {width}x{height} frames");
        Self {
            kind: SourceKind::Blank { width, height },
            next_index: 0,
        }
    }

    /// Distinct images in one cycle; `None` for the blank source.
    pub fn images(&self) -> Option<usize> {
        match &self.kind {
            SourceKind::Images { paths, .. } => Some(paths.len()),
            SourceKind::Blank { .. } => None,
        }
    }

    /// Next frame, numbered from 1 in capture order.
    pub fn next_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let position = self.next_index;
        self.next_index += 1;
        let index = self.next_index;

        match &mut self.kind {
            SourceKind::Blank { width, height } => Ok(Frame::blank(*width, *height, index)),
            SourceKind::Images { paths, decoded } => {
                let slot = position % paths.len();
                if decoded[slot].is_none() {
                    let path = &paths[slot];
                    let img = image::open(path)
                        .map_err(|e| format!("failed to decode {}: {e}", path.display()))?;
                    decoded[slot] = Some(img.to_rgb8());
                }
                match &decoded[slot] {
                    Some(rgb) => Ok(Frame::new(
                        rgb.as_raw().clone(),
                        rgb.width(),
                        rgb.height(),
                        3,
                        index,
                    )),
                    None => Err("image cache out of sync".into()),
                }
            }
        }
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_single_image_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "face.png", 4, 3);
        let mut source = FrameSource::open(&path).unwrap();
        assert_eq!(source.images(), Some(1));

        for expected in 1..=3 {
            let frame = source.next_frame().unwrap();
            assert_eq!(frame.index(), expected);
            assert_eq!((frame.width(), frame.height(), frame.channels()), (4, 3, 3));
            assert_eq!(&frame.data()[..3], &[10, 20, 30]);
        }
    }

    #[test]
    fn test_directory_cycles_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b.png", 2, 2);
        write_png(dir.path(), "a.png", 1, 1);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = FrameSource::open(dir.path()).unwrap();
        assert_eq!(source.images(), Some(2));
        let widths: Vec<u32> = (0..4).map(|_| source.next_frame().unwrap().width()).collect();
        assert_eq!(widths, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FrameSource::open(dir.path()).is_err());
    }

    #[test]
    fn test_non_image_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, "").unwrap();
        assert!(FrameSource::open(&path).is_err());
    }

    #[test]
    fn test_blank_source() {
        let mut source = FrameSource::blank(8, 6);
        assert_eq!(source.images(), None);
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.index(), 1);
        assert_eq!((frame.width(), frame.height()), (8, 6));
    }

    #[test]
    fn test_is_image_ignores_case() {
        assert!(is_image(Path::new("x.JPG")));
        assert!(!is_image(Path::new("x.mov")));
        assert!(!is_image(Path::new("noext")));
    }
}
