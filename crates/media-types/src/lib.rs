//! Shared media classification types.
//!
//! Media is classified purely by file extension. Only the extensions listed
//! in [`VIDEO_EXTENSIONS`] and [`IMAGE_EXTENSIONS`] are considered supported.

use std::path::Path;

/// Extensions treated as video input.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];

/// Extensions treated as still-image input.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Kind of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a file name by its extension (case-insensitive).
    ///
    /// Returns `None` for unsupported or missing extensions.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    /// Classify a bare, lowercase extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of media kinds an operation is willing to take as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedKinds {
    image: bool,
    video: bool,
}

impl AcceptedKinds {
    pub const ANY: Self = Self {
        image: true,
        video: true,
    };
    pub const VIDEO: Self = Self {
        image: false,
        video: true,
    };
    pub const IMAGE: Self = Self {
        image: true,
        video: false,
    };

    #[inline]
    pub fn accepts(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => self.image,
            MediaKind::Video => self.video,
        }
    }

    /// Human-readable description used in rejection messages.
    pub fn describe(&self) -> &'static str {
        match (self.image, self.video) {
            (true, true) => "an image or video",
            (false, true) => "a video",
            (true, false) => "an image",
            (false, false) => "nothing",
        }
    }
}

/// Container extension of a produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Mp4,
    Png,
    Gif,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(MediaKind::from_file_name("clip.mp4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_file_name("CLIP.WEBM"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_file_name("cat.jpeg"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_file_name("notes.txt"), None);
        assert_eq!(MediaKind::from_file_name("no_extension"), None);
    }

    #[test]
    fn test_accepted_kinds() {
        assert!(AcceptedKinds::ANY.accepts(MediaKind::Image));
        assert!(AcceptedKinds::ANY.accepts(MediaKind::Video));
        assert!(!AcceptedKinds::VIDEO.accepts(MediaKind::Image));
        assert!(!AcceptedKinds::IMAGE.accepts(MediaKind::Video));
        assert_eq!(AcceptedKinds::VIDEO.describe(), "a video");
    }

    #[test]
    fn test_output_extension() {
        assert_eq!(OutputFormat::Gif.extension(), "gif");
        assert_eq!(MediaKind::Video.to_string(), "video");
    }
}
