// src/domain/format/mime.rs
//
// Normalized MIME formats.
//
// Two formats are the same format exactly when their normalized strings are
// equal. Normalization lowercases, drops parameters and folds known aliases.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{DomainError, DomainResult};

/// A normalized `type/subtype` MIME value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MimeFormat(String);

/// Alias → canonical name
const ALIASES: &[(&str, &str)] = &[
    ("image/jpg", "image/jpeg"),
    ("image/pjpeg", "image/jpeg"),
    ("image/x-png", "image/png"),
    ("image/x-ms-bmp", "image/bmp"),
    ("image/x-bmp", "image/bmp"),
    ("image/tif", "image/tiff"),
    ("video/x-quicktime", "video/quicktime"),
];

/// Extension ↔ canonical MIME. The first extension listed for a MIME is the
/// one used when naming cache files.
const EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("avif", "image/avif"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("m4v", "video/x-m4v"),
];

impl MimeFormat {
    pub const JPEG: &'static str = "image/jpeg";
    pub const PNG: &'static str = "image/png";
    pub const HEIC: &'static str = "image/heic";
    pub const MP4: &'static str = "video/mp4";

    /// Parse and normalize a MIME string
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let essence = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

        let (kind, subtype) = essence.split_once('/').ok_or_else(|| {
            DomainError::InvariantViolation(format!("MIME format must be type/subtype: {:?}", raw))
        })?;

        let well_formed = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
        };
        if !well_formed(kind) || !well_formed(subtype) {
            return Err(DomainError::InvariantViolation(format!(
                "Malformed MIME format: {:?}",
                raw
            )));
        }

        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == essence)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(essence);

        Ok(Self(canonical))
    }

    pub fn jpeg() -> Self {
        Self(Self::JPEG.to_string())
    }

    pub fn png() -> Self {
        Self(Self::PNG.to_string())
    }

    pub fn heic() -> Self {
        Self(Self::HEIC.to_string())
    }

    pub fn mp4() -> Self {
        Self(Self::MP4.to_string())
    }

    /// Opaque bytes of unknown encoding
    pub fn octet_stream() -> Self {
        Self("application/octet-stream".to_string())
    }

    /// Infer a format from a file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, mime)| Self(mime.to_string()))
    }

    /// Infer a format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Preferred file extension, `bin` when unknown
    pub fn extension(&self) -> &'static str {
        EXTENSIONS
            .iter()
            .find(|(_, mime)| *mime == self.0)
            .map(|(ext, _)| *ext)
            .unwrap_or("bin")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_image(&self) -> bool {
        self.0.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.0.starts_with("video/")
    }
}

impl std::fmt::Display for MimeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for MimeFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MimeFormat {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MimeFormat> for String {
    fn from(value: MimeFormat) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case_and_parameters() {
        let format = MimeFormat::parse("  Image/JPEG; q=0.9 ").unwrap();
        assert_eq!(format.as_str(), "image/jpeg");
    }

    #[test]
    fn test_aliases_fold_to_canonical() {
        assert_eq!(MimeFormat::parse("image/jpg").unwrap(), MimeFormat::jpeg());
        assert_eq!(MimeFormat::parse("image/pjpeg").unwrap(), MimeFormat::jpeg());
        assert_eq!(MimeFormat::parse("image/x-png").unwrap(), MimeFormat::png());
    }

    #[test]
    fn test_heic_and_heif_stay_distinct() {
        assert_ne!(
            MimeFormat::parse("image/heic").unwrap(),
            MimeFormat::parse("image/heif").unwrap()
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(MimeFormat::parse("jpeg").is_err());
        assert!(MimeFormat::parse("image/").is_err());
        assert!(MimeFormat::parse("/png").is_err());
        assert!(MimeFormat::parse("image/pn g").is_err());
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(MimeFormat::from_extension("JPG"), Some(MimeFormat::jpeg()));
        assert_eq!(
            MimeFormat::from_path(Path::new("/a/b/clip.MOV")).unwrap().as_str(),
            "video/quicktime"
        );
        assert_eq!(MimeFormat::jpeg().extension(), "jpg");
        assert_eq!(MimeFormat::heic().extension(), "heic");
        assert_eq!(MimeFormat::parse("application/x-custom").unwrap().extension(), "bin");
        assert!(MimeFormat::from_extension("txt").is_none());
    }

    #[test]
    fn test_serde_normalizes_on_deserialize() {
        let format: MimeFormat = serde_json::from_str("\"IMAGE/JPG\"").unwrap();
        assert_eq!(format, MimeFormat::jpeg());
        assert_eq!(serde_json::to_string(&format).unwrap(), "\"image/jpeg\"");

        let bad: Result<MimeFormat, _> = serde_json::from_str("\"nonsense\"");
        assert!(bad.is_err());
    }
}
