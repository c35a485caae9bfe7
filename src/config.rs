//! Configuration for the reveal pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. One struct holds every knob so it can be
//! cloned into spawned OCR workers and logged as a unit.

use crate::error::RevealError;
use std::path::{Path, PathBuf};

/// Scale factor applied to every rendered page (PDF points → pixels).
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;

/// Upload size cap in bytes (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration for the rasterize → transform → extract pipeline.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_reveal::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .data_dir("/var/lib/pdfreveal")
///     .ocr_language("eng+deu")
///     .build()
///     .unwrap();
/// assert_eq!(config.render_scale, 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Render scale for both transforms. Default: 2.0.
    ///
    /// Pixel reveal and OCR must see the same resolution, so this is a single
    /// value rather than one per transform.
    pub render_scale: f32,

    /// Directory under which per-document result directories are created.
    pub results_root: PathBuf,

    /// Directory under which uploaded PDFs are stored, one folder per owner.
    pub uploads_root: PathBuf,

    /// Prefix used for the public (served) form of result paths. Default: "/results".
    pub public_prefix: String,

    /// Tesseract language code(s). Default: "eng".
    pub ocr_language: String,

    /// Tesseract executable. Default: "tesseract" (looked up on `PATH`).
    pub tesseract_path: PathBuf,

    /// Explicit pdfium library file or directory. `None` tries `./` and then
    /// the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Pages revealed concurrently in pixel mode. Default: 1 (sequential).
    ///
    /// Output order is 1..N regardless of this value.
    pub pixel_concurrency: usize,

    /// Capacity of the OCR event channel. Default: 16.
    pub event_buffer: usize,

    /// Largest accepted upload in bytes. Default: 10 MiB.
    pub max_upload_bytes: u64,

    /// Documents kept per owner before the oldest is evicted. Default: 5.
    pub max_documents_per_owner: usize,

    /// Download timeout for URL ingest in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_scale: DEFAULT_RENDER_SCALE,
            results_root: PathBuf::from("data/results"),
            uploads_root: PathBuf::from("data/uploads"),
            public_prefix: "/results".to_string(),
            ocr_language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            pdfium_library: None,
            pixel_concurrency: 1,
            event_buffer: 16,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_documents_per_owner: 5,
            download_timeout_secs: 120,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Root both `uploads/` and `results/` under one data directory.
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.config.results_root = dir.join("results");
        self.config.uploads_root = dir.join("uploads");
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn results_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.results_root = dir.into();
        self
    }

    pub fn uploads_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.uploads_root = dir.into();
        self
    }

    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.config.public_prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn pixel_concurrency(mut self, n: usize) -> Self {
        self.config.pixel_concurrency = n.max(1);
        self
    }

    pub fn event_buffer(mut self, n: usize) -> Self {
        self.config.event_buffer = n.max(1);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn max_documents_per_owner(mut self, n: usize) -> Self {
        self.config.max_documents_per_owner = n.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, RevealError> {
        let c = &self.config;
        if !(c.render_scale > 0.0 && c.render_scale <= 8.0) {
            return Err(RevealError::InvalidConfig(format!(
                "render scale must be in (0, 8], got {}",
                c.render_scale
            )));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(RevealError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(RevealError::InvalidConfig(
                "upload limit must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_reference_behaviour() {
        let c = PipelineConfig::default();
        assert_eq!(c.render_scale, 2.0);
        assert_eq!(c.pixel_concurrency, 1);
        assert_eq!(c.max_documents_per_owner, 5);
        assert_eq!(c.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(c.public_prefix, "/results");
    }

    #[test]
    fn data_dir_roots_both_trees() {
        let c = PipelineConfig::builder().data_dir("/srv/x").build().unwrap();
        assert_eq!(c.results_root, PathBuf::from("/srv/x/results"));
        assert_eq!(c.uploads_root, PathBuf::from("/srv/x/uploads"));
    }

    #[test]
    fn invalid_scale_rejected() {
        let err = PipelineConfig::builder().render_scale(0.0).build();
        assert!(matches!(err, Err(RevealError::InvalidConfig(_))));
        let err = PipelineConfig::builder().render_scale(f32::NAN).build();
        assert!(matches!(err, Err(RevealError::InvalidConfig(_))));
    }

    #[test]
    fn setters_clamp() {
        let c = PipelineConfig::builder()
            .pixel_concurrency(0)
            .event_buffer(0)
            .public_prefix("/static/results/")
            .build()
            .unwrap();
        assert_eq!(c.pixel_concurrency, 1);
        assert_eq!(c.event_buffer, 1);
        assert_eq!(c.public_prefix, "/static/results");
    }
}
