//! OCR extraction: rendered page → text + confidence.
//!
//! The default engine is the Tesseract command-line tool. Tesseract reads its
//! input from a file, so the page is staged as a PNG in a
//! [`tempfile::NamedTempFile`]; the file is removed when the handle drops,
//! on success, error and panic alike.
//!
//! Output is requested in TSV form so a single invocation yields both the
//! words (to rebuild the text) and their per-word confidences. The page
//! confidence is the mean over recognised words, matching what Tesseract's
//! own API reports as the page's mean text confidence.

use crate::error::ExtractError;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use image::RgbaImage;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

/// Text recognised on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrText {
    pub text: String,
    /// Aggregate confidence, always within 0..=100.
    pub confidence: f32,
}

impl OcrText {
    /// Build a result, clamping the engine's confidence into 0..=100.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// An optical character recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract(&self, page: &RgbaImage) -> Result<OcrText, ExtractError>;
}

/// [`OcrEngine`] that shells out to the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn extract(&self, page: &RgbaImage) -> Result<OcrText, ExtractError> {
        let page = page.clone();
        let staged = tokio::task::spawn_blocking(move || stage_png(&page))
            .await
            .map_err(|e| ExtractError::Failed(format!("staging task panicked: {}", e)))??;

        let output = Command::new(&self.binary)
            .arg(staged.path())
            .arg("stdout")
            .args(["-l", &self.language])
            .arg("tsv")
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractError::Unavailable(format!(
                    "'{}' not found (install tesseract-ocr)",
                    self.binary.display()
                )))
            }
            Err(e) => return Err(ExtractError::Io(e)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let result = parse_tsv(&tsv);
        debug!(
            "tesseract: {} chars, confidence {:.1}",
            result.text.len(),
            result.confidence
        );
        Ok(result)
    }
}

/// Encode `page` and write it to a fresh temp file for tesseract to read.
fn stage_png(page: &RgbaImage) -> Result<NamedTempFile, ExtractError> {
    let png = encode_png(page).map_err(|e| ExtractError::Failed(e.to_string()))?;
    let mut staged = tempfile::Builder::new()
        .prefix("pdfreveal-ocr-")
        .suffix(".png")
        .tempfile()?;
    staged.write_all(&png)?;
    staged.flush()?;
    Ok(staged)
}

/// Rebuild page text and mean word confidence from Tesseract TSV output.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text. Only word rows (level 5) with a
/// non-negative confidence and non-blank text count. Words on one line are
/// joined by spaces, lines by `\n`, and paragraphs/blocks by a blank line.
pub fn parse_tsv(tsv: &str) -> OcrText {
    let mut text = String::new();
    let mut conf_sum = 0.0f64;
    let mut words = 0usize;
    let mut last_line: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.splitn(12, '\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        let conf: f64 = match cols[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        if word.is_empty() || conf < 0.0 {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let line = (num(2), num(3), num(4));

        match last_line {
            None => {}
            Some(prev) if prev == line => text.push(' '),
            Some((block, par, _)) if (block, par) == (line.0, line.1) => text.push('\n'),
            Some(_) => text.push_str("\n\n"),
        }
        text.push_str(word);
        last_line = Some(line);

        conf_sum += conf;
        words += 1;
    }

    if !text.is_empty() {
        text.push('\n');
    }
    let confidence = if words == 0 {
        0.0
    } else {
        (conf_sum / words as f64) as f32
    };
    OcrText::new(text, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(block: u32, par: u32, line: u32, word: u32, conf: &str, text: &str) -> String {
        format!("5\t1\t{block}\t{par}\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn rebuilds_lines_and_paragraphs() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t".to_string(),
            row(1, 1, 1, 1, "90", "Hidden"),
            row(1, 1, 1, 2, "80", "clause"),
            row(1, 1, 2, 1, "70", "here"),
            row(2, 1, 1, 1, "60", "Footer"),
        ]
        .join("\n");
        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "Hidden clause\nhere\n\nFooter\n");
        assert!((out.confidence - 75.0).abs() < 1e-4);
    }

    #[test]
    fn skips_blank_and_unrecognised_words() {
        let tsv = [
            HEADER.to_string(),
            row(1, 1, 1, 1, "-1", ""),
            row(1, 1, 1, 2, "95.5", "ok"),
            row(1, 1, 1, 3, "40", "   "),
        ]
        .join("\n");
        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "ok\n");
        assert!((out.confidence - 95.5).abs() < 1e-4);
    }

    #[test]
    fn empty_page_has_zero_confidence() {
        let out = parse_tsv(HEADER);
        assert_eq!(out.text, "");
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(OcrText::new("", 140.0).confidence, 100.0);
        assert_eq!(OcrText::new("", -3.0).confidence, 0.0);
        assert_eq!(OcrText::new("", f32::NAN).confidence, 0.0);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let engine = TesseractEngine::new("/definitely/not/tesseract", "eng");
        let page = RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
        let err = engine.extract(&page).await.unwrap_err();
        assert!(matches!(err, ExtractError::Unavailable(_)), "got {err:?}");
    }

    #[test]
    fn staged_page_is_a_readable_png() {
        let page = RgbaImage::from_pixel(7, 3, image::Rgba([10, 20, 30, 255]));
        let staged = stage_png(&page).unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded, page);

        drop(staged);
        assert!(!path.exists(), "temp page must be removed on drop");
    }
}
