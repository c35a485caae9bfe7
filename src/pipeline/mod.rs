//! Pipeline stages for revealing hidden PDF text.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested alone and swapped (another OCR engine, another renderer) without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!                       ┌──▶ reveal ──▶ PNG      (pixel mode)
//! input ──▶ raster ─────┼──▶ ocr    ──▶ text     (OCR mode)
//! (path/URL) (pdfium)   └──▶ encode ──▶ PNG      (originals)
//!
//! stored PNGs ──▶ export ──▶ PDF
//! ```
//!
//! 1. [`input`]:  validate an uploaded path or URL (name, size, `%PDF` magic)
//! 2. [`raster`]: decode and rasterise pages at a fixed scale onto white; runs
//!    in `spawn_blocking` because pdfium is not async-safe
//! 3. [`reveal`]: negate, normalise and sharpen a page to expose low-contrast
//!    text
//! 4. [`ocr`]:    recognise page text and confidence via tesseract
//! 5. [`encode`]: lossless PNG encoding of page buffers
//! 6. [`export`]: assemble stored page images back into a PDF

pub mod encode;
pub mod export;
pub mod input;
pub mod ocr;
pub mod raster;
pub mod reveal;
