//! Text recognition seam.
//!
//! The extractor only deals with geometry; turning pixels into text is
//! delegated to a [`Recognizer`]. The production implementation wraps `ocr-rs`
//! (Rust PaddleOCR bindings). OCR engines are sensitive to input quality, so
//! crops are upscaled and binarized a few different ways before recognition and
//! the most plausible result is kept.

use std::path::Path;

use anyhow::Context;

use crate::{FieldKind, Image, OwnedImage};

/// Crops shorter than this are upscaled; OCR does better on larger glyphs.
const MIN_H: u32 = 80;

pub trait Recognizer: Send + Sync {
	/// Recognize the text in `image`. `kind` tells which field the crop is,
	/// so implementations can bias towards digits for tiers and prices.
	fn recognize(&self, image: Image, kind: FieldKind) -> anyhow::Result<String>;
}

/// Recognizer that never reads pixels.
///
/// Used when no OCR models are available: calibrated template labels still
/// name the item and mark the tier, prices just stay unread.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelRecognizer;

impl Recognizer for LabelRecognizer {
	fn recognize(&self, _image: Image, _kind: FieldKind) -> anyhow::Result<String> {
		Ok(String::new())
	}
}

pub struct OcrRecognizer {
	engine: ocr_rs::OcrEngine,
}

impl OcrRecognizer {
	/// Initialize the OCR engine with the given model paths.
	pub fn try_new(
		detection: impl AsRef<Path>,
		recognition: impl AsRef<Path>,
		charset: impl AsRef<Path>,
	) -> anyhow::Result<Self> {
		let thread_count = std::thread::available_parallelism()
			.map(|n| n.get())
			.unwrap_or(1);

		let engine = ocr_rs::OcrEngine::new(
			detection,
			recognition,
			charset,
			Some(ocr_rs::OcrEngineConfig {
				backend: ocr_rs::Backend::CPU,
				thread_count,
				// Tooltip fonts are small and stylized; High costs CPU but reads them better.
				precision_mode: ocr_rs::PrecisionMode::High,
				enable_parallel: thread_count > 1,
				min_result_confidence: 0.5,
				..Default::default()
			}),
		)
		.context("failed to initialize OCR engine")?;

		Ok(Self { engine })
	}

	fn read(&self, image: Image) -> String {
		let image = ocr_rs::preprocess::rgb_to_image(&image.to_rgb_bytes(), image.width(), image.height());

		match self.engine.recognize(&image) {
			Ok(results) => results
				.into_iter()
				.map(|v| v.text)
				.collect::<Vec<_>>()
				.join(" "),
			Err(err) => {
				tracing::debug!(error = %err, "ocr pass failed");
				String::new()
			}
		}
	}
}

impl Recognizer for OcrRecognizer {
	fn recognize(&self, image: Image, kind: FieldKind) -> anyhow::Result<String> {
		use imageproc::contrast::{ThresholdType, adaptive_threshold, equalize_histogram, otsu_level, threshold};

		if image.width() == 0 || image.height() == 0 {
			return Ok(String::new());
		}

		let mut base = image.to_owned_image();
		if base.height() < MIN_H {
			base = base.resized_h(MIN_H)?;
		}
		let gray = equalize_histogram(&base.to_gray_image());

		// Adaptive threshold copes with gradients behind the text; Otsu with flat plates.
		let adaptive = OwnedImage::from_gray_as_rgb(&ensure_dark_text_on_light(adaptive_threshold(&gray, 7, 10)));
		let otsu = {
			let level = otsu_level(&gray);
			OwnedImage::from_gray_as_rgb(&ensure_dark_text_on_light(threshold(&gray, level, ThresholdType::Binary)))
		};

		let mut best = String::new();
		let mut best_score = i64::MIN;
		for candidate in [adaptive, otsu, base] {
			let text = self.read(candidate.as_image());
			let score = score_text(&text, kind);
			if score > best_score {
				best_score = score;
				best = text;
			}
		}

		if std::env::var("PRICER_WRITE_IMAGE").as_deref() == Ok("1") {
			let name = best.chars().filter(|c| c.is_ascii_alphanumeric()).take(40).collect::<String>();
			if let Err(err) = image.save_png(format!("./debug_ocr_{kind:?}_{name}.png")) {
				tracing::debug!(error = %err, "failed to write ocr debug image");
			}
		}

		Ok(best)
	}
}

/// Invert mostly-black binarized crops so the background ends up light.
fn ensure_dark_text_on_light(mut bin: image::GrayImage) -> image::GrayImage {
	let black = bin.pixels().filter(|p| p.0[0] == 0).count();
	if black * 2 > (bin.width() * bin.height()) as usize {
		for p in bin.pixels_mut() {
			p.0[0] = 255 - p.0[0];
		}
	}
	bin
}

/// Plausibility of a recognition result: alphanumerics beat noise, and
/// digits count double in numeric fields.
fn score_text(text: &str, kind: FieldKind) -> i64 {
	let numeric = matches!(kind, FieldKind::LpTier | FieldKind::PriceLine);
	let mut score = 0i64;
	for ch in text.chars() {
		score += match ch {
			c if c.is_ascii_digit() && numeric => 6,
			c if c.is_alphanumeric() => 3,
			c if c.is_whitespace() => 0,
			_ => 1,
		};
	}
	score + text.len() as i64
}
