use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Environment override for where the `ocr/` model folder lives.
pub const ASSETS_ENV: &str = "PRICER_ASSETS_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrAssets {
	pub detection: PathBuf,
	pub recognition: PathBuf,
	pub charset: PathBuf,
}

impl OcrAssets {
	/// The model files inside `base` (or `base/ocr`), if all of them exist.
	fn find_in(base: &Path, lang_code: &str) -> std::result::Result<Self, PathBuf> {
		// Accept both the app root (containing `ocr/`) and the `ocr/` folder itself.
		let dir = if base.join("detection.mnn").is_file() { base.to_path_buf() } else { base.join("ocr") };
		let assets = Self {
			detection: dir.join("detection.mnn"),
			recognition: dir.join(format!("{lang_code}_recognition.mnn")),
			charset: dir.join(format!("{lang_code}_charset.txt")),
		};
		if assets.detection.is_file() && assets.recognition.is_file() && assets.charset.is_file() {
			Ok(assets)
		} else {
			Err(dir)
		}
	}
}

/// Locate the OCR models: `$PRICER_ASSETS_DIR`, next to the executable, the
/// working directory, and in debug builds the workspace root.
pub fn resolve_ocr_assets(lang_code: &str) -> Result<OcrAssets> {
	let mut candidates = Vec::new();
	if let Some(dir) = std::env::var_os(ASSETS_ENV) {
		candidates.push(PathBuf::from(dir));
	}
	if let Ok(exe) = std::env::current_exe()
		&& let Some(dir) = exe.parent()
	{
		candidates.push(dir.to_path_buf());
	}
	if let Ok(cwd) = std::env::current_dir() {
		candidates.push(cwd);
	}
	#[cfg(debug_assertions)]
	candidates.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".."));

	let mut tried = Vec::new();
	for base in candidates {
		match OcrAssets::find_in(&base, lang_code) {
			Ok(assets) => return Ok(assets),
			Err(dir) => tried.push(dir),
		}
	}

	bail!(
		"OCR model files not found (ocr/detection.mnn, ocr/{lang_code}_recognition.mnn, ocr/{lang_code}_charset.txt).\nSearched in:\n{}\nCopy the 'ocr/' folder next to the executable or set {ASSETS_ENV}.",
		tried
			.into_iter()
			.map(|p| format!("  - {}", p.display()))
			.collect::<Vec<_>>()
			.join("\n")
	)
}
