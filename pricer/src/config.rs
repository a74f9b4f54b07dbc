//! Persistent application settings.
//!
//! Stored as JSON in a platform-appropriate config directory. Runs never read
//! the live settings; they take an immutable snapshot from [`SettingsHandle`]
//! when they start.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureArea;
use crate::dispatch::Action;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	/// Key name bound to each action.
	pub hotkeys: BTreeMap<Action, String>,
	/// Per-role replacements for the calibrated match thresholds.
	pub thresholds: ie::ThresholdOverrides,
	pub overlay: OverlaySettings,
	pub capture: CaptureSettings,
	/// Maximum edit distance when a recognized name has no exact record; 0 disables.
	pub name_match_tolerance: usize,
	/// Defaults to `<data dir>/pricer/prices.json`.
	pub store_path: Option<PathBuf>,
	/// Defaults to `<data dir>/pricer/templates`.
	pub templates_dir: Option<PathBuf>,
	/// Forced UI locale (e.g. `ru`); the system locale is used otherwise.
	pub locale: Option<String>,
	/// Language code of the OCR recognition model (`<code>_recognition.mnn`).
	pub ocr_language: String,
	pub debug_images: DebugImageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
	pub lifetime_ms: u64,
	pub sweep_lifetime_ms: u64,
	/// Offset of the first plate from the bottom-left corner of the matched template.
	pub offset: ie::Point,
	pub padding: f32,
	pub line_gap: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
	pub timeout_ms: u64,
	/// Part of the monitor captured by a sweep.
	pub sweep_area: CaptureArea,
}

/// Screenshots saved when templates stop matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugImageSettings {
	pub enabled: bool,
	/// Defaults to `<data dir>/pricer/logs`.
	pub dir: Option<PathBuf>,
	/// Oldest images are deleted once the folder grows past this; 0 disables pruning.
	pub quota_mb: u64,
}

impl Default for DebugImageSettings {
	fn default() -> Self {
		Self {
			enabled: false,
			dir: None,
			quota_mb: 300,
		}
	}
}

impl DebugImageSettings {
	pub fn dir(&self) -> Result<PathBuf> {
		match &self.dir {
			Some(path) => Ok(path.clone()),
			None => Ok(dirs::data_dir()
				.context("data_dir() unavailable")?
				.join("pricer")
				.join("logs")),
		}
	}
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			hotkeys: BTreeMap::from([
				(Action::SingleCapture, "F1".to_string()),
				(Action::SweepCapture, "F2".to_string()),
				(Action::OpenCalibration, "F3".to_string()),
			]),
			thresholds: ie::ThresholdOverrides::default(),
			overlay: OverlaySettings::default(),
			capture: CaptureSettings::default(),
			name_match_tolerance: 2,
			store_path: None,
			templates_dir: None,
			locale: None,
			ocr_language: "en".to_string(),
			debug_images: DebugImageSettings::default(),
		}
	}
}

impl Default for OverlaySettings {
	fn default() -> Self {
		Self {
			lifetime_ms: 4000,
			sweep_lifetime_ms: 8000,
			offset: ie::Point::new(0, 8),
			padding: 3.0,
			line_gap: 2.0,
		}
	}
}

impl Default for CaptureSettings {
	fn default() -> Self {
		Self {
			timeout_ms: 1500,
			sweep_area: CaptureArea::new(0.5, 0.5, 0.5, 0.5),
		}
	}
}

impl CaptureSettings {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

impl Settings {
	/// Path to the settings file.
	pub fn path() -> Result<PathBuf> {
		let base = dirs::config_dir().context("config_dir() unavailable")?;
		Ok(base.join("pricer").join("config.json"))
	}

	/// Load settings from disk, falling back to defaults on any error.
	pub fn load_or_default() -> Self {
		match Self::try_load() {
			Ok(settings) => settings,
			Err(err) => {
				tracing::warn!(error = %format!("{err:#}"), "failed to load settings; using defaults");
				Self::default()
			}
		}
	}

	pub fn try_load() -> Result<Self> {
		Self::load_from(&Self::path()?)
	}

	/// Load settings from `path`; a missing file means defaults.
	pub fn load_from(path: &Path) -> Result<Self> {
		if !path.exists() {
			return Ok(Self::default());
		}
		let json = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
		let settings = serde_json::from_str(&json).with_context(|| format!("parse {}", path.display()))?;
		Ok(settings)
	}

	pub fn save(&self) -> Result<()> {
		self.save_to(&Self::path()?)
	}

	pub fn save_to(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
		}
		let json = serde_json::to_string_pretty(self).context("serialize settings")?;
		fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
		Ok(())
	}

	pub fn store_path(&self) -> Result<PathBuf> {
		match &self.store_path {
			Some(path) => Ok(path.clone()),
			None => data::default_store_path().context("data_dir() unavailable"),
		}
	}

	pub fn templates_dir(&self) -> Result<PathBuf> {
		match &self.templates_dir {
			Some(path) => Ok(path.clone()),
			None => Ok(dirs::data_dir()
				.context("data_dir() unavailable")?
				.join("pricer")
				.join("templates")),
		}
	}

	/// Action bound to a key name, compared case-insensitively.
	pub fn action_for_key(&self, key: &str) -> Option<Action> {
		let key = key.trim();
		self.hotkeys
			.iter()
			.find(|(_, bound)| bound.eq_ignore_ascii_case(key))
			.map(|(action, _)| *action)
	}
}

/// Shared settings; readers get an immutable snapshot.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
	current: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsHandle {
	pub fn new(settings: Settings) -> Self {
		Self {
			current: Arc::new(RwLock::new(Arc::new(settings))),
		}
	}

	pub fn snapshot(&self) -> Arc<Settings> {
		self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	/// Apply `f` to a copy of the current settings and swap the copy in.
	///
	/// Snapshots taken earlier are unaffected.
	pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Arc<Settings> {
		let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
		let mut next = Settings::clone(&current);
		f(&mut next);
		let next = Arc::new(next);
		*current = next.clone();
		next
	}
}
