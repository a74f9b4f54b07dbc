//! Calibrated template set with hot reload.
//!
//! The calibration tool writes templates while the app runs; a filesystem
//! watcher reloads the whole set and swaps it in. Runs keep whichever set was
//! current when they started.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, mpsc};
use std::time::Duration;

use anyhow::{Context, Result};
use ie::TemplateSet;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Quiet period after the last filesystem event before reloading.
const SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct TemplateLibrary {
	dir: Option<PathBuf>,
	current: Arc<RwLock<Arc<TemplateSet>>>,
}

impl TemplateLibrary {
	pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
		let dir = dir.into();
		let set = TemplateSet::load_dir(&dir)?;
		tracing::info!(dir = %dir.display(), templates = set.len(), "templates loaded");
		Ok(Self {
			dir: Some(dir),
			current: Arc::new(RwLock::new(Arc::new(set))),
		})
	}

	/// A fixed set that is never reloaded.
	pub fn from_set(set: TemplateSet) -> Self {
		Self {
			dir: None,
			current: Arc::new(RwLock::new(Arc::new(set))),
		}
	}

	pub fn dir(&self) -> Option<&Path> {
		self.dir.as_deref()
	}

	pub fn snapshot(&self) -> Arc<TemplateSet> {
		self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
	}

	/// Re-read the directory and swap the new set in. Returns the template count.
	pub fn reload(&self) -> Result<usize> {
		let Some(dir) = &self.dir else {
			return Ok(self.snapshot().len());
		};
		let set = TemplateSet::load_dir(dir)?;
		let count = set.len();
		*self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(set);
		tracing::info!(dir = %dir.display(), templates = count, "templates reloaded");
		Ok(count)
	}

	/// Reload whenever the template directory changes.
	///
	/// Watching stops when the returned watcher is dropped.
	pub fn watch(&self) -> Result<TemplateWatcher> {
		let dir = self.dir.clone().context("template library has no directory")?;
		std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

		let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
		let mut watcher = notify::recommended_watcher(tx).context("create template watcher")?;
		watcher
			.watch(&dir, RecursiveMode::Recursive)
			.with_context(|| format!("watch {}", dir.display()))?;

		let library = self.clone();
		std::thread::Builder::new()
			.name("template-watch".into())
			.spawn(move || {
				while let Ok(event) = rx.recv() {
					if !is_change(&event) {
						continue;
					}
					// Calibration writes several files; wait for the burst to settle.
					loop {
						match rx.recv_timeout(SETTLE) {
							Ok(_) => continue,
							Err(mpsc::RecvTimeoutError::Timeout) => break,
							Err(mpsc::RecvTimeoutError::Disconnected) => return,
						}
					}
					if let Err(err) = library.reload() {
						tracing::warn!(error = %format!("{err:#}"), "template reload failed; keeping previous set");
					}
				}
			})
			.context("spawn template watch thread")?;

		tracing::info!(dir = %dir.display(), "watching templates");
		Ok(TemplateWatcher { _watcher: watcher })
	}
}

fn is_change(event: &notify::Result<notify::Event>) -> bool {
	match event {
		Ok(event) => matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)),
		Err(err) => {
			tracing::warn!(error = %err, "template watcher error");
			false
		}
	}
}

pub struct TemplateWatcher {
	_watcher: RecommendedWatcher,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_template(root: &Path, id: &str) {
		let dir = root.join(id);
		std::fs::create_dir_all(&dir).unwrap();
		std::fs::write(
			dir.join("template.json"),
			r#"{"role": "item_name", "label": "Ruin", "threshold": 0.8, "calibration": {"width": 64, "height": 48}}"#,
		)
		.unwrap();
		image::GrayImage::from_fn(4, 4, |x, y| image::Luma([(x * 50 + y) as u8]))
			.save(dir.join("reference.png"))
			.unwrap();
	}

	#[test]
	fn reload_swaps_set_but_keeps_old_snapshots() {
		let tmp = tempfile::tempdir().unwrap();
		write_template(tmp.path(), "one");

		let library = TemplateLibrary::load(tmp.path()).unwrap();
		let before = library.snapshot();
		assert_eq!(before.len(), 1);

		write_template(tmp.path(), "two");
		assert_eq!(library.reload().unwrap(), 2);
		assert_eq!(before.len(), 1);
		assert_eq!(library.snapshot().len(), 2);
	}

	#[test]
	fn fixed_set_reload_is_noop() {
		let library = TemplateLibrary::from_set(TemplateSet::default());
		assert_eq!(library.reload().unwrap(), 0);
		assert!(library.watch().is_err());
	}
}
