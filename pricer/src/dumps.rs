//! Screenshots saved when templates stop matching.
//!
//! The folder is capped: once the images in it exceed the quota, the oldest
//! are deleted first.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use ie::CaptureFrame;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

#[derive(Debug, Clone)]
pub struct DebugDumps {
	dir: PathBuf,
	quota_bytes: u64,
}

impl DebugDumps {
	pub fn new(dir: impl Into<PathBuf>, quota_mb: u64) -> Self {
		Self {
			dir: dir.into(),
			quota_bytes: quota_mb.saturating_mul(1024 * 1024),
		}
	}

	/// Write `frame` as `<millis>_<tag>.png`, then enforce the quota.
	pub fn save(&self, frame: &CaptureFrame, tag: &str) -> Result<PathBuf> {
		std::fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir.display()))?;
		let millis = frame
			.captured_at
			.duration_since(UNIX_EPOCH)
			.map(|v| v.as_millis())
			.unwrap_or_default();
		let path = self.dir.join(format!("{millis}_{tag}.png"));
		frame.image().as_image().save_png(&path)?;

		if let Err(err) = self.enforce_quota() {
			tracing::debug!(error = %format!("{err:#}"), "failed to prune debug images");
		}
		Ok(path)
	}

	/// Delete the oldest images until the folder fits the quota. Returns how
	/// many were deleted. A zero quota disables pruning.
	pub fn enforce_quota(&self) -> Result<usize> {
		if self.quota_bytes == 0 || !self.dir.is_dir() {
			return Ok(0);
		}

		let mut images = Vec::new();
		for entry in std::fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))? {
			let Ok(entry) = entry else { continue };
			let path = entry.path();
			if !is_image(&path) {
				continue;
			}
			let Ok(meta) = entry.metadata() else { continue };
			images.push((meta.modified().unwrap_or(UNIX_EPOCH), meta.len(), path));
		}

		let mut total = images.iter().map(|(_, len, _)| len).sum::<u64>();
		if total <= self.quota_bytes {
			return Ok(0);
		}

		// Oldest first; equal times fall back to the name, which starts with the capture time.
		images.sort();
		let mut removed = 0;
		for (_, len, path) in images {
			if total <= self.quota_bytes {
				break;
			}
			match std::fs::remove_file(&path) {
				Ok(()) => {
					total -= len;
					removed += 1;
				}
				Err(err) => tracing::debug!(path = %path.display(), error = %err, "failed to delete debug image"),
			}
		}
		tracing::debug!(removed, total, "pruned debug images");
		Ok(removed)
	}
}

fn is_image(path: &Path) -> bool {
	path.extension()
		.and_then(|v| v.to_str())
		.is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}
