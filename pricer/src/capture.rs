use std::sync::{Arc, mpsc};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Part of the monitor to capture, as fractions of its size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureArea {
	pub x: f32,
	pub y: f32,
	pub width: f32,
	pub height: f32,
}

impl CaptureArea {
	pub const FULL: Self = Self::new(0.0, 0.0, 1.0, 1.0);

	pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
		Self { x, y, width, height }
	}

	/// Pixel rectangle inside a `width x height` monitor; never empty.
	pub fn to_pixels(self, width: u32, height: u32) -> ie::Rect {
		let frac = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
		let x = ((frac(self.x) * width as f32) as u32).min(width.saturating_sub(1));
		let y = ((frac(self.y) * height as f32) as u32).min(height.saturating_sub(1));
		let w = ((frac(self.width) * width as f32).round() as u32).clamp(1, (width - x).max(1));
		let h = ((frac(self.height) * height as f32).round() as u32).clamp(1, (height - y).max(1));
		ie::Rect::new(x as i32, y as i32, w, h)
	}
}

/// Something that can grab the screen.
pub trait CaptureSource: Send + Sync {
	fn capture(&self, area: CaptureArea) -> Result<ie::CaptureFrame>;
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
	#[error("capture did not finish within {0:?}")]
	Timeout(Duration),
	#[error("{0:#}")]
	Failed(anyhow::Error),
}

/// Capture on a helper thread, giving up after `timeout`.
///
/// A capture that times out is abandoned; its result is dropped whenever the
/// helper thread eventually finishes.
pub fn capture_with_timeout(source: Arc<dyn CaptureSource>, area: CaptureArea, timeout: Duration) -> Result<ie::CaptureFrame, CaptureError> {
	let (tx, rx) = mpsc::sync_channel(1);
	std::thread::Builder::new()
		.name("capture".into())
		.spawn(move || {
			let _ = tx.send(source.capture(area));
		})
		.context("spawn capture thread")
		.map_err(CaptureError::Failed)?;

	match rx.recv_timeout(timeout) {
		Ok(Ok(frame)) => Ok(frame),
		Ok(Err(err)) => Err(CaptureError::Failed(err)),
		Err(mpsc::RecvTimeoutError::Timeout) => Err(CaptureError::Timeout(timeout)),
		Err(mpsc::RecvTimeoutError::Disconnected) => Err(CaptureError::Failed(anyhow::anyhow!("capture thread exited without a frame"))),
	}
}

/// Captures the primary monitor with `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapSource;

impl XcapSource {
	fn primary_monitor() -> Result<xcap::Monitor> {
		let monitors = xcap::Monitor::all().context("enumerate monitors")?;
		let mut fallback = None;
		for monitor in monitors {
			if monitor.is_primary().unwrap_or(false) {
				return Ok(monitor);
			}
			fallback.get_or_insert(monitor);
		}
		fallback.context("no monitor found")
	}
}

impl CaptureSource for XcapSource {
	fn capture(&self, area: CaptureArea) -> Result<ie::CaptureFrame> {
		let monitor = Self::primary_monitor()?;
		let img = monitor.capture_image().context("capture monitor")?;
		let full = ie::OwnedImage::from_rgba(img.width() as usize, img.as_raw());

		let rect = area.to_pixels(full.width(), full.height());
		let image = full
			.as_image()
			.sub_image(rect.x as u32, rect.y as u32, rect.width, rect.height)
			.to_owned_image();

		let origin = ie::Point::new(
			monitor.x().context("monitor x")? + rect.x,
			monitor.y().context("monitor y")? + rect.y,
		);
		tracing::debug!(width = image.width(), height = image.height(), ?origin, "captured screen");
		Ok(ie::CaptureFrame::new(image, origin))
	}
}
