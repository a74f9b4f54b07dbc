use std::time::SystemTime;

use crate::{OwnedImage, Point};

/// One captured screen area.
///
/// The grayscale buffer is derived once at construction since every template
/// match of a run reads it.
pub struct CaptureFrame {
	image: OwnedImage,
	gray: image::GrayImage,
	/// Screen position of the frame's top-left pixel.
	pub origin: Point,
	pub captured_at: SystemTime,
}

impl CaptureFrame {
	pub fn new(image: OwnedImage, origin: Point) -> Self {
		let gray = image.to_gray_image();
		Self {
			image,
			gray,
			origin,
			captured_at: SystemTime::now(),
		}
	}

	pub fn width(&self) -> u32 {
		self.image.width()
	}

	pub fn height(&self) -> u32 {
		self.image.height()
	}

	pub fn dimensions(&self) -> (u32, u32) {
		(self.width(), self.height())
	}

	pub fn image(&self) -> &OwnedImage {
		&self.image
	}

	pub fn gray(&self) -> &image::GrayImage {
		&self.gray
	}

	/// Convert a frame-space point to screen space.
	pub fn to_screen(&self, p: Point) -> Point {
		p.offset(self.origin.x, self.origin.y)
	}
}
