use serde::{Deserialize, Serialize};

/// A point in pixel coordinates (frame or screen space depending on context).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
	pub x: i32,
	pub y: i32,
}

impl Point {
	pub const fn new(x: i32, y: i32) -> Self {
		Self { x, y }
	}

	pub const fn offset(self, dx: i32, dy: i32) -> Self {
		Self::new(self.x + dx, self.y + dy)
	}
}

/// Axis-aligned rectangle. The origin may be negative when the rectangle is
/// expressed relative to an anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
	pub x: i32,
	pub y: i32,
	pub width: u32,
	pub height: u32,
}

impl Rect {
	pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
		Self { x, y, width, height }
	}

	pub fn right(&self) -> i32 {
		self.x + self.width as i32
	}

	pub fn bottom(&self) -> i32 {
		self.y + self.height as i32
	}

	pub fn origin(&self) -> Point {
		Point::new(self.x, self.y)
	}

	pub fn area(&self) -> u64 {
		self.width as u64 * self.height as u64
	}

	pub fn is_empty(&self) -> bool {
		self.width == 0 || self.height == 0
	}

	pub fn translated(&self, by: Point) -> Self {
		Self::new(self.x + by.x, self.y + by.y, self.width, self.height)
	}

	/// Intersection with `[0, width) x [0, height)`, or `None` when nothing is left.
	pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
		let x1 = self.x.max(0);
		let y1 = self.y.max(0);
		let x2 = self.right().min(width as i32);
		let y2 = self.bottom().min(height as i32);
		if x2 <= x1 || y2 <= y1 {
			return None;
		}
		Some(Self::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32))
	}

	pub fn iou(&self, other: &Rect) -> f32 {
		let x1 = self.x.max(other.x);
		let y1 = self.y.max(other.y);
		let x2 = self.right().min(other.right());
		let y2 = self.bottom().min(other.bottom());

		if x2 <= x1 || y2 <= y1 {
			return 0.0;
		}

		let inter = (x2 - x1) as f32 * (y2 - y1) as f32;
		let union = self.area() as f32 + other.area() as f32 - inter;
		if union <= 0.0 {
			return 0.0;
		}
		inter / union
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clip_keeps_visible_part() {
		let r = Rect::new(-5, 10, 20, 20);
		assert_eq!(r.clip(100, 25), Some(Rect::new(0, 10, 15, 15)));
		assert_eq!(Rect::new(120, 0, 5, 5).clip(100, 100), None);
	}

	#[test]
	fn iou_of_identical_and_disjoint() {
		let a = Rect::new(0, 0, 10, 10);
		assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
		assert_eq!(a.iou(&Rect::new(20, 20, 10, 10)), 0.0);

		let half = Rect::new(5, 0, 10, 10);
		assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
	}
}
