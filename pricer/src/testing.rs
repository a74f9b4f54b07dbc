//! Fixtures shared by the pipeline and dispatcher tests.

use std::sync::{Arc, Mutex, RwLock, mpsc};

use data::{PriceStore, Tier};
use ie::template::{Dimensions, FieldRegion};
use ie::{CaptureFrame, Color, OwnedImage, Point, Template, TemplateRole, TemplateScope, TemplateSet};
use image::{GrayImage, Luma};

use crate::capture::{CaptureArea, CaptureSource};
use crate::overlay::MonospaceMetrics;
use crate::pipeline::Pipeline;
use crate::watch::TemplateLibrary;

pub const W: u32 = 64;
pub const H: u32 = 48;
pub const ORIGIN: Point = Point::new(1000, 500);

/// Item header glyphs.
pub fn header() -> GrayImage {
	GrayImage::from_fn(8, 6, |x, y| Luma([(20 + x * 25 + y * 9) as u8]))
}

/// Tier marker glyphs.
pub fn marker() -> GrayImage {
	GrayImage::from_fn(6, 6, |x, y| Luma([if (x + y) % 2 == 0 { 230 } else { 40 }]))
}

pub fn screen(pastes: &[(&GrayImage, (u32, u32))]) -> OwnedImage {
	let mut img = OwnedImage::filled(W, H, Color::BLACK);
	for (reference, at) in pastes {
		for (x, y, p) in reference.enumerate_pixels() {
			img.put_pixel(at.0 + x, at.1 + y, Color::gray(p.0[0]));
		}
	}
	img
}

pub fn template(id: &str, role: TemplateRole, scope: TemplateScope, label: Option<&str>, reference: GrayImage) -> Template {
	Template {
		id: id.into(),
		role,
		label: label.map(str::to_string),
		reference,
		anchor: Point::default(),
		fields: Vec::<FieldRegion>::new(),
		threshold: 0.9,
		calibration: Dimensions { width: W, height: H },
		sequence: 0,
		scope,
		search_region: None,
	}
}

/// Store holding the Exsanguinous prices used across scenarios.
pub fn store() -> Arc<RwLock<PriceStore>> {
	let mut store = PriceStore::in_memory();
	let tier = |v| Tier::new(v).unwrap();
	store.upsert("Exsanguinous", tier(0), Some(50000.0), None).unwrap();
	store.upsert("Exsanguinous", tier(3), Some(150000.0), Some("BiS")).unwrap();
	Arc::new(RwLock::new(store))
}

/// Returns the same screen on every capture.
pub struct StaticSource(pub OwnedImage);

impl CaptureSource for StaticSource {
	fn capture(&self, _area: CaptureArea) -> anyhow::Result<CaptureFrame> {
		Ok(CaptureFrame::new(self.0.clone(), ORIGIN))
	}
}

/// Blocks every capture until the test sends on the gate.
pub struct GatedSource {
	gate: Mutex<mpsc::Receiver<()>>,
	screen: OwnedImage,
}

impl GatedSource {
	pub fn new(screen: OwnedImage) -> (Self, mpsc::Sender<()>) {
		let (tx, rx) = mpsc::channel();
		(
			Self {
				gate: Mutex::new(rx),
				screen,
			},
			tx,
		)
	}
}

impl CaptureSource for GatedSource {
	fn capture(&self, _area: CaptureArea) -> anyhow::Result<CaptureFrame> {
		self.gate.lock().unwrap().recv()?;
		Ok(CaptureFrame::new(self.screen.clone(), ORIGIN))
	}
}

pub fn pipeline(source: Arc<dyn CaptureSource>, templates: Vec<Template>) -> Pipeline {
	Pipeline::new(
		source,
		TemplateLibrary::from_set(TemplateSet::new(templates)),
		store(),
		Arc::new(ie::LabelRecognizer),
		Arc::new(MonospaceMetrics::default()),
	)
}
