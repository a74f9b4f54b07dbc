//! Calibrated templates.
//!
//! Templates are produced by the (external) calibration tool and are read-only
//! here. Each template lives in its own directory:
//!
//! ```text
//! <templates_dir>/<id>/template.json
//! <templates_dir>/<id>/reference.png
//! ```

use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{Point, Rect};

const META_FILE: &str = "template.json";

/// What a template anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateRole {
	ItemName,
	LpTierMarker,
	PriceLine,
}

/// Which capture a template was calibrated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateScope {
	/// Single hovered-item capture.
	#[default]
	Tooltip,
	/// Inventory sweep capture.
	Inventory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
	Name,
	LpTier,
	PriceLine,
}

/// A field sub-region, relative to the template's anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRegion {
	pub kind: FieldKind,
	#[serde(flatten)]
	pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
	pub width: u32,
	pub height: u32,
}

/// On-disk description of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMeta {
	pub role: TemplateRole,
	#[serde(default)]
	pub label: Option<String>,
	/// Anchor point relative to the reference image's top-left corner.
	#[serde(default)]
	pub anchor: Point,
	#[serde(default)]
	pub fields: Vec<FieldRegion>,
	pub threshold: f32,
	pub calibration: Dimensions,
	#[serde(default)]
	pub sequence: Option<u32>,
	#[serde(default)]
	pub scope: TemplateScope,
	#[serde(default)]
	pub search_region: Option<Rect>,
	#[serde(default = "default_reference")]
	pub reference: String,
}

fn default_reference() -> String {
	"reference.png".to_string()
}

#[derive(Debug, Clone)]
pub struct Template {
	pub id: String,
	pub role: TemplateRole,
	pub label: Option<String>,
	pub reference: image::GrayImage,
	pub anchor: Point,
	pub fields: Vec<FieldRegion>,
	pub threshold: f32,
	pub calibration: Dimensions,
	/// Lower means calibrated earlier; breaks exact score ties.
	pub sequence: u32,
	pub scope: TemplateScope,
	pub search_region: Option<Rect>,
}

impl Template {
	pub fn from_meta(id: impl Into<String>, meta: TemplateMeta, reference: image::GrayImage, fallback_sequence: u32) -> Result<Self> {
		let id = id.into();
		ensure!(
			meta.threshold > 0.0 && meta.threshold <= 1.0,
			"template {id}: threshold {} outside (0, 1]",
			meta.threshold
		);
		ensure!(
			reference.width() > 0 && reference.height() > 0,
			"template {id}: empty reference image"
		);
		ensure!(
			meta.calibration.width > 0 && meta.calibration.height > 0,
			"template {id}: empty calibration dimensions"
		);

		Ok(Self {
			id,
			role: meta.role,
			label: meta.label.filter(|v| !v.trim().is_empty()),
			reference,
			anchor: meta.anchor,
			fields: meta.fields,
			threshold: meta.threshold,
			calibration: meta.calibration,
			sequence: meta.sequence.unwrap_or(fallback_sequence),
			scope: meta.scope,
			search_region: meta.search_region,
		})
	}

	/// Load a template from its directory; the directory name is the id.
	pub fn load(dir: &Path, fallback_sequence: u32) -> Result<Self> {
		let id = dir
			.file_name()
			.and_then(|v| v.to_str())
			.with_context(|| format!("template dir {} has no usable name", dir.display()))?
			.to_string();

		let meta_path = dir.join(META_FILE);
		let json = std::fs::read_to_string(&meta_path).with_context(|| format!("read {}", meta_path.display()))?;
		let meta: TemplateMeta = serde_json::from_str(&json).with_context(|| format!("parse {}", meta_path.display()))?;

		let image_path = dir.join(&meta.reference);
		let reference = image::open(&image_path)
			.with_context(|| format!("decode {}", image_path.display()))?
			.to_luma8();

		Self::from_meta(id, meta, reference, fallback_sequence)
	}

	pub fn fields_of(&self, kind: FieldKind) -> impl Iterator<Item = &FieldRegion> {
		self.fields.iter().filter(move |v| v.kind == kind)
	}

	pub fn calibration_matches(&self, width: u32, height: u32) -> bool {
		self.calibration.width == width && self.calibration.height == height
	}
}

/// All templates known to the core.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
	templates: Vec<Template>,
}

impl TemplateSet {
	pub fn new(templates: Vec<Template>) -> Self {
		Self { templates }
	}

	/// Load every template directory under `root`.
	///
	/// A missing root yields an empty set. Individual broken templates are
	/// skipped with a warning so one bad calibration doesn't disable the rest.
	pub fn load_dir(root: &Path) -> Result<Self> {
		if !root.exists() {
			tracing::warn!(dir = %root.display(), "templates directory missing; no templates loaded");
			return Ok(Self::default());
		}

		let mut dirs = std::fs::read_dir(root)
			.with_context(|| format!("read templates dir {}", root.display()))?
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.path())
			.filter(|path| path.join(META_FILE).is_file())
			.collect::<Vec<_>>();
		dirs.sort();

		let mut templates = Vec::with_capacity(dirs.len());
		for (i, dir) in dirs.iter().enumerate() {
			match Template::load(dir, i as u32) {
				Ok(template) => {
					tracing::info!(
						id = %template.id,
						role = ?template.role,
						size = ?template.reference.dimensions(),
						"loaded template"
					);
					templates.push(template);
				}
				Err(err) => tracing::warn!(dir = %dir.display(), error = %format!("{err:#}"), "skipping template"),
			}
		}

		Ok(Self { templates })
	}

	pub fn candidates(&self, role: TemplateRole, scope: TemplateScope) -> impl Iterator<Item = &Template> {
		self.templates
			.iter()
			.filter(move |v| v.role == role && v.scope == scope)
	}

	pub fn get(&self, id: &str) -> Option<&Template> {
		self.templates.iter().find(|v| v.id == id)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Template> {
		self.templates.iter()
	}

	pub fn len(&self) -> usize {
		self.templates.len()
	}

	pub fn is_empty(&self) -> bool {
		self.templates.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_template(root: &Path, id: &str, json: &str) {
		let dir = root.join(id);
		std::fs::create_dir_all(&dir).unwrap();
		std::fs::write(dir.join(META_FILE), json).unwrap();
		image::GrayImage::from_fn(6, 4, |x, y| image::Luma([(x * 40 + y * 10) as u8]))
			.save(dir.join("reference.png"))
			.unwrap();
	}

	#[test]
	fn load_dir_reads_meta_and_defaults_sequence() {
		let tmp = tempfile::tempdir().unwrap();
		write_template(
			tmp.path(),
			"a_header",
			r#"{
				"role": "item_name",
				"label": "Exsanguinous",
				"anchor": {"x": 2, "y": 1},
				"fields": [{"kind": "lp_tier", "x": 0, "y": 20, "width": 30, "height": 12}],
				"threshold": 0.8,
				"calibration": {"width": 1920, "height": 1080}
			}"#,
		);
		write_template(
			tmp.path(),
			"b_marker",
			r#"{
				"role": "lp_tier_marker",
				"label": "3",
				"threshold": 0.9,
				"calibration": {"width": 1920, "height": 1080},
				"sequence": 7,
				"scope": "inventory"
			}"#,
		);

		let set = TemplateSet::load_dir(tmp.path()).unwrap();
		assert_eq!(set.len(), 2);

		let header = set.get("a_header").unwrap();
		assert_eq!(header.role, TemplateRole::ItemName);
		assert_eq!(header.sequence, 0);
		assert_eq!(header.anchor, Point::new(2, 1));
		assert_eq!(header.fields_of(FieldKind::LpTier).count(), 1);
		assert_eq!(header.reference.dimensions(), (6, 4));

		let marker = set.get("b_marker").unwrap();
		assert_eq!(marker.sequence, 7);
		assert_eq!(marker.scope, TemplateScope::Inventory);
		assert_eq!(set.candidates(TemplateRole::LpTierMarker, TemplateScope::Inventory).count(), 1);
		assert_eq!(set.candidates(TemplateRole::LpTierMarker, TemplateScope::Tooltip).count(), 0);
	}

	#[test]
	fn broken_template_is_skipped() {
		let tmp = tempfile::tempdir().unwrap();
		write_template(
			tmp.path(),
			"bad",
			r#"{"role": "item_name", "threshold": 1.5, "calibration": {"width": 10, "height": 10}}"#,
		);
		let set = TemplateSet::load_dir(tmp.path()).unwrap();
		assert!(set.is_empty());
	}

	#[test]
	fn missing_root_is_empty() {
		let tmp = tempfile::tempdir().unwrap();
		let set = TemplateSet::load_dir(&tmp.path().join("nope")).unwrap();
		assert!(set.is_empty());
	}
}
