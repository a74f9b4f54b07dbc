use std::sync::LazyLock;

use data::{Lookup, LpTier};
use regex::Regex;

use crate::{CaptureFrame, FieldKind, MatchResult, Point, Rect, Recognizer, Template, TemplateRole};

/// Characters that never appear in item names; OCR noise around glyphs mostly.
static NAME_NOISE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s'\-]").expect("name noise regex is valid"));

/// Text read from one field region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldText {
	Name(String),
	LpTier(String),
	PriceLine(String),
	Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
	pub name: String,
	pub tier: LpTier,
	pub fields: Vec<FieldText>,
	/// Matched template placement, in frame coordinates.
	pub bbox: Rect,
	/// Calibrated anchor point, in frame coordinates.
	pub anchor: Point,
	pub template_id: String,
	pub score: f32,
}

impl Lookup for ParsedItem {
	fn item_name(&self) -> &str {
		&self.name
	}

	fn tier(&self) -> LpTier {
		self.tier
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
	#[error("item name is unreadable (template {template})")]
	NameUnparseable { template: String },
}

pub struct FieldExtractor<'a> {
	recognizer: &'a dyn Recognizer,
}

impl<'a> FieldExtractor<'a> {
	pub fn new(recognizer: &'a dyn Recognizer) -> Self {
		Self { recognizer }
	}

	/// Read the fields calibrated for `template` around a match.
	///
	/// Only the name is mandatory. A calibrated label names the item even if
	/// the name region reads differently.
	pub fn extract(&self, frame: &CaptureFrame, matched: &MatchResult, template: &Template) -> Result<ParsedItem, ExtractError> {
		let anchor = matched.anchor(template);
		let image = frame.image().as_image();

		let mut read_name: Option<String> = None;
		let mut tier = LpTier::Unresolved;
		let mut fields = Vec::with_capacity(template.fields.len());

		for region in &template.fields {
			let Some(rect) = region.rect.translated(anchor).clip(frame.width(), frame.height()) else {
				tracing::debug!(template = %template.id, kind = ?region.kind, "field region outside frame");
				continue;
			};

			let crop = image.sub_image(rect.x as u32, rect.y as u32, rect.width, rect.height);
			let text = self.recognizer.recognize(crop, region.kind).unwrap_or_else(|err| {
				tracing::warn!(template = %template.id, kind = ?region.kind, error = %format!("{err:#}"), "text recognition failed");
				String::new()
			});

			match region.kind {
				FieldKind::Name => {
					let name = clean_name(&text);
					if read_name.is_none() && !name.is_empty() {
						read_name = Some(name.clone());
					}
					fields.push(FieldText::Name(name));
				}
				FieldKind::LpTier => {
					let parsed = LpTier::from_text(&text);
					let text = collapse_whitespace(&text);
					if parsed == LpTier::Unresolved {
						fields.push(FieldText::Unrecognized(text));
						continue;
					}
					if tier == LpTier::Unresolved {
						tier = parsed;
					}
					fields.push(FieldText::LpTier(text));
				}
				FieldKind::PriceLine => {
					let text = collapse_whitespace(&text);
					if text.chars().any(|c| c.is_ascii_digit()) {
						fields.push(FieldText::PriceLine(text));
					} else {
						fields.push(FieldText::Unrecognized(text));
					}
				}
			}
		}

		let name = template
			.label
			.as_deref()
			.map(clean_name)
			.filter(|v| !v.is_empty())
			.or(read_name)
			.ok_or_else(|| ExtractError::NameUnparseable {
				template: template.id.clone(),
			})?;

		tracing::debug!(name = %name, tier = ?tier, template = %template.id, "extracted item");
		Ok(ParsedItem {
			name,
			tier,
			fields,
			bbox: matched.bbox,
			anchor,
			template_id: template.id.clone(),
			score: matched.score,
		})
	}
}

/// Tier carried by an LP tier marker template's label.
pub fn tier_from_marker(template: &Template) -> LpTier {
	match (template.role, template.label.as_deref()) {
		(TemplateRole::LpTierMarker, Some(label)) => LpTier::from_text(label),
		_ => LpTier::Unresolved,
	}
}

fn clean_name(text: &str) -> String {
	collapse_whitespace(&NAME_NOISE.replace_all(text, " "))
}

fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use data::Tier;

	use super::*;
	use crate::template::{Dimensions, FieldRegion};
	use crate::{Color, Image, OwnedImage, TemplateScope};

	/// Returns canned text per field kind and records the crop sizes it saw.
	#[derive(Default)]
	struct Canned {
		name: &'static str,
		tier: &'static str,
		price: &'static str,
		seen: Mutex<Vec<(FieldKind, u32, u32)>>,
	}

	impl Recognizer for Canned {
		fn recognize(&self, image: Image, kind: FieldKind) -> anyhow::Result<String> {
			self.seen.lock().unwrap().push((kind, image.width(), image.height()));
			Ok(match kind {
				FieldKind::Name => self.name,
				FieldKind::LpTier => self.tier,
				FieldKind::PriceLine => self.price,
			}
			.to_string())
		}
	}

	fn frame() -> CaptureFrame {
		CaptureFrame::new(OwnedImage::filled(100, 50, Color::WHITE), Point::default())
	}

	fn template(label: Option<&str>, fields: Vec<FieldRegion>) -> Template {
		Template {
			id: "tooltip".into(),
			role: TemplateRole::ItemName,
			label: label.map(str::to_string),
			reference: image::GrayImage::new(8, 6),
			anchor: Point::new(2, 1),
			fields,
			threshold: 0.8,
			calibration: Dimensions { width: 100, height: 50 },
			sequence: 0,
			scope: TemplateScope::Tooltip,
			search_region: None,
		}
	}

	fn region(kind: FieldKind, x: i32, y: i32, width: u32, height: u32) -> FieldRegion {
		FieldRegion {
			kind,
			rect: Rect::new(x, y, width, height),
		}
	}

	fn matched() -> MatchResult {
		MatchResult {
			template_id: "tooltip".into(),
			role: TemplateRole::ItemName,
			bbox: Rect::new(10, 10, 8, 6),
			score: 0.95,
			sequence: 0,
		}
	}

	fn all_fields() -> Vec<FieldRegion> {
		vec![
			region(FieldKind::Name, 0, -8, 40, 8),
			region(FieldKind::LpTier, 0, 6, 20, 6),
			region(FieldKind::PriceLine, 0, 14, 200, 10),
		]
	}

	#[test]
	fn label_is_authoritative_and_fields_are_read() {
		let ocr = Canned {
			name: "Exsangu1nous!!",
			tier: " LP 3 ",
			price: "150000   BiS",
			..Default::default()
		};
		let t = template(Some("Exsanguinous"), all_fields());

		let item = FieldExtractor::new(&ocr).extract(&frame(), &matched(), &t).unwrap();
		assert_eq!(item.name, "Exsanguinous");
		assert_eq!(item.tier, LpTier::Tier(Tier::new(3).unwrap()));
		assert_eq!(item.anchor, Point::new(12, 11));
		assert_eq!(
			item.fields,
			vec![
				FieldText::Name("Exsangu1nous".into()),
				FieldText::LpTier("LP 3".into()),
				FieldText::PriceLine("150000 BiS".into()),
			]
		);
	}

	#[test]
	fn regions_are_clipped_to_frame() {
		let ocr = Canned {
			name: "x",
			..Default::default()
		};
		let t = template(None, all_fields());
		FieldExtractor::new(&ocr).extract(&frame(), &matched(), &t).unwrap();

		let seen = ocr.seen.lock().unwrap();
		assert_eq!(
			*seen,
			vec![
				(FieldKind::Name, 40, 8),
				(FieldKind::LpTier, 20, 6),
				(FieldKind::PriceLine, 88, 10),
			]
		);
	}

	#[test]
	fn name_is_cleaned_without_label() {
		let ocr = Canned {
			name: "  Ruin's  »Edge«   ",
			..Default::default()
		};
		let t = template(None, vec![region(FieldKind::Name, 0, 0, 10, 5)]);
		let item = FieldExtractor::new(&ocr).extract(&frame(), &matched(), &t).unwrap();
		assert_eq!(item.name, "Ruin's Edge");
		assert_eq!(item.tier, LpTier::Unresolved);
	}

	#[test]
	fn unreadable_name_fails() {
		let ocr = Canned {
			name: " !!! ",
			..Default::default()
		};
		let t = template(None, vec![region(FieldKind::Name, 0, 0, 10, 5)]);
		assert!(matches!(
			FieldExtractor::new(&ocr).extract(&frame(), &matched(), &t),
			Err(ExtractError::NameUnparseable { .. })
		));
	}

	#[test]
	fn bad_tier_and_price_degrade() {
		let ocr = Canned {
			tier: "LP 9",
			price: "ask in chat",
			..Default::default()
		};
		let t = template(Some("Ruin"), all_fields());
		let item = FieldExtractor::new(&ocr).extract(&frame(), &matched(), &t).unwrap();
		assert_eq!(item.tier, LpTier::Unresolved);
		assert_eq!(
			&item.fields[1..],
			&[
				FieldText::Unrecognized("LP 9".into()),
				FieldText::Unrecognized("ask in chat".into()),
			]
		);
	}

	#[test]
	fn region_outside_frame_is_skipped() {
		let ocr = Canned::default();
		let t = template(Some("Ruin"), vec![region(FieldKind::PriceLine, 500, 0, 10, 10)]);
		let item = FieldExtractor::new(&ocr).extract(&frame(), &matched(), &t).unwrap();
		assert!(item.fields.is_empty());
		assert!(ocr.seen.lock().unwrap().is_empty());
	}

	#[test]
	fn marker_label_gives_tier() {
		let mut marker = template(Some("LP 2"), vec![]);
		marker.role = TemplateRole::LpTierMarker;
		assert_eq!(tier_from_marker(&marker), LpTier::Tier(Tier::new(2).unwrap()));

		marker.label = Some("5".into());
		assert_eq!(tier_from_marker(&marker), LpTier::Unresolved);

		let name = template(Some("3"), vec![]);
		assert_eq!(tier_from_marker(&name), LpTier::Unresolved);
	}
}
