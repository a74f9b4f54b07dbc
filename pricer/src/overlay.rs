//! Overlay hints.
//!
//! The composer only describes what to draw: text, color category and the
//! plate rectangle behind each line, in screen coordinates. The renderer owns
//! fonts and drawing and expires hints after their lifetime.

use data::{LpTier, ResolvedLookup, Resolution, TierPrice};
use ie::{ParsedItem, Point};

/// Prices above this are highlighted.
pub const HIGH_VALUE_PRICE: f64 = 100_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorCategory {
	Neutral,
	HighValue,
	/// The item has no price record at all.
	Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
	/// Item name line.
	Title,
	Body,
}

/// Rendered size of a line of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
	pub width: f32,
	pub ascent: f32,
	pub descent: f32,
}

pub trait TextMetrics: Send + Sync {
	fn measure(&self, text: &str, style: LineStyle) -> TextExtent;
}

/// Fixed-advance approximation used when the renderer doesn't supply metrics.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMetrics {
	pub title_px: f32,
	pub body_px: f32,
}

impl Default for MonospaceMetrics {
	fn default() -> Self {
		Self {
			title_px: 18.0,
			body_px: 14.0,
		}
	}
}

impl TextMetrics for MonospaceMetrics {
	fn measure(&self, text: &str, style: LineStyle) -> TextExtent {
		let px = match style {
			LineStyle::Title => self.title_px,
			LineStyle::Body => self.body_px,
		};
		TextExtent {
			width: text.chars().count() as f32 * px * 0.6,
			ascent: px * 0.8,
			descent: px * 0.2,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plate {
	pub x: f32,
	pub y: f32,
	pub width: f32,
	pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineDescriptor {
	pub text: String,
	pub color: ColorCategory,
	pub style: LineStyle,
	pub plate: Plate,
	/// Where the text baseline sits inside the plate, in screen coordinates.
	pub baseline: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayHint {
	pub item_name: String,
	/// Tier whose price is shown, or the detected tier when none is.
	pub tier: LpTier,
	pub price: Option<f64>,
	pub comment: Option<String>,
	pub color: ColorCategory,
	pub lines: Vec<LineDescriptor>,
	/// Screen position of the first plate's top-left corner.
	pub anchor: Point,
	pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateStyle {
	pub padding: f32,
	pub line_gap: f32,
}

pub struct OverlayComposer<'a> {
	metrics: &'a dyn TextMetrics,
	style: PlateStyle,
}

impl<'a> OverlayComposer<'a> {
	pub fn new(metrics: &'a dyn TextMetrics, style: PlateStyle) -> Self {
		Self { metrics, style }
	}

	pub fn compose(&self, item: &ParsedItem, lookup: &ResolvedLookup, anchor: Point) -> OverlayHint {
		let unresolved = matches!(lookup.resolution, Resolution::AllTiers(_));

		let mut texts = vec![(
			lookup.display_name().to_string(),
			if lookup.is_miss() { ColorCategory::Miss } else { ColorCategory::Neutral },
			LineStyle::Title,
		)];
		for entry in lookup.surfaced() {
			let mut text = price_line(entry);
			if unresolved {
				text = format!("LP{}: {text}", entry.tier);
			}
			let color = match entry.price {
				Some(p) if p > HIGH_VALUE_PRICE => ColorCategory::HighValue,
				_ => ColorCategory::Neutral,
			};
			texts.push((text, color, LineStyle::Body));
		}

		let mut lines = Vec::with_capacity(texts.len());
		let mut y = anchor.y as f32;
		for (text, color, style) in texts {
			let extent = self.metrics.measure(&text, style);
			let plate = Plate {
				x: anchor.x as f32,
				y,
				width: extent.width + self.style.padding * 2.0,
				height: extent.ascent + extent.descent + self.style.padding * 2.0,
			};
			lines.push(LineDescriptor {
				baseline: y + self.style.padding + extent.ascent,
				text,
				color,
				style,
				plate,
			});
			y += plate.height + self.style.line_gap;
		}

		let color = if lookup.is_miss() {
			ColorCategory::Miss
		} else if lines.iter().any(|v| v.color == ColorCategory::HighValue) {
			ColorCategory::HighValue
		} else {
			ColorCategory::Neutral
		};

		let (tier, price, comment) = match &lookup.resolution {
			Resolution::Priced { entry, .. } => (LpTier::Tier(entry.tier), entry.price, entry.comment.clone()),
			_ => (item.tier, None, None),
		};

		OverlayHint {
			item_name: lookup.display_name().to_string(),
			tier,
			price,
			comment,
			color,
			lines,
			anchor,
			score: item.score,
		}
	}
}

/// `"<price> <comment>"`, either part optional.
fn price_line(entry: &TierPrice) -> String {
	match (entry.price, entry.comment.as_deref()) {
		(Some(p), Some(c)) => format!("{} {c}", format_price(p)),
		(Some(p), None) => format_price(p),
		(None, Some(c)) => c.to_string(),
		(None, None) => String::new(),
	}
}

/// Plain digits, no grouping; integral prices have no decimals.
pub fn format_price(price: f64) -> String {
	if price.fract() == 0.0 && price.abs() < 1e15 {
		format!("{}", price as i64)
	} else {
		format!("{price}")
	}
}

#[cfg(test)]
mod tests {
	use data::{Lookup, PriceResolver, PriceStore, Tier};

	use super::*;

	fn tier(v: u8) -> Tier {
		Tier::new(v).unwrap()
	}

	fn item(name: &str, tier: LpTier) -> ParsedItem {
		ParsedItem {
			name: name.into(),
			tier,
			fields: vec![],
			bbox: ie::Rect::new(10, 10, 8, 6),
			anchor: Point::new(10, 10),
			template_id: "t".into(),
			score: 0.9,
		}
	}

	fn store() -> PriceStore {
		let mut store = PriceStore::in_memory();
		store.upsert("Exsanguinous", tier(0), Some(50000.0), None).unwrap();
		store.upsert("Exsanguinous", tier(3), Some(150000.0), Some("BiS")).unwrap();
		store
	}

	fn compose(item: &ParsedItem) -> OverlayHint {
		let lookup = PriceResolver::new(2).resolve(&store(), item);
		let metrics = MonospaceMetrics::default();
		let style = PlateStyle {
			padding: 2.0,
			line_gap: 1.0,
		};
		OverlayComposer::new(&metrics, style).compose(item, &lookup, Point::new(100, 200))
	}

	fn texts(hint: &OverlayHint) -> Vec<(&str, ColorCategory)> {
		hint.lines.iter().map(|v| (v.text.as_str(), v.color)).collect()
	}

	#[test]
	fn high_value_tier_price() {
		let hint = compose(&item("Exsanguinous", LpTier::Tier(tier(3))));
		assert_eq!(
			texts(&hint),
			vec![
				("Exsanguinous", ColorCategory::Neutral),
				("150000 BiS", ColorCategory::HighValue),
			]
		);
		assert_eq!(hint.color, ColorCategory::HighValue);
		assert_eq!(hint.price, Some(150000.0));
	}

	#[test]
	fn fallback_price_is_neutral_without_comment() {
		let hint = compose(&item("Exsanguinous", LpTier::Tier(tier(1))));
		assert_eq!(
			texts(&hint),
			vec![("Exsanguinous", ColorCategory::Neutral), ("50000", ColorCategory::Neutral)]
		);
		assert_eq!(hint.tier, LpTier::Tier(tier(0)));
	}

	#[test]
	fn unknown_item_is_a_miss() {
		let hint = compose(&item("Unknown Relic", LpTier::Tier(tier(2))));
		assert_eq!(texts(&hint), vec![("Unknown Relic", ColorCategory::Miss)]);
		assert_eq!(hint.color, ColorCategory::Miss);
	}

	#[test]
	fn missing_price_is_not_a_miss() {
		let mut store = store();
		store.upsert("Ruin", tier(3), None, Some("ask")).unwrap();
		let item = item("Ruin", LpTier::Tier(tier(3)));
		let lookup = PriceResolver::new(0).resolve(&store, &item);
		let metrics = MonospaceMetrics::default();
		let hint = OverlayComposer::new(&metrics, PlateStyle { padding: 0.0, line_gap: 0.0 }).compose(&item, &lookup, Point::default());
		assert_eq!(texts(&hint), vec![("Ruin", ColorCategory::Neutral)]);
	}

	#[test]
	fn unresolved_tier_lists_every_tier() {
		let hint = compose(&item("Exsanguinous", LpTier::Unresolved));
		assert_eq!(
			texts(&hint),
			vec![
				("Exsanguinous", ColorCategory::Neutral),
				("LP0: 50000", ColorCategory::Neutral),
				("LP3: 150000 BiS", ColorCategory::HighValue),
			]
		);
		assert_eq!(hint.price, None);
		assert_eq!(hint.item_name, item("Exsanguinous", LpTier::Unresolved).item_name());
	}

	#[test]
	fn high_value_is_strictly_above_threshold() {
		let mut store = PriceStore::in_memory();
		store.upsert("Edge", tier(0), Some(100_000.0), None).unwrap();
		store.upsert("Edge", tier(1), Some(100_000.5), None).unwrap();
		let metrics = MonospaceMetrics::default();
		let composer = OverlayComposer::new(&metrics, PlateStyle { padding: 0.0, line_gap: 0.0 });

		let at = |t: u8| {
			let item = item("Edge", LpTier::Tier(tier(t)));
			composer.compose(&item, &PriceResolver::new(0).resolve(&store, &item), Point::default())
		};
		assert_eq!(at(0).lines[1].color, ColorCategory::Neutral);
		assert_eq!(at(0).lines[1].text, "100000");
		assert_eq!(at(1).lines[1].color, ColorCategory::HighValue);
		assert_eq!(at(1).lines[1].text, "100000.5");
	}

	#[test]
	fn plates_follow_each_line_metrics() {
		let hint = compose(&item("Exsanguinous", LpTier::Tier(tier(3))));
		let [title, body] = &hint.lines[..] else {
			panic!("expected two lines");
		};

		// Title: 12 chars * 18px * 0.6, ascent 14.4, descent 3.6, padding 2.
		assert_eq!(title.plate.x, 100.0);
		assert_eq!(title.plate.y, 200.0);
		assert!((title.plate.width - (12.0 * 18.0 * 0.6 + 4.0)).abs() < 1e-3);
		assert!((title.plate.height - 22.0).abs() < 1e-3);
		assert!((title.baseline - (200.0 + 2.0 + 14.4)).abs() < 1e-3);

		// Body stacks below with the configured gap and uses body metrics.
		assert!((body.plate.y - (200.0 + 22.0 + 1.0)).abs() < 1e-3);
		assert!((body.plate.width - (10.0 * 14.0 * 0.6 + 4.0)).abs() < 1e-3);
		assert!((body.plate.height - 18.0).abs() < 1e-3);
	}

	#[test]
	fn prices_have_no_grouping() {
		assert_eq!(format_price(1_234_567.0), "1234567");
		assert_eq!(format_price(0.5), "0.5");
		assert_eq!(format_price(-3.0), "-3");
	}
}
