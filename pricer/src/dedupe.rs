use std::collections::HashMap;

use crate::overlay::OverlayHint;

/// Caps how many hints a sweep shows for the same item.
#[derive(Debug, Clone, Copy)]
pub struct InventoryDeduper {
	pub max_per_name: usize,
}

impl Default for InventoryDeduper {
	fn default() -> Self {
		Self { max_per_name: 3 }
	}
}

impl InventoryDeduper {
	/// Group hints by item name (case-insensitive) in first-seen order,
	/// keeping at most `max_per_name` of each in arrival order. The rest are
	/// dropped.
	pub fn dedupe(&self, hints: Vec<OverlayHint>) -> Vec<OverlayHint> {
		let mut index = HashMap::new();
		let mut groups: Vec<Vec<OverlayHint>> = Vec::new();

		for hint in hints {
			let key = hint.item_name.trim().to_lowercase();
			let slot = *index.entry(key).or_insert_with(|| {
				groups.push(Vec::new());
				groups.len() - 1
			});
			let group = &mut groups[slot];
			if group.len() < self.max_per_name {
				group.push(hint);
			} else {
				tracing::debug!(item = %hint.item_name, "dropping duplicate sweep hint");
			}
		}

		groups.into_iter().flatten().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::overlay::ColorCategory;

	fn hint(name: &str, x: i32) -> OverlayHint {
		OverlayHint {
			item_name: name.into(),
			tier: data::LpTier::Unresolved,
			price: None,
			comment: None,
			color: ColorCategory::Neutral,
			lines: vec![],
			anchor: ie::Point::new(x, 0),
			score: 1.0,
		}
	}

	fn summary(hints: &[OverlayHint]) -> Vec<(&str, i32)> {
		hints.iter().map(|v| (v.item_name.as_str(), v.anchor.x)).collect()
	}

	#[test]
	fn caps_each_name_at_three_in_arrival_order() {
		let hints = vec![
			hint("Ruin", 0),
			hint("Exsanguinous", 1),
			hint("ruin", 2),
			hint("RUIN ", 3),
			hint("Ruin", 4),
			hint("Ruin", 5),
			hint("Exsanguinous", 6),
		];

		let out = InventoryDeduper::default().dedupe(hints);
		assert_eq!(
			summary(&out),
			vec![
				("Ruin", 0),
				("ruin", 2),
				("RUIN ", 3),
				("Exsanguinous", 1),
				("Exsanguinous", 6),
			]
		);
	}

	#[test]
	fn small_sweeps_pass_through() {
		let out = InventoryDeduper::default().dedupe(vec![hint("a", 0), hint("b", 1)]);
		assert_eq!(summary(&out), vec![("a", 0), ("b", 1)]);
		assert!(InventoryDeduper::default().dedupe(vec![]).is_empty());
	}
}
