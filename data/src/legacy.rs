//! Migration of the old list-based store layout.
//!
//! Older files kept `known` as a flat list with one entry per (name, tier):
//!
//! ```json
//! {"known": [{"name": "Exsanguinous", "potential": 3, "price": 150000.0}], "pending": []}
//! ```
//!
//! `price` may be a number, a number written as text (comma decimals
//! included) or free text, which becomes the tier's comment.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::{ItemRecord, Tier, normalize_name};

#[derive(Debug, Deserialize)]
pub(crate) struct LegacyEntry {
	#[serde(default)]
	name: String,
	#[serde(default)]
	potential: Value,
	#[serde(default)]
	price: Value,
}

/// Group legacy entries into records, keyed and ordered by first appearance.
pub(crate) fn migrate(entries: Vec<LegacyEntry>) -> (HashMap<String, ItemRecord>, Vec<String>) {
	let mut records = HashMap::new();
	let mut order = Vec::new();

	for entry in entries {
		let key = normalize_name(&entry.name);
		if key.is_empty() {
			tracing::warn!("dropping legacy entry without a name");
			continue;
		}

		let record = records.entry(key.clone()).or_insert_with(|| {
			order.push(key);
			ItemRecord::new(entry.name.trim())
		});

		let tier = Tier::saturating(potential_of(&entry.potential));
		let (price, comment) = price_of(&entry.price);
		record.set(tier, price, comment);
	}

	(records, order)
}

fn potential_of(value: &Value) -> i64 {
	match value {
		Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|v| v as i64)).unwrap_or(0),
		Value::String(s) => s.trim().parse().unwrap_or(0),
		_ => 0,
	}
}

fn price_of(value: &Value) -> (Option<f64>, Option<String>) {
	match value {
		Value::Number(n) => (n.as_f64().filter(|v| v.is_finite()), None),
		Value::String(s) => {
			let text = s.trim();
			if text.is_empty() {
				return (None, None);
			}
			match text.replace(',', ".").parse::<f64>() {
				Ok(v) if v.is_finite() => (Some(v), None),
				_ => (None, Some(text.to_string())),
			}
		}
		_ => (None, None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn groups_by_name_and_clamps_potential() {
		let entries: Vec<LegacyEntry> = serde_json::from_str(
			r#"[
				{"name": "Exsanguinous", "potential": 0, "price": 50000},
				{"name": "exsanguinous ", "potential": 3, "price": "150000,5"},
				{"name": "Other", "potential": 7, "price": "BiS"},
				{"name": "Exsanguinous", "potential": null, "price": 60000},
				{"name": "  ", "potential": 1, "price": 1}
			]"#,
		)
		.unwrap();

		let (records, order) = migrate(entries);
		assert_eq!(order, vec!["exsanguinous".to_string(), "other".to_string()]);

		let exs = &records["exsanguinous"];
		assert_eq!(exs.name, "Exsanguinous");
		assert_eq!(exs.price(Tier::new(0).unwrap()), Some(60000.0));
		assert_eq!(exs.price(Tier::new(3).unwrap()), Some(150000.5));

		let other = &records["other"];
		assert_eq!(other.price(Tier::new(4).unwrap()), None);
		assert_eq!(other.comment(Tier::new(4).unwrap()), Some("BiS"));
	}
}
