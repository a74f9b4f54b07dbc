use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Legendary Potential rating, always within `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Tier(u8);

impl Tier {
	pub const MAX: u8 = 4;
	pub const COUNT: usize = Self::MAX as usize + 1;

	pub const fn new(value: u8) -> Option<Self> {
		if value <= Self::MAX { Some(Self(value)) } else { None }
	}

	/// Clamp an arbitrary number into range (used for legacy data).
	pub fn saturating(value: i64) -> Self {
		Self(value.clamp(0, Self::MAX as i64) as u8)
	}

	#[inline]
	pub const fn get(self) -> u8 {
		self.0
	}

	#[inline]
	pub const fn index(self) -> usize {
		self.0 as usize
	}

	pub fn all() -> impl DoubleEndedIterator<Item = Tier> {
		(0..=Self::MAX).map(Self)
	}

	/// Tiers strictly below this one, nearest first.
	pub fn below(self) -> impl Iterator<Item = Tier> {
		(0..self.0).rev().map(Self)
	}

	/// First run of digits in `text`, if it is a valid tier.
	pub fn parse(text: &str) -> Option<Self> {
		let start = text.find(|c: char| c.is_ascii_digit())?;
		let digits = &text[start..];
		let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
		let value = digits[..end].parse::<u32>().ok()?;
		u8::try_from(value).ok().and_then(Self::new)
	}
}

impl TryFrom<u8> for Tier {
	type Error = String;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		Self::new(value).ok_or_else(|| format!("LP tier {value} is outside 0..=4"))
	}
}

impl From<Tier> for u8 {
	fn from(value: Tier) -> Self {
		value.0
	}
}

impl std::fmt::Display for Tier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Tier detected on a tooltip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LpTier {
	Tier(Tier),
	#[default]
	Unresolved,
}

impl LpTier {
	pub fn from_text(text: &str) -> Self {
		Tier::parse(text).map_or(Self::Unresolved, Self::Tier)
	}

	pub fn tier(self) -> Option<Tier> {
		match self {
			Self::Tier(v) => Some(v),
			Self::Unresolved => None,
		}
	}
}

impl From<Option<Tier>> for LpTier {
	fn from(value: Option<Tier>) -> Self {
		value.map_or(Self::Unresolved, Self::Tier)
	}
}

/// Prices and comments of one item, per tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordRepr", into = "RecordRepr")]
pub struct ItemRecord {
	/// Display name as entered; the store key is its normalized form.
	pub name: String,
	pub prices: [Option<f64>; Tier::COUNT],
	pub comments: [Option<String>; Tier::COUNT],
	pub notes: Option<String>,
}

impl ItemRecord {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn price(&self, tier: Tier) -> Option<f64> {
		self.prices[tier.index()]
	}

	pub fn comment(&self, tier: Tier) -> Option<&str> {
		self.comments[tier.index()].as_deref()
	}

	/// Whether anything at all is recorded for `tier`.
	pub fn has_entry(&self, tier: Tier) -> bool {
		self.price(tier).is_some() || self.comment(tier).is_some()
	}

	pub(crate) fn set(&mut self, tier: Tier, price: Option<f64>, comment: Option<String>) {
		self.prices[tier.index()] = price;
		self.comments[tier.index()] = comment.filter(|v| !v.trim().is_empty());
	}
}

/// Flat on-disk layout of a record (`price_lp0..4`, `comment_lp0..4`).
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RecordRepr {
	name: String,
	price_lp0: Option<f64>,
	price_lp1: Option<f64>,
	price_lp2: Option<f64>,
	price_lp3: Option<f64>,
	price_lp4: Option<f64>,
	comment_lp0: Option<String>,
	comment_lp1: Option<String>,
	comment_lp2: Option<String>,
	comment_lp3: Option<String>,
	comment_lp4: Option<String>,
	notes: Option<String>,
}

impl From<RecordRepr> for ItemRecord {
	fn from(v: RecordRepr) -> Self {
		Self {
			name: v.name,
			prices: [v.price_lp0, v.price_lp1, v.price_lp2, v.price_lp3, v.price_lp4],
			comments: [v.comment_lp0, v.comment_lp1, v.comment_lp2, v.comment_lp3, v.comment_lp4],
			notes: v.notes,
		}
	}
}

impl From<ItemRecord> for RecordRepr {
	fn from(v: ItemRecord) -> Self {
		let [price_lp0, price_lp1, price_lp2, price_lp3, price_lp4] = v.prices;
		let [comment_lp0, comment_lp1, comment_lp2, comment_lp3, comment_lp4] = v.comments;
		Self {
			name: v.name,
			price_lp0,
			price_lp1,
			price_lp2,
			price_lp3,
			price_lp4,
			comment_lp0,
			comment_lp1,
			comment_lp2,
			comment_lp3,
			comment_lp4,
			notes: v.notes,
		}
	}
}

/// An item seen on screen that has no price record yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
	#[serde(default)]
	pub name: String,
	/// Tier it was seen with, if one was read.
	#[serde(default, deserialize_with = "lenient_tier")]
	pub potential: Option<Tier>,
	/// Other fields of the entry (e.g. `added_at`), written back unchanged.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl PendingItem {
	pub fn new(name: &str, potential: Option<Tier>) -> Self {
		Self {
			name: name.trim().to_string(),
			potential,
			extra: Map::new(),
		}
	}
}

/// Older files wrote the tier as a number, a numeric string or null.
fn lenient_tier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Tier>, D::Error> {
	Ok(match Value::deserialize(deserializer)? {
		Value::Number(n) => n.as_i64().map(Tier::saturating),
		Value::String(s) => s.trim().parse::<i64>().ok().map(Tier::saturating),
		_ => None,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tier_parses_first_digit_group() {
		assert_eq!(Tier::parse("LP 3"), Tier::new(3));
		assert_eq!(Tier::parse("3/4"), Tier::new(3));
		assert_eq!(Tier::parse("LP 7"), None);
		assert_eq!(Tier::parse("12"), None);
		assert_eq!(Tier::parse("no digits"), None);
		assert_eq!(LpTier::from_text("99999999999999999999"), LpTier::Unresolved);
	}

	#[test]
	fn below_is_nearest_first() {
		let t = Tier::new(3).unwrap();
		assert_eq!(t.below().map(Tier::get).collect::<Vec<_>>(), vec![2, 1, 0]);
		assert_eq!(Tier::new(0).unwrap().below().count(), 0);
	}

	#[test]
	fn record_uses_flat_layout() {
		let mut rec = ItemRecord::new("Exsanguinous");
		rec.set(Tier::new(3).unwrap(), Some(150000.0), Some("BiS".into()));

		let json = serde_json::to_value(&rec).unwrap();
		assert_eq!(json["price_lp3"], 150000.0);
		assert_eq!(json["comment_lp3"], "BiS");
		assert!(json["price_lp0"].is_null());

		let back: ItemRecord = serde_json::from_value(json).unwrap();
		assert_eq!(back, rec);
	}

	#[test]
	fn blank_comment_is_absent() {
		let mut rec = ItemRecord::new("x");
		rec.set(Tier::new(1).unwrap(), None, Some("  ".into()));
		assert!(!rec.has_entry(Tier::new(1).unwrap()));
	}

	#[test]
	fn pending_entries_keep_unknown_fields() {
		let item: PendingItem =
			serde_json::from_str(r#"{"name": "Unknown Relic", "potential": "2", "added_at": "2024-05-01T10:00:00"}"#).unwrap();
		assert_eq!(item.potential, Tier::new(2));

		let json = serde_json::to_value(&item).unwrap();
		assert_eq!(json["added_at"], "2024-05-01T10:00:00");
		assert_eq!(json["potential"], 2);

		let bare: PendingItem = serde_json::from_str(r#"{"name": "x", "potential": null}"#).unwrap();
		assert_eq!(bare.potential, None);
	}
}
