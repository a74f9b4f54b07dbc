use crate::{ItemRecord, LpTier, PriceStore, Tier};

/// What the resolver needs to know about a recognized item.
pub trait Lookup {
	fn item_name(&self) -> &str;
	fn tier(&self) -> LpTier;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierPrice {
	pub tier: Tier,
	pub price: Option<f64>,
	pub comment: Option<String>,
}

impl TierPrice {
	fn of(record: &ItemRecord, tier: Tier) -> Self {
		Self {
			tier,
			price: record.price(tier),
			comment: record.comment(tier).map(str::to_string),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
	/// Price of the requested tier, or of the nearest lower tier that has one.
	Priced { requested: Tier, entry: TierPrice },
	/// The record exists but neither the requested tier nor any lower one has a price.
	NoPrice { requested: Tier },
	/// Tier unknown: every tier with a price or comment, in tier order.
	AllTiers(Vec<TierPrice>),
	NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLookup {
	/// Name as recognized.
	pub query: String,
	/// Name of the record that answered, if any.
	pub canonical_name: Option<String>,
	/// The record was found by edit distance rather than exact name.
	pub fuzzy: bool,
	pub resolution: Resolution,
}

impl ResolvedLookup {
	pub fn display_name(&self) -> &str {
		self.canonical_name.as_deref().unwrap_or(&self.query)
	}

	pub fn is_miss(&self) -> bool {
		self.resolution == Resolution::NotFound
	}

	/// The tier entries to show, in display order.
	pub fn surfaced(&self) -> &[TierPrice] {
		match &self.resolution {
			Resolution::Priced { entry, .. } => std::slice::from_ref(entry),
			Resolution::AllTiers(entries) => entries,
			Resolution::NoPrice { .. } | Resolution::NotFound => &[],
		}
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceResolver {
	/// Maximum edit distance for fuzzy name lookup; 0 disables it.
	tolerance: usize,
}

impl PriceResolver {
	pub fn new(tolerance: usize) -> Self {
		Self { tolerance }
	}

	/// Resolve against a consistent view of the store; callers hold one
	/// read guard for the duration of the call.
	pub fn resolve(&self, store: &PriceStore, item: &impl Lookup) -> ResolvedLookup {
		let query = item.item_name().to_string();

		let (record, fuzzy) = match store.lookup(&query) {
			Some(record) => (Some(record), false),
			None if self.tolerance > 0 => (store.find_closest(&query, self.tolerance), true),
			None => (None, false),
		};

		let Some(record) = record else {
			tracing::debug!(name = %query, "no price record");
			return ResolvedLookup {
				query,
				canonical_name: None,
				fuzzy: false,
				resolution: Resolution::NotFound,
			};
		};
		if fuzzy {
			tracing::debug!(name = %query, matched = %record.name, "fuzzy price lookup");
		}

		let resolution = match item.tier() {
			LpTier::Tier(requested) => std::iter::once(requested)
				.chain(requested.below())
				.find(|t| record.price(*t).is_some())
				.map_or(Resolution::NoPrice { requested }, |t| Resolution::Priced {
					requested,
					entry: TierPrice::of(record, t),
				}),
			LpTier::Unresolved => Resolution::AllTiers(
				Tier::all()
					.filter(|t| record.has_entry(*t))
					.map(|t| TierPrice::of(record, t))
					.collect(),
			),
		};

		ResolvedLookup {
			query,
			canonical_name: Some(record.name.clone()),
			fuzzy,
			resolution,
		}
	}
}
