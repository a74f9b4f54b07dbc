//! Price data: tiered item records, their durable store and price resolution.

mod legacy;
mod record;
pub use record::*;
mod resolve;
pub use resolve::*;
mod store;
pub use store::*;

/// Default location of the price store.
pub fn default_store_path() -> Option<std::path::PathBuf> {
	dirs::data_dir().map(|p| p.join("pricer").join("prices.json"))
}
