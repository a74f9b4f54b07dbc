use std::{
	collections::{HashMap, HashSet},
	fs::File,
	io::{BufWriter, Write},
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

use crate::{ItemRecord, LpTier, PendingItem, Tier, legacy};

/// Store key for an item name: trimmed and lowercased.
pub fn normalize_name(name: &str) -> String {
	name.trim().to_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("failed to access price store {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("price store {path} is corrupt: {reason}")]
	Corruption { path: PathBuf, reason: String },
	#[error("price must be a finite number, got {0}")]
	InvalidPrice(f64),
	#[error("item name must not be blank")]
	BlankName,
	#[error("an item named {0:?} already exists")]
	Collision(String),
	#[error("no item named {0:?}")]
	NotFound(String),
}

/// Persistent price records, in first-insertion order.
///
/// The order is kept as an explicit key list instead of relying on map
/// iteration, and is written out as `known_order` next to the records.
/// Items seen without a record are kept in a `pending` list until priced.
#[derive(Debug, Clone, Default)]
pub struct PriceStore {
	path: Option<PathBuf>,
	records: HashMap<String, ItemRecord>,
	order: Vec<String>,
	pending: Vec<PendingItem>,
}

impl PriceStore {
	/// A store that is never written to disk.
	pub fn in_memory() -> Self {
		Self::default()
	}

	/// Load the store at `path`. A missing file is an empty store.
	pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let json = match std::fs::read_to_string(&path) {
			Ok(v) => v,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
				tracing::info!(path = %path.display(), "price store missing; starting empty");
				return Ok(Self {
					path: Some(path),
					..Default::default()
				});
			}
			Err(source) => return Err(StoreError::Io { path, source }),
		};

		let corrupt = |reason: String| StoreError::Corruption {
			path: path.clone(),
			reason,
		};

		let raw: RawStore = serde_json::from_str(&json).map_err(|err| corrupt(err.to_string()))?;
		let (records, order) = match raw.known {
			Value::Null => {
				if raw.known_order.as_ref().is_some_and(|v| !v.is_empty()) {
					return Err(corrupt("known_order lists items but `known` is missing".to_string()));
				}
				(HashMap::new(), Vec::new())
			}
			Value::Array(_) => {
				let entries = serde_json::from_value(raw.known).map_err(|err| corrupt(format!("legacy list: {err}")))?;
				let (records, order) = legacy::migrate(entries);
				tracing::info!(path = %path.display(), items = order.len(), "migrated legacy price list");
				(records, order)
			}
			Value::Object(_) => {
				let records: HashMap<String, ItemRecord> =
					serde_json::from_value(raw.known).map_err(|err| corrupt(format!("known: {err}")))?;
				let order = raw.known_order.unwrap_or_default();
				validate(&records, &order).map_err(corrupt)?;
				(records, order)
			}
			_ => return Err(corrupt("`known` is neither a map nor a list".to_string())),
		};

		let mut seen = HashSet::new();
		let pending = raw
			.pending
			.into_iter()
			.filter(|v| {
				let key = normalize_name(&v.name);
				!key.is_empty() && !records.contains_key(&key) && seen.insert(key)
			})
			.collect::<Vec<_>>();

		tracing::info!(path = %path.display(), items = order.len(), pending = pending.len(), "loaded price store");
		Ok(Self {
			path: Some(path),
			records,
			order,
			pending,
		})
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	/// Atomically replace the file on disk with the current contents.
	pub fn persist(&self) -> Result<(), StoreError> {
		let Some(path) = &self.path else {
			return Ok(());
		};
		let io = |source: std::io::Error| StoreError::Io {
			path: path.clone(),
			source,
		};

		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent).map_err(io)?;
		}

		let tmp = path.with_extension("json.tmp");
		let file = File::create(&tmp).map_err(io)?;
		let mut writer = BufWriter::new(file);
		serde_json::to_writer_pretty(&mut writer, &StoreFile(self)).map_err(|err| io(err.into()))?;
		writer.flush().map_err(io)?;
		drop(writer);

		// Replace existing file (Windows-friendly).
		if std::fs::rename(&tmp, path).is_err() {
			let _ = std::fs::remove_file(path);
			std::fs::rename(&tmp, path).map_err(io)?;
		}

		tracing::debug!(path = %path.display(), items = self.order.len(), "persisted price store");
		Ok(())
	}

	/// Set the price and comment of one tier, creating the record if needed.
	///
	/// New names are appended to the order; existing ones keep their position.
	pub fn upsert(&mut self, name: &str, tier: Tier, price: Option<f64>, comment: Option<&str>) -> Result<&ItemRecord, StoreError> {
		if let Some(price) = price.filter(|v| !v.is_finite()) {
			return Err(StoreError::InvalidPrice(price));
		}
		let key = normalize_name(name);
		if key.is_empty() {
			return Err(StoreError::BlankName);
		}

		self.pending.retain(|v| normalize_name(&v.name) != key);
		let record = self.records.entry(key.clone()).or_insert_with(|| {
			self.order.push(key);
			ItemRecord::new(name.trim())
		});
		record.set(tier, price, comment.map(|v| v.trim().to_string()));
		Ok(record)
	}

	pub fn lookup(&self, name: &str) -> Option<&ItemRecord> {
		self.records.get(&normalize_name(name))
	}

	pub fn known_order(&self) -> &[String] {
		&self.order
	}

	/// Records in first-insertion order.
	pub fn records(&self) -> impl Iterator<Item = &ItemRecord> {
		self.order.iter().filter_map(|key| self.records.get(key))
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	/// Delete the named records. Returns how many existed.
	pub fn remove<I, S>(&mut self, names: I) -> usize
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let targets = names
			.into_iter()
			.map(|v| normalize_name(v.as_ref()))
			.collect::<HashSet<_>>();
		let before = self.records.len();
		self.records.retain(|key, _| !targets.contains(key));
		self.order.retain(|key| !targets.contains(key));
		before - self.records.len()
	}

	/// Give a record a new name without moving it in the order.
	pub fn rename(&mut self, old: &str, new: &str) -> Result<(), StoreError> {
		let old_key = normalize_name(old);
		let new_key = normalize_name(new);
		if new_key.is_empty() {
			return Err(StoreError::BlankName);
		}
		if new_key != old_key && self.records.contains_key(&new_key) {
			return Err(StoreError::Collision(new.trim().to_string()));
		}

		let mut record = self
			.records
			.remove(&old_key)
			.ok_or_else(|| StoreError::NotFound(old.trim().to_string()))?;
		record.name = new.trim().to_string();
		self.pending.retain(|v| normalize_name(&v.name) != new_key);
		self.records.insert(new_key.clone(), record);
		if let Some(slot) = self.order.iter_mut().find(|key| **key == old_key) {
			*slot = new_key;
		}
		Ok(())
	}

	pub fn set_notes(&mut self, name: &str, notes: Option<&str>) -> Result<(), StoreError> {
		let record = self
			.records
			.get_mut(&normalize_name(name))
			.ok_or_else(|| StoreError::NotFound(name.trim().to_string()))?;
		record.notes = notes.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
		Ok(())
	}

	/// Items seen on screen without a record, oldest first.
	pub fn pending(&self) -> &[PendingItem] {
		&self.pending
	}

	/// Remember an item that was looked up but has no record.
	///
	/// Returns whether anything changed: a new entry, or a tier filled in on
	/// an existing one. Known and blank names are ignored.
	pub fn note_pending(&mut self, name: &str, tier: LpTier) -> bool {
		let key = normalize_name(name);
		if key.is_empty() || self.records.contains_key(&key) {
			return false;
		}
		match self.pending.iter_mut().find(|v| normalize_name(&v.name) == key) {
			Some(item) if item.potential.is_none() && tier.tier().is_some() => {
				item.potential = tier.tier();
				true
			}
			Some(_) => false,
			None => {
				self.pending.push(PendingItem::new(name, tier.tier()));
				true
			}
		}
	}

	/// Drop the named pending entries. Returns how many existed.
	pub fn remove_pending<I, S>(&mut self, names: I) -> usize
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let targets = names
			.into_iter()
			.map(|v| normalize_name(v.as_ref()))
			.collect::<HashSet<_>>();
		let before = self.pending.len();
		self.pending.retain(|v| !targets.contains(&normalize_name(&v.name)));
		before - self.pending.len()
	}

	/// Closest record by edit distance, for names read off the screen.
	///
	/// Very short names are never guessed; ties go to the earlier record.
	pub fn find_closest(&self, name: &str, tolerance: usize) -> Option<&ItemRecord> {
		let key = normalize_name(name);
		if key.chars().count() < 3 {
			return None;
		}
		if let Some(record) = self.records.get(&key) {
			return Some(record);
		}

		let mut best: Option<(&str, usize)> = None;
		for candidate in &self.order {
			let distance = levenshtein::levenshtein(&key, candidate);
			if distance <= tolerance && best.is_none_or(|(_, d)| distance < d) {
				best = Some((candidate, distance));
			}
		}
		best.and_then(|(key, _)| self.records.get(key))
	}
}

#[derive(Deserialize)]
struct RawStore {
	#[serde(default)]
	known: Value,
	#[serde(default)]
	known_order: Option<Vec<String>>,
	#[serde(default)]
	pending: Vec<PendingItem>,
}

/// `{"known": {...}, "known_order": [...], "pending": [...]}` with records written in order.
struct StoreFile<'a>(&'a PriceStore);

impl Serialize for StoreFile<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(3))?;
		map.serialize_entry("known", &OrderedRecords(self.0))?;
		map.serialize_entry("known_order", &self.0.order)?;
		map.serialize_entry("pending", &self.0.pending)?;
		map.end()
	}
}

struct OrderedRecords<'a>(&'a PriceStore);

impl Serialize for OrderedRecords<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.0.order.len()))?;
		for key in &self.0.order {
			if let Some(record) = self.0.records.get(key) {
				map.serialize_entry(key, record)?;
			}
		}
		map.end()
	}
}

fn validate(records: &HashMap<String, ItemRecord>, order: &[String]) -> Result<(), String> {
	let mut seen = HashSet::with_capacity(order.len());
	for key in order {
		if !seen.insert(key.as_str()) {
			return Err(format!("known_order lists {key:?} twice"));
		}
		if !records.contains_key(key) {
			return Err(format!("known_order lists {key:?} which has no record"));
		}
	}
	if seen.len() != records.len() {
		let missing = records.keys().find(|k| !seen.contains(k.as_str())).cloned().unwrap_or_default();
		return Err(format!("record {missing:?} is missing from known_order"));
	}
	for (key, record) in records {
		if normalize_name(&record.name) != *key {
			return Err(format!("key {key:?} does not match record name {:?}", record.name));
		}
	}
	Ok(())
}
