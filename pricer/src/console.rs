//! Line-based front-end on stdin.
//!
//! Plain lines are action names or bound key names and go to the dispatcher.
//! Lines starting with `:` edit the price store or the settings.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result, anyhow, bail};
use data::{PriceStore, Tier};
use ie::TemplateRole;

use crate::config::{Settings, SettingsHandle};
use crate::dispatch::{Action, Dispatched, Dispatcher};
use crate::overlay::format_price;
use crate::tr;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	Trigger(Action),
	Price {
		name: String,
		tier: Tier,
		price: Option<f64>,
		comment: Option<String>,
	},
	Notes {
		name: String,
		notes: Option<String>,
	},
	Delete(String),
	/// Items seen on screen that have no record yet.
	PendingList,
	PendingDelete(String),
	Rename {
		old: String,
		new: String,
	},
	Threshold {
		role: TemplateRole,
		value: Option<f32>,
	},
	Lifetime(u64),
	List,
	Quit,
}

impl Command {
	/// Parse one input line; blank lines yield `None`.
	pub fn parse(line: &str, settings: &Settings) -> Result<Option<Self>> {
		let line = line.trim();
		if line.is_empty() {
			return Ok(None);
		}

		let Some(rest) = line.strip_prefix(':') else {
			let action = line
				.parse::<Action>()
				.ok()
				.or_else(|| settings.action_for_key(line))
				.ok_or_else(|| anyhow!("unknown action or key {line:?}"))?;
			return Ok(Some(Self::Trigger(action)));
		};

		let (verb, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
		let args = args.trim();
		let command = match verb.to_ascii_lowercase().as_str() {
			"price" => {
				let mut parts = args.split('|').map(str::trim);
				let name = required(parts.next(), "item name")?;
				let tier = parts.next().unwrap_or_default();
				let tier = tier
					.parse::<u8>()
					.ok()
					.and_then(Tier::new)
					.with_context(|| format!("LP tier must be 0-{}, got {tier:?}", Tier::MAX))?;
				let price = match parts.next().filter(|v| !v.is_empty() && *v != "-") {
					Some(v) => Some(v.parse::<f64>().with_context(|| format!("invalid price {v:?}"))?),
					None => None,
				};
				let comment = parts.next().filter(|v| !v.is_empty()).map(str::to_string);
				Self::Price { name, tier, price, comment }
			}
			"notes" => {
				let (name, notes) = args.split_once('|').unwrap_or((args, ""));
				let notes = Some(notes.trim()).filter(|v| !v.is_empty()).map(str::to_string);
				Self::Notes {
					name: required(Some(name.trim()), "item name")?,
					notes,
				}
			}
			"delete" => Self::Delete(required(Some(args), "item name")?),
			"pending" => match args.split_once(char::is_whitespace).unwrap_or((args, "")) {
				("", _) => Self::PendingList,
				(sub, name) if sub.eq_ignore_ascii_case("delete") => Self::PendingDelete(required(Some(name.trim()), "item name")?),
				_ => bail!("usage: :pending [delete <name>]"),
			},
			"rename" => {
				let (old, new) = args.split_once('|').context("usage: :rename <old> | <new>")?;
				Self::Rename {
					old: required(Some(old.trim()), "old name")?,
					new: required(Some(new.trim()), "new name")?,
				}
			}
			"threshold" => {
				let (role, value) = args.split_once(char::is_whitespace).context("usage: :threshold <role> <value|off>")?;
				let role = parse_role(role)?;
				let value = match value.trim() {
					"off" => None,
					v => {
						let v = v.parse::<f32>().with_context(|| format!("invalid threshold {v:?}"))?;
						if !(0.0..=1.0).contains(&v) {
							bail!("threshold must be within 0-1, got {v}");
						}
						Some(v)
					}
				};
				Self::Threshold { role, value }
			}
			"lifetime" => Self::Lifetime(args.parse::<u64>().with_context(|| format!("invalid lifetime {args:?}"))?),
			"list" => Self::List,
			"quit" | "q" => Self::Quit,
			other => bail!("unknown command :{other}"),
		};
		Ok(Some(command))
	}
}

fn required(part: Option<&str>, what: &str) -> Result<String> {
	match part {
		Some(v) if !v.is_empty() => Ok(v.to_string()),
		_ => bail!("missing {what}"),
	}
}

fn parse_role(text: &str) -> Result<TemplateRole> {
	match text.trim().to_ascii_lowercase().replace('-', "_").as_str() {
		"item_name" | "name" => Ok(TemplateRole::ItemName),
		"lp_tier_marker" | "tier" => Ok(TemplateRole::LpTierMarker),
		"price_line" | "price" => Ok(TemplateRole::PriceLine),
		other => bail!("unknown template role {other:?}"),
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
	Continue,
	Quit,
}

pub struct Console {
	dispatcher: Dispatcher,
	store: Arc<RwLock<PriceStore>>,
	settings: SettingsHandle,
	/// Where settings changes are saved; `None` keeps them in memory.
	settings_path: Option<PathBuf>,
}

impl Console {
	pub fn new(dispatcher: Dispatcher, store: Arc<RwLock<PriceStore>>, settings: SettingsHandle, settings_path: Option<PathBuf>) -> Self {
		Self {
			dispatcher,
			store,
			settings,
			settings_path,
		}
	}

	/// Read commands until `:quit` or end of input.
	pub fn run(&self, input: impl BufRead, mut out: impl Write) -> Result<()> {
		for line in input.lines() {
			let line = line.context("read console input")?;
			let settings = self.settings.snapshot();
			let command = match Command::parse(&line, &settings) {
				Ok(Some(command)) => command,
				Ok(None) => continue,
				Err(err) => {
					writeln!(out, "{}", tr!("console-error", error = format!("{err:#}")))?;
					continue;
				}
			};

			match self.execute(command, &mut out) {
				Ok(Flow::Quit) => break,
				Ok(Flow::Continue) => {}
				Err(err) => {
					tracing::warn!(error = %format!("{err:#}"), "console command failed");
					writeln!(out, "{}", tr!("console-error", error = format!("{err:#}")))?;
				}
			}
		}
		Ok(())
	}

	pub fn execute(&self, command: Command, out: &mut dyn Write) -> Result<Flow> {
		match command {
			Command::Trigger(action) => match self.dispatcher.dispatch(action) {
				Dispatched::Started(_) | Dispatched::Forwarded => {}
				Dispatched::Dropped => tracing::info!(action = action.name(), "run already in flight"),
			},
			Command::Price { name, tier, price, comment } => {
				let saved = self.edit_store(|store| Ok(store.upsert(&name, tier, price, comment.as_deref())?.name.clone()))?;
				writeln!(out, "{}", tr!("console-saved", name = saved, tier = tier.to_string()))?;
			}
			Command::Notes { name, notes } => {
				self.edit_store(|store| Ok(store.set_notes(&name, notes.as_deref())?))?;
				writeln!(out, "{}", tr!("console-notes", name = name))?;
			}
			Command::Delete(name) => {
				let count = self.edit_store(|store| Ok(store.remove([&name])))?;
				writeln!(out, "{}", tr!("console-deleted", count = count.to_string()))?;
			}
			Command::PendingList => self.list_pending(out)?,
			Command::PendingDelete(name) => {
				let count = self.edit_store(|store| Ok(store.remove_pending([&name])))?;
				writeln!(out, "{}", tr!("console-pending-deleted", count = count.to_string()))?;
			}
			Command::Rename { old, new } => {
				self.edit_store(|store| Ok(store.rename(&old, &new)?))?;
				writeln!(out, "{}", tr!("console-renamed", old = old, new = new))?;
			}
			Command::Threshold { role, value } => {
				self.edit_settings(|s| s.thresholds.set(role, value))?;
				let value = value.map_or_else(|| "off".to_string(), |v| v.to_string());
				writeln!(out, "{}", tr!("console-threshold", role = format!("{role:?}"), value = value))?;
			}
			Command::Lifetime(ms) => {
				self.edit_settings(|s| s.overlay.lifetime_ms = ms)?;
				writeln!(out, "{}", tr!("console-lifetime", ms = ms.to_string()))?;
			}
			Command::List => self.list(out)?,
			Command::Quit => return Ok(Flow::Quit),
		}
		Ok(Flow::Continue)
	}

	/// Apply `f` under the write lock and persist if it succeeded.
	///
	/// If the file can't be written the edit is undone, so memory never
	/// holds changes the disk doesn't.
	fn edit_store<T>(&self, f: impl FnOnce(&mut PriceStore) -> Result<T>) -> Result<T> {
		let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
		let before = store.clone();
		let value = f(&mut store)?;
		if let Err(err) = store.persist() {
			*store = before;
			bail!(tr!("console-not-saved", error = err.to_string()));
		}
		Ok(value)
	}

	fn edit_settings(&self, f: impl FnOnce(&mut Settings)) -> Result<()> {
		let settings = self.settings.update(f);
		if let Some(path) = &self.settings_path {
			settings.save_to(path)?;
		}
		Ok(())
	}

	fn list_pending(&self, out: &mut dyn Write) -> Result<()> {
		let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
		if store.pending().is_empty() {
			writeln!(out, "{}", tr!("console-pending-empty"))?;
		}
		for item in store.pending() {
			match item.potential {
				Some(tier) => writeln!(out, "{} (LP{tier})", item.name)?,
				None => writeln!(out, "{}", item.name)?,
			}
		}
		Ok(())
	}

	fn list(&self, out: &mut dyn Write) -> Result<()> {
		let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
		if store.is_empty() {
			writeln!(out, "{}", tr!("console-empty"))?;
			return Ok(());
		}
		for record in store.records() {
			let entries = Tier::all()
				.filter(|tier| record.has_entry(*tier))
				.map(|tier| {
					let mut text = format!("LP{tier}");
					if let Some(price) = record.price(tier) {
						text.push(' ');
						text.push_str(&format_price(price));
					}
					if let Some(comment) = record.comment(tier) {
						text.push(' ');
						text.push_str(comment);
					}
					text
				})
				.collect::<Vec<_>>();
			write!(out, "{}: {}", record.name, entries.join(", "))?;
			if let Some(notes) = &record.notes {
				write!(out, " ({notes})")?;
			}
			writeln!(out)?;
		}
		Ok(())
	}
}
