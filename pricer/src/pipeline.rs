//! One detection run: capture, match, extract, resolve, compose.

use std::sync::{Arc, PoisonError, RwLock};

use data::{LpTier, PriceResolver, PriceStore, ResolvedLookup};
use ie::{CaptureFrame, FieldExtractor, FieldKind, MatchError, MatchResult, ParsedItem, Point, Recognizer, TemplateMatcher, TemplateRole, TemplateScope, TemplateSet};

use crate::capture::{CaptureArea, CaptureError, CaptureSource, capture_with_timeout};
use crate::config::Settings;
use crate::dedupe::InventoryDeduper;
use crate::dispatch::{RunClass, RunState, Severity};
use crate::dumps::DebugDumps;
use crate::overlay::{OverlayComposer, OverlayHint, PlateStyle, TextMetrics};
use crate::watch::TemplateLibrary;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
	#[error("screen capture failed: {0}")]
	CaptureFailure(#[from] CaptureError),
	#[error("templates are stale: {0}")]
	TemplateStale(#[from] MatchError),
	#[error(transparent)]
	ParseFailure(#[from] ie::ExtractError),
	#[error(transparent)]
	StoreCorruption(data::StoreError),
	/// The store file could not be read or written.
	#[error(transparent)]
	StoreUnavailable(data::StoreError),
}

impl From<data::StoreError> for PipelineError {
	fn from(err: data::StoreError) -> Self {
		match err {
			data::StoreError::Io { .. } => Self::StoreUnavailable(err),
			_ => Self::StoreCorruption(err),
		}
	}
}

impl PipelineError {
	pub fn severity(&self) -> Severity {
		match self {
			Self::CaptureFailure(_) | Self::TemplateStale(_) | Self::ParseFailure(_) => Severity::Warn,
			Self::StoreCorruption(_) | Self::StoreUnavailable(_) => Severity::Error,
		}
	}

	/// Localized status line for the user.
	pub fn status_text(&self) -> String {
		match self {
			Self::CaptureFailure(err) => crate::tr!("status-capture-failed", error = err.to_string()),
			Self::TemplateStale(err) => crate::tr!("status-template-stale", error = err.to_string()),
			Self::ParseFailure(_) => crate::tr!("status-name-unreadable"),
			Self::StoreCorruption(err) => crate::tr!("status-store-corrupt", error = err.to_string()),
			Self::StoreUnavailable(err) => crate::tr!("status-store-unreadable", error = err.to_string()),
		}
	}
}

pub struct Pipeline {
	source: Arc<dyn CaptureSource>,
	templates: TemplateLibrary,
	store: Arc<RwLock<PriceStore>>,
	recognizer: Arc<dyn Recognizer>,
	metrics: Arc<dyn TextMetrics>,
}

impl Pipeline {
	pub fn new(
		source: Arc<dyn CaptureSource>,
		templates: TemplateLibrary,
		store: Arc<RwLock<PriceStore>>,
		recognizer: Arc<dyn Recognizer>,
		metrics: Arc<dyn TextMetrics>,
	) -> Self {
		Self {
			source,
			templates,
			store,
			recognizer,
			metrics,
		}
	}

	pub fn templates(&self) -> &TemplateLibrary {
		&self.templates
	}

	/// Run every stage for `class`, reporting each stage as it is entered.
	pub fn run(&self, class: RunClass, settings: &Settings, stage: &mut dyn FnMut(RunState)) -> Result<Vec<OverlayHint>, PipelineError> {
		match class {
			RunClass::Single => self.run_single(settings, stage).map(|hint| vec![hint]),
			RunClass::Sweep => self.run_sweep(settings, stage),
		}
	}

	fn run_single(&self, settings: &Settings, stage: &mut dyn FnMut(RunState)) -> Result<OverlayHint, PipelineError> {
		stage(RunState::Capturing);
		let frame = capture_with_timeout(self.source.clone(), CaptureArea::FULL, settings.capture.timeout())?;

		stage(RunState::Matching);
		let set = self.templates.snapshot();
		let matcher = TemplateMatcher::new(settings.thresholds);
		let matched = matcher
			.find_best(&frame, &set, TemplateRole::ItemName, TemplateScope::Tooltip)
			.inspect_err(|_| dump_stale_frame(&frame, settings, "single"))?;
		let template = template_of(&set, &matched)?;

		stage(RunState::Extracting);
		let mut item = FieldExtractor::new(&*self.recognizer).extract(&frame, &matched, template)?;
		if item.tier == LpTier::Unresolved {
			item.tier = match matcher.find_best(&frame, &set, TemplateRole::LpTierMarker, TemplateScope::Tooltip) {
				Ok(marker) => set.get(&marker.template_id).map(ie::tier_from_marker).unwrap_or_default(),
				Err(err) => {
					tracing::debug!(error = %err, "no tier marker");
					LpTier::Unresolved
				}
			};
		}

		stage(RunState::Resolving);
		let lookup = {
			let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
			PriceResolver::new(settings.name_match_tolerance).resolve(&store, &item)
		};
		self.note_misses([(&item, &lookup)]);

		stage(RunState::Rendering);
		let hint = self.composer(settings).compose(&item, &lookup, hint_anchor(&frame, &item, settings));
		tracing::info!(item = %hint.item_name, tier = ?hint.tier, price = ?hint.price, score = item.score, "single capture resolved");
		Ok(hint)
	}

	fn run_sweep(&self, settings: &Settings, stage: &mut dyn FnMut(RunState)) -> Result<Vec<OverlayHint>, PipelineError> {
		stage(RunState::Capturing);
		let frame = capture_with_timeout(self.source.clone(), settings.capture.sweep_area, settings.capture.timeout())?;

		stage(RunState::Matching);
		let set = self.templates.snapshot();
		let matcher = TemplateMatcher::new(settings.thresholds);
		let matches = matcher
			.find_all(&frame, &set, TemplateRole::ItemName, TemplateScope::Inventory)
			.and_then(|v| {
				if v.is_empty() {
					Err(MatchError::BelowThreshold {
						role: TemplateRole::ItemName,
						best: None,
					})
				} else {
					Ok(v)
				}
			})
			.inspect_err(|_| dump_stale_frame(&frame, settings, "sweep"))?;
		let markers = matcher
			.find_all(&frame, &set, TemplateRole::LpTierMarker, TemplateScope::Inventory)
			.unwrap_or_else(|err| {
				tracing::debug!(error = %err, "no tier markers in sweep");
				Vec::new()
			});

		stage(RunState::Extracting);
		let extractor = FieldExtractor::new(&*self.recognizer);
		let mut items = Vec::with_capacity(matches.len());
		let mut first_error = None;
		for matched in &matches {
			let template = template_of(&set, matched)?;
			match extractor.extract(&frame, matched, template) {
				Ok(mut item) => {
					if item.tier == LpTier::Unresolved {
						item.tier = marker_tier(&item, template, &markers, &set);
					}
					items.push(item);
				}
				Err(err) => {
					tracing::debug!(error = %err, bbox = ?matched.bbox, "skipping unreadable sweep item");
					first_error.get_or_insert(err);
				}
			}
		}
		if items.is_empty()
			&& let Some(err) = first_error
		{
			return Err(err.into());
		}

		stage(RunState::Resolving);
		let lookups = {
			let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
			let resolver = PriceResolver::new(settings.name_match_tolerance);
			items.iter().map(|item| resolver.resolve(&store, item)).collect::<Vec<_>>()
		};
		self.note_misses(items.iter().zip(&lookups));

		stage(RunState::Rendering);
		let composer = self.composer(settings);
		let hints = items
			.iter()
			.zip(&lookups)
			.map(|(item, lookup)| composer.compose(item, lookup, hint_anchor(&frame, item, settings)))
			.collect::<Vec<_>>();
		let found = hints.len();
		let hints = InventoryDeduper::default().dedupe(hints);
		tracing::info!(found, shown = hints.len(), "sweep resolved");
		Ok(hints)
	}

	/// Add names with no record to the store's pending list and save it.
	///
	/// A failed save is logged; the run still shows its overlay.
	fn note_misses<'a>(&self, resolved: impl IntoIterator<Item = (&'a ParsedItem, &'a ResolvedLookup)>) {
		let misses = resolved.into_iter().filter(|(_, lookup)| lookup.is_miss()).collect::<Vec<_>>();
		if misses.is_empty() {
			return;
		}

		let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
		let mut changed = false;
		for (item, _) in misses {
			changed |= store.note_pending(&item.name, item.tier);
		}
		if changed && let Err(err) = store.persist() {
			tracing::warn!(error = %err, "failed to save pending items");
		}
	}

	fn composer(&self, settings: &Settings) -> OverlayComposer<'_> {
		OverlayComposer::new(
			&*self.metrics,
			PlateStyle {
				padding: settings.overlay.padding,
				line_gap: settings.overlay.line_gap,
			},
		)
	}
}

/// Save the frame that failed to match, if enabled in settings.
fn dump_stale_frame(frame: &CaptureFrame, settings: &Settings, tag: &str) {
	if !settings.debug_images.enabled {
		return;
	}
	let saved = settings
		.debug_images
		.dir()
		.and_then(|dir| DebugDumps::new(dir, settings.debug_images.quota_mb).save(frame, tag));
	match saved {
		Ok(path) => tracing::info!(path = %path.display(), "saved unmatched capture"),
		Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to save unmatched capture"),
	}
}

fn template_of<'a>(set: &'a TemplateSet, matched: &MatchResult) -> Result<&'a ie::Template, MatchError> {
	set.get(&matched.template_id).ok_or(MatchError::NoTemplates { role: matched.role })
}

/// Screen position of a hint: below the matched template, shifted by the configured offset.
fn hint_anchor(frame: &CaptureFrame, item: &ParsedItem, settings: &Settings) -> Point {
	let offset = settings.overlay.offset;
	frame
		.to_screen(Point::new(item.bbox.x, item.bbox.bottom()))
		.offset(offset.x, offset.y)
}

/// Tier of the marker that sits in the item's LP tier region, if any.
fn marker_tier(item: &ParsedItem, template: &ie::Template, markers: &[MatchResult], set: &TemplateSet) -> LpTier {
	let regions = template
		.fields_of(FieldKind::LpTier)
		.map(|v| v.rect.translated(item.anchor))
		.collect::<Vec<_>>();

	markers
		.iter()
		.find(|m| regions.iter().any(|r| r.iou(&m.bbox) > 0.0))
		.and_then(|m| set.get(&m.template_id))
		.map(ie::tier_from_marker)
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use data::Tier;
	use ie::Rect;
	use ie::template::FieldRegion;

	use super::*;
	use crate::overlay::ColorCategory;
	use crate::testing::{self, StaticSource, header, marker, screen, template};

	fn tooltip_templates(name: Option<&str>, tier: &str) -> Vec<ie::Template> {
		vec![
			template("name", TemplateRole::ItemName, TemplateScope::Tooltip, name, header()),
			template("tier", TemplateRole::LpTierMarker, TemplateScope::Tooltip, Some(tier), marker()),
		]
	}

	fn run(pipeline: &Pipeline, class: RunClass) -> (Result<Vec<OverlayHint>, PipelineError>, Vec<RunState>) {
		let mut stages = Vec::new();
		let result = pipeline.run(class, &Settings::default(), &mut |v| stages.push(v));
		(result, stages)
	}

	#[test]
	fn single_capture_prices_detected_tier() {
		let source = StaticSource(screen(&[(&header(), (10, 10)), (&marker(), (30, 30))]));
		let pipeline = testing::pipeline(Arc::new(source), tooltip_templates(Some("Exsanguinous"), "3"));

		let (result, stages) = run(&pipeline, RunClass::Single);
		let hints = result.unwrap();
		assert_eq!(hints.len(), 1);

		let hint = &hints[0];
		assert_eq!(hint.tier, LpTier::Tier(Tier::new(3).unwrap()));
		assert_eq!(hint.price, Some(150000.0));
		assert_eq!(hint.color, ColorCategory::HighValue);
		let texts = hint.lines.iter().map(|v| v.text.as_str()).collect::<Vec<_>>();
		assert_eq!(texts, vec!["Exsanguinous", "150000 BiS"]);
		// Bottom-left of the 8x6 match, in screen space, plus the default offset.
		assert_eq!(hint.anchor, Point::new(1010, 524));

		assert_eq!(
			stages,
			vec![RunState::Capturing, RunState::Matching, RunState::Extracting, RunState::Resolving, RunState::Rendering]
		);
	}

	#[test]
	fn unknown_item_is_a_miss() {
		let source = StaticSource(screen(&[(&header(), (10, 10)), (&marker(), (30, 30))]));
		let pipeline = testing::pipeline(Arc::new(source), tooltip_templates(Some("Unknown Relic"), "2"));

		let hints = run(&pipeline, RunClass::Single).0.unwrap();
		assert_eq!(hints[0].color, ColorCategory::Miss);
		assert_eq!(hints[0].lines.len(), 1);
		assert_eq!(hints[0].lines[0].text, "Unknown Relic");

		let store = pipeline.store.read().unwrap();
		assert_eq!(store.pending().len(), 1);
		assert_eq!(store.pending()[0].name, "Unknown Relic");
		assert_eq!(store.pending()[0].potential, Some(Tier::new(2).unwrap()));
	}

	#[test]
	fn blank_screen_is_stale() {
		let pipeline = testing::pipeline(Arc::new(StaticSource(screen(&[]))), tooltip_templates(Some("Exsanguinous"), "3"));

		let (result, stages) = run(&pipeline, RunClass::Single);
		let err = result.unwrap_err();
		assert!(matches!(err, PipelineError::TemplateStale(MatchError::BelowThreshold { .. })), "{err:?}");
		assert_eq!(err.severity(), Severity::Warn);
		assert_eq!(stages, vec![RunState::Capturing, RunState::Matching]);
	}

	#[test]
	fn stale_frame_is_saved_when_enabled() {
		let tmp = tempfile::tempdir().unwrap();
		let pipeline = testing::pipeline(Arc::new(StaticSource(screen(&[]))), tooltip_templates(Some("Exsanguinous"), "3"));
		let mut settings = Settings::default();
		settings.debug_images.enabled = true;
		settings.debug_images.dir = Some(tmp.path().join("logs"));

		let err = pipeline.run(RunClass::Single, &settings, &mut |_| {}).unwrap_err();
		assert!(matches!(err, PipelineError::TemplateStale(_)), "{err:?}");

		let saved = std::fs::read_dir(tmp.path().join("logs"))
			.unwrap()
			.map(|v| v.unwrap().file_name().to_string_lossy().into_owned())
			.collect::<Vec<_>>();
		assert_eq!(saved.len(), 1);
		assert!(saved[0].ends_with("_single.png"), "{saved:?}");
	}

	#[test]
	fn stale_frame_is_not_saved_by_default() {
		let tmp = tempfile::tempdir().unwrap();
		let pipeline = testing::pipeline(Arc::new(StaticSource(screen(&[]))), tooltip_templates(Some("Exsanguinous"), "3"));
		let mut settings = Settings::default();
		settings.debug_images.dir = Some(tmp.path().join("logs"));

		assert!(pipeline.run(RunClass::Single, &settings, &mut |_| {}).is_err());
		assert!(!tmp.path().join("logs").exists());
	}

	#[test]
	fn store_errors_are_told_apart() {
		let io = data::StoreError::Io {
			path: "prices.json".into(),
			source: std::io::Error::other("denied"),
		};
		let err = PipelineError::from(io);
		assert!(matches!(err, PipelineError::StoreUnavailable(_)), "{err:?}");
		assert_eq!(err.severity(), Severity::Error);
		assert!(err.status_text().starts_with("Could not read or write"), "{}", err.status_text());

		let corrupt = data::StoreError::Corruption {
			path: "prices.json".into(),
			reason: "bad".into(),
		};
		assert!(matches!(PipelineError::from(corrupt), PipelineError::StoreCorruption(_)));
	}

	#[test]
	fn resolution_change_is_stale() {
		let mut templates = tooltip_templates(Some("Exsanguinous"), "3");
		templates[0].calibration.width = 1920;
		let source = StaticSource(screen(&[(&header(), (10, 10))]));
		let pipeline = testing::pipeline(Arc::new(source), templates);

		let err = run(&pipeline, RunClass::Single).0.unwrap_err();
		assert!(matches!(err, PipelineError::TemplateStale(MatchError::DimensionMismatch { .. })), "{err:?}");
	}

	#[test]
	fn unreadable_name_fails_the_run() {
		let source = StaticSource(screen(&[(&header(), (10, 10))]));
		let pipeline = testing::pipeline(Arc::new(source), tooltip_templates(None, "3"));

		let err = run(&pipeline, RunClass::Single).0.unwrap_err();
		assert!(matches!(err, PipelineError::ParseFailure(_)), "{err:?}");
	}

	#[test]
	fn sweep_caps_repeated_items() {
		let h = header();
		let source = StaticSource(screen(&[(&h, (2, 2)), (&h, (20, 2)), (&h, (38, 2)), (&h, (2, 20))]));
		let templates = vec![template("ruin", TemplateRole::ItemName, TemplateScope::Inventory, Some("Ruin"), header())];
		let pipeline = testing::pipeline(Arc::new(source), templates);

		let hints = run(&pipeline, RunClass::Sweep).0.unwrap();
		assert_eq!(hints.len(), 3);
		assert!(hints.iter().all(|v| v.item_name == "Ruin"));
		assert_eq!(hints[0].anchor, Point::new(1002, 516));
	}

	#[test]
	fn sweep_ignores_tooltip_templates() {
		let source = StaticSource(screen(&[(&header(), (10, 10))]));
		let pipeline = testing::pipeline(Arc::new(source), tooltip_templates(Some("Exsanguinous"), "3"));

		let err = run(&pipeline, RunClass::Sweep).0.unwrap_err();
		assert!(matches!(err, PipelineError::TemplateStale(MatchError::NoTemplates { .. })), "{err:?}");
	}

	#[test]
	fn sweep_assigns_markers_by_tier_region() {
		let h = header();
		let source = StaticSource(screen(&[(&h, (2, 2)), (&h, (2, 20)), (&marker(), (12, 2))]));
		let mut name = template("exs", TemplateRole::ItemName, TemplateScope::Inventory, Some("Exsanguinous"), header());
		// Right of the header; only the top item has a marker there.
		name.fields = vec![FieldRegion {
			kind: FieldKind::LpTier,
			rect: Rect::new(10, 0, 6, 6),
		}];
		let templates = vec![name, template("lp3", TemplateRole::LpTierMarker, TemplateScope::Inventory, Some("3"), marker())];
		let pipeline = testing::pipeline(Arc::new(source), templates);

		let hints = run(&pipeline, RunClass::Sweep).0.unwrap();
		assert_eq!(hints.len(), 2);
		let at = |y: i32| hints.iter().find(|v| v.anchor == Point::new(1002, y)).unwrap();
		let texts = |hint: &OverlayHint| hint.lines.iter().map(|v| v.text.clone()).collect::<Vec<_>>();

		let top = at(516);
		assert_eq!(top.tier, LpTier::Tier(Tier::new(3).unwrap()));
		assert_eq!(texts(top), vec!["Exsanguinous", "150000 BiS"]);

		let bottom = at(534);
		assert_eq!(bottom.tier, LpTier::Unresolved);
		assert_eq!(texts(bottom), vec!["Exsanguinous", "LP0: 50000", "LP3: 150000 BiS"]);
	}
}
