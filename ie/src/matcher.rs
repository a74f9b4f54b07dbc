//! Template matching against captured frames.
//!
//! Scores are normalized cross-correlation (`imageproc`), so a placement that
//! reproduces the reference exactly scores 1.0. Screen geometry is assumed to
//! be fixed between calibration and use: a frame whose dimensions differ from a
//! template's calibration frame is rejected instead of searched at other scales.

use image::{ImageBuffer, Luma};
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use serde::{Deserialize, Serialize};

use crate::{CaptureFrame, Point, Rect, Template, TemplateRole, TemplateScope, TemplateSet};

/// Placements overlapping more than this are considered the same object in a sweep.
const SWEEP_SUPPRESS_IOU: f32 = 0.35;
const MAX_PLACEMENTS_PER_TEMPLATE: usize = 32;

type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
	pub template_id: String,
	pub role: TemplateRole,
	/// Placement of the reference image, in frame coordinates.
	pub bbox: Rect,
	/// Normalized similarity in `[0, 1]`.
	pub score: f32,
	pub sequence: u32,
}

impl MatchResult {
	/// The calibrated anchor point of this placement, in frame coordinates.
	pub fn anchor(&self, template: &Template) -> Point {
		self.bbox.origin().offset(template.anchor.x, template.anchor.y)
	}

	/// Higher score wins; exact ties go to the earlier calibration.
	fn beats(&self, other: &MatchResult) -> bool {
		self.score > other.score || (self.score == other.score && self.sequence < other.sequence)
	}
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
	#[error("no {role:?} templates are calibrated")]
	NoTemplates { role: TemplateRole },
	#[error("template {template} was calibrated for {expected:?}, frame is {actual:?}")]
	DimensionMismatch {
		template: String,
		expected: (u32, u32),
		actual: (u32, u32),
	},
	#[error("no {role:?} template cleared its threshold (best score {best:?})")]
	BelowThreshold { role: TemplateRole, best: Option<f32> },
}

/// Per-role replacement for the calibrated thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOverrides {
	pub item_name: Option<f32>,
	pub lp_tier_marker: Option<f32>,
	pub price_line: Option<f32>,
}

impl ThresholdOverrides {
	pub fn for_role(&self, role: TemplateRole) -> Option<f32> {
		match role {
			TemplateRole::ItemName => self.item_name,
			TemplateRole::LpTierMarker => self.lp_tier_marker,
			TemplateRole::PriceLine => self.price_line,
		}
	}

	pub fn set(&mut self, role: TemplateRole, value: Option<f32>) {
		let value = value.map(|v| v.clamp(0.0, 1.0));
		match role {
			TemplateRole::ItemName => self.item_name = value,
			TemplateRole::LpTierMarker => self.lp_tier_marker = value,
			TemplateRole::PriceLine => self.price_line = value,
		}
	}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateMatcher {
	overrides: ThresholdOverrides,
}

impl TemplateMatcher {
	pub fn new(overrides: ThresholdOverrides) -> Self {
		Self { overrides }
	}

	pub fn threshold(&self, template: &Template) -> f32 {
		self.overrides.for_role(template.role).unwrap_or(template.threshold)
	}

	/// Best placement among all `role` templates that clears its threshold.
	pub fn find_best(
		&self,
		frame: &CaptureFrame,
		templates: &TemplateSet,
		role: TemplateRole,
		scope: TemplateScope,
	) -> Result<MatchResult, MatchError> {
		let candidates = checked_candidates(frame, templates, role, scope)?;

		let mut best: Option<MatchResult> = None;
		let mut best_seen: Option<f32> = None;

		for template in candidates {
			let Some((bbox, score)) = best_placement(frame, template) else {
				tracing::debug!(template = %template.id, "template does not fit its search area");
				continue;
			};
			best_seen = Some(best_seen.map_or(score, |v| v.max(score)));

			let threshold = self.threshold(template);
			if score <= threshold {
				tracing::debug!(template = %template.id, score, threshold, "template below threshold");
				continue;
			}

			let result = MatchResult {
				template_id: template.id.clone(),
				role,
				bbox,
				score,
				sequence: template.sequence,
			};
			if best.as_ref().is_none_or(|b| result.beats(b)) {
				best = Some(result);
			}
		}

		match best {
			Some(result) => {
				tracing::debug!(template = %result.template_id, score = result.score, bbox = ?result.bbox, "template matched");
				Ok(result)
			}
			None => Err(MatchError::BelowThreshold { role, best: best_seen }),
		}
	}

	/// Every placement of every `role` template that clears its threshold.
	///
	/// Overlapping placements collapse onto the best one. The result is in
	/// reading order (top-to-bottom, then left-to-right).
	pub fn find_all(
		&self,
		frame: &CaptureFrame,
		templates: &TemplateSet,
		role: TemplateRole,
		scope: TemplateScope,
	) -> Result<Vec<MatchResult>, MatchError> {
		let candidates = checked_candidates(frame, templates, role, scope)?;

		let mut raw = Vec::new();
		for template in candidates {
			let Some(area) = search_area(frame, template) else {
				continue;
			};
			let threshold = self.threshold(template);
			let mut scores = score_map(frame, template, area);
			let (tw, th) = template.reference.dimensions();

			for _ in 0..MAX_PLACEMENTS_PER_TEMPLATE {
				let Some((x, y, score)) = peak(&scores) else { break };
				if score <= threshold {
					break;
				}
				raw.push(MatchResult {
					template_id: template.id.clone(),
					role,
					bbox: Rect::new(area.x + x as i32, area.y + y as i32, tw, th),
					score,
					sequence: template.sequence,
				});
				suppress(&mut scores, x, y, tw, th);
			}
		}

		raw.sort_by(|a, b| {
			b.score
				.total_cmp(&a.score)
				.then(a.sequence.cmp(&b.sequence))
		});

		let mut accepted: Vec<MatchResult> = Vec::new();
		for result in raw {
			if accepted.iter().any(|v| v.bbox.iou(&result.bbox) > SWEEP_SUPPRESS_IOU) {
				continue;
			}
			accepted.push(result);
		}

		accepted.sort_by_key(|v| (v.bbox.y, v.bbox.x));
		Ok(accepted)
	}
}

fn checked_candidates<'a>(
	frame: &CaptureFrame,
	templates: &'a TemplateSet,
	role: TemplateRole,
	scope: TemplateScope,
) -> Result<Vec<&'a Template>, MatchError> {
	let candidates = templates.candidates(role, scope).collect::<Vec<_>>();
	if candidates.is_empty() {
		return Err(MatchError::NoTemplates { role });
	}

	let (w, h) = frame.dimensions();
	if let Some(stale) = candidates.iter().find(|t| !t.calibration_matches(w, h)) {
		return Err(MatchError::DimensionMismatch {
			template: stale.id.clone(),
			expected: (stale.calibration.width, stale.calibration.height),
			actual: (w, h),
		});
	}

	Ok(candidates)
}

/// The part of the frame a template is searched in, if the reference fits.
fn search_area(frame: &CaptureFrame, template: &Template) -> Option<Rect> {
	let (w, h) = frame.dimensions();
	let area = match template.search_region {
		Some(region) => region.clip(w, h)?,
		None => Rect::new(0, 0, w, h),
	};
	let (tw, th) = template.reference.dimensions();
	if area.width < tw || area.height < th {
		return None;
	}
	Some(area)
}

fn score_map(frame: &CaptureFrame, template: &Template, area: Rect) -> ScoreMap {
	let method = MatchTemplateMethod::CrossCorrelationNormalized;
	if area == Rect::new(0, 0, frame.width(), frame.height()) {
		return match_template(frame.gray(), &template.reference, method);
	}

	let roi = image::imageops::crop_imm(frame.gray(), area.x as u32, area.y as u32, area.width, area.height).to_image();
	match_template(&roi, &template.reference, method)
}

fn best_placement(frame: &CaptureFrame, template: &Template) -> Option<(Rect, f32)> {
	let area = search_area(frame, template)?;
	let scores = score_map(frame, template, area);
	let (x, y, score) = peak(&scores)?;
	let (tw, th) = template.reference.dimensions();
	Some((Rect::new(area.x + x as i32, area.y + y as i32, tw, th), score))
}

/// Highest finite score, first in row-major order on ties.
///
/// Flat (all-black) windows produce NaN under normalized correlation; those
/// are skipped rather than compared.
fn peak(scores: &ScoreMap) -> Option<(u32, u32, f32)> {
	let mut best: Option<(u32, u32, f32)> = None;
	for (x, y, p) in scores.enumerate_pixels() {
		let v = p.0[0];
		if !v.is_finite() {
			continue;
		}
		match best {
			Some((_, _, b)) if v <= b => {}
			_ => best = Some((x, y, v)),
		}
	}
	best.map(|(x, y, v)| (x, y, v.clamp(0.0, 1.0)))
}

/// Knock out every placement that would overlap the one picked at `(x, y)`.
fn suppress(scores: &mut ScoreMap, x: u32, y: u32, tw: u32, th: u32) {
	let x1 = x.saturating_sub(tw.saturating_sub(1));
	let y1 = y.saturating_sub(th.saturating_sub(1));
	let x2 = (x + tw).min(scores.width());
	let y2 = (y + th).min(scores.height());
	for py in y1..y2 {
		for px in x1..x2 {
			scores.put_pixel(px, py, Luma([f32::NEG_INFINITY]));
		}
	}
}
