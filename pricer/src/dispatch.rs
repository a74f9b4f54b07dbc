//! Action dispatch and per-class run state.
//!
//! Each run executes on its own worker thread and reports back through a
//! one-way message channel. A class (single or sweep) runs at most once at a
//! time; events for a busy class are dropped, not queued.

use std::str::FromStr;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SettingsHandle;
use crate::overlay::OverlayHint;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
	SingleCapture,
	SweepCapture,
	OpenCalibration,
}

impl Action {
	pub const ALL: [Self; 3] = [Self::SingleCapture, Self::SweepCapture, Self::OpenCalibration];

	pub fn name(self) -> &'static str {
		match self {
			Self::SingleCapture => "single-capture",
			Self::SweepCapture => "sweep-capture",
			Self::OpenCalibration => "open-calibration",
		}
	}

	pub fn class(self) -> Option<RunClass> {
		match self {
			Self::SingleCapture => Some(RunClass::Single),
			Self::SweepCapture => Some(RunClass::Sweep),
			Self::OpenCalibration => None,
		}
	}
}

impl FromStr for Action {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		Self::ALL
			.into_iter()
			.find(|v| v.name().eq_ignore_ascii_case(s))
			.ok_or_else(|| anyhow::anyhow!("unknown action {s:?}"))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunClass {
	Single,
	Sweep,
}

impl RunClass {
	fn index(self) -> usize {
		match self {
			Self::Single => 0,
			Self::Sweep => 1,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
	#[default]
	Idle,
	Capturing,
	Matching,
	Extracting,
	Resolving,
	Rendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
	Info,
	Warn,
	Error,
}

/// Everything the display side receives.
#[derive(Debug, Clone)]
pub enum Message {
	Overlay {
		class: RunClass,
		hints: Vec<OverlayHint>,
		lifetime: Duration,
	},
	Status {
		severity: Severity,
		text: String,
	},
	OpenCalibration,
}

#[derive(Debug)]
pub enum Dispatched {
	/// A run was started on this worker.
	Started(JoinHandle<()>),
	/// The class already had a run in flight.
	Dropped,
	/// Passed on to the display side.
	Forwarded,
}

type States = Arc<Mutex<[RunState; 2]>>;

#[derive(Clone)]
pub struct Dispatcher {
	pipeline: Arc<Pipeline>,
	settings: SettingsHandle,
	tx: Sender<Message>,
	states: States,
}

impl Dispatcher {
	pub fn new(pipeline: Arc<Pipeline>, settings: SettingsHandle, tx: Sender<Message>) -> Self {
		Self {
			pipeline,
			settings,
			tx,
			states: States::default(),
		}
	}

	pub fn state(&self, class: RunClass) -> RunState {
		self.states.lock().unwrap_or_else(PoisonError::into_inner)[class.index()]
	}

	pub fn dispatch(&self, action: Action) -> Dispatched {
		let Some(class) = action.class() else {
			if self.tx.send(Message::OpenCalibration).is_err() {
				tracing::debug!("display side gone; dropping calibration request");
			}
			return Dispatched::Forwarded;
		};

		// Claim the class before spawning so a second event can't slip in.
		{
			let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
			let state = &mut states[class.index()];
			if *state != RunState::Idle {
				tracing::debug!(?class, state = ?*state, "run in flight; dropping event");
				return Dispatched::Dropped;
			}
			*state = RunState::Capturing;
		}

		let settings = self.settings.snapshot();
		let pipeline = self.pipeline.clone();
		let states = self.states.clone();
		let tx = self.tx.clone();

		let worker = std::thread::Builder::new()
			.name(format!("run-{}", action.name()))
			.spawn(move || {
				let set_state = |state: RunState| {
					states.lock().unwrap_or_else(PoisonError::into_inner)[class.index()] = state;
				};

				let result = pipeline.run(class, &settings, &mut |stage| {
					tracing::trace!(?class, ?stage, "run stage");
					set_state(stage);
				});

				let message = match result {
					Ok(hints) => Message::Overlay {
						class,
						hints,
						lifetime: Duration::from_millis(match class {
							RunClass::Single => settings.overlay.lifetime_ms,
							RunClass::Sweep => settings.overlay.sweep_lifetime_ms,
						}),
					},
					Err(err) => {
						tracing::warn!(?class, error = %err, "run failed");
						Message::Status {
							severity: err.severity(),
							text: err.status_text(),
						}
					}
				};

				set_state(RunState::Idle);
				if tx.send(message).is_err() {
					tracing::debug!("display side gone; dropping run result");
				}
			});

		match worker {
			Ok(handle) => Dispatched::Started(handle),
			Err(err) => {
				tracing::error!(error = %err, "failed to spawn run worker");
				self.states.lock().unwrap_or_else(PoisonError::into_inner)[class.index()] = RunState::Idle;
				Dispatched::Dropped
			}
		}
	}
}
