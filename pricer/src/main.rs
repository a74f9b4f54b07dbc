//! Pricer.
//!
//! Reads item tooltips off the screen and shows the stored LP tier prices
//! next to them. Actions come in on stdin; overlays go to the display thread.

mod assets;
mod capture;
mod config;
mod console;
mod dedupe;
mod dispatch;
mod dumps;
mod i18n;
mod overlay;
mod pipeline;
#[cfg(test)]
mod testing;
mod watch;

use std::process::ExitCode;
use std::sync::{Arc, RwLock, mpsc};

use data::PriceStore;
use ie::{OcrRecognizer, Recognizer};

use crate::config::{Settings, SettingsHandle};
use crate::console::Console;
use crate::dispatch::{Action, Dispatcher, Message, Severity};
use crate::overlay::MonospaceMetrics;
use crate::pipeline::{Pipeline, PipelineError};
use crate::watch::TemplateLibrary;

fn main() -> ExitCode {
	// Structured logging. Use `RUST_LOG=info` etc.
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.init();

	match run() {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			tracing::error!(error = %format!("{err:#}"), "fatal");
			eprintln!("{err:#}");
			ExitCode::FAILURE
		}
	}
}

fn run() -> anyhow::Result<()> {
	let settings = Settings::load_or_default();
	i18n::init(settings.locale.as_deref());

	let store_path = settings.store_path()?;
	let store = match PriceStore::load(&store_path) {
		Ok(store) => store,
		Err(err) => {
			let err = PipelineError::from(err);
			eprintln!("{}", err.status_text());
			return Err(err.into());
		}
	};
	tracing::info!(path = %store_path.display(), items = store.len(), "price store loaded");
	let store = Arc::new(RwLock::new(store));

	let templates_dir = settings.templates_dir()?;
	let templates = TemplateLibrary::load(&templates_dir)?;
	let _watcher = templates
		.watch()
		.inspect_err(|err| tracing::warn!(error = %format!("{err:#}"), "template hot reload disabled"))
		.ok();

	let recognizer: Arc<dyn Recognizer> = match assets::resolve_ocr_assets(&settings.ocr_language).and_then(|v| OcrRecognizer::try_new(&v.detection, &v.recognition, &v.charset)) {
		Ok(ocr) => Arc::new(ocr),
		Err(err) => {
			tracing::warn!(error = %format!("{err:#}"), "{}", tr!("ocr-missing"));
			Arc::new(ie::LabelRecognizer)
		}
	};

	let pipeline = Arc::new(Pipeline::new(
		Arc::new(capture::XcapSource),
		templates,
		store.clone(),
		recognizer,
		Arc::new(MonospaceMetrics::default()),
	));

	let handle = SettingsHandle::new(settings.clone());
	let (tx, rx) = mpsc::channel();
	let library = pipeline.templates().clone();
	let dispatcher = Dispatcher::new(pipeline, handle.clone(), tx);

	std::thread::Builder::new()
		.name("display".into())
		.spawn(move || display(rx, &library))?;

	let key = |action: Action| settings.hotkeys.get(&action).cloned().unwrap_or_else(|| action.name().to_string());
	println!(
		"{}",
		tr!(
			"app-ready",
			single = key(Action::SingleCapture),
			sweep = key(Action::SweepCapture),
			calibrate = key(Action::OpenCalibration),
		)
	);

	let settings_path = Settings::path()
		.inspect_err(|err| tracing::warn!(error = %format!("{err:#}"), "settings changes won't be saved"))
		.ok();
	Console::new(dispatcher, store, handle, settings_path).run(std::io::stdin().lock(), std::io::stdout())
}

/// Stand-in renderer: logs what an overlay would draw.
fn display(rx: mpsc::Receiver<Message>, templates: &TemplateLibrary) {
	for message in rx {
		match message {
			Message::Overlay { class, hints, lifetime } => {
				for hint in &hints {
					for line in &hint.lines {
						tracing::info!(
							?class,
							x = line.plate.x,
							y = line.plate.y,
							color = ?line.color,
							lifetime_ms = lifetime.as_millis() as u64,
							"{}",
							line.text
						);
					}
				}
			}
			Message::Status { severity, text } => {
				match severity {
					Severity::Info => tracing::info!("{text}"),
					Severity::Warn => tracing::warn!("{text}"),
					Severity::Error => tracing::error!("{text}"),
				}
				println!("{text}");
			}
			Message::OpenCalibration => {
				let dir = templates.dir().map(|v| v.display().to_string()).unwrap_or_default();
				println!("{}", tr!("status-calibration", dir = dir));
			}
		}
	}
}
