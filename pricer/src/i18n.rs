use std::sync::LazyLock;

use i18n_embed::{
	DesktopLanguageRequester, LanguageLoader,
	fluent::{FluentLanguageLoader, fluent_language_loader},
};
use rust_embed::RustEmbed;
use unic_langid::LanguageIdentifier;

#[derive(RustEmbed)]
#[folder = "i18n"]
struct Localizations;

static LOADER: LazyLock<FluentLanguageLoader> = LazyLock::new(|| {
	let loader = fluent_language_loader!();
	// English must resolve even before `init` (early errors, tests).
	if let Err(err) = loader.load_fallback_language(&Localizations) {
		tracing::warn!(error = %err, "failed to load fallback locale");
	}
	// Console output; bidi isolation marks would show up as garbage.
	loader.set_use_isolating(false);
	loader
});

/// Access the global language loader (used by `tr!()`).
pub fn loader() -> &'static FluentLanguageLoader {
	&LOADER
}

/// Initialize localization. A forced locale is preferred over the system one.
pub fn init(forced_locale: Option<&str>) {
	let requested = match forced_locale {
		Some(tag) => tag.parse::<LanguageIdentifier>().ok().into_iter().collect::<Vec<_>>(),
		None => DesktopLanguageRequester::requested_languages(),
	};

	// Missing translations fall back to English; never fatal.
	if let Err(err) = i18n_embed::select(loader(), &Localizations, &requested) {
		tracing::warn!(error = %err, "failed to select locale");
	}
}

#[macro_export]
macro_rules! tr {
	($id:literal) => {
		i18n_embed_fl::fl!($crate::i18n::loader(), $id)
	};
	($id:literal, $($key:ident = $value:expr),+ $(,)?) => {
		i18n_embed_fl::fl!($crate::i18n::loader(), $id, $($key = $value),+)
	};
}
