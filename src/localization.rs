use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use unic_langid::LanguageIdentifier;

const RU_MESSAGES: &str = include_str!("../locales/ru/main.ftl");
const EN_MESSAGES: &str = include_str!("../locales/en/main.ftl");

/// Interface languages supported by the bot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Russian, the storefront's primary language
    #[default]
    Ru,
    En,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Ru, Language::En];

    /// ISO 639-1 code
    pub fn code(self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
        }
    }

    /// Parse an exact language code
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "ru" => Some(Language::Ru),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    /// Pick a language from a Telegram `language_code` such as `en-US`
    ///
    /// Anything unsupported falls back to Russian.
    pub fn detect(language_code: Option<&str>) -> Self {
        language_code
            .and_then(|code| code.split(['-', '_']).next())
            .map(|primary| primary.to_ascii_lowercase())
            .and_then(|primary| Self::parse(&primary))
            .unwrap_or_default()
    }
}

/// Localization manager for the storefront bot
pub struct LocalizationManager {
    bundles: HashMap<Language, Arc<FluentBundle<FluentResource>>>,
}

impl LocalizationManager {
    /// Create a new localization manager with the embedded bundles
    pub fn new() -> Self {
        let mut bundles = HashMap::new();
        for language in Language::ALL {
            let source = match language {
                Language::Ru => RU_MESSAGES,
                Language::En => EN_MESSAGES,
            };
            bundles.insert(language, Arc::new(Self::create_bundle(language, source)));
        }
        Self { bundles }
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(language: Language, source: &str) -> FluentBundle<FluentResource> {
        let locale: LanguageIdentifier = match language.code().parse() {
            Ok(locale) => locale,
            Err(_) => LanguageIdentifier::default(),
        };
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Telegram HTML must not receive Unicode isolation marks around arguments
        bundle.set_use_isolating(false);

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!(language = language.code(), errors = errors.len(), "Locale file has syntax errors");
                resource
            }
        };
        if let Err(errors) = bundle.add_resource(resource) {
            warn!(language = language.code(), errors = errors.len(), "Duplicate messages in locale file");
        }

        bundle
    }

    /// Get a localized message, or `None` when no bundle defines it
    ///
    /// Keys missing from the requested language fall back to Russian.
    pub fn try_message(
        &self,
        key: &str,
        language: Language,
        args: Option<&HashMap<&str, &str>>,
    ) -> Option<String> {
        [language, Language::Ru]
            .into_iter()
            .find_map(|lang| self.format(lang, key, args))
    }

    fn format(&self, language: Language, key: &str, args: Option<&HashMap<&str, &str>>) -> Option<String> {
        let bundle = self.bundles.get(&language)?;
        let pattern = bundle.get_message(key)?.value()?;

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        Some(value.into_owned())
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: Language,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        self.try_message(key, language, args)
            .unwrap_or_else(|| format!("Missing translation: {}", key))
    }
}

impl Default for LocalizationManager {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref LOCALIZATION_MANAGER: LocalizationManager = LocalizationManager::new();
}

/// Initialize the global localization manager
///
/// Bundles are embedded, so this only verifies that every language carries
/// the main menu; it is cheap to call more than once.
pub fn init_localization() -> anyhow::Result<()> {
    for language in Language::ALL {
        let bundle = LOCALIZATION_MANAGER
            .bundles
            .get(&language)
            .ok_or_else(|| anyhow::anyhow!("no bundle for {}", language.code()))?;
        if !bundle.has_message("main-menu-title") {
            anyhow::bail!("locale {} has no main menu title", language.code());
        }
    }
    Ok(())
}

/// Get the global localization manager
pub fn get_localization_manager() -> &'static LocalizationManager {
    &LOCALIZATION_MANAGER
}

/// Localized message in the given language
pub fn t_lang(key: &str, language: Language) -> String {
    get_localization_manager().get_message_in_language(key, language, None)
}

/// Localized message with simple string arguments
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language: Language) -> String {
    let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
    get_localization_manager().get_message_in_language(key, language, Some(&args_map))
}

/// Localized message if the key exists in any bundle
pub fn try_t_lang(key: &str, language: Language) -> Option<String> {
    get_localization_manager().try_message(key, language, None)
}
