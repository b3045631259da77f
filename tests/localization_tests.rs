//! # Localization Tests
//!
//! Message retrieval, argument formatting and language fallbacks.

use ziggler_bot::localization::{init_localization, t_args_lang, t_lang, try_t_lang, Language, LocalizationManager};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_init_localization() {
        assert!(init_localization().is_ok());
        // safe to call twice
        assert!(init_localization().is_ok());
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = LocalizationManager::new();

        let message = manager.get_message_in_language("main-menu-title", Language::Ru, None);
        assert!(message.contains("Ziggler"));
        assert!(message.contains("Главное меню"));

        let message = manager.get_message_in_language("main-menu-title", Language::En, None);
        assert!(message.contains("Main menu"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = LocalizationManager::new();

        let message = manager.get_message_in_language("nonexistent-key", Language::En, None);
        assert!(message.starts_with("Missing translation:"));
        assert!(try_t_lang("nonexistent-key", Language::Ru).is_none());
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = LocalizationManager::new();

        let mut args = HashMap::new();
        args.insert("name", "Aida");
        let message = manager.get_message_in_language("welcome-greeting", Language::Ru, Some(&args));
        assert_eq!(message, "Здравствуйте, Aida! 👋");
    }

    #[test]
    fn test_arguments_are_not_isolated() {
        // Telegram HTML must not receive U+2068/U+2069 around arguments
        let message = t_args_lang("cart-total", &[("total", "185 000 ₸")], Language::En);
        assert_eq!(message, "💰 <b>Total: 185 000 ₸</b>");
        assert!(!message.contains('\u{2068}'));
    }

    #[test]
    fn test_every_russian_key_exists_in_english() {
        let ru = include_str!("../locales/ru/main.ftl");
        let keys: Vec<&str> = ru
            .lines()
            .filter(|line| !line.starts_with('#') && line.contains(" = "))
            .filter_map(|line| line.split(" = ").next())
            .collect();
        assert!(keys.len() > 50);

        let en = include_str!("../locales/en/main.ftl");
        for key in keys {
            assert!(en.contains(&format!("{key} = ")), "{key} missing from en");
        }
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::detect(Some("en")), Language::En);
        assert_eq!(Language::detect(Some("en-US")), Language::En);
        assert_eq!(Language::detect(Some("ru")), Language::Ru);
        assert_eq!(Language::detect(Some("kk")), Language::Ru);
        assert_eq!(Language::detect(None), Language::Ru);
        assert_eq!(Language::parse("de"), None);
    }

    #[test]
    fn test_t_lang_matches_manager() {
        assert_eq!(
            t_lang("button-catalog", Language::En),
            LocalizationManager::new().get_message_in_language("button-catalog", Language::En, None)
        );
    }
}
