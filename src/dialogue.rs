//! Conversation state for the shopping dialogue.

use serde::{Deserialize, Serialize};

use crate::bot::cart::{Cart, CartLine};
use crate::bot::favorites::Favorites;
use crate::localization::Language;

/// Named states of the conversational flow
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Screen {
    #[default]
    MainMenu,
    Catalog,
    Category {
        category_id: String,
    },
    Product {
        product_id: String,
    },
    SizePicker {
        product_id: String,
    },
    ColorPicker {
        product_id: String,
        size: String,
    },
    AddedToCart {
        product_id: String,
        size: String,
        color: String,
    },
    Cart,
    Favorites,
    Orders,
    Settings,
    Contacts,
}

impl Screen {
    /// Screens that belong to the product -> size -> color selection
    pub fn is_selection_step(&self) -> bool {
        matches!(
            self,
            Screen::Product { .. } | Screen::SizePicker { .. } | Screen::ColorPicker { .. }
        )
    }
}

/// A multi-step selection in progress
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSelection {
    pub product_id: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
}

impl PendingSelection {
    pub fn is_empty(&self) -> bool {
        self.product_id.is_none() && self.size.is_none() && self.color.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Per-chat session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub chat_id: i64,
    pub screen: Screen,
    pub pending_selection: PendingSelection,
    pub cart: Cart,
    pub favorites: Favorites,
    /// Explicit choice from the settings screen; wins over the client language
    pub language: Option<Language>,
}

impl Conversation {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            ..Default::default()
        }
    }

    /// Language to render in, given the client's `language_code`
    pub fn language_for(&self, language_code: Option<&str>) -> Language {
        self.language.unwrap_or_else(|| Language::detect(language_code))
    }

    pub fn add_line(&mut self, line: CartLine) -> CartLine {
        self.cart.add_line(line)
    }

    pub fn list_lines(&self) -> &[CartLine] {
        self.cart.list_lines()
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear()
    }
}
