//! Favorites kept per conversation
//!
//! Product ids only, newest first. Like the cart, the list dies with the
//! conversation.

use serde::{Deserialize, Serialize};

/// Oldest favorites are dropped beyond this many
pub const MAX_FAVORITES: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorites {
    product_ids: Vec<String>,
}

impl Favorites {
    pub fn contains(&self, product_id: &str) -> bool {
        self.product_ids.iter().any(|id| id == product_id)
    }

    /// Add `product_id`, or remove it when already present
    ///
    /// Returns whether the product is a favorite afterwards.
    pub fn toggle(&mut self, product_id: &str) -> bool {
        if self.remove(product_id) {
            return false;
        }
        self.product_ids.insert(0, product_id.to_string());
        self.product_ids.truncate(MAX_FAVORITES);
        true
    }

    /// Returns whether anything was removed
    pub fn remove(&mut self, product_id: &str) -> bool {
        let before = self.product_ids.len();
        self.product_ids.retain(|id| id != product_id);
        self.product_ids.len() != before
    }

    /// Product ids, newest first
    pub fn list(&self) -> &[String] {
        &self.product_ids
    }

    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.product_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut favorites = Favorites::default();
        assert!(favorites.toggle("1"));
        assert!(favorites.contains("1"));
        assert!(!favorites.toggle("1"));
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let mut favorites = Favorites::default();
        for id in 0..(MAX_FAVORITES + 5) {
            favorites.toggle(&id.to_string());
        }
        assert_eq!(favorites.len(), MAX_FAVORITES);
        assert_eq!(favorites.list()[0], (MAX_FAVORITES + 4).to_string());
        assert!(!favorites.contains("0"));
    }

    #[test]
    fn test_remove_missing_is_a_no_op() {
        let mut favorites = Favorites::default();
        favorites.toggle("2");
        assert!(!favorites.remove("9"));
        assert!(favorites.remove("2"));
    }
}
