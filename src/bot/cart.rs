//! Cart accumulator for bot conversations
//!
//! Lines live inside the conversation and die with it. They are never merged
//! with a web-session cart: a shared cart would have to be keyed by an
//! authenticated user, which the bot does not have.

use serde::{Deserialize, Serialize};

/// Orders below this total pay a delivery fee
pub const FREE_DELIVERY_THRESHOLD: u64 = 100_000;
/// Delivery fee for orders below the threshold
pub const DELIVERY_FEE: u64 = 5_000;

/// A completed size/color selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub size: String,
    pub color: String,
    pub quantity: u32,
}

impl CartLine {
    /// A single-unit line; every add is a fresh line
    pub fn new(product_id: impl Into<String>, size: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            size: size.into(),
            color: color.into(),
            quantity: 1,
        }
    }
}

/// Conversation-scoped list of cart lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn add_line(&mut self, line: CartLine) -> CartLine {
        self.lines.push(line.clone());
        line
    }

    pub fn list_lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

/// Delivery fee owed for an order total
pub fn delivery_fee(total: u64) -> u64 {
    if total < FREE_DELIVERY_THRESHOLD {
        DELIVERY_FEE
    } else {
        0
    }
}
