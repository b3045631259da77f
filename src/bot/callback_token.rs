//! Callback Token module: the string payload carried by inline buttons
//!
//! A token is an action tag followed by a fixed number of positional
//! arguments, all joined by `_`: `select_color_1_48R_Темно-синий`. Only the
//! final argument may contain the separator; decoding splits the payload into
//! exactly as many parts as the action takes, so the last one keeps any
//! remaining underscores verbatim.

use std::fmt;

use crate::errors::{BotError, Result};

/// Separator between the tag and the arguments
pub const SEPARATOR: char = '_';

/// Telegram rejects callback data longer than this many bytes
pub const MAX_TOKEN_BYTES: usize = 64;

/// Every action a button can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MainMenu,
    Catalog,
    Category,
    Product,
    Size,
    SelectSize,
    SelectColor,
    Cart,
    ClearCart,
    Favorites,
    /// Toggle a product on the favorites list
    Favorite,
    RemoveFavorite,
    Orders,
    Settings,
    Contacts,
    Language,
    /// Sentinel for anything that does not decode
    Unknown,
}

impl Action {
    /// Decodable actions, longest tags first so prefixes never shadow each other
    pub const ALL: [Action; 16] = [
        Action::SelectColor,
        Action::SelectSize,
        Action::RemoveFavorite,
        Action::ClearCart,
        Action::MainMenu,
        Action::Favorites,
        Action::Favorite,
        Action::Category,
        Action::Contacts,
        Action::Language,
        Action::Settings,
        Action::Catalog,
        Action::Product,
        Action::Orders,
        Action::Cart,
        Action::Size,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Action::MainMenu => "main_menu",
            Action::Catalog => "catalog",
            Action::Category => "category",
            Action::Product => "product",
            Action::Size => "size",
            Action::SelectSize => "select_size",
            Action::SelectColor => "select_color",
            Action::Cart => "cart",
            Action::ClearCart => "clear_cart",
            Action::Favorites => "favorites",
            Action::Favorite => "favorite",
            Action::RemoveFavorite => "remove_fav",
            Action::Orders => "orders",
            Action::Settings => "settings",
            Action::Contacts => "contacts",
            Action::Language => "language",
            Action::Unknown => "unknown",
        }
    }

    /// Number of positional arguments the action takes
    pub fn arity(self) -> usize {
        match self {
            Action::Category
            | Action::Product
            | Action::Size
            | Action::Favorite
            | Action::RemoveFavorite
            | Action::Language => 1,
            Action::SelectSize => 2,
            Action::SelectColor => 3,
            _ => 0,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Decoded callback data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackToken {
    pub action: Action,
    pub args: Vec<String>,
}

impl CallbackToken {
    pub fn new(action: Action, args: Vec<String>) -> Self {
        Self { action, args }
    }

    /// The `{action: unknown}` sentinel
    pub fn unknown() -> Self {
        Self::new(Action::Unknown, Vec::new())
    }

    pub fn is_unknown(&self) -> bool {
        self.action == Action::Unknown
    }

    /// Argument at `index`, empty when absent
    pub fn arg(&self, index: usize) -> &str {
        self.args.get(index).map(String::as_str).unwrap_or("")
    }

    /// Encode back into callback data
    pub fn encode(&self) -> Result<String> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        encode(self.action, &args)
    }
}

/// Encode an action and its arguments into callback data
///
/// Fails when the argument count does not match the action, an argument is
/// empty, a non-final argument contains the separator, or the token exceeds
/// Telegram's size limit.
pub fn encode(action: Action, args: &[&str]) -> Result<String> {
    if action == Action::Unknown {
        return Err(BotError::MalformedToken("the unknown sentinel is not encodable".to_string()));
    }
    if args.len() != action.arity() {
        return Err(BotError::MalformedToken(format!(
            "{action} takes {} argument(s), got {}",
            action.arity(),
            args.len()
        )));
    }
    for (index, arg) in args.iter().enumerate() {
        if arg.is_empty() {
            return Err(BotError::MalformedToken(format!("{action}: argument {index} is empty")));
        }
        let is_last = index + 1 == args.len();
        if !is_last && arg.contains(SEPARATOR) {
            return Err(BotError::MalformedToken(format!(
                "{action}: argument {index} ({arg}) contains the separator"
            )));
        }
    }

    let mut token = action.tag().to_string();
    for arg in args {
        token.push(SEPARATOR);
        token.push_str(arg);
    }

    if token.len() > MAX_TOKEN_BYTES {
        return Err(BotError::MalformedToken(format!(
            "{action}: token is {} bytes, limit is {MAX_TOKEN_BYTES}",
            token.len()
        )));
    }
    Ok(token)
}

/// Decode callback data, reporting why it is malformed
pub fn try_decode(token: &str) -> Result<CallbackToken> {
    for action in Action::ALL {
        let tag = action.tag();
        if action.arity() == 0 {
            if token == tag {
                return Ok(CallbackToken::new(action, Vec::new()));
            }
            continue;
        }

        let Some(payload) = token
            .strip_prefix(tag)
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
        else {
            continue;
        };

        let args: Vec<String> = payload
            .splitn(action.arity(), SEPARATOR)
            .map(str::to_string)
            .collect();
        if args.len() != action.arity() || args.iter().any(String::is_empty) {
            return Err(BotError::MalformedToken(format!(
                "{tag} expects {} argument(s) in {token:?}",
                action.arity()
            )));
        }
        return Ok(CallbackToken::new(action, args));
    }

    Err(BotError::MalformedToken(format!("unrecognized token {token:?}")))
}

/// Decode callback data; anything malformed becomes the unknown sentinel
pub fn decode(token: &str) -> CallbackToken {
    try_decode(token).unwrap_or_else(|_| CallbackToken::unknown())
}
