//! Dialogue Manager module: the shopping flow state machine
//!
//! Each inbound event is reduced to a callback token and looked up in a route
//! table. A route's transition decides the next screen and the side effect;
//! the manager then loads the catalog data that screen needs, applies the
//! effect and renders. Nothing is committed to the conversation until the
//! load succeeds.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::bot::callback_token::{decode, Action, CallbackToken};
use crate::bot::cart::CartLine;
use crate::bot::ui_builder::{render, render_retry, CartItemView, Menu, Notice, RenderContext};
use crate::catalog::{CatalogProduct, GuardedCatalog};
use crate::dialogue::{Conversation, PendingSelection, Screen};
use crate::errors::{BotError, Result, ValidationError};
use crate::localization::{t_lang, Language};

lazy_static! {
    /// `/command` with an optional `@botname` suffix
    static ref COMMAND_RE: Regex =
        Regex::new(r"^/([a-z_]+)(?:@[A-Za-z0-9_]+)?$").expect("command pattern is valid");
}

/// An inbound event reduced to what the flow cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Text message, usually a slash command
    Text(String),
    /// Callback data of a pressed inline button
    Callback(String),
    /// A message kind the bot has no use for (photo, sticker, ...)
    Unsupported,
}

impl Event {
    /// The callback token this event stands for
    pub fn token(&self) -> CallbackToken {
        match self {
            Event::Callback(data) => decode(data),
            Event::Text(text) => match command(text) {
                Some("start") | Some("menu") => CallbackToken::new(Action::MainMenu, Vec::new()),
                Some(name @ ("catalog" | "cart" | "favorites" | "orders" | "settings" | "contacts")) => {
                    decode(name)
                }
                _ => CallbackToken::unknown(),
            },
            Event::Unsupported => CallbackToken::unknown(),
        }
    }

    /// Whether this is the `/start` command
    pub fn is_start(&self) -> bool {
        matches!(self, Event::Text(text) if command(text) == Some("start"))
    }
}

fn command(text: &str) -> Option<&str> {
    COMMAND_RE
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Who sent the event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub first_name: Option<String>,
    pub language_code: Option<String>,
}

/// Side effect of an accepted transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Start a selection for this product
    RememberProduct(String),
    /// Record the chosen size
    RememberSize(String),
    AddToCart(CartLine),
    ClearCart,
    /// Add the product to favorites, or take it off
    ToggleFavorite(String),
    RemoveFavorite(String),
    SetLanguage(String),
}

/// Outcome of a transition: where to go and what to change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub target: Screen,
    pub effect: Effect,
}

impl Step {
    fn to(target: Screen) -> Self {
        Self {
            target,
            effect: Effect::None,
        }
    }

    fn with(target: Screen, effect: Effect) -> Self {
        Self { target, effect }
    }
}

/// A transition returns `None` when the event is not legal from the screen
type Transition = fn(&Screen, &CallbackToken) -> Option<Step>;

struct Route {
    action: Action,
    transition: Transition,
}

static ROUTES: &[Route] = &[
    Route {
        action: Action::MainMenu,
        transition: to_main_menu,
    },
    Route {
        action: Action::Catalog,
        transition: to_catalog,
    },
    Route {
        action: Action::Category,
        transition: to_category,
    },
    Route {
        action: Action::Product,
        transition: to_product,
    },
    Route {
        action: Action::Size,
        transition: to_size_picker,
    },
    Route {
        action: Action::SelectSize,
        transition: select_size,
    },
    Route {
        action: Action::SelectColor,
        transition: select_color,
    },
    Route {
        action: Action::Cart,
        transition: to_cart,
    },
    Route {
        action: Action::ClearCart,
        transition: clear_cart,
    },
    Route {
        action: Action::Favorites,
        transition: to_favorites,
    },
    Route {
        action: Action::Favorite,
        transition: toggle_favorite,
    },
    Route {
        action: Action::RemoveFavorite,
        transition: remove_favorite,
    },
    Route {
        action: Action::Orders,
        transition: to_orders,
    },
    Route {
        action: Action::Settings,
        transition: to_settings,
    },
    Route {
        action: Action::Contacts,
        transition: to_contacts,
    },
    Route {
        action: Action::Language,
        transition: set_language,
    },
];

fn to_main_menu(_: &Screen, _: &CallbackToken) -> Option<Step> {
    Some(Step::to(Screen::MainMenu))
}

fn to_catalog(_: &Screen, _: &CallbackToken) -> Option<Step> {
    Some(Step::to(Screen::Catalog))
}

fn to_category(current: &Screen, token: &CallbackToken) -> Option<Step> {
    match current {
        Screen::Catalog | Screen::Product { .. } => Some(Step::to(Screen::Category {
            category_id: token.arg(0).to_string(),
        })),
        _ => None,
    }
}

fn to_product(current: &Screen, token: &CallbackToken) -> Option<Step> {
    let product_id = token.arg(0);
    match current {
        Screen::Category { .. } | Screen::Favorites => {}
        Screen::SizePicker { product_id: current_id } if current_id == product_id => {}
        _ => return None,
    }
    Some(Step::with(
        Screen::Product {
            product_id: product_id.to_string(),
        },
        Effect::RememberProduct(product_id.to_string()),
    ))
}

fn to_size_picker(current: &Screen, token: &CallbackToken) -> Option<Step> {
    let product_id = token.arg(0);
    match current {
        Screen::Product { product_id: current_id } | Screen::ColorPicker { product_id: current_id, .. }
            if current_id == product_id => {}
        _ => return None,
    }
    Some(Step::with(
        Screen::SizePicker {
            product_id: product_id.to_string(),
        },
        Effect::RememberProduct(product_id.to_string()),
    ))
}

fn select_size(current: &Screen, token: &CallbackToken) -> Option<Step> {
    let (product_id, size) = (token.arg(0), token.arg(1));
    match current {
        Screen::SizePicker { product_id: current_id } if current_id == product_id => Some(Step::with(
            Screen::ColorPicker {
                product_id: product_id.to_string(),
                size: size.to_string(),
            },
            Effect::RememberSize(size.to_string()),
        )),
        _ => None,
    }
}

fn select_color(current: &Screen, token: &CallbackToken) -> Option<Step> {
    let (product_id, size, color) = (token.arg(0), token.arg(1), token.arg(2));
    match current {
        Screen::ColorPicker {
            product_id: current_id,
            size: current_size,
        } if current_id == product_id && current_size == size => Some(Step::with(
            Screen::AddedToCart {
                product_id: product_id.to_string(),
                size: size.to_string(),
                color: color.to_string(),
            },
            Effect::AddToCart(CartLine::new(product_id, size, color)),
        )),
        _ => None,
    }
}

fn to_cart(_: &Screen, _: &CallbackToken) -> Option<Step> {
    Some(Step::to(Screen::Cart))
}

fn clear_cart(current: &Screen, _: &CallbackToken) -> Option<Step> {
    (*current == Screen::Cart).then(|| Step::with(Screen::Cart, Effect::ClearCart))
}

fn to_favorites(_: &Screen, _: &CallbackToken) -> Option<Step> {
    Some(Step::to(Screen::Favorites))
}

fn toggle_favorite(current: &Screen, token: &CallbackToken) -> Option<Step> {
    let product_id = token.arg(0);
    match current {
        Screen::Product { product_id: current_id } if current_id == product_id => Some(Step::with(
            current.clone(),
            Effect::ToggleFavorite(product_id.to_string()),
        )),
        _ => None,
    }
}

fn remove_favorite(current: &Screen, token: &CallbackToken) -> Option<Step> {
    (*current == Screen::Favorites)
        .then(|| Step::with(Screen::Favorites, Effect::RemoveFavorite(token.arg(0).to_string())))
}

fn to_orders(_: &Screen, _: &CallbackToken) -> Option<Step> {
    Some(Step::to(Screen::Orders))
}

fn to_settings(_: &Screen, _: &CallbackToken) -> Option<Step> {
    Some(Step::to(Screen::Settings))
}

fn to_contacts(_: &Screen, _: &CallbackToken) -> Option<Step> {
    Some(Step::to(Screen::Contacts))
}

fn set_language(current: &Screen, token: &CallbackToken) -> Option<Step> {
    (*current == Screen::Settings)
        .then(|| Step::with(Screen::Settings, Effect::SetLanguage(token.arg(0).to_string())))
}

/// Look up the transition for `token` from `current`
///
/// `None` means the pair is not in the table: an unknown or malformed token,
/// or a known action that is not legal from this screen.
pub fn route(current: &Screen, token: &CallbackToken) -> Option<Step> {
    ROUTES
        .iter()
        .find(|route| route.action == token.action)
        .and_then(|route| (route.transition)(current, token))
}

/// What the handler sends back for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub menu: Menu,
    /// Short text for the callback acknowledgement
    pub toast: Option<String>,
}

/// Drives conversations through the flow
pub struct FlowRouter {
    catalog: Arc<GuardedCatalog>,
}

impl FlowRouter {
    pub fn new(catalog: Arc<GuardedCatalog>) -> Self {
        Self { catalog }
    }

    /// Apply one event to a conversation and produce the reply
    ///
    /// Never fails: every error is turned into a menu the user can act on.
    pub async fn handle(&self, conversation: &mut Conversation, event: &Event, sender: &Sender) -> Reply {
        let token = event.token();
        let language = conversation.language_for(sender.language_code.as_deref());

        let Some(step) = route(&conversation.screen, &token) else {
            info!(
                chat_id = conversation.chat_id,
                action = %token.action,
                screen = ?conversation.screen,
                "Unrecognized event, falling back to main menu"
            );
            return self.fall_back(conversation, language);
        };
        debug!(chat_id = conversation.chat_id, action = %token.action, target = ?step.target, "Transition");

        // A language switch renders in the new language
        let language = match &step.effect {
            Effect::SetLanguage(code) => match Language::parse(code) {
                Some(new_language) => new_language,
                None => {
                    return self
                        .reject(conversation, ValidationError::UnsupportedLanguage(code.clone()), language)
                        .await
                }
            },
            _ => language,
        };

        let lines: &[CartLine] = match step.effect {
            Effect::ClearCart => &[],
            _ => conversation.list_lines(),
        };
        let mut favorites = conversation.favorites.clone();
        if let Effect::RemoveFavorite(product_id) = &step.effect {
            favorites.remove(product_id);
        }

        match self.load(&step.target, lines, favorites.list(), language).await {
            Ok(mut ctx) => {
                let toast = apply(conversation, step.effect, language);
                conversation.screen = step.target;
                if !conversation.screen.is_selection_step() {
                    conversation.pending_selection.clear();
                }

                mark_favorite(&mut ctx, conversation);
                ctx.welcome = event.is_start();
                ctx.user_name = sender.first_name.clone();
                Reply {
                    menu: render(&conversation.screen, &ctx),
                    toast,
                }
            }
            Err(BotError::Validation(error)) => self.reject(conversation, error, language).await,
            Err(error) => {
                warn!(chat_id = conversation.chat_id, action = %token.action, error = %error, "Catalog unavailable");
                self.unavailable(&token, language)
            }
        }
    }

    /// Unknown action: main menu with a notice
    fn fall_back(&self, conversation: &mut Conversation, language: Language) -> Reply {
        conversation.screen = Screen::MainMenu;
        conversation.pending_selection.clear();

        let notice = Notice::UnknownAction;
        let toast = notice.text(language);
        let ctx = RenderContext {
            notice: Some(notice),
            ..RenderContext::new(language)
        };
        Reply {
            menu: render(&Screen::MainMenu, &ctx),
            toast: Some(toast),
        }
    }

    /// Validation failure: stay put and re-render with a notice
    async fn reject(&self, conversation: &mut Conversation, error: ValidationError, language: Language) -> Reply {
        info!(chat_id = conversation.chat_id, error = %error, "Selection rejected");
        let notice = Notice::Validation(error);
        let toast = notice.text(language);

        let loaded = self
            .load(
                &conversation.screen,
                conversation.list_lines(),
                conversation.favorites.list(),
                language,
            )
            .await;
        match loaded {
            Ok(mut ctx) => {
                ctx.notice = Some(notice);
                mark_favorite(&mut ctx, conversation);
                Reply {
                    menu: render(&conversation.screen, &ctx),
                    toast: Some(toast),
                }
            }
            Err(BotError::Validation(_)) => {
                // the current screen itself went stale
                conversation.screen = Screen::MainMenu;
                conversation.pending_selection.clear();
                let ctx = RenderContext {
                    notice: Some(notice),
                    ..RenderContext::new(language)
                };
                Reply {
                    menu: render(&Screen::MainMenu, &ctx),
                    toast: Some(toast),
                }
            }
            Err(_) => Reply {
                menu: render_retry(language, None),
                toast: Some(toast),
            },
        }
    }

    fn unavailable(&self, token: &CallbackToken, language: Language) -> Reply {
        let retry = token.encode().ok();
        Reply {
            menu: render_retry(language, retry.as_deref()),
            toast: Some(Notice::CatalogUnavailable.text(language)),
        }
    }

    /// Fetch and validate the catalog data `screen` needs
    async fn load(
        &self,
        screen: &Screen,
        lines: &[CartLine],
        favorites: &[String],
        language: Language,
    ) -> Result<RenderContext> {
        let mut ctx = RenderContext::new(language);
        match screen {
            Screen::Catalog => {
                ctx.categories = self.catalog.categories().await?;
            }
            Screen::Category { category_id } => {
                ctx.products = self
                    .catalog
                    .list_by_category(category_id)
                    .await?
                    .ok_or_else(|| ValidationError::UnknownCategory(category_id.clone()))?;
            }
            Screen::Product { product_id } | Screen::SizePicker { product_id } => {
                ctx.product = Some(self.require_product(product_id).await?);
            }
            Screen::ColorPicker { product_id, size } => {
                let product = self.require_product(product_id).await?;
                require_size(&product, size)?;
                ctx.product = Some(product);
            }
            Screen::AddedToCart {
                product_id,
                size,
                color,
            } => {
                let product = self.require_product(product_id).await?;
                require_size(&product, size)?;
                if !product.has_color(color) {
                    return Err(ValidationError::UnavailableColor {
                        product_id: product_id.clone(),
                        color: color.clone(),
                    }
                    .into());
                }
                ctx.product = Some(product);
            }
            Screen::Cart => {
                for line in lines {
                    let product = self.catalog.get_product(&line.product_id).await?;
                    ctx.cart.push(CartItemView {
                        line: line.clone(),
                        product: product.as_ref().map(CatalogProduct::summary),
                    });
                }
            }
            Screen::Favorites => {
                // products gone from the catalog are skipped
                for product_id in favorites {
                    if let Some(product) = self.catalog.get_product(product_id).await? {
                        ctx.favorites.push(product.summary());
                    }
                }
            }
            Screen::MainMenu | Screen::Orders | Screen::Settings | Screen::Contacts => {}
        }
        Ok(ctx)
    }

    async fn require_product(&self, product_id: &str) -> Result<CatalogProduct> {
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| ValidationError::UnknownProduct(product_id.to_string()).into())
    }
}

fn mark_favorite(ctx: &mut RenderContext, conversation: &Conversation) {
    ctx.favorite = match &conversation.screen {
        Screen::Product { product_id } => conversation.favorites.contains(product_id),
        _ => false,
    };
}

fn require_size(product: &CatalogProduct, size: &str) -> Result<()> {
    if product.has_size(size) {
        Ok(())
    } else {
        Err(ValidationError::UnavailableSize {
            product_id: product.id.clone(),
            size: size.to_string(),
        }
        .into())
    }
}

/// Commit an effect; returns the acknowledgement toast, if any
fn apply(conversation: &mut Conversation, effect: Effect, language: Language) -> Option<String> {
    match effect {
        Effect::None => None,
        Effect::RememberProduct(product_id) => {
            conversation.pending_selection = PendingSelection {
                product_id: Some(product_id),
                ..Default::default()
            };
            None
        }
        Effect::RememberSize(size) => {
            conversation.pending_selection.size = Some(size);
            None
        }
        Effect::AddToCart(line) => {
            let line = conversation.add_line(line);
            info!(
                chat_id = conversation.chat_id,
                product_id = %line.product_id,
                size = %line.size,
                color = %line.color,
                "Added cart line"
            );
            Some(t_lang("toast-added", language))
        }
        Effect::ClearCart => {
            conversation.clear_cart();
            Some(t_lang("toast-cart-cleared", language))
        }
        Effect::ToggleFavorite(product_id) => {
            let added = conversation.favorites.toggle(&product_id);
            debug!(chat_id = conversation.chat_id, product_id = %product_id, added, "Toggled favorite");
            Some(t_lang(
                if added { "toast-favorite-added" } else { "toast-favorite-removed" },
                language,
            ))
        }
        Effect::RemoveFavorite(product_id) => {
            conversation.favorites.remove(&product_id);
            Some(t_lang("toast-favorite-removed", language))
        }
        Effect::SetLanguage(_) => {
            conversation.language = Some(language);
            Some(t_lang("toast-language-changed", language))
        }
    }
}
