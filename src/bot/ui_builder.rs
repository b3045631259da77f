//! UI Builder module: renders screens into message text and inline keyboards
//!
//! Rendering is a pure function of the screen and a prepared context; all
//! catalog data is fetched beforehand by the dialogue manager.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot::callback_token::{encode, Action};
use crate::bot::cart::{delivery_fee, CartLine, FREE_DELIVERY_THRESHOLD};
use crate::catalog::{CatalogProduct, Category, ProductSummary};
use crate::dialogue::Screen;
use crate::errors::ValidationError;
use crate::localization::{t_args_lang, t_lang, try_t_lang, Language};

const WHATSAPP_URL: &str = "https://wa.me/77271234567";
const INSTAGRAM_URL: &str = "https://instagram.com/ziggler_kz";
const TELEGRAM_URL: &str = "https://t.me/ziggler_kz";

/// Cart lines listed in full; the rest are summarized in one line
pub const MAX_LISTED_CART_LINES: usize = 10;

/// Where a button leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonTarget {
    /// Callback data delivered back to the bot
    Callback(String),
    /// External link opened by the client
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub target: ButtonTarget,
}

impl Button {
    /// Callback button; `None` when the token cannot be encoded
    fn callback(label: String, action: Action, args: &[&str]) -> Option<Self> {
        encode(action, args).ok().map(|token| Self {
            label,
            target: ButtonTarget::Callback(token),
        })
    }

    fn url(label: String, url: &str) -> Self {
        Self {
            label,
            target: ButtonTarget::Url(url.to_string()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        match &self.target {
            ButtonTarget::Callback(token) => Some(token),
            ButtonTarget::Url(_) => None,
        }
    }
}

/// Rendered screen: HTML text plus button rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub text: String,
    pub buttons: Vec<Vec<Button>>,
}

impl Menu {
    /// All callback tokens, row by row
    pub fn tokens(&self) -> Vec<&str> {
        self.buttons
            .iter()
            .flatten()
            .filter_map(Button::token)
            .collect()
    }

    /// Telegram inline keyboard for this menu
    pub fn reply_markup(&self) -> InlineKeyboardMarkup {
        let rows = self.buttons.iter().map(|row| {
            row.iter()
                .filter_map(|button| match &button.target {
                    ButtonTarget::Callback(token) => {
                        Some(InlineKeyboardButton::callback(button.label.clone(), token.clone()))
                    }
                    ButtonTarget::Url(url) => reqwest::Url::parse(url)
                        .ok()
                        .map(|url| InlineKeyboardButton::url(button.label.clone(), url)),
                })
                .collect::<Vec<_>>()
        });
        InlineKeyboardMarkup::new(rows)
    }
}

/// One-line message shown above a re-rendered screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    UnknownAction,
    Validation(ValidationError),
    CatalogUnavailable,
}

impl Notice {
    pub fn key(&self) -> &'static str {
        match self {
            Notice::UnknownAction => "notice-unknown-action",
            Notice::Validation(e) => e.notice_key(),
            Notice::CatalogUnavailable => "notice-catalog-unavailable",
        }
    }

    pub fn text(&self, language: Language) -> String {
        t_lang(self.key(), language)
    }
}

/// Cart line joined with its catalog entry, if the product still exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemView {
    pub line: CartLine,
    pub product: Option<ProductSummary>,
}

/// Everything a screen needs besides the screen itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub language: Language,
    pub notice: Option<Notice>,
    /// Render the main menu as the `/start` welcome
    pub welcome: bool,
    pub user_name: Option<String>,
    pub categories: Vec<Category>,
    pub products: Vec<ProductSummary>,
    pub product: Option<CatalogProduct>,
    /// Whether `product` is on the favorites list
    pub favorite: bool,
    pub favorites: Vec<ProductSummary>,
    pub cart: Vec<CartItemView>,
}

impl RenderContext {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Default::default()
        }
    }
}

/// Format a tenge amount with space-grouped thousands: `185 000 ₸`
pub fn format_price(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    format!("{grouped} ₸")
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Display title of a category, unescaped
pub fn category_title(category_id: &str, language: Language) -> String {
    try_t_lang(&format!("category-{category_id}"), language).unwrap_or_else(|| category_id.to_string())
}

/// Render a screen
pub fn render(screen: &Screen, ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let mut menu = match screen {
        Screen::MainMenu => render_main_menu(ctx),
        Screen::Catalog => render_catalog(ctx),
        Screen::Category { category_id } => render_category(category_id, ctx),
        Screen::Product { product_id } => render_product(product_id, ctx),
        Screen::SizePicker { product_id } => render_size_picker(product_id, ctx),
        Screen::ColorPicker { product_id, size } => render_color_picker(product_id, size, ctx),
        Screen::AddedToCart {
            product_id,
            size,
            color,
        } => render_added_to_cart(product_id, size, color, ctx),
        Screen::Cart => render_cart(ctx),
        Screen::Favorites => render_favorites(ctx),
        Screen::Orders => render_static(
            &[t_lang("orders-empty-title", lang), t_lang("orders-empty-hint", lang)],
            vec![catalog_row(lang)],
            lang,
        ),
        Screen::Settings => render_settings(ctx),
        Screen::Contacts => render_contacts(lang),
    };

    if let Some(notice) = &ctx.notice {
        menu.text = format!("{}\n\n{}", notice.text(lang), menu.text);
    }
    menu
}

/// Menu offered when the catalog cannot be reached
///
/// `retry_token` re-sends the action that failed.
pub fn render_retry(language: Language, retry_token: Option<&str>) -> Menu {
    let mut buttons = Vec::new();
    if let Some(token) = retry_token {
        buttons.push(vec![Button {
            label: t_lang("button-retry", language),
            target: ButtonTarget::Callback(token.to_string()),
        }]);
    }
    buttons.push(main_menu_row(language));
    Menu {
        text: Notice::CatalogUnavailable.text(language),
        buttons,
    }
}

fn row(buttons: impl IntoIterator<Item = Option<Button>>) -> Vec<Button> {
    buttons.into_iter().flatten().collect()
}

fn main_menu_row(lang: Language) -> Vec<Button> {
    row([Button::callback(t_lang("button-main-menu", lang), Action::MainMenu, &[])])
}

fn catalog_row(lang: Language) -> Vec<Button> {
    row([Button::callback(t_lang("button-back-to-catalog", lang), Action::Catalog, &[])])
}

/// Drop empty rows and append the main menu row
fn finish(text: String, mut buttons: Vec<Vec<Button>>, lang: Language) -> Menu {
    buttons.push(main_menu_row(lang));
    buttons.retain(|row| !row.is_empty());
    Menu { text, buttons }
}

fn render_main_menu(ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let text = if ctx.welcome {
        let name = ctx
            .user_name
            .as_deref()
            .map(escape_html)
            .unwrap_or_else(|| t_lang("welcome-default-name", lang));
        format!(
            "{}\n\n{}\n\n{}\n\n{}",
            t_lang("welcome-title", lang),
            t_args_lang("welcome-greeting", &[("name", &name)], lang),
            t_lang("welcome-body", lang),
            t_lang("main-menu-prompt", lang)
        )
    } else {
        format!(
            "{}\n\n{}",
            t_lang("main-menu-title", lang),
            t_lang("main-menu-prompt", lang)
        )
    };

    let buttons = vec![
        row([
            Button::callback(t_lang("button-catalog", lang), Action::Catalog, &[]),
            Button::callback(t_lang("button-favorites", lang), Action::Favorites, &[]),
        ]),
        row([
            Button::callback(t_lang("button-cart", lang), Action::Cart, &[]),
            Button::callback(t_lang("button-orders", lang), Action::Orders, &[]),
        ]),
        row([
            Button::callback(t_lang("button-settings", lang), Action::Settings, &[]),
            Button::callback(t_lang("button-contacts", lang), Action::Contacts, &[]),
        ]),
    ];
    Menu { text, buttons }
}

fn render_catalog(ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let text = format!("{}\n\n{}", t_lang("catalog-title", lang), t_lang("catalog-prompt", lang));

    // 2-2-1 layout
    let category_buttons: Vec<Button> = ctx
        .categories
        .iter()
        .filter_map(|c| Button::callback(category_title(&c.id, lang), Action::Category, &[&c.id]))
        .collect();
    let mut buttons: Vec<Vec<Button>> = category_buttons.chunks(2).map(<[Button]>::to_vec).collect();
    buttons.push(row([Button::callback(t_lang("button-back", lang), Action::MainMenu, &[])]));

    Menu { text, buttons }
}

fn render_category(category_id: &str, ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let title = format!("<b>{}</b>", escape_html(&category_title(category_id, lang)));

    let text = if ctx.products.is_empty() {
        format!("{}\n\n{}", title, t_lang("category-empty", lang))
    } else {
        format!("{}\n\n{}", title, t_lang("category-prompt", lang))
    };

    let mut buttons: Vec<Vec<Button>> = ctx
        .products
        .iter()
        .map(|p| {
            row([Button::callback(
                format!("{} · {}", p.name, format_price(p.price)),
                Action::Product,
                &[&p.id],
            )])
        })
        .collect();
    buttons.push(catalog_row(lang));

    finish(text, buttons, lang)
}

fn product_header(product: &CatalogProduct) -> String {
    format!(
        "<b>{}</b>\n\n💰 {}",
        escape_html(&product.name),
        format_price(product.price)
    )
}

fn missing_product(lang: Language) -> Menu {
    finish(t_lang("product-missing", lang), vec![catalog_row(lang)], lang)
}

fn render_product(product_id: &str, ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let Some(product) = ctx.product.as_ref().filter(|p| p.id == product_id) else {
        return missing_product(lang);
    };

    let mut text = product_header(product);
    if !product.description.is_empty() {
        text.push_str(&format!(
            "\n\n{}\n{}",
            t_lang("product-description-label", lang),
            escape_html(&product.description)
        ));
    }
    if !product.sizes.is_empty() {
        text.push_str(&format!(
            "\n\n{} {}",
            t_lang("product-sizes-label", lang),
            escape_html(&product.sizes.join(" "))
        ));
    }
    if !product.colors.is_empty() {
        let colors: Vec<&str> = product.colors.iter().map(|c| c.name.as_str()).collect();
        text.push_str(&format!(
            "\n{} {}",
            t_lang("product-colors-label", lang),
            escape_html(&colors.join(", "))
        ));
    }

    let favorite_label = if ctx.favorite {
        t_lang("button-favorite-remove", lang)
    } else {
        t_lang("button-favorite-add", lang)
    };
    let buttons = vec![
        row([Button::callback(t_lang("button-choose-size", lang), Action::Size, &[&product.id])]),
        row([Button::callback(favorite_label, Action::Favorite, &[&product.id])]),
        row([Button::callback(
            t_lang("button-back", lang),
            Action::Category,
            &[&product.category_id],
        )]),
    ];
    finish(text, buttons, lang)
}

fn render_size_picker(product_id: &str, ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let Some(product) = ctx.product.as_ref().filter(|p| p.id == product_id) else {
        return missing_product(lang);
    };

    let text = format!("{}\n\n{}", product_header(product), t_lang("size-picker-title", lang));

    let size_buttons: Vec<Button> = product
        .sizes
        .iter()
        .filter_map(|size| Button::callback(size.clone(), Action::SelectSize, &[&product.id, size]))
        .collect();
    let mut buttons: Vec<Vec<Button>> = size_buttons.chunks(2).map(<[Button]>::to_vec).collect();
    buttons.push(row([Button::callback(
        t_lang("button-back", lang),
        Action::Product,
        &[&product.id],
    )]));

    finish(text, buttons, lang)
}

fn render_color_picker(product_id: &str, size: &str, ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let Some(product) = ctx.product.as_ref().filter(|p| p.id == product_id) else {
        return missing_product(lang);
    };

    let text = format!(
        "{}\n{}: <b>{}</b>\n\n{}",
        product_header(product),
        t_lang("label-size", lang),
        escape_html(size),
        t_lang("color-picker-title", lang)
    );

    let mut buttons: Vec<Vec<Button>> = product
        .colors
        .iter()
        .map(|color| {
            row([Button::callback(
                color.name.clone(),
                Action::SelectColor,
                &[&product.id, size, &color.name],
            )])
        })
        .collect();
    buttons.push(row([Button::callback(t_lang("button-back", lang), Action::Size, &[&product.id])]));

    finish(text, buttons, lang)
}

fn render_added_to_cart(product_id: &str, size: &str, color: &str, ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let mut text = t_lang("added-title", lang);
    match ctx.product.as_ref().filter(|p| p.id == product_id) {
        Some(product) => text.push_str(&format!("\n\n{}", product_header(product))),
        None => text.push_str(&format!("\n\n#{}", escape_html(product_id))),
    }
    text.push_str(&format!(
        "\n{}: <b>{}</b>\n{}: <b>{}</b>",
        t_lang("label-size", lang),
        escape_html(size),
        t_lang("label-color", lang),
        escape_html(color)
    ));

    let buttons = vec![
        row([Button::callback(t_lang("button-cart", lang), Action::Cart, &[])]),
        row([Button::callback(t_lang("button-continue-shopping", lang), Action::Catalog, &[])]),
    ];
    finish(text, buttons, lang)
}

fn render_cart(ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    if ctx.cart.is_empty() {
        let text = format!("{}\n\n{}", t_lang("cart-empty-title", lang), t_lang("cart-empty-hint", lang));
        return finish(text, vec![catalog_row(lang)], lang);
    }

    let mut text = t_lang("cart-title", lang);
    let mut total: u64 = 0;
    for (index, item) in ctx.cart.iter().enumerate() {
        let line = &item.line;
        let line_total = item
            .product
            .as_ref()
            .map(|p| p.price.saturating_mul(u64::from(line.quantity)));
        total = total.saturating_add(line_total.unwrap_or(0));
        if index >= MAX_LISTED_CART_LINES {
            continue;
        }

        let name = item
            .product
            .as_ref()
            .map(|p| escape_html(&p.name))
            .unwrap_or_else(|| format!("#{}", escape_html(&line.product_id)));
        text.push_str(&format!(
            "\n\n• <b>{}</b>\n   {}: {}, {}: {}",
            name,
            t_lang("label-size", lang),
            escape_html(&line.size),
            t_lang("label-color", lang),
            escape_html(&line.color)
        ));
        if let (Some(product), Some(line_total)) = (&item.product, line_total) {
            text.push_str(&format!(
                "\n   {}: {} × {} = {}",
                t_lang("label-quantity", lang),
                line.quantity,
                format_price(product.price),
                format_price(line_total)
            ));
        }
    }
    if ctx.cart.len() > MAX_LISTED_CART_LINES {
        let hidden = (ctx.cart.len() - MAX_LISTED_CART_LINES).to_string();
        text.push_str(&format!(
            "\n\n{}",
            t_args_lang("cart-more-lines", &[("count", &hidden)], lang)
        ));
    }

    text.push_str(&format!(
        "\n\n{}",
        t_args_lang("cart-total", &[("total", &format_price(total))], lang)
    ));
    let fee = delivery_fee(total);
    if fee > 0 {
        text.push_str(&format!(
            "\n{}\n{}",
            t_args_lang("cart-delivery", &[("cost", &format_price(fee))], lang),
            t_args_lang("cart-to-pay", &[("amount", &format_price(total.saturating_add(fee)))], lang)
        ));
    } else {
        text.push_str(&format!(
            "\n{}",
            t_args_lang(
                "cart-delivery-free",
                &[("threshold", &format_price(FREE_DELIVERY_THRESHOLD))],
                lang
            )
        ));
    }

    let buttons = vec![
        row([Button::callback(t_lang("button-clear-cart", lang), Action::ClearCart, &[])]),
        row([Button::callback(t_lang("button-continue-shopping", lang), Action::Catalog, &[])]),
    ];
    finish(text, buttons, lang)
}

fn render_favorites(ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    if ctx.favorites.is_empty() {
        let text = format!(
            "{}\n\n{}",
            t_lang("favorites-empty-title", lang),
            t_lang("favorites-empty-hint", lang)
        );
        return finish(text, vec![catalog_row(lang)], lang);
    }

    let mut text = t_args_lang(
        "favorites-title",
        &[("count", &ctx.favorites.len().to_string())],
        lang,
    );
    let mut buttons = Vec::with_capacity(ctx.favorites.len() + 1);
    for (i, product) in ctx.favorites.iter().enumerate() {
        let index = (i + 1).to_string();
        text.push_str(&format!(
            "\n\n{}. <b>{}</b>\n   💰 {}",
            index,
            escape_html(&product.name),
            format_price(product.price)
        ));
        buttons.push(row([
            Button::callback(
                t_args_lang("button-favorite-view", &[("index", &index)], lang),
                Action::Product,
                &[&product.id],
            ),
            Button::callback(
                t_args_lang("button-favorite-delete", &[("index", &index)], lang),
                Action::RemoveFavorite,
                &[&product.id],
            ),
        ]));
    }
    buttons.push(catalog_row(lang));
    finish(text, buttons, lang)
}

fn render_static(paragraphs: &[String], buttons: Vec<Vec<Button>>, lang: Language) -> Menu {
    finish(paragraphs.join("\n\n"), buttons, lang)
}

fn render_settings(ctx: &RenderContext) -> Menu {
    let lang = ctx.language;
    let language_name = t_lang(&format!("language-name-{}", lang.code()), lang);
    let text = format!(
        "{}\n\n{}\n\n{}",
        t_lang("settings-title", lang),
        t_args_lang("settings-language", &[("language", &language_name)], lang),
        t_lang("settings-prompt", lang)
    );

    let buttons = vec![row(Language::ALL.into_iter().map(|option| {
        Button::callback(
            t_lang(&format!("button-language-{}", option.code()), lang),
            Action::Language,
            &[option.code()],
        )
    }))];
    finish(text, buttons, lang)
}

fn render_contacts(lang: Language) -> Menu {
    let text = [
        "contacts-title",
        "contacts-address",
        "contacts-phone",
        "contacts-email",
        "contacts-hours",
    ]
    .iter()
    .map(|key| t_lang(key, lang))
    .collect::<Vec<_>>()
    .join("\n\n");

    let buttons = vec![
        vec![
            Button::url(t_lang("button-whatsapp", lang), WHATSAPP_URL),
            Button::url(t_lang("button-instagram", lang), INSTAGRAM_URL),
        ],
        vec![Button::url(t_lang("button-telegram", lang), TELEGRAM_URL)],
    ];
    finish(text, buttons, lang)
}
