//! # Flow Tests
//!
//! End-to-end runs of the shopping flow: raw update JSON in, recorded
//! Bot API calls out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;

use ziggler_bot::bot::callback_token::decode;
use ziggler_bot::bot::cart::CartLine;
use ziggler_bot::bot::dialogue_manager::{route, Event, FlowRouter, Sender};
use ziggler_bot::bot::transport::{OutboundCall, SimulatedTransport};
use ziggler_bot::bot::ui_builder::{render, Menu, RenderContext};
use ziggler_bot::catalog::{
    CatalogError, CatalogLookup, CatalogProduct, Category, GuardedCatalog, InMemoryCatalog, ProductColor,
    ProductSummary,
};
use ziggler_bot::config::{BotConfig, RecoveryConfig};
use ziggler_bot::dialogue::{Conversation, Screen};
use ziggler_bot::localization::Language;
use ziggler_bot::runtime::BotRuntime;

const CHAT: i64 = 1;

fn harness_over(catalog: impl CatalogLookup + 'static) -> (BotRuntime, Arc<SimulatedTransport>) {
    let transport = Arc::new(SimulatedTransport::new());
    let config = BotConfig {
        simulation: true,
        ..Default::default()
    };
    let runtime = BotRuntime::with_transport(config, Arc::new(catalog), transport.clone());
    (runtime, transport)
}

fn harness_with(catalog: InMemoryCatalog) -> (BotRuntime, Arc<SimulatedTransport>) {
    harness_over(catalog)
}

fn harness() -> (BotRuntime, Arc<SimulatedTransport>) {
    harness_with(InMemoryCatalog::seeded())
}

async fn send_text(runtime: &BotRuntime, text: &str) {
    let update = json!({
        "update_id": 1,
        "message": {
            "message_id": 1,
            "from": {"id": CHAT, "first_name": "Aida", "language_code": "ru"},
            "chat": {"id": CHAT},
            "text": text
        }
    });
    runtime.process_update(update.to_string().as_bytes()).await.unwrap();
}

async fn press(runtime: &BotRuntime, data: &str) {
    let update = json!({
        "update_id": 2,
        "callback_query": {
            "id": format!("cb-{data}"),
            "from": {"id": CHAT, "first_name": "Aida", "language_code": "ru"},
            "message": {"message_id": 10, "chat": {"id": CHAT}},
            "data": data
        }
    });
    runtime.process_update(update.to_string().as_bytes()).await.unwrap();
}

fn last_menu(transport: &SimulatedTransport) -> Menu {
    transport.last_menu(CHAT).expect("a menu was delivered")
}

fn last_toast(transport: &SimulatedTransport) -> Option<String> {
    transport.calls().into_iter().rev().find_map(|call| match call {
        OutboundCall::AcknowledgeCallback { text, .. } => Some(text),
        _ => None,
    })?
}

async fn conversation(runtime: &BotRuntime) -> Conversation {
    let handle = runtime.engine().store().acquire(CHAT);
    let conversation = handle.lock().await;
    conversation.clone()
}

#[tokio::test]
async fn test_happy_path_from_start_to_cart() {
    let (runtime, transport) = harness();

    send_text(&runtime, "/start").await;
    let menu = last_menu(&transport);
    assert!(menu.text.contains("Ziggler"));
    assert!(menu.text.contains("Aida"));
    assert_eq!(menu.buttons.len(), 3);
    assert_eq!(
        menu.tokens(),
        vec!["catalog", "favorites", "cart", "orders", "settings", "contacts"]
    );

    press(&runtime, "catalog").await;
    let menu = last_menu(&transport);
    assert_eq!(menu.buttons.len(), 4, "3 category rows + back row");
    assert_eq!(
        &menu.tokens()[..5],
        &[
            "category_classic",
            "category_slim",
            "category_casual",
            "category_festive",
            "category_sales"
        ]
    );

    press(&runtime, "category_classic").await;
    let menu = last_menu(&transport);
    assert!(menu.tokens().contains(&"product_1"));
    assert!(!menu.tokens().contains(&"product_2"));

    press(&runtime, "product_1").await;
    let menu = last_menu(&transport);
    assert!(menu.text.contains("185 000 ₸"));
    assert!(menu.tokens().contains(&"size_1"));

    press(&runtime, "size_1").await;
    let menu = last_menu(&transport);
    let sizes: Vec<&str> = menu
        .tokens()
        .into_iter()
        .filter(|t| t.starts_with("select_size_"))
        .collect();
    assert_eq!(
        sizes,
        vec![
            "select_size_1_46S",
            "select_size_1_48R",
            "select_size_1_50L",
            "select_size_1_52XL"
        ]
    );

    press(&runtime, "select_size_1_48R").await;
    let menu = last_menu(&transport);
    assert!(menu.tokens().contains(&"select_color_1_48R_Темно-синий"));
    assert!(menu.tokens().contains(&"select_color_1_48R_Серый"));

    press(&runtime, "select_color_1_48R_Темно-синий").await;
    let menu = last_menu(&transport);
    assert!(menu.text.contains("48R"));
    assert!(menu.text.contains("Темно-синий"));
    assert_eq!(last_toast(&transport).as_deref(), Some("✅ Товар добавлен в корзину!"));

    let conversation = conversation(&runtime).await;
    assert_eq!(
        conversation.list_lines(),
        &[CartLine::new("1", "48R", "Темно-синий")]
    );
    assert!(conversation.pending_selection.is_empty());
    assert_eq!(
        conversation.screen,
        Screen::AddedToCart {
            product_id: "1".into(),
            size: "48R".into(),
            color: "Темно-синий".into()
        }
    );

    press(&runtime, "cart").await;
    let menu = last_menu(&transport);
    assert!(menu.text.contains("185 000 ₸"));
    assert!(menu.tokens().contains(&"clear_cart"));
}

#[tokio::test]
async fn test_unknown_text_falls_back_to_main_menu() {
    let (runtime, transport) = harness();

    send_text(&runtime, "asdf123").await;
    let menu = last_menu(&transport);
    assert!(menu.text.starts_with("⚠️ Неизвестная команда"));
    assert_eq!(menu.buttons.len(), 3);
    assert_eq!(conversation(&runtime).await.screen, Screen::MainMenu);
}

#[tokio::test]
async fn test_color_with_separator_survives_the_flow() {
    let mut catalog = InMemoryCatalog::seeded();
    catalog.products.push(CatalogProduct {
        id: "7".into(),
        name: "Tuxedo".into(),
        price: 90_000,
        description: String::new(),
        category_id: "festive".into(),
        sizes: vec!["48R".into()],
        colors: vec![ProductColor {
            name: "Dark_Blue".into(),
            swatch: "#00008b".into(),
        }],
    });
    let (runtime, transport) = harness_with(catalog);

    for data in ["catalog", "category_festive", "product_7", "size_7", "select_size_7_48R"] {
        press(&runtime, data).await;
    }
    assert!(last_menu(&transport).tokens().contains(&"select_color_7_48R_Dark_Blue"));

    press(&runtime, "select_color_7_48R_Dark_Blue").await;
    let conversation = conversation(&runtime).await;
    assert_eq!(conversation.list_lines(), &[CartLine::new("7", "48R", "Dark_Blue")]);

    // under the free delivery threshold
    press(&runtime, "cart").await;
    assert!(last_menu(&transport).text.contains("5 000 ₸"));
}

#[tokio::test]
async fn test_text_commands_with_bot_suffix() {
    let (runtime, transport) = harness();

    send_text(&runtime, "/catalog@ZigglerBot").await;
    assert_eq!(conversation(&runtime).await.screen, Screen::Catalog);
    assert!(last_menu(&transport).tokens().contains(&"category_classic"));

    send_text(&runtime, "/contacts").await;
    assert_eq!(conversation(&runtime).await.screen, Screen::Contacts);
}

#[tokio::test]
async fn test_callbacks_edit_the_carrying_message() {
    let (runtime, transport) = harness();

    press(&runtime, "orders").await;
    let calls = transport.calls();
    assert!(matches!(
        &calls[0],
        OutboundCall::EditMessage { chat_id: CHAT, message_id: 10, .. }
    ));
    assert!(matches!(&calls[1], OutboundCall::AcknowledgeCallback { callback_id, .. } if callback_id == "cb-orders"));
}

#[tokio::test]
async fn test_callback_without_message_is_only_acknowledged() {
    let (runtime, transport) = harness();
    let update = json!({
        "update_id": 3,
        "callback_query": {"id": "inline-1", "from": {"id": CHAT}, "data": "catalog"}
    });
    runtime.process_update(update.to_string().as_bytes()).await.unwrap();

    assert_eq!(
        transport.calls(),
        vec![OutboundCall::AcknowledgeCallback {
            callback_id: "inline-1".into(),
            text: None
        }]
    );
    assert!(runtime.engine().store().is_empty());
}

#[tokio::test]
async fn test_clear_cart() {
    let (runtime, transport) = harness();
    for data in [
        "catalog",
        "category_classic",
        "product_1",
        "size_1",
        "select_size_1_50L",
        "select_color_1_50L_Серый",
        "cart",
        "clear_cart",
    ] {
        press(&runtime, data).await;
    }

    assert!(conversation(&runtime).await.list_lines().is_empty());
    assert!(last_menu(&transport).text.contains("пуста"));
    assert_eq!(last_toast(&transport).as_deref(), Some("🗑️ Корзина очищена"));
}

#[tokio::test]
async fn test_language_switch() {
    let (runtime, transport) = harness();

    press(&runtime, "settings").await;
    press(&runtime, "language_en").await;
    let conversation_state = conversation(&runtime).await;
    assert_eq!(conversation_state.language, Some(Language::En));
    assert_eq!(conversation_state.screen, Screen::Settings);
    assert!(last_menu(&transport).text.contains("Settings"));

    // the override wins over the client's language_code
    press(&runtime, "main_menu").await;
    assert!(last_menu(&transport).text.contains("Main menu"));

    press(&runtime, "settings").await;
    press(&runtime, "language_de").await;
    assert_eq!(conversation(&runtime).await.language, Some(Language::En));
    assert!(last_menu(&transport).text.starts_with("⚠️ This language is not supported."));
}

fn router() -> FlowRouter {
    FlowRouter::new(Arc::new(GuardedCatalog::new(
        Arc::new(InMemoryCatalog::seeded()),
        Duration::from_secs(1),
        RecoveryConfig::default(),
    )))
}

fn at(screen: Screen) -> Conversation {
    Conversation {
        screen,
        ..Conversation::new(CHAT)
    }
}

#[tokio::test]
async fn test_unavailable_size_keeps_the_screen() {
    let router = router();
    let mut conversation = at(Screen::SizePicker { product_id: "1".into() });

    let reply = router
        .handle(&mut conversation, &Event::Callback("select_size_1_60XXL".into()), &Sender::default())
        .await;

    assert_eq!(conversation.screen, Screen::SizePicker { product_id: "1".into() });
    assert!(reply.menu.text.starts_with("⚠️ Этого размера нет в наличии"));
    assert!(reply.menu.tokens().contains(&"select_size_1_48R"));
    assert_eq!(reply.toast.as_deref(), Some("⚠️ Этого размера нет в наличии. Выберите другой."));
}

#[tokio::test]
async fn test_unknown_product_keeps_the_screen() {
    let router = router();
    let mut conversation = at(Screen::Category {
        category_id: "classic".into(),
    });

    let reply = router
        .handle(&mut conversation, &Event::Callback("product_999".into()), &Sender::default())
        .await;

    assert_eq!(
        conversation.screen,
        Screen::Category {
            category_id: "classic".into()
        }
    );
    assert!(reply.menu.text.starts_with("⚠️ Товар не найден."));
    assert!(conversation.pending_selection.is_empty());
}

#[tokio::test]
async fn test_mismatched_ids_fall_back_to_main_menu() {
    let router = router();
    let mut conversation = at(Screen::SizePicker { product_id: "1".into() });

    let reply = router
        .handle(&mut conversation, &Event::Callback("select_size_2_48R".into()), &Sender::default())
        .await;

    assert_eq!(conversation.screen, Screen::MainMenu);
    assert!(reply.menu.text.starts_with("⚠️"));
    assert!(conversation.list_lines().is_empty());
}

#[tokio::test]
async fn test_leaving_the_selection_clears_pending() {
    let router = router();
    let mut conversation = at(Screen::Category {
        category_id: "classic".into(),
    });
    let sender = Sender::default();

    router
        .handle(&mut conversation, &Event::Callback("product_1".into()), &sender)
        .await;
    assert_eq!(conversation.pending_selection.product_id.as_deref(), Some("1"));

    router
        .handle(&mut conversation, &Event::Callback("size_1".into()), &sender)
        .await;
    router
        .handle(&mut conversation, &Event::Callback("select_size_1_48R".into()), &sender)
        .await;
    assert_eq!(conversation.pending_selection.size.as_deref(), Some("48R"));

    router
        .handle(&mut conversation, &Event::Callback("cart".into()), &sender)
        .await;
    assert!(conversation.pending_selection.is_empty());
}

#[tokio::test]
async fn test_favorites() {
    let (runtime, transport) = harness();

    for data in ["catalog", "category_classic", "product_1", "favorite_1"] {
        press(&runtime, data).await;
    }
    assert_eq!(last_toast(&transport).as_deref(), Some("❤️ Добавлено в избранное!"));
    let menu = last_menu(&transport);
    assert!(menu.buttons.iter().flatten().any(|b| b.label == "💔 Убрать из избранного"));

    let state = conversation(&runtime).await;
    assert_eq!(state.screen, Screen::Product { product_id: "1".into() });
    assert!(state.favorites.contains("1"));
    assert_eq!(state.pending_selection.product_id.as_deref(), Some("1"));

    press(&runtime, "favorites").await;
    let menu = last_menu(&transport);
    assert!(menu.text.contains("185 000 ₸"));
    assert!(menu.tokens().contains(&"product_1"));
    assert!(menu.tokens().contains(&"remove_fav_1"));

    // open the product straight from the list
    press(&runtime, "product_1").await;
    assert_eq!(conversation(&runtime).await.screen, Screen::Product { product_id: "1".into() });

    press(&runtime, "favorites").await;
    press(&runtime, "remove_fav_1").await;
    assert_eq!(last_toast(&transport).as_deref(), Some("💔 Удалено из избранного"));
    assert!(last_menu(&transport).text.contains("Избранное пусто"));
    assert!(conversation(&runtime).await.favorites.is_empty());
}

#[tokio::test]
async fn test_favorite_toggle_twice_removes() {
    let (runtime, transport) = harness();

    for data in ["catalog", "category_classic", "product_1", "favorite_1", "favorite_1"] {
        press(&runtime, data).await;
    }
    assert_eq!(last_toast(&transport).as_deref(), Some("💔 Удалено из избранного"));
    assert!(conversation(&runtime).await.favorites.is_empty());
}

/// Seeded catalog behind a delay and a gate
struct SlowCatalog {
    inner: InMemoryCatalog,
    delay: Duration,
    gate: Arc<Semaphore>,
}

impl SlowCatalog {
    fn delayed(delay: Duration) -> Self {
        Self {
            inner: InMemoryCatalog::seeded(),
            delay,
            gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            inner: InMemoryCatalog::seeded(),
            delay: Duration::ZERO,
            gate,
        }
    }

    async fn wait(&self) -> Result<(), CatalogError> {
        tokio::time::sleep(self.delay).await;
        self.gate
            .acquire()
            .await
            .map(drop)
            .map_err(|_| CatalogError::Backend("gate closed".into()))
    }
}

#[async_trait]
impl CatalogLookup for SlowCatalog {
    async fn categories(&self) -> Result<Vec<Category>, CatalogError> {
        self.wait().await?;
        self.inner.categories().await
    }
    async fn get_product(&self, id: &str) -> Result<Option<CatalogProduct>, CatalogError> {
        self.wait().await?;
        self.inner.get_product(id).await
    }
    async fn list_by_category(&self, category_id: &str) -> Result<Option<Vec<ProductSummary>>, CatalogError> {
        self.wait().await?;
        self.inner.list_by_category(category_id).await
    }
}

#[tokio::test]
async fn test_events_for_one_chat_apply_in_receipt_order() {
    let (runtime, transport) = harness_over(SlowCatalog::delayed(Duration::from_millis(30)));
    for data in ["catalog", "category_classic", "product_1"] {
        press(&runtime, data).await;
    }

    // the second event is only legal once the first has been applied
    tokio::join!(press(&runtime, "size_1"), press(&runtime, "select_size_1_48R"));

    let state = conversation(&runtime).await;
    assert_eq!(
        state.screen,
        Screen::ColorPicker {
            product_id: "1".into(),
            size: "48R".into()
        }
    );
    assert_eq!(state.pending_selection.product_id.as_deref(), Some("1"));
    assert_eq!(state.pending_selection.size.as_deref(), Some("48R"));

    let edits: Vec<Menu> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            OutboundCall::EditMessage { menu, .. } => Some(menu),
            _ => None,
        })
        .collect();
    let [.., sizes, colors] = edits.as_slice() else {
        panic!("expected at least two edits");
    };
    assert!(sizes.tokens().contains(&"select_size_1_48R"));
    assert!(colors.tokens().contains(&"select_color_1_48R_Серый"));
}

#[tokio::test]
async fn test_chats_do_not_block_each_other() {
    let gate = Arc::new(Semaphore::new(0));
    let (runtime, transport) = harness_over(SlowCatalog::gated(Arc::clone(&gate)));
    let runtime = Arc::new(runtime);

    let first = {
        let runtime = Arc::clone(&runtime);
        let body = json!({"message": {"chat": {"id": 1}, "text": "/catalog"}}).to_string();
        tokio::spawn(async move { runtime.process_update(body.as_bytes()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    // chat 1 holds its conversation while it waits on the catalog
    assert!(runtime.engine().store().acquire(1).try_lock().is_err());

    let body = json!({"message": {"chat": {"id": 2}, "text": "/start"}}).to_string();
    runtime.process_update(body.as_bytes()).await.unwrap();
    assert!(transport.last_menu(2).is_some());
    assert!(transport.last_menu(1).is_none());
    assert!(!first.is_finished());

    gate.add_permits(1);
    first.await.unwrap().unwrap();
    assert!(transport.last_menu(1).unwrap().tokens().contains(&"category_classic"));
}

struct DownCatalog;

#[async_trait]
impl CatalogLookup for DownCatalog {
    async fn categories(&self) -> Result<Vec<Category>, CatalogError> {
        Err(CatalogError::Backend("connection refused".into()))
    }
    async fn get_product(&self, _id: &str) -> Result<Option<CatalogProduct>, CatalogError> {
        Err(CatalogError::Backend("connection refused".into()))
    }
    async fn list_by_category(&self, _category_id: &str) -> Result<Option<Vec<ProductSummary>>, CatalogError> {
        Err(CatalogError::Backend("connection refused".into()))
    }
}

#[tokio::test]
async fn test_catalog_outage_offers_retry() {
    let router = FlowRouter::new(Arc::new(GuardedCatalog::new(
        Arc::new(DownCatalog),
        Duration::from_secs(1),
        RecoveryConfig::default(),
    )));
    let mut conversation = Conversation::new(CHAT);

    let reply = router
        .handle(&mut conversation, &Event::Callback("catalog".into()), &Sender::default())
        .await;

    assert_eq!(conversation.screen, Screen::MainMenu);
    assert_eq!(reply.menu.tokens(), vec!["catalog", "main_menu"]);
    assert!(reply.menu.text.contains("недоступен"));
}

fn all_screens() -> Vec<Screen> {
    vec![
        Screen::MainMenu,
        Screen::Catalog,
        Screen::Category {
            category_id: "classic".into(),
        },
        Screen::Product { product_id: "1".into() },
        Screen::SizePicker { product_id: "1".into() },
        Screen::ColorPicker {
            product_id: "1".into(),
            size: "48R".into(),
        },
        Screen::AddedToCart {
            product_id: "1".into(),
            size: "48R".into(),
            color: "Серый".into(),
        },
        Screen::Cart,
        Screen::Favorites,
        Screen::Orders,
        Screen::Settings,
        Screen::Contacts,
    ]
}

const TOKENS: &[&str] = &[
    "main_menu",
    "catalog",
    "category_classic",
    "category_nope",
    "product_1",
    "product_2",
    "size_1",
    "size_2",
    "select_size_1_48R",
    "select_size_1_99Z",
    "select_color_1_48R_Серый",
    "select_color_1_48R_Розовый",
    "cart",
    "clear_cart",
    "favorites",
    "orders",
    "settings",
    "contacts",
    "favorite_1",
    "favorite_2",
    "remove_fav_1",
    "language_en",
    "language_xx",
    "",
    "_ _ _",
    "select_color_",
    "💥",
    "catalog_catalog",
];

#[tokio::test]
async fn test_every_unlisted_pair_falls_back_to_main_menu() {
    let router = router();
    let sender = Sender::default();

    for screen in all_screens() {
        for data in TOKENS {
            let mut conversation = at(screen.clone());
            let listed = route(&screen, &decode(data)).is_some();

            let reply = router
                .handle(&mut conversation, &Event::Callback(data.to_string()), &sender)
                .await;

            assert!(!reply.menu.buttons.is_empty(), "{screen:?} + {data:?} rendered no buttons");
            if !listed {
                assert_eq!(conversation.screen, Screen::MainMenu, "{screen:?} + {data:?}");
            }
        }
    }
}

#[tokio::test]
async fn test_rendering_is_idempotent() {
    let product = InMemoryCatalog::seeded().products[0].clone();
    let ctx = RenderContext {
        product: Some(product),
        welcome: true,
        user_name: Some("Aida".into()),
        ..RenderContext::new(Language::Ru)
    };

    for screen in all_screens() {
        let before = ctx.clone();
        assert_eq!(render(&screen, &ctx), render(&screen, &ctx));
        assert_eq!(ctx, before);
    }
}
