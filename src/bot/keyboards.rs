use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::config::Config;
use crate::models::{fmt_usd, Product};

pub const BTN_TRIAL: &str = "🎫 Free Trial";
pub const BTN_BUY: &str = "🛍 Buy Subscription";
pub const BTN_WALLET: &str = "💰 Wallet";
pub const BTN_INVITE: &str = "🤝 Invite Friends";
pub const BTN_REPORT: &str = "📊 Monthly Report";
pub const BTN_SUPPORT: &str = "🧰 Support";
pub const BTN_HELP: &str = "❓ Help";

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BTN_TRIAL), KeyboardButton::new(BTN_BUY)],
        vec![
            KeyboardButton::new(BTN_WALLET),
            KeyboardButton::new(BTN_INVITE),
        ],
        vec![
            KeyboardButton::new(BTN_REPORT),
            KeyboardButton::new(BTN_SUPPORT),
        ],
        vec![KeyboardButton::new(BTN_HELP)],
    ])
    .resize_keyboard()
}

pub fn products_keyboard(config: &Config) -> InlineKeyboardMarkup {
    let label = |product: Product| {
        format!(
            "{} - ${}",
            product.label(),
            fmt_usd(config.price_for(product))
        )
    };
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            label(Product::Normal),
            "buy_normal",
        )],
        vec![InlineKeyboardButton::callback(
            label(Product::Premium),
            "buy_premium",
        )],
        vec![InlineKeyboardButton::callback(
            label(Product::GiftNormal),
            "buy_gift_normal",
        )],
        vec![InlineKeyboardButton::callback(
            label(Product::GiftPremium),
            "buy_gift_premium",
        )],
    ])
}

pub fn payment_keyboard(product: Product) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("💳 Card (IRR)", format!("pay_{}_card", product.as_str())),
        InlineKeyboardButton::callback("₮ USDT", format!("pay_{}_usdt", product.as_str())),
    ]])
}

pub fn skip_discount_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Skip, no code",
        "disc_skip",
    )]])
}

pub fn admin_purchase_keyboard(purchase_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Approve", format!("appr_{}", purchase_id)),
        InlineKeyboardButton::callback("❌ Reject", format!("rejp_{}", purchase_id)),
    ]])
}

pub fn admin_withdrawal_keyboard(withdrawal_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Complete", format!("wcomp_{}", withdrawal_id)),
        InlineKeyboardButton::callback("❌ Reject", format!("wrej_{}", withdrawal_id)),
    ]])
}

pub fn withdraw_method_keyboard(amount_usd: f64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("💳 Card", format!("wm_card_{}", amount_usd)),
        InlineKeyboardButton::callback("₮ USDT", format!("wm_usdt_{}", amount_usd)),
    ]])
}

pub fn wallet_keyboard(show_withdraw: bool) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if show_withdraw {
        rows.push(vec![InlineKeyboardButton::callback(
            "💸 Withdraw",
            "withdraw",
        )]);
    }
    InlineKeyboardMarkup::new(rows)
}
