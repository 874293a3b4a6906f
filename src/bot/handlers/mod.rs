use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::error;

use crate::bot::keyboards::admin_purchase_keyboard;
use crate::models::{fmt_usd, PayMethod, Product};
use crate::session::Conversation;
use crate::state::AppState;

pub mod admin;
pub mod callback;
pub mod command;

pub const APOLOGY: &str = "Something went wrong on our side. Please try again later.";

pub async fn send_plain(bot: &Bot, tg_id: i64, text: &str) {
    if let Err(e) = bot.send_message(ChatId(tg_id), text).await {
        error!("failed to send message to {}: {}", tg_id, e);
    }
}

/// Creates the pending purchase and walks the user into proof submission.
/// Shared by the discount-code text path and the skip button.
pub async fn begin_payment(
    bot: &Bot,
    state: &AppState,
    tg_id: i64,
    username: &str,
    product: Product,
    method: PayMethod,
    discount_percent: f64,
) {
    let purchase = match state
        .purchases
        .create_purchase(tg_id, username, product, method, discount_percent)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            error!("failed to create purchase for {}: {:#}", tg_id, e);
            send_plain(bot, tg_id, APOLOGY).await;
            return;
        }
    };

    let instructions = match method {
        PayMethod::Card => format!(
            "💳 {}\n\nTransfer {:.0} IRR (${}) to this card:\n{}\n\n\
             Then send the receipt photo or the transaction id here.",
            product.label(),
            purchase.amount_irr,
            fmt_usd(purchase.amount_usd),
            state.config.card_number
        ),
        PayMethod::Usdt => format!(
            "₮ {}\n\nSend ${} USDT (TRC20) to this address:\n{}\n\n\
             Then send the transaction id here.",
            product.label(),
            fmt_usd(purchase.amount_usd),
            state.config.usdt_address
        ),
    };
    send_plain(bot, tg_id, &instructions).await;
    state.sessions.set(
        tg_id,
        Conversation::AwaitingProof {
            purchase_id: purchase.purchase_id,
        },
    );
}

/// Records the proof and pings every admin with Approve/Reject buttons.
pub async fn submit_proof(bot: &Bot, state: &AppState, tg_id: i64, purchase_id: &str, proof: &str) {
    let purchase = match state.purchases.attach_proof(purchase_id, proof).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            send_plain(bot, tg_id, "This payment is no longer pending.").await;
            return;
        }
        Err(e) => {
            error!("failed to attach proof to {}: {:#}", purchase_id, e);
            send_plain(bot, tg_id, APOLOGY).await;
            return;
        }
    };

    send_plain(
        bot,
        tg_id,
        "Thanks! Your payment is being reviewed. You will be notified once it is confirmed.",
    )
    .await;

    let summary = format!(
        "Pending purchase {}\nuser: {} (@{})\nproduct: {}\namount: ${}\nproof: {}",
        purchase.purchase_id,
        purchase.telegram_id,
        purchase.username,
        purchase.product.label(),
        fmt_usd(purchase.amount_usd),
        purchase.transaction_id
    );
    for admin in &state.config.admin_ids {
        let _ = bot
            .send_message(ChatId(*admin), &summary)
            .reply_markup(admin_purchase_keyboard(&purchase.purchase_id))
            .await;
    }
    if let Err(e) = state.purchases.mark_admin_notified(purchase_id).await {
        error!("failed to mark {} notified: {:#}", purchase_id, e);
    }
}
