use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::error;

use crate::bot::handlers::{begin_payment, send_plain, APOLOGY};
use crate::bot::keyboards::{payment_keyboard, skip_discount_keyboard};
use crate::models::{fmt_usd, PayMethod, Product};
use crate::services::purchase_service::{ApproveOutcome, RejectOutcome};
use crate::services::withdrawal_service::ProcessOutcome;
use crate::session::Conversation;
use crate::state::AppState;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let callback_id = q.id.clone();
    let tg_id = q.from.id.0 as i64;
    let username = q.from.username.clone().unwrap_or_default();

    let Some(data) = q.data else {
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };

    match data.as_str() {
        buy if buy.starts_with("buy_") => {
            let Some(product) = Product::parse(&buy["buy_".len()..]) else {
                let _ = bot.answer_callback_query(callback_id).await;
                return Ok(());
            };
            let _ = bot.answer_callback_query(callback_id).await;
            let _ = bot
                .send_message(
                    ChatId(tg_id),
                    format!(
                        "{} - ${}\nHow would you like to pay?",
                        product.label(),
                        fmt_usd(state.config.price_for(product))
                    ),
                )
                .reply_markup(payment_keyboard(product))
                .await;
        }

        pay if pay.starts_with("pay_") => {
            // pay_<product>_<method>; the product itself may contain '_'.
            let rest = &pay["pay_".len()..];
            let Some((product_str, method_str)) = rest.rsplit_once('_') else {
                let _ = bot.answer_callback_query(callback_id).await;
                return Ok(());
            };
            let (Some(product), Some(method)) =
                (Product::parse(product_str), PayMethod::parse(method_str))
            else {
                let _ = bot.answer_callback_query(callback_id).await;
                return Ok(());
            };
            let _ = bot.answer_callback_query(callback_id).await;
            state
                .sessions
                .set(tg_id, Conversation::AwaitingDiscountCode { product, method });
            let _ = bot
                .send_message(
                    ChatId(tg_id),
                    "🎟 Have a discount code? Send it now, or skip:",
                )
                .reply_markup(skip_discount_keyboard())
                .await;
        }

        "disc_skip" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Some(Conversation::AwaitingDiscountCode { product, method }) =
                state.sessions.take(tg_id)
            {
                begin_payment(&bot, &state, tg_id, &username, product, method, 0.0).await;
            }
        }

        "withdraw" => {
            let _ = bot.answer_callback_query(callback_id).await;
            state
                .sessions
                .set(tg_id, Conversation::AwaitingWithdrawAmount);
            send_plain(
                &bot,
                tg_id,
                &format!(
                    "How much would you like to withdraw? (minimum ${})",
                    fmt_usd(state.config.min_withdrawal_usd)
                ),
            )
            .await;
        }

        wm if wm.starts_with("wm_") => {
            let rest = &wm["wm_".len()..];
            let Some((method_str, amount_str)) = rest.split_once('_') else {
                let _ = bot.answer_callback_query(callback_id).await;
                return Ok(());
            };
            let (Some(method), Ok(amount_usd)) =
                (PayMethod::parse(method_str), amount_str.parse::<f64>())
            else {
                let _ = bot.answer_callback_query(callback_id).await;
                return Ok(());
            };
            let _ = bot.answer_callback_query(callback_id).await;
            state.sessions.set(
                tg_id,
                Conversation::AwaitingWithdrawDestination { amount_usd, method },
            );
            let prompt = match method {
                PayMethod::Card => "Send the card number for the payout:",
                PayMethod::Usdt => "Send your USDT (TRC20) address:",
            };
            send_plain(&bot, tg_id, prompt).await;
        }

        appr if appr.starts_with("appr_") => {
            let purchase_id = appr["appr_".len()..].to_string();
            if !state.config.is_admin(tg_id) {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("Admins only.")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            let answer = handle_admin_purchase(&state, tg_id, &purchase_id, true).await;
            let _ = bot.answer_callback_query(callback_id).text(answer.clone()).await;
            send_plain(&bot, tg_id, &format!("{} {}", purchase_id, answer)).await;
        }
        rejp if rejp.starts_with("rejp_") => {
            let purchase_id = rejp["rejp_".len()..].to_string();
            if !state.config.is_admin(tg_id) {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("Admins only.")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            let answer = handle_admin_purchase(&state, tg_id, &purchase_id, false).await;
            let _ = bot.answer_callback_query(callback_id).text(answer.clone()).await;
            send_plain(&bot, tg_id, &format!("{} {}", purchase_id, answer)).await;
        }

        wcomp if wcomp.starts_with("wcomp_") => {
            let withdrawal_id = wcomp["wcomp_".len()..].to_string();
            if !state.config.is_admin(tg_id) {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("Admins only.")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            let answer = handle_admin_withdrawal(&state, tg_id, &withdrawal_id, true).await;
            let _ = bot.answer_callback_query(callback_id).text(answer).await;
            send_plain(&bot, tg_id, &format!("{} {}", withdrawal_id, answer)).await;
        }
        wrej if wrej.starts_with("wrej_") => {
            let withdrawal_id = wrej["wrej_".len()..].to_string();
            if !state.config.is_admin(tg_id) {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("Admins only.")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            let answer = handle_admin_withdrawal(&state, tg_id, &withdrawal_id, false).await;
            let _ = bot.answer_callback_query(callback_id).text(answer).await;
            send_plain(&bot, tg_id, &format!("{} {}", withdrawal_id, answer)).await;
        }

        _ => {
            let _ = bot.answer_callback_query(callback_id).await;
        }
    }

    Ok(())
}

async fn handle_admin_purchase(
    state: &AppState,
    admin_id: i64,
    purchase_id: &str,
    approve: bool,
) -> String {
    if approve {
        match state.purchases.approve(purchase_id, admin_id).await {
            Ok(ApproveOutcome::Activated { tier, .. }) => {
                format!("Approved: {} activated.", tier.as_str())
            }
            Ok(ApproveOutcome::GiftMinted { code, .. }) => {
                format!("Approved: gift card {} minted.", code)
            }
            Ok(ApproveOutcome::AlreadyProcessed) => "Already processed.".to_string(),
            Ok(ApproveOutcome::NotFound) => "Purchase not found.".to_string(),
            Err(e) => {
                error!("approve {} failed: {:#}", purchase_id, e);
                APOLOGY.to_string()
            }
        }
    } else {
        match state.purchases.reject(purchase_id, admin_id).await {
            Ok(RejectOutcome::Rejected) => "Rejected.".to_string(),
            Ok(RejectOutcome::AlreadyProcessed) => "Already processed.".to_string(),
            Ok(RejectOutcome::NotFound) => "Purchase not found.".to_string(),
            Err(e) => {
                error!("reject {} failed: {:#}", purchase_id, e);
                APOLOGY.to_string()
            }
        }
    }
}

async fn handle_admin_withdrawal(
    state: &AppState,
    admin_id: i64,
    withdrawal_id: &str,
    complete: bool,
) -> &'static str {
    let result = if complete {
        state.withdrawals.complete(withdrawal_id, admin_id, "").await
    } else {
        state.withdrawals.reject(withdrawal_id, admin_id).await
    };
    match result {
        Ok(ProcessOutcome::Done) => {
            if complete {
                "Withdrawal completed."
            } else {
                "Withdrawal rejected."
            }
        }
        Ok(ProcessOutcome::AlreadyProcessed) => "Already processed.",
        Ok(ProcessOutcome::NotFound) => "Withdrawal not found.",
        Err(e) => {
            error!("withdrawal action {} failed: {:#}", withdrawal_id, e);
            APOLOGY
        }
    }
}
