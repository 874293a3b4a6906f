use teloxide::prelude::*;
use tracing::error;

use crate::bot::handlers::{admin, begin_payment, send_plain, submit_proof, APOLOGY};
use crate::bot::keyboards::{
    self, main_menu, products_keyboard, wallet_keyboard, withdraw_method_keyboard,
};
use crate::bot::utils::looks_like_email;
use crate::models::{fmt_usd, PayMethod};
use crate::services::purchase_service::{GiftRedeemOutcome, TrialOutcome};
use crate::services::referral_service::BoostOutcome;
use crate::session::Conversation;
use crate::state::AppState;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(from) = msg.from.clone() else {
        return Ok(());
    };
    let tg_id = msg.chat.id.0;
    let username = from.username.clone().unwrap_or_default();
    let full_name = from.full_name();

    // A photo while we expect proof is the receipt.
    if let Some(photos) = msg.photo() {
        if let Some(Conversation::AwaitingProof { purchase_id }) = state.sessions.peek(tg_id) {
            if let Some(largest) = photos.last() {
                let proof = format!("photo:{}", largest.file.id);
                state.sessions.clear(tg_id);
                submit_proof(&bot, &state, tg_id, &purchase_id, &proof).await;
            }
        }
        return Ok(());
    }

    let Some(text) = msg.text().map(|t| t.trim().to_string()) else {
        return Ok(());
    };

    if text == "/start" || text.starts_with("/start ") {
        let payload = text.strip_prefix("/start").unwrap_or("").trim();
        handle_start(&bot, &state, tg_id, &username, &full_name, payload).await;
        return Ok(());
    }

    if let Some(code) = text.strip_prefix("/redeemboost") {
        handle_redeem_boost(&bot, &state, tg_id, &username, &full_name, code.trim()).await;
        return Ok(());
    }

    if text.starts_with('/') && state.config.is_admin(tg_id) {
        if admin::handle_command(&bot, &state, tg_id, &text).await {
            return Ok(());
        }
    }

    let user = match state.users.get_or_create(tg_id, &username, &full_name).await {
        Ok(u) => u.value,
        Err(e) => {
            error!("user lookup failed for {}: {:#}", tg_id, e);
            send_plain(&bot, tg_id, APOLOGY).await;
            return Ok(());
        }
    };

    if let Some(conversation) = state.sessions.peek(tg_id) {
        handle_session(&bot, &state, tg_id, &username, conversation, &text).await;
        return Ok(());
    }

    if user.email.is_empty() {
        state.sessions.set(tg_id, Conversation::AwaitingEmail);
        send_plain(
            &bot,
            tg_id,
            "👋 Welcome! Please enter your email address to continue:",
        )
        .await;
        return Ok(());
    }

    match text.as_str() {
        keyboards::BTN_TRIAL => {
            match state.purchases.start_trial(tg_id, &username).await {
                Ok(TrialOutcome::Granted { invite_link }) => {
                    send_plain(
                        &bot,
                        tg_id,
                        &format!(
                            "⏳ Here is your 10-minute test access (single use):\n{}",
                            invite_link
                        ),
                    )
                    .await;
                }
                Ok(TrialOutcome::AlreadyUsed) => {
                    send_plain(
                        &bot,
                        tg_id,
                        "You have already used your free trial. Check out Buy Subscription instead.",
                    )
                    .await;
                }
                Ok(TrialOutcome::Unavailable) => {
                    send_plain(
                        &bot,
                        tg_id,
                        "The test channel is not available right now. Please contact an admin.",
                    )
                    .await;
                }
                Err(e) => {
                    error!("trial for {} failed: {:#}", tg_id, e);
                    send_plain(&bot, tg_id, APOLOGY).await;
                }
            }
        }
        keyboards::BTN_BUY => {
            let _ = bot
                .send_message(msg.chat.id, "🛍 Choose a subscription:")
                .reply_markup(products_keyboard(&state.config))
                .await;
        }
        keyboards::BTN_WALLET => {
            let earnings = state.referrals.earnings_summary(tg_id).await;
            match earnings {
                Ok(summary) => {
                    let can_withdraw = user.wallet_balance >= state.config.min_withdrawal_usd;
                    let mut response = format!(
                        "💰 Wallet\n\nBalance: ${}\nTotal referral earnings: ${}\n\
                         Referrals: {} direct, {} second level",
                        fmt_usd(user.wallet_balance),
                        fmt_usd(summary.total_usd),
                        summary.level1_count,
                        summary.level2_count
                    );
                    if !can_withdraw {
                        response.push_str(&format!(
                            "\n\nWithdrawals unlock at ${}.",
                            fmt_usd(state.config.min_withdrawal_usd)
                        ));
                    }
                    let _ = bot
                        .send_message(msg.chat.id, response)
                        .reply_markup(wallet_keyboard(can_withdraw))
                        .await;
                }
                Err(e) => {
                    error!("wallet summary for {} failed: {:#}", tg_id, e);
                    send_plain(&bot, tg_id, APOLOGY).await;
                }
            }
        }
        keyboards::BTN_INVITE => {
            let link = format!(
                "https://t.me/{}?start={}",
                state.bot_username, user.referral_code
            );
            send_plain(
                &bot,
                tg_id,
                &format!(
                    "🤝 Invite friends and earn commission on every purchase they make.\n\n\
                     Your code: {}\nYour link: {}\n\n\
                     You earn on two levels: your invitees and the people they invite.",
                    user.referral_code, link
                ),
            )
            .await;
        }
        keyboards::BTN_REPORT => {
            match state.referrals.earnings_summary(tg_id).await {
                Ok(summary) => {
                    let sub_line = match state.users.get_active_subscription(tg_id).await {
                        Ok(Some(sub)) => match sub.expires_at {
                            Some(exp) => {
                                format!("Subscription: {} until {}", sub.tier.as_str(), exp.format("%Y-%m-%d"))
                            }
                            None => "Subscription: active".to_string(),
                        },
                        _ => "Subscription: none".to_string(),
                    };
                    send_plain(
                        &bot,
                        tg_id,
                        &format!(
                            "📊 Monthly Report\n\nEarnings this month: ${}\nAll-time earnings: ${}\n{}",
                            fmt_usd(summary.month_usd),
                            fmt_usd(summary.total_usd),
                            sub_line
                        ),
                    )
                    .await;
                }
                Err(e) => {
                    error!("report for {} failed: {:#}", tg_id, e);
                    send_plain(&bot, tg_id, APOLOGY).await;
                }
            }
        }
        keyboards::BTN_SUPPORT => {
            state.sessions.set(tg_id, Conversation::AwaitingTicket);
            send_plain(
                &bot,
                tg_id,
                "🧰 Describe your question or problem and we will open a ticket for you.",
            )
            .await;
        }
        keyboards::BTN_HELP => {
            send_plain(
                &bot,
                tg_id,
                "❓ Help\n\n\
                 • Free Trial gives 10 minutes of test access, once.\n\
                 • Buy Subscription: pick a plan, pay by card or USDT, send the receipt, \
                 and an admin confirms it.\n\
                 • Premium includes both channels; Normal includes one.\n\
                 • Invite Friends shows your referral link; you earn commission on two levels.\n\
                 • Wallet shows your balance and lets you withdraw once you reach the minimum.\n\
                 • Support opens a ticket with our team.",
            )
            .await;
        }
        _ => {}
    }
    Ok(())
}

async fn handle_start(
    bot: &Bot,
    state: &AppState,
    tg_id: i64,
    username: &str,
    full_name: &str,
    payload: &str,
) {
    let user = match state.users.get_or_create(tg_id, username, full_name).await {
        Ok(u) => u.value,
        Err(e) => {
            error!("user upsert failed for {}: {:#}", tg_id, e);
            send_plain(bot, tg_id, APOLOGY).await;
            return;
        }
    };

    if let Some(code) = payload.strip_prefix("gift_") {
        match state.purchases.redeem_gift(code, tg_id, username).await {
            Ok(GiftRedeemOutcome::Activated { tier, expires_at }) => {
                send_plain(
                    bot,
                    tg_id,
                    &format!(
                        "🎁 Gift redeemed! Your {} subscription is active until {}.",
                        tier.as_str(),
                        expires_at.format("%Y-%m-%d")
                    ),
                )
                .await;
            }
            Ok(GiftRedeemOutcome::Invalid) => {
                send_plain(bot, tg_id, "This gift code is invalid or already redeemed.").await;
            }
            Err(e) => {
                error!("gift redeem failed for {}: {:#}", tg_id, e);
                send_plain(bot, tg_id, APOLOGY).await;
            }
        }
    } else if !payload.is_empty() {
        match state.users.find_by_referral_code(payload).await {
            Ok(Some(referrer)) => {
                let _ = state
                    .users
                    .set_referred_by(tg_id, referrer.value.telegram_id)
                    .await;
            }
            Ok(None) => {}
            Err(e) => error!("referral lookup failed: {:#}", e),
        }
    }

    if user.email.is_empty() {
        state.sessions.set(tg_id, Conversation::AwaitingEmail);
        send_plain(
            bot,
            tg_id,
            "👋 Welcome! Please enter your email address to continue:",
        )
        .await;
    } else {
        let _ = bot
            .send_message(
                teloxide::types::ChatId(tg_id),
                "👋 Welcome back! Pick an option from the menu below:",
            )
            .reply_markup(main_menu())
            .await;
    }
}

async fn handle_redeem_boost(
    bot: &Bot,
    state: &AppState,
    tg_id: i64,
    username: &str,
    full_name: &str,
    code: &str,
) {
    if code.is_empty() {
        send_plain(bot, tg_id, "Usage: /redeemboost CODE").await;
        return;
    }
    if let Err(e) = state.users.get_or_create(tg_id, username, full_name).await {
        error!("user upsert failed for {}: {:#}", tg_id, e);
        send_plain(bot, tg_id, APOLOGY).await;
        return;
    }
    match state.referrals.redeem_boost(tg_id, code).await {
        Ok(BoostOutcome::Applied(boost)) => {
            send_plain(
                bot,
                tg_id,
                &format!(
                    "🚀 Boost activated! Your commission rates are now {}% (level 1) and {}% (level 2).",
                    boost.level1_percent, boost.level2_percent
                ),
            )
            .await;
        }
        Ok(BoostOutcome::AlreadyBoosted) => {
            send_plain(bot, tg_id, "You already have an active boost.").await;
        }
        Ok(BoostOutcome::Invalid) => {
            send_plain(bot, tg_id, "This boost code is invalid or expired.").await;
        }
        Err(e) => {
            error!("boost redeem failed for {}: {:#}", tg_id, e);
            send_plain(bot, tg_id, APOLOGY).await;
        }
    }
}

async fn handle_session(
    bot: &Bot,
    state: &AppState,
    tg_id: i64,
    username: &str,
    conversation: Conversation,
    text: &str,
) {
    match conversation {
        Conversation::AwaitingEmail => {
            if !looks_like_email(text) {
                send_plain(
                    bot,
                    tg_id,
                    "That does not look like an email address. Please try again:",
                )
                .await;
                return;
            }
            state.sessions.clear(tg_id);
            if let Err(e) = state.users.set_email(tg_id, text).await {
                error!("set_email failed for {}: {:#}", tg_id, e);
                send_plain(bot, tg_id, APOLOGY).await;
                return;
            }
            let _ = bot
                .send_message(
                    teloxide::types::ChatId(tg_id),
                    "✅ Email saved! Pick an option from the menu below:",
                )
                .reply_markup(main_menu())
                .await;
        }
        Conversation::AwaitingDiscountCode { product, method } => {
            if text.eq_ignore_ascii_case("skip") {
                state.sessions.clear(tg_id);
                begin_payment(bot, state, tg_id, username, product, method, 0.0).await;
                return;
            }
            match state.promos.validate_discount(text).await {
                Ok(Some(discount)) => {
                    if let Err(e) = state.promos.consume_discount(&discount.code).await {
                        error!("discount consume failed: {:#}", e);
                    }
                    state.sessions.clear(tg_id);
                    send_plain(
                        bot,
                        tg_id,
                        &format!("✅ Code {} applied: {}% off.", discount.code, discount.percent),
                    )
                    .await;
                    begin_payment(bot, state, tg_id, username, product, method, discount.percent)
                        .await;
                }
                Ok(None) => {
                    send_plain(
                        bot,
                        tg_id,
                        "This code is invalid or expired. Enter another code, press the \
                         button, or type `skip`.",
                    )
                    .await;
                }
                Err(e) => {
                    error!("discount lookup failed: {:#}", e);
                    send_plain(bot, tg_id, APOLOGY).await;
                }
            }
        }
        Conversation::AwaitingProof { purchase_id } => {
            state.sessions.clear(tg_id);
            submit_proof(bot, state, tg_id, &purchase_id, text).await;
        }
        Conversation::AwaitingWithdrawAmount => {
            let Ok(amount) = text.trim_start_matches('$').parse::<f64>() else {
                send_plain(bot, tg_id, "Please send the amount as a number, e.g. 15.").await;
                return;
            };
            if amount < state.config.min_withdrawal_usd {
                send_plain(
                    bot,
                    tg_id,
                    &format!(
                        "The minimum withdrawal is ${}.",
                        fmt_usd(state.config.min_withdrawal_usd)
                    ),
                )
                .await;
                return;
            }
            let balance = match state.users.find(tg_id).await {
                Ok(Some(u)) => u.value.wallet_balance,
                _ => 0.0,
            };
            if amount > balance {
                send_plain(
                    bot,
                    tg_id,
                    &format!("Your balance is ${}.", fmt_usd(balance)),
                )
                .await;
                return;
            }
            state.sessions.clear(tg_id);
            let _ = bot
                .send_message(
                    teloxide::types::ChatId(tg_id),
                    format!("How should we pay out ${}?", fmt_usd(amount)),
                )
                .reply_markup(withdraw_method_keyboard(amount))
                .await;
        }
        Conversation::AwaitingWithdrawDestination { amount_usd, method } => {
            state.sessions.clear(tg_id);
            handle_withdraw_destination(bot, state, tg_id, amount_usd, method, text).await;
        }
        Conversation::AwaitingTicket => {
            state.sessions.clear(tg_id);
            match state.tickets.open(tg_id, username, text).await {
                Ok(ticket) => {
                    send_plain(
                        bot,
                        tg_id,
                        &format!(
                            "🎫 Ticket {} opened. We will get back to you soon.",
                            ticket.ticket_id
                        ),
                    )
                    .await;
                    for admin in &state.config.admin_ids {
                        send_plain(
                            bot,
                            *admin,
                            &format!(
                                "New ticket {} from {} (@{}):\n{}\n\nReply with /reply {} <text>",
                                ticket.ticket_id, tg_id, username, text, ticket.ticket_id
                            ),
                        )
                        .await;
                    }
                }
                Err(e) => {
                    error!("ticket open failed for {}: {:#}", tg_id, e);
                    send_plain(bot, tg_id, APOLOGY).await;
                }
            }
        }
    }
}

async fn handle_withdraw_destination(
    bot: &Bot,
    state: &AppState,
    tg_id: i64,
    amount_usd: f64,
    method: PayMethod,
    destination: &str,
) {
    use crate::services::withdrawal_service::RequestOutcome;

    match state
        .withdrawals
        .request(tg_id, amount_usd, method, destination)
        .await
    {
        Ok(RequestOutcome::Created(w)) => {
            send_plain(
                bot,
                tg_id,
                &format!(
                    "💸 Withdrawal {} for ${} requested. You will be notified when it is paid.",
                    w.withdrawal_id,
                    fmt_usd(w.amount_usd)
                ),
            )
            .await;
            let summary = format!(
                "Pending withdrawal {}\nuser: {}\namount: ${}\nmethod: {}\ndestination: {}",
                w.withdrawal_id,
                w.telegram_id,
                fmt_usd(w.amount_usd),
                w.method.as_str(),
                w.destination
            );
            for admin in &state.config.admin_ids {
                let _ = bot
                    .send_message(teloxide::types::ChatId(*admin), &summary)
                    .reply_markup(keyboards::admin_withdrawal_keyboard(&w.withdrawal_id))
                    .await;
            }
        }
        Ok(RequestOutcome::BelowMinimum { minimum_usd }) => {
            send_plain(
                bot,
                tg_id,
                &format!("The minimum withdrawal is ${}.", fmt_usd(minimum_usd)),
            )
            .await;
        }
        Ok(RequestOutcome::InsufficientBalance { balance_usd }) => {
            send_plain(
                bot,
                tg_id,
                &format!("Your balance is ${}.", fmt_usd(balance_usd)),
            )
            .await;
        }
        Err(e) => {
            error!("withdrawal request failed for {}: {:#}", tg_id, e);
            send_plain(bot, tg_id, APOLOGY).await;
        }
    }
}
