use std::time::Duration;

use teloxide::prelude::*;
use tracing::error;

use crate::bot::handlers::{send_plain, APOLOGY};
use crate::models::{fmt_ts, fmt_usd};
use crate::services::purchase_service::{ApproveOutcome, RejectOutcome};
use crate::state::AppState;

/// Pause between broadcast sends so the bot stays under the API flood
/// limits.
const BROADCAST_PAUSE: Duration = Duration::from_millis(50);

/// Dispatches admin slash commands. Returns false when the text is not one
/// of them, so the caller can fall through to the regular menu handling.
pub async fn handle_command(bot: &Bot, state: &AppState, admin_id: i64, text: &str) -> bool {
    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match command {
        "/approve" => {
            let Some(id) = args.first() else {
                send_plain(bot, admin_id, "Usage: /approve <purchase_id>").await;
                return true;
            };
            let answer = match state.purchases.approve(id, admin_id).await {
                Ok(ApproveOutcome::Activated { tier, .. }) => {
                    format!("{} approved, {} activated.", id, tier.as_str())
                }
                Ok(ApproveOutcome::GiftMinted { code, .. }) => {
                    format!("{} approved, gift card {} minted.", id, code)
                }
                Ok(ApproveOutcome::AlreadyProcessed) => format!("{} is already processed.", id),
                Ok(ApproveOutcome::NotFound) => format!("No purchase {}.", id),
                Err(e) => {
                    error!("approve {} failed: {:#}", id, e);
                    APOLOGY.to_string()
                }
            };
            send_plain(bot, admin_id, &answer).await;
            true
        }

        "/reject" => {
            let Some(id) = args.first() else {
                send_plain(bot, admin_id, "Usage: /reject <purchase_id>").await;
                return true;
            };
            let answer = match state.purchases.reject(id, admin_id).await {
                Ok(RejectOutcome::Rejected) => format!("{} rejected.", id),
                Ok(RejectOutcome::AlreadyProcessed) => format!("{} is already processed.", id),
                Ok(RejectOutcome::NotFound) => format!("No purchase {}.", id),
                Err(e) => {
                    error!("reject {} failed: {:#}", id, e);
                    APOLOGY.to_string()
                }
            };
            send_plain(bot, admin_id, &answer).await;
            true
        }

        "/broadcast" => {
            let message = text.strip_prefix("/broadcast").unwrap_or("").trim();
            if message.is_empty() {
                send_plain(bot, admin_id, "Usage: /broadcast <text>").await;
                return true;
            }
            match state.users.all_users().await {
                Ok(users) => {
                    let targets: Vec<i64> = users.iter().map(|u| u.telegram_id).collect();
                    broadcast(bot, state, admin_id, &targets, message).await;
                }
                Err(e) => {
                    error!("broadcast user scan failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/broadcast_active" => {
            let message = text.strip_prefix("/broadcast_active").unwrap_or("").trim();
            if message.is_empty() {
                send_plain(bot, admin_id, "Usage: /broadcast_active <text>").await;
                return true;
            }
            match state.subs.active_subscribers().await {
                Ok(targets) => broadcast(bot, state, admin_id, &targets, message).await,
                Err(e) => {
                    error!("broadcast subscriber scan failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/newdiscount" => {
            // /newdiscount CODE PCT [MAX_USES] [DAYS]
            let (Some(code), Some(pct)) = (args.first(), args.get(1)) else {
                send_plain(bot, admin_id, "Usage: /newdiscount CODE PCT [MAX_USES] [DAYS]").await;
                return true;
            };
            let Ok(percent) = pct.parse::<f64>() else {
                send_plain(bot, admin_id, "PCT must be a number.").await;
                return true;
            };
            let max_uses = args.get(2).and_then(|v| v.parse().ok()).unwrap_or(0);
            let days = args.get(3).and_then(|v| v.parse().ok());
            match state
                .promos
                .create_discount(code, percent, max_uses, days, admin_id)
                .await
            {
                Ok(true) => {
                    send_plain(
                        bot,
                        admin_id,
                        &format!("Discount {} created: {}% off.", code.to_uppercase(), percent),
                    )
                    .await
                }
                Ok(false) => {
                    send_plain(bot, admin_id, &format!("Code {} already exists.", code)).await
                }
                Err(e) => {
                    error!("discount create failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/discounts" => {
            match state.promos.list_discounts().await {
                Ok(codes) if codes.is_empty() => {
                    send_plain(bot, admin_id, "No discount codes yet.").await
                }
                Ok(codes) => {
                    let mut out = String::from("Discount codes:\n");
                    for c in codes {
                        out.push_str(&format!(
                            "{} - {}% | used {}/{} | {} | until {}\n",
                            c.code,
                            c.percent,
                            c.used_count,
                            if c.max_uses == 0 {
                                "∞".to_string()
                            } else {
                                c.max_uses.to_string()
                            },
                            c.status,
                            c.valid_until.map(fmt_ts).unwrap_or_else(|| "-".into())
                        ));
                    }
                    send_plain(bot, admin_id, &out).await;
                }
                Err(e) => {
                    error!("discount list failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/newboost" => {
            // /newboost CODE L1 L2 [MAX_USES] [DAYS]
            let (Some(code), Some(l1), Some(l2)) = (args.first(), args.get(1), args.get(2)) else {
                send_plain(bot, admin_id, "Usage: /newboost CODE L1 L2 [MAX_USES] [DAYS]").await;
                return true;
            };
            let (Ok(level1), Ok(level2)) = (l1.parse::<f64>(), l2.parse::<f64>()) else {
                send_plain(bot, admin_id, "L1 and L2 must be numbers.").await;
                return true;
            };
            let max_uses = args.get(3).and_then(|v| v.parse().ok()).unwrap_or(0);
            let days = args.get(4).and_then(|v| v.parse().ok());
            match state
                .promos
                .create_boost(code, level1, level2, max_uses, days, admin_id)
                .await
            {
                Ok(true) => {
                    send_plain(
                        bot,
                        admin_id,
                        &format!(
                            "Boost {} created: {}% / {}%.",
                            code.to_uppercase(),
                            level1,
                            level2
                        ),
                    )
                    .await
                }
                Ok(false) => {
                    send_plain(bot, admin_id, &format!("Code {} already exists.", code)).await
                }
                Err(e) => {
                    error!("boost create failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/boosts" => {
            match state.promos.list_boosts().await {
                Ok(codes) if codes.is_empty() => {
                    send_plain(bot, admin_id, "No boost codes yet.").await
                }
                Ok(codes) => {
                    let mut out = String::from("Boost codes:\n");
                    for c in codes {
                        out.push_str(&format!(
                            "{} - {}%/{}% | used {}/{} | {}\n",
                            c.code,
                            c.level1_percent,
                            c.level2_percent,
                            c.used_count,
                            if c.max_uses == 0 {
                                "∞".to_string()
                            } else {
                                c.max_uses.to_string()
                            },
                            c.status
                        ));
                    }
                    send_plain(bot, admin_id, &out).await;
                }
                Err(e) => {
                    error!("boost list failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/reply" => {
            let Some(ticket_id) = args.first() else {
                send_plain(bot, admin_id, "Usage: /reply <ticket_id> <text>").await;
                return true;
            };
            let response = text
                .splitn(3, ' ')
                .nth(2)
                .unwrap_or("")
                .trim()
                .to_string();
            if response.is_empty() {
                send_plain(bot, admin_id, "Usage: /reply <ticket_id> <text>").await;
                return true;
            }
            match state.tickets.reply(ticket_id, &response).await {
                Ok(true) => {
                    send_plain(bot, admin_id, &format!("Ticket {} closed.", ticket_id)).await
                }
                Ok(false) => {
                    send_plain(
                        bot,
                        admin_id,
                        &format!("Ticket {} not found or already closed.", ticket_id),
                    )
                    .await
                }
                Err(e) => {
                    error!("ticket reply failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/stats" => {
            match state.purchases.stats().await {
                Ok(s) => {
                    send_plain(
                        bot,
                        admin_id,
                        &format!(
                            "📊 Stats\n\nusers: {}\nactive subscriptions: {}\n\
                             pending purchases: {}\napproved purchases: {}\n\
                             revenue: ${}\nopen tickets: {}",
                            s.users,
                            s.active_subscriptions,
                            s.pending_purchases,
                            s.approved_purchases,
                            fmt_usd(s.revenue_usd),
                            s.open_tickets
                        ),
                    )
                    .await;
                }
                Err(e) => {
                    error!("stats failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        "/finduser" => {
            let Some(query) = args.first() else {
                send_plain(bot, admin_id, "Usage: /finduser <id|@username|code>").await;
                return true;
            };
            match state.users.search(query).await {
                Ok(Some(u)) => {
                    let sub = state
                        .users
                        .get_active_subscription(u.telegram_id)
                        .await
                        .ok()
                        .flatten();
                    let sub_line = match sub {
                        Some(s) => format!(
                            "{} until {}",
                            s.tier.as_str(),
                            s.expires_at.map(fmt_ts).unwrap_or_else(|| "-".into())
                        ),
                        None => "none".to_string(),
                    };
                    send_plain(
                        bot,
                        admin_id,
                        &format!(
                            "id: {}\nusername: @{}\nname: {}\nemail: {}\ncode: {}\n\
                             referred by: {}\nbalance: ${}\nsubscription: {}",
                            u.telegram_id,
                            u.username,
                            u.full_name,
                            u.email,
                            u.referral_code,
                            u.referred_by
                                .map(|v| v.to_string())
                                .unwrap_or_else(|| "-".into()),
                            fmt_usd(u.wallet_balance),
                            sub_line
                        ),
                    )
                    .await;
                }
                Ok(None) => send_plain(bot, admin_id, "No matching user.").await,
                Err(e) => {
                    error!("finduser failed: {:#}", e);
                    send_plain(bot, admin_id, APOLOGY).await;
                }
            }
            true
        }

        _ => false,
    }
}

async fn broadcast(bot: &Bot, state: &AppState, admin_id: i64, targets: &[i64], message: &str) {
    let mut sent = 0usize;
    for tg_id in targets {
        if state.config.is_admin(*tg_id) {
            continue;
        }
        send_plain(bot, *tg_id, message).await;
        sent += 1;
        tokio::time::sleep(BROADCAST_PAUSE).await;
    }
    send_plain(
        bot,
        admin_id,
        &format!("Broadcast delivered to {} users.", sent),
    )
    .await;
}
