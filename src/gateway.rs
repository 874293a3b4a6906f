use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ChatMemberKind, UserId};
use tracing::{info, warn};

/// Chat-platform membership primitives. All operations are best-effort;
/// failures are logged and reported as "not done", never propagated as
/// handler errors.
#[async_trait]
pub trait MembershipGateway: Send + Sync {
    async fn is_member(&self, channel: i64, user_id: i64) -> bool;
    async fn create_invite(&self, channel: i64, ttl: Duration, member_limit: u32)
        -> Option<String>;
    async fn remove_member(&self, channel: i64, user_id: i64) -> bool;
}

/// Outbound DM seam, kept separate from the gateway so services can notify
/// users without holding the whole bot API.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, tg_id: i64, text: &str);
}

pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MembershipGateway for TelegramGateway {
    async fn is_member(&self, channel: i64, user_id: i64) -> bool {
        match self
            .bot
            .get_chat_member(ChatId(channel), UserId(user_id as u64))
            .await
        {
            Ok(member) => matches!(
                member.kind,
                ChatMemberKind::Owner(_)
                    | ChatMemberKind::Administrator(_)
                    | ChatMemberKind::Member(_)
            ),
            Err(e) => {
                // Unresolvable counts as not-a-member.
                warn!(
                    "membership check failed for user {} in {}: {}",
                    user_id, channel, e
                );
                false
            }
        }
    }

    async fn create_invite(
        &self,
        channel: i64,
        ttl: Duration,
        member_limit: u32,
    ) -> Option<String> {
        let expire = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24));
        match self
            .bot
            .create_chat_invite_link(ChatId(channel))
            .expire_date(expire)
            .member_limit(member_limit)
            .await
        {
            Ok(link) => {
                info!("created invite for channel {} (ttl {:?})", channel, ttl);
                Some(link.invite_link)
            }
            Err(e) => {
                warn!("failed to create invite for channel {}: {}", channel, e);
                None
            }
        }
    }

    async fn remove_member(&self, channel: i64, user_id: i64) -> bool {
        // Ban then immediately unban: the user is kicked but may rejoin via a
        // future invite.
        if let Err(e) = self
            .bot
            .ban_chat_member(ChatId(channel), UserId(user_id as u64))
            .await
        {
            warn!("failed to kick user {} from {}: {}", user_id, channel, e);
            return false;
        }
        tokio::time::sleep(Duration::from_millis(800)).await;
        if let Err(e) = self
            .bot
            .unban_chat_member(ChatId(channel), UserId(user_id as u64))
            .await
        {
            warn!("failed to unban user {} in {}: {}", user_id, channel, e);
        }
        info!("removed user {} from channel {}", user_id, channel);
        true
    }
}

pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, tg_id: i64, text: &str) {
        if let Err(e) = self.bot.send_message(ChatId(tg_id), text).await {
            warn!("failed to DM user {}: {}", tg_id, e);
        }
    }
}
