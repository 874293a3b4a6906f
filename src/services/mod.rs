pub mod promo_service;
pub mod purchase_service;
pub mod reconciler;
pub mod referral_service;
pub mod scheduler;
pub mod subscription_service;
pub mod ticket_service;
pub mod user_service;
pub mod withdrawal_service;

#[cfg(test)]
mod tests;
