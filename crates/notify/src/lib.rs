//! Outbound delivery of scan reports: Discord webhook embeds and SMTP email.

pub mod discord;
pub mod email;
pub mod render;
