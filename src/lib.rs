//! Telegram Stars -> USDT exchange rate from Fragment purchases and Binance spot prices

pub mod services;
pub mod sources;
pub mod types;
