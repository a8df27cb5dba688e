//! 外部数据源适配器：Yahoo 行情与期权链、Nasdaq / Finnhub 财报日历、Market Chameleon 胜率。

pub mod chameleon;
pub mod finnhub;
pub mod http;
pub mod nasdaq;
pub mod session;
pub mod yahoo;
