//! 财报前波动率分析：历史波动率估计、隐含波动率期限结构与单标的分析引擎。

pub mod engine;
pub mod term;
pub mod volatility;

pub use engine::RecommendationEngine;
pub use term::TermStructure;
pub use volatility::VolatilityEstimator;
