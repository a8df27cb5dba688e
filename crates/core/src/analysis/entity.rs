use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 期权拆分后的隐含波动率期限结构采样点。
///
/// # Invariants
/// - `implied_vol > 0`，`days_to_expiration >= 0`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityPoint {
    pub days_to_expiration: i64,
    pub implied_vol: f64,
}

impl VolatilityPoint {
    pub fn new(days_to_expiration: i64, implied_vol: f64) -> Self {
        Self {
            days_to_expiration,
            implied_vol,
        }
    }
}

/// # Summary
/// 单次分析产出的不可变结果，每次调用重新计算，不做缓存。
///
/// # Invariants
/// - `iv_rv_ratio` 在 `hist_vol <= 0` 时为哨兵值 9999。
/// - `expected_move_pct` 为 "5.20%" 形式的字符串，无跨式价格时为 "N/A"。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    // 证券代码
    pub ticker: String,
    // 最新收盘价
    pub current_price: f64,
    // Yang-Zhang 历史波动率 (年化)
    pub hist_vol: f64,
    // 30 天插值隐含波动率
    pub iv30: f64,
    // 期限结构斜率 (近月到 45 天)
    pub term_slope: f64,
    // IV30 / RV30
    pub iv_rv_ratio: f64,
    // 预期波动百分比字符串
    pub expected_move_pct: String,
    // 预期波动金额 (即最近到期日的跨式价格)
    pub expected_move_dollars: Option<f64>,
    // 最近可用到期日的 ATM 跨式价格
    pub straddle_price: Option<f64>,
    // 30 日平均成交量
    pub avg_volume: Option<f64>,
    // 平均成交量是否达到 150 万
    pub avg_volume_ok: bool,
    // 最近可用到期日
    pub nearest_expiration: NaiveDate,
    // ATM 看涨 Delta (数据源提供时)
    pub atm_call_delta: Option<f64>,
    // ATM 看跌 Delta (数据源提供时)
    pub atm_put_delta: Option<f64>,
    // 参与插值的期限结构采样点 (已排序去重)
    pub term_points: Vec<VolatilityPoint>,
}
