use crush_core::analysis::entity::VolatilityPoint;
use crush_core::analysis::error::AnalysisError;

/// # Summary
/// 隐含波动率期限结构：按到期天数分段线性插值，区间外平推。
///
/// # Invariants
/// - 采样点按天数严格升序，且至少一个。
/// - 同一天数出现多次时保留先出现的点。
/// - 构建后不可变，可被任意次查询。
#[derive(Debug, Clone, PartialEq)]
pub struct TermStructure {
    points: Vec<VolatilityPoint>,
}

impl TermStructure {
    /// # Summary
    /// 由采样点构建期限结构。
    ///
    /// # Logic
    /// 1. 拒绝天数为负或 IV 非正/非有限的点。
    /// 2. 稳定排序后按天数去重（保留先出现者）。
    ///
    /// # Returns
    /// 没有任何采样点时返回 `AnalysisError::Interpolation`。
    pub fn build(
        points: impl IntoIterator<Item = VolatilityPoint>,
    ) -> Result<Self, AnalysisError> {
        let mut points: Vec<VolatilityPoint> = points.into_iter().collect();
        if points.is_empty() {
            return Err(AnalysisError::Interpolation(
                "no term structure points".to_string(),
            ));
        }
        if let Some(bad) = points.iter().find(|p| {
            p.days_to_expiration < 0 || !p.implied_vol.is_finite() || p.implied_vol <= 0.0
        }) {
            return Err(AnalysisError::Interpolation(format!(
                "invalid point ({} days, iv {})",
                bad.days_to_expiration, bad.implied_vol
            )));
        }

        points.sort_by_key(|p| p.days_to_expiration);
        points.dedup_by_key(|p| p.days_to_expiration);
        Ok(Self { points })
    }

    pub fn points(&self) -> &[VolatilityPoint] {
        &self.points
    }

    pub fn min_days(&self) -> i64 {
        self.points[0].days_to_expiration
    }

    pub fn max_days(&self) -> i64 {
        self.points[self.points.len() - 1].days_to_expiration
    }

    /// 查询整数天数处的隐含波动率
    #[allow(clippy::cast_precision_loss)]
    pub fn at(&self, days: i64) -> f64 {
        self.interpolate(days as f64)
    }

    /// # Summary
    /// 查询任意天数处的隐含波动率。
    ///
    /// # Logic
    /// 1. 低于最小天数返回最小天数点的 IV，高于最大天数返回最大天数点的 IV。
    /// 2. 命中采样点时原样返回该点 IV。
    /// 3. 其余情况在相邻两点之间线性插值。
    #[allow(clippy::cast_precision_loss)]
    pub fn interpolate(&self, days: f64) -> f64 {
        let first = &self.points[0];
        let last = &self.points[self.points.len() - 1];
        if days <= first.days_to_expiration as f64 {
            return first.implied_vol;
        }
        if days >= last.days_to_expiration as f64 {
            return last.implied_vol;
        }

        // 第一个天数大于 days 的点，必然存在且下标 >= 1
        let upper = self
            .points
            .partition_point(|p| (p.days_to_expiration as f64) <= days);
        let (lo, hi) = (&self.points[upper - 1], &self.points[upper]);
        let (x0, x1) = (lo.days_to_expiration as f64, hi.days_to_expiration as f64);
        if days == x0 {
            return lo.implied_vol;
        }
        lo.implied_vol + (hi.implied_vol - lo.implied_vol) * (days - x0) / (x1 - x0)
    }

    /// # Summary
    /// 从最近采样点到 `target` 天的斜率。
    ///
    /// # Returns
    /// `(iv(target) - iv(min_days)) / (target - min_days)`；两者相等时返回 0.0。
    #[allow(clippy::cast_precision_loss)]
    pub fn slope_to(&self, target: i64) -> f64 {
        let min_days = self.min_days();
        if target == min_days {
            return 0.0;
        }
        (self.at(target) - self.at(min_days)) / (target - min_days) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_days_keep_first() {
        let ts = TermStructure::build([
            VolatilityPoint::new(30, 0.40),
            VolatilityPoint::new(7, 0.50),
            VolatilityPoint::new(30, 0.90),
        ])
        .unwrap();
        assert_eq!(ts.points().len(), 2);
        assert_eq!(ts.at(30), 0.40);
    }

    #[test]
    fn test_rejects_non_positive_iv() {
        let err = TermStructure::build([VolatilityPoint::new(7, 0.0)]).unwrap_err();
        assert!(matches!(err, AnalysisError::Interpolation(_)));
    }
}
