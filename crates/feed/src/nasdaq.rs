use crate::http::{build_client, network, parse, status_error};
use async_trait::async_trait;
use chrono::NaiveDate;
use crush_core::market::entity::{EarningsEvent, EarningsTiming};
use crush_core::market::error::MarketError;
use crush_core::market::port::EarningsCalendarProvider;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const CALENDAR_URL: &str = "https://api.nasdaq.com/api/calendar/earnings";

/// # Summary
/// Nasdaq 财报日历数据源。
pub struct NasdaqCalendar {
    client: Client,
}

impl NasdaqCalendar {
    pub fn new() -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(15), false)?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct CalendarResponse {
    data: Option<CalendarData>,
}

#[derive(Deserialize, Debug)]
struct CalendarData {
    // 无财报的日期返回 null
    rows: Option<Vec<CalendarRow>>,
}

#[derive(Deserialize, Debug)]
struct CalendarRow {
    symbol: Option<String>,
    time: Option<String>,
}

fn timing_of(raw: Option<&str>) -> EarningsTiming {
    match raw {
        Some("time-pre-market") => EarningsTiming::PreMarket,
        Some("time-after-hours") => EarningsTiming::PostMarket,
        _ => EarningsTiming::Unknown,
    }
}

fn events_from_body(body: CalendarResponse) -> Vec<EarningsEvent> {
    body.data
        .and_then(|d| d.rows)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|row| {
            let symbol = row.symbol?.trim().to_uppercase();
            if symbol.is_empty() {
                return None;
            }
            Some(EarningsEvent::new(symbol, timing_of(row.time.as_deref())))
        })
        .collect()
}

#[async_trait]
impl EarningsCalendarProvider for NasdaqCalendar {
    fn name(&self) -> &str {
        "nasdaq"
    }

    async fn get_earnings(&self, date: NaiveDate) -> Result<Vec<EarningsEvent>, MarketError> {
        let resp = self
            .client
            .get(CALENDAR_URL)
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .send()
            .await
            .map_err(network)?;

        if !resp.status().is_success() {
            return Err(status_error("nasdaq", resp.status()));
        }

        let body: CalendarResponse = resp.json().await.map_err(parse)?;
        let events = events_from_body(body);
        debug!("Nasdaq returned {} earnings for {}", events.len(), date);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calendar_rows() {
        let json = r#"{"data":{"asOf":"Fri, Mar 7, 2025","rows":[
            {"symbol":"AVGO","name":"Broadcom Inc.","time":"time-after-hours"},
            {"symbol":"cost","time":"time-after-hours"},
            {"symbol":"JD","time":"time-pre-market"},
            {"symbol":"XYZ","time":"time-not-supplied"},
            {"symbol":"   ","time":"time-pre-market"},
            {"symbol":null,"time":"time-pre-market"},
            {"symbol":"ABC"}
        ]},"status":{"rCode":200}}"#;
        let body: CalendarResponse = serde_json::from_str(json).unwrap();
        let events = events_from_body(body);

        assert_eq!(
            events,
            vec![
                EarningsEvent::new("AVGO", EarningsTiming::PostMarket),
                EarningsEvent::new("COST", EarningsTiming::PostMarket),
                EarningsEvent::new("JD", EarningsTiming::PreMarket),
                EarningsEvent::new("XYZ", EarningsTiming::Unknown),
                EarningsEvent::new("ABC", EarningsTiming::Unknown),
            ]
        );
    }

    #[test]
    fn test_empty_day() {
        let body: CalendarResponse =
            serde_json::from_str(r#"{"data":{"rows":null},"status":{"rCode":200}}"#).unwrap();
        assert!(events_from_body(body).is_empty());

        let body: CalendarResponse = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(events_from_body(body).is_empty());
    }
}
