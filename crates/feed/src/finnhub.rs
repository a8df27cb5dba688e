use crate::http::{build_client, network, parse, status_error};
use async_trait::async_trait;
use chrono::NaiveDate;
use crush_core::market::entity::{EarningsEvent, EarningsTiming};
use crush_core::market::error::MarketError;
use crush_core::market::port::EarningsCalendarProvider;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const CALENDAR_URL: &str = "https://finnhub.io/api/v1/calendar/earnings";

/// # Summary
/// Finnhub 财报日历数据源，需要 API token。
pub struct FinnhubCalendar {
    client: Client,
    token: String,
}

impl FinnhubCalendar {
    pub fn new(token: impl Into<String>) -> Result<Self, MarketError> {
        Ok(Self {
            client: build_client(Duration::from_secs(15), false)?,
            token: token.into(),
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CalendarResponse {
    #[serde(default)]
    earnings_calendar: Vec<CalendarEntry>,
}

#[derive(Deserialize, Debug)]
struct CalendarEntry {
    #[serde(default)]
    symbol: String,
    hour: Option<String>,
}

fn timing_of(hour: Option<&str>) -> EarningsTiming {
    match hour {
        Some("bmo") => EarningsTiming::PreMarket,
        Some("amc") => EarningsTiming::PostMarket,
        Some("dmh") => EarningsTiming::DuringMarket,
        _ => EarningsTiming::Unknown,
    }
}

fn events_from_body(body: CalendarResponse) -> Vec<EarningsEvent> {
    body.earnings_calendar
        .into_iter()
        .filter(|e| !e.symbol.trim().is_empty())
        .map(|e| EarningsEvent::new(e.symbol.trim().to_uppercase(), timing_of(e.hour.as_deref())))
        .collect()
}

#[async_trait]
impl EarningsCalendarProvider for FinnhubCalendar {
    fn name(&self) -> &str {
        "finnhub"
    }

    async fn get_earnings(&self, date: NaiveDate) -> Result<Vec<EarningsEvent>, MarketError> {
        let day = date.format("%Y-%m-%d").to_string();
        let resp = self
            .client
            .get(CALENDAR_URL)
            .query(&[
                ("from", day.as_str()),
                ("to", day.as_str()),
                ("token", self.token.as_str()),
            ])
            .send()
            .await
            .map_err(network)?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(MarketError::Network("Finnhub rejected the API token".into()));
            }
            s => return Err(status_error("finnhub", s)),
        }

        let body: CalendarResponse = resp.json().await.map_err(parse)?;
        let events = events_from_body(body);
        debug!("Finnhub returned {} earnings for {}", events.len(), date);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calendar() {
        let json = r#"{"earningsCalendar":[
            {"date":"2025-03-06","epsActual":null,"hour":"amc","symbol":"AVGO","year":2025},
            {"date":"2025-03-06","hour":"bmo","symbol":"jd"},
            {"date":"2025-03-06","hour":"dmh","symbol":"MID"},
            {"date":"2025-03-06","hour":"","symbol":"NOHR"},
            {"date":"2025-03-06","hour":null,"symbol":"MISSING"},
            {"date":"2025-03-06","hour":"amc","symbol":" "}
        ]}"#;
        let body: CalendarResponse = serde_json::from_str(json).unwrap();

        assert_eq!(
            events_from_body(body),
            vec![
                EarningsEvent::new("AVGO", EarningsTiming::PostMarket),
                EarningsEvent::new("JD", EarningsTiming::PreMarket),
                EarningsEvent::new("MID", EarningsTiming::DuringMarket),
                EarningsEvent::new("NOHR", EarningsTiming::Unknown),
                EarningsEvent::new("MISSING", EarningsTiming::Unknown),
            ]
        );
    }

    #[test]
    fn test_empty_calendar() {
        let body: CalendarResponse = serde_json::from_str(r#"{"earningsCalendar":[]}"#).unwrap();
        assert!(events_from_body(body).is_empty());
    }
}
