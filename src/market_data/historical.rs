// =============================================================================
// Historical Series Fetcher — Digital-currency time series over HTTP
// =============================================================================
//
// One GET per call, no retry, no pagination, no caching. The endpoint returns
// its dated records most-recent-first; normalization walks them in reverse so
// the chart receives ascending, duplicate-free, aligned price/volume series.
// =============================================================================

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::error::FetchError;
use crate::types::{Granularity, PricePoint, SeriesDataset, Timeframe, VolumePoint};

/// Longest slice of an error body carried into [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 256;

/// Keys under which the provider reports request-level failures.
const PROVIDER_MESSAGE_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

// ---------------------------------------------------------------------------
// SeriesSource — the seam the store fetches through
// ---------------------------------------------------------------------------

/// Anything able to produce a [`SeriesDataset`] for a timeframe.
pub trait SeriesSource: Send + Sync + 'static {
    fn fetch(&self, timeframe: Timeframe) -> BoxFuture<'_, Result<SeriesDataset, FetchError>>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub base_url: String,
    pub api_key: String,
    /// Fixed instrument code, e.g. `BTC`.
    pub symbol: String,
    /// Fixed settlement currency, e.g. `EUR`.
    pub market: String,
    /// `None` leaves the request unbounded.
    pub request_timeout: Option<Duration>,
}

// ---------------------------------------------------------------------------
// HistoricalSeriesFetcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HistoricalSeriesFetcher {
    config: FetcherConfig,
    client: reqwest::Client,
}

impl HistoricalSeriesFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent("tickview/1.0");
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        debug!(
            base_url = %config.base_url,
            symbol = %config.symbol,
            market = %config.market,
            "HistoricalSeriesFetcher initialised"
        );

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// GET `/query` for the granularity backing `timeframe` and normalize the
    /// response into a [`SeriesDataset`].
    #[instrument(skip(self), name = "historical::fetch", fields(granularity = %timeframe.granularity()))]
    pub async fn fetch_series(&self, timeframe: Timeframe) -> Result<SeriesDataset, FetchError> {
        let granularity = timeframe.granularity();

        let url = format!("{}/query", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("function", granularity.function()),
                ("symbol", self.config.symbol.as_str()),
                ("market", self.config.market.as_str()),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await?;
        let dataset = normalize_response(&body, granularity, &self.config.market)?;
        debug!(points = dataset.len(), "historical series normalized");
        Ok(dataset)
    }
}

impl SeriesSource for HistoricalSeriesFetcher {
    fn fetch(&self, timeframe: Timeframe) -> BoxFuture<'_, Result<SeriesDataset, FetchError>> {
        self.fetch_series(timeframe).boxed()
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Turn a raw endpoint response into a [`SeriesDataset`].
///
/// * Provider error payloads (`Error Message`, `Note`, `Information`) become
///   [`FetchError::Provider`].
/// * An absent series key yields an empty dataset.
/// * Unparsable date keys or numeric fields become [`FetchError::Malformed`].
pub fn normalize_response(
    body: &Value,
    granularity: Granularity,
    market: &str,
) -> Result<SeriesDataset, FetchError> {
    let series_key = granularity.series_key();
    let Some(series) = body.get(series_key).and_then(Value::as_object) else {
        if let Some(msg) = provider_message(body) {
            return Err(FetchError::Provider(msg));
        }
        warn!(key = series_key, "series key absent from response — returning empty dataset");
        return Ok(SeriesDataset::default());
    };
    normalize_series(series, market)
}

/// Normalize a date-keyed mapping of records delivered most-recent-first.
pub fn normalize_series(
    series: &Map<String, Value>,
    market: &str,
) -> Result<SeriesDataset, FetchError> {
    let close_keys = ["4. close".to_string(), format!("4a. close ({market})")];
    let volume_keys = ["5. volume".to_string()];

    let mut rows: Vec<(NaiveDate, f64, f64)> = Vec::with_capacity(series.len());
    for (key, record) in series.iter().rev() {
        let time = parse_date_key(key)?;
        let record = record.as_object().ok_or_else(|| {
            FetchError::Malformed(format!("record for {key} is not an object"))
        })?;
        let close = parse_number(record, &close_keys, key)?;
        let volume = parse_number(record, &volume_keys, key)?;
        rows.push((time, close, volume));
    }

    if !rows.windows(2).all(|w| w[0].0 < w[1].0) {
        warn!(records = rows.len(), "series not delivered most-recent-first — re-sorting");
        rows.sort_by_key(|row| row.0);
        rows.dedup_by_key(|row| row.0);
    }

    let price_series = rows
        .iter()
        .map(|&(time, value, _)| PricePoint { time, value })
        .collect();
    let volume_series = rows
        .iter()
        .map(|&(time, _, value)| VolumePoint { time, value })
        .collect();

    Ok(SeriesDataset {
        price_series,
        volume_series,
    })
}

fn provider_message(body: &Value) -> Option<String> {
    PROVIDER_MESSAGE_KEYS
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn parse_date_key(key: &str) -> Result<NaiveDate, FetchError> {
    if let Ok(d) = NaiveDate::parse_from_str(key, "%Y-%m-%d") {
        return Ok(d);
    }
    NaiveDateTime::parse_from_str(key, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.date())
        .map_err(|_| FetchError::Malformed(format!("invalid date key {key}")))
}

/// The provider sends numbers as JSON strings; accept plain numbers too.
fn parse_number(
    record: &Map<String, Value>,
    keys: &[String],
    date: &str,
) -> Result<f64, FetchError> {
    for key in keys {
        match record.get(key) {
            Some(Value::String(s)) => {
                return s.trim().parse::<f64>().map_err(|_| {
                    FetchError::Malformed(format!("{key} for {date} is not numeric: {s}"))
                });
            }
            Some(Value::Number(n)) => {
                return n.as_f64().ok_or_else(|| {
                    FetchError::Malformed(format!("{key} for {date} is not a valid f64"))
                });
            }
            Some(_) => {
                return Err(FetchError::Malformed(format!(
                    "{key} for {date} has unexpected JSON type"
                )));
            }
            None => continue,
        }
    }
    Err(FetchError::Malformed(format!(
        "record for {date} missing field {keys:?}"
    )))
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn daily_body() -> Value {
        serde_json::from_str(
            r#"{
                "Meta Data": { "1. Information": "Daily Prices" },
                "Time Series (Digital Currency Daily)": {
                    "2024-01-03": { "4. close": "10", "5. volume": "100" },
                    "2024-01-02": { "4. close": "9",  "5. volume": "90" },
                    "2024-01-01": { "4. close": "8",  "5. volume": "80" }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn reverses_most_recent_first_records() {
        let ds = normalize_response(&daily_body(), Granularity::Daily, "EUR").unwrap();
        assert_eq!(
            ds.price_series,
            vec![
                PricePoint { time: date("2024-01-01"), value: 8.0 },
                PricePoint { time: date("2024-01-02"), value: 9.0 },
                PricePoint { time: date("2024-01-03"), value: 10.0 },
            ]
        );
        assert_eq!(
            ds.volume_series,
            vec![
                VolumePoint { time: date("2024-01-01"), value: 80.0 },
                VolumePoint { time: date("2024-01-02"), value: 90.0 },
                VolumePoint { time: date("2024-01-03"), value: 100.0 },
            ]
        );
    }

    #[test]
    fn series_are_aligned_and_strictly_ascending() {
        let mut series = Map::new();
        for day in (1..=28).rev() {
            series.insert(
                format!("2024-02-{day:02}"),
                serde_json::json!({ "4. close": format!("{day}.5"), "5. volume": day * 10 }),
            );
        }
        let ds = normalize_series(&series, "EUR").unwrap();
        assert_eq!(ds.price_series.len(), 28);
        assert_eq!(ds.volume_series.len(), 28);
        for (p, v) in ds.price_series.iter().zip(&ds.volume_series) {
            assert_eq!(p.time, v.time);
        }
        assert!(ds.price_series.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(ds.volume_series[27].value, 280.0);
    }

    #[test]
    fn out_of_order_records_are_resorted() {
        let body = serde_json::json!({
            "Time Series (Digital Currency Weekly)": {
                "2024-01-14": { "4. close": "3", "5. volume": "30" },
                "2024-01-21": { "4. close": "4", "5. volume": "40" },
                "2024-01-07": { "4. close": "2", "5. volume": "20" }
            }
        });
        let ds = normalize_response(&body, Granularity::Weekly, "EUR").unwrap();
        let closes: Vec<f64> = ds.price_series.iter().map(|p| p.value).collect();
        assert_eq!(closes, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn falls_back_to_market_qualified_close() {
        let body = serde_json::json!({
            "Time Series (Digital Currency Monthly)": {
                "2024-02-29": { "4a. close (EUR)": "51000.12", "5. volume": "12.5" }
            }
        });
        let ds = normalize_response(&body, Granularity::Monthly, "EUR").unwrap();
        assert_eq!(ds.price_series[0].value, 51000.12);
        assert_eq!(ds.volume_series[0].value, 12.5);
    }

    #[test]
    fn absent_series_key_yields_empty_dataset() {
        let ds = normalize_response(&daily_body(), Granularity::Weekly, "EUR").unwrap();
        assert!(ds.is_empty());
        assert!(ds.volume_series.is_empty());
    }

    #[test]
    fn provider_message_surfaces_as_error() {
        let body = serde_json::json!({ "Information": "rate limit reached" });
        let err = normalize_response(&body, Granularity::Daily, "EUR").unwrap_err();
        assert!(matches!(err, FetchError::Provider(ref m) if m == "rate limit reached"));
    }

    #[test]
    fn unparsable_close_is_malformed() {
        let body = serde_json::json!({
            "Time Series (Digital Currency Daily)": {
                "2024-01-01": { "4. close": "n/a", "5. volume": "1" }
            }
        });
        let err = normalize_response(&body, Granularity::Daily, "EUR").unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn invalid_date_key_is_malformed() {
        let body = serde_json::json!({
            "Time Series (Digital Currency Daily)": {
                "yesterday": { "4. close": "1", "5. volume": "1" }
            }
        });
        assert!(matches!(
            normalize_response(&body, Granularity::Daily, "EUR"),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut s = "ééé".to_string();
        truncate_on_char_boundary(&mut s, 3);
        assert_eq!(s, "é");
    }

    /// Serve a single canned HTTP response and hand back the request head.
    async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let head = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            head
        });
        (format!("http://{addr}"), handle)
    }

    fn fetcher(base_url: String) -> HistoricalSeriesFetcher {
        HistoricalSeriesFetcher::new(FetcherConfig {
            base_url,
            api_key: "demo".into(),
            symbol: "BTC".into(),
            market: "EUR".into(),
            request_timeout: Some(Duration::from_secs(5)),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_sends_granularity_symbol_and_market() {
        let (url, server) = serve_once("200 OK", daily_body().to_string()).await;
        let ds = fetcher(url).fetch_series(Timeframe::ThreeDays).await.unwrap();
        assert_eq!(ds.len(), 3);

        let head = server.await.unwrap();
        let request_line = head.lines().next().unwrap();
        assert!(request_line.starts_with("GET /query?"));
        assert!(request_line.contains("function=DIGITAL_CURRENCY_DAILY"));
        assert!(request_line.contains("symbol=BTC"));
        assert!(request_line.contains("market=EUR"));
        assert!(request_line.contains("apikey=demo"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let (url, server) = serve_once("503 Service Unavailable", "{\"busy\":true}".into()).await;
        let err = fetcher(url).fetch_series(Timeframe::OneYear).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connection_failure_is_a_fetch_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = fetcher(format!("http://{addr}"))
            .fetch_series(Timeframe::OneDay)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }
}
