//! Stream protocol messages.
//!
//! Outbound:
//! ```json
//! {"request_type":"SUBSCRIBE","channel":"TRADE","topic":{"quote_currency":"KRW","target_currency":"CRO"}}
//! {"request_type":"PING"}
//! ```
//!
//! Inbound:
//! ```json
//! {"response_type":"PONG"}
//! {"response_type":"DATA","channel":"TRADE","data":{"price":"131.2","qty":"1000","timestamp":1700000000000}}
//! ```

use crate::error::{WsError, WsResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use volwatch_core::{Instrument, PeriodSnapshot, Price, Qty, TradeEvent, Volume};

/// Subscription topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub quote_currency: String,
    pub target_currency: String,
}

impl From<&Instrument> for Topic {
    fn from(instrument: &Instrument) -> Self {
        Self {
            quote_currency: instrument.quote.clone(),
            target_currency: instrument.target.clone(),
        }
    }
}

/// Outgoing request.
#[derive(Debug, Clone, Serialize)]
pub struct WsRequest {
    pub request_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
}

impl WsRequest {
    pub fn ping() -> Self {
        Self {
            request_type: "PING".to_string(),
            channel: None,
            topic: None,
        }
    }

    pub fn subscribe(channel: impl Into<String>, topic: Topic) -> Self {
        Self {
            request_type: "SUBSCRIBE".to_string(),
            channel: Some(channel.into()),
            topic: Some(topic),
        }
    }
}

/// Raw inbound envelope.
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    #[serde(alias = "responseType")]
    response_type: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// A single executed trade from the TRADE channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeTick {
    pub price: Price,
    pub qty: Qty,
    /// Exchange timestamp in ms. Informational only.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl TradeTick {
    /// Quote-currency notional (`price × qty`).
    pub fn notional(&self) -> volwatch_core::Result<Volume> {
        self.qty.notional(self.price)
    }

    /// Convert into a trade event observed at `now`.
    ///
    /// Fails for negative, overflowing or implausibly large notionals.
    pub fn to_event(&self, now: DateTime<Utc>) -> volwatch_core::Result<TradeEvent> {
        TradeEvent::new(now, self.notional()?, Some(self.price))
    }
}

/// A candle from the CHART channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CandleData {
    /// Candle open time in ms; used as the period key.
    pub timestamp: i64,
    pub close: Price,
    /// Cumulative quote-currency volume of the candle so far.
    pub quote_volume: Volume,
}

impl From<CandleData> for PeriodSnapshot {
    fn from(candle: CandleData) -> Self {
        PeriodSnapshot::new(candle.timestamp, candle.quote_volume).with_close(candle.close)
    }
}

/// Market data forwarded to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Trade(TradeTick),
    Candle(PeriodSnapshot),
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Pong,
    /// Subscription acknowledged for a channel.
    Subscribed(String),
    Data(StreamMessage),
    /// Server-reported error.
    Error(String),
    /// Recognised envelope with nothing to act on.
    Ignored(String),
}

/// Parse one text frame.
pub fn parse_inbound(text: &str) -> WsResult<Inbound> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.response_type.as_str() {
        "PONG" => Ok(Inbound::Pong),
        "SUBSCRIBED" => Ok(Inbound::Subscribed(envelope.channel.unwrap_or_default())),
        "ERROR" => Ok(Inbound::Error(
            envelope.message.unwrap_or_else(|| text.to_string()),
        )),
        "DATA" => {
            let channel = envelope.channel.unwrap_or_default();
            let data = envelope
                .data
                .ok_or_else(|| WsError::ParseError(format!("{channel} frame without data")))?;

            match channel.as_str() {
                "TRADE" => {
                    let tick: TradeTick = serde_json::from_value(data)?;
                    Ok(Inbound::Data(StreamMessage::Trade(tick)))
                }
                "CHART" => {
                    let candle: CandleData = serde_json::from_value(data)?;
                    if !candle.quote_volume.is_plausible() {
                        return Err(WsError::ParseError(format!(
                            "implausible candle quote_volume {}",
                            candle.quote_volume
                        )));
                    }
                    Ok(Inbound::Data(StreamMessage::Candle(candle.into())))
                }
                other => Ok(Inbound::Ignored(format!("DATA:{other}"))),
            }
        }
        other => Ok(Inbound::Ignored(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cro_krw() -> Instrument {
        Instrument::new("cro", "krw").unwrap()
    }

    #[test]
    fn test_subscribe_request_format() {
        let req = WsRequest::subscribe("TRADE", Topic::from(&cro_krw()));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "request_type": "SUBSCRIBE",
                "channel": "TRADE",
                "topic": {"quote_currency": "KRW", "target_currency": "CRO"}
            })
        );
    }

    #[test]
    fn test_ping_request_format() {
        let json = serde_json::to_string(&WsRequest::ping()).unwrap();
        assert_eq!(json, r#"{"request_type":"PING"}"#);
    }

    #[test]
    fn test_parse_pong() {
        assert_eq!(
            parse_inbound(r#"{"response_type":"PONG"}"#).unwrap(),
            Inbound::Pong
        );
        assert_eq!(
            parse_inbound(r#"{"responseType":"PONG"}"#).unwrap(),
            Inbound::Pong
        );
    }

    #[test]
    fn test_parse_trade() {
        let text = r#"{
            "response_type": "DATA",
            "channel": "TRADE",
            "data": {
                "quote_currency": "KRW",
                "target_currency": "CRO",
                "id": "1700000000000001",
                "timestamp": 1700000000000,
                "price": "131.5",
                "qty": "2000",
                "is_seller_maker": false
            }
        }"#;

        let Inbound::Data(StreamMessage::Trade(tick)) = parse_inbound(text).unwrap() else {
            panic!("expected trade");
        };
        assert_eq!(tick.price, Price::new(dec!(131.5)));
        assert_eq!(tick.notional().unwrap(), Volume::new(dec!(263000)));
        assert_eq!(tick.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn test_trade_to_event_uses_observation_time() {
        let tick = TradeTick {
            price: Price::new(dec!(100)),
            qty: Qty::new(dec!(3)),
            timestamp: Some(0),
        };
        let now = Utc::now();
        let event = tick.to_event(now).unwrap();
        assert_eq!(event.occurred_at(), now);
        assert_eq!(event.volume(), Volume::new(dec!(300)));
    }

    #[test]
    fn test_oversized_trade_parses_but_is_not_an_event() {
        let text = r#"{"response_type":"DATA","channel":"TRADE","data":{"price":"79228162514264337593543950335","qty":"2"}}"#;
        let Inbound::Data(StreamMessage::Trade(tick)) = parse_inbound(text).unwrap() else {
            panic!("expected trade");
        };
        assert!(tick.notional().is_err());
        assert!(tick.to_event(Utc::now()).is_err());

        let tick = TradeTick {
            price: Price::new(dec!(1000000000000)),
            qty: Qty::new(dec!(10000000)),
            timestamp: None,
        };
        assert!(tick.notional().is_ok());
        assert!(tick.to_event(Utc::now()).is_err());
    }

    #[test]
    fn test_parse_rejects_implausible_candle_volume() {
        let text = r#"{"response_type":"DATA","channel":"CHART","data":{
            "timestamp":1700000040000,"close":"131","quote_volume":"50000000000000000000000000000"}}"#;
        assert!(matches!(parse_inbound(text), Err(WsError::ParseError(_))));

        let text = r#"{"response_type":"DATA","channel":"CHART","data":{
            "timestamp":1700000040000,"close":"131","quote_volume":"-1"}}"#;
        assert!(matches!(parse_inbound(text), Err(WsError::ParseError(_))));
    }

    #[test]
    fn test_parse_chart_candle() {
        let text = r#"{"response_type":"DATA","channel":"CHART","data":{
            "interval":"1m","timestamp":1700000040000,"open":"130","high":"132",
            "low":"129","close":"131","target_volume":"5000","quote_volume":"655000.5"}}"#;

        let Inbound::Data(StreamMessage::Candle(snapshot)) = parse_inbound(text).unwrap() else {
            panic!("expected candle");
        };
        assert_eq!(snapshot.period_key, 1_700_000_040_000);
        assert_eq!(snapshot.cumulative_volume, Volume::new(dec!(655000.5)));
        assert_eq!(snapshot.close, Some(Price::new(dec!(131))));
    }

    #[test]
    fn test_parse_ack_error_and_unknown() {
        assert_eq!(
            parse_inbound(r#"{"response_type":"SUBSCRIBED","channel":"TRADE"}"#).unwrap(),
            Inbound::Subscribed("TRADE".to_string())
        );
        assert_eq!(
            parse_inbound(r#"{"response_type":"ERROR","error_code":160,"message":"bad topic"}"#)
                .unwrap(),
            Inbound::Error("bad topic".to_string())
        );
        assert!(matches!(
            parse_inbound(r#"{"response_type":"DATA","channel":"ORDERBOOK","data":{}}"#).unwrap(),
            Inbound::Ignored(_)
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_inbound("not json").is_err());
        assert!(parse_inbound(r#"{"response_type":"DATA","channel":"TRADE"}"#).is_err());
        assert!(
            parse_inbound(r#"{"response_type":"DATA","channel":"TRADE","data":{"price":"x","qty":"1"}}"#)
                .is_err()
        );
    }
}
