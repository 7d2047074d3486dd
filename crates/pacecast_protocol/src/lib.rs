/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard cap on any inbound channel frame.
pub const MAX_FRAME_BYTES: usize = 2048;
/// Tighter cap applied to everything except `push_subscribe`.
pub const MAX_LOCATION_BYTES: usize = 512;

pub const TYPE_LOCATION: &str = "location";
pub const TYPE_PUSH_SUBSCRIBE: &str = "push_subscribe";

pub const NOTIFICATION_TITLE: &str = "Runner update";
pub const NOTIFICATION_FALLBACK_BODY: &str = "New position received";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionKeys {
    #[serde(default)]
    pub p256dh: String,
    #[serde(default)]
    pub auth: String,
}

/// Browser push subscription as produced by `PushManager.subscribe()`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PushSubscription {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub keys: SubscriptionKeys,
}

/// A parsed `location` frame. Only `coords` is interpreted; the raw text is
/// what gets stored and rebroadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMessage {
    pub coords: Option<(f64, f64)>,
}

impl LocationMessage {
    pub fn from_value(value: &Value) -> Self {
        let coords = value
            .get("coords")
            .and_then(|v| v.as_array())
            .and_then(|arr| match (arr.first()?.as_f64(), arr.get(1)?.as_f64()) {
                (Some(lat), Some(lon)) => Some((lat, lon)),
                _ => None,
            });
        Self { coords }
    }
}

/// Inbound frame after JSON parsing, classified by its `type` field.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    PushSubscribe(Option<PushSubscription>),
    Location(LocationMessage),
    Other,
}

impl ChannelMessage {
    pub fn classify(value: &Value) -> Self {
        match value.get("type").and_then(|v| v.as_str()) {
            Some(TYPE_PUSH_SUBSCRIBE) => {
                let sub = value
                    .get("subscription")
                    .cloned()
                    .and_then(|v| serde_json::from_value::<PushSubscription>(v).ok());
                ChannelMessage::PushSubscribe(sub)
            }
            Some(TYPE_LOCATION) => ChannelMessage::Location(LocationMessage::from_value(value)),
            _ => ChannelMessage::Other,
        }
    }
}

/// JSON body encrypted into every push message.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

impl PushNotification {
    pub fn for_location(msg: &LocationMessage) -> Self {
        let body = match msg.coords {
            Some((lat, lon)) => format!("{}, {}", fixed5(lat), fixed5(lon)),
            None => NOTIFICATION_FALLBACK_BODY.to_string(),
        };
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            body,
        }
    }
}

/// Five-decimal rendering that rounds exact ties away from zero, the way
/// browsers render `toFixed(5)`. `-0.0` renders without a sign.
fn fixed5(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    // Every finite f64 has an exact decimal expansion within 1100 places.
    let exact = format!("{:.1100}", v.abs());
    let (int_part, frac) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let frac = frac.as_bytes();
    let kept = frac.get(..5).unwrap_or(b"00000");
    let round_up = frac.get(5).is_some_and(|d| *d >= b'5');

    let mut digits: Vec<u8> = int_part.bytes().chain(kept.iter().copied()).collect();
    if round_up {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, b'1');
                break;
            }
            i -= 1;
            if digits[i] == b'9' {
                digits[i] = b'0';
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let (whole, fraction) = digits.split_at(digits.len() - 5);
    let sign = if v < 0.0 { "-" } else { "" };
    let ascii = |d: &[u8]| d.iter().map(|&b| b as char).collect::<String>();
    format!("{sign}{}.{}", ascii(whole), ascii(fraction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_location_with_coords() {
        let v: Value = serde_json::from_str(r#"{"type":"location","coords":[51.5,-0.12],"speed":3}"#).unwrap();
        match ChannelMessage::classify(&v) {
            ChannelMessage::Location(loc) => assert_eq!(loc.coords, Some((51.5, -0.12))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_coords_are_ignored() {
        let v: Value = serde_json::from_str(r#"{"type":"location","coords":["a",1]}"#).unwrap();
        let ChannelMessage::Location(loc) = ChannelMessage::classify(&v) else {
            panic!("expected location");
        };
        assert_eq!(loc.coords, None);
    }

    #[test]
    fn subscribe_without_keys_still_parses() {
        let v: Value = serde_json::from_str(
            r#"{"type":"push_subscribe","subscription":{"endpoint":"https://push.example.com/x"}}"#,
        )
        .unwrap();
        let ChannelMessage::PushSubscribe(Some(sub)) = ChannelMessage::classify(&v) else {
            panic!("expected subscription");
        };
        assert_eq!(sub.endpoint, "https://push.example.com/x");
        assert!(sub.keys.p256dh.is_empty());
    }

    #[test]
    fn unknown_type_is_other() {
        let v: Value = serde_json::from_str(r#"{"type":"chat","text":"hi"}"#).unwrap();
        assert!(matches!(ChannelMessage::classify(&v), ChannelMessage::Other));
        let v: Value = serde_json::from_str(r#"[1,2,3]"#).unwrap();
        assert!(matches!(ChannelMessage::classify(&v), ChannelMessage::Other));
    }

    #[test]
    fn notification_body_uses_five_decimals() {
        let n = PushNotification::for_location(&LocationMessage {
            coords: Some((45.123456789, -0.0)),
        });
        assert_eq!(n.title, "Runner update");
        assert_eq!(n.body, "45.12346, 0.00000");

        let n = PushNotification::for_location(&LocationMessage { coords: None });
        assert_eq!(n.body, "New position received");
    }

    #[test]
    fn exact_ties_round_away_from_zero() {
        assert_eq!(fixed5(45.015625), "45.01563");
        assert_eq!(fixed5(0.015625), "0.01563");
        assert_eq!(fixed5(-45.015625), "-45.01563");
        assert_eq!(fixed5(2.2945), "2.29450");
        assert_eq!(fixed5(-0.12), "-0.12000");
        assert_eq!(fixed5(0.999999), "1.00000");
        assert_eq!(fixed5(-9.999996), "-10.00000");
        assert_eq!(fixed5(0.0), "0.00000");
    }
}
