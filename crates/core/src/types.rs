//! Core type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A tradable on-chain asset as seen by the ranking pipeline.
///
/// `address` is the sole identity: two records with the same address
/// (case-insensitively) are the same entity regardless of which feed
/// produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub created_at: Option<DateTime<Utc>>,
    pub market_cap: f64,
    pub volume_24h: f64,
    /// Absolute 24h market cap change, not a percentage.
    pub market_cap_delta_24h: f64,
    pub unique_holders: u64,
    pub image_uri: Option<String>,
}

impl Entity {
    /// Lower-cased address, the deduplication key.
    pub fn address_key(&self) -> String {
        self.address.to_lowercase()
    }

    /// Bit-level equality on the volatile fields that change between
    /// polling cycles. Used by the stabilizer to suppress no-op deltas.
    pub fn volatile_fields_eq(&self, other: &Entity) -> bool {
        self.market_cap.to_bits() == other.market_cap.to_bits()
            && self.volume_24h.to_bits() == other.volume_24h.to_bits()
            && self.market_cap_delta_24h.to_bits() == other.market_cap_delta_24h.to_bits()
            && self.unique_holders == other.unique_holders
    }

    /// True unless name/symbol/address changed, i.e. the search terms
    /// derived from this entity are still valid.
    pub fn identity_fields_eq(&self, other: &Entity) -> bool {
        self.name == other.name
            && self.symbol == other.symbol
            && self.address == other.address
    }
}

/// Raw upstream feed record. Feed shapes vary by source, so every field
/// is optional and numerics are accepted as JSON number or string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub market_cap_delta_24h: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub unique_holders: Option<u64>,
    #[serde(default)]
    pub image_uri: Option<String>,
}

impl RawEntity {
    /// Normalize into a canonical [`Entity`] with explicit defaults.
    /// Records without an address cannot be deduplicated and are rejected.
    pub fn normalize(self) -> Option<Entity> {
        let address = self.address.filter(|a| !a.trim().is_empty())?;

        Some(Entity {
            id: self.id.unwrap_or_else(|| address.to_lowercase()),
            name: self.name.unwrap_or_default(),
            symbol: self.symbol.unwrap_or_default(),
            created_at: self.created_at,
            market_cap: self.market_cap.unwrap_or(0.0),
            volume_24h: self.volume_24h.unwrap_or(0.0),
            market_cap_delta_24h: self.market_cap_delta_24h.unwrap_or(0.0),
            unique_holders: self.unique_holders.unwrap_or(0),
            image_uri: self.image_uri,
            address,
        })
    }
}

/// An entity plus its composite ranking score, and a match score when the
/// record was produced by search. Replaced wholesale on every pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEntity {
    pub entity: Entity,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<u32>,
}

/// Per-address trading data fetched from the price oracle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceData {
    pub price_usd: f64,
    pub volume_h24: f64,
    pub price_change_h24: f64,
}

impl PriceData {
    /// Bit-level comparison; the enrichment cache only notifies when one
    /// of these fields actually differs.
    pub fn differs_from(&self, other: &PriceData) -> bool {
        self.price_usd.to_bits() != other.price_usd.to_bits()
            || self.volume_h24.to_bits() != other.volume_h24.to_bits()
            || self.price_change_h24.to_bits() != other.price_change_h24.to_bits()
    }
}

/// Pipeline stage for the engine state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStage {
    Idle,
    Fetching,
    Aggregating,
    Scoring,
    Enriching,
    Diffing,
}

impl CycleStage {
    pub fn name(&self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::Fetching => "fetching",
            CycleStage::Aggregating => "aggregating",
            CycleStage::Scoring => "scoring",
            CycleStage::Enriching => "enriching",
            CycleStage::Diffing => "diffing",
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Num(f64),
        Str(String),
        Null,
    }

    Ok(match Lenient::deserialize(deserializer)? {
        Lenient::Num(n) => Some(n),
        Lenient::Str(s) => s.trim().parse().ok(),
        Lenient::Null => None,
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Num(u64),
        Float(f64),
        Str(String),
        Null,
    }

    Ok(match Lenient::deserialize(deserializer)? {
        Lenient::Num(n) => Some(n),
        Lenient::Float(f) if f >= 0.0 => Some(f as u64),
        Lenient::Float(_) => None,
        Lenient::Str(s) => s.trim().parse().ok(),
        Lenient::Null => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(address: &str) -> Entity {
        Entity {
            id: address.to_string(),
            address: address.to_string(),
            name: "Test".to_string(),
            symbol: "TST".to_string(),
            created_at: None,
            market_cap: 0.0,
            volume_24h: 0.0,
            market_cap_delta_24h: 0.0,
            unique_holders: 0,
            image_uri: None,
        }
    }

    #[test]
    fn test_address_key_is_lowercase() {
        let e = entity("0xAbCd");
        assert_eq!(e.address_key(), "0xabcd");
    }

    #[test]
    fn test_normalize_rejects_missing_address() {
        let raw = RawEntity {
            name: Some("No Address".to_string()),
            ..Default::default()
        };
        assert!(raw.normalize().is_none());

        let blank = RawEntity {
            address: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(blank.normalize().is_none());
    }

    #[test]
    fn test_normalize_defaults_missing_numerics_to_zero() {
        let raw = RawEntity {
            address: Some("0xaa".to_string()),
            ..Default::default()
        };
        let e = raw.normalize().unwrap();
        assert_eq!(e.market_cap, 0.0);
        assert_eq!(e.volume_24h, 0.0);
        assert_eq!(e.unique_holders, 0);
    }

    #[test]
    fn test_lenient_numeric_parsing() {
        // volume as a string, holders as a number
        let raw: RawEntity = serde_json::from_str(
            r#"{"address":"0xAA","volume24h":"500","uniqueHolders":42,"marketCap":1.5}"#,
        )
        .unwrap();
        let e = raw.normalize().unwrap();
        assert_eq!(e.volume_24h, 500.0);
        assert_eq!(e.unique_holders, 42);
        assert_eq!(e.market_cap, 1.5);
    }

    #[test]
    fn test_volatile_fields_eq() {
        let a = entity("0xaa");
        let mut b = a.clone();
        assert!(a.volatile_fields_eq(&b));

        b.volume_24h = 1.0;
        assert!(!a.volatile_fields_eq(&b));
    }

    #[test]
    fn test_identity_fields_eq_ignores_volatile() {
        let a = entity("0xaa");
        let mut b = a.clone();
        b.market_cap = 99.0;
        assert!(a.identity_fields_eq(&b));

        b.symbol = "OTHER".to_string();
        assert!(!a.identity_fields_eq(&b));
    }

    #[test]
    fn test_price_data_differs() {
        let a = PriceData { price_usd: 1.0, volume_h24: 2.0, price_change_h24: 3.0 };
        let b = a;
        assert!(!a.differs_from(&b));

        let c = PriceData { price_usd: 1.0001, ..a };
        assert!(a.differs_from(&c));
    }
}
