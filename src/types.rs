//! Core value types shared across the custody engine
use super::utils;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid7::uuid7;

/// Integer base units of either the native value or the managed asset.
pub type Amount = u64;

/// Oracle answer in 8 decimal fixed point. Signed so that bad samples can be represented.
pub type PriceSample = i64;

/// Fixed point precision shared by price samples and the fiat target value.
pub const PRICE_DECIMALS: u32 = 8;

/// An opaque principal handle. Generated identities are bech32m encoded uuid7 values.
///
/// The empty identity is the zero identity and never names a valid principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }
    /// Generate a fresh identity under the given human readable prefix, e.g. `"acct_"`
    pub fn generate(hrp: &str) -> anyhow::Result<Self> {
        Ok(Self(utils::new_uuid_to_bech32(hrp)?))
    }
    pub fn zero() -> Self {
        Self::default()
    }
    pub fn is_zero(&self) -> bool {
        self.0.trim().is_empty()
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("<zero>");
        }
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::new(value)
    }
}

impl<C> minicbor::Encode<C> for Identity {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Identity {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(Identity(d.str()?.to_owned()))
    }
}

/// Links an oracle request to its later fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId([u8; 16]);

impl CorrelationId {
    pub fn new() -> Self {
        Self(*uuid7().as_bytes())
    }
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl<C> minicbor::Encode<C> for CorrelationId {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        minicbor::Encode::encode(&self.0, e, ctx)
    }
}

impl<'b, C> minicbor::Decode<'b, C> for CorrelationId {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let bytes: [u8; 16] = d.decode()?;

        Ok(CorrelationId(bytes))
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        // nanoseconds since the epoch only cover roughly 1677 to 2262
        let nanos = self
            .0
            .timestamp_nanos_opt()
            .ok_or_else(|| minicbor::encode::Error::message("timestamp outside nanosecond range"))?;
        e.i64(nanos)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(TimeStamp(DateTime::from_timestamp_nanos(d.i64()?)))
    }
}
