//! Utility functions for hashing and serialization

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::CustodyError;

// construct a unique account id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Encode a value into CBOR, returning the sha256 digest of the encoding alongside the bytes.
pub fn encode_with_digest<T: minicbor::Encode<()>>(value: &T) -> Result<(String, Vec<u8>), CustodyError> {
    let cbor = minicbor::to_vec(value).map_err(|e| CustodyError::Encoding(e.to_string()))?;
    let hash = sha256::digest(&cbor);

    Ok((hash, cbor))
}

/// Decode `bytes` only if they still hash to `digest`.
pub fn decode_verified<T>(bytes: &[u8], digest: &str, key: impl Into<String>) -> Result<T, CustodyError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    if sha256::digest(bytes) != digest {
        return Err(CustodyError::DigestMismatch { key: key.into() });
    }
    decode(bytes)
}

pub fn decode<T>(bytes: &[u8]) -> Result<T, CustodyError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| CustodyError::Encoding(e.to_string()))
}
