use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use tracing::debug;

use shared::types::TokenClaims;

/// base64url, padding optional: tokens in the wild come both ways.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the payload segment of `header.payload.signature`.
///
/// Returns `None` for anything other than exactly three non-empty segments,
/// a payload that is not base64url, not JSON, or lacks a numeric `exp`.
/// The signature is not checked.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut segments = token.trim().split('.');
    let (header, payload, signature) = (segments.next()?, segments.next()?, segments.next()?);

    if segments.next().is_some() || header.is_empty() || payload.is_empty() || signature.is_empty()
    {
        debug!("Token is not a three-segment structure");
        return None;
    }

    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|e| debug!("Token payload is not base64url: {}", e))
        .ok()?;

    serde_json::from_slice::<TokenClaims>(&bytes)
        .map_err(|e| debug!("Token payload is not a claims object: {}", e))
        .ok()
}

/// `true` iff `token` decodes and its `exp` lies strictly after `now`.
pub fn token_is_live(token: &str, now: f64) -> bool {
    decode_claims(token).is_some_and(|claims| claims.is_live_at(now))
}
