use serde::{Deserialize, Serialize};

/// Claims carried in the payload segment of the access token.
///
/// The client never verifies the signature; that is the backend's job on
/// every request. Only `exp` is required, because it is the one claim the
/// client acts on: a token whose `exp` is not strictly in the future is
/// treated exactly like no token at all.
///
/// `exp` is kept as a float so that both integer and fractional timestamps
/// decode, while a string or boolean `exp` fails the whole decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Standard JWT expiry (Unix timestamp, seconds).
    pub exp: f64,

    /// Issued-at (Unix timestamp, seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<f64>,

    /// Standard JWT subject, usually the user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Role as embedded by the backend. Informational only: the role the
    /// guard acts on is the one stored at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl TokenClaims {
    /// `true` iff `exp` lies strictly after `now` (seconds).
    pub fn is_live_at(&self, now: f64) -> bool {
        self.exp > now
    }
}
