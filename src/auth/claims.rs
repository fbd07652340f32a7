use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of JWT issued by this service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[serde(alias = "Access")]
    Access,
    #[serde(alias = "Refresh")]
    Refresh,
    /// Time-limited invite-acceptance token, bound to the invited email.
    #[serde(alias = "Invite")]
    Invite,
    /// Time-limited password-reset token.
    #[serde(alias = "Reset")]
    Reset,
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,       // user ID
    pub iat: usize,      // issued at (unix timestamp)
    pub exp: usize,      // expires at (unix timestamp)
    pub iss: String,     // issuer
    pub aud: String,     // audience
    pub kind: TokenKind, // token type
}

/// JWT payload for invite tokens. The email claim anchors the token to the
/// verified-email identity it was issued for; validity is re-derived from the
/// signature and expiry, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteClaims {
    pub sub: Uuid,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
    pub kind: TokenKind,
}
