//! One-time short codes.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::types::ShortCodeId;

/// The action a short code grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShortCodeUsage {
    #[serde(rename = "validateMail")]
    ValidateMail,
    #[serde(rename = "resetPassword")]
    ResetPassword,
    #[serde(rename = "requestRegister")]
    RequestRegister,
}

impl ShortCodeUsage {
    pub const ALL: [ShortCodeUsage; 3] = [
        ShortCodeUsage::ValidateMail,
        ShortCodeUsage::ResetPassword,
        ShortCodeUsage::RequestRegister,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShortCodeUsage::ValidateMail => "validateMail",
            ShortCodeUsage::ResetPassword => "resetPassword",
            ShortCodeUsage::RequestRegister => "requestRegister",
        }
    }
}

impl fmt::Display for ShortCodeUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShortCodeUsage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|usage| usage.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "short code usage",
                value: s.to_string(),
            })
    }
}

/// Why a short code was soft-deleted.
///
/// The stored strings are part of the audit trail and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteComment {
    /// Superseded by a newer code for the same target and usage.
    OverrideWithNewerKey,
    /// Redeemed.
    KeyConsumed,
}

impl DeleteComment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteComment::OverrideWithNewerKey => "override with newer key",
            DeleteComment::KeyConsumed => "key consumed",
        }
    }
}

impl fmt::Display for DeleteComment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeleteComment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "override with newer key" => Ok(DeleteComment::OverrideWithNewerKey),
            "key consumed" => Ok(DeleteComment::KeyConsumed),
            other => Err(CoreError::UnknownVariant {
                kind: "delete comment",
                value: other.to_string(),
            }),
        }
    }
}

/// A stored short code.
///
/// `code` is a keyed digest; the cleartext is only ever returned to the
/// caller that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortCode {
    pub id: ShortCodeId,
    pub code: String,
    pub usage: ShortCodeUsage,
    pub target: String,
    /// Opaque payload needed to complete the guarded action.
    pub data: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Raw stored comment. `None` for expired rows sealed by the store.
    pub deleted_comment: Option<String>,
}

impl ShortCode {
    /// Active means neither deleted nor expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && self.expires_at > now
    }

    /// The deletion comment as a closed value, if it is one of the standard ones.
    pub fn delete_reason(&self) -> Option<DeleteComment> {
        self.deleted_comment.as_deref().and_then(|c| c.parse().ok())
    }

    /// Deserialize the JSON payload.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.data
            .as_deref()
            .map(|bytes| serde_json::from_slice::<T>(bytes))
            .transpose()
            .map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(now: DateTime<Utc>) -> ShortCode {
        ShortCode {
            id: ShortCodeId::generate(),
            code: "digest".into(),
            usage: ShortCodeUsage::ResetPassword,
            target: "u@x.com".into(),
            data: Some(br#"{"user_id":"abc"}"#.to_vec()),
            created_at: now,
            expires_at: now + Duration::hours(1),
            deleted_at: None,
            deleted_comment: None,
        }
    }

    #[test]
    fn test_usage_tags() {
        assert_eq!(ShortCodeUsage::ResetPassword.as_str(), "resetPassword");
        assert_eq!(
            "requestRegister".parse::<ShortCodeUsage>().unwrap(),
            ShortCodeUsage::RequestRegister
        );
        assert!("ResetPassword".parse::<ShortCodeUsage>().is_err());
        assert_eq!(
            serde_json::to_string(&ShortCodeUsage::ValidateMail).unwrap(),
            "\"validateMail\""
        );
    }

    #[test]
    fn test_delete_comment_strings() {
        assert_eq!(
            DeleteComment::OverrideWithNewerKey.as_str(),
            "override with newer key"
        );
        assert_eq!(DeleteComment::KeyConsumed.as_str(), "key consumed");
        assert_eq!(
            "key consumed".parse::<DeleteComment>().unwrap(),
            DeleteComment::KeyConsumed
        );
        assert!("consumed".parse::<DeleteComment>().is_err());
    }

    #[test]
    fn test_is_active() {
        let now = Utc::now();
        let mut sc = code(now);
        assert!(sc.is_active(now));

        sc.deleted_at = Some(now);
        assert!(!sc.is_active(now));

        let mut sc = code(now);
        sc.expires_at = now;
        assert!(!sc.is_active(now));
    }

    #[test]
    fn test_data_as() {
        #[derive(Deserialize)]
        struct Payload {
            user_id: String,
        }

        let sc = code(Utc::now());
        let payload: Payload = sc.data_as().unwrap().unwrap();
        assert_eq!(payload.user_id, "abc");

        let empty = ShortCode {
            data: None,
            ..sc.clone()
        };
        assert!(empty.data_as::<Payload>().unwrap().is_none());

        let garbage = ShortCode {
            data: Some(b"nope".to_vec()),
            ..sc
        };
        assert!(garbage.data_as::<Payload>().is_err());
    }
}
