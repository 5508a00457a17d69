//! Account identities.
//!
//! An [`AccountId`] is 32 opaque bytes. Its text form is `u` followed by 64
//! lowercase hex digits; JSON uses the same form so ids can key maps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PREFIX: char = 'u';

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountIdError {
    #[error("account id must start with 'u'")]
    MissingPrefix,
    #[error("account id must carry 64 hex digits after the prefix, got {0}")]
    WrongLength(usize),
    #[error("account id is not hexadecimal: {0}")]
    NotHex(#[from] hex::FromHexError),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// Never a real account; rejected as a transfer recipient.
    pub const ZERO: AccountId = AccountId([0; 32]);

    /// `BLAKE3("UNILEVEL_ACCOUNT" || label)`
    pub fn from_label(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"UNILEVEL_ACCOUNT");
        hasher.update(label.as_bytes());
        AccountId(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        AccountId(bytes)
    }
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(PREFIX).ok_or(AccountIdError::MissingPrefix)?;
        if digits.len() != 64 {
            return Err(AccountIdError::WrongLength(digits.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)?;
        Ok(AccountId(bytes))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({PREFIX}{}..)", self.short())
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}
