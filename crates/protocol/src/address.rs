//! Protocol addresses (`user[:device]@server`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Server part for individual accounts.
pub const USER_SERVER: &str = "s.whatsapp.net";
/// Server part for groups.
pub const GROUP_SERVER: &str = "g.us";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    pub user: String,
    /// Linked-device index. `0` is the primary device.
    pub device: u16,
    pub server: String,
}

impl Address {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: 0,
            server: server.into(),
        }
    }

    /// Address of an individual account. Accepts a bare phone number
    /// (`+1 555 000-1111` style punctuation is stripped) or a full address.
    pub fn user(number: &str) -> Result<Self, ProtocolError> {
        let number = number.trim();
        if number.contains('@') {
            return number.parse();
        }
        normalize_phone(number)
            .map(|n| Self::new(n, USER_SERVER))
            .ok_or_else(|| ProtocolError::InvalidAddress(number.to_owned()))
    }

    /// Address of a group. Accepts the bare group id or a full address.
    pub fn group(id: &str) -> Result<Self, ProtocolError> {
        let id = id.trim();
        if id.contains('@') {
            let addr: Self = id.parse()?;
            if !addr.is_group() {
                return Err(ProtocolError::InvalidAddress(id.to_owned()));
            }
            return Ok(addr);
        }
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ProtocolError::InvalidAddress(id.to_owned()));
        }
        Ok(Self::new(id, GROUP_SERVER))
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// The same account with the device index stripped.
    pub fn without_device(&self) -> Self {
        Self {
            device: 0,
            ..self.clone()
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device == 0 {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        }
    }
}

impl FromStr for Address {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidAddress(s.to_owned());
        let (left, server) = s.split_once('@').ok_or_else(invalid)?;
        if left.is_empty() || server.is_empty() {
            return Err(invalid());
        }
        let (user, device) = match left.split_once(':') {
            Some((user, dev)) => (user, dev.parse::<u16>().map_err(|_| invalid())?),
            None => (left, 0),
        };
        if user.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            user: user.to_owned(),
            device,
            server: server.to_owned(),
        })
    }
}

impl TryFrom<String> for Address {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_string()
    }
}

/// Strip common phone punctuation and check the result is a plausible
/// E.164 number without the leading `+`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let ok = (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    ok.then_some(digits)
}
