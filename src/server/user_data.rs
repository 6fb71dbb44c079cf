//! Session scoped values command handlers may keep without extending [`Session`](super::Session).

use std::collections::HashMap;

/// The known extension slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserDataKey {
    /// Client software name given with `CLNT`.
    ClientName,
    /// `OPTS UTF8 ON` was received.
    Utf8,
    /// Buffer size given with `PBSZ`.
    ProtectionBufferSize,
    /// Data channel protection level given with `PROT`.
    DataChannelProtection,
    /// A handler specific slot.
    Custom(&'static str),
}

/// A value stored in a [`UserData`] slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserDataValue {
    /// Free text.
    Text(String),
    /// An on/off switch.
    Flag(bool),
    /// A number.
    Number(u64),
}

impl From<String> for UserDataValue {
    fn from(s: String) -> Self {
        UserDataValue::Text(s)
    }
}

impl From<&str> for UserDataValue {
    fn from(s: &str) -> Self {
        UserDataValue::Text(s.to_string())
    }
}

impl From<bool> for UserDataValue {
    fn from(b: bool) -> Self {
        UserDataValue::Flag(b)
    }
}

impl From<u64> for UserDataValue {
    fn from(n: u64) -> Self {
        UserDataValue::Number(n)
    }
}

/// Typed key/value storage owned by a session.
#[derive(Debug, Clone, Default)]
pub struct UserData {
    values: HashMap<UserDataKey, UserDataValue>,
}

impl UserData {
    /// Stores `value`, returning what was there before.
    pub fn insert<V: Into<UserDataValue>>(&mut self, key: UserDataKey, value: V) -> Option<UserDataValue> {
        self.values.insert(key, value.into())
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &UserDataKey) -> Option<&UserDataValue> {
        self.values.get(key)
    }

    /// The text stored under `key`, if it holds text.
    pub fn text(&self, key: &UserDataKey) -> Option<&str> {
        match self.values.get(key) {
            Some(UserDataValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// The flag stored under `key`, if it holds one.
    pub fn flag(&self, key: &UserDataKey) -> Option<bool> {
        match self.values.get(key) {
            Some(UserDataValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    /// The number stored under `key`, if it holds one.
    pub fn number(&self, key: &UserDataKey) -> Option<u64> {
        match self.values.get(key) {
            Some(UserDataValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &UserDataKey) -> Option<UserDataValue> {
        self.values.remove(key)
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}
