//! Compound component names.
//!
//! A name is either a bare identifier (`common`) or an identifier followed by
//! property constraints (`common:key1=true,secure=false`). Registered names
//! are stored as plain strings; they are parsed only when a query needs to
//! compare them structurally.

use crate::error::{Error, Result};

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A parsed naming query: a contract name plus a set of property constraints.
///
/// Property keys are unique. Two keys are equal when they carry the same
/// contract name and the same properties, regardless of property order.
#[derive(Debug, Clone, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct NamingKey {
  contract: String,
  properties: Vec<(String, String)>,
}

impl NamingKey {
  /// A key with no property constraints.
  pub fn new(contract: impl Into<String>) -> Self {
    Self {
      contract: contract.into(),
      properties: Vec::new(),
    }
  }

  /// Adds a constraint, replacing any existing value for `key`.
  pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    let key = key.into();
    let value = value.into();
    match self.properties.iter_mut().find(|(k, _)| *k == key) {
      Some(slot) => slot.1 = value,
      None => self.properties.push((key, value)),
    }
    self
  }

  pub fn parse(text: &str) -> Result<Self> {
    let invalid = |reason: &str| Error::InvalidNamingKey {
      key: text.to_owned(),
      reason: reason.to_owned(),
    };

    let (contract, rest) = match text.split_once(':') {
      Some((contract, rest)) => (contract.trim(), Some(rest)),
      None => (text.trim(), None),
    };
    if contract.is_empty() {
      return Err(invalid("missing contract name"));
    }

    let mut key = NamingKey::new(contract);
    let Some(rest) = rest else {
      return Ok(key);
    };

    for pair in rest.split(',') {
      let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| invalid("properties must have the form key=value"))?;
      let name = name.trim();
      if name.is_empty() {
        return Err(invalid("empty property name"));
      }
      if key.property(name).is_some() {
        return Err(invalid(&format!("duplicate property '{}'", name)));
      }
      key.properties.push((name.to_owned(), value.trim().to_owned()));
    }
    Ok(key)
  }

  pub fn contract(&self) -> &str {
    &self.contract
  }

  pub fn properties(&self) -> &[(String, String)] {
    &self.properties
  }

  pub fn property(&self, key: &str) -> Option<&str> {
    self
      .properties
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  pub fn has_properties(&self) -> bool {
    !self.properties.is_empty()
  }

  /// Whether a component registered under `candidate` answers this query.
  ///
  /// A bare key matches every candidate with the same contract name; a key
  /// with properties requires the exact same property set.
  pub fn matches(&self, candidate: &NamingKey) -> bool {
    if self.contract != candidate.contract {
      return false;
    }
    !self.has_properties() || self == candidate
  }
}

impl PartialEq for NamingKey {
  fn eq(&self, other: &Self) -> bool {
    self.contract == other.contract
      && self.properties.len() == other.properties.len()
      && self
        .properties
        .iter()
        .all(|(k, v)| other.property(k) == Some(v.as_str()))
  }
}

impl FromStr for NamingKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    NamingKey::parse(s)
  }
}

impl TryFrom<String> for NamingKey {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> {
    NamingKey::parse(&value)
  }
}

impl fmt::Display for NamingKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.contract)?;
    for (i, (key, value)) in self.properties.iter().enumerate() {
      let sep = if i == 0 { ':' } else { ',' };
      write!(f, "{}{}={}", sep, key, value)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn bare_contract_is_the_zero_property_case() {
    let key = NamingKey::parse("common").unwrap();
    assert_eq!(key.contract(), "common");
    assert!(!key.has_properties());
    assert_eq!(key.to_string(), "common");
  }

  #[test]
  fn parses_properties_in_given_order() {
    let key: NamingKey = "common: key1 = true ,secure=false".parse().unwrap();
    assert_eq!(key.contract(), "common");
    assert_eq!(
      key.properties(),
      &[
        ("key1".to_string(), "true".to_string()),
        ("secure".to_string(), "false".to_string())
      ]
    );
    assert_eq!(key.to_string(), "common:key1=true,secure=false");
  }

  #[test]
  fn property_order_does_not_affect_equality() {
    let a = NamingKey::parse("common:a=1,b=2").unwrap();
    let b = NamingKey::parse("common:b=2,a=1").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, NamingKey::parse("common:a=1,b=3").unwrap());
    assert_ne!(a, NamingKey::parse("common:a=1").unwrap());
    assert_eq!(a, NamingKey::new("common").with_property("b", "2").with_property("a", "1"));
  }

  #[test]
  fn bare_queries_match_any_property_set() {
    let registered = NamingKey::parse("common:secure=true").unwrap();
    assert!(NamingKey::new("common").matches(&registered));
    assert!(NamingKey::parse("common:secure=true").unwrap().matches(&registered));
    assert!(!NamingKey::parse("common:secure=false").unwrap().matches(&registered));
    assert!(!NamingKey::parse("common:secure=true,fast=true").unwrap().matches(&registered));
    assert!(!NamingKey::new("other").matches(&registered));
  }

  #[test]
  fn rejects_malformed_keys() {
    for text in ["", ":a=1", "common:a", "common:=1", "common:a=1,a=2"] {
      let err = NamingKey::parse(text).unwrap_err();
      assert!(
        matches!(err, Error::InvalidNamingKey { .. }),
        "expected InvalidNamingKey for {:?}",
        text
      );
    }
  }

  #[test]
  fn empty_values_are_allowed() {
    let key = NamingKey::parse("common:flag=").unwrap();
    assert_eq!(key.property("flag"), Some(""));
  }
}
