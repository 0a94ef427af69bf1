//! Connection targets.

use std::fmt;
use url::Url;

/// Where to connect, plus query parameters appended at connect time.
///
/// The address is kept as given and only parsed when the final URL is
/// built, so a malformed address surfaces from `connect` rather than from
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    address: String,
    params: Vec<(String, String)>,
}

impl ConnectionTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            params: Vec::new(),
        }
    }

    /// Add a query parameter sent with every connection attempt.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// The base address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Parameters added with [`with_param`](Self::with_param).
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Build the final URL with one more parameter appended.
    ///
    /// Existing query parameters on the address are preserved; the target
    /// itself is left untouched.
    pub fn resolve(&self, key: &str, value: &str) -> Result<Url, TargetError> {
        let mut url = Url::parse(&self.address).map_err(|source| TargetError::InvalidAddress {
            address: self.address.clone(),
            source,
        })?;
        if url.cannot_be_a_base() {
            return Err(TargetError::InvalidAddress {
                address: self.address.clone(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            });
        }

        let extra = std::iter::once((key, value));
        let params = self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params.chain(extra) {
                if k.is_empty() {
                    return Err(TargetError::InvalidQueryParameter(k.to_string()));
                }
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl From<&str> for ConnectionTarget {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for ConnectionTarget {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

impl From<Url> for ConnectionTarget {
    fn from(url: Url) -> Self {
        Self::new(String::from(url))
    }
}

/// The final connection URL could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("invalid target address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid query parameter name {0:?}")]
    InvalidQueryParameter(String),
}
