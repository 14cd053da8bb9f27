use http::header::{HeaderName, HeaderValue};

use crate::Result;
use crate::error::Error;

/// One header occurrence plus the semantics it was recorded with.
///
/// Set headers overwrite every earlier header of the same name; add headers
/// append another occurrence. The transport stage replays the distinction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
    set: bool,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>, set: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            set,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_set_header(&self) -> bool {
        self.set
    }
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName> {
    name.parse().map_err(|source| Error::InvalidHeaderName {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue> {
    value.parse().map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

/// Validates a header pair and returns it with the value trimmed.
pub(crate) fn validated_header(name: &str, value: &str, set: bool) -> Result<Header> {
    let value = value.trim();
    parse_header_name(name)?;
    parse_header_value(name, value)?;
    Ok(Header::new(name, value, set))
}

pub(crate) fn first_value<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(Header::value)
}
