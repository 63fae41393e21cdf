//! HTTP method as a typed enum.
//!
//! Covers the RFC 9110 method set. Anything else is rejected by the server
//! with `405 Method Not Allowed` before the request enters the pipeline, so
//! middleware and handlers only ever see one of these variants.

use std::fmt;
use std::str::FromStr;

/// A supported HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }
}

/// A method string outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method `{0}`")]
pub struct UnknownMethod(pub String);

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            other     => Err(UnknownMethod(other.to_owned())),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = UnknownMethod;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods_case_sensitively() {
        assert_eq!("GET".parse::<Method>(), Ok(Method::Get));
        assert_eq!("OPTIONS".parse::<Method>(), Ok(Method::Options));
        assert_eq!("get".parse::<Method>(), Err(UnknownMethod("get".into())));
    }

    #[test]
    fn rejects_webdav_verbs() {
        let propfind = http::Method::from_bytes(b"PROPFIND").unwrap();
        assert!(Method::try_from(&propfind).is_err());
        assert_eq!(Method::try_from(&http::Method::DELETE), Ok(Method::Delete));
    }
}
