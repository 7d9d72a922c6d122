//! Buffered HTTP responses and explicit body decoding

use crate::error::{Error, Result};
use async_tungstenite::tungstenite::http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Complete body
    pub body: Vec<u8>,
}

/// How a caller wants the body handed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decode {
    /// Only the status matters
    Discard,
    /// Raw bytes
    Bytes,
    /// UTF-8 text
    Text,
    /// JSON into the requested type
    Json,
}

/// A decoded body, shaped by the [`Decode`] strategy that produced it
#[derive(Debug, Clone, PartialEq)]
pub enum Body<T> {
    /// Nothing kept
    Empty,
    /// Raw bytes
    Bytes(Vec<u8>),
    /// UTF-8 text
    Text(String),
    /// Structured value
    Json(T),
}

impl Response {
    /// Build a response from its parts
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Body as lossy text, for diagnostics
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Check the status and decode the body with the given strategy.
    ///
    /// A mismatched status is always an [`Error::UnexpectedStatus`] carrying
    /// the actual code and the raw body, whatever the strategy.
    pub fn parse<T: DeserializeOwned>(
        self,
        expected: StatusCode,
        decode: Decode,
    ) -> Result<Body<T>> {
        if self.status != expected {
            return Err(Error::UnexpectedStatus {
                status: self.status.as_u16(),
                body: self.body_text(),
            });
        }

        match decode {
            Decode::Discard => Ok(Body::Empty),
            Decode::Bytes => Ok(Body::Bytes(self.body)),
            Decode::Text => String::from_utf8(self.body)
                .map(Body::Text)
                .map_err(|e| Error::Decode {
                    body: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                    reason: e.utf8_error().to_string(),
                }),
            Decode::Json => serde_json::from_slice(&self.body)
                .map(Body::Json)
                .map_err(|e| Error::Decode {
                    body: self.body_text(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Only check the status
    pub fn expect_status(self, expected: StatusCode) -> Result<()> {
        self.parse::<()>(expected, Decode::Discard).map(|_| ())
    }

    /// Check the status and decode a JSON body
    pub fn json<T: DeserializeOwned>(self, expected: StatusCode) -> Result<T> {
        match self.parse(expected, Decode::Json)? {
            Body::Json(value) => Ok(value),
            _ => unreachable!("json strategy yields a json body"),
        }
    }

    /// Check the status and return the body as text
    pub fn text(self, expected: StatusCode) -> Result<String> {
        match self.parse::<()>(expected, Decode::Text)? {
            Body::Text(text) => Ok(text),
            _ => unreachable!("text strategy yields a text body"),
        }
    }
}
