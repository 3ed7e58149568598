//! Body codecs.
//!
//! Handlers never parse raw bytes themselves: they ask the [`Call`](crate::Call)
//! for a typed body and the codec registered for the request content type
//! does the conversion through a [`serde_json::Value`] tree.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Result, WebError};
use crate::request::Request;

/// Converts bodies of one content type from and to a value tree.
pub trait BodyCodec: Send + Sync {
    /// MIME type handled by this codec, without parameters.
    fn content_type(&self) -> &str;

    /// Decodes raw bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Encodes a value tree.
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;
}

/// `application/json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }
}

/// `application/x-www-form-urlencoded`.
///
/// Decodes into an object of strings; repeated keys become arrays.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormCodec;

impl BodyCodec for FormCodec {
    fn content_type(&self) -> &str {
        "application/x-www-form-urlencoded"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(bytes).map_err(|e| WebError::Codec {
            content_type: self.content_type().to_string(),
            reason: e.to_string(),
        })?;
        let query = crate::request::QueryParams::parse(text);
        let mut object = Map::new();
        for (key, values) in query.iter() {
            let value = match values {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().cloned().map(Value::String).collect()),
            };
            object.insert(key.to_string(), value);
        }
        Ok(Value::Object(object))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let Value::Object(object) = value else {
            return Err(WebError::Codec {
                content_type: self.content_type().to_string(),
                reason: "only objects can be form encoded".to_string(),
            });
        };
        let mut pairs = Vec::new();
        for (key, value) in object {
            let values: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for v in values {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                pairs.push(format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(&text)
                ));
            }
        }
        Ok(pairs.join("&").into_bytes())
    }
}

/// Ordered codec registry. The first codec is the default.
#[derive(Clone)]
pub struct Codecs {
    codecs: Vec<Arc<dyn BodyCodec>>,
}

impl Codecs {
    /// A registry holding only `codec`.
    pub fn single(codec: impl BodyCodec + 'static) -> Self {
        Self {
            codecs: vec![Arc::new(codec)],
        }
    }

    /// Registers another codec; an existing codec for the same content type
    /// is replaced.
    pub fn register(&mut self, codec: Arc<dyn BodyCodec>) {
        self.codecs
            .retain(|c| !c.content_type().eq_ignore_ascii_case(codec.content_type()));
        self.codecs.push(codec);
    }

    /// The default codec.
    pub fn default_codec(&self) -> &Arc<dyn BodyCodec> {
        &self.codecs[0]
    }

    /// The codec for a `Content-Type`/`Accept` header value, ignoring
    /// parameters.
    pub fn find(&self, content_type: &str) -> Option<&Arc<dyn BodyCodec>> {
        content_type
            .split(',')
            .map(|part| part.split(';').next().unwrap_or("").trim())
            .find_map(|mime| {
                self.codecs
                    .iter()
                    .find(|c| c.content_type().eq_ignore_ascii_case(mime))
            })
    }

    /// The codec decoding a request body: by content type, else the default.
    pub fn for_request(&self, request: &Request) -> &Arc<dyn BodyCodec> {
        request
            .content_type()
            .and_then(|ct| self.find(ct))
            .unwrap_or_else(|| self.default_codec())
    }

    /// The codec encoding a response: by `Accept`, else by request content
    /// type, else the default.
    pub fn for_response(&self, request: &Request) -> &Arc<dyn BodyCodec> {
        request
            .accept()
            .and_then(|accept| self.find(accept))
            .unwrap_or_else(|| self.for_request(request))
    }
}

impl Default for Codecs {
    fn default() -> Self {
        let mut codecs = Self::single(JsonCodec);
        codecs.register(Arc::new(FormCodec));
        codecs
    }
}

impl std::fmt::Debug for Codecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.content_type()))
            .finish()
    }
}
