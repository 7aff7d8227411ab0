// ── Opaque extra data ──
//
// Caller-defined fields kept as an encoded JSON blob and decoded on read
// into whatever shape the caller asks for.

use bytes::Bytes;
use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use chatsync_api::models::ExtraFields;

/// Encoded extra-data blob.
///
/// Decoding never fails loudly: a blob that does not fit the requested type
/// reads as "no extra data".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraData(Bytes);

impl ExtraData {
    pub fn from_fields(fields: &ExtraFields) -> Self {
        if fields.is_empty() {
            return Self::default();
        }
        // A `Map<String, Value>` always serializes.
        serde_json::to_vec(fields).map(|v| Self(Bytes::from(v))).unwrap_or_default()
    }

    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(|v| Self(Bytes::from(v)))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode into the caller's shape, or `None` if absent or mismatched.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        if self.0.is_empty() {
            return None;
        }
        match serde_json::from_slice(&self.0) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(error = %e, "extra data does not match requested type");
                None
            }
        }
    }

    /// The blob as a JSON object; empty when absent or not an object.
    pub fn fields(&self) -> ExtraFields {
        self.decode().unwrap_or_default()
    }

    /// Look up one top-level field.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.fields().remove(key)
    }

    /// Key-level merge. With `overwrite` incoming keys replace stored ones;
    /// without it they only fill keys that are missing.
    pub(crate) fn merge(&mut self, incoming: &ExtraFields, overwrite: bool) {
        if incoming.is_empty() {
            return;
        }
        let mut fields = self.fields();
        for (key, value) in incoming {
            if overwrite || !fields.contains_key(key) {
                fields.insert(key.clone(), value.clone());
            }
        }
        *self = Self::from_fields(&fields);
    }
}

// Persisted as the JSON text of the blob. A blob that is not UTF-8 is
// written as raw bytes so it reads back unchanged.
impl Serialize for ExtraData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(&self.0) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.serialize_bytes(&self.0),
        }
    }
}

struct ExtraDataVisitor;

impl<'de> Visitor<'de> for ExtraDataVisitor {
    type Value = ExtraData;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("extra data as a string or a byte sequence")
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<ExtraData, E> {
        Ok(ExtraData(Bytes::copy_from_slice(text.as_bytes())))
    }

    fn visit_string<E: de::Error>(self, text: String) -> Result<ExtraData, E> {
        Ok(ExtraData(Bytes::from(text.into_bytes())))
    }

    fn visit_bytes<E: de::Error>(self, bytes: &[u8]) -> Result<ExtraData, E> {
        Ok(ExtraData(Bytes::copy_from_slice(bytes)))
    }

    fn visit_byte_buf<E: de::Error>(self, bytes: Vec<u8>) -> Result<ExtraData, E> {
        Ok(ExtraData(Bytes::from(bytes)))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ExtraData, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(ExtraData(Bytes::from(bytes)))
    }
}

impl<'de> Deserialize<'de> for ExtraData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ExtraDataVisitor)
    }
}
