use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A message handed to the session as-is.
///
/// The producer only checks that the message is set (a topic and a body are
/// present); everything else is interpreted by the session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub keys: Option<String>,
    pub body: Bytes,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Message {
    pub fn new(topic: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_keys(mut self, keys: impl Into<String>) -> Self {
        self.keys = Some(keys.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Rejects a message that was never filled in.
    pub(crate) fn ensure_set(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(Error::InvalidArgument {
                name: "message",
                reason: "message has no topic".to_string(),
            });
        }
        if self.body.is_empty() {
            return Err(Error::InvalidArgument {
                name: "message",
                reason: "message has no body".to_string(),
            });
        }
        Ok(())
    }
}
