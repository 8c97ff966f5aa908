//! Message content — what actually gets encrypted.
//!
//! Content is a signed message of its own, independent of the envelope:
//! the envelope authenticates routing, the content signature authenticates
//! the words.

use courier_crypto::{SignedMessage, SigningKeyPair};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub from: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<String>>,
    /// Signed fields this version does not name; kept so they re-verify.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Content(SignedMessage<MessageBody>);

impl Content {
    pub fn create(
        signer: &SigningKeyPair,
        username: &str,
        text: &str,
        mentions: Option<Vec<String>>,
    ) -> Result<Self, ProtoError> {
        let body = MessageBody {
            from: Sender { username: username.to_string() },
            text: text.to_string(),
            mentions,
            extra: Map::new(),
        };
        Ok(Self(SignedMessage::sign(signer, body)?))
    }

    pub fn from_value(value: Value) -> Result<Self, ProtoError> {
        SignedMessage::from_value(value)
            .map(Self)
            .map_err(|e| ProtoError::Malformed(e.to_string()))
    }

    pub fn verify(&self) -> Result<bool, ProtoError> {
        Ok(self.0.verify()?)
    }

    pub fn body(&self) -> &MessageBody {
        self.0.payload()
    }

    pub fn sender(&self) -> &str {
        &self.body().from.username
    }

    pub fn text(&self) -> &str {
        &self.body().text
    }

    pub fn mentions(&self) -> Option<&[String]> {
        self.body().mentions.as_deref()
    }

    /// A signed field outside the fixed message shape.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body().extra.get(name)
    }

    /// Base64url verifying key of the signing device.
    pub fn author(&self) -> &str {
        self.0.author()
    }

    pub fn signed(&self) -> &SignedMessage<MessageBody> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_and_verify() {
        let kp = SigningKeyPair::generate();
        let content = Content::create(&kp, "alice", "hi bob", None).unwrap();
        assert_eq!(content.sender(), "alice");
        assert_eq!(content.text(), "hi bob");
        assert_eq!(content.mentions(), None);
        assert_eq!(content.author(), kp.author());
        assert!(content.verify().unwrap());
    }

    #[test]
    fn absent_mentions_are_omitted() {
        let kp = SigningKeyPair::generate();
        let plain = serde_json::to_value(Content::create(&kp, "alice", "hi", None).unwrap()).unwrap();
        assert!(plain.get("mentions").is_none());
        assert_eq!(plain["from"]["username"], "alice");

        let tagged = Content::create(&kp, "alice", "hi @bob", Some(vec!["bob".into()])).unwrap();
        assert_eq!(tagged.mentions(), Some(&["bob".to_string()][..]));
        assert!(tagged.verify().unwrap());
    }

    #[test]
    fn edited_text_fails_verification() {
        let kp = SigningKeyPair::generate();
        let mut v = serde_json::to_value(Content::create(&kp, "alice", "hi", None).unwrap()).unwrap();
        v["text"] = json!("bye");
        let forged = Content::from_value(v).unwrap();
        assert!(!forged.verify().unwrap());
    }

    #[test]
    fn unknown_signed_fields_survive_parsing() {
        let kp = SigningKeyPair::generate();
        let signed = SignedMessage::sign(
            &kp,
            json!({ "from": { "username": "bob" }, "text": "hi", "replyTo": "abc" }),
        )
        .unwrap();
        let content = Content::from_value(signed.to_value().unwrap()).unwrap();

        assert!(content.verify().unwrap());
        assert_eq!(content.field("replyTo"), Some(&json!("abc")));
        assert_eq!(serde_json::to_value(&content).unwrap()["replyTo"], "abc");
        assert!(content.body().extra.get("author").is_none());
    }

    #[test]
    fn non_content_is_malformed() {
        assert!(matches!(
            Content::from_value(json!({ "text": "no sender" })),
            Err(ProtoError::Malformed(_))
        ));
    }
}
