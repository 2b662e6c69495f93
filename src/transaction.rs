use crate::chunk::{compute_hash, hash_bytes, ContentId};
use crate::error::{DdsError, Result};
use crate::identity::{marshal_public_key, signing_key_from_bytes, sign, verify_signature};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a ledger entry claims. The payload is opaque to the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Generic,
    PostCreated,
    FollowUser,
    UnfollowUser,
    ProfileUpdated,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Generic => "generic",
            TransactionType::PostCreated => "post_created",
            TransactionType::FollowUser => "follow_user",
            TransactionType::UnfollowUser => "unfollow_user",
            TransactionType::ProfileUpdated => "profile_updated",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DdsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.replace('-', "_").as_str() {
            "generic" => Ok(TransactionType::Generic),
            "post_created" => Ok(TransactionType::PostCreated),
            "follow_user" => Ok(TransactionType::FollowUser),
            "unfollow_user" => Ok(TransactionType::UnfollowUser),
            "profile_updated" => Ok(TransactionType::ProfileUpdated),
            other => Err(DdsError::MalformedInput(format!(
                "unknown transaction type: {}",
                other
            ))),
        }
    }
}

/// A signed claim recorded on the ledger.
///
/// `id` and the signing hash both cover `timestamp`, `tx_type`,
/// `sender_address` and `payload`, never the signature itself. Changing
/// any covered field after signing makes [`verify_signature`] fail.
///
/// [`verify_signature`]: Transaction::verify_signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: ContentId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub tx_type: TransactionType,
    pub sender_address: String,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub sender_public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Create an unsigned transaction stamped with the current time.
    pub fn new(
        sender_address: impl Into<String>,
        tx_type: TransactionType,
        payload: Vec<u8>,
    ) -> Result<Self> {
        Self::with_timestamp(sender_address, tx_type, payload, Utc::now().timestamp_millis())
    }

    /// Create an unsigned transaction with an explicit timestamp.
    pub fn with_timestamp(
        sender_address: impl Into<String>,
        tx_type: TransactionType,
        payload: Vec<u8>,
        timestamp: i64,
    ) -> Result<Self> {
        let sender_address = sender_address.into();
        if sender_address.is_empty() {
            return Err(DdsError::MalformedInput("sender address is empty".into()));
        }
        let id = hex::encode(Self::compute_hash(
            timestamp,
            tx_type,
            &sender_address,
            &payload,
        ));
        Ok(Self {
            id,
            timestamp,
            tx_type,
            sender_address,
            payload,
            sender_public_key: Vec::new(),
            signature: Vec::new(),
        })
    }

    fn compute_hash(
        timestamp: i64,
        tx_type: TransactionType,
        sender_address: &str,
        payload: &[u8],
    ) -> [u8; 32] {
        let preimage = format!(
            "time:{}\ntype:{}\nsender:{}\npayload:{}",
            timestamp,
            tx_type,
            sender_address,
            hex::encode(payload),
        );
        hash_bytes(preimage.as_bytes())
    }

    /// Hash of the covered fields as they are now.
    pub fn signing_hash(&self) -> [u8; 32] {
        Self::compute_hash(
            self.timestamp,
            self.tx_type,
            &self.sender_address,
            &self.payload,
        )
    }

    /// Sign with a raw P-256 private scalar, recording the public key.
    pub fn sign(&mut self, private_key: &[u8]) -> Result<()> {
        let key = signing_key_from_bytes(private_key)?;
        let hash = self.signing_hash();
        self.signature = sign(&key, &hash)?;
        self.sender_public_key = marshal_public_key(key.verifying_key());
        Ok(())
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Check the stored signature against the stored public key and the
    /// current field values. Unsigned or malformed transactions are `false`.
    pub fn verify_signature(&self) -> bool {
        if self.sender_public_key.is_empty() || self.signature.is_empty() {
            return false;
        }
        verify_signature(&self.sender_public_key, &self.signing_hash(), &self.signature)
    }

    /// Whether `id` still matches the covered fields.
    pub fn id_matches(&self) -> bool {
        hex::encode(self.signing_hash()) == self.id
    }

    /// Whether `sender_address` is the address of the recorded public key.
    pub fn sender_matches_key(&self) -> bool {
        !self.sender_public_key.is_empty()
            && compute_hash(&self.sender_public_key) == self.sender_address
    }

    /// Full admission check: id consistency, a valid signature, and a
    /// signing key that belongs to the claimed sender.
    pub fn validate(&self) -> Result<()> {
        if !self.id_matches() {
            return Err(DdsError::InvalidSignature(format!(
                "transaction {} does not hash to its id",
                self.id
            )));
        }
        if !self.is_signed() {
            return Err(DdsError::InvalidSignature(format!(
                "transaction {} is unsigned",
                self.id
            )));
        }
        if !self.verify_signature() {
            return Err(DdsError::InvalidSignature(format!(
                "transaction {} signature does not verify",
                self.id
            )));
        }
        if !self.sender_matches_key() {
            return Err(DdsError::InvalidSignature(format!(
                "transaction {} is signed by a key that is not sender {}",
                self.id, self.sender_address
            )));
        }
        Ok(())
    }

    /// Payload as UTF-8, e.g. a content id.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
