//! Policy-driven encryption of PII fields inside JSON records.
//!
//! A [`RecordPolicy`] names the fields of one entity that hold PII, the
//! encryption context each is scoped to, and whether it gets a sibling
//! search-hash column. Field paths use dot notation with a `[]` suffix to
//! expand arrays, e.g. `"customers[].phone"`.
//!
//! Every matching string leaf in a record is encrypted or decrypted with a
//! single batch call.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::encryptor::FieldEncryptor;
use crate::error::FieldCryptError;
use crate::search::SearchHasher;

/// Encryption settings for one PII field.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FieldPolicy {
    /// Dot-notation path, `[]` expands arrays.
    pub path: String,
    /// Encryption context the field is scoped to.
    #[serde(default)]
    pub context: String,
    /// Whether a search digest is written next to the envelope.
    #[serde(default)]
    pub searchable: bool,
    /// Sibling key for the digest; defaults to `<leaf>_hash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_field: Option<String>,
}

impl FieldPolicy {
    /// Key the search digest is written under, if the path ends in an
    /// object key.
    pub fn hash_key(&self) -> Option<String> {
        if let Some(explicit) = &self.hash_field {
            return Some(explicit.clone());
        }
        let leaf = self.path.rsplit('.').next()?;
        (!leaf.ends_with("[]")).then(|| format!("{leaf}_hash"))
    }
}

/// The PII fields of one record type.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RecordPolicy {
    pub name: String,
    pub fields: Vec<FieldPolicy>,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid field path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("unknown read mode {0:?}")]
    UnknownReadMode(String),

    /// A field operation failed; `path` is the JSON pointer of the field.
    #[error("field {path}: {source}")]
    Field {
        path: String,
        #[source]
        source: FieldCryptError,
    },

    #[error(transparent)]
    Crypt(#[from] FieldCryptError),
}

impl RecordError {
    /// The underlying field-encryption error, if any.
    pub fn crypt_error(&self) -> Option<&FieldCryptError> {
        match self {
            Self::Field { source, .. } => Some(source),
            Self::Crypt(e) => Some(e),
            _ => None,
        }
    }
}

/// How [`decrypt_record`] treats key-service failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Every failure propagates.
    #[default]
    Strict,
    /// Key-service failures blank the encrypted fields and log a warning.
    /// Only for decorative reads; never for identity, authorization or
    /// financial fields.
    BestEffort,
}

impl FromStr for ReadMode {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "best_effort" => Ok(Self::BestEffort),
            other => Err(RecordError::UnknownReadMode(other.to_owned())),
        }
    }
}

impl RecordPolicy {
    /// Check every path parses, searchable fields can hold a sibling hash,
    /// and no path is listed twice.
    pub fn validate(&self) -> Result<(), RecordError> {
        for (i, field) in self.fields.iter().enumerate() {
            parse_path(&field.path)?;
            let invalid = |reason| RecordError::InvalidPath {
                path: field.path.clone(),
                reason,
            };
            if self.fields[..i].iter().any(|f| f.path == field.path) {
                return Err(invalid("listed twice"));
            }
            if field.searchable {
                let hash_key = field.hash_key().ok_or_else(|| invalid("searchable field must end in an object key"))?;
                let leaf = field.path.rsplit('.').next().unwrap_or_default();
                if hash_key.is_empty() || hash_key == leaf {
                    return Err(invalid("hash field must differ from the field itself"));
                }
            }
        }
        Ok(())
    }

    fn field(&self, path: &str) -> Option<&FieldPolicy> {
        self.fields.iter().find(|f| f.path == path)
    }

    fn collect<'p>(&'p self, record: &Value) -> Result<Vec<Leaf<'p>>, RecordError> {
        let mut leaves = Vec::new();
        for field in &self.fields {
            let segments = parse_path(&field.path)?;
            let mut found = Vec::new();
            collect_leaves(record, &segments, String::new(), &mut found);
            leaves.extend(found.into_iter().map(|(pointer, value)| Leaf {
                pointer,
                value,
                field,
            }));
        }
        Ok(leaves)
    }
}

// ---------------------------------------------------------------------------
// Record operations
// ---------------------------------------------------------------------------

/// Encrypt every PII string field of `record` in place.
///
/// Searchable fields also get a digest written to their hash sibling.
/// Missing paths and non-string leaves are skipped. Returns the number of
/// fields visited.
pub async fn encrypt_record(
    encryptor: &FieldEncryptor,
    hasher: Option<&SearchHasher>,
    policy: &RecordPolicy,
    record: &mut Value,
    ctx: &CallContext,
) -> Result<usize, RecordError> {
    let leaves = policy.collect(record)?;
    if leaves.is_empty() {
        return Ok(0);
    }
    if hasher.is_none() && leaves.iter().any(|l| l.field.searchable) {
        return Err(FieldCryptError::ConfigurationMissing("search hash secret").into());
    }

    let values: Vec<&str> = leaves.iter().map(|l| l.value.as_str()).collect();
    let contexts: Vec<&str> = leaves.iter().map(|l| l.field.context.as_str()).collect();
    let envelopes = encryptor
        .encrypt_batch(ctx, &values, Some(&contexts))
        .await
        .map_err(|e| leaf_error(&leaves, e))?;

    for (leaf, envelope) in leaves.iter().zip(envelopes) {
        write_string(record, &leaf.pointer, envelope);
        if let (true, Some(hasher)) = (leaf.field.searchable, hasher) {
            if !leaf.value.is_empty() {
                write_hash(record, leaf, hasher.hash(&leaf.value));
            }
        }
    }
    debug!(policy = %policy.name, fields = leaves.len(), "record encrypted");
    Ok(leaves.len())
}

/// Decrypt every PII string field of `record` in place.
///
/// Search-hash siblings are left untouched.
pub async fn decrypt_record(
    encryptor: &FieldEncryptor,
    policy: &RecordPolicy,
    record: &mut Value,
    ctx: &CallContext,
    mode: ReadMode,
) -> Result<usize, RecordError> {
    let leaves = policy.collect(record)?;
    if leaves.is_empty() {
        return Ok(0);
    }

    let values: Vec<&str> = leaves.iter().map(|l| l.value.as_str()).collect();
    let contexts: Vec<&str> = leaves.iter().map(|l| l.field.context.as_str()).collect();
    match encryptor.decrypt_batch(ctx, &values, Some(&contexts)).await {
        Ok(plaintexts) => {
            for (leaf, plaintext) in leaves.iter().zip(plaintexts) {
                write_string(record, &leaf.pointer, plaintext);
            }
        }
        Err(e) if mode == ReadMode::BestEffort && e.is_remote() => {
            warn!(
                policy = %policy.name,
                fields = leaves.len(),
                error = %e,
                "key service failure on best-effort read, blanking encrypted fields"
            );
            for leaf in &leaves {
                write_string(record, &leaf.pointer, String::new());
            }
        }
        Err(e) => return Err(leaf_error(&leaves, e)),
    }
    debug!(policy = %policy.name, fields = leaves.len(), "record decrypted");
    Ok(leaves.len())
}

/// Digest to query a searchable field's hash column with, or `None` if the
/// field is not in the policy or not searchable.
pub fn lookup_digest(
    hasher: &SearchHasher,
    policy: &RecordPolicy,
    path: &str,
    value: &str,
) -> Option<String> {
    policy
        .field(path)
        .filter(|f| f.searchable)
        .map(|_| hasher.hash(value))
}

// ---------------------------------------------------------------------------
// Path traversal
// ---------------------------------------------------------------------------

/// Segments of a dot-notation field path.
#[derive(Debug)]
enum PathSegment {
    /// Navigate into an object property by name.
    Key(String),
    /// Expand into every element of a JSON array.
    ArrayItem,
}

/// A string leaf matched by a field policy.
struct Leaf<'p> {
    /// JSON pointer to the leaf.
    pointer: String,
    value: String,
    field: &'p FieldPolicy,
}

/// `"orders[].card_number"` → `[Key("orders"), ArrayItem, Key("card_number")]`.
fn parse_path(path: &str) -> Result<Vec<PathSegment>, RecordError> {
    let invalid = |reason| RecordError::InvalidPath {
        path: path.to_owned(),
        reason,
    };
    if path.is_empty() {
        return Err(invalid("empty"));
    }
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, array) = match part.strip_suffix("[]") {
            Some(key) => (key, true),
            None => (part, false),
        };
        if key.is_empty() {
            return Err(invalid("empty segment"));
        }
        if key.contains(['[', ']']) {
            return Err(invalid("brackets only allowed as a trailing []"));
        }
        segments.push(PathSegment::Key(key.to_owned()));
        if array {
            segments.push(PathSegment::ArrayItem);
        }
    }
    Ok(segments)
}

/// Walk `value` along `segments`, recording the JSON pointer and contents of
/// every string leaf at the end of the path.
fn collect_leaves(
    value: &Value,
    segments: &[PathSegment],
    pointer: String,
    out: &mut Vec<(String, String)>,
) {
    match segments.split_first() {
        None => {
            if let Value::String(s) = value {
                out.push((pointer, s.clone()));
            }
        }
        Some((PathSegment::Key(key), rest)) => {
            if let Some(child) = value.as_object().and_then(|map| map.get(key)) {
                collect_leaves(child, rest, format!("{pointer}/{}", escape_pointer(key)), out);
            }
        }
        Some((PathSegment::ArrayItem, rest)) => {
            if let Some(items) = value.as_array() {
                for (i, item) in items.iter().enumerate() {
                    collect_leaves(item, rest, format!("{pointer}/{i}"), out);
                }
            }
        }
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn write_string(record: &mut Value, pointer: &str, s: String) {
    if let Some(slot) = record.pointer_mut(pointer) {
        *slot = Value::String(s);
    }
}

fn write_hash(record: &mut Value, leaf: &Leaf<'_>, digest: String) {
    let (Some(key), Some((parent, _))) = (leaf.field.hash_key(), leaf.pointer.rsplit_once('/')) else {
        return;
    };
    if let Some(Value::Object(map)) = record.pointer_mut(parent) {
        map.insert(key, Value::String(digest));
    }
}

fn leaf_error(leaves: &[Leaf<'_>], e: FieldCryptError) -> RecordError {
    match e.index().and_then(|i| leaves.get(i)) {
        Some(leaf) => RecordError::Field {
            path: leaf.pointer.clone(),
            source: e,
        },
        None => RecordError::Crypt(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::key_service::{KeyServiceError, LocalKeyService, MockKeyService};
    use crate::secret::SecretBytes;

    const KEY: &str = "pii-key";

    fn user_policy() -> RecordPolicy {
        RecordPolicy {
            name: "user".into(),
            fields: vec![
                FieldPolicy {
                    path: "email".into(),
                    context: "user:email".into(),
                    searchable: true,
                    hash_field: None,
                },
                FieldPolicy {
                    path: "phone".into(),
                    context: "user:phone".into(),
                    searchable: false,
                    hash_field: None,
                },
                FieldPolicy {
                    path: "addresses[].street".into(),
                    context: "user:address".into(),
                    searchable: false,
                    hash_field: None,
                },
            ],
        }
    }

    fn encryptor() -> FieldEncryptor {
        FieldEncryptor::new(Arc::new(LocalKeyService::ephemeral()), KEY).unwrap()
    }

    fn hasher() -> SearchHasher {
        SearchHasher::new(SecretBytes::from_slice(b"search"))
    }

    fn ctx() -> CallContext {
        CallContext::with_timeout(Duration::from_secs(5))
    }

    fn sample() -> Value {
        json!({
            "id": 7,
            "email": "user@example.com",
            "phone": "+628123456789",
            "addresses": [{"street": "Jl. Sudirman 1"}, {"street": "Jl. Thamrin 2"}, {"zip": "10110"}],
            "nickname": "budi"
        })
    }

    #[test]
    fn parse_path_flat_nested_array() {
        assert_eq!(parse_path("ssn").unwrap().len(), 1);
        assert_eq!(parse_path("user.address.zip").unwrap().len(), 3);
        let segs = parse_path("orders[].card_number").unwrap();
        assert_eq!(segs.len(), 3);
        assert!(matches!(segs[1], PathSegment::ArrayItem));
    }

    #[test]
    fn parse_path_rejects_garbage() {
        for bad in ["", "a..b", "[].x", "a[0].b", ".a"] {
            assert!(parse_path(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn validate_policies() {
        assert!(user_policy().validate().is_ok());

        let mut dup = user_policy();
        dup.fields.push(dup.fields[0].clone());
        assert!(dup.validate().is_err());

        let mut bad_hash = user_policy();
        bad_hash.fields[0].hash_field = Some("email".into());
        assert!(bad_hash.validate().is_err());

        let mut array_leaf = user_policy();
        array_leaf.fields[2].path = "tags[]".into();
        array_leaf.fields[2].searchable = true;
        assert!(array_leaf.validate().is_err());
    }

    #[test]
    fn read_mode_from_str() {
        assert_eq!("strict".parse::<ReadMode>().unwrap(), ReadMode::Strict);
        assert_eq!("best_effort".parse::<ReadMode>().unwrap(), ReadMode::BestEffort);
        assert!("lenient".parse::<ReadMode>().is_err());
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_record() {
        let enc = encryptor();
        let h = hasher();
        let policy = user_policy();
        let mut record = sample();

        let n = encrypt_record(&enc, Some(&h), &policy, &mut record, &ctx()).await.unwrap();
        assert_eq!(n, 4);
        assert_ne!(record["email"], "user@example.com");
        assert_ne!(record["addresses"][1]["street"], "Jl. Thamrin 2");
        assert_eq!(record["email_hash"], h.hash("user@example.com"));
        assert!(record.get("phone_hash").is_none());
        assert_eq!(record["nickname"], "budi");
        assert_eq!(record["id"], 7);

        decrypt_record(&enc, &policy, &mut record, &ctx(), ReadMode::Strict)
            .await
            .unwrap();
        let mut expected = sample();
        expected["email_hash"] = json!(h.hash("user@example.com"));
        assert_eq!(record, expected);
    }

    #[tokio::test]
    async fn missing_and_non_string_fields_are_skipped() {
        let enc = encryptor();
        let mut record = json!({"email": 42, "other": "x"});
        let n = encrypt_record(&enc, Some(&hasher()), &user_policy(), &mut record, &ctx())
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(record, json!({"email": 42, "other": "x"}));
    }

    #[tokio::test]
    async fn searchable_field_without_hasher_is_configuration_error() {
        let mut record = sample();
        let err = encrypt_record(&encryptor(), None, &user_policy(), &mut record, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(
            err.crypt_error(),
            Some(FieldCryptError::ConfigurationMissing(_))
        ));
        assert_eq!(record, sample());
    }

    #[tokio::test]
    async fn tampered_field_reports_its_pointer() {
        let enc = encryptor();
        let policy = user_policy();
        let mut record = sample();
        encrypt_record(&enc, Some(&hasher()), &policy, &mut record, &ctx()).await.unwrap();

        let street = record["addresses"][1]["street"].as_str().unwrap().to_owned();
        let (ct, tag) = street.rsplit_once(':').unwrap();
        let flipped: String = tag
            .chars()
            .enumerate()
            .map(|(i, c)| if i == 0 { if c == '0' { '1' } else { '0' } } else { c })
            .collect();
        record["addresses"][1]["street"] = json!(format!("{ct}:{flipped}"));

        let err = decrypt_record(&enc, &policy, &mut record, &ctx(), ReadMode::BestEffort)
            .await
            .unwrap_err();
        match err {
            RecordError::Field { path, source } => {
                assert_eq!(path, "/addresses/1/street");
                assert!(matches!(source, FieldCryptError::IntegrityViolation { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn best_effort_blanks_fields_on_key_service_failure() {
        let policy = user_policy();
        let mut record = sample();
        encrypt_record(&encryptor(), Some(&hasher()), &policy, &mut record, &ctx())
            .await
            .unwrap();

        let mut mock = MockKeyService::new();
        mock.expect_backend().return_const("mock");
        mock.expect_decrypt_batch()
            .returning(|_, _| Err(KeyServiceError::Transport("connection refused".into())));
        let down = FieldEncryptor::new(Arc::new(mock), KEY).unwrap();

        let mut strict = record.clone();
        let err = decrypt_record(&down, &policy, &mut strict, &ctx(), ReadMode::Strict)
            .await
            .unwrap_err();
        assert!(err.crypt_error().is_some_and(FieldCryptError::is_retryable));

        decrypt_record(&down, &policy, &mut record, &ctx(), ReadMode::BestEffort)
            .await
            .unwrap();
        assert_eq!(record["email"], "");
        assert_eq!(record["phone"], "");
        assert_eq!(record["addresses"][0]["street"], "");
        assert_eq!(record["nickname"], "budi");
    }

    #[test]
    fn lookup_digest_only_for_searchable_fields() {
        let h = hasher();
        let policy = user_policy();
        assert_eq!(
            lookup_digest(&h, &policy, "email", "user@example.com"),
            Some(h.hash("user@example.com"))
        );
        assert_eq!(lookup_digest(&h, &policy, "phone", "+62"), None);
        assert_eq!(lookup_digest(&h, &policy, "nope", "x"), None);
    }

    #[test]
    fn hash_key_defaults_and_overrides() {
        let mut f = user_policy().fields[0].clone();
        assert_eq!(f.hash_key().as_deref(), Some("email_hash"));
        f.hash_field = Some("email_idx".into());
        assert_eq!(f.hash_key().as_deref(), Some("email_idx"));
        f.hash_field = None;
        f.path = "profile.contact.email".into();
        assert_eq!(f.hash_key().as_deref(), Some("email_hash"));
    }

    #[test]
    fn pointer_escaping() {
        assert_eq!(escape_pointer("a/b~c"), "a~1b~0c");
    }

    #[test]
    fn policy_from_json() {
        let policy: RecordPolicy = serde_json::from_value(json!({
            "name": "customer",
            "fields": [{"path": "email", "context": "customer:email", "searchable": true}]
        }))
        .unwrap();
        assert_eq!(policy.fields[0].hash_field, None);
        assert!(policy.fields[0].searchable);
    }
}
