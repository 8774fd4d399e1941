use crate::error::InternalError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error as ThisError;

/// Reserved payload property carrying an entity's id.
pub const ID_PROPERTY: &str = "!id";
/// Reserved payload property echoing a client-assigned future id.
pub const FUTURE_ID_PROPERTY: &str = "!futureId";
/// Reserved payload property carrying an entity's version.
pub const VERSION_PROPERTY: &str = "!version";

const PARAM_PREFIX: &str = "param";

///
/// WriteOp
///
/// Write-operation kind in a delta value store. `CREATE` and the
/// legacy `PERSIST` spelling both decode to [`Create`](Self::Create);
/// side effects always encode creates as `PERSIST`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl WriteOp {
    /// Request-payload spellings, in decode order.
    pub const DECODE_NAMES: [(&'static str, Self); 4] = [
        ("CREATE", Self::Create),
        ("PERSIST", Self::Create),
        ("UPDATE", Self::Update),
        ("DELETE", Self::Delete),
    ];

    /// The side-effect bucket this operation reports under.
    #[must_use]
    pub const fn side_effect_name(self) -> &'static str {
        match self {
            Self::Create => "PERSIST",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    #[must_use]
    pub const fn is_create(self) -> bool {
        matches!(self, Self::Create)
    }
}

///
/// WireError
///
/// Malformed request envelopes. Distinct from value-level codec
/// errors: these are structural problems with the envelope itself.
///

#[derive(Debug, ThisError)]
pub enum WireError {
    #[error("request payload is not valid JSON: {0}")]
    BadJson(String),

    #[error("delta record must contain exactly one type token")]
    BadDeltaRecord,

    #[error("delta record for '{0}' is missing its '!id' property")]
    MissingId(String),

    #[error("'{bucket}' delta bucket must be a non-empty array")]
    BadDeltaBucket { bucket: String },

    #[error("a request may carry either 'operation' or 'invocations', not both")]
    MixedInvocationShapes,
}

impl From<WireError> for InternalError {
    fn from(err: WireError) -> Self {
        Self::decode_unsupported(err.to_string())
    }
}

///
/// InvocationMessage
///
/// One requested method invocation: the operation token, numbered
/// `param0..paramN` arguments, and the property paths to resolve on
/// the return graph.
///

#[derive(Debug, Deserialize)]
pub struct InvocationMessage {
    pub operation: String,

    #[serde(default, rename = "propertyRefs")]
    pub property_refs: Vec<String>,

    #[serde(flatten)]
    extra: Map<String, Json>,
}

impl InvocationMessage {
    /// Collect `param0..paramN` in order, stopping at the first gap.
    #[must_use]
    pub fn params(&self) -> Vec<&Json> {
        let mut out = Vec::new();
        for n in 0.. {
            match self.extra.get(&format!("{PARAM_PREFIX}{n}")) {
                Some(value) => out.push(value),
                None => break,
            }
        }

        out
    }
}

///
/// RequestEnvelope
///
/// Accepts both envelope generations: an `invocations` batch, or the
/// legacy single-invocation shape with `operation` and `param0..N` at
/// the top level (normalized into a one-element batch at decode).
///

#[derive(Debug, Default, Deserialize)]
pub struct RequestEnvelope {
    /// Delta value store, keyed by write-operation name.
    #[serde(default)]
    pub content: Map<String, Json>,

    #[serde(default)]
    pub invocations: Vec<InvocationMessage>,

    #[serde(default)]
    operation: Option<String>,

    #[serde(default, rename = "propertyRefs")]
    property_refs: Vec<String>,

    #[serde(flatten)]
    extra: Map<String, Json>,
}

impl RequestEnvelope {
    pub fn decode(payload: &str) -> Result<Self, WireError> {
        let mut envelope: Self =
            serde_json::from_str(payload).map_err(|err| WireError::BadJson(err.to_string()))?;

        if let Some(operation) = envelope.operation.take() {
            if !envelope.invocations.is_empty() {
                return Err(WireError::MixedInvocationShapes);
            }
            envelope.invocations.push(InvocationMessage {
                operation,
                property_refs: std::mem::take(&mut envelope.property_refs),
                extra: std::mem::take(&mut envelope.extra),
            });
        }

        Ok(envelope)
    }

    /// Iterate delta records as `(op, proxy token, record body)` in
    /// wire order: fixed bucket order, then array order within each
    /// bucket. This is the insertion order that downstream side
    /// effects preserve.
    pub fn delta_records(&self) -> Result<Vec<(WriteOp, String, &Map<String, Json>)>, WireError> {
        let mut out = Vec::new();
        for (name, op) in WriteOp::DECODE_NAMES {
            let Some(bucket) = self.content.get(name) else {
                continue;
            };
            let Some(records) = bucket.as_array() else {
                return Err(WireError::BadDeltaBucket {
                    bucket: name.to_string(),
                });
            };
            if records.is_empty() {
                return Err(WireError::BadDeltaBucket {
                    bucket: name.to_string(),
                });
            }
            for record in records {
                let Some(wrapper) = record.as_object() else {
                    return Err(WireError::BadDeltaRecord);
                };
                if wrapper.len() != 1 {
                    return Err(WireError::BadDeltaRecord);
                }
                let Some((token, body)) = wrapper.iter().next() else {
                    return Err(WireError::BadDeltaRecord);
                };
                let Some(body) = body.as_object() else {
                    return Err(WireError::BadDeltaRecord);
                };
                out.push((op, token.clone(), body));
            }
        }

        Ok(out)
    }
}

///
/// ServerFailure
///
/// Client-reportable description of a failed invocation, produced by
/// the exception handler. Also the wire form.
///

#[derive(Clone, Debug, Serialize)]
pub struct ServerFailure {
    #[serde(rename = "type")]
    pub exception_type: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,

    pub fatal: bool,
}

///
/// ViolationMessage
///

#[derive(Clone, Debug, Serialize)]
pub struct ViolationMessage {
    #[serde(rename = "!id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "!futureId", skip_serializing_if = "Option::is_none")]
    pub future_id: Option<String>,

    pub path: String,

    pub message: String,
}

///
/// ResponseEnvelope
///

#[derive(Debug, Default, Serialize)]
pub struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Json>,

    #[serde(rename = "statusCodes", skip_serializing_if = "Vec::is_empty")]
    pub status_codes: Vec<bool>,

    #[serde(rename = "sideEffects", skip_serializing_if = "Map::is_empty")]
    pub side_effects: Map<String, Json>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub related: Map<String, Json>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ViolationMessage>,

    #[serde(rename = "generalFailure", skip_serializing_if = "Option::is_none")]
    pub general_failure: Option<ServerFailure>,
}

impl ResponseEnvelope {
    /// A response that reports nothing but a fatal failure. The
    /// envelope is rebuilt from scratch since prior state is unknown.
    #[must_use]
    pub fn failure(failure: ServerFailure) -> Self {
        Self {
            general_failure: Some(failure),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_stop_at_the_first_gap() {
        let invocation: InvocationMessage = serde_json::from_value(json!({
            "operation": "SongService::findSong",
            "param0": "a",
            "param1": 2,
            "param3": "unreachable"
        }))
        .unwrap();

        let params = invocation.params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[1], &json!(2));
    }

    #[test]
    fn delta_records_preserve_bucket_then_array_order() {
        let envelope = RequestEnvelope::decode(
            r#"{
                "content": {
                    "UPDATE": [{"demo.SongProxy": {"!id": "1", "title": "x"}}],
                    "CREATE": [{"demo.SongProxy": {"!id": "7"}}]
                }
            }"#,
        )
        .unwrap();

        let records = envelope.delta_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, WriteOp::Create);
        assert_eq!(records[1].0, WriteOp::Update);
    }

    #[test]
    fn persist_spelling_is_accepted_for_creates() {
        let envelope = RequestEnvelope::decode(
            r#"{"content": {"PERSIST": [{"demo.SongProxy": {"!id": "7"}}]}}"#,
        )
        .unwrap();
        let records = envelope.delta_records().unwrap();
        assert!(records[0].0.is_create());
    }

    #[test]
    fn empty_delta_bucket_is_rejected() {
        let envelope = RequestEnvelope::decode(r#"{"content": {"CREATE": []}}"#).unwrap();
        assert!(matches!(
            envelope.delta_records(),
            Err(WireError::BadDeltaBucket { .. })
        ));
    }

    #[test]
    fn multi_token_delta_record_is_rejected() {
        let envelope = RequestEnvelope::decode(
            r#"{"content": {"CREATE": [{"a.A": {"!id":"1"}, "b.B": {"!id":"2"}}]}}"#,
        )
        .unwrap();
        assert!(matches!(
            envelope.delta_records(),
            Err(WireError::BadDeltaRecord)
        ));
    }

    #[test]
    fn legacy_single_operation_shape_normalizes_to_a_batch() {
        let envelope = RequestEnvelope::decode(
            r#"{"operation": "SongService::findSong", "param0": 5, "propertyRefs": ["artist"]}"#,
        )
        .unwrap();

        assert_eq!(envelope.invocations.len(), 1);
        let invocation = &envelope.invocations[0];
        assert_eq!(invocation.operation, "SongService::findSong");
        assert_eq!(invocation.property_refs, vec!["artist".to_string()]);
        assert_eq!(invocation.params(), vec![&json!(5)]);
    }

    #[test]
    fn mixing_invocation_shapes_is_rejected() {
        let err = RequestEnvelope::decode(
            r#"{"operation": "A::b", "invocations": [{"operation": "A::c"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, WireError::MixedInvocationShapes));
    }

    #[test]
    fn empty_response_encodes_to_an_empty_object() {
        assert_eq!(ResponseEnvelope::default().encode(), "{}");
    }

    #[test]
    fn failure_envelope_carries_only_the_failure() {
        let resp = ResponseEnvelope::failure(ServerFailure {
            exception_type: "InternalError".into(),
            message: "boom".into(),
            trace: None,
            fatal: true,
        });
        let encoded = resp.encode();
        assert!(encoded.contains("generalFailure"));
        assert!(!encoded.contains("sideEffects"));
    }
}
