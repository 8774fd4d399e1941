use crate::{
    error::InternalError,
    state::{EntitySnapshot, RequestState},
    wire::{FUTURE_ID_PROPERTY, ID_PROPERTY, VERSION_PROPERTY, WriteOp},
};
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

// Compute the side-effect buckets for every key the payload touched,
// in payload order. Entities whose committed state did not move are
// omitted entirely, so clients never receive echo updates.
pub(super) fn compute(state: &RequestState<'_>) -> Result<Map<String, Json>, InternalError> {
    let mut persists = Vec::new();
    let mut updates = Vec::new();
    let mut deletes = Vec::new();

    for key in state.payload_keys() {
        let Some(idx) = state.bean_index(key) else {
            continue;
        };
        let bean = state.bean(idx);

        // Never materialized: a vanished write target or stale
        // reference produces no record at all.
        let Some(domain) = bean.domain.clone() else {
            continue;
        };

        if key.ephemeral {
            // A future entity reports PERSIST once the domain method
            // gave it a persisted id; an unpersisted leftover is
            // legal but worth flagging.
            let Some(id) = domain.borrow().id() else {
                warn!(future_id = %key.id, "future entity was not persisted");
                continue;
            };
            let Some(version) = domain.borrow().version() else {
                return Err(InternalError::state_invariant(format!(
                    "persisted entity '{}-{}' has a null version",
                    key.proxy_token,
                    id.payload()
                )));
            };

            let mut record = Map::new();
            record.insert(FUTURE_ID_PROPERTY.to_string(), Json::String(key.id.clone()));
            record.insert(
                ID_PROPERTY.to_string(),
                Json::String(format!("{}-{}", key.proxy_token, id.payload())),
            );
            record.insert(VERSION_PROPERTY.to_string(), Json::from(version));
            persists.push(Json::Object(record));
            continue;
        }

        // Persisted key: classify against the committed store state.
        let binding = state.service().resolve_domain_type(&key.proxy_token)?;
        let Some(kind) = binding.model.key_kind else {
            continue;
        };
        let decoded = key.decoded_key(kind)?;

        match binding.locator.load(&decoded)? {
            None => {
                debug!(key = %key, "entity deleted");
                let mut record = Map::new();
                record.insert(ID_PROPERTY.to_string(), Json::String(key.address()));
                deletes.push(Json::Object(record));
            }
            Some(fresh) => {
                let Some(before) = &bean.before else {
                    continue;
                };
                let after = EntitySnapshot::capture(&*fresh.borrow())?;
                if !before.changed(&after) {
                    continue;
                }

                // Suppress the echo when the client's version already
                // matches and the entity is not in the response graph.
                let fresh_version = fresh.borrow().version();
                if !bean.in_response
                    && bean.client_version.is_some()
                    && bean.client_version == fresh_version
                {
                    debug!(key = %key, "update echo suppressed");
                    continue;
                }

                debug!(key = %key, "entity updated");
                let mut record = Map::new();
                record.insert(ID_PROPERTY.to_string(), Json::String(key.address()));
                updates.push(Json::Object(record));
            }
        }
    }

    let mut out = Map::new();
    if !persists.is_empty() {
        out.insert(
            WriteOp::Create.side_effect_name().to_string(),
            Json::Array(persists),
        );
    }
    if !deletes.is_empty() {
        out.insert(
            WriteOp::Delete.side_effect_name().to_string(),
            Json::Array(deletes),
        );
    }
    if !updates.is_empty() {
        out.insert(
            WriteOp::Update.side_effect_name().to_string(),
            Json::Array(updates),
        );
    }

    Ok(out)
}
