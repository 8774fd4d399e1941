use crate::{
    error::InternalError,
    traits::{DomainObject, DomainValue},
    value::Value,
};
use std::collections::BTreeMap;

///
/// EntitySnapshot
///
/// Flattened before/after image of one entity, captured from its
/// declared fields. References flatten to address tokens so the diff
/// notices re-pointed references without chasing the graph.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntitySnapshot {
    fields: BTreeMap<&'static str, Value>,
}

impl EntitySnapshot {
    /// Capture the current field values of an entity.
    ///
    /// The caller must hold at most a shared borrow of the object;
    /// reference fields are read with shared borrows, so
    /// self-referencing graphs capture without conflict.
    pub fn capture(obj: &dyn DomainObject) -> Result<Self, InternalError> {
        let model = obj.model();
        let mut fields = BTreeMap::new();
        for field in model.fields {
            let value = flatten(obj.get(field.name)?);
            fields.insert(field.name, value);
        }

        Ok(Self { fields })
    }

    /// Whether the two images differ in any declared field.
    #[must_use]
    pub fn changed(&self, after: &Self) -> bool {
        self.fields != after.fields
    }
}

// References flatten to "<token>@<id>"; unpersisted references to
// "<token>@?" so acquiring an id counts as a change.
fn flatten(value: DomainValue) -> Value {
    match value {
        DomainValue::Null => Value::Null,
        DomainValue::Value(v) => v,
        DomainValue::Entity(ptr) => {
            let obj = ptr.borrow();
            let token = obj.model().proxy_token;
            let id = obj
                .id()
                .map_or_else(|| "?".to_string(), |k| k.payload());
            Value::Text(format!("{token}@{id}"))
        }
        DomainValue::List(items) | DomainValue::Set(items) => {
            Value::List(items.into_iter().map(flatten).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{Song, demo_service, seed_song};
    use crate::traits::{DomainObject, domain_ptr};

    #[test]
    fn unchanged_entity_diffs_clean() {
        let service = demo_service();
        let key = seed_song("Stone Lanterns", 2);
        let obj = service
            .load_domain_object("demo.SongProxy", &key)
            .unwrap()
            .unwrap();

        let before = EntitySnapshot::capture(&*obj.borrow()).unwrap();
        let after = EntitySnapshot::capture(&*obj.borrow()).unwrap();
        assert!(!before.changed(&after));
    }

    #[test]
    fn scalar_edit_is_detected() {
        let service = demo_service();
        let key = seed_song("Stone Lanterns", 2);
        let obj = service
            .load_domain_object("demo.SongProxy", &key)
            .unwrap()
            .unwrap();

        let before = EntitySnapshot::capture(&*obj.borrow()).unwrap();
        obj.borrow_mut()
            .set("title", Value::Text("Paper Lanterns".into()).into())
            .unwrap();
        let after = EntitySnapshot::capture(&*obj.borrow()).unwrap();
        assert!(before.changed(&after));
    }

    #[test]
    fn repointed_reference_is_detected_without_graph_chase() {
        let service = demo_service();
        let key = seed_song("Stone Lanterns", 2);
        let obj = service
            .load_domain_object("demo.SongProxy", &key)
            .unwrap()
            .unwrap();

        let artist = service.create_domain_object("demo.ArtistProxy").unwrap();
        let before = EntitySnapshot::capture(&*obj.borrow()).unwrap();
        obj.borrow_mut()
            .set("artist", crate::traits::DomainValue::Entity(artist))
            .unwrap();
        let after = EntitySnapshot::capture(&*obj.borrow()).unwrap();
        assert!(before.changed(&after));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // No false UPDATE classifications: capturing the same
            // state twice must always diff clean.
            #[test]
            fn diff_is_reflexive(
                title in ".{0,40}",
                plays in any::<u64>(),
                tags in proptest::collection::vec("[a-z]{1,8}", 0..4),
            ) {
                let song = Song {
                    id: Some(1),
                    version: Some(1),
                    title,
                    plays,
                    tags,
                    ..Default::default()
                };
                let a = EntitySnapshot::capture(&song).unwrap();
                let b = EntitySnapshot::capture(&song).unwrap();
                prop_assert!(!a.changed(&b));
            }
        }
    }

    #[test]
    fn self_reference_captures_with_shared_borrows() {
        let song = domain_ptr(Song::default());
        song.borrow_mut()
            .set(
                "inspiration",
                crate::traits::DomainValue::Entity(song.clone()),
            )
            .unwrap();

        let snapshot = EntitySnapshot::capture(&*song.borrow()).unwrap();
        let again = EntitySnapshot::capture(&*song.borrow()).unwrap();
        assert!(!snapshot.changed(&again));
    }
}
