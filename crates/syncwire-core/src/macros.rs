//! Declarative entity bindings.
//!
//! `domain_entity!` generates the [`DomainObject`](crate::traits::DomainObject)
//! accessor surface and the static [`EntityModel`](crate::model::EntityModel)
//! for a plain struct, from one declaration of its fields. The struct
//! itself is written by hand; field storage types must match the
//! declared shapes:
//!
//! - `name: key Ulid` — `Option<Ulid>` (unpersisted entities have no id)
//! - `name: version` — `Option<u64>`
//! - `name: Text` — `String` (required scalar; `Int`/`Uint`/`Bool`/
//!   `Float`/`Timestamp`/`Ulid` map to their native types)
//! - `name: opt Text` — `Option<String>`
//! - `name: list Text` — `Vec<String>`
//! - `name: ref "token"` — `Option<DomainPtr>`
//! - `name: reflist "token"` — `Vec<DomainPtr>`
//! - `name: refset "token"` — `Vec<DomainPtr>`, resolved as a set
//!
//! `ValidateCustom` is deliberately not generated; implement it by
//! hand (or as an empty impl) next to the struct.

// kind token -> Value constructor
#[macro_export]
#[doc(hidden)]
macro_rules! __sw_wrap {
    (Bool, $e:expr) => { $crate::value::Value::Bool($e) };
    (Int, $e:expr) => { $crate::value::Value::Int($e) };
    (Uint, $e:expr) => { $crate::value::Value::Uint($e) };
    (Float, $e:expr) => { $crate::value::Value::Float($e) };
    (Text, $e:expr) => { $crate::value::Value::Text($e) };
    (Timestamp, $e:expr) => { $crate::value::Value::Timestamp($e) };
    (Ulid, $e:expr) => { $crate::value::Value::Ulid($e) };
}

// kind token -> pattern unwrap into Option<native>
#[macro_export]
#[doc(hidden)]
macro_rules! __sw_unwrap {
    (Bool, $v:expr) => { match $v { $crate::value::Value::Bool(x) => Some(x.clone()), _ => None } };
    (Int, $v:expr) => { match $v { $crate::value::Value::Int(x) => Some(x.clone()), _ => None } };
    (Uint, $v:expr) => { match $v { $crate::value::Value::Uint(x) => Some(x.clone()), _ => None } };
    (Float, $v:expr) => { match $v { $crate::value::Value::Float(x) => Some(x.clone()), _ => None } };
    (Text, $v:expr) => { match $v { $crate::value::Value::Text(x) => Some(x.clone()), _ => None } };
    (Timestamp, $v:expr) => { match $v { $crate::value::Value::Timestamp(x) => Some(x.clone()), _ => None } };
    (Ulid, $v:expr) => { match $v { $crate::value::Value::Ulid(x) => Some(x.clone()), _ => None } };
}

// kind token -> Key constructor (key-eligible kinds only)
#[macro_export]
#[doc(hidden)]
macro_rules! __sw_key {
    (Int, $e:expr) => { $crate::key::Key::Int($e) };
    (Uint, $e:expr) => { $crate::key::Key::Uint($e) };
    (Text, $e:expr) => { $crate::key::Key::Text($e) };
    (Ulid, $e:expr) => { $crate::key::Key::Ulid($e) };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __sw_key_kind {
    (Int) => { $crate::key::KeyKind::Int };
    (Uint) => { $crate::key::KeyKind::Uint };
    (Text) => { $crate::key::KeyKind::Text };
    (Ulid) => { $crate::key::KeyKind::Ulid };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __sw_value_kind {
    (Bool) => { $crate::value::ValueKind::Bool };
    (Int) => { $crate::value::ValueKind::Int };
    (Uint) => { $crate::value::ValueKind::Uint };
    (Float) => { $crate::value::ValueKind::Float };
    (Text) => { $crate::value::ValueKind::Text };
    (Timestamp) => { $crate::value::ValueKind::Timestamp };
    (Ulid) => { $crate::value::ValueKind::Ulid };
}

// one FieldModel entry per field declaration
#[macro_export]
#[doc(hidden)]
macro_rules! __sw_field_model {
    ($name:ident, key $kind:ident) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::Value($crate::__sw_value_kind!($kind)),
        }
    };
    ($name:ident, version) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::Value($crate::value::ValueKind::Uint),
        }
    };
    ($name:ident, $kind:ident) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::Value($crate::__sw_value_kind!($kind)),
        }
    };
    ($name:ident, opt $kind:ident) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::Value($crate::__sw_value_kind!($kind)),
        }
    };
    ($name:ident, list $kind:ident) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::ValueList($crate::__sw_value_kind!($kind)),
        }
    };
    ($name:ident, ref $token:literal) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::Reference($token),
        }
    };
    ($name:ident, reflist $token:literal) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::ReferenceList($token),
        }
    };
    ($name:ident, refset $token:literal) => {
        $crate::model::FieldModel {
            name: stringify!($name),
            shape: $crate::model::FieldShape::ReferenceSet($token),
        }
    };
}

// get arm body for one field
#[macro_export]
#[doc(hidden)]
macro_rules! __sw_get {
    ($self:ident, $name:ident, key $kind:ident) => {
        Ok($self
            .$name
            .clone()
            .map_or($crate::traits::DomainValue::Null, |v| {
                $crate::traits::DomainValue::Value($crate::__sw_wrap!($kind, v))
            }))
    };
    ($self:ident, $name:ident, version) => {
        Ok($self
            .$name
            .map_or($crate::traits::DomainValue::Null, |v| {
                $crate::traits::DomainValue::Value($crate::value::Value::Uint(v))
            }))
    };
    ($self:ident, $name:ident, $kind:ident) => {
        Ok($crate::traits::DomainValue::Value($crate::__sw_wrap!(
            $kind,
            $self.$name.clone()
        )))
    };
    ($self:ident, $name:ident, opt $kind:ident) => {
        Ok($self
            .$name
            .clone()
            .map_or($crate::traits::DomainValue::Null, |v| {
                $crate::traits::DomainValue::Value($crate::__sw_wrap!($kind, v))
            }))
    };
    ($self:ident, $name:ident, list $kind:ident) => {
        Ok($crate::traits::DomainValue::Value($crate::value::Value::List(
            $self
                .$name
                .iter()
                .map(|v| $crate::__sw_wrap!($kind, v.clone()))
                .collect(),
        )))
    };
    ($self:ident, $name:ident, ref $token:literal) => {
        Ok($self
            .$name
            .clone()
            .map_or($crate::traits::DomainValue::Null, $crate::traits::DomainValue::Entity))
    };
    ($self:ident, $name:ident, reflist $token:literal) => {
        Ok($crate::traits::DomainValue::List(
            $self
                .$name
                .iter()
                .cloned()
                .map($crate::traits::DomainValue::Entity)
                .collect(),
        ))
    };
    ($self:ident, $name:ident, refset $token:literal) => {
        Ok($crate::traits::DomainValue::Set(
            $self
                .$name
                .iter()
                .cloned()
                .map($crate::traits::DomainValue::Entity)
                .collect(),
        ))
    };
}

// set arm body for one field
#[macro_export]
#[doc(hidden)]
macro_rules! __sw_set {
    ($self:ident, $value:ident, $name:ident, key $kind:ident) => {
        match $value {
            $crate::traits::DomainValue::Null => {
                $self.$name = None;
                Ok(())
            }
            $crate::traits::DomainValue::Value(v) => match $crate::__sw_unwrap!($kind, &v) {
                Some(x) => {
                    $self.$name = Some(x);
                    Ok(())
                }
                None => Err($crate::traits::PropertyError::mismatch(
                    stringify!($name),
                    stringify!($kind),
                    format!("{v:?}"),
                )),
            },
            other => Err($crate::traits::PropertyError::mismatch(
                stringify!($name),
                stringify!($kind),
                format!("{other:?}"),
            )),
        }
    };
    ($self:ident, $value:ident, $name:ident, version) => {
        match $value {
            $crate::traits::DomainValue::Null => {
                $self.$name = None;
                Ok(())
            }
            $crate::traits::DomainValue::Value($crate::value::Value::Uint(v)) => {
                $self.$name = Some(v);
                Ok(())
            }
            other => Err($crate::traits::PropertyError::mismatch(
                stringify!($name),
                "Uint",
                format!("{other:?}"),
            )),
        }
    };
    ($self:ident, $value:ident, $name:ident, $kind:ident) => {
        match $value {
            $crate::traits::DomainValue::Value(v) => match $crate::__sw_unwrap!($kind, &v) {
                Some(x) => {
                    $self.$name = x;
                    Ok(())
                }
                None => Err($crate::traits::PropertyError::mismatch(
                    stringify!($name),
                    stringify!($kind),
                    format!("{v:?}"),
                )),
            },
            other => Err($crate::traits::PropertyError::mismatch(
                stringify!($name),
                concat!("non-null ", stringify!($kind)),
                format!("{other:?}"),
            )),
        }
    };
    ($self:ident, $value:ident, $name:ident, opt $kind:ident) => {
        match $value {
            $crate::traits::DomainValue::Null => {
                $self.$name = None;
                Ok(())
            }
            $crate::traits::DomainValue::Value(v) => match $crate::__sw_unwrap!($kind, &v) {
                Some(x) => {
                    $self.$name = Some(x);
                    Ok(())
                }
                None => Err($crate::traits::PropertyError::mismatch(
                    stringify!($name),
                    stringify!($kind),
                    format!("{v:?}"),
                )),
            },
            other => Err($crate::traits::PropertyError::mismatch(
                stringify!($name),
                stringify!($kind),
                format!("{other:?}"),
            )),
        }
    };
    ($self:ident, $value:ident, $name:ident, list $kind:ident) => {
        match $value {
            $crate::traits::DomainValue::Null => {
                $self.$name = Vec::new();
                Ok(())
            }
            $crate::traits::DomainValue::Value($crate::value::Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    match $crate::__sw_unwrap!($kind, item) {
                        Some(x) => out.push(x),
                        None => {
                            return Err($crate::traits::PropertyError::mismatch(
                                stringify!($name),
                                concat!("list of ", stringify!($kind)),
                                format!("{item:?}"),
                            ));
                        }
                    }
                }
                $self.$name = out;
                Ok(())
            }
            other => Err($crate::traits::PropertyError::mismatch(
                stringify!($name),
                concat!("list of ", stringify!($kind)),
                format!("{other:?}"),
            )),
        }
    };
    ($self:ident, $value:ident, $name:ident, ref $token:literal) => {
        match $value {
            $crate::traits::DomainValue::Null => {
                $self.$name = None;
                Ok(())
            }
            $crate::traits::DomainValue::Entity(ptr) => {
                $self.$name = Some(ptr);
                Ok(())
            }
            other => Err($crate::traits::PropertyError::mismatch(
                stringify!($name),
                concat!("reference to ", $token),
                format!("{other:?}"),
            )),
        }
    };
    ($self:ident, $value:ident, $name:ident, reflist $token:literal) => {
        $crate::__sw_set_ref_collection!($self, $value, $name, $token)
    };
    ($self:ident, $value:ident, $name:ident, refset $token:literal) => {
        $crate::__sw_set_ref_collection!($self, $value, $name, $token)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __sw_set_ref_collection {
    ($self:ident, $value:ident, $name:ident, $token:literal) => {
        match $value {
            $crate::traits::DomainValue::Null => {
                $self.$name = Vec::new();
                Ok(())
            }
            $crate::traits::DomainValue::List(items) | $crate::traits::DomainValue::Set(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        $crate::traits::DomainValue::Entity(ptr) => out.push(ptr),
                        other => {
                            return Err($crate::traits::PropertyError::mismatch(
                                stringify!($name),
                                concat!("references to ", $token),
                                format!("{other:?}"),
                            ));
                        }
                    }
                }
                $self.$name = out;
                Ok(())
            }
            other => Err($crate::traits::PropertyError::mismatch(
                stringify!($name),
                concat!("references to ", $token),
                format!("{other:?}"),
            )),
        }
    };
}

///
/// domain_entity
///
/// Bind a struct to a proxy token, generating its `EntityModel`,
/// `Path`, `DomainObject`, and `ValidateAuto` implementations.
///
/// Field declarations are munched one at a time (multi-token shapes
/// cannot ride in a plain comma-separated repetition), normalized to
/// `{ name (shape tokens) }` groups, then expanded in one pass.
///

#[macro_export]
macro_rules! domain_entity {
    // ── entry points ──────────────────────────────────────────────
    (
        entity $type:ident {
            proxy $proxy:literal,
            domain $domain:literal,
            key: $key_field:ident $key_kind:ident,
            version: $version_field:ident,
            fields { $($fields:tt)* }
        }
    ) => {
        $crate::domain_entity!(
            @munch entity ($type $proxy $domain $key_field $key_kind $version_field)
            [] $($fields)*
        );
    };
    (
        value $type:ident {
            proxy $proxy:literal,
            domain $domain:literal,
            fields { $($fields:tt)* }
        }
    ) => {
        $crate::domain_entity!(@munch value ($type $proxy $domain) [] $($fields)*);
    };

    // ── field munching ────────────────────────────────────────────
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : key $k:ident, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (key $k) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : key $k:ident) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (key $k) }]);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : version, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (version) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : version) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (version) }]);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : opt $k:ident, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (opt $k) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : opt $k:ident) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (opt $k) }]);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : list $k:ident, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (list $k) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : list $k:ident) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (list $k) }]);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : ref $t:literal, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (ref $t) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : ref $t:literal) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (ref $t) }]);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : reflist $t:literal, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (reflist $t) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : reflist $t:literal) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (reflist $t) }]);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : refset $t:literal, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (refset $t) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : refset $t:literal) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n (refset $t) }]);
    };
    // plain scalar kind; must stay below the keyword arms
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : $k:ident, $($rest:tt)*) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n ($k) }] $($rest)*);
    };
    (@munch $mode:ident $hdr:tt [$($acc:tt)*] $n:ident : $k:ident) => {
        $crate::domain_entity!(@munch $mode $hdr [$($acc)* { $n ($k) }]);
    };
    // all fields consumed
    (@munch $mode:ident $hdr:tt [$($acc:tt)*]) => {
        $crate::domain_entity!(@emit $mode $hdr [$($acc)*]);
    };

    // ── expansion: entity proxy (keyed and versioned) ─────────────
    (@emit entity ($type:ident $proxy:literal $domain:literal $key_field:ident $key_kind:ident $version_field:ident)
        [ $({ $fname:ident ($($fshape:tt)*) })* ]
    ) => {
        impl $type {
            pub const MODEL: &'static $crate::model::EntityModel = &$crate::model::EntityModel {
                proxy_token: $proxy,
                domain_path: $domain,
                kind: $crate::model::ProxyKind::Entity,
                key_kind: Some($crate::__sw_key_kind!($key_kind)),
                fields: &[
                    $( $crate::__sw_field_model!($fname, $($fshape)*) ),*
                ],
                has_version: true,
            };
        }

        impl $crate::traits::Path for $type {
            const PATH: &'static str = $domain;
        }

        impl $crate::traits::ValidateAuto for $type {}

        impl $crate::traits::DomainObject for $type {
            fn model(&self) -> &'static $crate::model::EntityModel {
                Self::MODEL
            }

            fn get(
                &self,
                field: &str,
            ) -> Result<$crate::traits::DomainValue, $crate::traits::PropertyError> {
                match field {
                    $( stringify!($fname) => $crate::__sw_get!(self, $fname, $($fshape)*), )*
                    _ => Err($crate::traits::PropertyError::unknown($proxy, field)),
                }
            }

            fn set(
                &mut self,
                field: &str,
                value: $crate::traits::DomainValue,
            ) -> Result<(), $crate::traits::PropertyError> {
                match field {
                    $( stringify!($fname) => $crate::__sw_set!(self, value, $fname, $($fshape)*), )*
                    _ => Err($crate::traits::PropertyError::unknown($proxy, field)),
                }
            }

            fn id(&self) -> Option<$crate::key::Key> {
                self.$key_field.clone().map(|k| $crate::__sw_key!($key_kind, k))
            }

            fn version(&self) -> Option<u64> {
                self.$version_field
            }
        }
    };

    // ── expansion: value proxy (no identity, no version) ──────────
    (@emit value ($type:ident $proxy:literal $domain:literal)
        [ $({ $fname:ident ($($fshape:tt)*) })* ]
    ) => {
        impl $type {
            pub const MODEL: &'static $crate::model::EntityModel = &$crate::model::EntityModel {
                proxy_token: $proxy,
                domain_path: $domain,
                kind: $crate::model::ProxyKind::Value,
                key_kind: None,
                fields: &[
                    $( $crate::__sw_field_model!($fname, $($fshape)*) ),*
                ],
                has_version: false,
            };
        }

        impl $crate::traits::Path for $type {
            const PATH: &'static str = $domain;
        }

        impl $crate::traits::ValidateAuto for $type {}

        impl $crate::traits::DomainObject for $type {
            fn model(&self) -> &'static $crate::model::EntityModel {
                Self::MODEL
            }

            fn get(
                &self,
                field: &str,
            ) -> Result<$crate::traits::DomainValue, $crate::traits::PropertyError> {
                match field {
                    $( stringify!($fname) => $crate::__sw_get!(self, $fname, $($fshape)*), )*
                    _ => Err($crate::traits::PropertyError::unknown($proxy, field)),
                }
            }

            fn set(
                &mut self,
                field: &str,
                value: $crate::traits::DomainValue,
            ) -> Result<(), $crate::traits::PropertyError> {
                match field {
                    $( stringify!($fname) => $crate::__sw_set!(self, value, $fname, $($fshape)*), )*
                    _ => Err($crate::traits::PropertyError::unknown($proxy, field)),
                }
            }

            fn id(&self) -> Option<$crate::key::Key> {
                None
            }
        }
    };
}
