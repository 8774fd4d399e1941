use crate::{key::KeyKind, value::ValueKind};

///
/// ProxyKind
///
/// Whether a proxy type carries independent identity. Entity proxies
/// are keyed and versioned; value proxies have no identity, are never
/// independently created or deleted, and always resolve all of their
/// properties.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProxyKind {
    Entity,
    Value,
}

///
/// EntityModel
/// Static runtime model for one proxy type.
///

pub struct EntityModel {
    /// Stable proxy type token used in keys and payloads.
    pub proxy_token: &'static str,
    /// Fully-qualified domain type path (for dispatch and diagnostics).
    pub domain_path: &'static str,
    pub kind: ProxyKind,
    /// Primary-key kind; `None` for value proxies.
    pub key_kind: Option<KeyKind>,
    /// Ordered field list (authoritative for resolution and snapshots).
    pub fields: &'static [FieldModel],
    /// Whether the domain type exposes a version; required for entities.
    pub has_version: bool,
}

impl EntityModel {
    /// Look up a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldModel> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub const fn is_entity(&self) -> bool {
        matches!(self.kind, ProxyKind::Entity)
    }
}

///
/// FieldModel
///

pub struct FieldModel {
    pub name: &'static str,
    pub shape: FieldShape,
}

///
/// FieldShape
///
/// Declared shape of one proxy field. Reference shapes name the proxy
/// token of the target type; resolution only follows them when the
/// client requested the property path.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldShape {
    Value(ValueKind),
    ValueList(ValueKind),
    Reference(&'static str),
    ReferenceList(&'static str),
    ReferenceSet(&'static str),
}

impl FieldShape {
    /// Reference target token, if this shape refers to another proxy.
    #[must_use]
    pub const fn reference_token(self) -> Option<&'static str> {
        match self {
            Self::Reference(t) | Self::ReferenceList(t) | Self::ReferenceSet(t) => Some(t),
            Self::Value(_) | Self::ValueList(_) => None,
        }
    }

    /// Value lists resolve unconditionally, like scalar properties.
    #[must_use]
    pub const fn is_plain(self) -> bool {
        matches!(self, Self::Value(_) | Self::ValueList(_))
    }
}

///
/// MethodReceiver
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MethodReceiver {
    /// Static service method; no receiver parameter.
    Static,
    /// Instance method on an entity of the named proxy type. The
    /// receiver rides as `param0` on the wire.
    Instance(&'static str),
}

///
/// ParamShape
///
/// Declared shape of one invocation parameter. `ProxyId` is a pure
/// reference: it is never dead-entity checked and decodes to the
/// domain object if one is still available, or null otherwise.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamShape {
    Value(ValueKind),
    ValueList(ValueKind),
    Proxy(&'static str),
    ProxyId(&'static str),
    ProxyList(&'static str),
}

impl ParamShape {
    #[must_use]
    pub const fn reference_token(self) -> Option<&'static str> {
        match self {
            Self::Proxy(t) | Self::ProxyId(t) | Self::ProxyList(t) => Some(t),
            Self::Value(_) | Self::ValueList(_) => None,
        }
    }
}

///
/// ReturnShape
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReturnShape {
    Unit,
    Value(ValueKind),
    ValueList(ValueKind),
    Proxy(&'static str),
    ProxyList(&'static str),
    ProxySet(&'static str),
}

impl ReturnShape {
    #[must_use]
    pub const fn reference_token(self) -> Option<&'static str> {
        match self {
            Self::Proxy(t) | Self::ProxyList(t) | Self::ProxySet(t) => Some(t),
            Self::Unit | Self::Value(_) | Self::ValueList(_) => None,
        }
    }
}

///
/// MethodModel
/// Static model for one bound service operation.
///

pub struct MethodModel {
    /// Operation token of the form `"<Service>::<method>"`.
    pub operation: &'static str,
    pub receiver: MethodReceiver,
    pub params: &'static [ParamShape],
    pub returns: ReturnShape,
}

impl MethodModel {
    #[must_use]
    pub const fn is_instance(&self) -> bool {
        matches!(self.receiver, MethodReceiver::Instance(_))
    }
}
