//! Declarative federation configuration
//!
//! A [`FederationConfig`] maps object-type names to per-type settings: the
//! composite key, ownership flags, per-field directives and an optional
//! reference resolver invoked by `_entities`.

use std::sync::Arc;

use async_graphql::dynamic::ObjectAccessor;
use async_graphql::futures_util::future::BoxFuture;
use async_graphql::indexmap::IndexMap;
use async_graphql::{Context, Name, Value};

use crate::{FederationError, Result};

/// A partial object sent by the gateway to request resolution of an entity
/// reference, typically `{ __typename, <key fields> }`.
#[derive(Debug, Clone, Default)]
pub struct Representation {
    fields: IndexMap<Name, Value>,
}

impl Representation {
    /// Build a representation from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match Value::from_json(value) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(_) => Err(FederationError::InvalidRepresentation(
                "expected an object".to_string(),
            )),
            Err(e) => Err(FederationError::InvalidRepresentation(e.to_string())),
        }
    }

    pub(crate) fn from_accessor(object: &ObjectAccessor<'_>) -> Self {
        let mut fields = IndexMap::new();
        for (name, value) in object.iter() {
            fields.insert(name.clone(), value.as_value().clone());
        }
        Self { fields }
    }

    /// The `__typename` the gateway asked to resolve, if present.
    pub fn type_name(&self) -> Option<&str> {
        match self.fields.get("__typename") {
            Some(Value::String(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Look up a key field carried by the representation.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Consume the representation as a plain GraphQL value.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

/// Callback resolving an entity reference into a GraphQL value.
///
/// Receives the representation and the request context; returning `Ok(None)`
/// resolves the entity to `null`. Plain functions of the matching signature
/// coerce directly:
///
/// ```rust,ignore
/// fn resolve_product<'a>(
///     reference: &'a Representation,
///     _ctx: &'a Context<'a>,
/// ) -> BoxFuture<'a, async_graphql::Result<Option<Value>>> {
///     Box::pin(async move { Ok(Some(value!({ "id": reference.get("id") }))) })
/// }
/// ```
pub type ReferenceResolver = Arc<
    dyn for<'a> Fn(
            &'a Representation,
            &'a Context<'a>,
        ) -> BoxFuture<'a, async_graphql::Result<Option<Value>>>
        + Send
        + Sync,
>;

/// Per-field federation settings. All flags are independently optional.
#[derive(Debug, Clone, Default)]
pub struct FederationFieldConfig {
    pub external: bool,
    pub provides: Option<String>,
    pub requires: Option<String>,
}

impl FederationFieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the field `@external` (owned by another subgraph).
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    /// Attach `@provides(fields: "...")`.
    pub fn provides(mut self, fields: impl Into<String>) -> Self {
        self.provides = Some(fields.into());
        self
    }

    /// Attach `@requires(fields: "...")`.
    pub fn requires(mut self, fields: impl Into<String>) -> Self {
        self.requires = Some(fields.into());
        self
    }
}

/// Per-type federation settings.
#[derive(Clone)]
pub struct FederationObjectConfig {
    /// Field names forming one composite `@key`. Empty means the type is not
    /// an entity.
    pub key_fields: Vec<String>,
    /// Attach `@extends`: the type is owned elsewhere and this subgraph only
    /// contributes fields and keys.
    pub extend: bool,
    /// When false, `@key(..., resolvable: false)` tells the gateway never to
    /// ask this subgraph for references of the type.
    pub resolvable: bool,
    /// Field-level directive settings.
    pub fields: IndexMap<String, FederationFieldConfig>,
    /// Callback invoked for each `_entities` representation of this type.
    pub resolve_reference: Option<ReferenceResolver>,
}

impl Default for FederationObjectConfig {
    fn default() -> Self {
        Self {
            key_fields: Vec::new(),
            extend: false,
            resolvable: true,
            fields: IndexMap::new(),
            resolve_reference: None,
        }
    }
}

impl FederationObjectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the composite key fields, space-joined into one `@key`.
    pub fn key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the type as extending a definition owned by another subgraph.
    pub fn extend(mut self) -> Self {
        self.extend = true;
        self
    }

    /// Emit `@key(..., resolvable: false)`.
    pub fn unresolvable(mut self) -> Self {
        self.resolvable = false;
        self
    }

    /// Add per-field settings for a field of this type.
    pub fn field(mut self, name: impl Into<String>, config: FederationFieldConfig) -> Self {
        self.fields.insert(name.into(), config);
        self
    }

    /// Register the reference resolver for this type.
    pub fn resolve_reference<F>(mut self, resolver: F) -> Self
    where
        F: for<'a> Fn(
                &'a Representation,
                &'a Context<'a>,
            ) -> BoxFuture<'a, async_graphql::Result<Option<Value>>>
            + Send
            + Sync
            + 'static,
    {
        self.resolve_reference = Some(Arc::new(resolver));
        self
    }

    /// Whether the type carries a key and therefore joins the entity union.
    pub fn is_entity(&self) -> bool {
        !self.key_fields.is_empty()
    }
}

/// Mapping from object-type name to its federation settings. Insertion order
/// determines `_Entity` member order.
#[derive(Clone, Default)]
pub struct FederationConfig {
    objects: IndexMap<String, FederationObjectConfig>,
}

impl FederationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add settings for an object type. The name must exist in the target
    /// schema or the transformation fails.
    pub fn object(mut self, name: impl Into<String>, config: FederationObjectConfig) -> Self {
        self.objects.insert(name.into(), config);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FederationObjectConfig> {
        self.objects.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FederationObjectConfig)> {
        self.objects.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Names of all configured entity types, in insertion order.
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.objects
            .iter()
            .filter(|(_, config)| config.is_entity())
            .map(|(name, _)| name.as_str())
    }

    pub(crate) fn reference_resolvers(&self) -> ReferenceResolvers {
        let mut resolvers = IndexMap::new();
        for (name, config) in &self.objects {
            if let Some(resolver) = &config.resolve_reference {
                resolvers.insert(name.clone(), Arc::clone(resolver));
            }
        }
        ReferenceResolvers { resolvers }
    }
}

/// Read-only registry of reference resolvers, keyed by entity-type name.
///
/// Built once at transformation time and carried as schema data, where the
/// `_entities` resolver reads it at request time.
#[derive(Clone, Default)]
pub struct ReferenceResolvers {
    resolvers: IndexMap<String, ReferenceResolver>,
}

impl ReferenceResolvers {
    pub fn get(&self, type_name: &str) -> Option<&ReferenceResolver> {
        self.resolvers.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.resolvers.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.resolvers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_config_defaults() {
        let config = FederationObjectConfig::new();
        assert!(config.resolvable);
        assert!(!config.extend);
        assert!(!config.is_entity());
    }

    #[test]
    fn test_entity_types_follow_insertion_order() {
        let config = FederationConfig::new()
            .object("User", FederationObjectConfig::new().key(["id"]))
            .object("Review", FederationObjectConfig::new())
            .object("Product", FederationObjectConfig::new().key(["upc", "sku"]));

        let entities: Vec<_> = config.entity_types().collect();
        assert_eq!(entities, vec!["User", "Product"]);
    }

    #[test]
    fn test_representation_from_json() {
        let repr =
            Representation::from_json(json!({ "__typename": "Product", "id": "p-1" })).unwrap();
        assert_eq!(repr.type_name(), Some("Product"));
        assert_eq!(repr.get("id"), Some(&Value::String("p-1".to_string())));
        assert_eq!(repr.get("missing"), None);
    }

    #[test]
    fn test_representation_rejects_non_objects() {
        assert!(Representation::from_json(json!(["nope"])).is_err());
        assert!(Representation::from_json(json!("nope")).is_err());
    }

    #[test]
    fn test_reference_resolver_registry() {
        fn resolve<'a>(
            reference: &'a Representation,
            _ctx: &'a Context<'a>,
        ) -> BoxFuture<'a, async_graphql::Result<Option<Value>>> {
            let value = reference.clone().into_value();
            Box::pin(async move { Ok(Some(value)) })
        }

        let config = FederationConfig::new()
            .object(
                "Product",
                FederationObjectConfig::new()
                    .key(["id"])
                    .resolve_reference(resolve),
            )
            .object("Review", FederationObjectConfig::new().key(["id"]));

        let registry = config.reference_resolvers();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("Product"));
        assert!(!registry.contains("Review"));
    }
}
