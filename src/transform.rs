//! Schema transformation
//!
//! Assembles the federated subgraph schema: annotated SDL exposed through
//! `_service`, the `_Entity` union rebuilt from the configured entity types,
//! `_entities` dispatching representations to reference resolvers, and all
//! original types carried over unchanged.

use std::collections::HashSet;
use std::sync::Arc;

use apollo_compiler::ast;
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputValue, Object, Scalar, Schema, TypeRef, Union,
};
use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextResolve, ResolveInfo,
};
use async_graphql::futures_util::future::join_all;
use async_graphql::{Context, ServerResult, Value};

use crate::annotate::annotate_sdl;
use crate::config::{FederationConfig, ReferenceResolvers, Representation};
use crate::schema::{load_schema, LoadedRoot, SubgraphSchema};
use crate::{
    FederationError, Result, ANY_TYPE_NAME, ENTITIES_FIELD_NAME, ENTITY_TYPE_NAME,
    SERVICE_FIELD_NAME, SERVICE_TYPE_NAME,
};

/// Transform a schema into an Apollo Federation subgraph schema.
///
/// The transformation is synchronous and produces a new schema on every
/// call; nothing is shared between invocations. Fatal configuration errors
/// (unknown types, keys on non-object types, collisions with the reserved
/// root fields) abort the transformation without a partial result.
pub fn transform_schema_federation(
    schema: SubgraphSchema,
    config: FederationConfig,
) -> Result<Schema> {
    let document = ast::Document::parse(schema.sdl.clone(), "schema.graphql")
        .map_err(|e| FederationError::InvalidSdl(e.to_string()))?;

    // Frozen here; `_service` serves this exact text for the lifetime of the
    // schema.
    let annotated_sdl = annotate_sdl(&schema.sdl, &config)?;

    let entity_types = resolve_entity_types(&document, &config)?;
    let has_entities = !entity_types.is_empty();
    let registry = config.reference_resolvers();

    let loaded = load_schema(&document, &schema)?;
    let query_root = loaded.query.unwrap_or_else(|| LoadedRoot {
        name: "Query".to_string(),
        object: Object::new("Query"),
        field_names: Vec::new(),
    });

    for reserved in [SERVICE_FIELD_NAME, ENTITIES_FIELD_NAME] {
        if query_root.field_names.iter().any(|field| field == reserved) {
            return Err(FederationError::FieldCollision {
                type_name: query_root.name.clone(),
                field_name: reserved.to_string(),
            });
        }
    }

    tracing::debug!(
        query_root = %query_root.name,
        entities = entity_types.len(),
        reference_resolvers = registry.len(),
        "transforming schema for federation"
    );

    let mut query = query_root.object.field(service_field(annotated_sdl));
    if has_entities {
        query = query.field(entities_field());
    }

    let mutation_name = loaded.mutation.as_ref().map(|root| root.name.clone());
    let mut builder = Schema::build(query_root.name.as_str(), mutation_name.as_deref(), None)
        .register(query)
        .register(service_type())
        .data(registry);

    if has_entities {
        let mut entity_union = Union::new(ENTITY_TYPE_NAME);
        for entity in &entity_types {
            entity_union = entity_union.possible_type(*entity);
        }
        builder = builder
            .register(entity_union)
            .register(Scalar::new(ANY_TYPE_NAME))
            .extension(EntityFailureIsolation);
    }

    if let Some(mutation) = loaded.mutation {
        builder = builder.register(mutation.object);
    }
    for ty in loaded.types {
        builder = builder.register(ty);
    }

    builder
        .finish()
        .map_err(|e| FederationError::SchemaBuild(e.to_string()))
}

/// Configured types with a non-empty key, in config order. Each must be an
/// object type definition in the schema.
fn resolve_entity_types<'a>(
    document: &ast::Document,
    config: &'a FederationConfig,
) -> Result<Vec<&'a str>> {
    let object_names: HashSet<&str> = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::ObjectTypeDefinition(object) => Some(object.name.as_str()),
            _ => None,
        })
        .collect();

    let mut entities = Vec::new();
    for (name, object_config) in config.iter() {
        if !object_config.is_entity() {
            continue;
        }
        if !object_names.contains(name.as_str()) {
            return Err(FederationError::NotObjectType(name.clone()));
        }
        entities.push(name.as_str());
    }
    Ok(entities)
}

/// Qualified parent type of one `_entities` list slot.
const ENTITY_SLOT_PARENT: &str = "[_Entity]";

/// Contains failures to the `_entities` slot they occurred in.
///
/// The dynamic engine only accepts [`FieldValue::with_type`] in a union
/// position, so a failed slot cannot be expressed as a plain null value; it
/// surfaces as a resolution error instead. This extension intercepts item
/// resolution under `[_Entity]` and turns such an error into a JSON `null`
/// at that list position, leaving sibling representations untouched.
struct EntityFailureIsolation;

impl ExtensionFactory for EntityFailureIsolation {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(EntityFailureIsolationExtension)
    }
}

struct EntityFailureIsolationExtension;

#[async_trait::async_trait]
impl Extension for EntityFailureIsolationExtension {
    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: ResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<Value>> {
        let is_entity_slot = info.parent_type == ENTITY_SLOT_PARENT;
        match next.run(ctx, info).await {
            Err(error) if is_entity_slot => {
                tracing::debug!(error = %error.message, "entity slot resolved to null");
                Ok(Some(Value::Null))
            }
            other => other,
        }
    }
}

struct ServiceSdl(String);

fn service_field(sdl: String) -> Field {
    Field::new(
        SERVICE_FIELD_NAME,
        TypeRef::named_nn(SERVICE_TYPE_NAME),
        move |_ctx| {
            let sdl = sdl.clone();
            FieldFuture::new(async move { Ok(Some(FieldValue::owned_any(ServiceSdl(sdl)))) })
        },
    )
}

fn service_type() -> Object {
    Object::new(SERVICE_TYPE_NAME).field(Field::new(
        "sdl",
        TypeRef::named(TypeRef::STRING),
        |ctx| {
            FieldFuture::new(async move {
                let service = ctx.parent_value.try_downcast_ref::<ServiceSdl>()?;
                Ok(Some(Value::String(service.0.clone())))
            })
        },
    ))
}

fn entities_field() -> Field {
    Field::new(
        ENTITIES_FIELD_NAME,
        TypeRef::named_list_nn(ENTITY_TYPE_NAME),
        |ctx| {
            FieldFuture::new(async move {
                let list = ctx.args.try_get("representations")?.list()?;
                let mut representations = Vec::new();
                for item in list.iter() {
                    representations.push(Representation::from_accessor(&item.object()?));
                }

                let resolvers = ctx.ctx.data::<ReferenceResolvers>()?;
                let resolved = join_all(representations.iter().map(|representation| {
                    resolve_representation(representation, resolvers, ctx.ctx)
                }))
                .await;

                Ok(Some(FieldValue::list(resolved)))
            })
        },
    )
    .argument(InputValue::new(
        "representations",
        TypeRef::named_nn_list_nn(ANY_TYPE_NAME),
    ))
}

/// Resolve one representation. Failures are contained: a missing
/// `__typename`, an unregistered type or a resolver error produce `null` for
/// this slot only. The returned [`FieldValue::NULL`] is rejected by the
/// union resolution path and comes back as a slot error, which
/// [`EntityFailureIsolation`] renders as the `null` list item.
async fn resolve_representation(
    representation: &Representation,
    resolvers: &ReferenceResolvers,
    ctx: &Context<'_>,
) -> FieldValue<'static> {
    let Some(type_name) = representation.type_name() else {
        tracing::warn!("representation is missing __typename");
        return FieldValue::NULL;
    };

    match resolvers.get(type_name) {
        Some(resolver) => match resolver(representation, ctx).await {
            Ok(Some(value)) => FieldValue::value(value).with_type(type_name.to_string()),
            Ok(None) => FieldValue::NULL,
            Err(error) => {
                tracing::warn!(type_name, error = %error.message, "reference resolver failed");
                FieldValue::NULL
            }
        },
        None => {
            tracing::warn!(type_name, "no reference resolver registered for type");
            FieldValue::NULL
        }
    }
}
