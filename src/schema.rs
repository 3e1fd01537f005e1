//! Executable schema loading
//!
//! Builds `async_graphql::dynamic` types from parsed schema SDL. Finished
//! dynamic schemas are opaque, so the transformation consumes the schema in
//! its textual form together with a registry of field resolvers; fields
//! without a registered resolver fall back to property lookup on the parent
//! value, matching the host engine's default-resolver behavior.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::ast;
use async_graphql::dynamic::{
    Enum, Field, FieldFuture, InputObject, InputValue, Interface, InterfaceField, Object,
    ResolverContext, Scalar, Type, TypeRef, Union,
};
use async_graphql::{Name, Value};

use crate::{is_reserved_type, FederationError, Result};

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Resolver attached to one `(type, field)` pair of the schema.
pub type FieldResolverFn =
    Arc<dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync>;

/// The source schema handed to the transformation: SDL text plus the field
/// resolvers that make it executable.
pub struct SubgraphSchema {
    pub(crate) sdl: String,
    pub(crate) resolvers: HashMap<(String, String), FieldResolverFn>,
}

impl SubgraphSchema {
    pub fn new(sdl: impl Into<String>) -> Self {
        Self {
            sdl: sdl.into(),
            resolvers: HashMap::new(),
        }
    }

    /// Register the resolver for a field. Unregistered fields resolve by
    /// looking the field name up on the parent object value.
    pub fn resolver<F>(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: F,
    ) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
    {
        self.resolvers
            .insert((type_name.into(), field_name.into()), Arc::new(resolver));
        self
    }

    /// The schema text as supplied by the caller.
    pub fn sdl(&self) -> &str {
        &self.sdl
    }
}

/// A root operation type, plus its declared field names so the transformer
/// can detect collisions with the federation fields.
pub(crate) struct LoadedRoot {
    pub name: String,
    pub object: Object,
    pub field_names: Vec<String>,
}

pub(crate) struct LoadedSchema {
    pub query: Option<LoadedRoot>,
    pub mutation: Option<LoadedRoot>,
    pub types: Vec<Type>,
}

pub(crate) fn load_schema(
    document: &ast::Document,
    schema: &SubgraphSchema,
) -> Result<LoadedSchema> {
    let roots = root_names(document)?;
    let extensions = object_extensions(document)?;

    let mut loaded = LoadedSchema {
        query: None,
        mutation: None,
        types: Vec::new(),
    };

    for definition in &document.definitions {
        match definition {
            ast::Definition::SchemaDefinition(_)
            | ast::Definition::DirectiveDefinition(_)
            | ast::Definition::ObjectTypeExtension(_) => {}

            ast::Definition::ObjectTypeDefinition(object) => {
                let name = object.name.as_str();
                if is_reserved_type(name) {
                    continue;
                }
                if roots.subscription == name {
                    return Err(FederationError::UnsupportedDefinition(
                        "subscription root types are not supported".to_string(),
                    ));
                }
                let object_extensions = extensions
                    .get(name)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let (built, field_names) =
                    build_object(object, object_extensions, &schema.resolvers)?;
                if roots.query == name {
                    loaded.query = Some(LoadedRoot {
                        name: name.to_string(),
                        object: built,
                        field_names,
                    });
                } else if roots.mutation == name {
                    loaded.mutation = Some(LoadedRoot {
                        name: name.to_string(),
                        object: built,
                        field_names,
                    });
                } else {
                    loaded.types.push(built.into());
                }
            }

            ast::Definition::ScalarTypeDefinition(scalar) => {
                let name = scalar.name.as_str();
                if is_reserved_type(name) || BUILTIN_SCALARS.contains(&name) {
                    continue;
                }
                let mut built = Scalar::new(name);
                if let Some(description) = &scalar.description {
                    built = built.description(description.to_string());
                }
                loaded.types.push(built.into());
            }

            ast::Definition::InterfaceTypeDefinition(interface) => {
                loaded.types.push(build_interface(interface)?.into());
            }

            ast::Definition::UnionTypeDefinition(union) => {
                if is_reserved_type(union.name.as_str()) {
                    continue;
                }
                let mut built = Union::new(union.name.as_str());
                if let Some(description) = &union.description {
                    built = built.description(description.to_string());
                }
                for member in &union.members {
                    built = built.possible_type(member.as_str());
                }
                loaded.types.push(built.into());
            }

            ast::Definition::EnumTypeDefinition(enum_type) => {
                let mut built = Enum::new(enum_type.name.as_str());
                if let Some(description) = &enum_type.description {
                    built = built.description(description.to_string());
                }
                for value in &enum_type.values {
                    built = built.item(value.value.as_str());
                }
                loaded.types.push(built.into());
            }

            ast::Definition::InputObjectTypeDefinition(input) => {
                let mut built = InputObject::new(input.name.as_str());
                if let Some(description) = &input.description {
                    built = built.description(description.to_string());
                }
                for field in &input.fields {
                    built = built.field(input_value(field)?);
                }
                loaded.types.push(built.into());
            }

            ast::Definition::OperationDefinition(_) | ast::Definition::FragmentDefinition(_) => {
                return Err(FederationError::UnsupportedDefinition(
                    "executable definitions are not allowed in schema SDL".to_string(),
                ));
            }

            ast::Definition::SchemaExtension(_)
            | ast::Definition::ScalarTypeExtension(_)
            | ast::Definition::InterfaceTypeExtension(_)
            | ast::Definition::UnionTypeExtension(_)
            | ast::Definition::EnumTypeExtension(_)
            | ast::Definition::InputObjectTypeExtension(_) => {
                return Err(FederationError::UnsupportedDefinition(
                    "only object type extensions are supported".to_string(),
                ));
            }
        }
    }

    Ok(loaded)
}

struct RootNames {
    query: String,
    mutation: String,
    subscription: String,
}

fn root_names(document: &ast::Document) -> Result<RootNames> {
    let mut roots = RootNames {
        query: "Query".to_string(),
        mutation: "Mutation".to_string(),
        subscription: "Subscription".to_string(),
    };
    for definition in &document.definitions {
        if let ast::Definition::SchemaDefinition(schema) = definition {
            for root in &schema.root_operations {
                let (operation, name) = &**root;
                match operation {
                    ast::OperationType::Query => roots.query = name.to_string(),
                    ast::OperationType::Mutation => roots.mutation = name.to_string(),
                    ast::OperationType::Subscription => {
                        return Err(FederationError::UnsupportedDefinition(
                            "subscription root types are not supported".to_string(),
                        ));
                    }
                }
            }
        }
    }
    Ok(roots)
}

fn object_extensions(
    document: &ast::Document,
) -> Result<HashMap<&str, Vec<&ast::ObjectTypeExtension>>> {
    let mut extensions: HashMap<&str, Vec<&ast::ObjectTypeExtension>> = HashMap::new();
    for definition in &document.definitions {
        if let ast::Definition::ObjectTypeExtension(extension) = definition {
            extensions
                .entry(extension.name.as_str())
                .or_default()
                .push(extension);
        }
    }
    for name in extensions.keys() {
        let has_base = document.definitions.iter().any(|definition| {
            matches!(definition, ast::Definition::ObjectTypeDefinition(object)
                if object.name.as_str() == *name)
        });
        if !has_base {
            return Err(FederationError::InvalidSdl(format!(
                "extend type \"{name}\" has no base definition"
            )));
        }
    }
    Ok(extensions)
}

fn build_object(
    definition: &ast::ObjectTypeDefinition,
    extensions: &[&ast::ObjectTypeExtension],
    resolvers: &HashMap<(String, String), FieldResolverFn>,
) -> Result<(Object, Vec<String>)> {
    let type_name = definition.name.as_str();
    let mut object = Object::new(type_name);
    if let Some(description) = &definition.description {
        object = object.description(description.to_string());
    }

    let implements = definition
        .implements_interfaces
        .iter()
        .chain(extensions.iter().flat_map(|e| e.implements_interfaces.iter()));
    for interface in implements {
        object = object.implement(interface.as_str());
    }

    let mut field_names = Vec::new();
    let fields = definition
        .fields
        .iter()
        .chain(extensions.iter().flat_map(|e| e.fields.iter()));
    for field in fields {
        field_names.push(field.name.to_string());
        object = object.field(build_field(type_name, field, resolvers)?);
    }

    Ok((object, field_names))
}

fn build_field(
    type_name: &str,
    field: &ast::FieldDefinition,
    resolvers: &HashMap<(String, String), FieldResolverFn>,
) -> Result<Field> {
    let ty = type_ref(&field.ty);
    let key = (type_name.to_string(), field.name.to_string());

    let mut built = match resolvers.get(&key) {
        Some(resolver) => {
            let resolver = Arc::clone(resolver);
            Field::new(field.name.as_str(), ty, move |ctx| resolver(ctx))
        }
        None => {
            let property = field.name.to_string();
            Field::new(field.name.as_str(), ty, move |ctx| {
                let value = match ctx.parent_value.as_value() {
                    Some(Value::Object(object)) => object.get(property.as_str()).cloned(),
                    _ => None,
                };
                FieldFuture::from_value(value)
            })
        }
    };

    if let Some(description) = &field.description {
        built = built.description(description.to_string());
    }
    for argument in &field.arguments {
        built = built.argument(input_value(argument)?);
    }
    Ok(built)
}

fn build_interface(definition: &ast::InterfaceTypeDefinition) -> Result<Interface> {
    let mut interface = Interface::new(definition.name.as_str());
    if let Some(description) = &definition.description {
        interface = interface.description(description.to_string());
    }
    for implemented in &definition.implements_interfaces {
        interface = interface.implement(implemented.as_str());
    }
    for field in &definition.fields {
        let mut built = InterfaceField::new(field.name.as_str(), type_ref(&field.ty));
        if let Some(description) = &field.description {
            built = built.description(description.to_string());
        }
        for argument in &field.arguments {
            built = built.argument(input_value(argument)?);
        }
        interface = interface.field(built);
    }
    Ok(interface)
}

fn input_value(definition: &ast::InputValueDefinition) -> Result<InputValue> {
    let mut value = InputValue::new(definition.name.as_str(), type_ref(&definition.ty));
    if let Some(description) = &definition.description {
        value = value.description(description.to_string());
    }
    if let Some(default) = &definition.default_value {
        value = value.default_value(const_value(default)?);
    }
    Ok(value)
}

fn type_ref(ty: &ast::Type) -> TypeRef {
    match ty {
        ast::Type::Named(name) => TypeRef::Named(name.to_string().into()),
        ast::Type::NonNullNamed(name) => {
            TypeRef::NonNull(Box::new(TypeRef::Named(name.to_string().into())))
        }
        ast::Type::List(inner) => TypeRef::List(Box::new(type_ref(inner))),
        ast::Type::NonNullList(inner) => {
            TypeRef::NonNull(Box::new(TypeRef::List(Box::new(type_ref(inner)))))
        }
    }
}

fn const_value(value: &ast::Value) -> Result<Value> {
    Ok(match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => Value::Enum(Name::new(name.as_str())),
        ast::Value::Variable(name) => {
            return Err(FederationError::InvalidSdl(format!(
                "variable \"${name}\" is not allowed in a default value"
            )))
        }
        ast::Value::String(s) => Value::String(s.clone()),
        ast::Value::Boolean(b) => Value::Boolean(*b),
        ast::Value::Int(i) => {
            let parsed = i
                .try_to_i32()
                .map_err(|e| FederationError::InvalidSdl(e.to_string()))?;
            Value::Number(serde_json::Number::from(parsed))
        }
        ast::Value::Float(f) => {
            let parsed = f
                .try_to_f64()
                .map_err(|e| FederationError::InvalidSdl(e.to_string()))?;
            serde_json::Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| {
                    FederationError::InvalidSdl("non-finite float in default value".to_string())
                })?
        }
        ast::Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| const_value(item))
                .collect::<Result<_>>()?,
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, item)| Ok((Name::new(name.as_str()), const_value(item)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::dynamic::{FieldValue, Schema};
    use async_graphql::value;
    use serde_json::json;

    fn parse(sdl: &str) -> ast::Document {
        ast::Document::parse(sdl.to_string(), "schema.graphql").unwrap()
    }

    fn finish(loaded: LoadedSchema) -> Schema {
        let query = loaded.query.unwrap();
        let mut builder = Schema::build(query.name.as_str(), None, None).register(query.object);
        for ty in loaded.types {
            builder = builder.register(ty);
        }
        builder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_custom_and_property_resolvers() {
        let sdl = r#"
type Widget {
  id: ID!
  name: String
}

type Query {
  widget: Widget
}
"#;
        let input = SubgraphSchema::new(sdl).resolver("Query", "widget", |_ctx| {
            FieldFuture::new(async move {
                Ok(Some(FieldValue::value(value!({
                    "id": "w-1",
                    "name": "Gear",
                }))))
            })
        });

        let document = parse(sdl);
        let schema = finish(load_schema(&document, &input).unwrap());

        let response = schema.execute("{ widget { id name } }").await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({ "widget": { "id": "w-1", "name": "Gear" } })
        );
    }

    #[tokio::test]
    async fn test_argument_defaults() {
        let sdl = r#"
type Query {
  greet(name: String! = "world"): String
}
"#;
        let input = SubgraphSchema::new(sdl).resolver("Query", "greet", |ctx| {
            FieldFuture::new(async move {
                let name = ctx.args.try_get("name")?.string()?.to_string();
                Ok(Some(Value::String(format!("hello {name}"))))
            })
        });

        let document = parse(sdl);
        let schema = finish(load_schema(&document, &input).unwrap());

        let response = schema.execute("{ greet }").await;
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({ "greet": "hello world" })
        );

        let response = schema.execute(r#"{ greet(name: "federation") }"#).await;
        assert_eq!(
            response.data.into_json().unwrap(),
            json!({ "greet": "hello federation" })
        );
    }

    #[test]
    fn test_object_extensions_are_merged() {
        let sdl = r#"
type Query {
  a: String
}

extend type Query {
  b: String
}
"#;
        let input = SubgraphSchema::new(sdl);
        let loaded = load_schema(&parse(sdl), &input).unwrap();
        let query = loaded.query.unwrap();
        assert_eq!(query.field_names, vec!["a", "b"]);
    }

    #[test]
    fn test_extension_without_base_fails() {
        let sdl = "extend type Ghost { a: String }";
        let err = load_schema(&parse(sdl), &SubgraphSchema::new(sdl)).err().unwrap();
        assert!(matches!(err, FederationError::InvalidSdl(_)));
    }

    #[test]
    fn test_subscription_roots_are_rejected() {
        let sdl = r#"
type Query {
  a: String
}

type Subscription {
  ticks: Int
}
"#;
        let err = load_schema(&parse(sdl), &SubgraphSchema::new(sdl)).err().unwrap();
        assert!(matches!(err, FederationError::UnsupportedDefinition(_)));
    }

    #[test]
    fn test_custom_root_names() {
        let sdl = r#"
schema {
  query: QueryRoot
}

type QueryRoot {
  a: String
}
"#;
        let loaded = load_schema(&parse(sdl), &SubgraphSchema::new(sdl)).unwrap();
        assert_eq!(loaded.query.unwrap().name, "QueryRoot");
    }
}
