//! SDL annotation
//!
//! Parses schema text, attaches the federation directives implied by a
//! [`FederationConfig`](crate::FederationConfig) and re-serializes. The output
//! is the exact text later exposed through `_service { sdl }`.

use apollo_compiler::ast;
use apollo_compiler::{Name, Node};

use crate::ast::{
    extends_directive, external_directive, key_directive, provides_directive, requires_directive,
};
use crate::config::{FederationConfig, FederationObjectConfig};
use crate::{is_reserved_type, FederationError, Result};

/// Directives managed on type definitions; removed before re-attachment so
/// annotation is idempotent.
const MANAGED_TYPE_DIRECTIVES: [&str; 2] = ["key", "extends"];
/// Directives managed on field definitions.
const MANAGED_FIELD_DIRECTIVES: [&str; 3] = ["external", "provides", "requires"];

/// Annotate schema SDL with federation directives.
///
/// Reserved federation definitions (`_Service`, `_Entity`, `_Any`) are
/// stripped from the text; the transformer rebuilds them in the executable
/// schema, and the gateway must never see stale copies. Fails with
/// [`FederationError::UnknownType`] when a configured type has no definition
/// in the document, and with [`FederationError::NotObjectType`] when the
/// definition is not an object type.
pub fn annotate_sdl(sdl: &str, config: &FederationConfig) -> Result<String> {
    let mut document = ast::Document::parse(sdl.to_string(), "schema.graphql")
        .map_err(|e| FederationError::InvalidSdl(e.to_string()))?;

    document.definitions.retain(|definition| {
        type_definition_name(definition).map_or(true, |name| !is_reserved_type(name.as_str()))
    });

    for (type_name, _) in config.iter() {
        let definition = document
            .definitions
            .iter()
            .find(|definition| {
                type_definition_name(definition).map_or(false, |name| name.as_str() == type_name)
            })
            .ok_or_else(|| FederationError::UnknownType(type_name.clone()))?;
        // Directives can only be attached to object types; a config entry on
        // any other kind of definition would otherwise vanish silently.
        if !matches!(definition, ast::Definition::ObjectTypeDefinition(_)) {
            return Err(FederationError::NotObjectType(type_name.clone()));
        }
    }

    for definition in document.definitions.iter_mut() {
        let ast::Definition::ObjectTypeDefinition(object) = definition else {
            continue;
        };
        let Some(object_config) = config.get(object.name.as_str()) else {
            continue;
        };
        annotate_object(object.make_mut(), object_config)?;
    }

    Ok(document.to_string())
}

fn annotate_object(
    object: &mut ast::ObjectTypeDefinition,
    config: &FederationObjectConfig,
) -> Result<()> {
    object
        .directives
        .retain(|d| !MANAGED_TYPE_DIRECTIVES.contains(&d.name.as_str()));

    if config.is_entity() {
        let fields = config.key_fields.join(" ");
        object
            .directives
            .push(Node::new(key_directive(&fields, config.resolvable)));
    }
    if config.extend {
        object.directives.push(Node::new(extends_directive()));
    }

    for (field_name, field_config) in config.fields.iter() {
        let field = object
            .fields
            .iter_mut()
            .find(|f| f.name.as_str() == field_name)
            .ok_or_else(|| FederationError::UnknownField {
                type_name: object.name.to_string(),
                field_name: field_name.clone(),
            })?
            .make_mut();

        field
            .directives
            .retain(|d| !MANAGED_FIELD_DIRECTIVES.contains(&d.name.as_str()));

        if field_config.external {
            field.directives.push(Node::new(external_directive()));
        }
        if let Some(fields) = &field_config.provides {
            field.directives.push(Node::new(provides_directive(fields)));
        }
        if let Some(fields) = &field_config.requires {
            field.directives.push(Node::new(requires_directive(fields)));
        }
    }

    Ok(())
}

fn type_definition_name(definition: &ast::Definition) -> Option<&Name> {
    match definition {
        ast::Definition::ScalarTypeDefinition(d) => Some(&d.name),
        ast::Definition::ObjectTypeDefinition(d) => Some(&d.name),
        ast::Definition::InterfaceTypeDefinition(d) => Some(&d.name),
        ast::Definition::UnionTypeDefinition(d) => Some(&d.name),
        ast::Definition::EnumTypeDefinition(d) => Some(&d.name),
        ast::Definition::InputObjectTypeDefinition(d) => Some(&d.name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FederationFieldConfig;
    use crate::FederationObjectConfig;
    use pretty_assertions::assert_eq;

    const SDL: &str = r#"
type Product {
  id: ID!
  weight: Float
  shippingEstimate: Int
}

type Query {
  products: [Product]
}
"#;

    #[test]
    fn test_attaches_key_directive() {
        let config = FederationConfig::new()
            .object("Product", FederationObjectConfig::new().key(["id"]));

        let annotated = annotate_sdl(SDL, &config).unwrap();
        assert!(annotated.contains(r#"type Product @key(fields: "id")"#));
    }

    #[test]
    fn test_attaches_composite_key() {
        let config = FederationConfig::new()
            .object("Product", FederationObjectConfig::new().key(["id", "weight"]));

        let annotated = annotate_sdl(SDL, &config).unwrap();
        assert!(annotated.contains(r#"@key(fields: "id weight")"#));
    }

    #[test]
    fn test_unresolvable_key() {
        let config = FederationConfig::new().object(
            "Product",
            FederationObjectConfig::new().key(["id"]).unresolvable(),
        );

        let annotated = annotate_sdl(SDL, &config).unwrap();
        assert!(annotated.contains(r#"@key(fields: "id", resolvable: false)"#));
    }

    #[test]
    fn test_extends_and_field_directives() {
        let config = FederationConfig::new().object(
            "Product",
            FederationObjectConfig::new()
                .key(["id"])
                .extend()
                .field("weight", FederationFieldConfig::new().external())
                .field(
                    "shippingEstimate",
                    FederationFieldConfig::new().requires("weight"),
                ),
        );

        let annotated = annotate_sdl(SDL, &config).unwrap();
        assert!(annotated.contains("@extends"));
        assert!(annotated.contains("weight: Float @external"));
        assert!(annotated.contains(r#"shippingEstimate: Int @requires(fields: "weight")"#));
    }

    #[test]
    fn test_provides_directive() {
        let sdl = r#"
type Review {
  product: Product @deprecated
}

type Product {
  id: ID!
  name: String
}
"#;
        let config = FederationConfig::new().object(
            "Review",
            FederationObjectConfig::new().field(
                "product",
                FederationFieldConfig::new().provides("name"),
            ),
        );

        let annotated = annotate_sdl(sdl, &config).unwrap();
        // Unmanaged directives survive; @provides is appended.
        assert!(annotated.contains("@deprecated"));
        assert!(annotated.contains(r#"@provides(fields: "name")"#));
    }

    #[test]
    fn test_annotation_is_idempotent() {
        let config = FederationConfig::new().object(
            "Product",
            FederationObjectConfig::new()
                .key(["id"])
                .extend()
                .field("weight", FederationFieldConfig::new().external()),
        );

        let once = annotate_sdl(SDL, &config).unwrap();
        let twice = annotate_sdl(&once, &config).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_strips_reserved_definitions() {
        let sdl = r#"
scalar _Any

union _Entity = Product

type _Service {
  sdl: String
}

type Product {
  id: ID!
}
"#;
        let annotated = annotate_sdl(sdl, &FederationConfig::new()).unwrap();
        assert!(!annotated.contains("_Any"));
        assert!(!annotated.contains("_Entity"));
        assert!(!annotated.contains("_Service"));
        assert!(annotated.contains("type Product"));
    }

    #[test]
    fn test_unknown_type_fails() {
        let config = FederationConfig::new()
            .object("Missing", FederationObjectConfig::new().key(["id"]));

        let err = annotate_sdl(SDL, &config).unwrap_err();
        assert!(matches!(err, FederationError::UnknownType(name) if name == "Missing"));
    }

    #[test]
    fn test_non_object_type_fails() {
        let sdl = r#"
union SearchResult = Product

type Product {
  id: ID!
}

type Query {
  search: SearchResult
}
"#;
        let config = FederationConfig::new().object(
            "SearchResult",
            FederationObjectConfig::new()
                .field("product", FederationFieldConfig::new().external()),
        );

        let err = annotate_sdl(sdl, &config).unwrap_err();
        assert!(matches!(err, FederationError::NotObjectType(name) if name == "SearchResult"));
    }

    #[test]
    fn test_unknown_field_fails() {
        let config = FederationConfig::new().object(
            "Product",
            FederationObjectConfig::new().field("nope", FederationFieldConfig::new().external()),
        );

        let err = annotate_sdl(SDL, &config).unwrap_err();
        assert!(matches!(
            err,
            FederationError::UnknownField { type_name, field_name }
                if type_name == "Product" && field_name == "nope"
        ));
    }

    #[test]
    fn test_invalid_sdl_fails() {
        let err = annotate_sdl("type {", &FederationConfig::new()).unwrap_err();
        assert!(matches!(err, FederationError::InvalidSdl(_)));
    }
}
