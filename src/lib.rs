//! # graphql-transform-federation
//!
//! Turn an ordinary GraphQL schema into an Apollo Federation subgraph.
//!
//! ## Features
//!
//! - **SDL Annotation** - `@key`, `@extends`, `@external`, `@provides` and
//!   `@requires` directives derived from a declarative config
//! - **Subgraph Protocol** - `_service { sdl }` and
//!   `_entities(representations: [_Any!]!)` wired onto the query root
//! - **Entity Union** - the `_Entity` union rebuilt from the configured
//!   entity types on every transformation
//! - **Reference Resolvers** - per-type callbacks dispatched by
//!   `__typename`, with per-representation failure isolation
//!
//! ## Usage
//!
//! ```rust
//! use graphql_transform_federation::{
//!     transform_schema_federation, FederationConfig, FederationObjectConfig, SubgraphSchema,
//! };
//!
//! let sdl = r#"
//! type Product {
//!   id: ID!
//!   name: String
//! }
//!
//! type Query {
//!   products: [Product]
//! }
//! "#;
//!
//! let config = FederationConfig::new()
//!     .object("Product", FederationObjectConfig::new().key(["id"]));
//!
//! let schema = transform_schema_federation(SubgraphSchema::new(sdl), config).unwrap();
//! assert!(schema.sdl().contains("_service"));
//! ```

pub mod annotate;
pub mod ast;
pub mod config;
pub mod schema;
pub mod transform;

pub use annotate::annotate_sdl;
pub use config::{
    FederationConfig, FederationFieldConfig, FederationObjectConfig, ReferenceResolver,
    ReferenceResolvers, Representation,
};
pub use schema::SubgraphSchema;
pub use transform::transform_schema_federation;

use thiserror::Error;

/// Name of the federation entity union.
pub const ENTITY_TYPE_NAME: &str = "_Entity";
/// Name of the object type returned by `_service`.
pub const SERVICE_TYPE_NAME: &str = "_Service";
/// Name of the opaque representation scalar.
pub const ANY_TYPE_NAME: &str = "_Any";
/// Name of the root field exposing the annotated SDL.
pub const SERVICE_FIELD_NAME: &str = "_service";
/// Name of the root field resolving entity representations.
pub const ENTITIES_FIELD_NAME: &str = "_entities";

/// Returns true for type names reserved by the federation protocol.
pub fn is_reserved_type(name: &str) -> bool {
    matches!(name, ENTITY_TYPE_NAME | SERVICE_TYPE_NAME | ANY_TYPE_NAME)
}

/// Federation transformation errors
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("Invalid schema SDL: {0}")]
    InvalidSdl(String),

    #[error("Type \"{0}\" is not defined in the schema")]
    UnknownType(String),

    #[error("Field \"{type_name}.{field_name}\" is not defined in the schema")]
    UnknownField {
        type_name: String,
        field_name: String,
    },

    #[error("Type \"{0}\" is not an object type and can't have a key directive")]
    NotObjectType(String),

    #[error("Root type \"{type_name}\" already defines a field named \"{field_name}\"")]
    FieldCollision {
        type_name: String,
        field_name: String,
    },

    #[error("Unsupported schema definition: {0}")]
    UnsupportedDefinition(String),

    #[error("Invalid representation: {0}")]
    InvalidRepresentation(String),

    #[error("Schema build failed: {0}")]
    SchemaBuild(String),
}

/// Result type for federation operations
pub type Result<T> = std::result::Result<T, FederationError>;
