//! Builders for federation directive AST fragments
//!
//! Small, pure constructors over the `apollo-compiler` AST, used by the SDL
//! annotator to attach federation directives to type and field definitions.

use apollo_compiler::ast::{Argument, Directive, Value};
use apollo_compiler::{name, Name, Node};

/// Create a string literal value node. Quoting style (single-line vs block)
/// is chosen by the serializer.
pub fn string_value(value: impl Into<String>) -> Value {
    Value::String(value.into())
}

/// Create a boolean literal value node.
pub fn boolean_value(value: bool) -> Value {
    Value::Boolean(value)
}

/// Create a directive node with the given arguments, in iteration order.
/// An empty argument list yields a bare directive such as `@extends`.
pub fn directive<I>(name: Name, arguments: I) -> Directive
where
    I: IntoIterator<Item = (Name, Value)>,
{
    Directive {
        name,
        arguments: arguments
            .into_iter()
            .map(|(name, value)| {
                Node::new(Argument {
                    name,
                    value: Node::new(value),
                })
            })
            .collect(),
    }
}

/// `@key(fields: "...")`, with `resolvable: false` appended when this
/// subgraph must never be asked to resolve a reference of the type.
pub fn key_directive(fields: &str, resolvable: bool) -> Directive {
    let mut arguments = vec![(name!("fields"), string_value(fields))];
    if !resolvable {
        arguments.push((name!("resolvable"), boolean_value(false)));
    }
    directive(name!("key"), arguments)
}

/// Bare `@extends`.
pub fn extends_directive() -> Directive {
    Directive {
        name: name!("extends"),
        arguments: Vec::new(),
    }
}

/// Bare `@external`.
pub fn external_directive() -> Directive {
    Directive {
        name: name!("external"),
        arguments: Vec::new(),
    }
}

/// `@provides(fields: "...")`.
pub fn provides_directive(fields: &str) -> Directive {
    directive(name!("provides"), [(name!("fields"), string_value(fields))])
}

/// `@requires(fields: "...")`.
pub fn requires_directive(fields: &str) -> Directive {
    directive(name!("requires"), [(name!("fields"), string_value(fields))])
}
