//! Type and member metadata
//!
//! Classes are described once ([annotated]), their hierarchy is resolved and their
//! annotations indexed ([enhanced]) by the [transformer::ClassTransformer]. Facts about
//! annotation types (is it a qualifier, a scope, a stereotype) are cached by the
//! [store::MetaAnnotationStore].

pub mod annotated;
pub mod annotation;
pub mod builtin;
pub mod enhanced;
pub mod reflection;
pub mod store;
pub mod transformer;
