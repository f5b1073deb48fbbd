//! Typesafe resolution of components and observers
//!
//! A lookup is a required type plus a set of qualifiers ([resolvable::Resolvable]).
//! A component matches if one of its types is assignable to the required type and its
//! qualifiers are a superset of the required ones.

pub mod assignability;
pub mod observers;
pub mod qualifiers;
pub mod resolvable;
pub mod resolver;
