use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use crate::metadata::builtin::{self, members};

/// Value of an annotation member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Enum(Arc<str>),
    Class(Arc<str>),
    Array(Vec<AnnotationValue>),
    Annotation(Box<Annotation>),
}

impl AnnotationValue {
    pub fn str(value: impl AsRef<str>) -> Self {
        AnnotationValue::Str(Arc::from(value.as_ref()))
    }

    pub fn class(name: impl AsRef<str>) -> Self {
        AnnotationValue::Class(Arc::from(name.as_ref()))
    }

    pub fn enumeration(name: impl AsRef<str>) -> Self {
        AnnotationValue::Enum(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::Str(s) | AnnotationValue::Enum(s) | AnnotationValue::Class(s) => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnnotationValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AnnotationValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AnnotationValue]> {
        match self {
            AnnotationValue::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl Display for AnnotationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnotationValue::Bool(b) => write!(f, "{b}"),
            AnnotationValue::Int(i) => write!(f, "{i}"),
            AnnotationValue::Str(s) => write!(f, "\"{s}\""),
            AnnotationValue::Enum(s) => f.write_str(s),
            AnnotationValue::Class(s) => write!(f, "{s}.class"),
            AnnotationValue::Array(values) => {
                let values = values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
                write!(f, "{{{}}}", values.join(", "))
            }
            AnnotationValue::Annotation(a) => write!(f, "{a}"),
        }
    }
}

/// An annotation instance
///
/// Equality is structural: two instances with the same type and member values are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Annotation {
    pub annotation_type: Arc<str>,
    pub members: BTreeMap<Arc<str>, AnnotationValue>,
}

impl Annotation {
    /// An annotation without members
    pub fn marker(annotation_type: impl AsRef<str>) -> Self {
        Self {
            annotation_type: Arc::from(annotation_type.as_ref()),
            members: BTreeMap::new(),
        }
    }

    pub fn with(mut self, member: impl AsRef<str>, value: AnnotationValue) -> Self {
        self.members.insert(Arc::from(member.as_ref()), value);
        self
    }

    /// `@Named("name")`
    pub fn named(name: impl AsRef<str>) -> Self {
        Self::marker(builtin::NAMED).with(members::VALUE, AnnotationValue::str(name))
    }

    /// `@Priority(value)`
    pub fn priority(value: i64) -> Self {
        Self::marker(builtin::PRIORITY).with(members::VALUE, AnnotationValue::Int(value))
    }

    /// `@Typed({..})`
    pub fn typed(types: &[&str]) -> Self {
        let types = types.iter().map(AnnotationValue::class).collect();
        Self::marker(builtin::TYPED).with(members::VALUE, AnnotationValue::Array(types))
    }

    pub fn is(&self, annotation_type: &str) -> bool {
        &*self.annotation_type == annotation_type
    }

    pub fn member(&self, name: &str) -> Option<&AnnotationValue> {
        self.members.get(name)
    }

    pub fn value(&self) -> Option<&AnnotationValue> {
        self.member(members::VALUE)
    }
}

impl Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.annotation_type)?;
        if self.members.is_empty() {
            return Ok(());
        }
        let members = self
            .members
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        write!(f, "({})", members.join(", "))
    }
}

/// Declaration of an annotation type
///
/// Qualifiers, scopes, stereotypes and interceptor bindings are annotations which are
/// themselves annotated with the matching builtin meta-annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationDefinition {
    pub name: Arc<str>,
    /// Annotations present on the annotation type
    pub meta_annotations: Vec<Annotation>,
    /// Members which do not take part in equality
    pub nonbinding: Vec<Arc<str>>,
}

impl AnnotationDefinition {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            meta_annotations: Vec::new(),
            nonbinding: Vec::new(),
        }
    }

    pub fn qualifier(name: impl AsRef<str>) -> Self {
        Self::new(name).annotated(Annotation::marker(builtin::QUALIFIER))
    }

    pub fn interceptor_binding(name: impl AsRef<str>) -> Self {
        Self::new(name).annotated(Annotation::marker(builtin::INTERCEPTOR_BINDING))
    }

    pub fn stereotype(name: impl AsRef<str>) -> Self {
        Self::new(name).annotated(Annotation::marker(builtin::STEREOTYPE))
    }

    pub fn pseudo_scope(name: impl AsRef<str>) -> Self {
        Self::new(name).annotated(Annotation::marker(builtin::SCOPE))
    }

    pub fn normal_scope(name: impl AsRef<str>, passivating: bool) -> Self {
        Self::new(name).annotated(
            Annotation::marker(builtin::NORMAL_SCOPE)
                .with(members::PASSIVATING, AnnotationValue::Bool(passivating)),
        )
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.meta_annotations.push(annotation);
        self
    }

    pub fn nonbinding(mut self, member: impl AsRef<str>) -> Self {
        self.nonbinding.push(Arc::from(member.as_ref()));
        self
    }
}

/// Annotations indexed by their type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSet {
    annotations: BTreeMap<Arc<str>, Annotation>,
}

impl AnnotationSet {
    pub fn new(annotations: impl IntoIterator<Item = Annotation>) -> Self {
        Self {
            annotations: annotations
                .into_iter()
                .map(|a| (a.annotation_type.clone(), a))
                .collect(),
        }
    }

    pub fn get(&self, annotation_type: &str) -> Option<&Annotation> {
        self.annotations.get(annotation_type)
    }

    pub fn contains(&self, annotation_type: &str) -> bool {
        self.annotations.contains_key(annotation_type)
    }

    pub fn insert(&mut self, annotation: Annotation) {
        self.annotations
            .insert(annotation.annotation_type.clone(), annotation);
    }

    pub fn remove(&mut self, annotation_type: &str) -> Option<Annotation> {
        self.annotations.remove(annotation_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.values()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

impl FromIterator<Annotation> for AnnotationSet {
    fn from_iter<I: IntoIterator<Item = Annotation>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotations_compare_by_value() {
        let a = Annotation::marker("Color").with("value", AnnotationValue::enumeration("RED"));
        let b = Annotation::marker("Color").with("value", AnnotationValue::enumeration("RED"));
        let c = Annotation::marker("Color").with("value", AnnotationValue::enumeration("BLUE"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nested_values_take_part_in_equality() {
        let nested = |v: i64| {
            Annotation::marker("Outer").with(
                "inner",
                AnnotationValue::Array(vec![AnnotationValue::Annotation(Box::new(
                    Annotation::marker("Inner").with("n", AnnotationValue::Int(v)),
                ))]),
            )
        };
        assert_eq!(nested(1), nested(1));
        assert_ne!(nested(1), nested(2));
    }

    #[test]
    fn displays_members() {
        let named = Annotation::named("foo");
        assert_eq!(named.to_string(), "@weft.inject.Named(value=\"foo\")");
    }
}
