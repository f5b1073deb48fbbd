use std::{collections::HashMap, fmt::Display, sync::Arc};

use crate::metadata::builtin;

/// A type as seen by the container
///
/// Classes are referred to by name, generic types carry their arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// A raw class or interface, e.g. `Foo`
    Class(Arc<str>),
    /// A generic type with actual arguments, e.g. `List<String>`
    Parameterized { raw: Arc<str>, args: Vec<Type> },
    /// `? extends Upper super Lower`
    Wildcard { upper: Vec<Type>, lower: Vec<Type> },
    /// An unresolved type variable, e.g. `T extends Bound`
    Variable { name: Arc<str>, bounds: Vec<Type> },
}

impl Type {
    pub fn class(name: impl AsRef<str>) -> Type {
        Type::Class(Arc::from(name.as_ref()))
    }

    pub fn parameterized(raw: impl AsRef<str>, args: Vec<Type>) -> Type {
        Type::Parameterized {
            raw: Arc::from(raw.as_ref()),
            args,
        }
    }

    /// `?`
    pub fn wildcard() -> Type {
        Type::Wildcard {
            upper: vec![],
            lower: vec![],
        }
    }

    /// `? extends upper`
    pub fn extends(upper: Type) -> Type {
        Type::Wildcard {
            upper: vec![upper],
            lower: vec![],
        }
    }

    /// `? super lower`
    pub fn super_of(lower: Type) -> Type {
        Type::Wildcard {
            upper: vec![],
            lower: vec![lower],
        }
    }

    pub fn variable(name: impl AsRef<str>) -> Type {
        Type::Variable {
            name: Arc::from(name.as_ref()),
            bounds: vec![],
        }
    }

    pub fn bounded_variable(name: impl AsRef<str>, bounds: Vec<Type>) -> Type {
        Type::Variable {
            name: Arc::from(name.as_ref()),
            bounds,
        }
    }

    pub fn object() -> Type {
        Type::class(builtin::OBJECT)
    }

    /// The class behind this type - None for wildcards and variables
    pub fn raw_name(&self) -> Option<&Arc<str>> {
        match self {
            Type::Class(name) | Type::Parameterized { raw: name, .. } => Some(name),
            Type::Wildcard { .. } | Type::Variable { .. } => None,
        }
    }

    pub fn args(&self) -> &[Type] {
        match self {
            Type::Parameterized { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Class(name) if &**name == builtin::OBJECT)
    }

    pub fn is_actual(&self) -> bool {
        matches!(self, Type::Class(_) | Type::Parameterized { .. })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Type::Wildcard { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Type::Variable { .. })
    }

    /// True if the type or any nested argument is a wildcard
    pub fn contains_wildcard(&self) -> bool {
        match self {
            Type::Wildcard { .. } => true,
            Type::Parameterized { args, .. } => args.iter().any(Type::contains_wildcard),
            _ => false,
        }
    }

    /// True if the type or any nested argument is a type variable
    pub fn contains_variable(&self) -> bool {
        match self {
            Type::Variable { .. } => true,
            Type::Parameterized { args, .. } => args.iter().any(Type::contains_variable),
            Type::Wildcard { upper, lower } => {
                upper.iter().chain(lower).any(Type::contains_variable)
            }
            Type::Class(_) => false,
        }
    }

    /// An unbounded variable, an unbounded wildcard or `Object`
    pub fn is_unbounded(&self) -> bool {
        match self {
            Type::Variable { bounds, .. } => bounds.iter().all(Type::is_object),
            Type::Wildcard { upper, lower } => {
                lower.is_empty() && upper.iter().all(Type::is_object)
            }
            other => other.is_object(),
        }
    }

    /// Replaces type variables by name
    pub fn substitute(&self, bindings: &HashMap<Arc<str>, Type>) -> Type {
        if bindings.is_empty() {
            return self.clone();
        }
        match self {
            Type::Class(_) => self.clone(),
            Type::Parameterized { raw, args } => Type::Parameterized {
                raw: raw.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            Type::Wildcard { upper, lower } => Type::Wildcard {
                upper: upper.iter().map(|a| a.substitute(bindings)).collect(),
                lower: lower.iter().map(|a| a.substitute(bindings)).collect(),
            },
            Type::Variable { name, .. } => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn join(types: &[Type]) -> String {
            types
                .iter()
                .map(Type::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Type::Class(name) => f.write_str(name),
            Type::Parameterized { raw, args } => write!(f, "{raw}<{}>", join(args)),
            Type::Wildcard { upper, lower } => {
                f.write_str("?")?;
                if !upper.is_empty() {
                    write!(f, " extends {}", join(upper))?;
                }
                if !lower.is_empty() {
                    write!(f, " super {}", join(lower))?;
                }
                Ok(())
            }
            Type::Variable { name, bounds } if bounds.is_empty() => f.write_str(name),
            Type::Variable { name, bounds } => write!(f, "{name} extends {}", join(bounds)),
        }
    }
}

/// Knows the supertypes of every loaded class
pub trait TypeHierarchy {
    /// All types an instance of `ty` can be assigned to, including itself and `Object`
    fn closure(&self, ty: &Type) -> Vec<Type>;
}

/// Hierarchy which only knows the types themselves
pub struct FlatHierarchy;
impl TypeHierarchy for FlatHierarchy {
    fn closure(&self, ty: &Type) -> Vec<Type> {
        let mut closure = vec![ty.clone()];
        if !ty.is_object() {
            closure.push(Type::object());
        }
        closure
    }
}
