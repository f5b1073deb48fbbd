//! Assignability rules for component lookups and event delivery

use crate::metadata::reflection::{Type, TypeHierarchy};

/// Can a component with `bean_type` satisfy an injection point requiring `required`
pub fn is_assignable(hierarchy: &dyn TypeHierarchy, required: &Type, bean_type: &Type) -> bool {
    match (required, bean_type) {
        (Type::Class(r), Type::Class(b)) => r == b,
        // A raw required type matches parameterizations whose arguments are all unbounded
        (Type::Class(r), Type::Parameterized { raw, args }) => {
            r == raw && args.iter().all(Type::is_unbounded)
        }
        (Type::Parameterized { raw, args }, Type::Class(b)) => {
            raw == b && args.iter().all(Type::is_unbounded)
        }
        (
            Type::Parameterized { raw: r, args: rargs },
            Type::Parameterized { raw: b, args: bargs },
        ) => {
            r == b
                && rargs.len() == bargs.len()
                && rargs
                    .iter()
                    .zip(bargs)
                    .all(|(r, b)| parameter_matches(hierarchy, r, b))
        }
        // Injection points never require wildcards or variables at the top level
        _ => false,
    }
}

/// One type argument of a required parameterized type against the bean's argument
fn parameter_matches(hierarchy: &dyn TypeHierarchy, required: &Type, bean: &Type) -> bool {
    match (required, bean) {
        (r, b) if r.is_actual() && b.is_actual() => identical_actual(hierarchy, r, b),
        (Type::Wildcard { upper, lower }, b) if b.is_actual() => {
            upper.iter().all(|u| assignable_to(hierarchy, b, u))
                && lower.iter().all(|l| assignable_to(hierarchy, l, b))
        }
        (Type::Wildcard { upper, lower }, Type::Variable { bounds, .. }) => {
            let bounds = effective_bounds(bounds);
            upper.iter().all(|u| {
                bounds
                    .iter()
                    .all(|bound| assignable_to(hierarchy, bound, u) || assignable_to(hierarchy, u, bound))
            }) && lower
                .iter()
                .all(|l| bounds.iter().all(|bound| assignable_to(hierarchy, l, bound)))
        }
        (r, Type::Variable { bounds, .. }) if r.is_actual() => effective_bounds(bounds)
            .iter()
            .all(|bound| assignable_to(hierarchy, r, bound)),
        (Type::Variable { bounds: rbounds, .. }, Type::Variable { bounds: bbounds, .. }) => {
            let rbounds = effective_bounds(rbounds);
            effective_bounds(bbounds)
                .iter()
                .all(|b| rbounds.iter().any(|r| assignable_to(hierarchy, r, b)))
        }
        _ => false,
    }
}

/// Actual type arguments have to be identical, recursively
fn identical_actual(hierarchy: &dyn TypeHierarchy, required: &Type, bean: &Type) -> bool {
    match (required, bean) {
        (Type::Class(r), Type::Class(b)) => r == b,
        (Type::Parameterized { .. }, Type::Parameterized { .. }) => {
            is_assignable(hierarchy, required, bean)
        }
        _ => false,
    }
}

/// Is `sub` assignable to `sup` in plain subtyping terms
fn assignable_to(hierarchy: &dyn TypeHierarchy, sub: &Type, sup: &Type) -> bool {
    if sup.is_object() || sub == sup {
        return true;
    }
    match sub {
        Type::Variable { bounds, .. } | Type::Wildcard { upper: bounds, .. } => {
            effective_bounds(bounds)
                .iter()
                .any(|b| assignable_to(hierarchy, b, sup))
        }
        // A raw supertype accepts any of its parameterizations
        _ => hierarchy.closure(sub).iter().any(|t| {
            t == sup
                || (sup.args().is_empty() && t.raw_name().is_some() && t.raw_name() == sup.raw_name())
        }),
    }
}

fn effective_bounds(bounds: &[Type]) -> Vec<Type> {
    if bounds.is_empty() {
        vec![Type::object()]
    } else {
        bounds.to_vec()
    }
}

/// Does an observer of `observed` receive an event whose runtime type is `event_type`
pub fn is_event_assignable(hierarchy: &dyn TypeHierarchy, observed: &Type, event_type: &Type) -> bool {
    match (observed, event_type) {
        (Type::Class(o), Type::Class(e)) => o == e,
        // Raw observers receive every parameterization
        (Type::Class(o), Type::Parameterized { raw, .. }) => o == raw,
        (Type::Parameterized { raw, args }, Type::Class(e)) => {
            raw == e && args.iter().all(Type::is_unbounded)
        }
        (
            Type::Parameterized { raw: o, args: oargs },
            Type::Parameterized { raw: e, args: eargs },
        ) => {
            o == e
                && oargs.len() == eargs.len()
                && oargs
                    .iter()
                    .zip(eargs)
                    .all(|(o, e)| event_parameter_matches(hierarchy, o, e))
        }
        (Type::Variable { bounds, .. }, e) => effective_bounds(bounds)
            .iter()
            .all(|b| assignable_to(hierarchy, e, b)),
        _ => false,
    }
}

fn event_parameter_matches(hierarchy: &dyn TypeHierarchy, observed: &Type, event: &Type) -> bool {
    match observed {
        Type::Wildcard { upper, lower } => {
            upper.iter().all(|u| assignable_to(hierarchy, event, u))
                && lower.iter().all(|l| assignable_to(hierarchy, l, event))
        }
        Type::Variable { bounds, .. } => effective_bounds(bounds)
            .iter()
            .all(|b| assignable_to(hierarchy, event, b)),
        actual => match (actual, event) {
            (Type::Class(o), Type::Class(e)) => o == e,
            _ => is_event_assignable(hierarchy, actual, event),
        },
    }
}

/// Does any type of the closure satisfy the required type
pub fn matches_any(hierarchy: &dyn TypeHierarchy, required: &Type, bean_types: &[Type]) -> bool {
    bean_types
        .iter()
        .any(|bean_type| is_assignable(hierarchy, required, bean_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::reflection::FlatHierarchy;

    fn list(arg: Type) -> Type {
        Type::parameterized("List", vec![arg])
    }

    #[test]
    fn raw_and_parameterized_types() {
        let h = &FlatHierarchy;
        assert!(is_assignable(h, &Type::class("Foo"), &Type::class("Foo")));
        assert!(!is_assignable(h, &Type::class("Foo"), &Type::class("Bar")));
        assert!(is_assignable(h, &Type::class("List"), &list(Type::object())));
        assert!(!is_assignable(h, &Type::class("List"), &list(Type::class("String"))));
        assert!(is_assignable(h, &list(Type::class("String")), &list(Type::class("String"))));
        assert!(!is_assignable(h, &list(Type::class("String")), &list(Type::class("Integer"))));
    }

    #[test]
    fn wildcards_are_satisfied_by_their_bounds() {
        let h = &FlatHierarchy;
        assert!(is_assignable(h, &list(Type::wildcard()), &list(Type::class("String"))));
        assert!(is_assignable(
            h,
            &list(Type::extends(Type::class("String"))),
            &list(Type::class("String"))
        ));
        assert!(!is_assignable(
            h,
            &list(Type::extends(Type::class("Number"))),
            &list(Type::class("String"))
        ));
    }

    #[test]
    fn bean_type_variables_match_within_bounds() {
        let h = &FlatHierarchy;
        assert!(is_assignable(h, &list(Type::class("String")), &list(Type::variable("T"))));
        assert!(!is_assignable(
            h,
            &list(Type::class("String")),
            &list(Type::bounded_variable("T", vec![Type::class("Number")]))
        ));
    }

    #[test]
    fn top_level_wildcards_are_never_required() {
        assert!(!is_assignable(&FlatHierarchy, &Type::wildcard(), &Type::class("Foo")));
    }

    #[test]
    fn events_match_raw_observers() {
        let h = &FlatHierarchy;
        assert!(is_event_assignable(h, &Type::class("List"), &list(Type::class("String"))));
        assert!(is_event_assignable(h, &list(Type::wildcard()), &list(Type::class("String"))));
        assert!(!is_event_assignable(
            h,
            &list(Type::class("Integer")),
            &list(Type::class("String"))
        ));
        assert!(is_event_assignable(h, &Type::variable("T"), &Type::class("Foo")));
    }
}
