//! Validate requested values against a key's declared [`ValueRange`].

use std::cmp::Ordering;

use crate::{
    Error, Result, Value,
    value::{ValueRange, ValueType, kind_name},
};

/// Check `requested` against `range`, returning it unchanged when accepted.
///
/// The range tag is examined first and only then is the payload interpreted,
/// so an enum member list is never mistaken for a type declaration.
pub fn coerce(range: &ValueRange, requested: Value) -> Result<Value> {
    match range {
        ValueRange::Free(ty) => {
            if ty.admits(&requested) {
                Ok(requested)
            } else {
                Err(mismatch(ty.type_string(), &requested))
            }
        }
        ValueRange::Enum(allowed) => {
            if allowed.contains(&requested) {
                Ok(requested)
            } else {
                Err(Error::InvalidEnumValue { value: requested })
            }
        }
        ValueRange::Flags(allowed) => {
            let Some(items) = requested.as_array() else {
                return Err(mismatch(ValueType::StringArray.type_string(), &requested));
            };
            let subset = items
                .iter()
                .all(|v| v.as_str().is_some_and(|s| allowed.iter().any(|a| a == s)));
            if subset {
                Ok(requested)
            } else {
                Err(Error::InvalidFlagsValue { value: requested })
            }
        }
        ValueRange::Bounded { min, max } => {
            let Some(ty) = ValueType::of(min) else {
                return Err(mismatch("number", min));
            };
            if !ty.admits(&requested) {
                return Err(mismatch(ty.type_string(), &requested));
            }
            let above_min = compare(&requested, min).is_some_and(|o| o != Ordering::Less);
            let below_max = compare(&requested, max).is_some_and(|o| o != Ordering::Greater);
            if above_min && below_max {
                Ok(requested)
            } else {
                Err(Error::OutOfRange {
                    value: requested,
                    min: min.clone(),
                    max: max.clone(),
                })
            }
        }
    }
}

/// Bounds of a [`ValueRange::Bounded`] range; `None` for every other range.
pub fn writable_range(range: &ValueRange) -> Option<(Value, Value)> {
    match range {
        ValueRange::Bounded { min, max } => Some((min.clone(), max.clone())),
        _ => None,
    }
}

/// Numeric ordering that stays exact for integers.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Build a [`Error::TypeMismatch`] for `found`.
fn mismatch(expected: &str, found: &Value) -> Error {
    Error::TypeMismatch {
        expected: expected.to_string(),
        found: kind_name(found).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn osd_sizes() -> ValueRange {
        ValueRange::Enum(vec![
            json!("disabled"),
            json!("small"),
            json!("medium"),
            json!("large"),
        ])
    }

    #[test]
    fn bounded_rejects_out_of_range() {
        let range = ValueRange::Bounded {
            min: json!(0),
            max: json!(100),
        };
        assert_eq!(coerce(&range, json!(100)).unwrap(), json!(100));
        assert!(matches!(
            coerce(&range, json!(150)),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            coerce(&range, json!(-1)),
            Err(Error::OutOfRange { .. })
        ));
        // A double never satisfies an integer range.
        assert!(matches!(
            coerce(&range, json!(50.0)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn enum_compares_by_value() {
        assert_eq!(coerce(&osd_sizes(), json!("small")).unwrap(), json!("small"));
        let err = coerce(&osd_sizes(), json!("huge")).unwrap_err();
        assert!(matches!(err, Error::InvalidEnumValue { .. }));
        assert!(err.is_value_rejected());
    }

    #[test]
    fn flags_must_be_subset() {
        let range = ValueRange::Flags(vec!["bold".into(), "italic".into()]);
        assert!(coerce(&range, json!([])).is_ok());
        assert!(coerce(&range, json!(["italic", "bold"])).is_ok());
        assert!(matches!(
            coerce(&range, json!(["underline"])),
            Err(Error::InvalidFlagsValue { .. })
        ));
        assert!(matches!(
            coerce(&range, json!("bold")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn free_requires_exact_type() {
        let range = ValueRange::Free(ValueType::Bool);
        assert!(coerce(&range, json!(true)).is_ok());
        assert!(matches!(
            coerce(&range, json!(1)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn writable_range_only_for_bounded() {
        let range = ValueRange::Bounded {
            min: json!(0.5),
            max: json!(2.0),
        };
        assert_eq!(writable_range(&range), Some((json!(0.5), json!(2.0))));
        assert_eq!(writable_range(&osd_sizes()), None);
        assert_eq!(writable_range(&ValueRange::Free(ValueType::Int32)), None);
    }

    proptest! {
        #[test]
        fn bounded_accepts_exactly_its_domain(
            min in -1000i64..1000,
            span in 0i64..1000,
            v in -3000i64..3000,
        ) {
            let max = min + span;
            let range = ValueRange::Bounded { min: json!(min), max: json!(max) };
            let got = coerce(&range, json!(v));
            if (min..=max).contains(&v) {
                prop_assert_eq!(got.unwrap(), json!(v));
            } else {
                prop_assert!(matches!(got, Err(Error::OutOfRange { .. })), "expected OutOfRange");
            }
        }

        #[test]
        fn double_bounds_accept_domain(v in 0.0f64..=1.0) {
            let range = ValueRange::Bounded { min: json!(0.0), max: json!(1.0) };
            prop_assert_eq!(coerce(&range, json!(v)).unwrap(), json!(v));
        }

        #[test]
        fn int32_free_type_round_trips(v in any::<i32>()) {
            let range = ValueRange::Free(ValueType::Int32);
            prop_assert_eq!(coerce(&range, json!(v)).unwrap(), json!(v));
        }

        #[test]
        fn flags_subsets_round_trip(mask in 0u8..8) {
            let nicks = ["a", "b", "c"];
            let range = ValueRange::Flags(nicks.iter().map(|s| s.to_string()).collect());
            let chosen: Vec<&str> = nicks
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| *s)
                .collect();
            prop_assert_eq!(coerce(&range, json!(chosen)).unwrap(), json!(chosen));
        }
    }
}
