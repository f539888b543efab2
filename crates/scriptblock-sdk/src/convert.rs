//! Conversions between `ScriptValue` and native primitive kinds.
//!
//! `ToScript` is used for arguments travelling into the script, `FromScript`
//! for the value a script function returns. Numbers follow script semantics:
//! every numeric kind travels as an `f64`, and converting back to an integer
//! truncates toward zero and wraps to the target width.

use crate::error::{MarshalError, MarshalResult};
use crate::value::{NativeHandle, ScriptValue};

/// Convert from a script value to a native kind.
pub trait FromScript: Sized {
    /// Convert, returning an error if the script value does not fit.
    fn from_script(value: &ScriptValue) -> MarshalResult<Self>;
}

/// Convert from a native kind to a script value.
pub trait ToScript {
    /// Convert to a script value.
    fn to_script(self) -> ScriptValue;
}

fn incompatible(expected: &str, value: &ScriptValue) -> MarshalError {
    MarshalError::IncompatibleReturn {
        expected: expected.to_string(),
        got: value.type_name().to_string(),
    }
}

/// Truncate a script number toward zero, widened to i128 so the caller can
/// wrap it to any native width.
fn truncate_number(expected: &str, value: &ScriptValue) -> MarshalResult<i128> {
    match value {
        ScriptValue::Number(n) if n.is_finite() => Ok(n.trunc() as i128),
        ScriptValue::Number(n) => Err(MarshalError::OutOfRange {
            expected: expected.to_string(),
            value: n.to_string(),
        }),
        ScriptValue::Bool(b) => Ok(*b as i128),
        other => Err(incompatible(expected, other)),
    }
}

macro_rules! int_conversions {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromScript for $ty {
                fn from_script(value: &ScriptValue) -> MarshalResult<Self> {
                    truncate_number(stringify!($ty), value).map(|n| n as $ty)
                }
            }

            impl ToScript for $ty {
                fn to_script(self) -> ScriptValue {
                    ScriptValue::Number(self as f64)
                }
            }
        )*
    };
}

int_conversions!(i8, u8, i16, u16, i32, u32, i64, u64);

impl FromScript for f64 {
    fn from_script(value: &ScriptValue) -> MarshalResult<Self> {
        match value {
            ScriptValue::Number(n) => Ok(*n),
            ScriptValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            other => Err(incompatible("f64", other)),
        }
    }
}

impl ToScript for f64 {
    fn to_script(self) -> ScriptValue {
        ScriptValue::Number(self)
    }
}

impl FromScript for f32 {
    fn from_script(value: &ScriptValue) -> MarshalResult<Self> {
        f64::from_script(value)
            .map(|n| n as f32)
            .map_err(|_| incompatible("f32", value))
    }
}

impl ToScript for f32 {
    fn to_script(self) -> ScriptValue {
        ScriptValue::Number(self as f64)
    }
}

impl FromScript for bool {
    fn from_script(value: &ScriptValue) -> MarshalResult<Self> {
        match value {
            ScriptValue::Bool(b) => Ok(*b),
            ScriptValue::Number(n) => Ok(*n != 0.0 && !n.is_nan()),
            other => Err(incompatible("bool", other)),
        }
    }
}

impl ToScript for bool {
    fn to_script(self) -> ScriptValue {
        ScriptValue::Bool(self)
    }
}

impl FromScript for String {
    fn from_script(value: &ScriptValue) -> MarshalResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| incompatible("string", value))
    }
}

impl ToScript for String {
    fn to_script(self) -> ScriptValue {
        ScriptValue::String(self)
    }
}

impl ToScript for &str {
    fn to_script(self) -> ScriptValue {
        ScriptValue::String(self.to_string())
    }
}

impl FromScript for NativeHandle {
    fn from_script(value: &ScriptValue) -> MarshalResult<Self> {
        value.as_handle().ok_or_else(|| incompatible("handle", value))
    }
}

impl ToScript for NativeHandle {
    fn to_script(self) -> ScriptValue {
        ScriptValue::Handle(self)
    }
}

// Option<T>: nullish <-> None
impl<T: FromScript> FromScript for Option<T> {
    fn from_script(value: &ScriptValue) -> MarshalResult<Self> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_script(value).map(Some)
        }
    }
}

impl<T: ToScript> ToScript for Option<T> {
    fn to_script(self) -> ScriptValue {
        match self {
            Some(v) => v.to_script(),
            None => ScriptValue::Null,
        }
    }
}

// Unit type (for functions that return void)
impl ToScript for () {
    fn to_script(self) -> ScriptValue {
        ScriptValue::Undefined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{HandleKind, ObjectRef};

    #[test]
    fn test_integer_truncation_and_wrapping() {
        assert_eq!(i32::from_script(&ScriptValue::Number(10.0)), Ok(10));
        assert_eq!(i32::from_script(&ScriptValue::Number(-2.9)), Ok(-2));
        assert_eq!(u8::from_script(&ScriptValue::Number(257.0)), Ok(1));
        assert_eq!(i8::from_script(&ScriptValue::Number(128.0)), Ok(-128));
        assert_eq!(u64::from_script(&ScriptValue::Bool(true)), Ok(1));
    }

    #[test]
    fn test_integer_rejects_non_numbers() {
        let err = i32::from_script(&ScriptValue::Object(ObjectRef(1))).unwrap_err();
        assert_eq!(
            err,
            MarshalError::IncompatibleReturn {
                expected: "i32".to_string(),
                got: "object".to_string(),
            }
        );
        assert!(i64::from_script(&ScriptValue::String("5".into())).is_err());
        assert!(matches!(
            i32::from_script(&ScriptValue::Number(f64::NAN)),
            Err(MarshalError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(f64::from_script(&ScriptValue::Number(2.5)), Ok(2.5));
        assert_eq!(f32::from_script(&ScriptValue::Number(0.5)), Ok(0.5));
        assert!(f32::from_script(&ScriptValue::Null).is_err());
        assert_eq!(1.5f32.to_script(), ScriptValue::Number(1.5));
    }

    #[test]
    fn test_bool_conversions() {
        assert_eq!(bool::from_script(&ScriptValue::Bool(true)), Ok(true));
        assert_eq!(bool::from_script(&ScriptValue::Number(3.0)), Ok(true));
        assert_eq!(bool::from_script(&ScriptValue::Number(0.0)), Ok(false));
        assert!(bool::from_script(&ScriptValue::String("true".into())).is_err());
    }

    #[test]
    fn test_option_and_unit() {
        assert_eq!(Option::<i32>::from_script(&ScriptValue::Null), Ok(None));
        assert_eq!(Option::<i32>::from_script(&ScriptValue::Number(4.0)), Ok(Some(4)));
        assert_eq!(None::<i32>.to_script(), ScriptValue::Null);
        assert_eq!(().to_script(), ScriptValue::Undefined);
    }

    #[test]
    fn test_handle_conversion() {
        let h = NativeHandle::new(9, HandleKind::Pointer);
        assert_eq!(NativeHandle::from_script(&h.to_script()), Ok(h));
        assert!(NativeHandle::from_script(&ScriptValue::Number(9.0)).is_err());
    }
}
