use super::EntityDescriptor;
use crate::core::{Error, Record, Result, ScalarType, Value};
use chrono::{DateTime, Utc};

/// A typed entity the adapter can store.
///
/// Usually implemented with `#[derive(Entity)]`; a manual impl only has to
/// move fields in and out of a [`Record`].
pub trait Entity: Sized + Send + Sync {
    fn descriptor() -> &'static EntityDescriptor;

    fn to_record(&self) -> Record;

    fn from_record(record: Record) -> Result<Self>;
}

/// Conversion between a Rust field type and a scalar attribute value.
pub trait FieldValue: Sized {
    const SCALAR: ScalarType;
    const REQUIRED: bool = true;

    /// `None` means the attribute is absent.
    fn to_value(&self) -> Option<Value>;

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self>;
}

fn missing(attribute: &str) -> Error {
    Error::decoding(attribute, "required attribute is missing")
}

fn mismatch(attribute: &str, expected: ScalarType, found: &Value) -> Error {
    Error::decoding(
        attribute,
        format!("expected {}, found {}", expected, found.scalar_type()),
    )
}

impl FieldValue for String {
    const SCALAR: ScalarType = ScalarType::String;

    fn to_value(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
        match value {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(mismatch(attribute, Self::SCALAR, &other)),
            None => Err(missing(attribute)),
        }
    }
}

macro_rules! integer_field {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                const SCALAR: ScalarType = ScalarType::Integer;

                fn to_value(&self) -> Option<Value> {
                    Some(Value::Integer(i64::from(*self)))
                }

                fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
                    match value {
                        Some(Value::Integer(i)) => <$ty>::try_from(i).map_err(|_| {
                            Error::decoding(
                                attribute,
                                format!("{} is out of range for {}", i, stringify!($ty)),
                            )
                        }),
                        Some(other) => Err(mismatch(attribute, Self::SCALAR, &other)),
                        None => Err(missing(attribute)),
                    }
                }
            }
        )*
    };
}

integer_field!(i8, i16, i32, i64, u8, u16, u32);

impl FieldValue for f64 {
    const SCALAR: ScalarType = ScalarType::Float;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Float(*self))
    }

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
        match value {
            Some(Value::Float(f)) => Ok(f),
            Some(Value::Integer(i)) => Ok(i as f64),
            Some(other) => Err(mismatch(attribute, Self::SCALAR, &other)),
            None => Err(missing(attribute)),
        }
    }
}

impl FieldValue for f32 {
    const SCALAR: ScalarType = ScalarType::Float;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Float(f64::from(*self)))
    }

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
        f64::from_value(attribute, value).map(|f| f as f32)
    }
}

impl FieldValue for bool {
    const SCALAR: ScalarType = ScalarType::Boolean;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Boolean(*self))
    }

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
        match value {
            Some(Value::Boolean(b)) => Ok(b),
            Some(other) => Err(mismatch(attribute, Self::SCALAR, &other)),
            None => Err(missing(attribute)),
        }
    }
}

impl FieldValue for Vec<u8> {
    const SCALAR: ScalarType = ScalarType::Binary;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Binary(self.clone()))
    }

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
        match value {
            Some(Value::Binary(bytes)) => Ok(bytes),
            Some(other) => Err(mismatch(attribute, Self::SCALAR, &other)),
            None => Err(missing(attribute)),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    const SCALAR: ScalarType = ScalarType::Timestamp;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Timestamp(*self))
    }

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
        match value {
            Some(Value::Timestamp(ts)) => Ok(ts),
            Some(other) => Err(mismatch(attribute, Self::SCALAR, &other)),
            None => Err(missing(attribute)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const SCALAR: ScalarType = T::SCALAR;
    const REQUIRED: bool = false;

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(FieldValue::to_value)
    }

    fn from_value(attribute: &str, value: Option<Value>) -> Result<Self> {
        match value {
            Some(value) => T::from_value(attribute, Some(value)).map(Some),
            None => Ok(None),
        }
    }
}

/// Writes one field into a record, skipping absent values.
#[doc(hidden)]
pub fn put_field<T: FieldValue>(record: &mut Record, attribute: &str, value: &T) {
    if let Some(value) = value.to_value() {
        record.insert(attribute.to_string(), value);
    }
}

/// Moves one field out of a record.
#[doc(hidden)]
pub fn take_field<T: FieldValue>(record: &mut Record, attribute: &str) -> Result<T> {
    T::from_value(attribute, record.remove(attribute))
}
