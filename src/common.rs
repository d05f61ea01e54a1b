use std::borrow::Cow;
use std::fmt;

/// An attribute name.
///
/// Keys are compared and hashed by their string content, and may wrap either
/// a `'static` literal or an owned `String` without copying.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// Create a new `Key` from anything string-like.
    pub fn new(value: impl Into<Key>) -> Self {
        value.into()
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Key {
    fn from(value: &'static str) -> Self {
        Key(Cow::Borrowed(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(Cow::Owned(value))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A string attribute value, stored without copying when `'static`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StringValue(Cow<'static, str>);

impl From<&'static str> for StringValue {
    fn from(value: &'static str) -> Self {
        StringValue(Cow::Borrowed(value))
    }
}

impl From<String> for StringValue {
    fn from(value: String) -> Self {
        StringValue(Cow::Owned(value))
    }
}

impl fmt::Display for StringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A homogeneous array of attribute values.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Array {
    /// An array of booleans.
    Bool(Vec<bool>),
    /// An array of integers.
    I64(Vec<i64>),
    /// An array of floats.
    F64(Vec<f64>),
    /// An array of strings.
    String(Vec<StringValue>),
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            values: &[T],
            quoted: bool,
        ) -> fmt::Result {
            write!(f, "[")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                if quoted {
                    write!(f, "\"{value}\"")?;
                } else {
                    write!(f, "{value}")?;
                }
            }
            write!(f, "]")
        }

        match self {
            Array::Bool(values) => join(f, values, false),
            Array::I64(values) => join(f, values, false),
            Array::F64(values) => join(f, values, false),
            Array::String(values) => join(f, values, true),
        }
    }
}

/// An attribute value.
///
/// Attribute values are restricted to these scalar types and homogeneous
/// arrays of them; anything else must be converted by the caller before it
/// goes on a span.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer value.
    I64(i64),
    /// A 64-bit float value.
    F64(f64),
    /// A string value.
    String(StringValue),
    /// A homogeneous array of values.
    Array(Array),
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<Vec<bool>> for Value {
    fn from(values: Vec<bool>) -> Self {
        Value::Array(Array::Bool(values))
    }
}

impl From<Vec<i64>> for Value {
    fn from(values: Vec<i64>) -> Self {
        Value::Array(Array::I64(values))
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::Array(Array::F64(values))
    }
}

impl From<Vec<StringValue>> for Value {
    fn from(values: Vec<StringValue>) -> Self {
        Value::Array(Array::String(values))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(f),
            Value::I64(v) => v.fmt(f),
            Value::F64(v) => v.fmt(f),
            Value::String(v) => v.fmt(f),
            Value::Array(v) => v.fmt(f),
        }
    }
}

/// A single attribute: a [`Key`] paired with a [`Value`].
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute name.
    pub key: Key,
    /// The attribute value.
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_by_content() {
        let borrowed = Key::new("service.name");
        let owned = Key::from(String::from("service.name"));
        assert_eq!(borrowed, owned);
        assert_eq!(borrowed.as_str(), "service.name");
        assert!(Key::new("a") < Key::new("b"));
    }

    #[test]
    fn scalar_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::I64(42));
        assert_eq!(Value::from(42i32), Value::I64(42));
        assert_eq!(Value::from(1.5), Value::F64(1.5));
        assert_eq!(Value::from("x"), Value::String("x".into()));
        assert_eq!(
            Value::from(String::from("x")),
            Value::String("x".into())
        );
    }

    #[test]
    fn rendering() {
        assert_eq!(Value::from(false).to_string(), "false");
        assert_eq!(Value::from(vec![1i64, 2, 3]).to_string(), "[1,2,3]");
        assert_eq!(
            Value::from(vec![StringValue::from("a"), StringValue::from("b")]).to_string(),
            "[\"a\",\"b\"]"
        );
    }
}
