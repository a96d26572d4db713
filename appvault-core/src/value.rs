/*!
Typed preference values and the inference rule applied to untyped JSON leaves.
*/

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A single preference value with its primitive type made explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Float(f32),
    Boolean(bool),
}

/// Classify an untyped JSON leaf.
///
/// Numbers with no fractional part become [`TypedValue::Integer`] (saturating
/// at the `i64` bounds), all other numbers become [`TypedValue::Float`].
/// Returns `None` for null, arrays and objects.
pub fn infer(value: &serde_json::Value) -> Option<TypedValue> {
    use serde_json::Value;

    match value {
        Value::String(s) => Some(TypedValue::String(s.clone())),
        Value::Bool(b) => Some(TypedValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(TypedValue::Integer(i));
            }
            if let Some(u) = n.as_u64() {
                return Some(TypedValue::Integer(i64::try_from(u).unwrap_or(i64::MAX)));
            }
            let f = n.as_f64()?;
            if f == f.floor() {
                // `as` saturates out-of-range values
                Some(TypedValue::Integer(f as i64))
            } else {
                Some(TypedValue::Float(f as f32))
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl TypedValue {
    /// Short tag name used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            TypedValue::String(_) => "string",
            TypedValue::Integer(_) => "integer",
            TypedValue::Float(_) => "float",
            TypedValue::Boolean(_) => "boolean",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::String(s) => f.write_str(s),
            TypedValue::Integer(i) => write!(f, "{i}"),
            TypedValue::Float(x) => write!(f, "{x}"),
            TypedValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::String(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Integer(value)
    }
}

impl From<f32> for TypedValue {
    fn from(value: f32) -> Self {
        TypedValue::Float(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Boolean(value)
    }
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TypedValue::String(s) => serializer.serialize_str(s),
            TypedValue::Integer(i) => serializer.serialize_i64(*i),
            TypedValue::Float(x) => serializer.serialize_f32(*x),
            TypedValue::Boolean(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for TypedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        infer(&raw).ok_or_else(|| D::Error::custom("expected a string, number or boolean"))
    }
}

/// Flat key/value content of one preference store.
///
/// Deserialization drops entries whose value is not a supported leaf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, serde_json::Value>")]
pub struct PreferenceMap(BTreeMap<String, TypedValue>);

impl PreferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<TypedValue>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&TypedValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypedValue)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, serde_json::Value>> for PreferenceMap {
    fn from(raw: BTreeMap<String, serde_json::Value>) -> Self {
        Self(
            raw.into_iter()
                .filter_map(|(key, value)| infer(&value).map(|typed| (key, typed)))
                .collect(),
        )
    }
}

impl FromIterator<(String, TypedValue)> for PreferenceMap {
    fn from_iter<I: IntoIterator<Item = (String, TypedValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PreferenceMap {
    type Item = (&'a String, &'a TypedValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, TypedValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integral_numbers_are_integers() {
        assert_eq!(infer(&json!(42)), Some(TypedValue::Integer(42)));
        assert_eq!(infer(&json!(-7)), Some(TypedValue::Integer(-7)));
        assert_eq!(infer(&json!(3.0)), Some(TypedValue::Integer(3)));
        assert_eq!(infer(&json!(0.0)), Some(TypedValue::Integer(0)));
    }

    #[test]
    fn test_fractional_numbers_are_floats() {
        assert_eq!(infer(&json!(1.5)), Some(TypedValue::Float(1.5)));
        assert_eq!(infer(&json!(-0.25)), Some(TypedValue::Float(-0.25)));
    }

    #[test]
    fn test_out_of_range_integral_value_stays_integer() {
        assert_eq!(infer(&json!(1e20)), Some(TypedValue::Integer(i64::MAX)));
        assert_eq!(infer(&json!(u64::MAX)), Some(TypedValue::Integer(i64::MAX)));
    }

    #[test]
    fn test_strings_and_booleans_map_directly() {
        assert_eq!(infer(&json!("x")), Some(TypedValue::String("x".to_string())));
        assert_eq!(infer(&json!("123456")), Some(TypedValue::String("123456".to_string())));
        assert_eq!(infer(&json!(true)), Some(TypedValue::Boolean(true)));
    }

    #[test]
    fn test_unsupported_kinds_are_rejected() {
        assert_eq!(infer(&json!(null)), None);
        assert_eq!(infer(&json!([1, 2])), None);
        assert_eq!(infer(&json!({"a": 1})), None);
    }

    #[test]
    fn test_preference_map_drops_nested_values() {
        let map: PreferenceMap =
            serde_json::from_str(r#"{"uid":"1","count":3,"nested":{"a":1},"list":[1],"gone":null}"#)
                .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("count"), Some(&TypedValue::Integer(3)));
        assert!(map.get("nested").is_none());
    }

    #[test]
    fn test_integer_valued_float_does_not_round_trip() {
        let mut map = PreferenceMap::new();
        map.insert("ratio", 2.0f32);
        let json = serde_json::to_string(&map).unwrap();
        let back: PreferenceMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("ratio"), Some(&TypedValue::Integer(2)));
    }

    #[test]
    fn test_display_for_identity_lookup() {
        assert_eq!(TypedValue::Integer(123456).to_string(), "123456");
        assert_eq!(TypedValue::from("Alice").to_string(), "Alice");
    }
}
