//! Keyed bag of event fields with deferred value producers.
//!
//! A [`FieldHolder`] keeps two maps: static values and dynamic producers.
//! Values are classified once, when they are inserted. Primitives (null,
//! booleans, numbers, strings) are stored as they are; arrays and objects are
//! pre-encoded into a JSON string so the transmitted payload only ever holds
//! primitives at the top level.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Zero-argument producer evaluated once per event construction.
pub type DynamicField = Arc<dyn Fn() -> Value + Send + Sync>;

/// Merge-on-write container of static and dynamic field values.
///
/// Mutation needs `&mut self`; a holder is never shared with the worker pool,
/// events crossing that boundary carry their own copy.
#[derive(Clone, Default)]
pub struct FieldHolder {
    fields: BTreeMap<String, Value>,
    dynamic: BTreeMap<String, DynamicField>,
}

impl FieldHolder {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a static field, replacing any previous value under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `name` is empty or `value` cannot
    /// be serialized.
    pub fn add_field<T>(&mut self, name: impl Into<String>, value: T) -> Result<()>
    where
        T: Serialize,
    {
        let name = validate_name(name.into())?;
        let value = to_field_value(&value)?;
        self.fields.insert(name, value);
        Ok(())
    }

    /// Adds every `(name, value)` pair, last write wins.
    ///
    /// Either all pairs are merged or none are.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for the first empty name or
    /// unserializable value.
    pub fn add_all<I, K, T>(&mut self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Serialize,
    {
        let staged = data
            .into_iter()
            .map(|(name, value)| Ok((validate_name(name.into())?, to_field_value(&value)?)))
            .collect::<Result<Vec<_>>>()?;
        self.fields.extend(staged);
        Ok(())
    }

    /// Registers a producer for `name`, replacing any previous producer.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `name` is empty.
    pub fn add_dynamic_field<F>(&mut self, name: impl Into<String>, producer: F) -> Result<()>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let name = validate_name(name.into())?;
        self.dynamic.insert(name, Arc::new(producer));
        Ok(())
    }

    /// Merges another holder's static and dynamic maps into this one.
    pub fn add(&mut self, other: &FieldHolder) {
        self.fields.extend(other.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.dynamic.extend(other.dynamic.iter().map(|(k, f)| (k.clone(), Arc::clone(f))));
    }

    /// Invokes every producer exactly once and stores the results as static
    /// fields. Producers stay registered.
    pub fn evaluate_dynamic_fields(&mut self) {
        for (name, producer) in &self.dynamic {
            self.fields.insert(name.clone(), classify(producer()));
        }
    }

    /// Evaluates the producers and returns a holder with static fields only.
    pub(crate) fn into_evaluated(mut self) -> Self {
        self.evaluate_dynamic_fields();
        self.dynamic.clear();
        self
    }

    /// Returns the static value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Static fields, in key order.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Names of the registered producers.
    pub fn dynamic_field_names(&self) -> impl Iterator<Item = &str> {
        self.dynamic.keys().map(String::as_str)
    }

    /// Number of static fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no static fields. Producers are not counted.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Removes all static fields and producers.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.dynamic.clear();
    }

    /// Encodes the static fields as a JSON object.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::Object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl fmt::Debug for FieldHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHolder")
            .field("fields", &self.fields)
            .field("dynamic", &self.dynamic.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Serializes `value` and classifies it for transmission.
///
/// # Errors
///
/// Returns `Error::InvalidArgument` if serialization fails.
pub fn to_field_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map(classify)
        .map_err(|e| Error::invalid_argument("value", format!("value is not serializable: {e}")))
}

fn classify(value: Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        primitive => primitive,
    }
}

fn validate_name(name: String) -> Result<String> {
    if name.is_empty() {
        return Err(Error::invalid_argument("name", "field name must not be empty"));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[test]
    fn add_merges_last_write_wins() {
        let mut a = FieldHolder::new();
        a.add_all([("x", 1), ("y", 2)]).unwrap();
        let mut b = FieldHolder::new();
        b.add_all([("y", 3), ("z", 4)]).unwrap();

        a.add(&b);

        assert_eq!(a.to_value(), json!({"x": 1, "y": 3, "z": 4}));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn add_field_overwrites() {
        let mut holder = FieldHolder::new();
        holder.add_field("key", "first").unwrap();
        holder.add_field("key", "second").unwrap();

        assert_eq!(holder.get("key"), Some(&json!("second")));
        assert_eq!(holder.len(), 1);
    }

    #[test]
    fn non_primitive_values_are_pre_encoded() {
        let mut holder = FieldHolder::new();
        holder.add_field("list", vec![1, 2, 3]).unwrap();
        holder.add_field("map", json!({"a": true})).unwrap();
        holder.add_field("number", 4.5).unwrap();
        holder.add_field("nothing", Option::<u8>::None).unwrap();

        assert_eq!(holder.get("list"), Some(&json!("[1,2,3]")));
        assert_eq!(holder.get("map"), Some(&json!("{\"a\":true}")));
        assert_eq!(holder.get("number"), Some(&json!(4.5)));
        assert_eq!(holder.get("nothing"), Some(&Value::Null));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut holder = FieldHolder::new();

        let err = holder.add_field("", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "name", .. }));

        let err = holder.add_dynamic_field("", || Value::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { name: "name", .. }));
    }

    #[test]
    fn add_all_is_atomic() {
        let mut holder = FieldHolder::new();
        let result = holder.add_all([("ok", 1), ("", 2)]);

        assert!(result.is_err());
        assert!(holder.is_empty());
    }

    #[test]
    fn dynamic_fields_overwrite_static_values_and_remain_registered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut holder = FieldHolder::new();
        holder.add_field("tick", 0).unwrap();
        holder
            .add_dynamic_field("tick", move || json!(counter.fetch_add(1, Ordering::SeqCst) + 1))
            .unwrap();

        holder.evaluate_dynamic_fields();
        assert_eq!(holder.get("tick"), Some(&json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        holder.evaluate_dynamic_fields();
        assert_eq!(holder.get("tick"), Some(&json!(2)));
        assert_eq!(holder.dynamic_field_names().collect::<Vec<_>>(), vec!["tick"]);
    }

    #[test]
    fn is_empty_ignores_dynamic_fields() {
        let mut holder = FieldHolder::new();
        holder.add_dynamic_field("later", || json!("value")).unwrap();

        assert!(holder.is_empty());

        let evaluated = holder.into_evaluated();
        assert!(!evaluated.is_empty());
        assert_eq!(evaluated.dynamic_field_names().count(), 0);
    }

    #[test]
    fn to_json_matches_wire_format() {
        let mut holder = FieldHolder::new();
        holder.add_field("field0", 0).unwrap();
        holder.add_field("field1", "x").unwrap();
        holder.add_field("field2", Value::Null).unwrap();

        assert_eq!(holder.to_json(), r#"{"field0":0,"field1":"x","field2":null}"#);
    }

    #[test]
    fn clear_removes_everything() {
        let mut holder = FieldHolder::new();
        holder.add_field("a", 1).unwrap();
        holder.add_dynamic_field("b", || json!(2)).unwrap();

        holder.clear();

        assert!(holder.is_empty());
        assert_eq!(holder.dynamic_field_names().count(), 0);
    }
}
