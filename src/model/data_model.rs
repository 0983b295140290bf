//! data_model.rs
//! Per-sensor samples with declarative loggable fields.
//! - Each model type lists its fields once, in a `static` array of `Field` descriptors
//! - Cached fields are computed on first access and memoized for that sample only
//! - `DataModel` is the object-safe view the logger and linked models work with

use crate::{
    component::AsAny,
    model::value::{Columns, Formatter, Value, default_columns},
    utils::short_type_name,
};
use parking_lot::Mutex;
use std::{collections::HashMap, fmt};

/// Descriptor of one loggable field of model `M`.
pub struct Field<M> {
    pub name: &'static str,
    getter: fn(&M) -> Value,
    formatter: Option<Formatter>,
    cached: bool,
}

impl<M> Field<M> {
    pub const fn new(name: &'static str, getter: fn(&M) -> Value) -> Self {
        Self {
            name,
            getter,
            formatter: None,
            cached: false,
        }
    }

    /// Compute on first access, then reuse the value for the rest of the sample.
    pub const fn cached(self) -> Self {
        Self {
            cached: true,
            ..self
        }
    }

    pub const fn formatted(self, formatter: Formatter) -> Self {
        Self {
            formatter: Some(formatter),
            ..self
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn format(&self, column: &str, value: &Value) -> Columns {
        self.formatter.unwrap_or(default_columns)(column, value)
    }
}

impl<M> Clone for Field<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Field<M> {}

impl<M> fmt::Debug for Field<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("cached", &self.cached)
            .field("formatted", &self.formatter.is_some())
            .finish()
    }
}

/// Memo table for cached fields, keyed by field name.
#[derive(Debug, Default)]
pub struct FieldCache {
    values: Mutex<HashMap<&'static str, Value>>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized value or computes and stores it.
    ///
    /// `compute` runs without the lock held, so it may read other cached
    /// fields of the same model.
    pub fn get_or_insert_with(&self, key: &'static str, compute: impl FnOnce() -> Value) -> Value {
        if let Some(value) = self.values.lock().get(key) {
            return value.clone();
        }
        let value = compute();
        self.values.lock().entry(key).or_insert(value).clone()
    }

    /// Like `get_or_insert_with`; errors are returned and not memoized.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &'static str,
        compute: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, E> {
        if let Some(value) = self.values.lock().get(key) {
            return Ok(value.clone());
        }
        let value = compute()?;
        Ok(self.values.lock().entry(key).or_insert(value).clone())
    }

    pub fn clear(&self) {
        self.values.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bookkeeping every sample carries: who published it and its field cache.
#[derive(Debug, Default)]
pub struct ModelMeta {
    publisher: String,
    cache: FieldCache,
}

impl ModelMeta {
    pub fn new(publisher: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
            cache: FieldCache::new(),
        }
    }

    pub fn publisher(&self) -> &str {
        &self.publisher
    }

    pub fn cache(&self) -> &FieldCache {
        &self.cache
    }
}

/// Implemented by concrete sample types.
///
/// ```ignore
/// static FIELDS: [Field<BarometerData>; 2] = [
///     Field::new("pressure", |m: &BarometerData| m.pressure.into()),
///     Field::new("altitude", |m: &BarometerData| m.altitude().into()).cached(),
/// ];
/// ```
pub trait Loggable: Sized + Send + Sync + fmt::Debug + 'static {
    fn fields() -> &'static [Field<Self>];

    fn meta(&self) -> &ModelMeta;
}

/// Object-safe view of one sensor sample.
pub trait DataModel: AsAny + fmt::Debug {
    fn publisher_name(&self) -> &str;

    fn model_name(&self) -> &'static str;

    fn field_names(&self) -> Vec<&'static str>;

    /// Raw value of a declared field.
    fn get(&self, field: &str) -> Option<Value>;

    /// Columns of one field, named `"{publisher}-{field}"` unless a
    /// formatter says otherwise.
    fn extract_field(&self, field: &str) -> Option<Columns>;

    /// All fields, flattened in declaration order.
    fn extract(&self) -> Columns;
}

fn field_value<M: Loggable>(model: &M, field: &Field<M>) -> Value {
    if field.cached {
        model
            .meta()
            .cache()
            .get_or_insert_with(field.name, || (field.getter)(model))
    } else {
        (field.getter)(model)
    }
}

fn field_columns<M: Loggable>(model: &M, field: &Field<M>) -> Columns {
    let column = format!("{}-{}", model.meta().publisher(), field.name);
    field.format(&column, &field_value(model, field))
}

impl<M: Loggable> DataModel for M {
    fn publisher_name(&self) -> &str {
        self.meta().publisher()
    }

    fn model_name(&self) -> &'static str {
        short_type_name::<M>()
    }

    fn field_names(&self) -> Vec<&'static str> {
        M::fields().iter().map(|f| f.name).collect()
    }

    fn get(&self, field: &str) -> Option<Value> {
        M::fields()
            .iter()
            .find(|f| f.name == field)
            .map(|f| field_value(self, f))
    }

    fn extract_field(&self, field: &str) -> Option<Columns> {
        M::fields()
            .iter()
            .find(|f| f.name == field)
            .map(|f| field_columns(self, f))
    }

    fn extract(&self) -> Columns {
        let mut columns = Columns::new();
        for field in M::fields() {
            columns.merge(field_columns(self, field));
        }
        columns
    }
}
