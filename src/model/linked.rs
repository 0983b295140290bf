//! linked.rs
//! Per-tick aggregates over the samples of several sensors.
//! - `Link` names a field of the sample published by a given sensor
//! - `Derived` fields compute from links and are memoized until the next `sync`
//! - The aggregate holds shared references to that tick's samples and is rebuilt every tick

use crate::{
    component::AsAny,
    error::ModelError,
    model::{
        data_model::{DataModel, FieldCache},
        value::{Columns, Formatter, Scalar, Value, default_columns},
    },
    utils::short_type_name,
};
use std::{collections::HashMap, fmt, sync::Arc};

/// "Field `source_field` of the sample whose publisher is `publisher`",
/// readable on the aggregate as `name`.
#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub name: &'static str,
    pub publisher: &'static str,
    pub source_field: &'static str,
    formatter: Option<Formatter>,
}

impl Link {
    pub const fn new(
        name: &'static str,
        publisher: &'static str,
        source_field: &'static str,
    ) -> Self {
        Self {
            name,
            publisher,
            source_field,
            formatter: None,
        }
    }

    /// Overrides the source field's own formatter in the aggregate's columns.
    pub const fn formatted(self, formatter: Formatter) -> Self {
        Self {
            formatter: Some(formatter),
            ..self
        }
    }
}

/// Aggregate-level field computed from linked values.
pub struct Derived<L> {
    pub name: &'static str,
    compute: fn(&L) -> Result<Value, ModelError>,
    formatter: Option<Formatter>,
}

impl<L> Derived<L> {
    pub const fn new(name: &'static str, compute: fn(&L) -> Result<Value, ModelError>) -> Self {
        Self {
            name,
            compute,
            formatter: None,
        }
    }

    pub const fn formatted(self, formatter: Formatter) -> Self {
        Self {
            formatter: Some(formatter),
            ..self
        }
    }
}

impl<L> Clone for Derived<L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L> Copy for Derived<L> {}

impl<L> fmt::Debug for Derived<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived").field("name", &self.name).finish()
    }
}

/// Samples bound by the last `sync`, plus the memo table of derived fields.
#[derive(Debug, Default)]
pub struct Binding {
    sources: HashMap<String, Arc<dyn DataModel>>,
    cache: FieldCache,
}

impl Binding {
    /// Binds a sample under its publisher name; a later sample from the same
    /// publisher replaces the earlier one.
    pub fn bind(&mut self, sample: Arc<dyn DataModel>) {
        self.sources
            .insert(sample.publisher_name().to_string(), sample);
    }

    pub fn source(&self, publisher: &str) -> Option<&Arc<dyn DataModel>> {
        self.sources.get(publisher)
    }

    pub fn cache(&self) -> &FieldCache {
        &self.cache
    }

    pub fn reset(&mut self) {
        self.sources.clear();
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// User-declared aggregate of linked fields.
///
/// Implementors declare `links()` (and optionally `derived()`) and embed a
/// `Binding`; everything else is provided.
pub trait LinkedDataModel: Default + Send + Sync + fmt::Debug + 'static {
    fn links() -> &'static [Link];

    fn derived() -> &'static [Derived<Self>] {
        &[]
    }

    fn binding(&self) -> &Binding;

    fn binding_mut(&mut self) -> &mut Binding;

    /// Binds this tick's samples by publisher name and drops every memoized
    /// derived value. Samples no link asks for are ignored.
    fn sync(&mut self, samples: &[Arc<dyn DataModel>]) {
        let binding = self.binding_mut();
        binding.reset();
        for sample in samples {
            let publisher = sample.publisher_name();
            if Self::links().iter().any(|l| l.publisher == publisher) {
                binding.bind(Arc::clone(sample));
            }
        }
    }

    /// Value of a linked field, read through its bound source.
    fn link(&self, name: &str) -> Result<Value, ModelError> {
        let link = Self::links()
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| ModelError::UnknownField {
                model: short_type_name::<Self>().to_string(),
                field: name.to_string(),
            })?;
        let source =
            self.binding()
                .source(link.publisher)
                .ok_or_else(|| ModelError::LinkNotBound {
                    field: link.name.to_string(),
                    publisher: link.publisher.to_string(),
                })?;
        source
            .get(link.source_field)
            .ok_or_else(|| ModelError::UnknownField {
                model: source.model_name().to_string(),
                field: link.source_field.to_string(),
            })
    }

    /// Value of a derived field, computed at most once per `sync`.
    fn derive(&self, name: &str) -> Result<Value, ModelError> {
        let derived = Self::derived()
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ModelError::UnknownField {
                model: short_type_name::<Self>().to_string(),
                field: name.to_string(),
            })?;
        self.binding()
            .cache()
            .get_or_try_insert_with(derived.name, || (derived.compute)(self))
    }

    /// Linked or derived field by name.
    fn value(&self, name: &str) -> Result<Value, ModelError> {
        if Self::links().iter().any(|l| l.name == name) {
            self.link(name)
        } else {
            self.derive(name)
        }
    }

    fn value_f64(&self, name: &str) -> Result<f64, ModelError> {
        self.value(name)?
            .as_f64()
            .ok_or_else(|| ModelError::TypeMismatch {
                field: name.to_string(),
                expected: "numeric",
            })
    }

    fn value_scalar(&self, name: &str) -> Result<Scalar, ModelError> {
        match self.value(name)? {
            Value::Scalar(s) => Ok(s),
            _ => Err(ModelError::TypeMismatch {
                field: name.to_string(),
                expected: "a scalar",
            }),
        }
    }

    fn value_vector(&self, name: &str) -> Result<Vec<f64>, ModelError> {
        match self.value(name)? {
            Value::Vector(v) => Ok(v),
            _ => Err(ModelError::TypeMismatch {
                field: name.to_string(),
                expected: "a vector",
            }),
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        Self::links()
            .iter()
            .find(|l| l.name == name)
            .is_some_and(|l| self.binding().source(l.publisher).is_some())
    }

    /// Columns of every bound link followed by every derived field that
    /// resolves. Unbound links and failing derived fields are left out.
    fn extract(&self) -> Columns {
        let mut columns = Columns::new();
        for link in Self::links() {
            let Some(source) = self.binding().source(link.publisher) else {
                continue;
            };
            let projected = match link.formatter {
                Some(format) => source.get(link.source_field).map(|value| {
                    format(&format!("{}-{}", link.publisher, link.source_field), &value)
                }),
                None => source.extract_field(link.source_field),
            };
            if let Some(projected) = projected {
                columns.merge(projected);
            }
        }
        for derived in Self::derived() {
            if let Ok(value) = self.derive(derived.name) {
                let format = derived.formatter.unwrap_or(default_columns);
                columns.merge(format(derived.name, &value));
            }
        }
        columns
    }
}

/// Object-safe view of an aggregate, as stored in the log and reference queues.
pub trait Record: AsAny + fmt::Debug {
    fn model_name(&self) -> &'static str;

    fn columns(&self) -> Columns;
}

impl<L: LinkedDataModel> Record for L {
    fn model_name(&self) -> &'static str {
        short_type_name::<L>()
    }

    fn columns(&self) -> Columns {
        LinkedDataModel::extract(self)
    }
}

/// Downcasts a queued record back to its aggregate type.
pub fn downcast_record<L: LinkedDataModel>(record: Arc<dyn Record>) -> Option<Arc<L>> {
    AsAny::as_any_arc(record).downcast::<L>().ok()
}
