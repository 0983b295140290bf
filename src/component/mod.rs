//! Hardware-facing capabilities and the component registry.

pub mod manager;
pub mod sensor;

use crate::utils::short_type_name;
use std::{any::Any, fmt, sync::Arc};

pub use manager::ComponentManager;
pub use sensor::Sensor;

/// Upcast helper so trait objects can be downcast to their concrete type.
pub trait AsAny: Any + Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Category used by `ComponentManager::search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Sensor,
    Actuator,
    Transceiver,
    Logger,
    Other,
    Custom(&'static str),
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Sensor => f.write_str("sensor"),
            ComponentKind::Actuator => f.write_str("actuator"),
            ComponentKind::Transceiver => f.write_str("transceiver"),
            ComponentKind::Logger => f.write_str("logger"),
            ComponentKind::Other => f.write_str("other"),
            ComponentKind::Custom(name) => f.write_str(name),
        }
    }
}

/// Anything registered with the `ComponentManager`.
pub trait Component: AsAny {
    /// Registry key. Defaults to the type name.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Other
    }

    /// Sub-components registered alongside this one by a recursive append.
    fn members(&self) -> Vec<Arc<dyn Component>> {
        Vec::new()
    }
}

/// Downcasts a registered component to its concrete type.
pub fn downcast_component<T: Component>(component: Arc<dyn Component>) -> Option<Arc<T>> {
    AsAny::as_any_arc(component).downcast::<T>().ok()
}
