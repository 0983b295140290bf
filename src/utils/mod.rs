//! Shared helpers: mission metrics, report export, tick pacing.

pub mod export;
pub mod metrics;
pub mod timing;

/// Last path segment of a type name, without generic arguments.
///
/// `cansat_runtime::sim::BarometerData` → `BarometerData`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let plain = match full.find('<') {
        Some(idx) => &full[..idx],
        None => full,
    };
    plain.rsplit("::").next().unwrap_or(plain)
}
