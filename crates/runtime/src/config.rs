//! Collector configuration
//!
//! Two tunables and a debug switch, with environment overrides so deployed
//! programs can be adjusted without a rebuild:
//!
//! - `SKEIN_MIN_HEAP` — floor for the collection threshold, in bytes
//! - `SKEIN_HEAP_GROWTH` — threshold growth factor after a collection
//! - `SKEIN_GC_STRESS` — `1` collects before every growing allocation,
//!   which surfaces missing-root bugs immediately
//!
//! Invalid values warn and fall back to the default rather than failing
//! startup.

/// Default minimum heap: 1 MiB.
pub const DEFAULT_MIN_HEAP: usize = 1024 * 1024;

/// Default growth factor applied to the live size after a collection.
pub const DEFAULT_HEAP_GROWTH: f64 = 1.5;

/// Collector tuning. `next_gc` after a collection is
/// `max(live_bytes * heap_growth, min_heap_size)`.
#[derive(Debug, Clone)]
pub struct GcConfig {
    pub heap_growth: f64,
    pub min_heap_size: usize,
    /// Collect before every growing allocation.
    pub stress: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            heap_growth: DEFAULT_HEAP_GROWTH,
            min_heap_size: DEFAULT_MIN_HEAP,
            stress: false,
        }
    }
}

impl GcConfig {
    /// Defaults overridden by whatever `SKEIN_*` variables are set.
    pub fn from_env() -> GcConfig {
        GcConfig {
            heap_growth: parse_heap_growth(std::env::var("SKEIN_HEAP_GROWTH").ok()),
            min_heap_size: parse_min_heap(std::env::var("SKEIN_MIN_HEAP").ok()),
            stress: std::env::var("SKEIN_GC_STRESS").map(|v| v == "1").unwrap_or(false),
        }
    }

    pub fn with_heap_growth(mut self, heap_growth: f64) -> Self {
        self.heap_growth = heap_growth;
        self
    }

    pub fn with_min_heap_size(mut self, min_heap_size: usize) -> Self {
        self.min_heap_size = min_heap_size;
        self
    }

    pub fn with_stress(mut self, stress: bool) -> Self {
        self.stress = stress;
        self
    }
}

/// Parse a growth factor. Factors at or below 1.0 would stop the threshold
/// from ever rising, so they are rejected with a warning.
fn parse_heap_growth(env_value: Option<String>) -> f64 {
    match env_value {
        Some(val) => match val.parse::<f64>() {
            Ok(growth) if growth > 1.0 => growth,
            Ok(_) => {
                eprintln!(
                    "Warning: SKEIN_HEAP_GROWTH='{}' must be greater than 1, using default {}",
                    val, DEFAULT_HEAP_GROWTH
                );
                DEFAULT_HEAP_GROWTH
            }
            Err(_) => {
                eprintln!(
                    "Warning: SKEIN_HEAP_GROWTH='{}' is not a valid number, using default {}",
                    val, DEFAULT_HEAP_GROWTH
                );
                DEFAULT_HEAP_GROWTH
            }
        },
        None => DEFAULT_HEAP_GROWTH,
    }
}

/// Parse a minimum heap size in bytes. Zero would collect on every
/// allocation, which is what `SKEIN_GC_STRESS` is for.
fn parse_min_heap(env_value: Option<String>) -> usize {
    match env_value {
        Some(val) => match val.parse::<usize>() {
            Ok(0) => {
                eprintln!(
                    "Warning: SKEIN_MIN_HEAP=0 is invalid, using default {}",
                    DEFAULT_MIN_HEAP
                );
                DEFAULT_MIN_HEAP
            }
            Ok(size) => size,
            Err(_) => {
                eprintln!(
                    "Warning: SKEIN_MIN_HEAP='{}' is not a valid number, using default {}",
                    val, DEFAULT_MIN_HEAP
                );
                DEFAULT_MIN_HEAP
            }
        },
        None => DEFAULT_MIN_HEAP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        // Safety: tests in this module are serialized.
        unsafe {
            std::env::remove_var("SKEIN_MIN_HEAP");
            std::env::remove_var("SKEIN_HEAP_GROWTH");
            std::env::remove_var("SKEIN_GC_STRESS");
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        clear_env();
        let config = GcConfig::from_env();
        assert_eq!(config.min_heap_size, DEFAULT_MIN_HEAP);
        assert_eq!(config.heap_growth, DEFAULT_HEAP_GROWTH);
        assert!(!config.stress);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        // Safety: serialized with every other env-touching test.
        unsafe {
            std::env::set_var("SKEIN_MIN_HEAP", "4096");
            std::env::set_var("SKEIN_HEAP_GROWTH", "2.0");
            std::env::set_var("SKEIN_GC_STRESS", "1");
        }

        let config = GcConfig::from_env();
        assert_eq!(config.min_heap_size, 4096);
        assert_eq!(config.heap_growth, 2.0);
        assert!(config.stress);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_falls_back() {
        clear_env();
        // Safety: serialized with every other env-touching test.
        unsafe {
            std::env::set_var("SKEIN_MIN_HEAP", "lots");
            std::env::set_var("SKEIN_HEAP_GROWTH", "0.5");
            std::env::set_var("SKEIN_GC_STRESS", "yes");
        }

        let config = GcConfig::from_env();
        assert_eq!(config.min_heap_size, DEFAULT_MIN_HEAP);
        assert_eq!(config.heap_growth, DEFAULT_HEAP_GROWTH);
        assert!(!config.stress);
        clear_env();
    }

    #[test]
    fn test_builder_methods() {
        let config = GcConfig::default()
            .with_heap_growth(3.0)
            .with_min_heap_size(512)
            .with_stress(true);
        assert_eq!(config.heap_growth, 3.0);
        assert_eq!(config.min_heap_size, 512);
        assert!(config.stress);
    }
}
