//! Synthetic workloads and the static workload registry.
//!
//! The engine only times [`Workload::generate_load`]; it never inspects
//! what the workload produced beyond passing it through
//! [`std::hint::black_box`].

use bench_common::error::{BenchError, BenchResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::time::{Duration, Instant};

/// A unit of synthetic work driven by an integer load.
pub trait Workload {
    /// Short registry name.
    fn name(&self) -> &str;

    /// Largest load this workload accepts.
    fn max_load(&self) -> u32;

    /// Perform `load` units of work.
    ///
    /// Returns a footprint derived from the work done so that it cannot be
    /// removed as dead code. Must be deterministic for a given load.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] if `load` exceeds [`max_load`](Self::max_load).
    fn generate_load(&mut self, load: u32) -> BenchResult<usize>;

    /// Reject loads above the declared bound.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Config`] naming the workload and its bound.
    fn check_load(&self, load: u32) -> BenchResult<()> {
        if load > self.max_load() {
            return Err(BenchError::Config(format!(
                "load {load} exceeds the {} workload limit of {}",
                self.name(),
                self.max_load()
            )));
        }
        Ok(())
    }
}

impl<W: Workload + ?Sized> Workload for Box<W> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn max_load(&self) -> u32 {
        (**self).max_load()
    }

    fn generate_load(&mut self, load: u32) -> BenchResult<usize> {
        (**self).generate_load(load)
    }
}

/// Allocation-heavy workload that churns a young and an old generation.
///
/// Each step allocates one `f64` array of random length (below 65536) as the
/// young generation. One step in four promotes it to the old generation,
/// and half of those also drop a random old object, fragmenting the heap.
/// The generator is reseeded on every call so equal loads do equal work.
#[derive(Debug, Default)]
pub struct RandomMemoryLoad {
    young: Vec<Vec<f64>>,
    old: Vec<Vec<f64>>,
}

impl RandomMemoryLoad {
    /// Registry name.
    pub const NAME: &'static str = "random-memory";
    /// Fixed generator seed.
    pub const SEED: u64 = 1_843_710_252;
    /// Maximum load, array length bound, and old-generation cap.
    pub const UPPER_LIMIT: u32 = 1 << 16;

    /// Create an empty generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(rng: &mut StdRng) -> Vec<f64> {
        let size = rng.random_range(0..Self::UPPER_LIMIT) as usize;
        vec![rng.random::<f64>(); size]
    }
}

impl Workload for RandomMemoryLoad {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn max_load(&self) -> u32 {
        Self::UPPER_LIMIT
    }

    fn generate_load(&mut self, load: u32) -> BenchResult<usize> {
        self.check_load(load)?;

        let mut rng = StdRng::seed_from_u64(Self::SEED);
        self.old.clear();

        for _ in 0..load {
            self.young = vec![Self::allocate(&mut rng)];

            if rng.random_bool(0.5) && rng.random_bool(0.5) && !self.young.is_empty() {
                let index = rng.random_range(0..self.young.len());
                let promoted = self.young.swap_remove(index);
                if self.old.len() < Self::UPPER_LIMIT as usize {
                    self.old.push(promoted);
                }

                if rng.random_bool(0.5) && !self.old.is_empty() {
                    let index = rng.random_range(0..self.old.len());
                    self.old.remove(index);
                }
            }
        }

        let footprint = self.young.iter().chain(&self.old).map(Vec::len).sum();
        Ok(black_box(footprint))
    }
}

/// Calibration workload that busy-waits `load` microseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinLoad;

impl SpinLoad {
    /// Registry name.
    pub const NAME: &'static str = "spin";
    /// Maximum load (about 16.7 s of spinning).
    pub const MAX_LOAD: u32 = 1 << 24;
}

impl Workload for SpinLoad {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn max_load(&self) -> u32 {
        Self::MAX_LOAD
    }

    fn generate_load(&mut self, load: u32) -> BenchResult<usize> {
        self.check_load(load)?;

        let target = Duration::from_micros(u64::from(load));
        let start = Instant::now();
        let mut spins = 0usize;
        while start.elapsed() < target {
            spins = spins.wrapping_add(1);
            std::hint::spin_loop();
        }
        Ok(black_box(spins))
    }
}

type WorkloadFactory = fn() -> Box<dyn Workload + Send>;

fn random_memory() -> Box<dyn Workload + Send> {
    Box::new(RandomMemoryLoad::new())
}

fn spin() -> Box<dyn Workload + Send> {
    Box::new(SpinLoad)
}

/// Registered workloads, the first being the default.
static REGISTRY: &[(&str, WorkloadFactory)] = &[
    (RandomMemoryLoad::NAME, random_memory as WorkloadFactory),
    (SpinLoad::NAME, spin as WorkloadFactory),
];

/// Name of the workload used when none is requested.
#[must_use]
pub fn default_workload_name() -> &'static str {
    REGISTRY[0].0
}

/// Names of every registered workload.
pub fn workload_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

/// Construct a registered workload by name.
///
/// # Errors
///
/// Returns [`BenchError::Config`] listing the registered names if `name` is unknown.
pub fn workload_by_name(name: &str) -> BenchResult<Box<dyn Workload + Send>> {
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, factory)| factory())
        .ok_or_else(|| {
            BenchError::Config(format!(
                "unknown workload {name} (available: {})",
                workload_names().collect::<Vec<_>>().join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_memory_is_deterministic() {
        let mut a = RandomMemoryLoad::new();
        let mut b = RandomMemoryLoad::new();
        let first = a.generate_load(32).unwrap();
        assert_eq!(first, b.generate_load(32).unwrap());
        assert_eq!(first, a.generate_load(32).unwrap());
    }

    #[test]
    fn test_random_memory_rejects_excess_load() {
        let mut workload = RandomMemoryLoad::new();
        let err = workload
            .generate_load(RandomMemoryLoad::UPPER_LIMIT + 1)
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("65536"));
    }

    #[test]
    fn test_zero_load_is_cheap() {
        assert_eq!(RandomMemoryLoad::new().generate_load(0).unwrap(), 0);
        assert_eq!(SpinLoad.generate_load(0).unwrap(), 0);
    }

    #[test]
    fn test_spin_waits_at_least_load_micros() {
        let start = Instant::now();
        SpinLoad.generate_load(2_000).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!(default_workload_name(), "random-memory");
        assert_eq!(
            workload_names().collect::<Vec<_>>(),
            vec!["random-memory", "spin"]
        );

        let workload = workload_by_name("spin").unwrap();
        assert_eq!(workload.name(), "spin");
        assert_eq!(workload.max_load(), SpinLoad::MAX_LOAD);
    }

    #[test]
    fn test_registry_unknown_name() {
        let err = workload_by_name("gc-storm").err().unwrap();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("random-memory, spin"));
    }

    #[test]
    fn test_boxed_workload_delegates() {
        let mut boxed: Box<dyn Workload + Send> = Box::new(SpinLoad);
        assert!(boxed.check_load(SpinLoad::MAX_LOAD + 1).is_err());
        assert!(boxed.generate_load(1).is_ok());
    }
}
