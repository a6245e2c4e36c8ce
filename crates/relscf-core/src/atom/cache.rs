use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::coulomb::{CoulombError, CoulombKey, lookup, radial_integral_with_yk, yk_ab};
use super::orbital::Orbital;
use crate::numerics::grid::Grid;
use crate::numerics::wigner::{Wigner6jInput, lambda_k, reduced_ck, wigner_6j};

/// Key of an angular factor that depends on a multipole and two `kappa`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct KappaPairKey {
    k: i32,
    kappa_a: i32,
    kappa_b: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct YkKey {
    k: u32,
    a: usize,
    b: usize,
}

impl YkKey {
    fn new(k: u32, a: usize, b: usize) -> Self {
        Self {
            k,
            a: a.min(b),
            b: a.max(b),
        }
    }
}

/// Memo table readable from many threads; the first insertion of a key wins.
#[derive(Debug)]
struct Table<K, V> {
    entries: RwLock<HashMap<K, V>>,
    computations: AtomicUsize,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            computations: AtomicUsize::new(0),
        }
    }
}

impl<K: Eq + Hash + Copy, V: Clone> Table<K, V> {
    fn get_or_try_compute<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(value.clone());
        }

        let value = compute()?;
        self.computations.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.entry(key).or_insert(value).clone())
    }

    fn get_or_compute(&self, key: K, compute: impl FnOnce() -> V) -> V {
        match self.get_or_try_compute::<std::convert::Infallible>(key, || Ok(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    fn retain(&self, keep: impl FnMut(&K, &mut V) -> bool) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(keep);
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

/// Memoised angular coefficients and radial Coulomb integrals for one atom.
///
/// Angular entries depend only on quantum numbers and are never dropped.
/// Radial entries are keyed by orbital index into the slice passed with each
/// request; the owner must call [`IntegralCache::invalidate_orbital`] (or
/// [`IntegralCache::clear_radial`]) whenever an orbital changes shape.
#[derive(Debug, Default)]
pub struct IntegralCache {
    lambda: Table<KappaPairKey, f64>,
    ck: Table<KappaPairKey, f64>,
    six_j: Table<Wigner6jInput, f64>,
    yk: Table<YkKey, Arc<Vec<f64>>>,
    radial: Table<CoulombKey, f64>,
}

impl IntegralCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Λ^k_ab`, symmetric in `a` and `b`.
    pub fn lambda_k(&self, k: i32, kappa_a: i32, kappa_b: i32) -> f64 {
        let key = KappaPairKey {
            k,
            kappa_a: kappa_a.min(kappa_b),
            kappa_b: kappa_a.max(kappa_b),
        };
        self.lambda
            .get_or_compute(key, || lambda_k(k, key.kappa_a, key.kappa_b))
    }

    /// `<kappa_a||C^k||kappa_b>`.
    pub fn ck(&self, k: i32, kappa_a: i32, kappa_b: i32) -> f64 {
        let key = KappaPairKey {
            k,
            kappa_a,
            kappa_b,
        };
        self.ck.get_or_compute(key, || reduced_ck(k, kappa_a, kappa_b))
    }

    /// 6j symbol with doubled arguments; symmetric orderings share one entry.
    pub fn six_j(&self, input: Wigner6jInput) -> f64 {
        let key = input.canonical();
        self.six_j.get_or_compute(key, || wigner_6j(key))
    }

    /// `y^k_ab(r)` for orbitals `a` and `b` of `orbitals`.
    pub fn yk(
        &self,
        grid: &Grid,
        orbitals: &[Orbital],
        k: u32,
        a: usize,
        b: usize,
    ) -> Result<Arc<Vec<f64>>, CoulombError> {
        let key = YkKey::new(k, a, b);
        self.yk.get_or_try_compute(key, || {
            let orbital_a = lookup(orbitals, key.a)?;
            let orbital_b = lookup(orbitals, key.b)?;
            yk_ab(grid, k, orbital_a, orbital_b).map(Arc::new)
        })
    }

    /// `R^k_abcd = ∫ (f_a f_c + g_a g_c) y^k_bd dr`, stored under its normal-ordered key.
    pub fn radial_integral(
        &self,
        grid: &Grid,
        orbitals: &[Orbital],
        k: u32,
        a: usize,
        b: usize,
        c: usize,
        d: usize,
    ) -> Result<f64, CoulombError> {
        let key = CoulombKey::normal_ordered(k, a, b, c, d);
        self.radial.get_or_try_compute(key, || {
            let [a, b, c, d] = key.indices;
            let yk = self.yk(grid, orbitals, k, b, d)?;
            let orbital_a = lookup(orbitals, a)?;
            let orbital_c = lookup(orbitals, c)?;
            Ok(radial_integral_with_yk(grid, orbital_a, orbital_c, &yk))
        })
    }

    /// Drops every radial entry that involves orbital `index`.
    pub fn invalidate_orbital(&self, index: usize) {
        self.yk.retain(|key, _| key.a != index && key.b != index);
        self.radial.retain(|key, _| !key.contains(index));
    }

    pub fn clear_radial(&self) {
        self.yk.clear();
        self.radial.clear();
    }

    pub fn angular_computations(&self) -> usize {
        self.lambda.computations() + self.ck.computations() + self.six_j.computations()
    }

    pub fn yk_computations(&self) -> usize {
        self.yk.computations()
    }

    pub fn radial_computations(&self) -> usize {
        self.radial.computations()
    }

    pub fn radial_entries(&self) -> usize {
        self.radial.len()
    }

    pub fn yk_entries(&self) -> usize {
        self.yk.len()
    }
}

#[cfg(test)]
mod tests {
    use super::IntegralCache;
    use crate::atom::orbital::Orbital;
    use crate::numerics::grid::{Grid, GridKind, GridParameters};
    use crate::numerics::wigner::Wigner6jInput;

    fn slater_orbitals(grid: &Grid) -> Vec<Orbital> {
        let mut s = Orbital::empty(1, -1, grid.num_points());
        let mut p = Orbital::empty(2, -2, grid.num_points());
        for i in 0..grid.num_points() {
            let r = grid.r(i);
            s.f[i] = 2.0 * r * (-r).exp();
            p.f[i] = r * r * (-0.5 * r).exp() / 24.0_f64.sqrt();
        }
        vec![s, p]
    }

    #[test]
    fn angular_lookups_are_computed_once() {
        let cache = IntegralCache::new();
        let first = cache.lambda_k(1, -1, -2);
        let second = cache.lambda_k(1, -2, -1);
        assert_eq!(first, second);
        assert_eq!(cache.angular_computations(), 1);

        let six_j = cache.six_j(Wigner6jInput::new(2, 2, 2, 2, 2, 2));
        let flipped = cache.six_j(Wigner6jInput::new(2, 2, 2, 2, 2, 2));
        assert_eq!(six_j, flipped);
        assert_eq!(cache.angular_computations(), 2);
    }

    #[test]
    fn radial_integrals_hit_the_cache_on_repeat() {
        let grid = Grid::new(&GridParameters::new(1.0e-6, 80.0, 1500, GridKind::LogLinear {
            b: 4.0,
        }))
        .expect("grid should build");
        let orbitals = slater_orbitals(&grid);
        let cache = IntegralCache::new();

        let first = cache
            .radial_integral(&grid, &orbitals, 0, 0, 0, 0, 0)
            .expect("valid indices");
        let computed = cache.radial_computations();
        let second = cache
            .radial_integral(&grid, &orbitals, 0, 0, 0, 0, 0)
            .expect("valid indices");
        assert_eq!(first, second);
        assert_eq!(cache.radial_computations(), computed);
        // F^0(1s,1s) = 5/8 Z for a hydrogenic 1s.
        assert!((first - 0.625).abs() <= 1.0e-6);
    }

    #[test]
    fn permuted_arguments_share_one_entry() {
        let grid = Grid::new(&GridParameters::new(1.0e-6, 80.0, 1500, GridKind::LogLinear {
            b: 4.0,
        }))
        .expect("grid should build");
        let orbitals = slater_orbitals(&grid);
        let cache = IntegralCache::new();

        let reference = cache
            .radial_integral(&grid, &orbitals, 1, 0, 1, 1, 0)
            .expect("valid indices");
        for (a, b, c, d) in [(1, 0, 0, 1), (0, 1, 1, 0), (1, 0, 0, 1)] {
            let value = cache
                .radial_integral(&grid, &orbitals, 1, a, b, c, d)
                .expect("valid indices");
            assert_eq!(value, reference);
        }
        assert_eq!(cache.radial_computations(), 1);
        assert_eq!(cache.radial_entries(), 1);

        cache.invalidate_orbital(1);
        assert_eq!(cache.radial_entries(), 0);
        assert_eq!(cache.yk_entries(), 0);

        let error = cache
            .radial_integral(&grid, &orbitals, 0, 0, 5, 0, 5)
            .expect_err("index 5 does not exist");
        assert!(error.to_string().contains("out of range"));
    }
}
