//! Parameter storage shared by all training threads.
//!
//! Training threads read and update rows concurrently without locks. Each
//! element is an `AtomicU32` holding the bits of an `f32`, accessed with
//! relaxed ordering, so individual reads and writes are never torn, but an
//! update is a separate load and store: when two threads add to the same
//! element at once, one of the additions can be lost. That's acceptable for
//! asynchronous SGD.

use std::sync::atomic::{AtomicU32, Ordering};

use aligned_box::AlignedBox;
use rand::Rng;

use crate::error::{Error, Result};

#[derive(Default)]
#[repr(transparent)]
pub struct Real {
    bits: AtomicU32,
}

impl Real {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn add(&self, x: f32) {
        let a = self.get();
        self.set(a + x);
    }
}

/// Row-oriented access to a shared parameter matrix.
///
/// Implementations decide how much synchronization to use; callers only
/// rely on rows being readable and updatable from any thread.
pub trait ParameterRows: Sync {
    fn rows(&self) -> usize;

    fn dim(&self) -> usize;

    /// Copy row `row` into `out`, which must have length `dim()`.
    fn read_row(&self, row: usize, out: &mut [f32]);

    /// Add `scale * grad` to row `row`.
    fn apply_gradient_row(&self, row: usize, grad: &[f32], scale: f32);

    /// Dot product of row `row` with `v`.
    fn dot_row(&self, row: usize, v: &[f32]) -> f32;

    /// Add `scale * row` to `out`.
    fn accumulate_row(&self, row: usize, scale: f32, out: &mut [f32]);
}

/// A dense `rows × dim` matrix of `f32` in a cache-aligned allocation.
pub struct AtomicMatrix {
    rows: usize,
    dim: usize,
    data: AlignedBox<[Real]>,
}

impl AtomicMatrix {
    pub fn zeros(rows: usize, dim: usize) -> Result<Self> {
        let data = AlignedBox::slice_from_default(128, rows * dim).map_err(|err| {
            Error::DataIntegrity(format!("cannot allocate {rows}x{dim} parameters: {err:?}"))
        })?;
        Ok(AtomicMatrix { rows, dim, data })
    }

    /// Every element drawn uniformly from `[-width, width)`.
    pub fn uniform<R: Rng + ?Sized>(rows: usize, dim: usize, width: f32, rng: &mut R) -> Result<Self> {
        let m = Self::zeros(rows, dim)?;
        for r in m.data.iter() {
            r.set(rng.gen_range(-width..width));
        }
        Ok(m)
    }

    pub fn from_vec(rows: usize, dim: usize, values: &[f32]) -> Result<Self> {
        if values.len() != rows * dim {
            return Err(Error::DataIntegrity(format!(
                "expected {} parameters for a {rows}x{dim} matrix, got {}",
                rows * dim,
                values.len()
            )));
        }
        let m = Self::zeros(rows, dim)?;
        for (r, &v) in m.data.iter().zip(values) {
            r.set(v);
        }
        Ok(m)
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().map(Real::get).collect()
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.dim + col].get()
    }

    fn row(&self, row: usize) -> &[Real] {
        &self.data[row * self.dim..][..self.dim]
    }
}

impl ParameterRows for AtomicMatrix {
    fn rows(&self) -> usize {
        self.rows
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn read_row(&self, row: usize, out: &mut [f32]) {
        assert_eq!(out.len(), self.dim);
        for (o, r) in out.iter_mut().zip(self.row(row)) {
            *o = r.get();
        }
    }

    fn apply_gradient_row(&self, row: usize, grad: &[f32], scale: f32) {
        assert_eq!(grad.len(), self.dim);
        for (r, &g) in self.row(row).iter().zip(grad) {
            r.add(scale * g);
        }
    }

    fn dot_row(&self, row: usize, v: &[f32]) -> f32 {
        assert_eq!(v.len(), self.dim);
        self.row(row).iter().zip(v).map(|(r, &x)| r.get() * x).sum()
    }

    fn accumulate_row(&self, row: usize, scale: f32, out: &mut [f32]) {
        assert_eq!(out.len(), self.dim);
        for (o, r) in out.iter_mut().zip(self.row(row)) {
            *o += scale * r.get();
        }
    }
}
