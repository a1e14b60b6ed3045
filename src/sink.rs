//! Output Sinks
//!
//! Consumers for finished overlap-add output. A sink receives each flushed
//! chunk exactly once, in temporal order; ordering is the only guarantee a
//! sink may rely on. The concrete sink is chosen explicitly at engine
//! construction: a callback invoked per flush, or caller-owned destination
//! arrays written through a monotonically advancing cursor.

use ndarray::{ArrayD, ArrayViewD, Axis, Slice};

use crate::error::{ColaError, Result};

/// Receives finished output chunks in temporal order.
pub trait Sink {
    /// Accept one flush worth of output, one chunk per output stream.
    fn store(&mut self, chunks: &[ArrayViewD<'_, f64>]) -> Result<()>;
}

/// Sink that forwards every flush to a caller-supplied closure.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(&[ArrayViewD<'_, f64>]),
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> Sink for CallbackSink<F>
where
    F: FnMut(&[ArrayViewD<'_, f64>]),
{
    fn store(&mut self, chunks: &[ArrayViewD<'_, f64>]) -> Result<()> {
        (self.callback)(chunks);
        Ok(())
    }
}

/// Sink that writes flushes into caller-owned destination arrays.
///
/// An internal cursor advances by each flush's length and never revisits a
/// position. An optional channel subset restricts every write to the given
/// indices along the axis before time.
#[derive(Debug)]
pub struct ArraySink {
    outs: Vec<ArrayD<f64>>,
    idx: usize,
    picks: Option<Vec<usize>>,
}

impl ArraySink {
    /// Wrap destination arrays, one per output stream. The last axis of each
    /// destination is time.
    pub fn new(outs: Vec<ArrayD<f64>>) -> Result<Self> {
        if outs.is_empty() {
            return Err(ColaError::Configuration(
                "at least one destination array is required".to_string(),
            ));
        }
        for (oi, out) in outs.iter().enumerate() {
            if out.ndim() < 1 {
                return Err(ColaError::Configuration(format!(
                    "destination {oi} must have at least one dimension"
                )));
            }
        }
        Ok(Self {
            outs,
            idx: 0,
            picks: None,
        })
    }

    /// Like [`new`](Self::new), restricting every write to `picks` along the
    /// axis before time of each destination.
    pub fn with_picks(outs: Vec<ArrayD<f64>>, picks: Vec<usize>) -> Result<Self> {
        let sink = Self::new(outs)?;
        for (oi, out) in sink.outs.iter().enumerate() {
            if out.ndim() < 2 {
                return Err(ColaError::Configuration(format!(
                    "destination {oi} needs a channel axis to apply picks"
                )));
            }
            let n_channels = out.shape()[out.ndim() - 2];
            if let Some(&bad) = picks.iter().find(|&&p| p >= n_channels) {
                return Err(ColaError::Configuration(format!(
                    "pick {bad} out of range for destination {oi} with {n_channels} channels"
                )));
            }
        }
        Ok(Self {
            picks: Some(picks),
            ..sink
        })
    }

    /// Current write position along the time axis.
    pub fn position(&self) -> usize {
        self.idx
    }

    /// Recover the destination arrays once streaming is done.
    pub fn into_arrays(self) -> Vec<ArrayD<f64>> {
        self.outs
    }
}

impl Sink for ArraySink {
    fn store(&mut self, chunks: &[ArrayViewD<'_, f64>]) -> Result<()> {
        if chunks.len() != self.outs.len() {
            return Err(ColaError::ShapeMismatch(format!(
                "got {} chunk(s), needed {}",
                chunks.len(),
                self.outs.len()
            )));
        }
        let n = chunks[0].shape()[chunks[0].ndim() - 1];
        for (ci, chunk) in chunks.iter().enumerate() {
            if chunk.shape()[chunk.ndim() - 1] != n {
                return Err(ColaError::ShapeMismatch(format!(
                    "chunk {} has trailing length {}, expected {}",
                    ci,
                    chunk.shape()[chunk.ndim() - 1],
                    n
                )));
            }
        }

        let stop = self.idx + n;
        for (oi, (out, chunk)) in self.outs.iter_mut().zip(chunks.iter()).enumerate() {
            let nd = out.ndim();
            if stop > out.shape()[nd - 1] {
                return Err(ColaError::ShapeMismatch(format!(
                    "write {}..{} overruns destination {} with {} samples",
                    self.idx,
                    stop,
                    oi,
                    out.shape()[nd - 1]
                )));
            }
            let expected = {
                let mut shape = out.shape().to_vec();
                if let Some(picks) = &self.picks {
                    shape[nd - 2] = picks.len();
                }
                shape[nd - 1] = n;
                shape
            };
            if chunk.shape() != expected.as_slice() {
                return Err(ColaError::ShapeMismatch(format!(
                    "chunk {} has shape {:?}, expected {:?}",
                    oi,
                    chunk.shape(),
                    expected
                )));
            }
            match &self.picks {
                Some(picks) => {
                    for (j, &pick) in picks.iter().enumerate() {
                        let mut row = out.index_axis_mut(Axis(nd - 2), pick);
                        let t = row.ndim() - 1;
                        row.slice_axis_mut(Axis(t), Slice::from(self.idx..stop))
                            .assign(&chunk.index_axis(Axis(chunk.ndim() - 2), j));
                    }
                }
                None => {
                    out.slice_axis_mut(Axis(nd - 1), Slice::from(self.idx..stop))
                        .assign(chunk);
                }
            }
        }
        self.idx = stop;
        Ok(())
    }
}
