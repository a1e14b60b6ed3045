//! Streaming Overlap-Add Engine
//!
//! Accepts input in chunks of arbitrary caller-chosen size, buffers them
//! until a planned window is complete, runs the transform on the extracted
//! span, reweights the result by the normalized analysis window, and
//! accumulates overlapping contributions before flushing fully-resolved
//! output to the sink.
//!
//! For `n_total = 27`, `n_samples = 10`, `n_overlap = 5` and a triangular
//! window:
//!
//! ```text
//! 1 _____               _______
//!   |    \   /\   /\   /
//!   |     \ /  \ /  \ /
//!   |      x    x    x
//!   |     / \  / \  / \
//!   |    /   \/   \/   \
//! 0 +----|----|----|----|----|-
//!   0    5   10   15   20   25
//! ```
//!
//! This produces four windows: the first three are the requested length and
//! the last one is longer (12 samples). The first and last windows are
//! reweighted asymmetrically, since they have no overlapping neighbor on one
//! side.
//!
//! Input buffers grow by copy-append on every feed call and are trimmed
//! after each flush, so the in-flight span never exceeds one window; callers
//! streaming very small chunks pay the reallocation cost once per feed.
//! Output accumulators are fixed-capacity, sized to the longest planned
//! window. The engine is synchronous and single-threaded: the transform and
//! the sink run inline on the caller's thread before `feed` returns.

use ndarray::{concatenate, s, Array1, ArrayD, ArrayViewD, Axis, IxDyn, Slice};

use crate::error::{ColaError, Result};
use crate::plan::SegmentationPlan;
use crate::sink::Sink;
use crate::types::ColaConfig;
use crate::window::{build_window, NormalizedWindow};

/// Constant overlap-add streaming engine.
///
/// `process` is invoked once per completed window with the raw (unweighted)
/// extracted spans, one per input stream, and must return one array per
/// output stream with the same trailing length. The window/overlap pair is
/// certified at construction; feeding is the only runtime entry point.
pub struct ColaEngine<P, S>
where
    P: FnMut(Vec<ArrayD<f64>>) -> Vec<ArrayD<f64>>,
    S: Sink,
{
    config: ColaConfig,
    window: NormalizedWindow,
    step: usize,
    plan: SegmentationPlan,
    idx: usize,
    in_buffers: Option<Vec<ArrayD<f64>>>,
    out_buffers: Option<Vec<ArrayD<f64>>>,
    process: P,
    sink: S,
}

impl<P, S> std::fmt::Debug for ColaEngine<P, S>
where
    P: FnMut(Vec<ArrayD<f64>>) -> Vec<ArrayD<f64>>,
    S: Sink,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColaEngine")
            .field("idx", &self.idx)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl<P, S> ColaEngine<P, S>
where
    P: FnMut(Vec<ArrayD<f64>>) -> Vec<ArrayD<f64>>,
    S: Sink,
{
    /// Validate the configuration, certify the COLA property of the chosen
    /// window/overlap pair, and plan the segmentation of `n_total`.
    pub fn new(config: ColaConfig, process: P, sink: S) -> Result<Self> {
        config.validate()?;
        let step = config.step();
        let window = build_window(&config.window, config.n_samples, step, config.tolerance)?;
        let plan = SegmentationPlan::new(config.n_total, config.n_samples, step)?;

        let plural = if plan.len() != 1 { "s" } else { "" };
        log::info!(
            "Processing {} data chunk{} of (at least) {:.1} s with {:.1} s overlap and {} windowing",
            plan.len(),
            plural,
            config.n_samples as f64 / config.sample_rate,
            config.n_overlap as f64 / config.sample_rate,
            config.window.name()
        );
        if plan.remainder() > 0 {
            log::info!(
                "The final {:.3} s will be lumped into the final window",
                plan.remainder() as f64 / config.sample_rate
            );
        }

        Ok(Self {
            config,
            window,
            step,
            plan,
            idx: 0,
            in_buffers: None,
            out_buffers: None,
            process,
            sink,
        })
    }

    pub fn config(&self) -> &ColaConfig {
        &self.config
    }

    pub fn plan(&self) -> &SegmentationPlan {
        &self.plan
    }

    pub fn window(&self) -> &NormalizedWindow {
        &self.window
    }

    /// Number of planned windows already processed and flushed.
    pub fn windows_processed(&self) -> usize {
        self.idx
    }

    /// True once every planned window has been processed and flushed.
    pub fn is_complete(&self) -> bool {
        self.idx == self.plan.len()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Recover the sink once streaming is done.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Samples consumed so far from the start of the signal: everything
    /// before the current window's start has been flushed and discarded.
    fn consumed(&self) -> usize {
        if self.idx < self.plan.len() {
            self.plan.starts()[self.idx]
        } else {
            self.plan.n_total()
        }
    }

    /// Absolute sample offset one past the end of the first stream's buffer.
    fn in_offset(&self) -> usize {
        let buffered = self
            .in_buffers
            .as_ref()
            .and_then(|bufs| bufs.first())
            .map(|buf| buf.shape()[buf.ndim() - 1])
            .unwrap_or(0);
        self.consumed() + buffered
    }

    /// Pass in a chunk of data, one array per input stream.
    ///
    /// The first call establishes the stream count and each stream's leading
    /// shape; later calls must match both. Chunks append along the last
    /// (time) axis. Whenever enough samples are buffered to complete the
    /// next planned window the transform runs, output accumulates, and the
    /// resolved region is flushed to the sink, all before `feed` returns.
    pub fn feed(&mut self, chunks: &[ArrayViewD<'_, f64>]) -> Result<()> {
        if self.in_buffers.is_none() {
            let mut buffers = Vec::with_capacity(chunks.len());
            for chunk in chunks {
                if chunk.ndim() < 1 {
                    return Err(ColaError::ShapeMismatch(
                        "stream chunks must have at least one dimension".to_string(),
                    ));
                }
                let mut shape = chunk.shape().to_vec();
                let nd = shape.len();
                shape[nd - 1] = 0;
                buffers.push(ArrayD::zeros(IxDyn(&shape)));
            }
            self.in_buffers = Some(buffers);
        }

        let n_streams = self.in_buffers.as_ref().map(Vec::len).unwrap_or(0);
        if chunks.len() != n_streams {
            return Err(ColaError::ShapeMismatch(format!(
                "got {} array(s), needed {}",
                chunks.len(),
                n_streams
            )));
        }

        // Validate and bounds-check every stream before touching any buffer,
        // so a failing feed leaves the engine state untouched.
        let consumed = self.consumed();
        let n_total = self.plan.n_total();
        {
            let buffers = self.in_buffers.as_ref().ok_or_else(|| {
                ColaError::InternalConsistency("input buffers not allocated".to_string())
            })?;
            for (di, (buffer, chunk)) in buffers.iter().zip(chunks.iter()).enumerate() {
                let nd = buffer.ndim();
                if chunk.ndim() != nd || chunk.shape()[..nd - 1] != buffer.shape()[..nd - 1] {
                    return Err(ColaError::ShapeMismatch(format!(
                        "stream {} chunk has leading shape {:?}, expected {:?}",
                        di,
                        &chunk.shape()[..chunk.ndim().saturating_sub(1)],
                        &buffer.shape()[..nd - 1]
                    )));
                }
                let fed = consumed + buffer.shape()[nd - 1] + chunk.shape()[nd - 1];
                if fed > n_total {
                    return Err(ColaError::Bounds(format!(
                        "stream {} would hold {} samples, exceeding the expected total of {}",
                        di, fed, n_total
                    )));
                }
            }
        }

        let buffers = self.in_buffers.as_mut().ok_or_else(|| {
            ColaError::InternalConsistency("input buffers not allocated".to_string())
        })?;
        for (di, (buffer, chunk)) in buffers.iter_mut().zip(chunks.iter()).enumerate() {
            let t = buffer.ndim() - 1;
            log::debug!(
                "Appending samples {}..{} to stream {}",
                consumed + buffer.shape()[t],
                consumed + buffer.shape()[t] + chunk.shape()[t],
                di
            );
            let appended = concatenate(Axis(t), &[buffer.view(), chunk.view()]).map_err(|e| {
                ColaError::InternalConsistency(format!("failed to append to stream {di}: {e}"))
            })?;
            *buffer = appended;
        }

        self.drain()
    }

    /// Process every planned window that is now fully buffered.
    fn drain(&mut self) -> Result<()> {
        while self.idx < self.plan.len() && self.in_offset() >= self.plan.stops()[self.idx] {
            let start = self.plan.starts()[self.idx];
            let stop = self.plan.stops()[self.idx];
            let this_len = stop - start;
            let this_window = self.edge_corrected_window(this_len);
            log::debug!("Processing window {}..{}", start, stop);

            let spans = self.extract_spans(this_len)?;
            if this_window.len() != this_len {
                return Err(ColaError::InternalConsistency(format!(
                    "corrected window has {} samples, expected {}",
                    this_window.len(),
                    this_len
                )));
            }

            let outs = (self.process)(spans);
            self.accumulate(outs, &this_window, this_len)?;

            self.idx += 1;
            let next_start = if self.idx < self.plan.len() {
                self.plan.starts()[self.idx]
            } else {
                self.plan.n_total()
            };
            let delta = next_start - start;
            self.flush_and_shift(delta)?;
        }
        Ok(())
    }

    /// Reweight the analysis window for the first and last planned windows,
    /// which lack an overlapping neighbor on one side: the missing copies of
    /// the window are folded onto the uncovered tail so the constant-gain
    /// property still holds there.
    fn edge_corrected_window(&self, this_len: usize) -> Array1<f64> {
        let n_samples = self.window.len();
        let mut corrected = if self.idx == self.plan.len() - 1 {
            let mut padded = Array1::<f64>::zeros(this_len);
            padded
                .slice_mut(s![..n_samples])
                .assign(&self.window.samples);
            let mut offset = self.step;
            while offset < this_len {
                let n_use = this_len - offset;
                let mut tail = padded.slice_mut(s![offset..]);
                tail += &self.window.samples.slice(s![..n_use]);
                offset += self.step;
            }
            padded
        } else {
            self.window.samples.clone()
        };
        if self.idx == 0 {
            let mut offset = n_samples as isize - self.step as isize;
            while offset > 0 {
                let off = offset as usize;
                let mut head = corrected.slice_mut(s![..off]);
                head += &self.window.samples.slice(s![n_samples - off..]);
                offset -= self.step as isize;
            }
        }
        corrected
    }

    /// Copy the current window's span out of every input buffer.
    fn extract_spans(&self, this_len: usize) -> Result<Vec<ArrayD<f64>>> {
        let buffers = self.in_buffers.as_ref().ok_or_else(|| {
            ColaError::InternalConsistency("input buffers not allocated".to_string())
        })?;
        let mut spans = Vec::with_capacity(buffers.len());
        for (di, buffer) in buffers.iter().enumerate() {
            let t = buffer.ndim() - 1;
            if buffer.shape()[t] < this_len {
                return Err(ColaError::InternalConsistency(format!(
                    "stream {} holds {} samples, window needs {}",
                    di,
                    buffer.shape()[t],
                    this_len
                )));
            }
            spans.push(
                buffer
                    .slice_axis(Axis(t), Slice::from(..this_len))
                    .to_owned(),
            );
        }
        Ok(spans)
    }

    /// Weight the transform outputs by the corrected window and add them
    /// into the output accumulators at the current origin.
    fn accumulate(
        &mut self,
        mut outs: Vec<ArrayD<f64>>,
        this_window: &Array1<f64>,
        this_len: usize,
    ) -> Result<()> {
        for (oi, out) in outs.iter().enumerate() {
            if out.ndim() < 1 || out.shape()[out.ndim() - 1] != this_len {
                return Err(ColaError::InternalConsistency(format!(
                    "transform output {} has trailing length {}, expected {}",
                    oi,
                    out.shape().last().copied().unwrap_or(0),
                    this_len
                )));
            }
        }

        if self.out_buffers.is_none() {
            let max_len = self.plan.max_len();
            let buffers = outs
                .iter()
                .map(|out| {
                    let mut shape = out.shape().to_vec();
                    let nd = shape.len();
                    shape[nd - 1] = max_len;
                    ArrayD::zeros(IxDyn(&shape))
                })
                .collect();
            self.out_buffers = Some(buffers);
        }

        let buffers = self.out_buffers.as_mut().ok_or_else(|| {
            ColaError::InternalConsistency("output buffers not allocated".to_string())
        })?;
        if outs.len() != buffers.len() {
            return Err(ColaError::InternalConsistency(format!(
                "transform returned {} output(s), expected {}",
                outs.len(),
                buffers.len()
            )));
        }

        for (oi, (out, buffer)) in outs.iter_mut().zip(buffers.iter_mut()).enumerate() {
            let t = out.ndim() - 1;
            if out.shape()[..t] != buffer.shape()[..buffer.ndim() - 1] {
                return Err(ColaError::InternalConsistency(format!(
                    "transform output {} has leading shape {:?}, expected {:?}",
                    oi,
                    &out.shape()[..t],
                    &buffer.shape()[..buffer.ndim() - 1]
                )));
            }
            for mut lane in out.lanes_mut(Axis(t)) {
                lane.zip_mut_with(this_window, |o, &w| *o *= w);
            }
            let mut region = buffer.slice_axis_mut(Axis(buffer.ndim() - 1), Slice::from(..this_len));
            region += &*out;
        }
        Ok(())
    }

    /// Hand the resolved leading `delta` samples of every accumulator to the
    /// sink, then shift input and output buffers left by the same amount.
    fn flush_and_shift(&mut self, delta: usize) -> Result<()> {
        log::debug!("Shifting input/output buffers by {} samples", delta);

        if let Some(buffers) = self.in_buffers.as_mut() {
            for buffer in buffers.iter_mut() {
                let t = buffer.ndim() - 1;
                *buffer = buffer.slice_axis(Axis(t), Slice::from(delta..)).to_owned();
            }
        }

        let out_buffers = self.out_buffers.as_mut().ok_or_else(|| {
            ColaError::InternalConsistency("output buffers not allocated".to_string())
        })?;
        let views: Vec<ArrayViewD<'_, f64>> = out_buffers
            .iter()
            .map(|buffer| buffer.slice_axis(Axis(buffer.ndim() - 1), Slice::from(..delta)))
            .collect();
        self.sink.store(&views)?;
        drop(views);

        for buffer in out_buffers.iter_mut() {
            let t = buffer.ndim() - 1;
            let capacity = buffer.shape()[t];
            let tail = buffer.slice_axis(Axis(t), Slice::from(delta..)).to_owned();
            buffer
                .slice_axis_mut(Axis(t), Slice::from(..capacity - delta))
                .assign(&tail);
            buffer
                .slice_axis_mut(Axis(t), Slice::from(capacity - delta..))
                .fill(0.0);
        }
        Ok(())
    }
}
