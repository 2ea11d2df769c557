use anyhow::Result;
use log::{debug, warn};

use crate::convolver::block::BlockConvolver;

/// Two same-sized buffers that trade roles at each tail-block boundary:
/// `output` receives the convolution pass currently being computed while
/// `precalc` is drained sample-by-sample into the live mix.
pub struct DoubleBuffer {
    output: Vec<f32>,
    precalc: Vec<f32>,
}

impl DoubleBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            output: vec![0.0; len],
            precalc: vec![0.0; len],
        }
    }

    /// Exchanges the two buffers by ownership; no copy, no aliasing.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.output, &mut self.precalc);
    }

    pub fn output_mut(&mut self) -> &mut [f32] {
        &mut self.output
    }

    pub fn precalc(&self) -> &[f32] {
        &self.precalc
    }

    pub fn clear(&mut self) {
        self.output.fill(0.0);
        self.precalc.fill(0.0);
    }
}

/// Multi-resolution convolution engine for arbitrarily long impulse
/// responses.
///
/// The kernel is split into three contiguous segments of increasing block
/// granularity: the head (first tail block) convolves synchronously at a
/// small block size, so the engine adds no latency; the neck (second tail
/// block) and tail (everything after) run at coarser block sizes one full
/// tail period ahead of consumption, so their large FFTs never coincide
/// with the moment their result is needed.
pub struct ThreeStageConvolver {
    head: BlockConvolver,
    neck: BlockConvolver,
    tail: BlockConvolver,

    neck_buffers: DoubleBuffer,
    tail_buffers: DoubleBuffer,

    /// Shared neck/tail input ring, one tail block long
    tail_input: Vec<f32>,
    /// Dedicated copy of the ring handed to the tail convolver
    tail_scratch: Vec<f32>,
    /// Samples written into the current tail block, 0..=tail_block_size
    tail_fill: usize,
    /// Ring samples already consumed by the neck convolver this cycle
    neck_processed: usize,
    /// Samples already drained from the precalc buffers this cycle
    precalc_pos: usize,

    head_block_size: usize,
    tail_block_size: usize,
}

impl ThreeStageConvolver {
    /// Builds the engine for `kernel`. Sizes are clamped to at least 1 and
    /// rounded up to powers of two; if `head_size > tail_size` the two are
    /// swapped. Not safe to call while an audio callback is running.
    pub fn new(head_size: usize, tail_size: usize, kernel: &[f32]) -> Result<Self> {
        let mut head_block_size = head_size.max(1).next_power_of_two();
        let mut tail_block_size = tail_size.max(1).next_power_of_two();
        if head_block_size > tail_block_size {
            warn!(
                "head block {} exceeds tail block {}, swapping",
                head_block_size, tail_block_size
            );
            std::mem::swap(&mut head_block_size, &mut tail_block_size);
        }

        // A tail block much longer than the kernel wastes FFT size on
        // silence; shrink it, but never below the head block.
        while tail_block_size > head_block_size && tail_block_size > kernel.len() / 2 {
            tail_block_size /= 2;
        }

        let head_len = kernel.len().min(tail_block_size);
        let head = BlockConvolver::new(head_block_size, &kernel[..head_len])?;

        let neck = if kernel.len() > tail_block_size {
            let end = kernel.len().min(2 * tail_block_size);
            BlockConvolver::new(tail_block_size / 2, &kernel[tail_block_size..end])?
        } else {
            BlockConvolver::default()
        };

        let tail = if kernel.len() > 2 * tail_block_size {
            BlockConvolver::new(tail_block_size, &kernel[2 * tail_block_size..])?
        } else {
            BlockConvolver::default()
        };

        debug!(
            "three-stage convolver: kernel {} samples, head block {} ({} segs), neck block {} ({} segs), tail block {} ({} segs)",
            kernel.len(),
            head.block_size(),
            head.seg_count(),
            neck.block_size(),
            neck.seg_count(),
            tail.block_size(),
            tail.seg_count(),
        );

        Ok(Self {
            head,
            neck,
            tail,
            neck_buffers: DoubleBuffer::new(tail_block_size),
            tail_buffers: DoubleBuffer::new(tail_block_size),
            tail_input: vec![0.0; tail_block_size],
            tail_scratch: vec![0.0; tail_block_size],
            tail_fill: 0,
            neck_processed: 0,
            precalc_pos: 0,
            head_block_size,
            tail_block_size,
        })
    }

    /// Convolves `input` into `output` (same length). Never allocates,
    /// blocks or locks; safe to call from a real-time audio callback.
    /// Output is independent of how the caller chunks the stream.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());
        let len = input.len().min(output.len());

        // Head runs synchronously over the full range (zero-fills when the
        // kernel is empty).
        self.head.process(&input[..len], &mut output[..len]);

        if !self.neck.is_active() && !self.tail.is_active() {
            return;
        }

        let mut processed = 0;
        while processed < len {
            let processing = (len - processed)
                .min(self.head_block_size - (self.tail_fill % self.head_block_size));

            // Neck/tail contributions for this range were computed during
            // the previous tail cycle.
            if self.neck.is_active() {
                add_to(
                    &mut output[processed..processed + processing],
                    &self.neck_buffers.precalc()
                        [self.precalc_pos..self.precalc_pos + processing],
                );
            }
            if self.tail.is_active() {
                add_to(
                    &mut output[processed..processed + processing],
                    &self.tail_buffers.precalc()
                        [self.precalc_pos..self.precalc_pos + processing],
                );
            }
            self.precalc_pos += processing;

            self.tail_input[self.tail_fill..self.tail_fill + processing]
                .copy_from_slice(&input[processed..processed + processing]);
            self.tail_fill += processing;

            // Run the neck over every newly completed neck-block span of the
            // ring. Driven by absolute ring positions, so caller chunking
            // never moves the FFT trigger points.
            if self.neck.is_active() {
                let boundary = self.tail_fill - self.tail_fill % self.neck.block_size();
                if boundary > self.neck_processed {
                    let (start, end) = (self.neck_processed, boundary);
                    self.neck.process(
                        &self.tail_input[start..end],
                        &mut self.neck_buffers.output_mut()[start..end],
                    );
                    self.neck_processed = boundary;
                }
            }

            // Full tail block: rotate the double buffers and kick off the
            // tail pass whose result is consumed one cycle from now.
            if self.tail_fill == self.tail_block_size {
                if self.neck.is_active() {
                    self.neck_buffers.swap();
                }
                if self.tail.is_active() {
                    self.tail_buffers.swap();
                    self.tail_scratch.copy_from_slice(&self.tail_input);
                    self.tail
                        .process(&self.tail_scratch, self.tail_buffers.output_mut());
                }
                self.tail_fill = 0;
                self.neck_processed = 0;
                self.precalc_pos = 0;
            }

            processed += processing;
        }
    }

    /// Returns to a silent state without deallocating, preserving the
    /// kernel and block configuration. Not safe to call concurrently with
    /// `process`.
    pub fn reset(&mut self) {
        self.head.reset();
        self.neck.reset();
        self.tail.reset();
        self.neck_buffers.clear();
        self.tail_buffers.clear();
        self.tail_input.fill(0.0);
        self.tail_scratch.fill(0.0);
        self.tail_fill = 0;
        self.neck_processed = 0;
        self.precalc_pos = 0;
    }

    pub const fn head_block_size(&self) -> usize {
        self.head_block_size
    }

    pub const fn tail_block_size(&self) -> usize {
        self.tail_block_size
    }

    /// The head stage convolves synchronously, so the pipeline adds no
    /// latency of its own.
    pub const fn latency(&self) -> usize {
        0
    }
}

#[inline]
fn add_to(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}
