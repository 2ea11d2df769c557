use anyhow::Result;
use rustfft::num_complex::Complex;

use crate::fft::{FftScaling, Transform};

/// Uniform-partitioned frequency-domain convolver at one fixed block size.
///
/// The kernel is split into `ceil(len / block_size)` block-sized slices,
/// each pre-transformed once at construction. Incoming audio accumulates
/// into a block-sized buffer; every `process` call transforms the partial
/// block so output can be emitted immediately, which makes the convolver
/// latency-free at the cost of one FFT per call.
pub struct BlockConvolver {
    block_size: usize,
    seg_count: usize,

    /// Pre-transformed kernel slices, immutable after construction
    kernel_segments: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain input history ring, one slot per kernel segment
    input_segments: Vec<Vec<Complex<f32>>>,
    /// Ring slot holding the age-zero input partition
    current: usize,

    /// Time-domain input accumulator, 0..block_size filled
    input_buffer: Vec<f32>,
    input_fill: usize,

    /// Once-per-block sum of kernel segments 1..N against the ring
    premultiplied: Vec<Complex<f32>>,
    /// Full spectral product handed to the inverse transform
    conv: Vec<Complex<f32>>,
    /// Second half of the previous block's inverse transform
    overlap: Vec<f32>,
    /// Inverse transform output, 2 * block_size samples
    inverse_buffer: Vec<f32>,

    fft: Transform,
}

impl Default for BlockConvolver {
    /// An inactive convolver (no kernel); `process` zero-fills its output.
    fn default() -> Self {
        Self {
            block_size: 0,
            seg_count: 0,
            kernel_segments: Vec::new(),
            input_segments: Vec::new(),
            current: 0,
            input_buffer: Vec::new(),
            input_fill: 0,
            premultiplied: Vec::new(),
            conv: Vec::new(),
            overlap: Vec::new(),
            inverse_buffer: Vec::new(),
            fft: Transform::new(),
        }
    }
}

impl BlockConvolver {
    /// Builds a convolver for `kernel` at `block_size` (rounded up to the
    /// next power of two). The one-time cost of transforming every kernel
    /// slice lives here, not in `process`.
    pub fn new(block_size: usize, kernel: &[f32]) -> Result<Self> {
        let block_size = block_size.max(1).next_power_of_two();
        let seg_count = kernel.len().div_ceil(block_size);
        if seg_count == 0 {
            return Ok(Self::default());
        }

        // FFT size is twice the block so a full block convolved with a full
        // kernel slice fits without circular wrap-around.
        let bins = block_size + 1;
        let mut fft = Transform::new();
        fft.allocate(2 * block_size, FftScaling::Normalized);

        let mut kernel_segments = Vec::with_capacity(seg_count);
        for s in 0..seg_count {
            let start = s * block_size;
            let end = ((s + 1) * block_size).min(kernel.len());
            fft.forward(&kernel[start..end])?;
            kernel_segments.push(fft.spectrum().to_vec());
        }

        Ok(Self {
            block_size,
            seg_count,
            kernel_segments,
            input_segments: vec![vec![Complex::new(0.0, 0.0); bins]; seg_count],
            current: 0,
            input_buffer: vec![0.0; block_size],
            input_fill: 0,
            premultiplied: vec![Complex::new(0.0, 0.0); bins],
            conv: vec![Complex::new(0.0, 0.0); bins],
            overlap: vec![0.0; block_size],
            inverse_buffer: vec![0.0; 2 * block_size],
            fft,
        })
    }

    /// Convolves `input` into `output` (same length). May be fed in any
    /// chunk granularity; all state transitions are driven by absolute
    /// sample counts, so the output is independent of call boundaries.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());
        if self.seg_count == 0 {
            output.fill(0.0);
            return;
        }

        let len = input.len().min(output.len());
        let mut processed = 0;
        while processed < len {
            let block_started = self.input_fill == 0;
            let processing = (len - processed).min(self.block_size - self.input_fill);
            let pos = self.input_fill;

            self.input_buffer[pos..pos + processing]
                .copy_from_slice(&input[processed..processed + processing]);

            // Transform the zero-padded accumulator into the age-zero ring slot.
            if self.fft.forward(&self.input_buffer).is_err() {
                output[processed..len].fill(0.0);
                return;
            }
            self.input_segments[self.current].copy_from_slice(self.fft.spectrum());

            // Segments 1..N don't involve the current partition, so their sum
            // only needs recomputing once per block.
            if block_started {
                self.premultiplied.fill(Complex::new(0.0, 0.0));
                for i in 1..self.seg_count {
                    let slot = (self.current + i) % self.seg_count;
                    multiply_accumulate(
                        &mut self.premultiplied,
                        &self.kernel_segments[i],
                        &self.input_segments[slot],
                    );
                }
            }

            self.conv.copy_from_slice(&self.premultiplied);
            multiply_accumulate(
                &mut self.conv,
                &self.kernel_segments[0],
                &self.input_segments[self.current],
            );

            if self
                .fft
                .inverse(&mut self.conv, &mut self.inverse_buffer)
                .is_err()
            {
                output[processed..len].fill(0.0);
                return;
            }

            // Overlap-add against the previous block's tail half.
            for i in 0..processing {
                output[processed + i] = self.inverse_buffer[pos + i] + self.overlap[pos + i];
            }

            self.input_fill += processing;
            if self.input_fill == self.block_size {
                self.input_buffer.fill(0.0);
                self.input_fill = 0;

                self.overlap
                    .copy_from_slice(&self.inverse_buffer[self.block_size..]);

                // Retreat so the next block's partition lands on the slot the
                // (current + i) addressing expects.
                self.current = if self.current > 0 {
                    self.current - 1
                } else {
                    self.seg_count - 1
                };
            }
            processed += processing;
        }
    }

    /// Returns to a silent state without deallocating; the kernel is kept.
    pub fn reset(&mut self) {
        for seg in &mut self.input_segments {
            seg.fill(Complex::new(0.0, 0.0));
        }
        self.current = 0;
        self.input_buffer.fill(0.0);
        self.input_fill = 0;
        self.premultiplied.fill(Complex::new(0.0, 0.0));
        self.conv.fill(Complex::new(0.0, 0.0));
        self.overlap.fill(0.0);
        self.inverse_buffer.fill(0.0);
    }

    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    pub const fn seg_count(&self) -> usize {
        self.seg_count
    }

    pub const fn is_active(&self) -> bool {
        self.seg_count > 0
    }
}

#[inline]
fn multiply_accumulate(acc: &mut [Complex<f32>], a: &[Complex<f32>], b: &[Complex<f32>]) {
    debug_assert_eq!(acc.len(), a.len());
    debug_assert_eq!(acc.len(), b.len());
    for ((acc, a), b) in acc.iter_mut().zip(a).zip(b) {
        *acc += a * b;
    }
}
