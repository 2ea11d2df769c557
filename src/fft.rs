use anyhow::Result;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

/// Scaling convention applied by the inverse transform.
///
/// `realfft` itself is unnormalized: a forward/inverse round trip gains a
/// factor of the FFT size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FftScaling {
    /// Raw backend output, round trip gains a factor of the FFT size.
    None,
    /// Inverse divides by the FFT size, round trip is unity gain.
    #[default]
    Normalized,
}

/// Real-to-complex FFT of one fixed power-of-two size.
///
/// Owns the forward/inverse plans plus all scratch and spectrum storage, so
/// `forward`/`inverse` never allocate once `allocate` has run.
pub struct Transform {
    size: usize,
    scaling: FftScaling,

    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    r2c_scratch: Vec<Complex<f32>>,
    c2r_scratch: Vec<Complex<f32>>,

    /// Zero-padded copy of the last `forward` input
    time_buffer: Vec<f32>,
    /// Spectrum of the last `forward` input, `size / 2 + 1` bins
    spectrum: Vec<Complex<f32>>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Creates an unallocated transform; `forward` is a no-op until
    /// `allocate` is called.
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            size: 0,
            scaling: FftScaling::default(),
            r2c: planner.plan_fft_forward(0),
            c2r: planner.plan_fft_inverse(0),
            r2c_scratch: Vec::new(),
            c2r_scratch: Vec::new(),
            time_buffer: Vec::new(),
            spectrum: Vec::new(),
        }
    }

    /// Plans forward and inverse transforms of exactly `size` real samples.
    ///
    /// Re-allocating with the same size and scaling is a no-op.
    pub fn allocate(&mut self, size: usize, scaling: FftScaling) {
        debug_assert!(size.is_power_of_two(), "FFT size must be a power of two");
        if size == self.size && scaling == self.scaling {
            return;
        }

        let mut planner = RealFftPlanner::<f32>::new();
        self.r2c = planner.plan_fft_forward(size);
        self.c2r = planner.plan_fft_inverse(size);
        self.r2c_scratch = self.r2c.make_scratch_vec();
        self.c2r_scratch = self.c2r.make_scratch_vec();

        self.time_buffer = vec![0.0; size];
        self.spectrum = vec![Complex::new(0.0, 0.0); size / 2 + 1];
        self.size = size;
        self.scaling = scaling;
    }

    /// Transforms `input` (zero-padded up to the FFT size) into the internal
    /// spectrum storage. Silent no-op when not allocated.
    pub fn forward(&mut self, input: &[f32]) -> Result<()> {
        if self.size == 0 {
            return Ok(());
        }
        debug_assert!(input.len() <= self.size, "forward input exceeds FFT size");

        let len = input.len().min(self.size);
        self.time_buffer[..len].copy_from_slice(&input[..len]);
        self.time_buffer[len..].fill(0.0);

        self.r2c
            .process_with_scratch(
                &mut self.time_buffer,
                &mut self.spectrum,
                &mut self.r2c_scratch,
            )
            .map_err(|e| anyhow::anyhow!("forward FFT failed: {e}"))?;
        Ok(())
    }

    /// Reconstructs `size` real samples from `spectrum` into `output`.
    ///
    /// The spectrum is consumed as scratch; its DC and Nyquist bins are
    /// forced real first, as `realfft` requires.
    pub fn inverse(&mut self, spectrum: &mut [Complex<f32>], output: &mut [f32]) -> Result<()> {
        if self.size == 0 {
            return Ok(());
        }
        debug_assert_eq!(spectrum.len(), self.size / 2 + 1);
        debug_assert_eq!(output.len(), self.size);

        spectrum[0].im = 0.0;
        if let Some(last) = spectrum.last_mut() {
            last.im = 0.0;
        }

        self.c2r
            .process_with_scratch(spectrum, output, &mut self.c2r_scratch)
            .map_err(|e| anyhow::anyhow!("inverse FFT failed: {e}"))?;

        if self.scaling == FftScaling::Normalized {
            let scale = 1.0 / self.size as f32;
            for s in output.iter_mut() {
                *s *= scale;
            }
        }
        Ok(())
    }

    /// View of the most recent `forward` result, `size / 2 + 1` complex bins.
    pub fn spectrum(&self) -> &[Complex<f32>] {
        &self.spectrum
    }

    pub const fn size(&self) -> usize {
        self.size
    }
}
