use anyhow::{Result, bail};

use crate::convolver::ThreeStageConvolver;

/// Per-sample tolerances for comparing engine output against the direct
/// reference. Wider kernels accumulate more rounding across partitions, so
/// both bounds grow with the kernel length.
#[derive(Clone, Copy, Debug)]
pub struct Tolerance {
    pub abs: f32,
    pub rel: f32,
}

impl Tolerance {
    pub fn for_kernel(kernel_len: usize) -> Self {
        let len = kernel_len.max(1) as f32;
        Self {
            abs: 0.001 * len,
            rel: 0.0001 * len.ln(),
        }
    }

    /// A sample pair matches when it is inside either bound.
    pub fn matches(&self, got: f32, expected: f32) -> bool {
        let diff = (got - expected).abs();
        if diff <= self.abs {
            return true;
        }
        diff <= self.rel * expected.abs().max(f32::EPSILON)
    }
}

/// Direct O(n * m) linear convolution, truncated to the input length.
/// The comparison oracle for the partitioned engine.
pub fn direct_convolve(input: &[f32], kernel: &[f32]) -> Vec<f32> {
    let mut output = vec![0.0f32; input.len()];
    for (n, out) in output.iter_mut().enumerate() {
        let mut acc = 0.0f64;
        for (k, &h) in kernel.iter().enumerate().take(n + 1) {
            acc += f64::from(h) * f64::from(input[n - k]);
        }
        *out = acc as f32;
    }
    output
}

/// Runs a fresh engine over `input` in mixed-size chunks and compares every
/// output sample against the direct reference. This is the primary
/// correctness harness; the integration tests call it across head/tail/
/// kernel-length combinations.
pub fn self_test(head_size: usize, tail_size: usize, kernel: &[f32], input: &[f32]) -> Result<()> {
    let mut engine = ThreeStageConvolver::new(head_size, tail_size, kernel)?;

    let mut output = vec![0.0f32; input.len()];
    // Chunk sizes cycle through sub-block, block and multi-block lengths.
    let chunk_sizes = [1, 3, head_size.max(1), 2 * tail_size.max(1) + 1];
    let mut pos = 0;
    let mut turn = 0;
    while pos < input.len() {
        let n = chunk_sizes[turn % chunk_sizes.len()].min(input.len() - pos);
        engine.process(&input[pos..pos + n], &mut output[pos..pos + n]);
        pos += n;
        turn += 1;
    }

    let expected = direct_convolve(input, kernel);
    let tolerance = Tolerance::for_kernel(kernel.len());
    for (i, (&got, &want)) in output.iter().zip(expected.iter()).enumerate() {
        if !tolerance.matches(got, want) {
            bail!(
                "engine output diverges from reference at sample {}: got {}, expected {} (abs tol {}, rel tol {})",
                i,
                got,
                want,
                tolerance.abs,
                tolerance.rel
            );
        }
    }
    Ok(())
}
