//! Discrete Fourier transforms on preallocated swap buffers.
//!
//! Two algorithm variants coexist behind one type: a linear transform that
//! accepts any even length, and a radix-2 FFT for powers of two. The linear
//! variant exists to validate the FFT; the FFT is the default for audio
//! processing. Unit roots are precomputed once per instance, exploiting
//! half/quarter-circle symmetry. Data parallelism is opt-in per call and
//! must stay off on the real-time path.

use num_complex::Complex32;
use rayon::prelude::*;
use std::f32::consts::TAU;

/// One-sided spectrum length for a given signal length
#[inline]
pub const fn nyquist_length(signal_length: usize) -> usize {
    signal_length / 2 + 1
}

/// Signal length for a given one-sided spectrum length
#[inline]
pub const fn signal_length(nyquist_length: usize) -> usize {
    2 * (nyquist_length - 1)
}

/// Frequency spacing between adjacent bins
#[inline]
pub fn bin_frequency_step(signal_length: usize, sample_rate: f32) -> f32 {
    sample_rate / signal_length as f32
}

/// Transform algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Direct evaluation of the transform sum; any even length
    Linear,
    /// Radix-2 decimation; length must be a power of two
    Fft,
}

/// Forward/inverse Fourier transform engine with preallocated scratch
#[derive(Debug)]
pub struct Transform {
    algorithm: Algorithm,
    unit_roots: Vec<Complex32>,
    in_swap: Vec<Complex32>,
    out_swap: Vec<Complex32>,
}

/// Precompute the N-th unit roots, rotating precomputed quarter/half arcs
/// instead of evaluating polar coordinates for the whole circle
fn unit_roots(n: usize) -> Vec<Complex32> {
    let mut roots = vec![Complex32::new(0.0, 0.0); n];
    let angle = TAU / n as f32;
    let init = |roots: &mut [Complex32], count: usize| {
        for (i, root) in roots.iter_mut().enumerate().take(count) {
            *root = Complex32::from_polar(1.0, i as f32 * angle);
        }
    };

    if n % 2 == 0 {
        let half = n / 2;
        if n % 4 == 0 {
            let quarter = half / 2;
            init(&mut roots, quarter);
            for i in 0..quarter {
                let c = roots[i];
                roots[quarter + i] = Complex32::new(-c.im, c.re);
            }
        } else {
            init(&mut roots, half);
        }
        for i in 0..half {
            let c = roots[i];
            roots[half + i] = Complex32::new(-c.re, -c.im);
        }
    } else {
        init(&mut roots, n);
    }
    roots
}

/// Direct transform sum: out[k] = Σ_j in[j]·root(j·k)
fn linear_pass(
    input: &[Complex32],
    output: &mut [Complex32],
    root: &(impl Fn(usize) -> Complex32 + Sync),
    parallel: bool,
) {
    let n = input.len();
    debug_assert_eq!(n, output.len());

    let compute = |k: usize| {
        let mut acc = Complex32::new(0.0, 0.0);
        for (j, &value) in input.iter().enumerate() {
            acc += value * root(j * k);
        }
        acc
    };

    if parallel {
        output
            .par_iter_mut()
            .enumerate()
            .for_each(|(k, out)| *out = compute(k));
    } else {
        for (k, out) in output.iter_mut().enumerate() {
            *out = compute(k);
        }
    }
}

/// Radix-2 passes over the two swap buffers. Each pass halves the partition
/// size; every partition shares a single twiddle, so the butterflies reduce
/// to chunked multiply-adds. The result lands in `out_swap`.
fn fft_passes(
    in_swap: &mut Vec<Complex32>,
    out_swap: &mut Vec<Complex32>,
    root: &(impl Fn(usize) -> Complex32 + Sync),
    parallel: bool,
) {
    let n = in_swap.len();
    debug_assert_eq!(n, out_swap.len());
    let half = n / 2;

    let mut num_partitions = 1;
    while num_partitions < n {
        let partition_size = n / (num_partitions * 2);
        {
            let (out_lo, out_hi) = out_swap.split_at_mut(half);
            let butterfly =
                |k: usize, input: &[Complex32], lo: &mut [Complex32], hi: &mut [Complex32]| {
                    let root_k = root(partition_size * k);
                    for shift in 0..partition_size {
                        let product = root_k * input[partition_size + shift];
                        lo[shift] = input[shift] + product;
                        hi[shift] = input[shift] - product;
                    }
                };

            if parallel {
                in_swap
                    .par_chunks(2 * partition_size)
                    .zip(
                        out_lo
                            .par_chunks_mut(partition_size)
                            .zip(out_hi.par_chunks_mut(partition_size)),
                    )
                    .enumerate()
                    .for_each(|(k, (input, (lo, hi)))| butterfly(k, input, lo, hi));
            } else {
                in_swap
                    .chunks(2 * partition_size)
                    .zip(
                        out_lo
                            .chunks_mut(partition_size)
                            .zip(out_hi.chunks_mut(partition_size)),
                    )
                    .enumerate()
                    .for_each(|(k, (input, (lo, hi)))| butterfly(k, input, lo, hi));
            }
        }
        std::mem::swap(in_swap, out_swap);
        num_partitions *= 2;
    }
    std::mem::swap(in_swap, out_swap);
}

impl Transform {
    /// Build a transform for the given signal length. The linear variant
    /// requires an even length greater than one, the FFT a power of two.
    pub fn new(algorithm: Algorithm, signal_length: usize) -> Self {
        match algorithm {
            Algorithm::Linear => {
                assert!(
                    signal_length > 1 && signal_length % 2 == 0,
                    "linear transform needs an even length > 1, got {}",
                    signal_length
                );
            }
            Algorithm::Fft => {
                assert!(
                    signal_length > 1 && signal_length.is_power_of_two(),
                    "fft needs a power-of-two length > 1, got {}",
                    signal_length
                );
            }
        }
        Self {
            algorithm,
            unit_roots: unit_roots(signal_length),
            in_swap: vec![Complex32::new(0.0, 0.0); signal_length],
            out_swap: vec![Complex32::new(0.0, 0.0); signal_length],
        }
    }

    #[inline]
    pub fn signal_length(&self) -> usize {
        self.unit_roots.len()
    }

    #[inline]
    pub fn nyquist_length(&self) -> usize {
        nyquist_length(self.signal_length())
    }

    fn run(
        algorithm: Algorithm,
        in_swap: &mut Vec<Complex32>,
        out_swap: &mut Vec<Complex32>,
        root: &(impl Fn(usize) -> Complex32 + Sync),
        parallel: bool,
    ) {
        match algorithm {
            Algorithm::Linear => linear_pass(in_swap, out_swap, root, parallel),
            Algorithm::Fft => fft_passes(in_swap, out_swap, root, parallel),
        }
    }

    /// Forward complex transform of a full-length signal
    pub fn transform(&mut self, signal: &[Complex32], coefficients: &mut [Complex32], parallel: bool) {
        let n = self.signal_length();
        debug_assert_eq!(signal.len(), n);
        debug_assert_eq!(coefficients.len(), n);

        self.in_swap.resize(n, Complex32::new(0.0, 0.0));
        self.out_swap.resize(n, Complex32::new(0.0, 0.0));
        self.in_swap.copy_from_slice(signal);

        let roots = &self.unit_roots;
        let root = negative_root(roots);
        Self::run(self.algorithm, &mut self.in_swap, &mut self.out_swap, &root, parallel);
        coefficients.copy_from_slice(&self.out_swap);
    }

    /// Inverse complex transform, normalized by 1/N
    pub fn transform_inverse(
        &mut self,
        coefficients: &[Complex32],
        signal: &mut [Complex32],
        parallel: bool,
    ) {
        let n = self.signal_length();
        debug_assert_eq!(coefficients.len(), n);
        debug_assert_eq!(signal.len(), n);

        self.in_swap.resize(n, Complex32::new(0.0, 0.0));
        self.out_swap.resize(n, Complex32::new(0.0, 0.0));
        self.in_swap.copy_from_slice(coefficients);

        let roots = &self.unit_roots;
        let root = positive_root(roots);
        Self::run(self.algorithm, &mut self.in_swap, &mut self.out_swap, &root, parallel);

        let factor = 1.0 / n as f32;
        for (out, &value) in signal.iter_mut().zip(self.out_swap.iter()) {
            *out = value * factor;
        }
    }

    /// Forward transform of a real signal into the one-sided spectrum.
    /// Runs a half-length complex transform on interleaved even/odd samples
    /// and deflates via the Hermitian combination; the DC and Nyquist
    /// coefficients come out purely real.
    pub fn transform_real(&mut self, signal: &[f32], coefficients: &mut [Complex32], parallel: bool) {
        let full = self.signal_length();
        debug_assert_eq!(signal.len(), full);
        debug_assert_eq!(coefficients.len(), self.nyquist_length());

        let n = full / 2;
        self.in_swap.resize(n, Complex32::new(0.0, 0.0));
        self.out_swap.resize(n, Complex32::new(0.0, 0.0));
        for (i, value) in self.in_swap.iter_mut().enumerate() {
            *value = Complex32::new(signal[2 * i], signal[2 * i + 1]);
        }

        let roots = &self.unit_roots;
        let root = negative_root(roots);
        let half_root = |i: usize| root(2 * i);
        Self::run(self.algorithm, &mut self.in_swap, &mut self.out_swap, &half_root, parallel);

        let out = &mut self.out_swap;
        out.resize(n + 1, Complex32::new(0.0, 0.0));
        let packed = out[0];
        out[n] = Complex32::new(packed.re - packed.im, 0.0);
        out[0] = Complex32::new(packed.re + packed.im, 0.0);

        // split bin k into the transforms of the even and odd sample streams
        let even_and_odd = |out: &[Complex32], k: usize| {
            let even = 0.5 * (out[k] + out[n - k].conj());
            let odd = 0.5 * Complex32::new(out[k].im + out[n - k].im, out[n - k].re - out[k].re);
            (even, odd)
        };

        for k in 1..=n / 2 {
            let (even_k, odd_k) = even_and_odd(out, k);
            let (even_mirror, odd_mirror) = even_and_odd(out, n - k);
            out[k] = even_k + root(k) * odd_k;
            out[n - k] = even_mirror + root(n - k) * odd_mirror;
        }

        coefficients.copy_from_slice(out);
    }

    /// Inverse transform of a one-sided spectrum back to a real signal.
    /// The caller guarantees real-valued DC and Nyquist coefficients.
    pub fn transform_inverse_real(
        &mut self,
        coefficients: &[Complex32],
        signal: &mut [f32],
        parallel: bool,
    ) {
        let n = self.signal_length();
        let nyquist = self.nyquist_length();
        debug_assert_eq!(coefficients.len(), nyquist);
        debug_assert_eq!(signal.len(), n);
        debug_assert!(coefficients[0].im.abs() < 1e-3);
        debug_assert!(coefficients[nyquist - 1].im.abs() < 1e-3);

        self.in_swap.resize(n, Complex32::new(0.0, 0.0));
        self.out_swap.resize(n, Complex32::new(0.0, 0.0));
        self.in_swap[..nyquist].copy_from_slice(coefficients);
        make_second_half_conjugate(&mut self.in_swap);

        let roots = &self.unit_roots;
        let root = positive_root(roots);
        Self::run(self.algorithm, &mut self.in_swap, &mut self.out_swap, &root, parallel);

        let factor = 1.0 / n as f32;
        for (out, value) in signal.iter_mut().zip(self.out_swap.iter()) {
            *out = value.re * factor;
        }
    }
}

/// Root getter for inverse transforms: root(i) = e^(+2πi·i/N)
fn positive_root(roots: &[Complex32]) -> impl Fn(usize) -> Complex32 + Sync + '_ {
    let n = roots.len();
    move |i| roots[i % n]
}

/// Root getter for forward transforms: root(i) = e^(-2πi·i/N)
fn negative_root(roots: &[Complex32]) -> impl Fn(usize) -> Complex32 + Sync + '_ {
    let n = roots.len();
    move |i| {
        let i = i % n;
        roots[(i * (n - 1)) % n]
    }
}

/// Mirror the first half of a full-length spectrum into the second as
/// complex conjugates, producing the spectrum of a real signal
fn make_second_half_conjugate(coefficients: &mut [Complex32]) {
    let n = coefficients.len();
    for k in 1..n / 2 {
        coefficients[n - k] = coefficients[k].conj();
    }
}
