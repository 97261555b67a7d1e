// Spectral analysis for separated stems
// Spectral-flux onset detection, the stem feature vector used for instrument
// classification, and the spectrogram/chroma representations consumed by the
// transcription algorithms

use realfft::RealFftPlanner;

/// Detected note onset
#[derive(Debug, Clone)]
pub struct Onset {
    /// Timestamp in seconds from start of the stem
    pub time: f64,

    /// Onset strength [0.0, 1.0], relative to the adaptive threshold
    pub strength: f32,
}

/// Configuration for onset detection
#[derive(Debug, Clone)]
pub struct OnsetConfig {
    /// FFT window size in samples (power of 2)
    pub window_size: usize,

    /// Hop size in samples (advance between frames)
    pub hop_size: usize,

    /// Threshold multiplier for adaptive peak picking
    /// Threshold = mean(flux) + threshold_factor * std(flux)
    pub threshold_factor: f32,

    /// Minimum time between onsets in milliseconds
    pub min_onset_gap_ms: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            window_size: 2048,
            hop_size: 512,
            threshold_factor: 1.5,
            min_onset_gap_ms: 50.0,
        }
    }
}

/// The fixed per-stem feature vector used for instrument classification
#[derive(Debug, Clone, PartialEq)]
pub struct StemFeatures {
    /// Mean first cepstral coefficient over all frames
    pub cepstral_c0: f32,

    /// Mean spectral centroid in Hz
    pub spectral_centroid: f32,

    /// Mean zero-crossing rate (crossings per sample)
    pub zcr: f32,

    /// Mean RMS energy
    pub rms: f32,
}

impl StemFeatures {
    pub fn zero() -> Self {
        StemFeatures {
            cepstral_c0: 0.0,
            spectral_centroid: 0.0,
            zcr: 0.0,
            rms: 0.0,
        }
    }

    /// Feature vector layout shared with the classifier's reference table
    pub fn as_vector(&self) -> [f32; 4] {
        [self.cepstral_c0, self.spectral_centroid, self.zcr, self.rms]
    }
}

/// Magnitude spectrogram of a mono stem
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Per-frame magnitude spectra (frames x bins)
    pub mags: Vec<Vec<f32>>,

    pub window_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    /// Frequency width of one FFT bin in Hz
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate as f32 / self.window_size as f32
    }

    /// Timestamp of a frame in seconds
    pub fn frame_time(&self, frame_idx: usize) -> f64 {
        (frame_idx * self.hop_size) as f64 / self.sample_rate as f64
    }

    pub fn num_frames(&self) -> usize {
        self.mags.len()
    }
}

/// Convert a frequency in Hz to a (fractional) MIDI note number
pub fn hz_to_midi(hz: f32) -> f32 {
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// Compute the magnitude spectrogram of a mono signal
pub fn magnitude_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    window_size: usize,
    hop_size: usize,
) -> Spectrogram {
    let mut mags = Vec::new();

    if hop_size > 0 && samples.len() >= window_size {
        let num_frames = (samples.len() - window_size) / hop_size + 1;
        for frame_idx in 0..num_frames {
            let start = frame_idx * hop_size;
            let mut windowed = samples[start..start + window_size].to_vec();
            apply_hann_window(&mut windowed);
            mags.push(compute_fft(&windowed));
        }
    }

    Spectrogram {
        mags,
        window_size,
        hop_size,
        sample_rate,
    }
}

/// Fold a magnitude spectrogram into per-frame pitch-class (chroma) energy
pub fn chroma_frames(spec: &Spectrogram) -> Vec<[f32; 12]> {
    let bin_hz = spec.bin_hz();

    spec.mags
        .iter()
        .map(|mags| {
            let mut chroma = [0.0f32; 12];
            for (bin, &mag) in mags.iter().enumerate().skip(1) {
                let hz = bin as f32 * bin_hz;
                if hz < 20.0 {
                    continue;
                }
                let class = (hz_to_midi(hz).round() as i64).rem_euclid(12) as usize;
                chroma[class] += mag;
            }
            chroma
        })
        .collect()
}

/// Extract the 4-dimensional classification feature vector for a whole stem
/// Frame-wise computation, averaged over all frames
pub fn extract_stem_features(samples: &[f32], sample_rate: u32) -> StemFeatures {
    if samples.is_empty() {
        return StemFeatures::zero();
    }

    let window_size = 2048;
    let hop_size = 512;

    // Short stems get a single zero-padded frame
    let padded;
    let frames_input = if samples.len() < window_size {
        let mut buf = vec![0.0; window_size];
        buf[..samples.len()].copy_from_slice(samples);
        padded = buf;
        &padded[..]
    } else {
        samples
    };

    let num_frames = (frames_input.len() - window_size) / hop_size + 1;
    let bin_hz = sample_rate as f32 / window_size as f32;

    let mut sum_c0 = 0.0;
    let mut sum_centroid = 0.0;
    let mut sum_zcr = 0.0;
    let mut sum_rms = 0.0;

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_size;
        let frame = &frames_input[start..start + window_size];

        sum_zcr += calculate_zcr(frame);
        sum_rms += calculate_rms(frame);

        let mut windowed = frame.to_vec();
        apply_hann_window(&mut windowed);
        let mags = compute_fft(&windowed);

        sum_centroid += spectral_centroid(&mags, bin_hz);
        sum_c0 += cepstral_c0(&mags);
    }

    let n = num_frames as f32;
    StemFeatures {
        cepstral_c0: sum_c0 / n,
        spectral_centroid: sum_centroid / n,
        zcr: sum_zcr / n,
        rms: sum_rms / n,
    }
}

/// Detect onsets in a mono signal using spectral flux with an adaptive
/// threshold, refined to sample accuracy against the amplitude envelope
pub fn detect_onsets(samples: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<Onset> {
    if samples.is_empty() || sample_rate == 0 || config.hop_size == 0 {
        return Vec::new();
    }

    let flux = spectral_flux(samples, config);
    if flux.is_empty() {
        return Vec::new();
    }

    let mean = flux.iter().sum::<f32>() / flux.len() as f32;
    let variance = flux.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / flux.len() as f32;
    let std_dev = variance.sqrt();
    let threshold = mean + config.threshold_factor * std_dev;

    let min_gap_frames =
        ((config.min_onset_gap_ms / 1000.0 * sample_rate as f64) as usize) / config.hop_size;

    let mut onsets = Vec::new();
    let mut last_onset_frame: Option<usize> = None;

    for i in 0..flux.len() {
        // Local maximum; the first frame counts so that an onset at time
        // zero is not missed
        let rising = i == 0 || flux[i] >= flux[i - 1];
        let falling = i + 1 >= flux.len() || flux[i] > flux[i + 1];
        let above = flux[i] > threshold;
        let gap_ok = last_onset_frame.map_or(true, |last| i - last >= min_gap_frames);

        if rising && falling && above && gap_ok {
            let time = refine_onset_time(samples, i, config, sample_rate);
            let strength = ((flux[i] - threshold) / (std_dev + 1e-6)).clamp(0.0, 1.0);

            onsets.push(Onset { time, strength });
            last_onset_frame = Some(i);
        }
    }

    onsets
}

/// Compute spectral flux for all frames
/// Flux = sum of positive differences between consecutive magnitude spectra;
/// the frame before the first is treated as silence
fn spectral_flux(samples: &[f32], config: &OnsetConfig) -> Vec<f32> {
    let window_size = config.window_size;
    let hop_size = config.hop_size;

    if samples.len() < window_size {
        return Vec::new();
    }

    let num_frames = (samples.len() - window_size) / hop_size + 1;
    let mut flux = Vec::with_capacity(num_frames);
    let mut prev_spectrum = vec![0.0f32; window_size / 2 + 1];

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_size;
        let mut windowed = samples[start..start + window_size].to_vec();
        apply_hann_window(&mut windowed);
        let spectrum = compute_fft(&windowed);

        let mut sum = 0.0;
        for (curr, prev) in spectrum.iter().zip(prev_spectrum.iter()) {
            let diff = curr - prev;
            if diff > 0.0 {
                sum += diff;
            }
        }

        flux.push(sum);
        prev_spectrum = spectrum;
    }

    flux
}

/// Snap a frame-resolution onset estimate to the first sample that clears an
/// amplitude gate relative to the local peak. Falls back to the frame
/// timestamp when there is no quiet run-in to snap against.
fn refine_onset_time(
    samples: &[f32],
    frame_idx: usize,
    config: &OnsetConfig,
    sample_rate: u32,
) -> f64 {
    let frame_start = frame_idx * config.hop_size;
    let frame_time = frame_start as f64 / sample_rate as f64;

    let search_start = frame_start.saturating_sub(2 * config.hop_size);
    let search_end = (frame_start + config.window_size).min(samples.len());
    if search_start >= search_end {
        return frame_time;
    }

    let window = &samples[search_start..search_end];
    let peak = window.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak <= 0.0 {
        return frame_time;
    }

    let gate = peak * 0.2;
    match window.iter().position(|s| s.abs() >= gate) {
        // A crossing at the very start means the search window has no quiet
        // run-in, so the envelope tells us nothing
        Some(0) | None => frame_time,
        Some(j) => (search_start + j) as f64 / sample_rate as f64,
    }
}

/// Calculate zero-crossing rate (sign changes per sample)
fn calculate_zcr(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let mut crossings = 0;
    for i in 1..samples.len() {
        if (samples[i] >= 0.0) != (samples[i - 1] >= 0.0) {
            crossings += 1;
        }
    }

    crossings as f32 / (samples.len() - 1) as f32
}

/// Root-mean-square energy of a frame
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Spectral centroid (center of mass of the magnitude spectrum) in Hz
fn spectral_centroid(mags: &[f32], bin_hz: f32) -> f32 {
    let mut weighted_sum = 0.0;
    let mut total = 0.0;

    for (bin, &mag) in mags.iter().enumerate() {
        weighted_sum += bin as f32 * bin_hz * mag;
        total += mag;
    }

    if total > 0.0 {
        weighted_sum / total
    } else {
        0.0
    }
}

/// First (zeroth-order) cepstral coefficient: the DC term of the DCT of the
/// log magnitude spectrum, i.e. the mean log magnitude
fn cepstral_c0(mags: &[f32]) -> f32 {
    if mags.is_empty() {
        return 0.0;
    }
    let sum: f32 = mags.iter().map(|m| (m + 1e-10).ln()).sum();
    sum / mags.len() as f32
}

/// Apply Hann window function to reduce spectral leakage
fn apply_hann_window(samples: &mut [f32]) {
    let n = samples.len();
    if n == 0 {
        return;
    }

    for (i, s) in samples.iter_mut().enumerate() {
        let window_val = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos());
        *s *= window_val;
    }
}

/// Compute real FFT and return the magnitude spectrum
fn compute_fft(samples: &[f32]) -> Vec<f32> {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(samples.len());

    let mut input = samples.to_vec();
    let mut spectrum = fft.make_output_vec();

    fft.process(&mut input, &mut spectrum).unwrap();

    spectrum.iter().map(|c| c.norm()).collect()
}
