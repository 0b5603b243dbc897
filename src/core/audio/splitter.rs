//! PCM silence splitter.
//!
//! Partitions one TTS response holding several concatenated utterances
//! into per-entry segments. The combined prompt asks the voice model
//! for a deliberate pause between entries, so the gaps show up as
//! long low-energy runs in the PCM stream.
//!
//! Detection is two-pass RMS hysteresis over 50 ms windows: a strict
//! pass for clean gaps, a lenient pass when the strict one comes up
//! short, and an evenly-spaced fallback snapped to local energy minima
//! when even that fails. Selection is fully deterministic.

/// Analysis window length.
const WINDOW_MS: u64 = 50;

/// A silence run must last this long to count (strict pass).
const STRICT_MIN_SILENCE_MS: u64 = 2_000;
/// Relaxed minimum for the lenient pass.
const LENIENT_MIN_SILENCE_MS: u64 = 1_500;

// Hysteresis thresholds in raw i16 RMS units. A run starts when the
// window RMS drops below the enter threshold and ends when it rises
// above the exit threshold.
const STRICT_ENTER_RMS: f64 = 250.0;
const STRICT_EXIT_RMS: f64 = 500.0;
const LENIENT_ENTER_RMS: f64 = 800.0;
const LENIENT_EXIT_RMS: f64 = 1_200.0;

/// Minimum spacing between two selected split points.
const MIN_SPLIT_SPACING_MS: u64 = 500;

/// Fallback points snap to the quietest window within this many
/// windows on either side.
const SNAP_RADIUS_WINDOWS: usize = 10;

/// A detected silence run.
#[derive(Debug, Clone, Copy)]
struct SilenceRun {
    /// Sample index at the middle of the run.
    mid_sample: usize,
    duration_ms: u64,
    min_rms: f64,
}

impl SilenceRun {
    /// Longer and deeper silences win.
    fn score(&self) -> f64 {
        10.0 * self.duration_ms as f64 + (1_500.0 - self.min_rms).max(0.0)
    }
}

/// Split a 16-bit signed little-endian mono PCM buffer into exactly
/// `expected_count` contiguous segments whose concatenation equals the
/// input. Segments at the ends may be empty.
pub fn split_pcm(pcm: &[u8], sample_rate: u32, expected_count: usize) -> Vec<Vec<u8>> {
    if expected_count <= 1 {
        return vec![pcm.to_vec()];
    }

    let samples = decode_samples(pcm);
    let window_len = ((sample_rate as u64 * WINDOW_MS) / 1_000).max(1) as usize;
    let rms = window_rms(&samples, window_len);

    let needed = expected_count - 1;

    // Pass A: strict thresholds, long runs only.
    let mut candidates = find_silence_runs(
        &rms,
        window_len,
        STRICT_ENTER_RMS,
        STRICT_EXIT_RMS,
        STRICT_MIN_SILENCE_MS,
    );

    // Pass B: relax if the strict pass came up short. Lenient runs
    // subsume strict ones, so the pool is replaced, not merged.
    if candidates.len() < needed {
        candidates = find_silence_runs(
            &rms,
            window_len,
            LENIENT_ENTER_RMS,
            LENIENT_EXIT_RMS,
            LENIENT_MIN_SILENCE_MS,
        );
    }

    let spacing = ((sample_rate as u64 * MIN_SPLIT_SPACING_MS) / 1_000) as usize;
    let mut cuts = select_cut_points(&candidates, needed, spacing);

    // Fallback: evenly spaced points snapped to the local energy
    // minimum, honoring spacing first and ignoring it if the buffer is
    // too crowded to satisfy it.
    if cuts.len() < needed {
        fill_evenly(
            &mut cuts,
            needed,
            expected_count,
            samples.len(),
            &rms,
            window_len,
            spacing,
        );
    }

    cuts.sort_unstable();
    slice_segments(pcm, &cuts, expected_count)
}

fn decode_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Per-window RMS. The trailing partial window is included.
fn window_rms(samples: &[i16], window_len: usize) -> Vec<f64> {
    samples
        .chunks(window_len)
        .map(|window| {
            let sum: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
            (sum / window.len() as f64).sqrt()
        })
        .collect()
}

/// Hysteresis scan: a run opens when RMS drops below `enter` and
/// closes when it rises above `exit`. Runs shorter than `min_ms` are
/// discarded.
fn find_silence_runs(
    rms: &[f64],
    window_len: usize,
    enter: f64,
    exit: f64,
    min_ms: u64,
) -> Vec<SilenceRun> {
    let min_windows = (min_ms / WINDOW_MS).max(1) as usize;
    let mut runs = Vec::new();

    let mut start: Option<usize> = None;
    let mut min_rms = f64::MAX;

    for (idx, &value) in rms.iter().enumerate() {
        match start {
            None => {
                if value < enter {
                    start = Some(idx);
                    min_rms = value;
                }
            }
            Some(run_start) => {
                if value > exit {
                    push_run(&mut runs, run_start, idx, min_rms, min_windows, window_len);
                    start = None;
                    min_rms = f64::MAX;
                } else {
                    min_rms = min_rms.min(value);
                }
            }
        }
    }

    if let Some(run_start) = start {
        push_run(&mut runs, run_start, rms.len(), min_rms, min_windows, window_len);
    }

    runs
}

fn push_run(
    runs: &mut Vec<SilenceRun>,
    start_window: usize,
    end_window: usize,
    min_rms: f64,
    min_windows: usize,
    window_len: usize,
) {
    let len = end_window - start_window;
    if len < min_windows {
        return;
    }
    let mid_window = start_window + len / 2;
    runs.push(SilenceRun {
        mid_sample: mid_window * window_len + window_len / 2,
        duration_ms: len as u64 * WINDOW_MS,
        min_rms,
    });
}

/// Greedy pick of up to `needed` run midpoints, best score first, with
/// a minimum spacing between picks. Ties break on position so the
/// selection is stable for a fixed input.
fn select_cut_points(candidates: &[SilenceRun], needed: usize, spacing: usize) -> Vec<usize> {
    let mut ranked: Vec<&SilenceRun> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.mid_sample.cmp(&b.mid_sample))
    });

    let mut cuts: Vec<usize> = Vec::with_capacity(needed);
    for run in ranked {
        if cuts.len() == needed {
            break;
        }
        if cuts
            .iter()
            .all(|&c| c.abs_diff(run.mid_sample) >= spacing)
        {
            cuts.push(run.mid_sample);
        }
    }
    cuts
}

fn fill_evenly(
    cuts: &mut Vec<usize>,
    needed: usize,
    expected_count: usize,
    total_samples: usize,
    rms: &[f64],
    window_len: usize,
    spacing: usize,
) {
    let even_points: Vec<usize> = (1..expected_count)
        .map(|i| i * total_samples / expected_count)
        .collect();

    for &point in &even_points {
        if cuts.len() == needed {
            return;
        }
        let snapped = snap_to_quietest(point, rms, window_len, total_samples);
        if cuts.iter().all(|&c| c.abs_diff(snapped) >= spacing) {
            cuts.push(snapped);
        }
    }

    // Crowded buffer: accept violations rather than under-deliver.
    for &point in &even_points {
        if cuts.len() == needed {
            return;
        }
        let snapped = snap_to_quietest(point, rms, window_len, total_samples);
        if !cuts.contains(&snapped) {
            cuts.push(snapped);
        }
    }

    while cuts.len() < needed {
        cuts.push(total_samples);
    }
}

/// Move a sample index to the center of the quietest window within
/// `SNAP_RADIUS_WINDOWS` of it. Earliest window wins ties.
fn snap_to_quietest(
    point: usize,
    rms: &[f64],
    window_len: usize,
    total_samples: usize,
) -> usize {
    if rms.is_empty() {
        return point.min(total_samples);
    }

    let window = (point / window_len).min(rms.len() - 1);
    let lo = window.saturating_sub(SNAP_RADIUS_WINDOWS);
    let hi = (window + SNAP_RADIUS_WINDOWS).min(rms.len() - 1);

    let mut best = lo;
    for idx in lo..=hi {
        if rms[idx] < rms[best] {
            best = idx;
        }
    }

    (best * window_len + window_len / 2).min(total_samples)
}

/// Slice the byte buffer at the given sample cuts. Sample offsets are
/// doubled into byte offsets, which keeps them even and so aligned on
/// sample boundaries.
fn slice_segments(pcm: &[u8], cuts: &[usize], expected_count: usize) -> Vec<Vec<u8>> {
    let mut boundaries: Vec<usize> = Vec::with_capacity(expected_count + 1);
    boundaries.push(0);
    for &cut in cuts {
        boundaries.push((cut * 2).min(pcm.len()));
    }
    boundaries.push(pcm.len());
    boundaries.sort_unstable();

    boundaries
        .windows(2)
        .map(|pair| pcm[pair[0]..pair[1]].to_vec())
        .collect()
}
