//! Segment a synthetic tempogram and pick the number of sections.
//!
//! Run with: cargo run --example segment_tempogram
//!
//! Set `RUST_LOG=anofox_segment=debug` to see search progress.

use anofox_segment::changepoint::{curve, pick_elbow, CostModel, ElbowStrategy, SegmentationSearch};
use anofox_segment::core::Signal;
use anofox_segment::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

const N_FRAMES: usize = 400;
const N_LAGS: usize = 24;

/// Tempogram-like features: each section has its own dominant lag.
fn synthetic_tempogram(rng: &mut StdRng) -> Result<Signal> {
    let sections = [(0, 90, 6), (90, 220, 11), (220, 300, 4), (300, N_FRAMES, 11)];

    let rows = (0..N_FRAMES)
        .map(|frame| {
            let lag_peak = sections
                .iter()
                .find(|&&(start, end, _)| frame >= start && frame < end)
                .map_or(0, |&(_, _, lag)| lag);

            (0..N_LAGS)
                .map(|lag| {
                    let dist = lag.abs_diff(lag_peak) as f64;
                    (-dist * dist / 4.0).exp() + rng.gen_range(-0.05..0.05)
                })
                .collect()
        })
        .collect();

    Signal::from_rows(rows)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Tempogram Segmentation Example ===\n");

    let mut rng = StdRng::seed_from_u64(42);
    let tempogram = synthetic_tempogram(&mut rng)?;
    println!(
        "Signal: {} frames x {} lags, true boundaries at 90, 220, 300\n",
        tempogram.len(),
        tempogram.dimensions()
    );

    let max_changes = 10;
    let model = CostModel::fit(&tempogram)?;
    let mut search = SegmentationSearch::new();
    search.search(model, max_changes)?;

    // 1. Cost curve
    println!("--- Cost Curve ---");
    let cost_curve = curve(&search)?;
    println!("{:<6} {:>14}", "k", "Total cost");
    println!("{:-<21}", "");
    println!("{:<6} {:>14.3}", 0, cost_curve.initial_cost);
    for &(k, cost) in &cost_curve.points {
        println!("{:<6} {:>14.3}", k, cost);
    }

    // 2. Elbow strategies
    println!("\n--- Elbow Selection ---");
    for strategy in [
        ElbowStrategy::MaxCurvature,
        ElbowStrategy::Threshold(0.01),
        ElbowStrategy::Manual(5),
    ] {
        let k = pick_elbow(&cost_curve, strategy)?;
        let seg = search.extract(k)?;
        println!(
            "{:<18} k = {:<3} changepoints: {:?}",
            format!("{strategy:?}"),
            k,
            seg.change_points()
        );
    }

    // 3. Inspect the chosen segmentation
    let k = pick_elbow(&cost_curve, ElbowStrategy::MaxCurvature)?;
    let seg = search.extract(k)?;
    println!("\n--- Sections (k = {k}) ---");
    for ((start, end), means) in seg.segments().iter().zip(seg.segment_means(&tempogram)) {
        let peak = means
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(lag, _)| lag);
        println!("frames {start:>4}..{end:<4} dominant lag {peak}");
    }

    Ok(())
}
