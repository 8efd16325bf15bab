//! Minimal daily-ingestion loop: feed two weeks of test counts through the
//! combined detector and print the resulting levels and audit trail.
//!
//! Run with: `cargo run --example surveillance_quickstart`

use chrono::NaiveDate;
use episcan::{OutbreakConfig, OutbreakDetector};

fn main() -> Result<(), episcan::Error> {
    let mut detector = OutbreakDetector::new(OutbreakConfig {
        baseline_rate: 0.05,
        target_shift: 0.10,
        ..OutbreakConfig::default()
    })?;

    // Simulated daily (positives, total) counts: a quiet first week, then a
    // surge concentrated in one sampling area.
    let counts = [
        (1u64, 24u64),
        (0, 18),
        (2, 30),
        (1, 22),
        (1, 26),
        (2, 28),
        (1, 20),
        (4, 25),
        (6, 24),
        (9, 26),
        (11, 25),
        (14, 27),
        (16, 26),
        (18, 25),
    ];
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    // All samples drawn from the same farm cluster; a real feed would carry
    // per-sample coordinates.
    let area: Vec<(f64, f64)> = (0..30)
        .map(|i| (40.0 + 0.02 * (i % 5) as f64, -105.0 - 0.02 * (i % 6) as f64))
        .collect();

    for (i, (positives, total)) in counts.iter().enumerate() {
        let date = start + chrono::Days::new(i as u64);
        let level = detector.update(*positives, *total, Some(date), Some(&area))?;
        println!("{date}  {positives:>2}/{total:<2}  -> {level}");
    }

    let status = detector.status();
    println!("\nfinal level: {}", status.level);
    println!("last {} cycles:", status.recent.len());
    for entry in &status.recent {
        println!(
            "  {}  rate={:.3}  clusters={}  level={}",
            entry.date, entry.observed_rate, entry.spatial_clusters, entry.level
        );
    }

    Ok(())
}
