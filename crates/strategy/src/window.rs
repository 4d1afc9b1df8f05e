use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use common::config::{IngestMode, SamplingPolicy};
use common::models::{PricePoint, Tick};

/// Bounded rolling window of recent prices for one symbol. Capacity equals
/// the long SMA length; single writer per symbol.
pub struct PriceWindow {
    capacity: usize,
    mode: IngestMode,
    points: VecDeque<PricePoint>,
}

impl PriceWindow {
    pub fn new(capacity: usize, mode: IngestMode) -> Self {
        Self {
            capacity,
            mode,
            points: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// O(1) amortized. In bucketed mode the first price in a bucket wins,
    /// empty buckets are forward-filled and ticks older than the newest
    /// bucket are dropped.
    pub fn ingest(&mut self, tick: &Tick) {
        match self.mode {
            IngestMode::Tick => self.push(PricePoint {
                timestamp: tick.timestamp,
                price: tick.price,
            }),
            IngestMode::Bucketed { bucket_secs } => {
                let bucket = align_to_bucket(tick.timestamp, bucket_secs);
                match self.points.back().copied() {
                    None => self.push(PricePoint {
                        timestamp: bucket,
                        price: tick.price,
                    }),
                    Some(last) if bucket <= last.timestamp => {}
                    Some(last) => {
                        let step = Duration::seconds(bucket_secs as i64);
                        // A gap wider than the capacity only needs its tail.
                        let mut fill_from = last.timestamp + step;
                        let earliest_useful = bucket - step * (self.capacity as i32 - 1);
                        if fill_from < earliest_useful {
                            fill_from = earliest_useful;
                        }
                        let mut t = fill_from;
                        while t < bucket {
                            self.push(PricePoint {
                                timestamp: t,
                                price: last.price,
                            });
                            t += step;
                        }
                        self.push(PricePoint {
                            timestamp: bucket,
                            price: tick.price,
                        });
                    }
                }
            }
        }
    }

    /// Copies out the detector's view of the window so a concurrent SMA pass
    /// can never observe a half-updated buffer.
    pub fn snapshot(&self, policy: SamplingPolicy) -> Option<Vec<PricePoint>> {
        match policy {
            SamplingPolicy::Strict => {
                if self.points.len() < self.capacity {
                    return None;
                }
                Some(
                    self.points
                        .iter()
                        .skip(self.points.len() - self.capacity)
                        .copied()
                        .collect(),
                )
            }
            SamplingPolicy::Flexible => Some(self.points.iter().copied().collect()),
        }
    }

    fn push(&mut self, point: PricePoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }
}

fn align_to_bucket(at: DateTime<Utc>, bucket_secs: u64) -> DateTime<Utc> {
    let secs = at.timestamp();
    let aligned = secs - secs.rem_euclid(bucket_secs as i64);
    DateTime::from_timestamp(aligned, 0).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick(at_secs: i64, price: f64) -> Tick {
        Tick {
            symbol: "BTCUSDT".to_string(),
            price,
            quantity: 0.01,
            timestamp: Utc.timestamp_opt(1_700_000_000 + at_secs, 0).unwrap(),
        }
    }

    #[test]
    fn tick_mode_evicts_oldest_beyond_capacity() {
        let mut window = PriceWindow::new(3, IngestMode::Tick);
        for (i, price) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            window.ingest(&tick(i as i64, price));
        }
        let points = window.snapshot(SamplingPolicy::Flexible).unwrap();
        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn strict_snapshot_requires_a_full_window() {
        let mut window = PriceWindow::new(3, IngestMode::Tick);
        window.ingest(&tick(0, 1.0));
        window.ingest(&tick(1, 2.0));
        assert!(window.snapshot(SamplingPolicy::Strict).is_none());
        assert_eq!(window.snapshot(SamplingPolicy::Flexible).unwrap().len(), 2);

        window.ingest(&tick(2, 3.0));
        assert_eq!(window.snapshot(SamplingPolicy::Strict).unwrap().len(), 3);
    }

    #[test]
    fn bucketed_mode_keeps_first_price_per_bucket() {
        let mut window = PriceWindow::new(5, IngestMode::Bucketed { bucket_secs: 60 });
        window.ingest(&tick(0, 100.0));
        window.ingest(&tick(30, 101.0)); // same bucket, ignored
        window.ingest(&tick(60, 102.0));

        let points = window.snapshot(SamplingPolicy::Flexible).unwrap();
        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![100.0, 102.0]);
    }

    #[test]
    fn bucketed_mode_forward_fills_empty_buckets() {
        let mut window = PriceWindow::new(6, IngestMode::Bucketed { bucket_secs: 60 });
        window.ingest(&tick(0, 100.0));
        window.ingest(&tick(180, 103.0)); // buckets at 60 and 120 were silent

        let points = window.snapshot(SamplingPolicy::Flexible).unwrap();
        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![100.0, 100.0, 100.0, 103.0]);
        assert_eq!(
            points[1].timestamp.timestamp() - points[0].timestamp.timestamp(),
            60
        );
    }

    #[test]
    fn late_ticks_are_dropped_in_bucketed_mode() {
        let mut window = PriceWindow::new(5, IngestMode::Bucketed { bucket_secs: 60 });
        window.ingest(&tick(120, 100.0));
        window.ingest(&tick(0, 95.0)); // older than the newest bucket
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn huge_gap_fills_only_the_tail() {
        let mut window = PriceWindow::new(4, IngestMode::Bucketed { bucket_secs: 60 });
        window.ingest(&tick(0, 100.0));
        window.ingest(&tick(60 * 1000, 200.0)); // a thousand silent buckets

        let points = window.snapshot(SamplingPolicy::Flexible).unwrap();
        assert_eq!(points.len(), 4);
        let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![100.0, 100.0, 100.0, 200.0]);
    }
}
