use common::error::BotError;
use common::models::PricePoint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmaPair {
    pub short: f64,
    pub long: f64,
}

/// Plain trailing means over a window snapshot. No smoothing, no gap
/// handling; the window already resampled.
pub struct SmaEngine {
    short_len: usize,
    long_len: usize,
}

impl SmaEngine {
    pub fn new(short_len: usize, long_len: usize) -> Result<Self, BotError> {
        if short_len == 0 || short_len >= long_len {
            return Err(BotError::Config(format!(
                "SMA lengths must satisfy 0 < short ({short_len}) < long ({long_len})"
            )));
        }
        Ok(Self {
            short_len,
            long_len,
        })
    }

    /// `None` means "not ready", distinct from a numeric zero.
    pub fn compute(&self, points: &[PricePoint]) -> Option<SmaPair> {
        if points.len() < self.long_len {
            return None;
        }
        Some(SmaPair {
            short: trailing_mean(points, self.short_len),
            long: trailing_mean(points, self.long_len),
        })
    }
}

fn trailing_mean(points: &[PricePoint], len: usize) -> f64 {
    let tail = &points[points.len() - len..];
    tail.iter().map(|p| p.price).sum::<f64>() / len as f64
}
