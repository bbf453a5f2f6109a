//! Batch planning for a generation run.
//!
//! Small requests go out as one call. Larger ones are inflated to absorb the
//! questions the deduplicator is expected to drop, then cut into fixed-size
//! chunks whose start times are staggered so the model service never sees a
//! burst of simultaneous requests.

use crate::config::GenerationConfig;
use crate::question::GenerationRequest;
use std::time::Duration;

/// One bounded sub-request, scheduled `delay` after the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 0-indexed dispatch position.
    pub index: usize,
    pub request: GenerationRequest,
    pub delay: Duration,
}

impl Batch {
    pub fn count(&self) -> usize {
        self.request.count
    }
}

/// Number of questions to ask for in total: `ceil(count × inflation)` above
/// the direct threshold, `count` otherwise.
pub fn planned_total(count: usize, config: &GenerationConfig) -> usize {
    if count <= config.direct_threshold {
        return count;
    }
    scaled_ceil(count, config.inflation).max(count)
}

/// Split `request` into batches.
///
/// Every batch holds `batch_size` questions except the last, which takes the
/// remainder. Batch `i` starts `i × stagger_ms` after the run begins.
pub fn plan_batches(request: &GenerationRequest, config: &GenerationConfig) -> Vec<Batch> {
    let total = planned_total(request.count, config);
    if total == 0 {
        return Vec::new();
    }
    if request.count <= config.direct_threshold {
        return vec![Batch {
            index: 0,
            request: request.clone(),
            delay: Duration::ZERO,
        }];
    }

    let size = config.batch_size.max(1);
    let batches = total.div_ceil(size);
    (0..batches)
        .map(|index| {
            let count = size.min(total - index * size);
            Batch {
                index,
                request: request.with_count(count),
                delay: Duration::from_millis(config.stagger_ms * index as u64),
            }
        })
        .collect()
}

/// Size of the single top-up batch: `ceil(shortfall × top_up_factor)`.
pub fn top_up_size(shortfall: usize, config: &GenerationConfig) -> usize {
    if shortfall == 0 {
        return 0;
    }
    scaled_ceil(shortfall, config.top_up_factor).max(shortfall)
}

/// `ceil(n × factor)`. The f32 factor is snapped to six decimals first so
/// that `1.2_f32` (really 1.2000000477) does not push `50 × 1.2` up to 61.
fn scaled_ceil(n: usize, factor: f32) -> usize {
    let factor = (f64::from(factor) * 1e6).round() / 1e6;
    let product = n as f64 * factor;
    (product - 1e-9).ceil().max(0.0) as usize
}
