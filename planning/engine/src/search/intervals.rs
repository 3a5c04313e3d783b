/// Returns observed for a range of start times.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Segment {
    /// First time of the segment.
    pub lo: i64,
    /// Last time of the segment (included).
    pub hi: i64,
    pub visits: u32,
    /// Mean of the returns attributed to every time of the segment.
    pub mean: f64,
}

impl Segment {
    fn new(lo: i64, hi: i64) -> Self {
        Segment {
            lo,
            hi,
            visits: 0,
            mean: 0.0,
        }
    }

    fn with(self, reward: f64) -> Self {
        let visits = self.visits + 1;
        Segment {
            visits,
            mean: self.mean + (reward - self.mean) / visits as f64,
            ..self
        }
    }
}

/// Piecewise-constant statistics over time: each return is attributed to all times of an
/// interval, and the time line is split into disjoint segments that received the same returns.
#[derive(Clone, Default, Debug)]
pub struct IntervalValues {
    /// Sorted and disjoint.
    segments: Vec<Segment>,
}

impl IntervalValues {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Attributes `reward` to every time in `[lo, hi]`.
    pub fn update(&mut self, reward: f64, lo: i64, hi: i64) {
        if lo > hi {
            return;
        }
        let mut result = Vec::with_capacity(self.segments.len() + 2);
        // first time of [lo, hi] not covered yet
        let mut cursor = lo;
        for seg in std::mem::take(&mut self.segments) {
            if seg.hi < lo {
                result.push(seg);
                continue;
            }
            if seg.lo > hi {
                if cursor <= hi {
                    result.push(Segment::new(cursor, hi).with(reward));
                    cursor = hi + 1;
                }
                result.push(seg);
                continue;
            }
            if seg.lo < lo {
                result.push(Segment { hi: lo - 1, ..seg });
            }
            let start = seg.lo.max(lo);
            if cursor < start {
                result.push(Segment::new(cursor, start - 1).with(reward));
            }
            let end = seg.hi.min(hi);
            result.push(Segment { lo: start, hi: end, ..seg }.with(reward));
            cursor = end + 1;
            if seg.hi > hi {
                result.push(Segment { lo: hi + 1, ..seg });
            }
        }
        if cursor <= hi {
            result.push(Segment::new(cursor, hi).with(reward));
        }
        self.segments = result;
    }

    /// Segment with the highest mean, the earliest one in case of ties.
    pub fn best(&self) -> Option<Segment> {
        self.segments
            .iter()
            .copied()
            .filter(|s| s.visits > 0)
            .reduce(|best, s| if s.mean > best.mean { s } else { best })
    }

    pub fn max_value(&self) -> Option<f64> {
        self.best().map(|s| s.mean)
    }

    /// Mean of the returns attributed to `time`.
    pub fn value_at(&self, time: i64) -> Option<f64> {
        self.segments
            .iter()
            .find(|s| s.lo <= time && time <= s.hi)
            .map(|s| s.mean)
    }
}
