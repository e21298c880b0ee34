//! Range-set encoding used by `session.completed`, `session.known-completed`,
//! and `message.accept` — a monotonically growing set of command/transfer ids
//! represented as `[low, high]` inclusive pairs.

/// An ordered, non-overlapping, non-adjacent set of `u32` ids.
///
/// Adjacent or overlapping ranges are always merged on insert so the wire
/// representation stays minimal, matching the `[low,high]` pair encoding in
/// the transport contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<(u32, u32)>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ranges
            .binary_search_by(|(low, high)| {
                if id < *low {
                    std::cmp::Ordering::Greater
                } else if id > *high {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// Lowest id not (yet) contained in the set, starting the search from `floor`.
    pub fn lowest_missing_from(&self, floor: u32) -> u32 {
        let mut candidate = floor;
        for &(low, high) in &self.ranges {
            if candidate < low {
                return candidate;
            }
            if candidate <= high {
                candidate = high.saturating_add(1);
            }
        }
        candidate
    }

    pub fn insert(&mut self, id: u32) {
        self.insert_range(id, id);
    }

    pub fn insert_range(&mut self, low: u32, high: u32) {
        debug_assert!(low <= high);

        let mut new_low = low;
        let mut new_high = high;

        // Merge with any existing range that touches or overlaps [low, high].
        let mut i = 0;
        while i < self.ranges.len() {
            let (rl, rh) = self.ranges[i];
            let touches = rl <= new_high.saturating_add(1) && new_low <= rh.saturating_add(1);
            if touches {
                new_low = new_low.min(rl);
                new_high = new_high.max(rh);
                self.ranges.remove(i);
            } else {
                i += 1;
            }
        }

        let pos = self
            .ranges
            .iter()
            .position(|(rl, _)| *rl > new_low)
            .unwrap_or(self.ranges.len());
        self.ranges.insert(pos, (new_low, new_high));
    }

    pub fn remove_range(&mut self, low: u32, high: u32) {
        debug_assert!(low <= high);
        let mut result = Vec::with_capacity(self.ranges.len());
        for (rl, rh) in self.ranges.drain(..) {
            if high < rl || low > rh {
                result.push((rl, rh));
                continue;
            }
            if rl < low {
                result.push((rl, low - 1));
            }
            if rh > high {
                result.push((high + 1, rh));
            }
        }
        self.ranges = result;
    }

    /// The highest id in the set, if any.
    pub fn max(&self) -> Option<u32> {
        self.ranges.last().map(|&(_, h)| h)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|&(low, high)| low..=high)
    }
}

impl FromIterator<u32> for RangeSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut set = RangeSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}
