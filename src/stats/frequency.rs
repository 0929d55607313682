use std::collections::BTreeMap;

/// Occurrence counts keyed by value, ordered by ascending value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: BTreeMap<i32, u32>,
    total: usize,
}

/// Mode and median of one array.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Every value tied for the highest count, ascending.
    pub mode: Vec<i32>,
    pub median: f64,
}

impl FrequencyTable {
    pub fn from_values(values: &[i32]) -> Self {
        let mut table = Self::default();
        for &value in values {
            *table.counts.entry(value).or_insert(0) += 1;
        }
        table.total = values.len();
        table
    }

    /// Folds `other` into this table by summing the counts of shared values.
    pub fn merge(&mut self, other: FrequencyTable) {
        for (value, count) in other.counts {
            *self.counts.entry(value).or_insert(0) += count;
        }
        self.total += other.total;
    }

    /// Number of values counted, duplicates included.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn count(&self, value: i32) -> u32 {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    pub fn mode(&self) -> Vec<i32> {
        let max = self.counts.values().copied().max().unwrap_or(0);
        self.counts
            .iter()
            .filter(|&(_, &count)| count == max)
            .map(|(&value, _)| value)
            .collect()
    }

    /// Median of the counted values, `None` for an empty table.
    ///
    /// Equivalent to expanding the table into its sorted sequence and taking
    /// the middle element, or the mean of the two middle elements when the
    /// length is even.
    pub fn median(&self) -> Option<f64> {
        let upper = f64::from(self.nth(self.total / 2)?);
        if self.total % 2 == 1 {
            return Some(upper);
        }
        let lower = f64::from(self.nth(self.total / 2 - 1)?);
        Some((lower + upper) / 2.0)
    }

    pub fn summary(&self) -> Option<Summary> {
        Some(Summary {
            median: self.median()?,
            mode: self.mode(),
        })
    }

    /// Value at position `index` of the sorted expansion.
    fn nth(&self, index: usize) -> Option<i32> {
        let mut seen = 0usize;
        for (&value, &count) in &self.counts {
            seen += count as usize;
            if index < seen {
                return Some(value);
            }
        }
        None
    }
}
