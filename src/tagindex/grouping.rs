//! Capability consumed by the query-side grouping engine: pull the series of one roaring
//! container together with their tag value ids, without decoding the rest of the block.

use crate::error::IndexError;

use roaring::RoaringBitmap;

/// Series of one container and the tag value ids recorded for each, in series order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesTagValues {
    high_key: u16,
    series_ids: Vec<u32>,
    /// `tag_value_ids[offsets[i]..offsets[i + 1]]` belong to `series_ids[i]`.
    offsets: Vec<u32>,
    tag_value_ids: Vec<u32>,
}

impl SeriesTagValues {
    pub(crate) fn new(high_key: u16, series_ids: Vec<u32>, counts: &[u32], tag_value_ids: Vec<u32>) -> Self {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut at = 0u32;
        offsets.push(at);
        for &c in counts {
            at += c;
            offsets.push(at);
        }
        Self {
            high_key,
            series_ids,
            offsets,
            tag_value_ids,
        }
    }

    pub fn high_key(&self) -> u16 {
        self.high_key
    }

    pub fn series_ids(&self) -> &[u32] {
        &self.series_ids
    }

    pub fn tag_value_ids(&self) -> &[u32] {
        &self.tag_value_ids
    }

    pub fn len(&self) -> usize {
        self.series_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series_ids.is_empty()
    }

    /// Tag value ids of `series_id`, `None` when the series is not in this container.
    pub fn get(&self, series_id: u32) -> Option<&[u32]> {
        let i = self.series_ids.binary_search(&series_id).ok()?;
        Some(self.values_at(i))
    }

    fn values_at(&self, i: usize) -> &[u32] {
        &self.tag_value_ids[self.offsets[i] as usize..self.offsets[i + 1] as usize]
    }

    /// `(series id, tag value ids)` in series order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u32])> + '_ {
        self.series_ids
            .iter()
            .enumerate()
            .map(move |(i, &s)| (s, self.values_at(i)))
    }

    pub fn container(&self) -> RoaringBitmap {
        self.series_ids.iter().copied().collect()
    }
}

/// Per-block cursor handed to the grouping engine.
pub trait GroupingScanner {
    /// Series covered by this scanner's block.
    fn series_ids(&self) -> &RoaringBitmap;

    /// Container `high_key` of the block, `None` when the block has no such container.
    fn get_series_and_tag_value(&mut self, high_key: u16) -> Result<Option<SeriesTagValues>, IndexError>;
}

pub trait Grouping {
    type Scanner: GroupingScanner;

    /// Scanners over every block of `tag_key_id` that holds any of `series_ids`.
    fn get_grouping_scanners(
        &self,
        tag_key_id: u32,
        series_ids: &RoaringBitmap,
    ) -> Result<Vec<Self::Scanner>, IndexError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_series_slices() {
        let stv = SeriesTagValues::new(0, vec![2, 5, 9], &[1, 0, 3], vec![10, 20, 21, 22]);
        assert_eq!(stv.get(2), Some(&[10][..]));
        assert_eq!(stv.get(5), Some(&[][..]));
        assert_eq!(stv.get(9), Some(&[20, 21, 22][..]));
        assert_eq!(stv.get(3), None);
        assert_eq!(stv.iter().count(), 3);
        assert_eq!(stv.container().len(), 3);
    }
}
