use rstar::primitives::GeomWithData;
use rstar::RTree;

type Entry<P> = GeomWithData<[f64; 2], P>;

/// Nearest neighbour index over 2D keys, each carrying a payload.
///
/// Used both for sample locations (payload = point index) and for pair offset
/// vectors (payload = pair index).
#[derive(Clone)]
pub struct SpatialIndex<P> {
    tree: RTree<Entry<P>>,
}

impl<P> SpatialIndex<P> {
    pub fn build<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = ([f64; 2], P)>,
    {
        let entries = keys
            .into_iter()
            .map(|(key, payload)| Entry::new(key, payload))
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl SpatialIndex<usize> {
    /// Index items by position, extracting each key with `key`.
    pub fn from_items<T, F>(items: &[T], key: F) -> Self
    where
        F: Fn(&T) -> [f64; 2],
    {
        Self::build(items.iter().enumerate().map(|(i, item)| (key(item), i)))
    }
}

impl<P> SpatialIndex<P>
where
    P: Copy,
{
    /// Payloads of the `k` keys closest to `query`, nearest first.
    pub fn k_nearest(&self, query: [f64; 2], k: usize) -> Vec<P> {
        self.tree
            .nearest_neighbor_iter(&query)
            .take(k)
            .map(|entry| entry.data)
            .collect()
    }

    /// Payloads of all keys within `radius` of `query`, in no particular order.
    pub fn within_radius(&self, query: [f64; 2], radius: f64) -> Vec<P> {
        if !(radius >= 0.0) {
            return Vec::new();
        }
        self.tree
            .locate_within_distance(query, radius * radius)
            .map(|entry| entry.data)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_index() -> SpatialIndex<usize> {
        let keys = (0..5)
            .flat_map(|i| (0..5).map(move |j| [i as f64, j as f64]))
            .collect::<Vec<_>>();
        SpatialIndex::from_items(&keys, |k| *k)
    }

    #[test]
    fn k_nearest_is_ordered_by_distance() {
        let index = grid_index();
        let found = index.k_nearest([0.1, 0.0], 3);

        assert_eq!(found.len(), 3);
        // (0,0) first, then (1,0) before (0,1)
        assert_eq!(found[0], 0);
        assert_eq!(found[1], 5);
        assert_eq!(found[2], 1);
    }

    #[test]
    fn k_nearest_caps_at_len() {
        let index = grid_index();
        assert_eq!(index.k_nearest([2.0, 2.0], 100).len(), 25);
        assert!(index.k_nearest([2.0, 2.0], 0).is_empty());
    }

    #[test]
    fn within_radius_is_inclusive() {
        let index = grid_index();
        let mut found = index.within_radius([2.0, 2.0], 1.0);
        found.sort();

        assert_eq!(found, vec![7, 11, 12, 13, 17]);
        assert!(index.within_radius([2.0, 2.0], -1.0).is_empty());
    }

    #[test]
    fn generic_payload() {
        let index = SpatialIndex::build(vec![([0.0, 0.0], 'a'), ([3.0, 4.0], 'b')]);
        assert_eq!(index.k_nearest([2.9, 4.1], 1), vec!['b']);
        assert_eq!(index.len(), 2);
    }
}
