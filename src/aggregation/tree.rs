use std::collections::HashMap;

/// Running count and sum for one group
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LeafStats {
    /// Number of values added
    pub count: u64,
    /// Sum of values added
    pub sum: f64,
}

impl LeafStats {
    /// Stats holding a single value
    pub fn new(value: f64) -> Self {
        Self { count: 1, sum: value }
    }

    /// Fold one more value in
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    /// Average of the values added
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// One bucket's grouped statistics.
///
/// A bucket root is `Internal`, with one map level per grouping dimension.
/// Below the last dimension sits a map with a single key, the measured field's
/// name, pointing at the `Leaf`.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupNode {
    /// Grouping value (or measured field name at the terminal level) to child
    Internal(HashMap<String, GroupNode>),
    /// Accumulated statistics
    Leaf(LeafStats),
}

impl Default for GroupNode {
    fn default() -> Self {
        GroupNode::Internal(HashMap::new())
    }
}

impl GroupNode {
    /// Empty bucket root
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` under the given grouping values, creating levels as needed.
    ///
    /// Callers pass one value per grouping dimension, so every level walked is
    /// `Internal` and the terminal entry is a `Leaf`.
    pub fn record(&mut self, dimension_values: &[String], measured: &str, value: f64) {
        let mut children = match self {
            GroupNode::Internal(children) => children,
            GroupNode::Leaf(_) => return,
        };

        for key in dimension_values {
            children = match children.entry(key.clone()).or_default() {
                GroupNode::Internal(next) => next,
                GroupNode::Leaf(_) => return,
            };
        }

        children
            .entry(measured.to_string())
            .and_modify(|node| {
                if let GroupNode::Leaf(stats) = node {
                    stats.add(value);
                }
            })
            .or_insert_with(|| GroupNode::Leaf(LeafStats::new(value)));
    }

    /// Look up the stats recorded under the given grouping values
    pub fn stats(&self, dimension_values: &[&str], measured: &str) -> Option<&LeafStats> {
        let mut node = self;
        for key in dimension_values.iter().copied().chain(std::iter::once(measured)) {
            node = match node {
                GroupNode::Internal(children) => children.get(key)?,
                GroupNode::Leaf(_) => return None,
            };
        }
        match node {
            GroupNode::Leaf(stats) => Some(stats),
            GroupNode::Internal(_) => None,
        }
    }

    /// Number of leaves below this node
    pub fn leaf_count(&self) -> usize {
        match self {
            GroupNode::Leaf(_) => 1,
            GroupNode::Internal(children) => children.values().map(GroupNode::leaf_count).sum(),
        }
    }

    /// Whether nothing has been recorded below this node
    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }
}
