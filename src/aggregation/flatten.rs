//! Turns a bucket's group tree into flat output records

use super::tree::{GroupNode, LeafStats};
use crate::event::{Event, Value};

/// Synthetic attribute holding the number of values
pub const COUNT_FIELD: &str = "count";
/// Synthetic attribute holding the sum of values
pub const SUM_FIELD: &str = "sum";
/// Synthetic attribute holding `sum / count`
pub const MEAN_FIELD: &str = "mean";

/// Flatten one bucket into a record per leaf.
///
/// `fields` is the full field path. Each record carries one attribute per
/// grouping dimension, the measured field set to its own name, and the
/// `count`, `sum` and `mean` of the leaf. Record order is unspecified.
pub fn flatten(tree: &GroupNode, fields: &[String]) -> Vec<Event> {
    let mut records = Vec::new();
    if fields.is_empty() {
        return records;
    }
    let mut partial = Event::new();
    walk(tree, fields, 0, &mut partial, &mut records);
    records
}

fn walk(node: &GroupNode, fields: &[String], level: usize, partial: &mut Event, out: &mut Vec<Event>) {
    let GroupNode::Internal(children) = node else {
        return;
    };
    let field = &fields[level];

    if level == fields.len() - 1 {
        for (key, child) in children {
            if let GroupNode::Leaf(stats) = child {
                let mut record = partial.clone();
                record.insert(field.clone(), key.as_str());
                stamp_stats(&mut record, stats);
                out.push(record);
            }
        }
        return;
    }

    for (value, child) in children {
        partial.insert(field.clone(), value.as_str());
        walk(child, fields, level + 1, partial, out);
    }
}

fn stamp_stats(record: &mut Event, stats: &LeafStats) {
    let count = i64::try_from(stats.count).unwrap_or(i64::MAX);
    record.insert(COUNT_FIELD, Value::Integer(count));
    record.insert(SUM_FIELD, Value::Float(stats.sum));
    record.insert(MEAN_FIELD, Value::Float(stats.mean()));
}
