//! Derived views computed from other views.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::cache::Samples;
use crate::data::view::View;

/// How source traces are combined sample by sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeKind {
    Sum,
    /// First source minus all others.
    Difference,
    Product,
    Average,
}

impl CompositeKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompositeKind::Sum => "+",
            CompositeKind::Difference => "-",
            CompositeKind::Product => "*",
            CompositeKind::Average => "avg",
        }
    }

    /// Combine inputs over their common (shortest) length.
    pub fn combine(&self, inputs: &[Samples]) -> Vec<f64> {
        let Some(len) = inputs.iter().map(|s| s.len()).min() else {
            return Vec::new();
        };
        (0..len)
            .map(|i| {
                let mut values = inputs.iter().map(|s| s[i]);
                let first = values.next().unwrap_or(0.0);
                match self {
                    CompositeKind::Sum => first + values.sum::<f64>(),
                    CompositeKind::Difference => first - values.sum::<f64>(),
                    CompositeKind::Product => first * values.product::<f64>(),
                    CompositeKind::Average => (first + values.sum::<f64>()) / inputs.len() as f64,
                }
            })
            .collect()
    }
}

/// Declared sources of a derived view.
pub(crate) struct Composite {
    pub kind: CompositeKind,
    pub sources: Vec<Arc<View>>,
}

impl Composite {
    /// Combined input of all sources, or `None` while any source has nothing to contribute.
    ///
    /// Each source is read under its own DataLock, one at a time.
    pub fn gather(&self) -> Option<Vec<f64>> {
        if self.sources.is_empty() {
            return None;
        }
        let inputs = self
            .sources
            .iter()
            .map(|s| s.composite_input())
            .collect::<Option<Vec<Samples>>>()?;
        Some(self.kind.combine(&inputs))
    }

    /// `true` when every source currently has samples to contribute.
    pub fn sources_have_data(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(|s| s.has_data())
    }

    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        match self.kind {
            CompositeKind::Average => format!("avg({})", names.join(", ")),
            kind => names.join(format!(" {} ", kind.symbol()).as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[f64]) -> Samples {
        Arc::new(v.to_vec())
    }

    #[test]
    fn combine_uses_shortest_input() {
        let inputs = [s(&[1.0, 2.0, 3.0]), s(&[10.0, 20.0])];
        assert_eq!(CompositeKind::Sum.combine(&inputs), vec![11.0, 22.0]);
        assert_eq!(CompositeKind::Difference.combine(&inputs), vec![-9.0, -18.0]);
        assert_eq!(CompositeKind::Product.combine(&inputs), vec![10.0, 40.0]);
        assert_eq!(CompositeKind::Average.combine(&inputs), vec![5.5, 11.0]);
    }

    #[test]
    fn combine_without_inputs_is_empty() {
        assert!(CompositeKind::Sum.combine(&[]).is_empty());
    }
}
