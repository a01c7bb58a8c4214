//! Initial node placement

use crate::config::PlacementConfig;

/// Decides where nodes appear before the layout engine takes over.
///
/// Implementations must be deterministic: the same call sequence yields the
/// same positions.
pub trait PlacementPolicy: Send + Sync + std::fmt::Debug {
    /// Position for the `index`-th node added to the store. Such a position
    /// is a placeholder until the node's first incoming edge arrives.
    fn initial(&self, index: usize) -> (f64, f64);

    /// Position for a placeholder target of an edge from `source`, where
    /// `sibling_index` of `sibling_count` edges leave that source.
    fn branch(&self, source: (f64, f64), sibling_index: usize, sibling_count: usize) -> (f64, f64);
}

/// Columns left to right; children one column right of their source,
/// spread symmetrically across siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchPlacement {
    pub column_spacing: f64,
    pub sibling_spacing: f64,
}

impl Default for BranchPlacement {
    fn default() -> Self {
        Self::from(&PlacementConfig::default())
    }
}

impl From<&PlacementConfig> for BranchPlacement {
    fn from(config: &PlacementConfig) -> Self {
        Self {
            column_spacing: config.column_spacing,
            sibling_spacing: config.sibling_spacing,
        }
    }
}

impl PlacementPolicy for BranchPlacement {
    fn initial(&self, index: usize) -> (f64, f64) {
        (index as f64 * self.column_spacing, 0.0)
    }

    fn branch(&self, source: (f64, f64), sibling_index: usize, sibling_count: usize) -> (f64, f64) {
        let center = (sibling_count.max(1) - 1) as f64 / 2.0;
        (
            source.0 + self.column_spacing,
            source.1 + (sibling_index as f64 - center) * self.sibling_spacing,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_columns() {
        let p = BranchPlacement::default();
        assert_eq!(p.initial(0), (0.0, 0.0));
        assert_eq!(p.initial(3), (420.0, 0.0));
    }

    #[test]
    fn test_branch_offsets() {
        let p = BranchPlacement::default();
        assert_eq!(p.branch((10.0, 5.0), 0, 1), (150.0, 5.0));
        // Third of three siblings sits one spacing below center
        assert_eq!(p.branch((0.0, 0.0), 2, 3), (140.0, 60.0));
        assert_eq!(p.branch((0.0, 0.0), 0, 3), (140.0, -60.0));
        assert_eq!(p.branch((0.0, 0.0), 1, 2), (140.0, 30.0));
    }
}
