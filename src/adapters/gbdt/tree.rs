//! Serialized gradient-boosted tree ensemble.
//!
//! Layout follows the usual boosted-tree dump: each tree is a flat node list
//! rooted at index 0, splits route `x < threshold` to `yes`, and every node
//! carries the training cover used by TreeSHAP.

use serde::{Deserialize, Serialize};

/// Only supported artifact layout version.
pub const FORMAT_VERSION: u32 = 1;

/// Only supported objective.
pub const OBJECTIVE_BINARY_LOGISTIC: &str = "binary:logistic";

/// One node of a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        cover: f64,
    },
    Leaf {
        leaf: f64,
        cover: f64,
    },
}

impl Node {
    #[must_use]
    pub fn cover(&self) -> f64 {
        match self {
            Self::Split { cover, .. } | Self::Leaf { cover, .. } => *cover,
        }
    }
}

/// A single regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Index of the leaf reached by `x`.
    #[must_use]
    pub fn leaf_index(&self, x: &[f64]) -> usize {
        let mut idx = 0;
        while let Node::Split {
            feature,
            threshold,
            yes,
            no,
            ..
        } = &self.nodes[idx]
        {
            idx = if x[*feature] < *threshold { *yes } else { *no };
        }
        idx
    }

    /// Leaf value reached by `x`.
    #[must_use]
    pub fn predict(&self, x: &[f64]) -> f64 {
        match &self.nodes[self.leaf_index(x)] {
            Node::Leaf { leaf, .. } => *leaf,
            Node::Split { .. } => unreachable!("leaf_index always stops on a leaf"),
        }
    }

    /// Cover-weighted mean output of the tree.
    #[must_use]
    pub fn expected_value(&self) -> f64 {
        self.node_expectation(0)
    }

    fn node_expectation(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            Node::Leaf { leaf, .. } => *leaf,
            Node::Split { yes, no, cover, .. } => {
                let cy = self.nodes[*yes].cover();
                let cn = self.nodes[*no].cover();
                (cy * self.node_expectation(*yes) + cn * self.node_expectation(*no)) / cover
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let mut parents = vec![0usize; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            let cover = node.cover();
            if !cover.is_finite() || cover <= 0.0 {
                return Err(format!("node {i} has non-positive cover {cover}"));
            }
            match node {
                Node::Leaf { leaf, .. } => {
                    if !leaf.is_finite() {
                        return Err(format!("node {i} has a non-finite leaf value"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {i} splits on feature {feature}, model has {n_features}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {i} has a non-finite threshold"));
                    }
                    // Children after their parent rules out cycles.
                    for child in [*yes, *no] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(format!("node {i} has invalid child index {child}"));
                        }
                    }
                    if yes == no {
                        return Err(format!("node {i} routes both branches to {yes}"));
                    }
                    parents[*yes] += 1;
                    parents[*no] += 1;
                    let children = self.nodes[*yes].cover() + self.nodes[*no].cover();
                    if (children - cover).abs() > 1e-6 * cover {
                        return Err(format!(
                            "node {i} cover {cover} differs from its children's total {children}"
                        ));
                    }
                }
            }
        }
        // Exactly one parent per non-root node: a shared child would make the
        // recursive walks in expected_value and TreeSHAP exponential.
        for (i, count) in parents.iter().enumerate().skip(1) {
            match count {
                0 => return Err(format!("node {i} is unreachable from the root")),
                1 => {}
                n => return Err(format!("node {i} has {n} parents")),
            }
        }
        Ok(())
    }
}

/// Binary-logistic tree ensemble as loaded from `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub format_version: u32,
    pub objective: String,
    /// Prior probability of the positive class.
    pub base_score: f64,
    pub feature_names: Vec<String>,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    /// Check structural soundness before the model is used.
    ///
    /// # Errors
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version {} (expected {FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.objective != OBJECTIVE_BINARY_LOGISTIC {
            return Err(format!("unsupported objective {:?}", self.objective));
        }
        if !(self.base_score > 0.0 && self.base_score < 1.0) {
            return Err(format!("base_score {} must be in (0, 1)", self.base_score));
        }
        if self.feature_names.is_empty() {
            return Err("model declares no features".into());
        }
        for (i, name) in self.feature_names.iter().enumerate() {
            if self.feature_names[..i].contains(name) {
                return Err(format!("duplicate feature name {name:?}"));
            }
        }
        if self.trees.is_empty() {
            return Err("model has no trees".into());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_names.len())
                .map_err(|e| format!("tree {t}: {e}"))?;
        }
        Ok(())
    }

    /// Log-odds of `base_score`.
    #[must_use]
    pub fn base_margin(&self) -> f64 {
        (self.base_score / (1.0 - self.base_score)).ln()
    }

    /// Raw log-odds output for `x`.
    #[must_use]
    pub fn margin(&self, x: &[f64]) -> f64 {
        self.base_margin() + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// Mean log-odds over the training distribution implied by node covers.
    #[must_use]
    pub fn expected_value(&self) -> f64 {
        self.base_margin() + self.trees.iter().map(Tree::expected_value).sum::<f64>()
    }
}

/// Logistic link.
#[must_use]
pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}
