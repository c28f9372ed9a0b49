//! Gradient-boosted tree ensemble scoring.
//!
//! Trees are stored as flat node arrays with the root at index 0. A split
//! sends a row left when `x < threshold`; missing values (NaN) follow the
//! node's default direction. Exporters for libraries that split on
//! `x <= threshold` (LightGBM) must raise each threshold to the next
//! representable `f32` above it.

use serde::Deserialize;

use crate::error::InferenceError;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        #[serde(default = "default_left")]
        default_left: bool,
    },
    Leaf {
        leaf: f64,
    },
}

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Booster {
    pub n_features: usize,
    #[serde(default)]
    pub base_margin: f64,
    pub trees: Vec<Tree>,
}

impl Tree {
    /// Children must point forward in the node array, which rules out cycles.
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let mut reachable = vec![false; self.nodes.len()];
        reachable[0] = true;
        for (id, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { leaf } => {
                    if !leaf.is_finite() {
                        return Err(format!("leaf {id} has a non-finite value"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if feature >= n_features {
                        return Err(format!(
                            "node {id} splits on feature {feature} but the model has {n_features}"
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {id} has a NaN threshold"));
                    }
                    for child in [left, right] {
                        if child <= id || child >= self.nodes.len() {
                            return Err(format!("node {id} has invalid child {child}"));
                        }
                    }
                    if reachable[id] {
                        reachable[left] = true;
                        reachable[right] = true;
                    }
                }
            }
        }

        match reachable.iter().position(|seen| !seen) {
            Some(id) => Err(format!("node {id} is unreachable from the root")),
            None => Ok(()),
        }
    }

    fn leaf_value(&self, features: &[f32]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf { leaf } => return leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = features[feature];
                    id = if x.is_nan() {
                        if default_left {
                            left
                        } else {
                            right
                        }
                    } else if x < threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

impl Booster {
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("booster has no trees".to_string());
        }
        if !self.base_margin.is_finite() {
            return Err("base margin is not finite".to_string());
        }
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(i, tree)| {
                tree.validate(self.n_features)
                    .map_err(|e| format!("tree {i}: {e}"))
            })
    }

    /// Raw additive score before the logistic link.
    pub fn margin(&self, features: &[f32]) -> Result<f64, InferenceError> {
        if features.len() != self.n_features {
            return Err(InferenceError::FeatureWidth {
                expected: self.n_features,
                got: features.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|t| t.leaf_value(features)).sum();
        Ok(self.base_margin + sum)
    }
}

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}
