//! Portfolio weight vectors.

use crate::domain::error::PortoptError;

/// Produced weight vectors must sum to one within this tolerance.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Ordered mapping asset -> weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightVector {
    assets: Vec<String>,
    weights: Vec<f64>,
}

impl WeightVector {
    /// Validates shape, uniqueness, finiteness and the unit sum.
    pub fn new(assets: Vec<String>, weights: Vec<f64>) -> Result<Self, PortoptError> {
        if assets.len() != weights.len() {
            return Err(PortoptError::input(format!(
                "{} assets but {} weights",
                assets.len(),
                weights.len()
            )));
        }
        if assets.is_empty() {
            return Err(PortoptError::input("weight vector has no assets"));
        }
        for (i, asset) in assets.iter().enumerate() {
            if assets[..i].contains(asset) {
                return Err(PortoptError::input(format!("duplicate asset {asset}")));
            }
        }
        if let Some(pos) = weights.iter().position(|w| !w.is_finite()) {
            return Err(PortoptError::failure(format!(
                "non-finite weight for {}",
                assets[pos]
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PortoptError::failure(format!(
                "weights sum to {sum}, expected 1"
            )));
        }
        Ok(Self { assets, weights })
    }

    /// 1/N for every asset.
    pub fn equal(assets: &[String]) -> Result<Self, PortoptError> {
        let n = assets.len();
        if n == 0 {
            return Err(PortoptError::input("no assets to weight"));
        }
        Self::new(assets.to_vec(), vec![1.0 / n as f64; n])
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, asset: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| self.weights[i])
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.assets
            .iter()
            .map(String::as_str)
            .zip(self.weights.iter().copied())
    }

    /// Dense weights in `universe` order. Universe assets absent from this
    /// vector get zero; a non-zero weight on an asset outside the universe
    /// is an error.
    pub fn reindex(&self, universe: &[String]) -> Result<Vec<f64>, PortoptError> {
        if let Some((asset, _)) = self
            .iter()
            .find(|(asset, w)| *w != 0.0 && !universe.iter().any(|u| u == asset))
        {
            return Err(PortoptError::MissingData {
                asset: asset.to_string(),
                reason: "weighted asset is not in the return matrix".into(),
            });
        }
        Ok(universe
            .iter()
            .map(|u| self.get(u).unwrap_or(0.0))
            .collect())
    }
}
