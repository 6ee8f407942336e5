//! Short model codes and the constructor lookup used by the training side.
//!
//! Estimators are opaque here: the registry maps a code to a constructor and never
//! inspects what it builds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelCode {
    Lr,
    Dt,
    Rf,
    Hgb,
    Et,
    Xgb,
    Lgbm,
}

pub const ALL_MODEL_CODES: [ModelCode; 7] = [
    ModelCode::Lr,
    ModelCode::Dt,
    ModelCode::Rf,
    ModelCode::Hgb,
    ModelCode::Et,
    ModelCode::Xgb,
    ModelCode::Lgbm,
];

impl ModelCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lr => "lr",
            Self::Dt => "dt",
            Self::Rf => "rf",
            Self::Hgb => "hgb",
            Self::Et => "et",
            Self::Xgb => "xgb",
            Self::Lgbm => "lgbm",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Lr => "linear regression",
            Self::Dt => "decision tree regressor",
            Self::Rf => "random forest regressor",
            Self::Hgb => "histogram gradient boosting regressor",
            Self::Et => "extra trees regressor",
            Self::Xgb => "XGBoost regressor",
            Self::Lgbm => "LightGBM regressor",
        }
    }
}

impl fmt::Display for ModelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelRegistryError {
    #[error("unknown model code: {0}")]
    UnknownCode(String),
    #[error("no constructor registered for model code {0}")]
    Unregistered(ModelCode),
}

pub fn parse_model_code(input: &str) -> Result<ModelCode, ModelRegistryError> {
    let normalized = input.trim().to_ascii_lowercase();
    ALL_MODEL_CODES
        .into_iter()
        .find(|code| code.as_str() == normalized)
        .ok_or_else(|| ModelRegistryError::UnknownCode(input.to_string()))
}

/// Fixed code → constructor table for some estimator type `M`.
pub struct ModelRegistry<M> {
    constructors: BTreeMap<ModelCode, fn() -> M>,
}

impl<M> Default for ModelRegistry<M> {
    fn default() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }
}

impl<M> ModelRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: ModelCode, constructor: fn() -> M) -> Self {
        self.constructors.insert(code, constructor);
        self
    }

    pub fn codes(&self) -> Vec<ModelCode> {
        self.constructors.keys().copied().collect()
    }

    pub fn contains(&self, code: ModelCode) -> bool {
        self.constructors.contains_key(&code)
    }

    pub fn construct(&self, code: ModelCode) -> Result<M, ModelRegistryError> {
        let constructor = self
            .constructors
            .get(&code)
            .ok_or(ModelRegistryError::Unregistered(code))?;
        debug!(
            component = "models",
            event = "models.construct",
            code = code.as_str()
        );
        Ok(constructor())
    }

    pub fn construct_by_name(&self, input: &str) -> Result<M, ModelRegistryError> {
        self.construct(parse_model_code(input)?)
    }
}
