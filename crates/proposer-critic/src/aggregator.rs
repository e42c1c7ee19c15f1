use std::sync::Arc;

use futures::future::try_join_all;
use proposer_agent::{Backend, BackendConfig};
use tracing::{debug, warn};

use crate::{CompositeEvaluation, CritiqueError, CritiqueInput, CritiqueUnit, Dimension};

/// Fans a proposal out to every configured reviewer and combines the verdicts
pub struct EvaluationAggregator {
    units: Vec<CritiqueUnit>,
}

impl EvaluationAggregator {
    /// Build one critique unit per dimension name, in the given order.
    ///
    /// Unknown, duplicate, or missing dimensions are configuration errors
    /// reported here, before any run starts.
    pub fn new<S: AsRef<str>>(
        backend: Arc<dyn Backend>,
        dimensions: &[S],
        config: BackendConfig,
    ) -> Result<Self, CritiqueError> {
        let units = dimensions
            .iter()
            .map(|name| CritiqueUnit::new(backend.clone(), name.as_ref(), config.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_units(units)
    }

    pub fn from_units(units: Vec<CritiqueUnit>) -> Result<Self, CritiqueError> {
        if units.is_empty() {
            return Err(CritiqueError::NoDimensions);
        }

        for (idx, unit) in units.iter().enumerate() {
            if units[..idx].iter().any(|u| u.dimension() == unit.dimension()) {
                return Err(CritiqueError::DuplicateDimension(unit.dimension()));
            }
        }

        Ok(Self { units })
    }

    /// Configured dimensions, in order
    pub fn dimensions(&self) -> Vec<Dimension> {
        self.units.iter().map(CritiqueUnit::dimension).collect()
    }

    /// Critique the proposal along every dimension concurrently.
    ///
    /// All reviewers are awaited before a composite is built; the first failure
    /// fails the whole aggregation. Results keep configured order regardless of
    /// completion order.
    pub async fn aggregate(
        &self,
        input: CritiqueInput<'_>,
    ) -> Result<CompositeEvaluation, CritiqueError> {
        debug!(
            round = input.round,
            dimensions = self.units.len(),
            "Aggregating critiques"
        );

        let results = try_join_all(self.units.iter().map(|unit| unit.evaluate(input)))
            .await
            .inspect_err(|e| warn!(round = input.round, error = %e, "Critique failed"))?;

        CompositeEvaluation::from_results(results).ok_or(CritiqueError::NoDimensions)
    }
}
