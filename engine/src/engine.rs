//! Inspection engine
//!
//! Runs the category evaluators a request can match, either as concurrent
//! tokio tasks or one after another, and merges their findings. A failure in
//! any evaluator fails the whole request and cancels the others.

use crate::config::EngineConfig;
use crate::error::{InspectionError, Result};
use crate::evaluator::{Inspection, InspectionContext, INSPECTIONS};
use crate::filter;
use crate::metrics::{EVALUATOR_DURATION, FINDINGS_TOTAL, REQUESTS_TOTAL};
use crate::provider::SnapshotProvider;
use inspection_shared::{Finding, InspectionRequest, Rule};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct InspectionEngine {
    provider: Arc<dyn SnapshotProvider>,
    config: EngineConfig,
}

impl InspectionEngine {
    pub fn new(provider: Arc<dyn SnapshotProvider>, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one request.
    pub async fn inspect(&self, request: InspectionRequest) -> Result<Vec<Finding>> {
        self.inspect_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Evaluate one request, abandoning it when `cancel` fires.
    pub async fn inspect_with_cancel(
        &self,
        request: InspectionRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<Finding>> {
        let started = Instant::now();
        let request = Arc::new(request);
        let token = cancel.child_token();
        let ctx = InspectionContext::new(self.provider.clone(), request.clone(), token.clone());
        let rules = filter::selected_rules(&request.predicates);

        let evaluation = self.evaluate(ctx, &rules);
        let outcome = match self.config.time_budget() {
            Some(budget) => tokio::select! {
                res = evaluation => res,
                _ = tokio::time::sleep(budget) => Err(InspectionError::DeadlineExceeded(budget)),
            },
            None => evaluation.await,
        };
        // Stop evaluators still running after a deadline or failure
        token.cancel();

        match outcome {
            Ok(results) => {
                let findings = filter::merge(results, &request.predicates);
                REQUESTS_TOTAL.with_label_values(&["ok"]).inc();
                info!(
                    rules = rules.len(),
                    findings = findings.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Inspection finished"
                );
                Ok(findings)
            }
            Err(e) => {
                let status = match &e {
                    InspectionError::Cancelled => "cancelled",
                    InspectionError::DeadlineExceeded(_) => "deadline_exceeded",
                    _ => "error",
                };
                REQUESTS_TOTAL.with_label_values(&[status]).inc();
                warn!("Inspection failed: {}", e);
                Err(e)
            }
        }
    }

    async fn evaluate(
        &self,
        ctx: InspectionContext,
        rules: &[Rule],
    ) -> Result<Vec<(Rule, Vec<Finding>)>> {
        let inspections: Vec<&'static dyn Inspection> = INSPECTIONS
            .iter()
            .copied()
            .filter(|i| rules.contains(&i.rule()))
            .collect();

        if !self.config.parallel {
            let mut results = Vec::with_capacity(inspections.len());
            for inspection in inspections {
                let findings = run_timed(inspection, &ctx).await?;
                results.push((inspection.rule(), findings));
            }
            return Ok(results);
        }

        let handles: Vec<(Rule, JoinHandle<Result<Vec<Finding>>>)> = inspections
            .into_iter()
            .map(|inspection| {
                let ctx = ctx.clone();
                let handle = tokio::spawn(async move { run_timed(inspection, &ctx).await });
                (inspection.rule(), handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut failure: Option<InspectionError> = None;
        for (rule, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    ctx.cancel_request();
                    Err(InspectionError::Task {
                        rule,
                        message: e.to_string(),
                    })
                }
            };
            match outcome {
                Ok(findings) => results.push((rule, findings)),
                // Siblings cancelled by the first failure report Cancelled;
                // keep the root cause.
                Err(e) => {
                    if matches!(failure, None | Some(InspectionError::Cancelled)) {
                        failure = Some(e);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

async fn run_timed(inspection: &dyn Inspection, ctx: &InspectionContext) -> Result<Vec<Finding>> {
    let rule = inspection.rule();
    ctx.check_cancelled()?;

    let timer = EVALUATOR_DURATION
        .with_label_values(&[rule.name()])
        .start_timer();
    let result = inspection.inspect(ctx).await;
    timer.observe_duration();

    match &result {
        Ok(findings) => {
            FINDINGS_TOTAL
                .with_label_values(&[rule.name()])
                .inc_by(findings.len() as f64);
            debug!(rule = %rule, findings = findings.len(), "Evaluator finished");
        }
        Err(e) => {
            debug!(rule = %rule, "Evaluator failed: {}", e);
            ctx.cancel_request();
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapshotKind;
    use crate::provider::{InMemoryProvider, SnapshotBundle};
    use inspection_shared::{ConfigRow, Predicates, TopologyRow};

    fn bundle() -> SnapshotBundle {
        let config = |instance: &str, value: &str| ConfigRow {
            node_type: "tikv".to_string(),
            instance: instance.to_string(),
            key: "coprocessor.high".to_string(),
            value: value.to_string(),
        };
        let topology = |instance: &str, build_id: &str| TopologyRow {
            node_type: "pd".to_string(),
            instance: instance.to_string(),
            status_address: instance.to_string(),
            version: "4.0".to_string(),
            build_id: build_id.to_string(),
        };
        SnapshotBundle {
            cluster_config: vec![config("tikv-0", "8"), config("tikv-1", "7")],
            cluster_info: vec![topology("pd-0", "a"), topology("pd-1", "b")],
            ..Default::default()
        }
    }

    fn engine(provider: InMemoryProvider, parallel: bool) -> InspectionEngine {
        InspectionEngine::new(
            Arc::new(provider),
            EngineConfig {
                parallel,
                time_budget_ms: None,
            },
        )
    }

    #[tokio::test]
    async fn test_merges_in_rule_order() {
        let engine = engine(InMemoryProvider::new(bundle()), true);
        let findings = engine.inspect(InspectionRequest::default()).await.unwrap();
        let rules: Vec<Rule> = findings.iter().map(|f| f.rule).collect();
        assert_eq!(rules, vec![Rule::Config, Rule::Version]);
    }

    #[tokio::test]
    async fn test_sequential_matches_parallel() {
        let parallel = engine(InMemoryProvider::new(bundle()), true)
            .inspect(InspectionRequest::default())
            .await
            .unwrap();
        let sequential = engine(InMemoryProvider::new(bundle()), false)
            .inspect(InspectionRequest::default())
            .await
            .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[tokio::test]
    async fn test_failure_keeps_root_cause() {
        for parallel in [true, false] {
            let provider =
                InMemoryProvider::new(bundle()).with_failure(SnapshotKind::ClusterInfo);
            let err = engine(provider, parallel)
                .inspect(InspectionRequest::default())
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    InspectionError::Provider {
                        snapshot: SnapshotKind::ClusterInfo,
                        ..
                    }
                ),
                "unexpected error: {}",
                err
            );
        }
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine(InMemoryProvider::new(bundle()), true)
            .inspect_with_cancel(InspectionRequest::default(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, InspectionError::Cancelled));
    }

    #[tokio::test]
    async fn test_rule_predicate_with_no_match_runs_nothing() {
        let provider = Arc::new(InMemoryProvider::new(bundle()));
        let engine = InspectionEngine::new(provider.clone(), EngineConfig::default());
        let request = InspectionRequest::new(Predicates::default().with_rules(["cpu"]));
        assert!(engine.inspect(request).await.unwrap().is_empty());
        assert!(provider.fetch_log().is_empty());
    }
}
