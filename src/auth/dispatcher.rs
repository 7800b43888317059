//! Ordered authenticator chain.

use super::{AuthError, Authenticator, CallContext, Caller, Result};
use crate::observability::MetricsRecorder;
use http::request::Parts;
use std::sync::Arc;
use tracing::{debug, instrument, warn, Instrument};

/// Tries each configured [`Authenticator`] in order and returns the first
/// caller that authenticates. When none does, every failure is reported.
#[derive(Debug, Clone, Default)]
pub struct AuthenticatorDispatcher {
    authenticators: Vec<Arc<dyn Authenticator>>,
    metrics: MetricsRecorder,
}

impl AuthenticatorDispatcher {
    pub fn new(authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { authenticators, metrics: MetricsRecorder::new() }
    }

    /// Append an authenticator to the end of the chain.
    pub fn with(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticators.push(authenticator);
        self
    }

    pub fn authenticator_types(&self) -> Vec<&str> {
        self.authenticators.iter().map(|a| a.authenticator_type()).collect()
    }

    #[instrument(skip_all, fields(authenticators = self.authenticators.len()))]
    pub async fn authenticate(&self, context: &CallContext) -> Result<Caller> {
        let mut failures = Vec::with_capacity(self.authenticators.len());

        for authenticator in &self.authenticators {
            let kind = authenticator.authenticator_type();
            let outcome =
                authenticator.authenticate(context).instrument(crate::auth_span!(kind)).await;
            if let Some(caller) = self.observe(kind, outcome, &mut failures) {
                return Ok(caller);
            }
        }

        Err(self.aggregate(failures))
    }

    #[instrument(skip_all, fields(authenticators = self.authenticators.len()))]
    pub async fn authenticate_request(&self, request: &Parts) -> Result<Caller> {
        let mut failures = Vec::with_capacity(self.authenticators.len());

        for authenticator in &self.authenticators {
            let kind = authenticator.authenticator_type();
            let outcome = authenticator
                .authenticate_request(request)
                .instrument(crate::auth_span!(kind))
                .await;
            if let Some(caller) = self.observe(kind, outcome, &mut failures) {
                return Ok(caller);
            }
        }

        Err(self.aggregate(failures))
    }

    fn observe(
        &self,
        kind: &str,
        outcome: Result<Caller>,
        failures: &mut Vec<String>,
    ) -> Option<Caller> {
        self.metrics.record_authentication(kind, outcome.is_ok());
        match outcome {
            Ok(caller) => {
                debug!(authenticator = %kind, source = %caller.auth_source, "Caller authenticated");
                Some(caller)
            }
            Err(e) => {
                debug!(authenticator = %kind, error = %e, "Authenticator rejected caller");
                failures.push(format!("{}: {}", kind, e));
                None
            }
        }
    }

    fn aggregate(&self, failures: Vec<String>) -> AuthError {
        if failures.is_empty() {
            warn!("No authenticators configured; rejecting caller");
        } else {
            warn!(failures = ?failures, "All authenticators rejected caller");
        }
        AuthError::Unauthenticated { failures }
    }
}
