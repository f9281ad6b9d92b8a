//! View analysis trigger.
//!
//! The analysis text is derived from `(active view, data generation)`. When
//! either changes, [`ViewAnalyzer::trigger`] issues a new request token,
//! clears the old text and hands back a [`PendingAnalysis`]. Only a
//! completion carrying the latest token is applied; anything older is
//! dropped, so a slow response for a previous view can never overwrite the
//! current one.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::AnalysisConfig;
use crate::error::OracleError;
use crate::models::ViewId;
use crate::oracle::{AnalysisRequest, Oracle};
use crate::session::SharedSession;

pub const ANALYSIS_ERROR_TEXT: &str = "AI analysis server communication error.";
pub const ANALYSIS_EMPTY_TEXT: &str = "No AI analysis could be generated for this section.";

/// What the analysis panel currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSnapshot {
    pub view: ViewId,
    pub analyzing: bool,
    pub text: String,
    /// Latest issued request token.
    pub token: u64,
}

#[derive(Debug, Default)]
struct AnalysisState {
    snapshot: AnalysisSnapshot,
    derived_from: Option<(ViewId, u64)>,
}

/// A request issued by [`ViewAnalyzer::trigger`] and not yet completed.
#[derive(Debug, Clone)]
pub struct PendingAnalysis {
    pub token: u64,
    pub request: AnalysisRequest,
}

#[derive(Clone)]
pub struct ViewAnalyzer {
    oracle: Arc<dyn Oracle>,
    session: SharedSession,
    config: AnalysisConfig,
    state: Arc<Mutex<AnalysisState>>,
}

impl ViewAnalyzer {
    pub fn new(oracle: Arc<dyn Oracle>, session: SharedSession, config: AnalysisConfig) -> Self {
        Self {
            oracle,
            session,
            config,
            state: Arc::new(Mutex::new(AnalysisState::default())),
        }
    }

    /// Re-derive from the session. Returns the request to run when the
    /// active view has a dataset and the derivation key changed.
    ///
    /// A view without a backing dataset (or with analysis disabled) resets
    /// the text to empty and still advances the token, which invalidates
    /// any request still in flight.
    pub async fn trigger(&self) -> Option<PendingAnalysis> {
        let (view, generation, data) = {
            let session = self.session.lock().await;
            let view = session.active_view();
            let data = view
                .backing_domain()
                .and_then(|domain| session.dataset(domain))
                .map(|ds| ds.records_json());
            (view, session.data_generation(), data)
        };

        let mut state = self.state.lock().await;
        if state.derived_from == Some((view, generation)) {
            return None;
        }
        state.derived_from = Some((view, generation));
        state.snapshot.token += 1;
        state.snapshot.view = view;
        state.snapshot.text.clear();

        let request = match data {
            Some(data) if self.config.enabled => AnalysisRequest::for_view(
                view,
                data,
                self.config.language.clone(),
                self.config.max_chars,
            ),
            _ => None,
        };
        match request {
            Some(request) => {
                state.snapshot.analyzing = true;
                tracing::debug!(view = %view, token = state.snapshot.token, "analysis requested");
                Some(PendingAnalysis {
                    token: state.snapshot.token,
                    request,
                })
            }
            None => {
                state.snapshot.analyzing = false;
                None
            }
        }
    }

    /// Ask the oracle. Failures and empty answers become placeholder text.
    pub async fn run(&self, pending: &PendingAnalysis) -> String {
        match self.oracle.analyze_view(&pending.request).await {
            Ok(text) if text.trim().is_empty() => ANALYSIS_EMPTY_TEXT.to_string(),
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                log_failure(pending.request.view, &err);
                ANALYSIS_ERROR_TEXT.to_string()
            }
        }
    }

    /// Apply a result. Returns `false` (and changes nothing) for a stale token.
    pub async fn complete(&self, token: u64, text: String) -> bool {
        let mut state = self.state.lock().await;
        if token != state.snapshot.token {
            tracing::debug!(
                token,
                latest = state.snapshot.token,
                "discarding stale analysis"
            );
            return false;
        }
        state.snapshot.text = text;
        state.snapshot.analyzing = false;
        true
    }

    /// Trigger, run and complete in one go.
    pub async fn refresh(&self) -> AnalysisSnapshot {
        if let Some(pending) = self.trigger().await {
            let text = self.run(&pending).await;
            self.complete(pending.token, text).await;
        }
        self.snapshot().await
    }

    /// Trigger now and finish the oracle call in the background.
    pub async fn spawn_refresh(&self) {
        if let Some(pending) = self.trigger().await {
            let this = self.clone();
            tokio::spawn(async move {
                let text = this.run(&pending).await;
                this.complete(pending.token, text).await;
            });
        }
    }

    pub async fn snapshot(&self) -> AnalysisSnapshot {
        self.state.lock().await.snapshot.clone()
    }
}

fn log_failure(view: ViewId, err: &OracleError) {
    tracing::warn!(view = %view, error = %err, "view analysis failed, showing placeholder");
}
