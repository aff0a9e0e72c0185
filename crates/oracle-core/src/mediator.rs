//! Per-request composition of cooldown, routing, and answer sourcing.
//!
//! The mediator never fails: a blocked request comes back as a blocked
//! [`Answer`], and every upstream failure degrades to a catalog phrase.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::ResponseCatalog;
use crate::config::OracleConfig;
use crate::cooldown::{CooldownDecision, CooldownStore, InMemoryCooldownStore};
use crate::error::{OracleError, Result};
use crate::policy::{DecisionPolicy, word_count};
use crate::random::{RandomSource, ThreadRandom};
use crate::upstream::{TextGenerator, UpstreamClient, UpstreamResult};

/// Question used by [`Mediator::probe`].
pub const PROBE_QUESTION: &str = "Привет, как дела?";

/// Key under which throttled probes are tracked.  Lives in its own store, so
/// it never collides with a user id.
const PROBE_KEY: &str = "probe";

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// Where the text of an [`Answer`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Short question answered from the catalog by policy.
    Catalog,
    /// Generated by the upstream model.
    Upstream,
    /// Upstream was consulted and failed; catalog phrase substituted.
    Fallback,
    /// Request rejected by the cooldown.
    Blocked,
}

/// The mediator's reply to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// Empty exactly when `blocked` is set.
    pub text: String,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u64>,
    pub source: AnswerSource,
}

impl Answer {
    fn blocked(remaining_seconds: u64) -> Self {
        Self {
            text: String::new(),
            blocked: true,
            remaining_seconds: Some(remaining_seconds),
            source: AnswerSource::Blocked,
        }
    }

    fn text(text: impl Into<String>, source: AnswerSource) -> Self {
        Self {
            text: text.into(),
            blocked: false,
            remaining_seconds: None,
            source,
        }
    }

    /// `Ok(text)` for a delivered answer, [`OracleError::CooldownActive`]
    /// for a blocked one.
    pub fn into_result(self) -> Result<String> {
        if self.blocked {
            return Err(OracleError::CooldownActive {
                remaining_seconds: self.remaining_seconds.unwrap_or(0),
            });
        }
        Ok(self.text)
    }
}

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

/// Composition root for answering user questions.
#[derive(Clone)]
pub struct Mediator {
    cooldown: Arc<dyn CooldownStore>,
    policy: DecisionPolicy,
    upstream: Arc<dyn TextGenerator>,
    catalog: ResponseCatalog,
    rng: Arc<dyn RandomSource>,
    probe_guard: InMemoryCooldownStore,
    window: Duration,
    upstream_timeout: Duration,
}

impl Mediator {
    /// Assemble a mediator from explicit collaborators.
    ///
    /// The same random source feeds both the policy and the catalog.
    pub fn new(
        config: &OracleConfig,
        cooldown: Arc<dyn CooldownStore>,
        upstream: Arc<dyn TextGenerator>,
        rng: Arc<dyn RandomSource>,
    ) -> Self {
        let policy = DecisionPolicy::new(
            config.oracle.short_question_words,
            config.oracle.upstream_probability,
            Arc::clone(&rng),
        );
        Self {
            cooldown,
            policy,
            upstream,
            catalog: ResponseCatalog::default(),
            rng,
            probe_guard: InMemoryCooldownStore::new(),
            window: config.cooldown_window(),
            upstream_timeout: config.upstream_timeout(),
        }
    }

    /// Production wiring: in-memory cooldowns, HTTP upstream, thread RNG.
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let upstream = UpstreamClient::new(config.upstream.clone())?;
        Ok(Self::new(
            config,
            Arc::new(InMemoryCooldownStore::new()),
            Arc::new(upstream),
            Arc::new(ThreadRandom),
        ))
    }

    pub fn upstream_configured(&self) -> bool {
        self.upstream.is_configured()
    }

    pub fn cooldown_window(&self) -> Duration {
        self.window
    }

    pub async fn tracked_users(&self) -> usize {
        self.cooldown.tracked_users().await
    }

    /// Answer `question` from `user_id` received at `now`.
    pub async fn answer(&self, user_id: &str, question: &str, now: DateTime<Utc>) -> Answer {
        let decision = self
            .cooldown
            .check_and_mark(user_id, now, self.window)
            .await;
        if let CooldownDecision::Blocked { remaining_seconds } = decision {
            info!(user_id, remaining_seconds, "request blocked by cooldown");
            return Answer::blocked(remaining_seconds);
        }

        if !self.policy.should_consult_upstream(question) {
            debug!(user_id, words = word_count(question), "answering from catalog");
            return Answer::text(self.catalog.draw(self.rng.as_ref()), AnswerSource::Catalog);
        }

        match self.upstream.generate(question, self.upstream_timeout).await {
            UpstreamResult::Success { text } if !text.trim().is_empty() => {
                info!(user_id, chars = text.chars().count(), "upstream answered");
                Answer::text(text, AnswerSource::Upstream)
            }
            other => {
                warn!(
                    user_id,
                    kind = other.kind(),
                    result = ?other,
                    "upstream failed, falling back to catalog"
                );
                Answer::text(self.catalog.draw(self.rng.as_ref()), AnswerSource::Fallback)
            }
        }
    }

    /// One upstream call with a fixed question, bypassing cooldown and
    /// policy.
    pub async fn probe(&self) -> UpstreamResult {
        self.upstream
            .generate(PROBE_QUESTION, self.upstream_timeout)
            .await
    }

    /// [`probe`](Self::probe) limited to one upstream call per cooldown
    /// window across all callers.  User cooldowns are not touched.
    pub async fn probe_at(&self, now: DateTime<Utc>) -> Result<UpstreamResult> {
        let decision = self
            .probe_guard
            .check_and_mark_sync(PROBE_KEY, now, self.window);
        if let CooldownDecision::Blocked { remaining_seconds } = decision {
            debug!(remaining_seconds, "upstream probe throttled");
            return Err(OracleError::CooldownActive { remaining_seconds });
        }
        Ok(self.probe().await)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
