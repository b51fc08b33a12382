//! Explicit per-source pipeline state machine.
//!
//! `Pending → HealthChecked → Fetching(attempt) → Succeeded | Failed`,
//! with cache hits and health skips resolving straight from their
//! respective stages. Keeping the transitions explicit lets failure
//! injection and timing be tested without any network.

use std::time::Instant;

/// Where one source currently is in its processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStage {
    Pending,
    HealthChecked,
    Fetching { attempt: u32 },
    Succeeded { events: usize },
    Failed { reason: String },
}

/// An illegal stage transition; always a programming error in the
/// dispatcher, never a runtime condition.
#[derive(Debug, thiserror::Error)]
#[error("illegal pipeline transition from {from:?} to {to}")]
pub struct TransitionError {
    pub from: SourceStage,
    pub to: &'static str,
}

/// Tracks one source through health check, fetch attempts, and outcome.
#[derive(Debug)]
pub struct SourcePipeline {
    source_id: String,
    stage: SourceStage,
    started_at: Instant,
}

impl SourcePipeline {
    #[must_use]
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            stage: SourceStage::Pending,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    #[must_use]
    pub fn stage(&self) -> &SourceStage {
        &self.stage
    }

    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Health probe passed (or was disabled).
    pub fn health_checked(&mut self) -> Result<(), TransitionError> {
        match self.stage {
            SourceStage::Pending => {
                self.stage = SourceStage::HealthChecked;
                Ok(())
            }
            _ => Err(self.illegal("HealthChecked")),
        }
    }

    /// A fetch attempt is starting. Attempts must be 1-based and strictly
    /// increasing.
    pub fn fetching(&mut self, attempt: u32) -> Result<(), TransitionError> {
        let legal = match &self.stage {
            SourceStage::HealthChecked => attempt == 1,
            SourceStage::Fetching { attempt: previous } => attempt == previous + 1,
            _ => false,
        };
        if legal {
            self.stage = SourceStage::Fetching { attempt };
            Ok(())
        } else {
            Err(self.illegal("Fetching"))
        }
    }

    /// Terminal success: events normalized, or served from cache (which
    /// resolves straight from `Pending`, before any probe).
    pub fn succeeded(&mut self, events: usize) -> Result<(), TransitionError> {
        match self.stage {
            SourceStage::Pending
            | SourceStage::HealthChecked
            | SourceStage::Fetching { .. } => {
                self.stage = SourceStage::Succeeded { events };
                Ok(())
            }
            _ => Err(self.illegal("Succeeded")),
        }
    }

    /// Terminal failure: skipped, exhausted, or terminally failed.
    pub fn failed(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        match self.stage {
            SourceStage::Succeeded { .. } | SourceStage::Failed { .. } => {
                Err(self.illegal("Failed"))
            }
            _ => {
                self.stage = SourceStage::Failed {
                    reason: reason.into(),
                };
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.stage,
            SourceStage::Succeeded { .. } | SourceStage::Failed { .. }
        )
    }

    fn illegal(&self, to: &'static str) -> TransitionError {
        TransitionError {
            from: self.stage.clone(),
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_all_stages() {
        let mut pipeline = SourcePipeline::new("s1");
        assert_eq!(*pipeline.stage(), SourceStage::Pending);

        pipeline.health_checked().expect("pending -> health checked");
        pipeline.fetching(1).expect("first attempt");
        pipeline.fetching(2).expect("second attempt");
        pipeline.succeeded(7).expect("success");

        assert!(pipeline.is_terminal());
        assert_eq!(*pipeline.stage(), SourceStage::Succeeded { events: 7 });
    }

    #[test]
    fn cache_hit_resolves_straight_from_pending() {
        let mut pipeline = SourcePipeline::new("s1");
        pipeline.succeeded(3).expect("cache hit resolves without any probe");
        assert_eq!(*pipeline.stage(), SourceStage::Succeeded { events: 3 });
    }

    #[test]
    fn unhealthy_source_fails_without_fetching() {
        let mut pipeline = SourcePipeline::new("s1");
        pipeline.failed("health check failed").expect("skip");
        assert!(pipeline.is_terminal());
    }

    #[test]
    fn attempts_must_increase_monotonically() {
        let mut pipeline = SourcePipeline::new("s1");
        pipeline.health_checked().expect("health checked");
        pipeline.fetching(1).expect("first attempt");
        assert!(pipeline.fetching(3).is_err());
        assert!(pipeline.fetching(1).is_err());
    }

    #[test]
    fn fetching_before_health_check_is_illegal() {
        let mut pipeline = SourcePipeline::new("s1");
        assert!(pipeline.fetching(1).is_err());
    }

    #[test]
    fn terminal_stages_reject_further_transitions() {
        let mut pipeline = SourcePipeline::new("s1");
        pipeline.health_checked().expect("health checked");
        pipeline.succeeded(1).expect("success");
        assert!(pipeline.failed("late failure").is_err());
        assert!(pipeline.health_checked().is_err());
    }
}
