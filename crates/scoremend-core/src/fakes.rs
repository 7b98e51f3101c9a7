//! In-memory fake of the scorecard API (testing only).
//!
//! `FakeScoreApi` satisfies the `ScoreApi` contract without any network
//! dependency. Next-steps responses are scripted: queued responses are
//! consumed in order, and once the queue is empty the last observed
//! response repeats, which models a remote whose state stops changing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::ScoreApi;
use crate::domain::error::{Result, ScoremendError};
use crate::domain::model::{EntityScore, NextStepGroup, ScorecardSummary};

type NextStepsResult = Result<Vec<NextStepGroup>>;

#[derive(Default)]
pub struct FakeScoreApi {
    scorecards: Mutex<Vec<ScorecardSummary>>,
    scores: Mutex<HashMap<String, EntityScore>>,
    failing_scores: Mutex<Vec<String>>,
    next_steps_script: Mutex<VecDeque<NextStepsResult>>,
    repeat_last: Mutex<Vec<NextStepGroup>>,
    trigger_error: Mutex<Option<(u16, String)>>,
    trigger_calls: AtomicUsize,
    next_steps_calls: AtomicUsize,
}

impl FakeScoreApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scorecards(&self, scorecards: Vec<ScorecardSummary>) {
        *self.scorecards.lock().unwrap() = scorecards;
    }

    pub fn insert_score(&self, score: EntityScore) {
        self.scores
            .lock()
            .unwrap()
            .insert(score.scorecard_tag.clone(), score);
    }

    /// Make `fetch_score` fail with an upstream error for one scorecard.
    pub fn fail_score(&self, scorecard_tag: &str) {
        self.failing_scores
            .lock()
            .unwrap()
            .push(scorecard_tag.to_string());
    }

    /// Queue one next-steps response; consumed in FIFO order.
    pub fn push_next_steps(&self, groups: Vec<NextStepGroup>) {
        self.next_steps_script
            .lock()
            .unwrap()
            .push_back(Ok(groups));
    }

    /// Queue one next-steps failure.
    pub fn push_next_steps_error(&self, status: u16, body: &str) {
        self.next_steps_script
            .lock()
            .unwrap()
            .push_back(Err(ScoremendError::Upstream {
                status,
                body: body.to_string(),
            }));
    }

    /// Make every trigger fail with the given upstream status.
    pub fn fail_trigger(&self, status: u16, body: &str) {
        *self.trigger_error.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn trigger_calls(&self) -> usize {
        self.trigger_calls.load(Ordering::SeqCst)
    }

    pub fn next_steps_calls(&self) -> usize {
        self.next_steps_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreApi for FakeScoreApi {
    async fn list_scorecards(&self, _entity_tag: &str) -> Result<Vec<ScorecardSummary>> {
        Ok(self.scorecards.lock().unwrap().clone())
    }

    async fn fetch_score(
        &self,
        scorecard_tag: &str,
        _entity_tag: &str,
    ) -> Result<Option<EntityScore>> {
        if self
            .failing_scores
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == scorecard_tag)
        {
            return Err(ScoremendError::Upstream {
                status: 500,
                body: format!("score fetch for {scorecard_tag} failed"),
            });
        }
        Ok(self.scores.lock().unwrap().get(scorecard_tag).cloned())
    }

    async fn trigger_evaluation(&self, _scorecard_tag: &str, _entity_tag: &str) -> Result<()> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((status, body)) = self.trigger_error.lock().unwrap().clone() {
            return Err(ScoremendError::Upstream { status, body });
        }
        Ok(())
    }

    async fn fetch_next_steps(
        &self,
        _scorecard_tag: &str,
        _entity_tag: &str,
    ) -> Result<Vec<NextStepGroup>> {
        self.next_steps_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_steps_script.lock().unwrap().pop_front() {
            Some(Ok(groups)) => {
                *self.repeat_last.lock().unwrap() = groups.clone();
                Ok(groups)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.repeat_last.lock().unwrap().clone()),
        }
    }
}
