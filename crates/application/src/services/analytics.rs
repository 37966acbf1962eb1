//! Question analytics and difficulty recalibration.
//!
//! Analytics are computed per question and per evaluation from the answers
//! given in that evaluation, then upserted as a whole row. The discrimination
//! index compares the correct rate of attempts scoring at least
//! [`HIGH_PERFORMANCE_CUTOFF`] percent with the rest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use lms_pipeline_common::Clock;
use lms_pipeline_domain::{
    question::{
        empirical_difficulty, spread, ImprovementSuggestion, Question, QuestionAnalytics,
        HIGH_PERFORMANCE_CUTOFF, LOW_DISCRIMINATION,
    },
    round_to, EvaluationId, QuestionId, UserId,
};

use crate::ports::{
    AnalyticsPort, AnswerRepositoryPort, EvaluationAnswer, EvaluationRepositoryPort,
    QuestionAnalyticsRepositoryPort, QuestionRepositoryPort, UserRepositoryPort,
};
use crate::{ApplicationError, ApplicationResult};

/// Hit rate under which a question is flagged as too hard.
pub const TOO_HARD_HIT_RATE: f64 = 20.0;

/// Hit rate over which a question is flagged as too easy.
pub const TOO_EASY_HIT_RATE: f64 = 95.0;

/// A wrong option must be chosen more often than this to be flagged.
pub const COMMON_ERROR_MIN_FREQUENCY: u32 = 2;

/// Spread of per-cluster hit rates over which a question is flagged.
pub const CLUSTER_SPREAD_LIMIT: f64 = 25.0;

/// Number of wrong options reported by [`QuestionAnalyticsService::common_errors`].
pub const COMMON_ERRORS_LIMIT: usize = 5;

/// Outcome of refreshing the analytics of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub evaluation_id: EvaluationId,
    pub questions_updated: usize,
    pub answers_considered: usize,
}

/// A wrong option and how many answers chose it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonError {
    pub option: String,
    pub frequency: u32,
}

/// Computes question analytics and recalibrates difficulty
pub struct QuestionAnalyticsService {
    answers: Arc<dyn AnswerRepositoryPort>,
    evaluations: Arc<dyn EvaluationRepositoryPort>,
    questions: Arc<dyn QuestionRepositoryPort>,
    analytics: Arc<dyn QuestionAnalyticsRepositoryPort>,
    users: Arc<dyn UserRepositoryPort>,
    clock: Arc<dyn Clock>,
}

impl QuestionAnalyticsService {
    pub fn new(
        answers: Arc<dyn AnswerRepositoryPort>,
        evaluations: Arc<dyn EvaluationRepositoryPort>,
        questions: Arc<dyn QuestionRepositoryPort>,
        analytics: Arc<dyn QuestionAnalyticsRepositoryPort>,
        users: Arc<dyn UserRepositoryPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            answers,
            evaluations,
            questions,
            analytics,
            users,
            clock,
        }
    }

    /// Recompute the analytics row of every answered question of an evaluation
    #[instrument(skip(self))]
    pub async fn update_analytics(
        &self,
        evaluation_id: EvaluationId,
    ) -> ApplicationResult<AnalyticsSummary> {
        let evaluation = self
            .evaluations
            .get_by_id(evaluation_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("evaluation", evaluation_id))?;

        let answers = self.answers.list_by_evaluation(evaluation_id).await?;

        let mut by_question: BTreeMap<QuestionId, Vec<&EvaluationAnswer>> = BTreeMap::new();
        for entry in &answers {
            by_question
                .entry(entry.answer.question_id)
                .or_default()
                .push(entry);
        }

        let students: Vec<UserId> = answers
            .iter()
            .map(|entry| entry.student_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let clusters = self.users.cluster_assignments(&students).await?;

        let now = self.clock.now();
        let mut questions_updated = 0;

        for question_id in &evaluation.question_ids {
            let Some(group) = by_question.get(question_id) else {
                debug!(question_id = %question_id, "Question has no answers, skipping");
                continue;
            };

            let row = compute_question_analytics(*question_id, evaluation_id, group, &clusters, now);
            self.analytics.upsert(&row).await?;
            questions_updated += 1;
        }

        let summary = AnalyticsSummary {
            evaluation_id,
            questions_updated,
            answers_considered: answers.len(),
        };

        info!(
            evaluation_id = %evaluation_id,
            questions_updated = summary.questions_updated,
            answers_considered = summary.answers_considered,
            "Question analytics updated"
        );

        Ok(summary)
    }

    /// Derive the empirical difficulty of a question from its analytics across
    /// evaluations and store it.
    ///
    /// Without any recorded answers the stored estimate is returned unchanged
    /// and nothing is written.
    #[instrument(skip(self, question), fields(question_id = %question.id))]
    pub async fn recalibrate_difficulty(&self, question: &Question) -> ApplicationResult<f64> {
        let rows = self.analytics.list_by_question(question.id).await?;

        let answered: u32 = rows.iter().map(|row| row.times_answered).sum();
        let correct: u32 = rows.iter().map(|row| row.times_correct).sum();

        if answered == 0 {
            debug!("No analytics recorded yet, keeping the estimate");
            return Ok(question.estimated_difficulty);
        }

        let hit_rate = correct as f64 / answered as f64 * 100.0;
        let difficulty = round_to(empirical_difficulty(hit_rate), 4);

        self.questions
            .save_empirical_difficulty(question.id, difficulty)
            .await?;

        debug!(answered, correct, difficulty, "Empirical difficulty stored");

        Ok(difficulty)
    }

    /// Review suggestions from the most recent analytics row of a question
    pub async fn suggest_improvements(
        &self,
        question_id: QuestionId,
    ) -> ApplicationResult<Vec<ImprovementSuggestion>> {
        let rows = self.analytics.list_by_question(question_id).await?;
        let Some(latest) = rows.iter().max_by_key(|row| row.updated_at) else {
            return Ok(Vec::new());
        };

        let mut suggestions = Vec::new();

        if let Some(index) = latest.discrimination_index {
            if index < LOW_DISCRIMINATION {
                suggestions.push(ImprovementSuggestion::LowDiscrimination { index });
            }
        }

        if latest.hit_rate < TOO_HARD_HIT_RATE {
            suggestions.push(ImprovementSuggestion::TooHard {
                hit_rate: latest.hit_rate,
            });
        } else if latest.hit_rate > TOO_EASY_HIT_RATE {
            suggestions.push(ImprovementSuggestion::TooEasy {
                hit_rate: latest.hit_rate,
            });
        }

        if let Some(top) = self.common_errors(question_id).await?.into_iter().next() {
            if top.frequency > COMMON_ERROR_MIN_FREQUENCY {
                suggestions.push(ImprovementSuggestion::CommonError {
                    option: top.option,
                    frequency: top.frequency,
                });
            }
        }

        let cluster_rates: Vec<f64> = latest.cluster_performance.values().copied().collect();
        let cluster_spread = spread(&cluster_rates);
        if cluster_spread > CLUSTER_SPREAD_LIMIT {
            suggestions.push(ImprovementSuggestion::ClusterBias {
                spread: round_to(cluster_spread, 2),
            });
        }

        Ok(suggestions)
    }

    /// Wrong options chosen for a question, most frequent first
    pub async fn common_errors(&self, question_id: QuestionId) -> ApplicationResult<Vec<CommonError>> {
        let answers = self.answers.list_by_question(question_id).await?;

        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for answer in answers.iter().filter(|a| a.is_correct == Some(false)) {
            if let Some(option) = &answer.selected_option {
                *counts.entry(option.clone()).or_default() += 1;
            }
        }

        let mut errors: Vec<CommonError> = counts
            .into_iter()
            .map(|(option, frequency)| CommonError { option, frequency })
            .collect();
        // Stable sort keeps ties in option order
        errors.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        errors.truncate(COMMON_ERRORS_LIMIT);

        Ok(errors)
    }
}

#[async_trait]
impl AnalyticsPort for QuestionAnalyticsService {
    async fn update_analytics(&self, evaluation_id: EvaluationId) -> ApplicationResult<AnalyticsSummary> {
        QuestionAnalyticsService::update_analytics(self, evaluation_id).await
    }

    async fn recalibrate_difficulty(&self, question: &Question) -> ApplicationResult<f64> {
        QuestionAnalyticsService::recalibrate_difficulty(self, question).await
    }
}

/// Build the analytics row of one question from its answers in one evaluation
pub fn compute_question_analytics(
    question_id: QuestionId,
    evaluation_id: EvaluationId,
    answers: &[&EvaluationAnswer],
    clusters: &HashMap<UserId, i32>,
    updated_at: DateTime<Utc>,
) -> QuestionAnalytics {
    let times_answered = answers.len() as u32;
    let times_correct = answers.iter().filter(|e| is_correct(e)).count() as u32;
    let times_incorrect = answers
        .iter()
        .filter(|e| e.answer.is_correct == Some(false))
        .count() as u32;

    let timings: Vec<f64> = answers
        .iter()
        .filter_map(|e| e.answer.response_time_secs)
        .collect();
    let avg_response_time_secs = if timings.is_empty() {
        None
    } else {
        Some(round_to(timings.iter().sum::<f64>() / timings.len() as f64, 2))
    };

    let mut option_counts: BTreeMap<String, u32> = BTreeMap::new();
    for entry in answers {
        if let Some(option) = &entry.answer.selected_option {
            *option_counts.entry(option.clone()).or_default() += 1;
        }
    }
    let response_distribution = option_counts
        .into_iter()
        .map(|(option, count)| (option, percent(count, times_answered)))
        .collect();

    let mut by_cluster: BTreeMap<i32, (u32, u32)> = BTreeMap::new();
    for entry in answers {
        if let Some(cluster) = clusters.get(&entry.student_id) {
            let (total, correct) = by_cluster.entry(*cluster).or_default();
            *total += 1;
            if is_correct(entry) {
                *correct += 1;
            }
        }
    }
    let cluster_performance = by_cluster
        .into_iter()
        .map(|(cluster, (total, correct))| (format!("cluster_{}", cluster), percent(correct, total)))
        .collect();

    QuestionAnalytics {
        question_id,
        evaluation_id,
        times_answered,
        times_correct,
        times_incorrect,
        hit_rate: percent(times_correct, times_answered),
        discrimination_index: discrimination_index(answers),
        avg_response_time_secs,
        response_distribution,
        cluster_performance,
        updated_at,
    }
}

/// `p_high - p_low` over attempts split at [`HIGH_PERFORMANCE_CUTOFF`];
/// `None` when either group is empty
pub fn discrimination_index(answers: &[&EvaluationAnswer]) -> Option<f64> {
    let (high, low): (Vec<&&EvaluationAnswer>, Vec<&&EvaluationAnswer>) = answers
        .iter()
        .partition(|e| e.attempt_percentage >= HIGH_PERFORMANCE_CUTOFF);

    if high.is_empty() || low.is_empty() {
        return None;
    }

    let rate = |group: &[&&EvaluationAnswer]| {
        group.iter().filter(|e| is_correct(e)).count() as f64 / group.len() as f64
    };

    Some(round_to(rate(high.as_slice()) - rate(low.as_slice()), 3))
}

fn is_correct(entry: &EvaluationAnswer) -> bool {
    entry.answer.is_correct == Some(true)
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 / whole as f64 * 100.0, 2)
    }
}
