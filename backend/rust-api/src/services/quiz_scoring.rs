//! Pure quiz grading and progress merging. No storage access here.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::models::quiz::{ModuleProgress, ProgressMap, QuestionInput, Quiz, QuizResult};
use crate::utils::time::day_string;

#[derive(Debug, Error)]
pub enum QuizError {
    #[error("no answers supplied")]
    NoAnswers,
    #[error("quiz has no questions")]
    NoQuestions,
    #[error("Quiz not found")]
    QuizNotFound,
    #[error("a submission for this quiz is already being processed")]
    SubmissionInProgress,
    #[error("{0}")]
    InvalidQuestionSet(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub score: i32,
    pub passed: bool,
}

/// Counts answers whose selected option is the question's correct option.
///
/// The first option flagged correct is the reference. Answers to questions
/// that are not part of the quiz, or to questions without a correct option,
/// count as wrong.
pub fn count_correct(quiz: &Quiz, answers: &BTreeMap<String, String>) -> usize {
    answers
        .iter()
        .filter(|(question_id, option_id)| {
            quiz.questions
                .iter()
                .find(|q| &q.id == *question_id)
                .and_then(|q| q.options.iter().find(|o| o.is_correct))
                .is_some_and(|correct| &correct.id == *option_id)
        })
        .count()
}

/// Percentage (floored) and pass flag. A quiz without questions cannot be scored.
pub fn score_submission(correct: usize, total: usize, passing_score: i32) -> Result<Score, QuizError> {
    if total == 0 {
        return Err(QuizError::NoQuestions);
    }
    let correct = correct.min(total);
    let score = ((correct * 100) / total) as i32;
    Ok(Score {
        score,
        passed: score >= passing_score,
    })
}

/// Folds a stored result into the learner's progress mapping and returns the
/// updated entry for the result's module.
///
/// The module is marked completed once every quiz in it has a result,
/// regardless of pass/fail. Completion is sticky.
pub fn merge_result(
    progress: &mut ProgressMap,
    result: &QuizResult,
    module_quiz_ids: &BTreeSet<String>,
    attempted_quiz_ids: &BTreeSet<String>,
) -> ModuleProgress {
    let entry = progress.entry(result.module_id.clone()).or_default();
    entry.score = result.score;
    entry.passed = result.passed;
    entry.date = Some(day_string(result.completed_at));
    if module_quiz_ids == attempted_quiz_ids {
        entry.completed = true;
    }
    entry.clone()
}

/// Authoring rule: every question needs options and exactly one correct one.
pub fn validate_question_set(questions: &[QuestionInput]) -> Result<(), QuizError> {
    for (index, question) in questions.iter().enumerate() {
        if question.options.len() < 2 {
            return Err(QuizError::InvalidQuestionSet(format!(
                "question {} needs at least two options",
                index + 1
            )));
        }
        let correct = question.options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(QuizError::InvalidQuestionSet(format!(
                "question {} must have exactly one correct option, found {}",
                index + 1,
                correct
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::{OptionInput, QuizOption, QuizQuestion};
    use chrono::{TimeZone, Utc};

    fn quiz(question_count: usize) -> Quiz {
        let questions = (1..=question_count)
            .map(|n| QuizQuestion {
                id: format!("q{}", n),
                question_text: format!("Question {}", n),
                order: n as i32,
                options: vec![
                    QuizOption {
                        id: format!("q{}-right", n),
                        option_text: "right".to_string(),
                        is_correct: true,
                    },
                    QuizOption {
                        id: format!("q{}-wrong", n),
                        option_text: "wrong".to_string(),
                        is_correct: false,
                    },
                ],
            })
            .collect();
        Quiz {
            id: "quiz".to_string(),
            module_id: "module".to_string(),
            title: "Burns".to_string(),
            description: String::new(),
            passing_score: 70,
            questions,
        }
    }

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(q, o)| (q.to_string(), o.to_string()))
            .collect()
    }

    fn result(module: &str, score: i32, passed: bool) -> QuizResult {
        QuizResult {
            id: "r1".to_string(),
            user_id: "u1".to_string(),
            quiz_id: "A".to_string(),
            module_id: module.to_string(),
            quiz_title: "A".to_string(),
            score,
            passed,
            completed_at: Utc.with_ymd_and_hms(2023, 5, 15, 10, 0, 0).unwrap(),
        }
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn three_of_four_scores_seventy_five_and_passes() {
        let quiz = quiz(4);
        let submitted = answers(&[
            ("q1", "q1-right"),
            ("q2", "q2-right"),
            ("q3", "q3-wrong"),
            ("q4", "q4-right"),
        ]);
        let correct = count_correct(&quiz, &submitted);
        assert_eq!(correct, 3);

        let score = score_submission(correct, quiz.questions.len(), quiz.passing_score).unwrap();
        assert_eq!(score, Score { score: 75, passed: true });
    }

    #[test]
    fn unknown_questions_are_ignored() {
        let quiz = quiz(2);
        let submitted = answers(&[("q1", "q1-right"), ("q99", "q1-right"), ("q2", "q1-right")]);
        assert_eq!(count_correct(&quiz, &submitted), 1);
    }

    #[test]
    fn question_without_correct_option_never_matches() {
        let mut quiz = quiz(1);
        quiz.questions[0].options.iter_mut().for_each(|o| o.is_correct = false);
        assert_eq!(count_correct(&quiz, &answers(&[("q1", "q1-right")])), 0);
    }

    #[test]
    fn first_correct_option_is_the_reference() {
        let mut quiz = quiz(1);
        quiz.questions[0].options[1].is_correct = true;
        assert_eq!(count_correct(&quiz, &answers(&[("q1", "q1-right")])), 1);
        assert_eq!(count_correct(&quiz, &answers(&[("q1", "q1-wrong")])), 0);
    }

    #[test]
    fn score_is_floored() {
        assert_eq!(score_submission(1, 3, 70).unwrap().score, 33);
        assert_eq!(score_submission(2, 3, 70).unwrap().score, 66);
        assert_eq!(score_submission(3, 3, 70).unwrap().score, 100);
        assert_eq!(score_submission(0, 7, 70).unwrap().score, 0);
    }

    #[test]
    fn passing_threshold_is_inclusive() {
        assert!(score_submission(7, 10, 70).unwrap().passed);
        assert!(!score_submission(69, 100, 70).unwrap().passed);
        assert!(score_submission(0, 5, 0).unwrap().passed);
    }

    #[test]
    fn score_stays_within_bounds() {
        for total in 1..=12usize {
            for correct in 0..=total {
                let score = score_submission(correct, total, 70).unwrap().score;
                assert!((0..=100).contains(&score));
                assert_eq!(score as usize, 100 * correct / total);
            }
        }
    }

    #[test]
    fn empty_quiz_is_a_validation_error() {
        assert!(matches!(
            score_submission(0, 0, 70),
            Err(QuizError::NoQuestions)
        ));
    }

    #[test]
    fn module_completes_once_every_quiz_has_a_result() {
        let module_quizzes = ids(&["A", "B"]);
        let mut progress = ProgressMap::new();

        let entry = merge_result(&mut progress, &result("m1", 50, false), &module_quizzes, &ids(&["A"]));
        assert!(!entry.completed);
        assert_eq!(entry.date.as_deref(), Some("2023-05-15"));

        let entry = merge_result(
            &mut progress,
            &result("m1", 40, false),
            &module_quizzes,
            &ids(&["A", "B"]),
        );
        assert!(entry.completed);
        assert_eq!(entry.score, 40);
        assert!(!entry.passed);
    }

    #[test]
    fn completion_is_never_reset() {
        let mut progress = ProgressMap::new();
        progress.insert(
            "m1".to_string(),
            ModuleProgress {
                score: 90,
                passed: true,
                date: Some("2023-01-01".to_string()),
                completed: true,
            },
        );
        // A quiz was added to the module after completion.
        let entry = merge_result(
            &mut progress,
            &result("m1", 60, false),
            &ids(&["A", "B", "C"]),
            &ids(&["A", "B"]),
        );
        assert!(entry.completed);
        assert_eq!(progress["m1"].score, 60);
    }

    #[test]
    fn other_modules_are_left_alone() {
        let mut progress = ProgressMap::new();
        progress.insert("m2".to_string(), ModuleProgress::default());
        merge_result(&mut progress, &result("m1", 80, true), &ids(&["A"]), &ids(&["A"]));
        assert_eq!(progress.len(), 2);
        assert_eq!(progress["m2"], ModuleProgress::default());
    }

    fn option(text: &str, is_correct: bool) -> OptionInput {
        OptionInput {
            id: None,
            option_text: text.to_string(),
            is_correct,
        }
    }

    #[test]
    fn authoring_requires_a_single_correct_option() {
        let mut question = QuestionInput {
            id: None,
            question_text: "Call which number?".to_string(),
            order: 1,
            options: vec![option("15", true), option("18", true)],
        };
        assert!(validate_question_set(std::slice::from_ref(&question)).is_err());

        question.options[1].is_correct = false;
        assert!(validate_question_set(std::slice::from_ref(&question)).is_ok());

        question.options.truncate(1);
        assert!(validate_question_set(&[question]).is_err());
    }
}
