// src/services/scoring.rs

use std::collections::{BTreeSet, HashMap};

use crate::{error::AppError, models::{question::OptionRow, quiz::AnswerSelection}};

/// Option ids of one question, with the subset flagged correct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKey {
    pub question_id: i64,
    pub option_ids: BTreeSet<i64>,
    pub correct_ids: BTreeSet<i64>,
}

impl AnswerKey {
    pub fn from_options(question_id: i64, options: &[OptionRow]) -> Self {
        Self {
            question_id,
            option_ids: options.iter().map(|o| o.id).collect(),
            correct_ids: options.iter().filter(|o| o.is_correct).map(|o| o.id).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub question_id: i64,
    pub selected: BTreeSet<i64>,
    pub is_correct: bool,
}

/// Outcome of grading a whole attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    /// One per question, in quiz order.
    pub verdicts: Vec<Verdict>,
    pub correct_answers: usize,
    pub total_questions: usize,
    /// Percentage, 0-100.
    pub score: i32,
}

/// `round(correct / total * 100)`; an empty quiz scores 0.
pub fn score_percentage(correct: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    (correct as f64 / total as f64 * 100.0).round() as i32
}

/// No partial credit: the selection must equal the correct set exactly.
pub fn is_exact_match(selected: &BTreeSet<i64>, correct: &BTreeSet<i64>) -> bool {
    !selected.is_empty() && selected == correct
}

/// Turns raw submitted answers into option-id sets keyed by question.
///
/// Answers to questions outside the quiz are dropped. An option id that does
/// not belong to its question is a client error.
pub fn normalize_answers(
    keys: &[AnswerKey],
    answers: &HashMap<i64, AnswerSelection>,
) -> Result<HashMap<i64, BTreeSet<i64>>, AppError> {
    let mut selections = HashMap::with_capacity(keys.len());
    for key in keys {
        let Some(answer) = answers.get(&key.question_id) else {
            continue;
        };
        let selected = answer.option_ids();
        if let Some(foreign) = selected.iter().find(|id| !key.option_ids.contains(id)) {
            return Err(AppError::BadRequest(format!(
                "L'option {} n'appartient pas à la question {}",
                foreign, key.question_id
            )));
        }
        selections.insert(key.question_id, selected);
    }
    Ok(selections)
}

/// Grades every question of the quiz; unanswered questions are wrong.
pub fn grade(keys: &[AnswerKey], selections: &HashMap<i64, BTreeSet<i64>>) -> Grade {
    let verdicts: Vec<Verdict> = keys
        .iter()
        .map(|key| {
            let selected = selections.get(&key.question_id).cloned().unwrap_or_default();
            let is_correct = is_exact_match(&selected, &key.correct_ids);
            Verdict {
                question_id: key.question_id,
                selected,
                is_correct,
            }
        })
        .collect();

    let correct_answers = verdicts.iter().filter(|v| v.is_correct).count();
    let total_questions = keys.len();

    Grade {
        verdicts,
        correct_answers,
        total_questions,
        score: score_percentage(correct_answers, total_questions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Options A=1, B=2, C=3, D=4; correct {A, C}.
    fn multi_key() -> AnswerKey {
        AnswerKey {
            question_id: 10,
            option_ids: BTreeSet::from([1, 2, 3, 4]),
            correct_ids: BTreeSet::from([1, 3]),
        }
    }

    fn single_key(question_id: i64, correct: i64) -> AnswerKey {
        AnswerKey {
            question_id,
            option_ids: (correct * 10..correct * 10 + 4).collect(),
            correct_ids: BTreeSet::from([correct * 10]),
        }
    }

    fn selection(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn multi_select_requires_exact_set() {
        let key = multi_key();
        assert!(!is_exact_match(&selection(&[1]), &key.correct_ids));
        assert!(is_exact_match(&selection(&[1, 3]), &key.correct_ids));
        assert!(!is_exact_match(&selection(&[1, 3, 4]), &key.correct_ids));
        assert!(!is_exact_match(&selection(&[]), &key.correct_ids));
    }

    #[test]
    fn score_is_rounded_percentage() {
        assert_eq!(score_percentage(5, 5), 100);
        assert_eq!(score_percentage(1, 3), 33);
        assert_eq!(score_percentage(2, 3), 67);
        assert_eq!(score_percentage(1, 8), 13);
        assert_eq!(score_percentage(0, 0), 0);
    }

    #[test]
    fn grade_counts_unanswered_as_wrong() {
        let keys = vec![single_key(1, 1), single_key(2, 2), multi_key()];
        let mut selections = HashMap::new();
        selections.insert(1, selection(&[10]));
        selections.insert(10, selection(&[1, 3]));

        let grade = grade(&keys, &selections);
        assert_eq!(grade.correct_answers, 2);
        assert_eq!(grade.total_questions, 3);
        assert_eq!(grade.score, 67);
        assert!(!grade.verdicts[1].is_correct);
        assert!(grade.verdicts[1].selected.is_empty());
    }

    #[test]
    fn normalize_accepts_single_and_many() {
        let keys = vec![single_key(1, 1), multi_key()];
        let answers = HashMap::from([
            (1, AnswerSelection::One(10)),
            (10, AnswerSelection::Many(vec![3, 1, 3])),
            // Not part of the quiz.
            (99, AnswerSelection::One(5)),
        ]);

        let selections = normalize_answers(&keys, &answers).unwrap();
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[&10], selection(&[1, 3]));
    }

    #[test]
    fn normalize_rejects_foreign_option() {
        let keys = vec![single_key(1, 1), multi_key()];
        let answers = HashMap::from([(10, AnswerSelection::Many(vec![1, 10]))]);
        assert!(matches!(
            normalize_answers(&keys, &answers),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn answer_key_from_option_rows() {
        let options = vec![
            OptionRow { id: 5, question_id: 1, text: "A".into(), is_correct: false, position: 0 },
            OptionRow { id: 6, question_id: 1, text: "B".into(), is_correct: true, position: 1 },
        ];
        let key = AnswerKey::from_options(1, &options);
        assert_eq!(key.option_ids, selection(&[5, 6]));
        assert_eq!(key.correct_ids, selection(&[6]));
    }
}
