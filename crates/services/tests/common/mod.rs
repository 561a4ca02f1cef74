#![allow(dead_code)]

use exam_core::model::{
    AnswerId, AnswerOption, Question, QuestionId, QuestionType, Section, SessionId,
};
use exam_core::policy;
use services::SessionEngine;
use storage::repository::Storage;

pub fn section_base(section: Section) -> i64 {
    match section {
        Section::Objects => 1000,
        Section::Classes => 2000,
        Section::Builtins => 3000,
        Section::AdvFunc => 4000,
    }
}

/// Seeds a bank with exactly the per-section quotas. The advfunc section is
/// multi-choice (two correct options), the rest single-choice.
pub async fn seed_bank(storage: &Storage) {
    for (section, quota) in policy::DISTRIBUTION {
        let base = section_base(section);
        let qtype = if section == Section::AdvFunc {
            QuestionType::Multi
        } else {
            QuestionType::Single
        };
        for offset in 0..i64::from(quota) {
            let id = QuestionId::new(base + offset);
            let question = Question {
                id,
                section,
                qtype,
                text: format!("question {id}"),
                code_snippet: None,
                explanation: None,
                is_active: true,
            };
            let correct_count = match qtype {
                QuestionType::Single => 1,
                QuestionType::Multi => 2,
            };
            let options: Vec<AnswerOption> = (1..=4)
                .map(|k| AnswerOption {
                    id: AnswerId::new(id.value() * 10 + k),
                    question_id: id,
                    text: format!("option {k}"),
                    is_correct: k <= correct_count,
                    order_index: u32::try_from(k).unwrap(),
                })
                .collect();
            question.validate_options(&options).unwrap();
            storage
                .questions
                .insert_question(&question, &options)
                .await
                .unwrap();
        }
    }
}

/// Answers one question so that it grades correct: the full correct set,
/// via the mutation matching the question type.
pub async fn answer_correctly(
    engine: &SessionEngine,
    storage: &Storage,
    session_id: SessionId,
    question_id: QuestionId,
) {
    let question = storage.questions.question(question_id).await.unwrap();
    let correct = storage
        .questions
        .correct_answer_ids(question_id)
        .await
        .unwrap();
    match question.qtype {
        QuestionType::Single => engine
            .record_single_choice(session_id, question_id, correct[0])
            .await
            .unwrap(),
        QuestionType::Multi => {
            for answer in correct {
                engine
                    .toggle_multi_choice(session_id, question_id, answer)
                    .await
                    .unwrap();
            }
        }
    }
}

/// Answers one question so that it grades incorrect (one wrong option).
pub async fn answer_incorrectly(
    engine: &SessionEngine,
    storage: &Storage,
    session_id: SessionId,
    question_id: QuestionId,
) {
    let question = storage.questions.question(question_id).await.unwrap();
    let options = storage
        .questions
        .answers_for_question(question_id)
        .await
        .unwrap();
    let wrong = options.iter().find(|o| !o.is_correct).unwrap().id;
    match question.qtype {
        QuestionType::Single => engine
            .record_single_choice(session_id, question_id, wrong)
            .await
            .unwrap(),
        QuestionType::Multi => {
            engine
                .toggle_multi_choice(session_id, question_id, wrong)
                .await
                .unwrap();
        }
    }
}
