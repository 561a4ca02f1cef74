use std::sync::Arc;

use rand::seq::{SliceRandom, index};

use exam_core::model::QuestionId;
use exam_core::policy;
use storage::repository::QuestionRepository;

use crate::error::EngineError;

/// Builds the ordered 40-question set for a new session.
///
/// Each section contributes exactly its quota, drawn uniformly without
/// replacement from that section's active pool; the concatenated draws are
/// then shuffled as a whole so the section grouping is not observable to the
/// taker. Every invocation randomizes independently.
#[derive(Clone)]
pub struct Selector {
    questions: Arc<dyn QuestionRepository>,
}

impl Selector {
    #[must_use]
    pub fn new(questions: Arc<dyn QuestionRepository>) -> Self {
        Self { questions }
    }

    /// Draw the question ids for one session.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InsufficientPool` if any section cannot supply
    /// its quota of active questions; there is no cross-section substitution.
    pub async fn select_question_ids(&self) -> Result<Vec<QuestionId>, EngineError> {
        let mut ids: Vec<QuestionId> = Vec::with_capacity(policy::TOTAL_QUESTIONS as usize);

        for (section, quota) in policy::DISTRIBUTION {
            let pool = self.questions.active_ids_by_section(section).await?;
            let need = quota as usize;
            if pool.len() < need {
                return Err(EngineError::InsufficientPool {
                    section,
                    need: quota,
                    got: u32::try_from(pool.len()).unwrap_or(u32::MAX),
                });
            }
            let picks = {
                let mut rng = rand::rng();
                index::sample(&mut rng, pool.len(), need)
            };
            ids.extend(picks.into_iter().map(|i| pool[i]));
        }

        {
            let mut rng = rand::rng();
            ids.shuffle(&mut rng);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use exam_core::model::{AnswerId, AnswerOption, Question, QuestionType, Section};
    use storage::repository::Storage;

    async fn seed_section(storage: &Storage, section: Section, base: i64, count: u32) {
        for offset in 0..i64::from(count) {
            let id = QuestionId::new(base + offset);
            let question = Question {
                id,
                section,
                qtype: QuestionType::Single,
                text: format!("question {id}"),
                code_snippet: None,
                explanation: None,
                is_active: true,
            };
            let options = vec![
                AnswerOption {
                    id: AnswerId::new(id.value() * 10 + 1),
                    question_id: id,
                    text: "right".into(),
                    is_correct: true,
                    order_index: 1,
                },
                AnswerOption {
                    id: AnswerId::new(id.value() * 10 + 2),
                    question_id: id,
                    text: "wrong".into(),
                    is_correct: false,
                    order_index: 2,
                },
            ];
            storage.questions.insert_question(&question, &options).await.unwrap();
        }
    }

    async fn seed_full_bank(storage: &Storage, extra: u32) {
        for (section, quota) in policy::DISTRIBUTION {
            let base = match section {
                Section::Objects => 1000,
                Section::Classes => 2000,
                Section::Builtins => 3000,
                Section::AdvFunc => 4000,
            };
            seed_section(storage, section, base, quota + extra).await;
        }
    }

    fn section_of(id: QuestionId) -> Section {
        match id.value() / 1000 {
            1 => Section::Objects,
            2 => Section::Classes,
            3 => Section::Builtins,
            _ => Section::AdvFunc,
        }
    }

    #[tokio::test]
    async fn draws_honor_quotas_and_distinctness() {
        let storage = Storage::in_memory();
        seed_full_bank(&storage, 5).await;
        let selector = Selector::new(storage.questions.clone());

        // the draw is randomized; check the invariants over many runs
        for _ in 0..25 {
            let ids = selector.select_question_ids().await.unwrap();
            assert_eq!(ids.len(), 40);

            let distinct: HashSet<QuestionId> = ids.iter().copied().collect();
            assert_eq!(distinct.len(), 40, "no question may repeat");

            for (section, quota) in policy::DISTRIBUTION {
                let drawn = ids.iter().filter(|id| section_of(**id) == section).count();
                assert_eq!(drawn as u32, quota, "quota for {section}");
            }
        }
    }

    #[tokio::test]
    async fn order_varies_between_draws() {
        let storage = Storage::in_memory();
        seed_full_bank(&storage, 0).await;
        let selector = Selector::new(storage.questions.clone());

        // with exact pools every draw picks the same 40 ids, so only the
        // shuffle differentiates runs; 12 identical permutations in a row
        // would mean the shuffle is broken
        let first = selector.select_question_ids().await.unwrap();
        let mut saw_different = false;
        for _ in 0..12 {
            if selector.select_question_ids().await.unwrap() != first {
                saw_different = true;
                break;
            }
        }
        assert!(saw_different);
    }

    #[tokio::test]
    async fn short_pool_fails_with_section() {
        let storage = Storage::in_memory();
        // classes gets one question fewer than its quota
        for (section, quota) in policy::DISTRIBUTION {
            let base = match section {
                Section::Objects => 1000,
                Section::Classes => 2000,
                Section::Builtins => 3000,
                Section::AdvFunc => 4000,
            };
            let count = if section == Section::Classes {
                quota - 1
            } else {
                quota
            };
            seed_section(&storage, section, base, count).await;
        }

        let selector = Selector::new(storage.questions.clone());
        let err = selector.select_question_ids().await.unwrap_err();
        match err {
            EngineError::InsufficientPool { section, need, got } => {
                assert_eq!(section, Section::Classes);
                assert_eq!(need, 7);
                assert_eq!(got, 6);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn inactive_questions_are_never_drawn() {
        let storage = Storage::in_memory();
        seed_full_bank(&storage, 0).await;

        // an inactive question on top of an exact pool must not appear
        let dormant = Question {
            id: QuestionId::new(1999),
            section: Section::Objects,
            qtype: QuestionType::Single,
            text: "retired".into(),
            code_snippet: None,
            explanation: None,
            is_active: false,
        };
        let options = vec![
            AnswerOption {
                id: AnswerId::new(19_991),
                question_id: dormant.id,
                text: "a".into(),
                is_correct: true,
                order_index: 1,
            },
            AnswerOption {
                id: AnswerId::new(19_992),
                question_id: dormant.id,
                text: "b".into(),
                is_correct: false,
                order_index: 2,
            },
        ];
        storage.questions.insert_question(&dormant, &options).await.unwrap();

        let selector = Selector::new(storage.questions.clone());
        for _ in 0..10 {
            let ids = selector.select_question_ids().await.unwrap();
            assert!(!ids.contains(&dormant.id));
        }
    }
}
