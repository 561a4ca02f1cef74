#![forbid(unsafe_code)]

pub mod memory;
pub mod repository;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use repository::{
    ProgressCounts, QuestionRepository, QuestionState, SessionQuestionRow, SessionRepository,
    Storage, StorageError, UserRepository,
};
