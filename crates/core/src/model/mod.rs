mod grade;
mod ids;
mod question;
mod session;

pub use grade::{GradeResult, SectionStats, SubmitOutcome, percent_of};
pub use ids::{AnswerId, ExamId, ParseIdError, QuestionId, SessionId, UserId};
pub use question::{AnswerOption, Question, QuestionError, QuestionType, Section};
pub use session::{
    Session, SessionMode, SessionStateError, SessionStatus, WarningKind,
};
