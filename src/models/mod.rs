pub mod grade;
pub mod loaders;
pub mod question;
pub mod router;

pub use grade::{AiGradingResult, Band, BreakdownItem, CriteriaScores, GradeReport, LetterGrade};
pub use loaders::{load_notes, load_submission};
pub use question::{GeneratedQuiz, Question, QuestionType, QuizConfig, Submission};
pub use router::{
    ModelFamily, RequestContext, RouterError, RouterMetrics, RouterRequest, RouterResult, Task,
};
