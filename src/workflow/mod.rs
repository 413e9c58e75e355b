pub mod grading_cascade;
pub mod quiz_generation;
pub mod rubric;
pub mod semantic_grader;

pub use grading_cascade::{apply_gates, GateOutcome, GradingCascade};
pub use quiz_generation::QuizGenerator;
pub use rubric::{score_answer, score_with_judgment, RubricOutcome};
pub use semantic_grader::{
    grade_batch, judge_long_answer, parse_grading_batch, parse_judgment, GradedBatch,
};
