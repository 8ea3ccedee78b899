//! Repository layer: typed read/write of quizzes, sessions, players,
//! answers and snapshots.

pub mod answer;
pub mod player;
pub mod quiz;
pub mod session;
pub mod snapshot;

pub use answer::{AnswerRepository, SqlxAnswerRepository};
pub use player::{PlayerRepository, SqlxPlayerRepository};
pub use quiz::{QuizRepository, SqlxQuizRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use snapshot::{SnapshotRepository, SqlxSnapshotRepository};
