pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::book::{BookId, BookLog, BookRecord, RecommendationSummary};
pub use domain::message::{History, Message, Sender};
pub use domain::mode::Mode;
pub use domain::moderation::ModerationVerdict;
pub use domain::session::{ConversationState, RecommendationPhase, SessionId};
pub use domain::topic::Topic;
pub use errors::{ApplicationError, DomainError, FailureKind, InterfaceError};
