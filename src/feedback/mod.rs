// Feedback collection sessions

pub mod session;

pub use session::{FeedbackSubmission, ImageAttachment, SessionInfo, SessionStore};
