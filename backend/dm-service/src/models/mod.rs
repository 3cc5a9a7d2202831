pub mod conversation;
pub mod message;
pub mod report;
pub mod user;

pub use conversation::{
    pair_key, Conversation, ConversationSummary, ConversationView, Participant,
};
pub use message::{
    Attachment, AttachmentInput, Message, NewAttachment, NewMessage, UploadedAttachment,
};
pub use report::{NewReport, Report, ReportReason, ReportReview, ReportStatus};
pub use user::{AccountStatus, BlockedUser, DmPrivacy, ProfileSummary, UserProfile, UserRole};
