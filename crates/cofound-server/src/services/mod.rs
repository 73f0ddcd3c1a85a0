pub mod directory;
pub mod maintenance;
pub mod messaging;
pub mod moderation;
pub mod profiles;
pub mod relationships;

pub use directory::DirectoryService;
pub use messaging::MessagingLog;
pub use moderation::{ModerationPolicy, ModerationWorkflow};
pub use profiles::{ProfileRepository, UploadKind};
pub use relationships::{RelationshipEngine, RelationshipPolicy};
