mod card;
pub mod content;
mod ids;
mod progress;
mod review;
mod scheduling;
mod session;
mod settings;
mod summary;

pub use content::{Content, ContentError};
pub use ids::{CardId, DeckId, ParseIdError, SessionId, UserId};

pub use card::Card;
pub use progress::{DeckProgress, ProgressBucket};
pub use review::{Rating, RatingError, RatingRecord};
pub use scheduling::{
    CardState, DEFAULT_EASE_FACTOR, MIN_EASE_FACTOR, QueuedCard, SchedulingState,
};
pub use session::{RatingBreakdown, ReviewSession, SessionStats, SessionStatus};
pub use settings::{ReviewSettings, SchedulerParams, SettingsError};
pub use summary::{SessionSummary, TransitionCounts};
