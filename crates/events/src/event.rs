use chrono::{DateTime, Utc};

/// Anything the depot records as having happened.
///
/// `event_type` is the dotted wire name (`"delivery_note.issued"`); `version`
/// is bumped whenever that payload's shape changes.
pub trait Event: Clone + std::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    fn occurred_at(&self) -> DateTime<Utc>;
}
