pub mod event;
pub mod lookup;
pub mod record;
pub mod view;

pub use event::{EventKey, WorkLogUnit};
pub use lookup::{ChangedRecord, LookupQuery, StateFilter};
pub use record::{from_millis, to_millis, Record, RecordKey, State, Timestamp};
pub use view::ViewBundle;
