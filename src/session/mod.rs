// src/session/mod.rs  -  Class selection, scan resolution, marking, push events
pub mod events;
pub mod gateway;
pub mod resolver;
pub mod selector;

pub use events::{AttendanceEvent, EventBus, Subscription};
pub use gateway::{AuthState, MarkError, MarkingGateway, MarkingStatus};
pub use resolver::{MarkIntent, Resolution, ScanResolver};
pub use selector::{ClassSelector, FetchStatus};
