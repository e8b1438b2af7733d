pub mod availability;
pub mod config;
pub mod desk;
pub mod directory;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod notify;
pub mod queue;
pub mod store;

pub use availability::{upcoming_dates, Availability, SlotGrid, DEFAULT_HORIZON_DAYS};
pub use desk::{FrontDesk, ProviderCard};
pub use directory::Directory;
pub use dispatch::{CalledClient, DispatchEngine, DispatchOutcome, DispatchState};
pub use domain::busy::{BusyBlock, BusyBlockId};
pub use domain::provider::{OwnerId, Provider, ProviderId, ReferralCode, Service, ServiceId};
pub use domain::queue::{
    ClientId, EntryMode, QueueEntry, QueueEntryId, QueueLane, QueueListing,
};
pub use domain::slot::{Slot, SlotParseError, SlotTime};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{IntakeEvent, IntakeKind, IntakeResult, IntakeSessions, IntakeState};
pub use notify::{
    InMemoryNotifier, NoopNotifier, Notification, NotificationKind, Notifier, NotifyError,
    Recipient,
};
pub use queue::{Booking, QueueBook};
pub use store::{BusyBlockStore, DirectoryStore, InMemoryStore, LineupStore, QueueStore};
