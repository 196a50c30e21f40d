pub mod batch;
pub mod context;
pub mod exceptions;
pub mod model;
pub mod notifications;
pub mod occurrence;
pub mod overdue;
pub mod quiet_hours;
pub mod service;
pub mod store;
pub mod title;
pub mod window;

pub use crate::context::EngineContext;
pub use crate::model::{Item, ItemStatus, Repeat, RepeatConfig};
pub use crate::service::{ReminderService, ReminderServiceBuilder};
