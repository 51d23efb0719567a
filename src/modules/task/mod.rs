pub mod crud;
pub mod interface;
pub mod memory;
pub mod model;

pub use crud::MySqlReminderStore;
pub use interface::ReminderStore;
pub use memory::InMemoryReminderStore;
pub use model::{DueReminder, Reminder, ReminderOffset, Task, TaskStatus};
