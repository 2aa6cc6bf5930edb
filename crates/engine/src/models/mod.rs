//! Domain models shared by the repositories and services.

pub mod ai_call_log;
pub mod order;
pub mod print_settings;
pub mod print_task;
pub mod sync;

pub use ai_call_log::NewAiCallLog;
pub use order::{
    Customer, CustomerAddress, ItemSyncError, LineItem, NewCustomer, NewOrder, NewOrderItem,
    NewProduct, Order, OrderItem, OrderUpsert, OrderUpsertReport, OrderWithItems, Product,
};
pub use print_settings::{PrintSetting, PrintSettings};
pub use print_task::{PersistOutcome, PrintTask, TaskFields, TaskLinkage, TaskUpsert};
pub use sync::{OrderCheckpoint, SyncProgress, TagRecord};
