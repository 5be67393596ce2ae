pub mod app_log;
pub mod clock;
pub mod date_key;
pub mod game_records;
pub mod panic_hook;
pub mod persistence;
pub mod stats_store;
pub mod uploader;

pub use app_log::{AppLog, AppLogRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use game_records::aggregate_game_records;
pub use panic_hook::install_panic_hook;
pub use persistence::{InMemoryStore, JsonFileStore, PersistenceGateway};
pub use stats_store::{FlushGuard, StatsStore, StatsStoreBuilder};
pub use uploader::{spawn_upload_task, upload_stats, HttpUploader, UploadGateway, UploadOutcome, UploadStatus};
