use super::stats_store::StatsStore;
use std::sync::Arc;

/// Counts every panic as a crash of the run and saves right away. The previous hook still runs.
pub fn install_panic_hook(store: Arc<StatsStore>) {
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "panic".to_string()
        };
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());

        store.record_panic(&format!("{} ({})", payload, location));
        prev(info);
    }));
}
