/// Callbacks the surrounding application receives from a running load
/// or save. Implementations are invoked from the worker thread and must
/// marshal to the UI thread themselves.
pub trait ListEvents: Send + Sync {
    fn load_progress_changed(&self, _progress: f64) {}
    fn save_progress_changed(&self, _progress: f64) {}
    /// A load or save aborted; `message` is human-readable.
    fn thread_died(&self, _message: &str) {}
    fn entry_list_updated(&self) {}
    fn save_completed(&self) {}
}

/// Headless sink for comparison-mode parses and tests.
pub struct NullEvents;

impl ListEvents for NullEvents {}
