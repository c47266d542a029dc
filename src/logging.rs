use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic;
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::thread;

struct LogEntry {
    domain: String,
    message: String,
    timestamp: String,
}

lazy_static::lazy_static! {
    static ref LOG_TX: Mutex<Option<mpsc::Sender<LogEntry>>> = Mutex::new(None);
    static ref LOG_DIR_PATH: Mutex<Option<PathBuf>> = Mutex::new(None);
}

/// Initialize the log directory and start the background logger thread
pub fn init_log_dir(path: PathBuf) {
    // Store path for panic hook
    if let Ok(mut dir) = LOG_DIR_PATH.lock() {
        *dir = Some(path.clone());
    }

    let (tx, rx) = mpsc::channel::<LogEntry>();

    if let Ok(mut global_tx) = LOG_TX.lock() {
        *global_tx = Some(tx);
    }

    thread::spawn(move || {
        let mut file_cache: HashMap<String, File> = HashMap::new();
        let log_dir = path.join("logs");

        if !log_dir.exists() {
            let _ = std::fs::create_dir_all(&log_dir);
        }

        while let Ok(entry) = rx.recv() {
            let filename = match entry.domain.as_str() {
                "generator" => "generator.log",
                "save" => "save.log",
                "crash" => "crash.log",
                _ => "app.log",
            };

            let file_path = log_dir.join(filename);
            let file_key = filename.to_string();

            let file = file_cache.entry(file_key).or_insert_with(|| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file_path)
                    .unwrap_or_else(|_| File::create(&file_path).unwrap()) // Fallback
            });

            if let Err(e) = writeln!(file, "[{}] {}", entry.timestamp, entry.message) {
                eprintln!("Failed to write log: {}", e);
            }
        }
    });
}

/// Setup panic hook to log crashes to crash.log
/// Note: Panic hook runs in the crashing thread, so we avoid using the channel
/// to ensure we can write even if the channel/logger thread is dead or deadlocked.
pub fn setup_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let msg = format!(
            "{}\nBacktrace: {:?}\n",
            info,
            std::backtrace::Backtrace::capture()
        );
        eprintln!("{}", msg);

        // Direct file write for panics
        if let Ok(guard) = LOG_DIR_PATH.lock() {
            if let Some(ref dir) = *guard {
                let crash_file = dir.join("logs").join("crash.log");
                if let Some(parent) = crash_file.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }

                if let Ok(mut file) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(crash_file)
                {
                    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                    let _ = writeln!(file, "[{}] {}", timestamp, msg);
                }
            }
        }
    }));
}

/// Queue a message to be written to a specialized domain log file
pub fn write_domain_log(domain: &str, message: &str) -> std::io::Result<()> {
    if let Ok(guard) = LOG_TX.lock() {
        if let Some(tx) = &*guard {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            let _ = tx.send(LogEntry {
                domain: domain.to_string(),
                message: message.to_string(),
                timestamp,
            });
            return Ok(());
        }
    }
    // Fallback if logger not initialized (should rarely happen after startup)
    Err(std::io::Error::new(
        std::io::ErrorKind::Other,
        "Logger not initialized",
    ))
}
