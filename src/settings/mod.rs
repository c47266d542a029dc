pub mod store;

pub use store::{SettingRow, SettingsStore};
