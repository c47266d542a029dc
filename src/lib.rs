pub mod common;
pub mod config;
pub mod list;
pub mod logging;
pub mod proxy;
pub mod scripts;
pub mod settings;

pub use common::error::{ListError, MoveError, ProxyError, ScriptError, SettingsError};
pub use config::{available_modes, AppConfig, Env, Mode};
pub use list::{AdvisoryLock, CancelToken, Direction, ListConfig, ListEvents, ListState, NullEvents};
pub use proxy::{Proxy, ProxyList, Rule, RuleKind};
pub use scripts::{Entry, ParserRegistry, Repository, Script, ScriptHandle};
pub use settings::{SettingRow, SettingsStore};
