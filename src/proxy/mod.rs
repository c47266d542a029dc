pub mod file;
pub mod list;
pub mod model;

pub use file::ProxyScriptData;
pub use list::ProxyList;
pub use model::{decode_rules, encode_rules, Proxy, Rule, RuleKind};
