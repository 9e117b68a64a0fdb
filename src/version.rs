use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    // Time the answer was produced, UTC.
    pub instance: String,
}

fn instance_at(now: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    now.format(format)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION,
        instance: instance_at(OffsetDateTime::now_utc()),
    }
}
