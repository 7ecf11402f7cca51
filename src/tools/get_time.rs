//! Current time lookup in a named timezone.

use chrono::{DateTime, TimeZone, Utc, format::StrftimeItems};
use chrono_tz::Tz;
use log::{debug, warn};
use serde::Deserialize;

use crate::error::{BotError, Result};

const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";
const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Arguments for the `get_time` tool
#[derive(Debug, Default, Deserialize)]
struct GetTimeArgs {
    timezone: Option<String>,
    format: Option<String>,
}

/// Resolve a timezone name, falling back to UTC for unknown names.
fn resolve_timezone(name: &str) -> Tz {
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("Invalid timezone name '{name}', using UTC");
        Tz::UTC
    })
}

/// Format `instant` in `timezone` using a strftime `format`.
pub fn format_time(instant: DateTime<Utc>, timezone: &str, format: &str) -> Result<String> {
    let items = StrftimeItems::new(format)
        .parse()
        .map_err(|_| BotError::ToolExecution(format!("Invalid time format '{format}'")))?;
    let tz = resolve_timezone(timezone);
    let local = tz.from_utc_datetime(&instant.naive_utc());
    Ok(local.format_with_items(items.iter()).to_string())
}

/// Return the current time for the requested timezone and format.
pub fn get_time(arguments: &str) -> Result<String> {
    let args: GetTimeArgs = if arguments.trim().is_empty() {
        GetTimeArgs::default()
    } else {
        serde_json::from_str(arguments)?
    };
    let timezone = args.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
    let format = args.format.as_deref().unwrap_or(DEFAULT_FORMAT);
    debug!("Getting time for timezone '{timezone}' with format '{format}'");

    format_time(Utc::now(), timezone, format)
}
