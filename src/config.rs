//! Assistant configuration.
//!
//! Typed configuration for the attendance assistant: timezone, poll weekday,
//! default close delay, and the chat/admin roster consulted by handlers before
//! privileged operations.

use crate::gateway::Authorizer;
use crate::{ChatId, UserId};
use chrono::{NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Attendance assistant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceConfig {
    /// Timezone all dates are evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    /// Weekday the attendance poll runs on.
    #[serde(default = "default_poll_day")]
    pub poll_day: Weekday,
    /// Default delay before a poll auto-closes, in seconds.
    #[serde(default = "default_close_delay_secs")]
    pub default_close_delay_secs: u64,
    /// The chat the weekly poll is posted to.
    #[serde(default)]
    pub main_chat_id: ChatId,
    /// The assistant owner; always treated as an admin.
    #[serde(default)]
    pub owner_id: UserId,
    /// Per-chat admin roster.
    #[serde(default)]
    pub admins: HashMap<ChatId, HashSet<UserId>>,
}

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_poll_day() -> Weekday {
    Weekday::Mon
}

fn default_close_delay_secs() -> u64 {
    3600
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            poll_day: default_poll_day(),
            default_close_delay_secs: default_close_delay_secs(),
            main_chat_id: 0,
            owner_id: 0,
            admins: HashMap::new(),
        }
    }
}

impl AttendanceConfig {
    /// Today's date in the configured timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Whether `date` falls on the configured poll weekday.
    pub fn is_poll_day(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        date.weekday() == self.poll_day
    }

    /// Default auto-close delay as a [`Duration`].
    pub fn default_close_delay(&self) -> Duration {
        Duration::from_secs(self.default_close_delay_secs)
    }

    /// Build an [`Authorizer`] view over the configured roster.
    pub fn roster(&self) -> StaticRoster {
        let mut admins = self.admins.clone();
        // The owner's private chat always counts as admin territory.
        admins.entry(self.owner_id).or_default().insert(self.owner_id);
        StaticRoster {
            owner_id: self.owner_id,
            admins,
        }
    }
}

/// Parse a poll close time given as wall-clock hours (`HH:MM` or `HH:MM:SS`)
/// into the delay it represents. Admins pass this as a command argument when
/// creating a poll by hand; invalid input yields `None` and the caller falls
/// back to the configured default.
pub fn parse_close_time(input: &str) -> Option<Duration> {
    let time = NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()?;
    use chrono::Timelike;
    let secs = u64::from(time.hour()) * 3600 + u64::from(time.minute()) * 60 + u64::from(time.second());
    Some(Duration::from_secs(secs))
}

/// Config-backed admin roster.
///
/// The advisory lock never checks its caller; handlers consult this roster
/// before releasing a lock they do not own or force-closing a poll.
#[derive(Debug, Clone)]
pub struct StaticRoster {
    owner_id: UserId,
    admins: HashMap<ChatId, HashSet<UserId>>,
}

impl Authorizer for StaticRoster {
    fn is_owner_or_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        if user_id == self.owner_id {
            return true;
        }
        self.admins
            .get(&chat_id)
            .map(|set| set.contains(&user_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_close_time() {
        assert_eq!(parse_close_time("01:00:00"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_close_time("00:30"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_close_time("00:00:05"), Some(Duration::from_secs(5)));
        assert_eq!(parse_close_time("not-a-time"), None);
        assert_eq!(parse_close_time("25:00"), None);
    }

    #[test]
    fn test_poll_day() {
        let config = AttendanceConfig::default();
        // 2026-08-03 is a Monday.
        assert!(config.is_poll_day(NaiveDate::from_ymd_opt(2026, 8, 3).unwrap()));
        assert!(!config.is_poll_day(NaiveDate::from_ymd_opt(2026, 8, 4).unwrap()));
    }

    #[test]
    fn test_roster_owner_and_admins() {
        let mut config = AttendanceConfig {
            owner_id: 10,
            ..Default::default()
        };
        config.admins.insert(77, HashSet::from([20, 21]));
        let roster = config.roster();

        assert!(roster.is_owner_or_admin(77, 10)); // owner everywhere
        assert!(roster.is_owner_or_admin(77, 20));
        assert!(!roster.is_owner_or_admin(77, 30));
        assert!(!roster.is_owner_or_admin(78, 20)); // roster is per chat
        assert!(roster.is_owner_or_admin(10, 10)); // owner's private chat
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: AttendanceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_day, Weekday::Mon);
        assert_eq!(config.default_close_delay(), Duration::from_secs(3600));
        assert_eq!(config.timezone, Tz::UTC);
    }
}
