use chrono::{DateTime, Timelike, Utc};

use crate::error::Result;
use crate::models::LogLine;
use crate::store::LogStore;

pub const CLOCK_FEED: &str = "tiktok";

const ON_THE_HOUR: [char; 12] = [
    '🕛', '🕐', '🕑', '🕒', '🕓', '🕔', '🕕', '🕖', '🕗', '🕘', '🕙', '🕚',
];
const HALF_PAST: [char; 12] = [
    '🕧', '🕜', '🕝', '🕞', '🕟', '🕠', '🕡', '🕢', '🕣', '🕤', '🕥', '🕦',
];
const HOURS: [&str; 12] = [
    "twelve", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven",
];

/// Synthetic feed that announces the current UTC time every half hour.
///
/// Unlike imported feeds the log is rewritten on every tick: one epoch-dated
/// description line followed by the current time.
pub struct ClockFeed {
    store: LogStore,
    feed_url: String,
}

impl ClockFeed {
    pub fn new(store: LogStore, base_url: &str) -> Self {
        Self {
            store,
            feed_url: feed_url(base_url, CLOCK_FEED),
        }
    }

    pub fn tick(&self) -> Result<()> {
        self.tick_at(Utc::now())
    }

    fn tick_at(&self, now: DateTime<Utc>) -> Result<()> {
        let about = format!(
            "I am @<{} {}> an automated feed that twts every 30m with the current time (UTC)",
            CLOCK_FEED, self.feed_url
        );
        self.store.replace(
            CLOCK_FEED,
            &[
                LogLine::new(DateTime::<Utc>::UNIX_EPOCH, &about),
                LogLine::new(now, &announce(now)),
            ],
        )?;
        tracing::debug!("Updated @{} feed", CLOCK_FEED);
        Ok(())
    }
}

/// Public twtxt URL of a feed served by this instance.
pub fn feed_url(base_url: &str, name: &str) -> String {
    format!("{}/{}/twtxt.txt", base_url.trim_end_matches('/'), name)
}

/// e.g. `🕝 The time is now two thirty in the morning 😴`. Minutes are
/// rounded down to the half hour.
pub fn announce(now: DateTime<Utc>) -> String {
    let hour = now.hour();
    let hour12 = (hour % 12) as usize;
    let half = now.minute() >= 30;

    let (symbol, mut clock) = if half {
        (HALF_PAST[hour12], format!("{} thirty", HOURS[hour12]))
    } else {
        (ON_THE_HOUR[hour12], format!("{} o'clock", HOURS[hour12]))
    };

    clock.push_str(match hour {
        0..=5 => " in the morning 😴",
        6..=11 => " 🌞",
        12..=17 => " in the afternoon 🌅",
        _ => " in the evening 🌛",
    });

    format!("{} The time is now {}", symbol, clock)
}
