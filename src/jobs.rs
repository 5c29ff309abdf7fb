use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::app::App;
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    UpdateFeeds,
    RotateFeeds,
    Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Every(Duration),
    /// On every :00 and :30 UTC.
    HalfHourly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSpec {
    pub job: Job,
    pub schedule: Schedule,
    pub at_startup: bool,
}

/// The job table for a given configuration.
pub fn job_specs(config: &Config) -> Vec<JobSpec> {
    let mut specs = vec![
        JobSpec {
            job: Job::RotateFeeds,
            schedule: Schedule::Every(config.rotate_interval()),
            at_startup: true,
        },
        JobSpec {
            job: Job::UpdateFeeds,
            schedule: Schedule::Every(config.update_interval()),
            at_startup: false,
        },
    ];
    if config.clock_feed {
        specs.push(JobSpec {
            job: Job::Clock,
            schedule: Schedule::HalfHourly,
            at_startup: true,
        });
    }
    specs
}

/// Spawns one task per job. Tasks run until the runtime shuts down.
pub fn start(app: Arc<App>) -> Vec<JoinHandle<()>> {
    job_specs(app.config())
        .into_iter()
        .map(|spec| {
            let app = Arc::clone(&app);
            tokio::spawn(async move { run_job(app, spec).await })
        })
        .collect()
}

async fn run_job(app: Arc<App>, spec: JobSpec) {
    tracing::info!("Starting job {:?} ({:?})", spec.job, spec.schedule);

    if spec.at_startup {
        run_once(&app, spec.job).await;
    }

    match spec.schedule {
        Schedule::Every(period) => {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_once(&app, spec.job).await;
            }
        }
        Schedule::HalfHourly => loop {
            time::sleep(until_next_half_hour(Utc::now())).await;
            run_once(&app, spec.job).await;
        },
    }
}

async fn run_once(app: &Arc<App>, job: Job) {
    match job {
        Job::UpdateFeeds => {
            let results = app.sync_all().await;
            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            tracing::info!("Updated {} feeds ({} failed)", results.len(), failed);
        }
        Job::RotateFeeds => match blocking(app, App::rotate_all).await {
            Ok(rotated) if !rotated.is_empty() => {
                tracing::info!("Rotated {} feeds", rotated.len())
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Error reading feeds directory: {}", e),
        },
        Job::Clock => {
            if let Err(e) = blocking(app, App::tick_clock).await {
                tracing::error!("Error writing clock feed: {}", e);
            }
        }
    }
}

async fn blocking<T: Send + 'static>(
    app: &Arc<App>,
    f: fn(&App) -> Result<T>,
) -> Result<T> {
    let app = Arc::clone(app);
    tokio::task::spawn_blocking(move || f(&app)).await?
}

fn until_next_half_hour(now: DateTime<Utc>) -> Duration {
    let into_half = u64::from(now.minute() % 30) * 60 + u64::from(now.second());
    let wait = Duration::from_secs(30 * 60 - into_half);
    wait.saturating_sub(Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn half_hour_alignment() {
        let at = |h, m, s| Utc.with_ymd_and_hms(2023, 1, 1, h, m, s).unwrap();
        assert_eq!(until_next_half_hour(at(1, 0, 0)), Duration::from_secs(30 * 60));
        assert_eq!(until_next_half_hour(at(1, 29, 59)), Duration::from_secs(1));
        assert_eq!(until_next_half_hour(at(1, 45, 0)), Duration::from_secs(15 * 60));
    }

    #[test]
    fn clock_job_follows_config() {
        let mut config = Config::default();
        let jobs: Vec<_> = job_specs(&config).iter().map(|s| s.job).collect();
        assert_eq!(jobs, vec![Job::RotateFeeds, Job::UpdateFeeds, Job::Clock]);

        config.clock_feed = false;
        assert!(job_specs(&config).iter().all(|s| s.job != Job::Clock));
    }

    #[test]
    fn only_rotation_and_clock_run_at_startup() {
        let specs = job_specs(&Config::default());
        let update = specs.iter().find(|s| s.job == Job::UpdateFeeds).unwrap();
        assert!(!update.at_startup);
        assert_eq!(update.schedule, Schedule::Every(Duration::from_secs(300)));
    }
}
