//! Cron scheduling: a background thread ticking once a second against a set
//! of [`cron::Schedule`] jobs, each tagged by `(group, action)`.
//!
//! No async runtime is involved; the rest of this crate is blocking
//! top-to-bottom, so a plain thread plus a tick loop matches its grain better
//! than pulling in an executor for one component.

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

/// One registered cron firing. A single action with multiple `crons` entries
/// gets one `Job` per entry, all sharing the same tag.
struct Job {
    group: String,
    action: String,
    expression: String,
    schedule: Schedule,
    next_fire: DateTime<Tz>,
}

/// Info surfaced to callers inspecting scheduler state (e.g. a status API).
pub struct JobInfo {
    pub group: String,
    pub action: String,
    pub expression: String,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
}

enum Command {
    Add(String, String, Vec<String>),
    RemoveTag(String, String),
    Shutdown,
}

/// A running scheduler. Dropping it stops the background thread.
pub struct Scheduler {
    tz: Tz,
    commands: Sender<Command>,
    jobs: Arc<Mutex<Vec<Job>>>,
    last_runs: Arc<Mutex<std::collections::BTreeMap<(String, String), DateTime<Utc>>>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Scheduler {
    /// Start the background tick loop. `on_fire(group, action)` runs
    /// synchronously on the scheduler's own tick thread and blocks the next
    /// tick until it returns — callers MUST hand off to their own thread (or
    /// pool) inside `on_fire` itself if a fired action might run long,
    /// otherwise one slow job starves every other job's schedule for as long
    /// as it runs.
    pub fn start(timezone: &str, on_fire: impl Fn(&str, &str) + Send + 'static) -> Self {
        let tz: Tz = timezone.parse().unwrap_or(chrono_tz::UTC);
        let (tx, rx): (Sender<Command>, Receiver<Command>) = channel();
        let jobs: Arc<Mutex<Vec<Job>>> = Arc::new(Mutex::new(Vec::new()));
        let last_runs = Arc::new(Mutex::new(std::collections::BTreeMap::new()));

        let thread_jobs = Arc::clone(&jobs);
        let thread_last_runs = Arc::clone(&last_runs);
        let handle = std::thread::spawn(move || {
            loop {
                match rx.try_recv() {
                    Ok(Command::Shutdown) => break,
                    Ok(Command::Add(group, action, crons)) => {
                        let mut jobs = thread_jobs.lock().expect("scheduler jobs mutex poisoned");
                        let now = Utc::now().with_timezone(&tz);
                        for expr in crons {
                            if let Ok(schedule) = Schedule::try_from(expr.as_str()) {
                                if let Some(next_fire) = schedule.after(&now).next() {
                                    jobs.push(Job {
                                        group: group.clone(),
                                        action: action.clone(),
                                        expression: expr,
                                        schedule,
                                        next_fire,
                                    });
                                }
                            }
                        }
                    }
                    Ok(Command::RemoveTag(group, action)) => {
                        let mut jobs = thread_jobs.lock().expect("scheduler jobs mutex poisoned");
                        jobs.retain(|job| !(job.group == group && job.action == action));
                    }
                    Err(std::sync::mpsc::TryRecvError::Empty) => {}
                    Err(std::sync::mpsc::TryRecvError::Disconnected) => break,
                }

                let now = Utc::now().with_timezone(&tz);
                let mut due = Vec::new();
                {
                    let mut jobs = thread_jobs.lock().expect("scheduler jobs mutex poisoned");
                    for job in jobs.iter_mut() {
                        if now >= job.next_fire {
                            due.push((job.group.clone(), job.action.clone()));
                            if let Some(next) = job.schedule.after(&now).next() {
                                job.next_fire = next;
                            }
                        }
                    }
                }
                if !due.is_empty() {
                    let mut last_runs = thread_last_runs.lock().expect("scheduler last_runs mutex poisoned");
                    for (group, action) in &due {
                        last_runs.insert((group.clone(), action.clone()), Utc::now());
                    }
                }
                for (group, action) in due {
                    on_fire(&group, &action);
                }

                std::thread::sleep(Duration::from_secs(1));
            }
        });

        Self {
            tz,
            commands: tx,
            jobs,
            last_runs,
            handle: Some(handle),
        }
    }

    /// Validate and register every entry of `action.crons` under `(group, action)`.
    pub fn add(&self, group: &str, action: &str, crons: &[String]) -> Result<()> {
        for expr in crons {
            Schedule::try_from(expr.as_str())
                .with_context(|| format!("invalid cron expression '{expr}' for {group}/{action}"))?;
        }
        self.commands
            .send(Command::Add(group.to_string(), action.to_string(), crons.to_vec()))
            .context("scheduler thread is gone")
    }

    pub fn remove_by_tag(&self, group: &str, action: &str) -> Result<()> {
        self.commands
            .send(Command::RemoveTag(group.to_string(), action.to_string()))
            .context("scheduler thread is gone")
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().expect("scheduler jobs mutex poisoned");
        let last_runs = self.last_runs.lock().expect("scheduler last_runs mutex poisoned");
        jobs.iter()
            .map(|job| JobInfo {
                group: job.group.clone(),
                action: job.action.clone(),
                expression: job.expression.clone(),
                next_run: job.next_fire.with_timezone(&Utc),
                last_run: last_runs.get(&(job.group.clone(), job.action.clone())).copied(),
            })
            .collect()
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn add_rejects_invalid_cron_expression() {
        let scheduler = Scheduler::start("UTC", |_, _| {});
        let err = scheduler.add("g1", "a", &["not a cron expr".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn add_registers_a_valid_job() {
        let scheduler = Scheduler::start("UTC", |_, _| {});
        scheduler.add("g1", "a", &["* * * * * *".to_string()]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let jobs = scheduler.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].group, "g1");
        assert_eq!(jobs[0].action, "a");
    }

    #[test]
    fn remove_by_tag_drops_the_job() {
        let scheduler = Scheduler::start("UTC", |_, _| {});
        scheduler.add("g1", "a", &["* * * * * *".to_string()]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        scheduler.remove_by_tag("g1", "a").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(scheduler.jobs().is_empty());
    }

    #[test]
    fn fires_callback_on_the_second() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let scheduler = Scheduler::start("UTC", move |_, _| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.add("g1", "a", &["* * * * * *".to_string()]).unwrap();
        std::thread::sleep(Duration::from_millis(2200));
        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let scheduler = Scheduler::start("not-a-real-zone", |_, _| {});
        assert_eq!(scheduler.timezone(), chrono_tz::UTC);
    }
}
