use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use warden::dispatcher::Dispatcher;
use warden::lock::LockManager;
use warden::scheduler::Scheduler;
use warden::store::Store;
use warden::{catalog, config, triggers};

#[derive(Parser, Debug)]
#[command(name = "warden", version)]
#[command(about = "Action execution and scheduling engine host process")]
struct Cli {
    /// Config file path.
    #[arg(short = 'c', long = "config", default_value = "./pal.yml")]
    config: PathBuf,

    /// Actions YAML directory.
    #[arg(short = 'd', long = "actions-dir", default_value = "./actions")]
    actions_dir: PathBuf,

    /// Validate the config and action catalog, then exit.
    #[arg(short = 'v', long = "validate")]
    validate: bool,

    /// Probe server health (exits 0 if the store and catalog are healthy).
    #[arg(short = 's', long = "status")]
    status: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("[error] {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let fresh = catalog::load(&cli.actions_dir)
        .with_context(|| format!("failed to load actions directory {}", cli.actions_dir.display()))?;

    if cli.validate {
        println!("config: ok ({})", cli.config.display());
        println!("actions: ok ({} group(s))", fresh.len());
        return Ok(());
    }

    let store = Store::open(&cfg.db.path, &cfg.db.encrypt_key)
        .with_context(|| format!("failed to open store at {}", cfg.db.path.display()))?;

    if cli.status {
        store.flush().context("store health probe failed")?;
        println!("ok");
        return Ok(());
    }

    let persisted = store.get_groups().context("failed to load persisted catalog")?;
    let mut merged = catalog::reload(&persisted, fresh);
    triggers::rebuild(&mut merged);
    store.put_groups(&merged).context("failed to persist merged catalog")?;

    let locks = Arc::new(LockManager::new());
    let dispatcher = Dispatcher::new(store.clone(), Arc::clone(&locks), cfg.clone());

    let dispatcher_for_cron = dispatcher.clone();
    let scheduler = Scheduler::start(&cfg.global.timezone, move |group, action| {
        // The scheduler calls this synchronously on its own tick thread, so a
        // foreground cron action must not run here directly: that would block
        // every other job's schedule for the run's whole duration, not just
        // background-flagged ones. Always hand off.
        let dispatcher = dispatcher_for_cron.clone();
        let group = group.to_string();
        let action = action.to_string();
        std::thread::spawn(move || {
            if let Err(err) = dispatcher.dispatch_cron(&group, &action) {
                eprintln!("[warn] cron dispatch {group}/{action} failed: {err}");
            }
        });
    });

    for (group, actions) in &merged {
        for action in actions {
            if action.disabled || action.crons.is_empty() {
                continue;
            }
            if let Err(err) = scheduler.add(group, &action.action, &action.crons) {
                eprintln!("[warn] failed to schedule {group}/{}: {err:#}", action.action);
            }
        }
    }

    println!(
        "warden ready: {} group(s), {} scheduled job(s), listening via the host HTTP layer",
        merged.len(),
        scheduler.jobs().len()
    );

    loop {
        std::thread::park();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_default_flags() {
        let cli = Cli::parse_from(["warden"]);
        assert_eq!(cli.config, PathBuf::from("./pal.yml"));
        assert_eq!(cli.actions_dir, PathBuf::from("./actions"));
        assert!(!cli.validate);
        assert!(!cli.status);
    }

    #[test]
    fn cli_parses_short_flags() {
        let cli = Cli::parse_from(["warden", "-c", "custom.yml", "-d", "custom-actions", "-v"]);
        assert_eq!(cli.config, PathBuf::from("custom.yml"));
        assert_eq!(cli.actions_dir, PathBuf::from("custom-actions"));
        assert!(cli.validate);
    }
}
