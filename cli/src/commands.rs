use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};

use ticktock_core::{DemoConfig, DemoConfigExt, Scheduler, Timer};

/// One demo timer plus the number of times its callback ran
struct DemoTimer {
    name: &'static str,
    timer: Timer,
    fired: Arc<AtomicUsize>,
}

impl DemoTimer {
    fn new(
        scheduler: &Arc<Scheduler>,
        name: &'static str,
        interval_ms: u64,
        single_shot: bool,
    ) -> Self {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let mut timer = Timer::new(scheduler);
        timer.set_single_shot(single_shot);
        timer.set_interval(Duration::from_millis(interval_ms));
        timer.set_timeout_callback(move || {
            let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
            info!(
                timer = name,
                count,
                at = %Local::now().format("%H:%M:%S%.3f"),
                "Timer fired"
            );
        });

        Self { name, timer, fired }
    }
}

/// Run the three-timer scenario until `run_secs` elapse or Ctrl-C.
pub async fn run_demo(config: DemoConfig) -> Result<(), String> {
    let scheduler = Scheduler::start(config.scheduler.clone()).map_err(|e| e.to_string())?;

    let mut timers = vec![
        DemoTimer::new(&scheduler, "single-4s", 4_000, true),
        DemoTimer::new(&scheduler, "repeating", 2_000, false),
        DemoTimer::new(&scheduler, "single-5s", 5_000, true),
    ];
    for demo in &mut timers {
        demo.timer.start();
    }
    // Reconfigure before the first fire: rearms at the new interval
    timers[1].timer.set_interval(Duration::from_millis(3_000));

    info!(
        run_secs = config.run_secs,
        started_at = %Local::now().format("%H:%M:%S%.3f"),
        "Demo running"
    );
    for demo in &timers {
        info!(timer = demo.name, remaining_ms = demo.timer.remaining_time(), "Armed");
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(config.run_secs)) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Interrupted");
        }
    }

    println!("{:<12} {:>6} {:>8} {:>14}", "Timer", "Fired", "Active", "Remaining(ms)");
    println!("{}", "-".repeat(44));
    for demo in &timers {
        println!(
            "{:<12} {:>6} {:>8} {:>14}",
            demo.name,
            demo.fired.load(Ordering::SeqCst),
            demo.timer.is_active(),
            demo.timer.remaining_time()
        );
    }

    for demo in &timers {
        demo.timer.stop(true).map_err(|e| e.to_string())?;
    }
    drop(timers);
    scheduler.shutdown();
    Ok(())
}

/// Print the effective configuration and where it is stored.
pub fn show_config(config: &DemoConfig) {
    match DemoConfig::config_path() {
        Ok(path) => println!("config file: {}", path.display()),
        Err(e) => println!("config file: unavailable ({e})"),
    }
    println!("run_secs: {}", config.run_secs);
    println!("scheduler.thread_name: {}", config.scheduler.thread_name);
    match config.scheduler.stack_size {
        Some(size) => println!("scheduler.stack_size: {size}"),
        None => println!("scheduler.stack_size: platform default"),
    }
    println!(
        "scheduler.slow_callback_warn_ms: {}",
        config.scheduler.slow_callback_warn_ms
    );
}

/// Persist the effective configuration.
pub fn save_config(config: &DemoConfig) -> Result<(), String> {
    config.save().map_err(|e| e.to_string())?;
    info!("Configuration saved");
    Ok(())
}
