//! Headless stage player.
//!
//! Usage: `stage_player [stage.json] [seconds]`
//!
//! Loads a stage file, presses Play, and runs the tick loop on wall-clock
//! time for the requested duration. Scripted clicks from the file are
//! delivered once their tick has run. The stage file is watched via mtime
//! polling; a change reloads it and starts a fresh session, a broken edit
//! keeps the previous stage running.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use stage_runtime::{load_stage_from_path, Stage, StageFile, StageWatcher};

const STAGE_PATH: &str = "assets/stages/demo.json";
const DEFAULT_RUN_SECONDS: f32 = 5.0;
const MIN_SLEEP: Duration = Duration::from_millis(1);

struct Player {
    watcher: StageWatcher,
    file: StageFile,
    stage: Stage,
    clicks_delivered_through: u64,
}

impl Player {
    fn load(path: PathBuf) -> Result<Self, String> {
        let file = load_stage_from_path(&path)?;
        let stage = file.build()?;
        log::info!(
            "Loaded stage {} ({}) with {} sprite(s)",
            file.stage_id,
            file.version,
            stage.registry().len()
        );
        Ok(Self {
            watcher: StageWatcher::new(path),
            file,
            stage,
            clicks_delivered_through: 0,
        })
    }

    fn play(&mut self, now: Instant) {
        self.stage.play(now);
        self.clicks_delivered_through = 0;
        self.deliver_clicks(0, now);
    }

    fn reload(&mut self, reason: &str, now: Instant) {
        let candidate = load_stage_from_path(self.watcher.path())
            .and_then(|file| file.build().map(|stage| (file, stage)));
        match candidate {
            Ok((file, stage)) => {
                self.file = file;
                self.stage = stage;
                self.play(now);
                log::info!(
                    "Stage reloaded ({reason}): {} ({})",
                    self.file.stage_id,
                    self.file.version
                );
            }
            Err(err) => {
                log::error!("Stage reload failed ({reason}): {err}");
            }
        }
    }

    fn frame(&mut self, now: Instant) {
        if self.watcher.poll_changed() {
            self.reload("file changed", now);
        }
        let ticks = self.stage.advance(now);
        if ticks > 0 {
            let current = self.stage.tick_count();
            for tick in self.clicks_delivered_through + 1..=current {
                self.deliver_clicks(tick, now);
            }
            self.clicks_delivered_through = current;
            for snap in self.stage.snapshots() {
                log::debug!(
                    "[tick {current}] {} at ({:.1}, {:.1}) heading {:.1} index {}",
                    snap.id,
                    snap.position.x,
                    snap.position.y,
                    snap.heading,
                    snap.instruction_index
                );
            }
        }
    }

    fn deliver_clicks(&mut self, tick: u64, now: Instant) {
        let targets: Vec<_> = self.file.clicks_at(tick).collect();
        for id in targets {
            if self.stage.on_sprite_clicked(&id, now) {
                log::info!("Scripted click on '{id}' after tick {tick}");
            } else {
                log::info!("Scripted click on '{id}' after tick {tick}: no click script");
            }
        }
    }

    fn report(&self) {
        log::info!(
            "Ran {} tick(s), {} collision swap(s)",
            self.stage.tick_count(),
            self.stage.collisions_fired()
        );
        for record in self.stage.registry().iter() {
            let snap = record.interpreter().snapshot(record.id());
            let bubble = snap
                .bubble
                .as_ref()
                .map(|b| format!(" {} \"{}\"", b.kind.label(), b.text))
                .unwrap_or_default();
            log::info!(
                "  {} [{}] ({:.1}, {:.1}) heading {:.1} {:?} index {}{}",
                record.name(),
                record.costume(),
                snap.position.x,
                snap.position.y,
                snap.heading,
                snap.phase,
                snap.instruction_index,
                bubble
            );
        }
    }
}

fn parse_args() -> Result<(PathBuf, Duration), String> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(STAGE_PATH));
    let seconds = match args.next() {
        Some(raw) => raw
            .parse::<f32>()
            .map_err(|e| format!("Invalid run length '{raw}': {e}"))?,
        None => DEFAULT_RUN_SECONDS,
    };
    let run_for = Duration::try_from_secs_f32(seconds)
        .map_err(|e| format!("Invalid run length '{seconds}': {e}"))?;
    Ok((path, run_for))
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (path, run_for) = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            log::error!("{err}");
            eprintln!("usage: stage_player [stage.json] [seconds]");
            std::process::exit(2);
        }
    };

    let mut player = match Player::load(path.clone()) {
        Ok(player) => player,
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    };

    log::info!(
        "Playing {} for {:.1}s",
        path.display(),
        run_for.as_secs_f32()
    );
    let started = Instant::now();
    player.play(started);

    loop {
        let now = Instant::now();
        if now.duration_since(started) >= run_for {
            break;
        }
        player.frame(now);
        let sleep_for = player.stage.clock().until_next_tick().max(MIN_SLEEP);
        std::thread::sleep(sleep_for);
    }

    player.stage.stop();
    player.report();
}
