//! Thread management for running games.
//!
//! A [`GameLoop`] is idle until [`GameLoop::start`] spawns two threads: the
//! simulation thread, which ticks the store at a fixed pace and broadcasts
//! a ping after every tick, and the loser worker, which records removed
//! players in the leaderboard. The game ends when every player or session is
//! gone, when the time limit is hit, or on [`GameLoop::force_quit`]. At that
//! point sessions are told why, closed, and the idle timer is armed.

use crossbeam_channel::select;
use log::{error, info, warn};
use parking_lot::Mutex;
use shared::SocketMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::LoopSettings;
use crate::error::GameError;
use crate::leaderboard::{entry_for, Leaderboard};
use crate::platform::Platform;
use crate::player::Player;
use crate::store::GameStore;
use crate::tick::{advance_to_next_tick, create_game_ping, should_spawn_platform};

pub const REASON_TIME_LIMIT: &str = "Time limit reached";
pub const REASON_NO_PLAYERS: &str = "All players have left";
pub const REASON_STOPPED: &str = "Game stopped";

/// Action run once the server has been idle for a while.
pub type IdleAction = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug)]
struct Worker {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(name: &str, body: impl FnOnce(CancelToken) + Send + 'static) -> std::io::Result<Self> {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;
        Ok(Self { cancel, handle })
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancels and waits for the thread.
    fn stop(self, name: &'static str) -> Result<(), GameError> {
        self.cancel.cancel();
        self.handle
            .join()
            .map_err(|_| GameError::ThreadPanicked(name))
    }
}

struct LoopState {
    settings: LoopSettings,
    simulation: Option<Worker>,
    losers: Option<Worker>,
    idle_timer: Option<Worker>,
    idle_action: Option<(IdleAction, Duration)>,
}

struct LoopShared {
    store: Arc<GameStore>,
    leaderboard: Arc<dyn Leaderboard>,
    running: AtomicBool,
    state: Mutex<LoopState>,
}

/// Runs games on the given store, one at a time.
pub struct GameLoop {
    shared: Arc<LoopShared>,
}

impl GameLoop {
    pub fn new(store: Arc<GameStore>, leaderboard: Arc<dyn Leaderboard>) -> Self {
        Self::with_settings(store, leaderboard, LoopSettings::default())
    }

    pub fn with_settings(
        store: Arc<GameStore>,
        leaderboard: Arc<dyn Leaderboard>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                store,
                leaderboard,
                running: AtomicBool::new(false),
                state: Mutex::new(LoopState {
                    settings,
                    simulation: None,
                    losers: None,
                    idle_timer: None,
                    idle_action: None,
                }),
            }),
        }
    }

    pub fn store(&self) -> &Arc<GameStore> {
        &self.shared.store
    }

    /// True while a game is being simulated. Says nothing about the idle
    /// timer.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn settings(&self) -> LoopSettings {
        self.shared.state.lock().settings
    }

    pub fn set_tick_delay(&self, tick_delay: Duration) -> Result<(), GameError> {
        let mut state = self.shared.state.lock();
        if self.is_running() {
            return Err(GameError::IllegalState(
                "Cannot change tick delay while loop is running",
            ));
        }
        state.settings.tick_delay = tick_delay;
        Ok(())
    }

    pub fn set_max_time(&self, max_time_seconds: u32) -> Result<(), GameError> {
        let mut state = self.shared.state.lock();
        if self.is_running() {
            return Err(GameError::IllegalState(
                "Cannot change max loop time while loop is running",
            ));
        }
        state.settings.max_time_seconds = max_time_seconds;
        Ok(())
    }

    /// Runs `action` once the loop has been idle for `delay`, like a
    /// `setTimeout`. The timer starts now and again every time a game ends,
    /// and starting a game cancels it.
    pub fn on_idle_timeout(
        &self,
        action: impl Fn() + Send + Sync + 'static,
        delay: Duration,
    ) -> Result<(), GameError> {
        let mut state = self.shared.state.lock();
        let pending = state.idle_timer.as_ref().map_or(false, Worker::is_alive);
        if self.is_running() || pending {
            return Err(GameError::IllegalState(
                "Cannot set idle action while loop is running",
            ));
        }
        let action: IdleAction = Arc::new(action);
        state.idle_timer = spawn_idle_timer(Arc::clone(&action), delay);
        state.idle_action = Some((action, delay));
        Ok(())
    }

    /// Starts a game unless one is already running.
    pub fn start(&self) -> bool {
        LoopShared::start(&self.shared)
    }

    /// Subscribes [`GameLoop::start`] to the store's start event, so the first
    /// player to join an empty game starts it.
    ///
    /// The start runs on the joining thread and may join the previous game's
    /// threads, so async callers should add players from a blocking task.
    pub fn start_on_first_join(&self) {
        let weak: Weak<LoopShared> = Arc::downgrade(&self.shared);
        self.shared.store.on_start_event(move || {
            if let Some(shared) = weak.upgrade() {
                LoopShared::start(&shared);
            }
        });
    }

    /// Stops the running game and waits until its thread has exited.
    pub fn force_quit(&self) -> Result<(), GameError> {
        let simulation = self.shared.state.lock().simulation.take();
        match simulation {
            Some(worker) => worker.stop("game loop"),
            None => Ok(()),
        }
    }
}

impl LoopShared {
    fn start(shared: &Arc<LoopShared>) -> bool {
        let mut state = shared.state.lock();
        if shared.running.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(timer) = state.idle_timer.take() {
            if let Err(e) = timer.stop("idle timer") {
                error!("{}", e);
            }
        }
        // not running, so the old thread no longer needs the state lock
        if let Some(old) = state.simulation.take() {
            if let Err(e) = old.stop("game loop") {
                error!("{}", e);
            }
        }

        let store = &shared.store;
        store.reset_counters();

        match spawn_loser_worker(shared) {
            Ok(worker) => state.losers = Some(worker),
            Err(e) => {
                error!("Failed to spawn loser worker: {}", e);
                return false;
            }
        }

        let settings = state.settings;
        let loop_shared = Arc::clone(shared);
        shared.running.store(true, Ordering::SeqCst);
        match Worker::spawn("game-loop", move |cancel| {
            run_game(loop_shared, cancel, settings)
        }) {
            Ok(worker) => {
                info!("{} - Starting game loop", store.instance_id());
                state.simulation = Some(worker);
                true
            }
            Err(e) => {
                error!("Failed to spawn game loop: {}", e);
                shared.running.store(false, Ordering::SeqCst);
                stop_losers(&mut state);
                false
            }
        }
    }
}

/// Body of the simulation thread.
fn run_game(shared: Arc<LoopShared>, cancel: CancelToken, settings: LoopSettings) {
    let store = &shared.store;
    let ticks_per_second = store.rules().ticks_per_second;

    let reason = loop {
        if cancel.is_cancelled() {
            break REASON_STOPPED;
        }
        if store.player_count() == 0 || store.session_count() == 0 {
            break REASON_NO_PLAYERS;
        }
        if store.game_age_seconds() >= settings.max_time_seconds {
            break REASON_TIME_LIMIT;
        }

        let response = advance_to_next_tick(store);
        let mut platforms = response.next_platforms;
        let new_platform = store.with_random(|rng| {
            if should_spawn_platform(&platforms, &mut *rng, ticks_per_second) {
                Some(Platform::generate_at_height(0, rng))
            } else {
                None
            }
        });
        match new_platform {
            Some(Ok(platform)) => platforms.push(platform),
            Some(Err(e)) => error!("{}", e),
            None => {}
        }
        store.set_platforms(platforms);

        for id in response.players_to_remove {
            if let Some(player) = store.remove_player(&id) {
                info!(
                    "{} - {} fell off with score {}",
                    store.instance_id(),
                    player.name(),
                    player.score()
                );
                store.push_loser(player);
            }
        }

        if response.update_needed {
            broadcast(store, &create_game_ping(store));
        }

        if cancel.sleep(settings.tick_delay) {
            break REASON_STOPPED;
        }
    };

    info!("{} - Closing game loop: {}", store.instance_id(), reason);

    // A join during teardown blocks in start() on this lock, then starts a
    // fresh game with whatever survived it.
    let mut state = shared.state.lock();
    stop_losers(&mut state);
    broadcast(
        store,
        &SocketMessage::GameOver {
            reason: reason.to_string(),
        },
    );
    store.clear_players();
    store.close_sessions();
    if let Some((action, delay)) = state.idle_action.clone() {
        state.idle_timer = spawn_idle_timer(action, delay);
    }
    shared.running.store(false, Ordering::SeqCst);
}

fn spawn_loser_worker(shared: &LoopShared) -> std::io::Result<Worker> {
    let store = Arc::clone(&shared.store);
    let leaderboard = Arc::clone(&shared.leaderboard);
    Worker::spawn("loser-worker", move |cancel| {
        drain_losers(&store, leaderboard.as_ref(), &cancel)
    })
}

/// Stops the loser worker, if any, once it has flushed its queue.
fn stop_losers(state: &mut LoopState) {
    if let Some(losers) = state.losers.take() {
        if let Err(e) = losers.stop("loser worker") {
            error!("{}", e);
        }
    }
}

/// Records losers until cancelled, then flushes whatever is still queued.
fn drain_losers(store: &GameStore, leaderboard: &dyn Leaderboard, cancel: &CancelToken) {
    loop {
        select! {
            recv(store.losers()) -> loser => match loser {
                Ok(player) => record_loser(leaderboard, &player),
                Err(_) => break,
            },
            recv(cancel.receiver()) -> _ => break,
        }
    }
    while let Ok(player) = store.losers().try_recv() {
        record_loser(leaderboard, &player);
    }
}

fn record_loser(leaderboard: &dyn Leaderboard, player: &Player) {
    if let Err(e) = leaderboard.record(entry_for(player)) {
        warn!("Failed to record score of {}: {}", player.name(), e);
    }
}

fn spawn_idle_timer(action: IdleAction, delay: Duration) -> Option<Worker> {
    let spawned = Worker::spawn("idle-timer", move |cancel| {
        if cancel.sleep(delay) {
            info!("Game loop idle action interrupted");
            return;
        }
        action();
    });
    match spawned {
        Ok(worker) => Some(worker),
        Err(e) => {
            error!("Failed to spawn idle timer: {}", e);
            None
        }
    }
}

/// Encodes `message` once and sends it to every open session. A failed send
/// is logged and does not stop the others.
pub fn broadcast(store: &GameStore, message: &SocketMessage) {
    let bytes = match shared::serialize(message) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to encode {}: {}", message.kind(), e);
            return;
        }
    };
    for session in store.sessions() {
        if let Err(e) = session.send_if_open(&bytes) {
            warn!(
                "{} - Failed to send {} to {}: {}",
                store.instance_id(),
                message.kind(),
                session.id(),
                e
            );
        }
    }
}
