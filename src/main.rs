pub mod ui;

use chrono::Local;
use clap::{error::ErrorKind, CommandFactory, Parser};
use crimp::{
    app_dirs::AppDirs,
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    controller::{ControllerState, PhaseSessionController, ResumeOutcome, SessionError},
    durable::{DurableStore, MemoryStore, SqliteStore},
    export::{mailto_url, render_csv, summary_subject, write_export_file},
    fields::{FieldEditor, FieldTarget},
    gateway::RestGateway,
    logging,
    phase::{EdgeSize, Grade, Phase, StatKey, StatType},
    runtime::{CrosstermEventSource, FixedTicker, Runner, WorkoutEvent},
    save::{save_session, SaveReceipt, SaveRequest},
    session::SessionData,
    tally::{TallyBoard, TallyCounter},
};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use log::{debug, error, info};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    fmt::Display,
    io::{self, stdin},
    path::PathBuf,
    sync::{mpsc::Sender, Arc, Mutex},
    thread,
};
use webbrowser::Browser;

/// climbing workout tracker: timed phases, tallies, summary export
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Walks a climbing workout through stretching, hangboard, climbing, power endurance and rehab phases, timing each one, then lets you review, export and save the session."
)]
pub struct Cli {
    /// athlete to save sessions as (defaults to the config's default_athlete)
    #[clap(short = 'a', long)]
    athlete: Option<String>,

    /// config file to read instead of the per-user one
    #[clap(long)]
    config: Option<PathBuf>,

    /// database holding the in-progress session
    #[clap(long)]
    state_db: Option<PathBuf>,

    /// backend url, overriding the config file
    #[clap(long)]
    backend_url: Option<String>,

    /// discard any in-progress session before starting
    #[clap(long)]
    reset: bool,

    /// keep session state in memory only
    #[clap(long, conflicts_with = "state_db")]
    ephemeral: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Info(String),
    Error(String),
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Continue,
    Quit,
    Save(SaveRequest),
    OpenUrl(String),
}

pub type Controller = PhaseSessionController<Box<dyn DurableStore>, Box<dyn Clock>>;

pub struct App {
    pub controller: Controller,
    pub config: Config,
    pub athlete: Option<String>,
    pub export_dir: PathBuf,
    pub tallies: TallyBoard,
    pub rehab: TallyCounter,
    pub selected: usize,
    pub editor: Option<FieldEditor>,
    pub status: Option<Status>,
    pub saves_in_flight: usize,
    gateway: Option<Arc<Mutex<RestGateway>>>,
}

impl App {
    pub fn new(
        controller: Controller,
        config: Config,
        athlete: Option<String>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            controller,
            config,
            athlete,
            export_dir,
            tallies: TallyBoard::default(),
            rehab: TallyCounter::default(),
            selected: 0,
            editor: None,
            status: None,
            saves_in_flight: 0,
            gateway: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    /// Values the screens show: the summary snapshot when finished, the live session otherwise.
    pub fn data(&self) -> &SessionData {
        self.controller.export_data()
    }

    pub fn resume(&mut self) {
        match self.controller.resume_from_durable_state() {
            Ok(ResumeOutcome::Resumed { phase_index, .. }) => {
                let label = Phase::from_index(phase_index).map_or("summary", Phase::label);
                self.info(format!("Resumed session at {label}"));
            }
            Ok(ResumeOutcome::ClearedStale) => self.info("Cleared finished session"),
            Ok(ResumeOutcome::Fresh) => {}
            Err(e) => self.fail(e),
        }
        self.after_phase_change();
    }

    /// The editable fields on the current screen, in display order.
    pub fn fields(&self) -> Vec<FieldTarget> {
        match self.state() {
            ControllerState::Active(phase) => FieldTarget::form_for(phase),
            ControllerState::Terminal => FieldTarget::summary_form(),
            ControllerState::Inactive => Vec::new(),
        }
    }

    pub fn selected_field(&self) -> Option<FieldTarget> {
        self.fields().get(self.selected).copied()
    }

    pub fn selected_tally(&self) -> Option<StatKey> {
        match self.state() {
            ControllerState::Active(Phase::Climbing) => StatKey::all().nth(self.selected),
            _ => None,
        }
    }

    fn selection_len(&self) -> usize {
        match self.state() {
            ControllerState::Active(Phase::Climbing) => Grade::ALL.len() * StatType::ALL.len(),
            _ => self.fields().len(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return KeyOutcome::Quit;
        }
        if self.editor.is_some() {
            self.handle_editor_key(key);
            return KeyOutcome::Continue;
        }

        let grid = self.selected_tally().is_some();
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => return KeyOutcome::Quit,
            KeyCode::Up if grid => self.move_selection(-(StatType::ALL.len() as isize)),
            KeyCode::Down if grid => self.move_selection(StatType::ALL.len() as isize),
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Left if grid => self.move_selection(-1),
            KeyCode::Right if grid => self.move_selection(1),
            _ => {}
        }

        match self.state() {
            ControllerState::Inactive => {
                if matches!(key.code, KeyCode::Char('s') | KeyCode::Enter) {
                    self.start();
                }
            }
            ControllerState::Active(phase) => match key.code {
                KeyCode::Char('n') => self.complete_phase(),
                KeyCode::Char('+') | KeyCode::Char('=') => self.adjust(phase, true),
                KeyCode::Char('-') => self.adjust(phase, false),
                KeyCode::Enter => self.begin_edit(),
                _ => {}
            },
            ControllerState::Terminal => match key.code {
                KeyCode::Enter => self.begin_edit(),
                KeyCode::Char('e') => return self.email(),
                KeyCode::Char('x') => self.export_file(),
                KeyCode::Char('s') => return self.save(),
                KeyCode::Char('n') => self.start(),
                _ => {}
            },
        }
        KeyOutcome::Continue
    }

    pub fn on_tick(&mut self) {
        if let Err(e) = self.controller.tick() {
            debug!("tick ignored: {e}");
        }
    }

    pub fn on_save_finished(&mut self, result: Result<SaveReceipt, String>) {
        self.saves_in_flight = self.saves_in_flight.saturating_sub(1);
        match result {
            Ok(receipt) => self.info(format!(
                "Saved session {} ({} rows)",
                receipt.session_id, receipt.rows_written
            )),
            Err(e) => self.fail(format!("Save failed: {e}")),
        }
    }

    /// Lazily builds the shared gateway from the config.
    pub fn gateway(&mut self) -> Result<Arc<Mutex<RestGateway>>, String> {
        if let Some(gateway) = &self.gateway {
            return Ok(Arc::clone(gateway));
        }
        let gateway = RestGateway::new(&self.config.backend_url, self.config.api_key.clone())
            .map_err(|e| e.to_string())?;
        let gateway = Arc::new(Mutex::new(gateway));
        self.gateway = Some(Arc::clone(&gateway));
        Ok(gateway)
    }

    fn open_url(&mut self, url: &str) {
        if !Browser::is_available() {
            self.fail("No browser or mail handler available");
            return;
        }
        match webbrowser::open(url) {
            Ok(()) => self.info("Opened mail composer"),
            Err(e) => self.fail(e),
        }
    }

    fn start(&mut self) {
        match self.controller.start().map(|_| ()) {
            Ok(()) => {
                self.rehab = TallyCounter::default();
                self.info("Session started");
            }
            Err(e) => self.fail(e),
        }
        self.after_phase_change();
    }

    fn complete_phase(&mut self) {
        match self.controller.complete_phase().map(|s| s.is_terminal()) {
            Ok(true) => self.info("Workout complete"),
            Ok(false) => self.status = None,
            Err(e) => self.fail(e),
        }
        self.after_phase_change();
    }

    fn after_phase_change(&mut self) {
        self.selected = 0;
        self.editor = None;
        self.tallies
            .sync_from(&self.controller.session().data.climbing_stats);
    }

    fn move_selection(&mut self, by: isize) {
        let len = self.selection_len();
        if len == 0 {
            return;
        }
        let next = self.selected as isize + by;
        if (0..len as isize).contains(&next) {
            self.selected = next as usize;
        }
    }

    fn adjust(&mut self, phase: Phase, up: bool) {
        match phase {
            Phase::Climbing => {
                let Some(key) = self.selected_tally() else {
                    return;
                };
                let delta = if up {
                    Some(self.tallies.increment(key))
                } else {
                    self.tallies.decrement(key)
                };
                if let Some(delta) = delta {
                    if let Err(e) = self
                        .controller
                        .record_climbing_stat(key.grade, key.stat, delta)
                    {
                        self.fail(e);
                    }
                }
                self.tallies
                    .sync_from(&self.controller.session().data.climbing_stats);
            }
            Phase::Rehab => {
                if up {
                    self.rehab.increment();
                } else {
                    self.rehab.decrement();
                }
            }
            _ => {}
        }
    }

    /// Opens the selected field for typing; edge sizes cycle in place instead.
    fn begin_edit(&mut self) {
        let Some(target) = self.selected_field() else {
            return;
        };
        let current = target.current_text(self.data());
        if let FieldTarget::HangboardEdge(_) = target {
            let next = current
                .parse::<u8>()
                .ok()
                .and_then(|mm| EdgeSize::try_from(mm).ok())
                .unwrap_or_default()
                .next();
            if let Err(e) = self.apply_field(target, &next.mm().to_string()) {
                self.fail(e);
            }
            return;
        }
        self.editor = Some(FieldEditor::new(target, current));
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let Some(editor) = self.editor.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.editor = None,
            KeyCode::Backspace => {
                editor.backspace();
            }
            KeyCode::Char(c) => {
                editor.push(c);
            }
            KeyCode::Enter => self.commit_edit(),
            _ => {}
        }
    }

    fn commit_edit(&mut self) {
        let Some(editor) = self.editor.as_ref() else {
            return;
        };
        let target = editor.target();
        let text = editor.text().to_string();
        if editor.is_invalid() {
            self.fail(format!("{} has an invalid value", target.label()));
            return;
        }
        match self.apply_field(target, &text) {
            Ok(()) => {
                self.editor = None;
                self.status = None;
            }
            Err(e) => {
                if let Some(editor) = self.editor.as_mut() {
                    editor.mark_invalid();
                }
                self.fail(e);
            }
        }
    }

    fn apply_field(&mut self, target: FieldTarget, text: &str) -> Result<(), SessionError> {
        if self.state() == ControllerState::Terminal {
            self.controller.edit_summary(target, text)
        } else {
            self.controller.edit_form(target, text)
        }
    }

    fn email(&mut self) -> KeyOutcome {
        match render_csv(self.data()) {
            Ok(csv) => KeyOutcome::OpenUrl(mailto_url(
                self.config.email_recipient.as_deref(),
                &summary_subject(Local::now()),
                &csv,
            )),
            Err(e) => {
                self.fail(e);
                KeyOutcome::Continue
            }
        }
    }

    fn export_file(&mut self) {
        let written = render_csv(self.data())
            .and_then(|csv| write_export_file(&self.export_dir, &csv, Local::now()));
        match written {
            Ok(path) => self.info(format!("Exported to {}", path.display())),
            Err(e) => self.fail(e),
        }
    }

    fn save(&mut self) -> KeyOutcome {
        match self.save_request() {
            Ok(request) => {
                self.saves_in_flight += 1;
                self.info(format!("Saving session for {}...", request.athlete));
                KeyOutcome::Save(request)
            }
            Err(e) => {
                self.fail(e);
                KeyOutcome::Continue
            }
        }
    }

    fn save_request(&self) -> Result<SaveRequest, String> {
        if !self.config.has_backend() {
            return Err("No backend_url configured".into());
        }
        let athlete = self
            .config
            .select_athlete(self.athlete.as_deref())
            .ok_or_else(|| match &self.athlete {
                Some(name) => format!("No credentials configured for {name}"),
                None => "No athlete selected; pass --athlete".to_string(),
            })?;
        SaveRequest::from_controller(&athlete.name, athlete.credentials(), &self.controller)
            .map_err(|e| e.to_string())
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.status = Some(Status::Info(msg.into()));
    }

    fn fail(&mut self, e: impl Display) {
        error!("{e}");
        self.status = Some(Status::Error(e.to_string()));
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    if let Some(log_path) = AppDirs::log_path() {
        logging::init(&log_path);
    }

    let config_store = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default();
    let mut config = config_store.load().with_env_overrides();
    if let Some(url) = &cli.backend_url {
        config.backend_url = url.clone();
    }

    let store: Box<dyn DurableStore> = if cli.ephemeral {
        Box::new(MemoryStore::new())
    } else {
        let path = cli
            .state_db
            .clone()
            .or_else(AppDirs::db_path)
            .ok_or("could not resolve a state directory; pass --state-db")?;
        Box::new(SqliteStore::open(path)?)
    };
    let mut controller: Controller = PhaseSessionController::new(store, Box::new(SystemClock));
    if cli.reset {
        controller.reset()?;
        info!("durable state reset from the command line");
    }

    let export_dir = AppDirs::export_dir().unwrap_or_else(|| PathBuf::from("exports"));
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::from_millis(config.tick_interval_ms),
    );
    let mut app = App::new(controller, config, cli.athlete, export_dir);
    app.resume();

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<CrosstermEventSource, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| ui(app, f))?;

    while let Some(event) = runner.step(app.controller.is_ticking()) {
        match event {
            WorkoutEvent::Tick => app.on_tick(),
            WorkoutEvent::Resize => {}
            WorkoutEvent::SaveFinished(result) => app.on_save_finished(result),
            WorkoutEvent::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match app.handle_key(key) {
                    KeyOutcome::Continue => {}
                    KeyOutcome::Quit => break,
                    KeyOutcome::OpenUrl(url) => app.open_url(&url),
                    KeyOutcome::Save(request) => match app.gateway() {
                        Ok(gateway) => {
                            spawn_save(gateway, request, runner.event_source().notifier())
                        }
                        Err(e) => app.on_save_finished(Err(e)),
                    },
                }
            }
        }
        terminal.draw(|f| ui(app, f))?;
    }

    Ok(())
}

/// Runs one save on a worker thread and posts the outcome back to the loop.
fn spawn_save(gateway: Arc<Mutex<RestGateway>>, request: SaveRequest, notify: Sender<WorkoutEvent>) {
    thread::spawn(move || {
        let result = match gateway.lock() {
            Ok(mut gateway) => save_session(&mut *gateway, &request).map_err(|e| e.to_string()),
            Err(_) => Err("gateway is unavailable after an earlier failure".to_string()),
        };
        let _ = notify.send(WorkoutEvent::SaveFinished(result));
    });
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}
