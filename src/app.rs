//! Interactive view state and keybindings.
//!
//! `App` holds everything the TUI needs besides the supervisor itself: scroll
//! position, the hook picker, the kill-and-restart modal and transient status
//! messages. Key presses are turned into [`AppAction`]s that `main` carries out
//! against the supervisor.

use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::host::Notice;
use crate::supervisor::RunRequest;

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Choosing a single hook to run; typing narrows the list.
    PickHook,
    /// Waiting for y/n on replacing the active run.
    Confirm,
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    None,
    Quit,
    /// Start a run; may need confirmation if one is active.
    Start(RunRequest),
    /// Start a run, the user already agreed to kill the active one.
    ConfirmStart(RunRequest),
    Kill,
    /// Load hook ids and open the picker.
    OpenHookPicker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
    level: StatusLevel,
}

#[derive(Debug)]
pub struct App {
    pub input_mode: InputMode,
    /// Hook ids offered by the picker, in configuration order.
    pub hooks: Vec<String>,
    /// Text typed into the picker.
    pub query: String,
    /// Index into the filtered picker entries.
    pub hook_selected: usize,
    /// Question shown by the confirm modal.
    pub confirm_message: String,
    pending: Option<RunRequest>,
    /// First visible output line when not following.
    pub scroll: usize,
    pub follow: bool,
    pub log_view_height: usize,
    pub total_lines: usize,
    pub use_symbols: bool,
    pub show_help: bool,
    pub should_quit: bool,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(use_symbols: bool) -> Self {
        Self {
            input_mode: InputMode::Normal,
            hooks: Vec::new(),
            query: String::new(),
            hook_selected: 0,
            confirm_message: String::new(),
            pending: None,
            scroll: 0,
            follow: true,
            log_view_height: 0,
            total_lines: 0,
            use_symbols,
            show_help: false,
            should_quit: false,
            status_message: None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return AppAction::Quit;
        }
        match self.input_mode {
            InputMode::Normal => self.handle_normal_input(key),
            InputMode::PickHook => self.handle_picker_input(key),
            InputMode::Confirm => self.handle_confirm_input(key),
        }
    }

    fn handle_normal_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Char('a') => AppAction::Start(RunRequest::all_files()),
            KeyCode::Char('s') => AppAction::Start(RunRequest::hooks(Vec::new(), None)),
            KeyCode::Char('h') => AppAction::OpenHookPicker,
            KeyCode::Char('i') => AppAction::Start(RunRequest::install()),
            KeyCode::Char('u') => AppAction::Start(RunRequest::autoupdate()),
            KeyCode::Char('k') => AppAction::Kill,
            KeyCode::Char('f') => {
                self.follow = !self.follow;
                if !self.follow {
                    self.scroll = self.max_scroll();
                }
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
                AppAction::None
            }
            KeyCode::Esc => {
                self.show_help = false;
                AppAction::None
            }
            KeyCode::Up => {
                self.scroll_up(1);
                AppAction::None
            }
            KeyCode::Down => {
                self.scroll_down(1);
                AppAction::None
            }
            KeyCode::PageUp => {
                self.scroll_up(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll_down(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::Home => {
                self.follow = false;
                self.scroll = 0;
                AppAction::None
            }
            KeyCode::End => {
                self.follow = true;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_picker_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                AppAction::None
            }
            KeyCode::Enter => {
                let choice = self
                    .filtered_hooks()
                    .get(self.hook_selected)
                    .map(|id| id.to_string())
                    .or_else(|| {
                        let typed = self.query.trim();
                        (!typed.is_empty()).then(|| typed.to_string())
                    });
                self.input_mode = InputMode::Normal;
                match choice {
                    Some(id) => AppAction::Start(RunRequest::single_hook(id)),
                    None => AppAction::None,
                }
            }
            KeyCode::Up => {
                self.hook_selected = self.hook_selected.saturating_sub(1);
                AppAction::None
            }
            KeyCode::Down | KeyCode::Tab => {
                let len = self.filtered_hooks().len();
                if self.hook_selected + 1 < len {
                    self.hook_selected += 1;
                }
                AppAction::None
            }
            KeyCode::Backspace => {
                self.query.pop();
                self.hook_selected = 0;
                AppAction::None
            }
            KeyCode::Char(c) => {
                self.query.push(c);
                self.hook_selected = 0;
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_confirm_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.input_mode = InputMode::Normal;
                match self.pending.take() {
                    Some(request) => AppAction::ConfirmStart(request),
                    None => AppAction::None,
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.pending = None;
                self.set_status_message("kept the current run");
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    /// Picker entries matching the typed query. Duplicate ids are shown once.
    pub fn filtered_hooks(&self) -> Vec<&str> {
        let query = self.query.trim();
        let mut seen = Vec::new();
        for id in &self.hooks {
            if id.contains(query) && !seen.contains(&id.as_str()) {
                seen.push(id.as_str());
            }
        }
        seen
    }

    pub fn open_hook_picker(&mut self, hooks: Vec<String>) {
        self.hooks = hooks;
        self.query.clear();
        self.hook_selected = 0;
        self.show_help = false;
        self.input_mode = InputMode::PickHook;
    }

    /// Parks `request` until the user answers the modal.
    pub fn ask_confirm(&mut self, request: RunRequest, message: String) {
        self.pending = Some(request);
        self.confirm_message = message;
        self.input_mode = InputMode::Confirm;
    }

    pub fn on_run_started(&mut self) {
        self.follow = true;
        self.scroll = 0;
    }

    pub fn on_notice(&mut self, notice: &Notice) {
        match notice {
            Notice::Failed { raise, .. } => {
                if *raise {
                    self.raise_output();
                }
                self.set_status_warning(notice.to_string());
            }
            Notice::Maintenance { success: false, .. } => self.set_status_warning(notice.to_string()),
            _ => self.set_status_message(notice.to_string()),
        }
    }

    /// Brings the output pane forward and jumps to the end.
    pub fn raise_output(&mut self) {
        self.show_help = false;
        if self.input_mode == InputMode::PickHook {
            self.input_mode = InputMode::Normal;
        }
        self.follow = true;
    }

    fn max_scroll(&self) -> usize {
        self.total_lines.saturating_sub(self.log_view_height.max(1))
    }

    pub fn scroll_up(&mut self, amount: usize) {
        if self.follow {
            self.follow = false;
            self.scroll = self.max_scroll();
        }
        self.scroll = self.scroll.saturating_sub(amount);
    }

    pub fn scroll_down(&mut self, amount: usize) {
        if self.follow {
            return;
        }
        self.scroll = (self.scroll + amount).min(self.max_scroll());
        if self.scroll == self.max_scroll() {
            self.follow = true;
        }
    }

    /// Records the visible geometry from the last draw.
    pub fn set_view_size(&mut self, height: usize, total_lines: usize) {
        self.log_view_height = height;
        self.total_lines = total_lines;
        if !self.follow {
            self.scroll = self.scroll.min(self.max_scroll());
        }
    }

    /// First line to draw for the current follow/scroll state.
    pub fn view_start(&self) -> usize {
        if self.follow {
            self.max_scroll()
        } else {
            self.scroll.min(self.max_scroll())
        }
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        let message = self.status_message.as_ref()?;
        let still_visible = message.ttl.map_or(true, |ttl| message.at.elapsed() < ttl);
        still_visible.then_some((message.text.as_str(), message.level))
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Info, Some(Duration::from_secs(4)));
    }

    pub fn set_status_warning(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Warning, Some(Duration::from_secs(8)));
    }

    fn set_status_message_with_level(
        &mut self,
        message: impl Into<String>,
        level: StatusLevel,
        ttl: Option<Duration>,
    ) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl,
            level,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn menu_keys_map_to_requests() {
        let mut app = App::new(false);
        assert_eq!(
            app.handle_key(key(KeyCode::Char('a'))),
            AppAction::Start(RunRequest::all_files())
        );
        assert_eq!(
            app.handle_key(key(KeyCode::Char('i'))),
            AppAction::Start(RunRequest::install())
        );
        assert_eq!(app.handle_key(key(KeyCode::Char('k'))), AppAction::Kill);
        assert_eq!(app.handle_key(key(KeyCode::Char('h'))), AppAction::OpenHookPicker);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), AppAction::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn picker_filters_and_dedups() {
        let mut app = App::new(false);
        app.open_hook_picker(vec![
            "check-yaml".into(),
            "black".into(),
            "check-json".into(),
            "check-yaml".into(),
        ]);
        assert_eq!(app.filtered_hooks(), vec!["check-yaml", "black", "check-json"]);

        for c in "json".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.filtered_hooks(), vec!["check-json"]);
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppAction::Start(RunRequest::single_hook("check-json"))
        );
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn picker_falls_back_to_typed_id() {
        let mut app = App::new(false);
        app.open_hook_picker(Vec::new());
        for c in "mypy".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(
            app.handle_key(key(KeyCode::Enter)),
            AppAction::Start(RunRequest::single_hook("mypy"))
        );
    }

    #[test]
    fn confirm_modal_resolves_pending_request() {
        let mut app = App::new(false);
        app.ask_confirm(RunRequest::all_files(), "kill?".into());
        assert_eq!(app.handle_key(key(KeyCode::Char('x'))), AppAction::None);
        assert_eq!(app.input_mode, InputMode::Confirm);
        assert_eq!(
            app.handle_key(key(KeyCode::Char('y'))),
            AppAction::ConfirmStart(RunRequest::all_files())
        );

        app.ask_confirm(RunRequest::autoupdate(), "kill?".into());
        assert_eq!(app.handle_key(key(KeyCode::Char('n'))), AppAction::None);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.status_message().map(|(text, _)| text), Some("kept the current run"));
    }

    #[test]
    fn scrolling_leaves_and_regains_follow() {
        let mut app = App::new(false);
        app.set_view_size(10, 50);
        assert_eq!(app.view_start(), 40);

        app.scroll_up(5);
        assert!(!app.follow);
        assert_eq!(app.view_start(), 35);

        app.scroll_down(100);
        assert!(app.follow);
    }

    #[test]
    fn failure_notice_raises_output() {
        let mut app = App::new(false);
        app.open_hook_picker(vec!["black".into()]);
        app.follow = false;
        app.on_notice(&Notice::Failed { failed_hooks: 1, raise: true });
        assert!(app.follow);
        assert_eq!(app.input_mode, InputMode::Normal);
        let (text, level) = app.status_message().unwrap();
        assert_eq!(text, "1 hook failed");
        assert_eq!(level, StatusLevel::Warning);
    }
}
