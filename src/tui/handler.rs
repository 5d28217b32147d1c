use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    MoveUp,
    MoveDown,
    ToggleDone,
    MoveItemUp,
    MoveItemDown,
    MoveToPrevBlock,
    MoveToNextBlock,
    PushToTomorrow,
    RemoveActivity,
    PrevDay,
    NextDay,
    Today,
    AskCoach,
    AcceptSuggestion(usize),
    OpenLink,
    SyncNow,
    ShowHelp,
    HideHelp,
    // Activity picker
    OpenPicker,
    PickerUp,
    PickerDown,
    PickerConfirm,
    PickerCancel,
    // Mouse reordering, by screen row
    DragStart(u16),
    DragEnd(u16),
}

/// Which layer currently receives keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Picker,
    Help,
}

pub fn handle_key_event(key: KeyEvent, mode: InputMode) -> Option<AppAction> {
    match mode {
        // any key closes help
        InputMode::Help => Some(AppAction::HideHelp),

        InputMode::Picker => match key.code {
            KeyCode::Enter => Some(AppAction::PickerConfirm),
            KeyCode::Esc | KeyCode::Char('q') => Some(AppAction::PickerCancel),
            KeyCode::Char('j') | KeyCode::Down => Some(AppAction::PickerDown),
            KeyCode::Char('k') | KeyCode::Up => Some(AppAction::PickerUp),
            _ => None,
        },

        InputMode::Normal => match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(AppAction::Quit),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(AppAction::Quit),

            (KeyCode::Char('j'), _) | (KeyCode::Down, KeyModifiers::NONE) => {
                Some(AppAction::MoveDown)
            }
            (KeyCode::Char('k'), _) | (KeyCode::Up, KeyModifiers::NONE) => Some(AppAction::MoveUp),
            (KeyCode::Char('J'), _) | (KeyCode::Down, KeyModifiers::SHIFT) => {
                Some(AppAction::MoveItemDown)
            }
            (KeyCode::Char('K'), _) | (KeyCode::Up, KeyModifiers::SHIFT) => {
                Some(AppAction::MoveItemUp)
            }
            (KeyCode::Char('['), _) => Some(AppAction::MoveToPrevBlock),
            (KeyCode::Char(']'), _) => Some(AppAction::MoveToNextBlock),

            (KeyCode::Enter, _) | (KeyCode::Char(' '), _) => Some(AppAction::ToggleDone),
            (KeyCode::Char('t'), _) => Some(AppAction::PushToTomorrow),
            (KeyCode::Char('d'), _) | (KeyCode::Delete, _) => Some(AppAction::RemoveActivity),
            (KeyCode::Char('a'), _) => Some(AppAction::OpenPicker),

            (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(AppAction::PrevDay),
            (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(AppAction::NextDay),
            (KeyCode::Char('T'), _) => Some(AppAction::Today),

            (KeyCode::Char('c'), _) => Some(AppAction::AskCoach),
            (KeyCode::Char(n @ '1'..='3'), _) => {
                Some(AppAction::AcceptSuggestion(n as usize - '1' as usize))
            }

            (KeyCode::Char('o'), _) => Some(AppAction::OpenLink),
            (KeyCode::Char('s'), _) => Some(AppAction::SyncNow),

            (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

            _ => None,
        },
    }
}

pub fn handle_mouse_event(mouse: MouseEvent) -> Option<AppAction> {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => Some(AppAction::DragStart(mouse.row)),
        MouseEventKind::Up(MouseButton::Left) => Some(AppAction::DragEnd(mouse.row)),
        _ => None,
    }
}
