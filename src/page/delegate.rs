//! Actions the user can type at the page prompt.

use crate::session::Phase;
use std::str::FromStr;

/// A user action, dispatched to the controller by the page loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    Start,
    Check,
    Logout,
    OpenLink,
    Help,
    Quit,
}

impl PageAction {
    /// What the user types.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Check => "check",
            Self::Logout => "logout",
            Self::OpenLink => "open",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }

    /// Button caption.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "Start login",
            Self::Check => "I already signed in (check)",
            Self::Logout => "Log out (clear session)",
            Self::OpenLink => "Open Microsoft sign-in in your browser",
            Self::Help => "Show actions",
            Self::Quit => "Quit",
        }
    }
}

impl FromStr for PageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" | "s" => Ok(Self::Start),
            "check" | "c" => Ok(Self::Check),
            "logout" | "l" => Ok(Self::Logout),
            "open" | "o" => Ok(Self::OpenLink),
            "help" | "h" | "?" => Ok(Self::Help),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            other => Err(format!(
                "Unknown action \"{}\". Type help to list actions.",
                other
            )),
        }
    }
}

/// Actions offered for a phase, primary ones first.
pub fn available_actions(phase: Phase) -> &'static [PageAction] {
    match phase {
        Phase::Unauthenticated => &[
            PageAction::Start,
            PageAction::Check,
            PageAction::Help,
            PageAction::Quit,
        ],
        Phase::Pending => &[
            PageAction::Start,
            PageAction::Check,
            PageAction::OpenLink,
            PageAction::Logout,
            PageAction::Help,
            PageAction::Quit,
        ],
        Phase::Authenticated => &[PageAction::Logout, PageAction::Help, PageAction::Quit],
    }
}

/// One line per action offered for `phase`.
pub fn help_text(phase: Phase) -> String {
    available_actions(phase)
        .iter()
        .map(|action| format!("{:<8} {}", action.command(), action.label()))
        .collect::<Vec<_>>()
        .join("\n")
}
