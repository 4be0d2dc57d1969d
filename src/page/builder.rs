//! Draws the sign-in page for the current session state.

use crate::page::delegate::available_actions;
use crate::page::Notice;
use crate::session::SessionState;
use std::io::{self, Write};

/// Page title.
pub const TITLE: &str = "Microsoft login (Device Code)";

const GREEN: &str = "32";
const YELLOW: &str = "33";
const RED: &str = "31";
const BLUE: &str = "34";
const BOLD: &str = "1";

/// Check if color output is enabled
fn use_color() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// Renders one full draw of the page.
pub struct PageBuilder {
    default_login_url: String,
    color: bool,
}

impl PageBuilder {
    /// `default_login_url` is shown when the flow carries no verification URI.
    pub fn new(default_login_url: impl Into<String>) -> Self {
        Self {
            default_login_url: default_login_url.into(),
            color: use_color(),
        }
    }

    /// Disable ANSI colors.
    pub fn plain(mut self) -> Self {
        self.color = false;
        self
    }

    /// Draw the page for `session`, with the outcome of the previous action.
    ///
    /// An error or warning stops the draw right after the primary controls,
    /// so the sign-in steps are not shown in that cycle.
    pub fn render<W: Write>(
        &self,
        out: &mut W,
        session: &SessionState,
        notice: Option<&Notice>,
    ) -> io::Result<()> {
        self.header(out)?;

        if let Some(me) = session.identity() {
            writeln!(out, "{}", self.paint(GREEN, "✓ LOGIN OK"))?;
            writeln!(out)?;
            writeln!(out, "{}", self.paint(BOLD, "I am"))?;
            self.key_value(out, "Name", &me.display_name)?;
            self.key_value(out, "Email", &me.user_principal_name)?;
            self.key_value(out, "ID", &me.id)?;
            writeln!(out)?;
            if let Some(notice) = notice {
                self.notice(out, notice)?;
            }
            return self.controls(out, session);
        }

        self.controls(out, session)?;

        if let Some(notice) = notice {
            self.notice(out, notice)?;
            if notice.halts() {
                return Ok(());
            }
        }

        let flow = match session.flow() {
            Some(flow) => flow,
            None => {
                let hint = format!("Type {} to begin.", self.paint(BOLD, "start"));
                return self.info(out, &hint);
            }
        };

        writeln!(out, "{}", self.paint(BOLD, "Step 1: Open Microsoft login"))?;
        writeln!(out, "  {}", flow.login_url(&self.default_login_url))?;
        writeln!(out, "  (type open to launch it in your browser)")?;
        writeln!(out)?;

        writeln!(out, "Step 2: Enter this code:")?;
        writeln!(out)?;
        writeln!(out, "    {}", self.paint(BOLD, &flow.user_code))?;
        writeln!(out)?;
        if flow.is_expired() {
            self.warning(out, "This code has expired. Type start for a new one.")?;
        }

        writeln!(out, "Full device-flow message:")?;
        writeln!(out, "  {}", flow.message)?;
        writeln!(out)?;

        writeln!(
            out,
            "{}",
            self.paint(BOLD, "Step 3: After you finish in the browser")
        )?;
        writeln!(out, "Come back here and type check.")?;
        if let Some(interval) = flow.interval {
            writeln!(out, "Wait at least {} seconds between checks.", interval)?;
        }
        writeln!(out)?;
        Ok(())
    }

    /// Draw a configuration error and nothing else.
    pub fn render_config_error<W: Write>(&self, out: &mut W, message: &str) -> io::Result<()> {
        self.header(out)?;
        self.error(out, message)
    }

    fn header<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let border = "═".repeat(59);
        writeln!(out)?;
        writeln!(out, "{}", border)?;
        writeln!(out, "{:^59}", TITLE)?;
        writeln!(out, "{}", border)?;
        writeln!(out)
    }

    fn controls<W: Write>(&self, out: &mut W, session: &SessionState) -> io::Result<()> {
        let buttons: Vec<String> = available_actions(session.phase())
            .iter()
            .map(|action| format!("[{}] {}", self.paint(BOLD, action.command()), action.label()))
            .collect();
        writeln!(out, "{}", buttons.join("  "))?;
        writeln!(out)
    }

    fn notice<W: Write>(&self, out: &mut W, notice: &Notice) -> io::Result<()> {
        match notice {
            Notice::Error(message) => self.error(out, message),
            Notice::Warning(message) => self.warning(out, message),
            Notice::Info(message) => self.info(out, message),
        }
    }

    fn key_value<W: Write>(&self, out: &mut W, key: &str, value: &str) -> io::Result<()> {
        writeln!(out, "  {} {}", self.paint(BOLD, &format!("{}:", key)), value)
    }

    fn error<W: Write>(&self, out: &mut W, message: &str) -> io::Result<()> {
        writeln!(out, "{} {}", self.paint(RED, "Error:"), message)?;
        writeln!(out)
    }

    fn warning<W: Write>(&self, out: &mut W, message: &str) -> io::Result<()> {
        writeln!(out, "{} {}", self.paint(YELLOW, "Warning:"), message)?;
        writeln!(out)
    }

    fn info<W: Write>(&self, out: &mut W, message: &str) -> io::Result<()> {
        writeln!(out, "{} {}", self.paint(BLUE, "ℹ"), message)?;
        writeln!(out)
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    }
}
